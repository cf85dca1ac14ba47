use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};
use std::collections::BTreeMap;

// ------------- identifiers -------------

/// A CMS id as it appears on the wire: document stores hand out strings,
/// SQL-backed ones hand out integers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ExternalId {
    Text(String),
    Number(i64),
}

impl ExternalId {
    pub fn into_string(self) -> String {
        match self {
            ExternalId::Text(s) => s,
            ExternalId::Number(n) => n.to_string(),
        }
    }
}

fn external_id<'de, D>(de: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    ExternalId::deserialize(de).map(ExternalId::into_string)
}

// ------------- course document -------------

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Pending,
    Expired,
    Suspended,
    Dropped,
}

impl EnrollmentStatus {
    /// Only active and completed enrollments open the curriculum. `None`
    /// (not enrolled) never does.
    pub fn unlocks_curriculum(status: Option<EnrollmentStatus>) -> bool {
        matches!(
            status,
            Some(EnrollmentStatus::Active) | Some(EnrollmentStatus::Completed)
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    Lessons,
    Assessments,
    #[serde(other)]
    Other,
}

/// `GET /api/courses/:courseId?userId=`
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CourseDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub curriculum: Curriculum,
    #[serde(default)]
    pub enrollment_status: Option<EnrollmentStatus>,
    /// Legacy progress field, only read when no progress fetch happened.
    #[serde(default)]
    pub completed_lessons: Option<Vec<String>>,
    #[serde(default)]
    pub evaluation_mode: Option<EvaluationMode>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Curriculum {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub modules: Vec<CurriculumModule>,
    #[serde(default)]
    pub final_exam: Option<FinalExam>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CurriculumModule {
    #[serde(deserialize_with = "external_id")]
    pub id: String,
    pub title: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub items: Vec<ModuleItem>,
}

/// One entry of a module's polymorphic `items` relation.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "relationTo", content = "value")]
pub enum ModuleItem {
    #[serde(rename = "course-lessons")]
    Lesson(Relation<Lesson>),
    #[serde(rename = "assessments")]
    Assessment(Relation<Assessment>),
}

/// A relation target that the CMS either expanded into a document or left as
/// a bare id (depth-limited responses). Anything else, such as a partially
/// hydrated document, is kept as `Malformed` and treated like an unresolved
/// relation.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum Relation<T> {
    Resolved(T),
    Unresolved(ExternalId),
    Malformed(serde_json::Value),
}

impl<T> Relation<T> {
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Relation::Resolved(v) => Some(v),
            Relation::Unresolved(_) | Relation::Malformed(_) => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[serde(deserialize_with = "external_id")]
    pub id: String,
    pub title: String,
    #[serde(default, alias = "estimatedDurationMinutes")]
    pub estimated_duration: Option<u32>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    #[serde(deserialize_with = "external_id")]
    pub id: String,
    pub title: String,
    /// `"exam"` or anything else (treated as a quiz).
    #[serde(default)]
    pub assessment_type: Option<String>,
    #[serde(default, alias = "estimatedDurationMinutes")]
    pub estimated_duration: Option<u32>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(flatten)]
    pub rules: AssessmentRules,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub items: Vec<AssessmentEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssessmentEntry {
    pub question: Relation<Question>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FinalExam {
    #[serde(deserialize_with = "external_id")]
    pub id: String,
    pub title: String,
    #[serde(default, alias = "estimatedDurationMinutes")]
    pub estimated_duration: Option<u32>,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(flatten)]
    pub rules: AssessmentRules,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub questions: Vec<Relation<Question>>,
}

/// Grading rules shared by quizzes, exams and the final exam.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRules {
    #[serde(default)]
    pub passing_score: Option<f64>,
    #[serde(default, alias = "timeLimitMinutes")]
    pub time_limit: Option<u32>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub show_correct_answer: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(deserialize_with = "external_id")]
    pub id: String,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default)]
    pub points: Option<f64>,
    /// Prompt, options and anything else the quiz UI renders.
    #[serde(flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

// ------------- progress -------------

/// `GET /api/courses/:courseId/progress?userId=`
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub completed_lesson_ids: Vec<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub attempt_counts: BTreeMap<String, u32>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub submission_history: BTreeMap<String, Vec<AttemptSummary>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSummary {
    #[serde(default, alias = "id")]
    pub submission_id: Option<String>,
    #[serde(default)]
    pub attempt_number: Option<u32>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonCompletionReq {
    pub lesson_id: String,
    pub completed: bool,
    pub user_id: String,
}

// ------------- assessments -------------

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartAssessmentReq {
    pub user_id: String,
    pub course_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StartAssessmentResp {
    #[serde(deserialize_with = "external_id")]
    pub submission_id: String,
    #[serde(default)]
    pub is_resumed: bool,
    #[serde(default)]
    pub saved_answers: Option<Vec<SavedAnswer>>,
}

/// `GET /api/assessments/submission/:submissionId/answers`
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SavedAnswersResp {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub answers: Vec<SavedAnswer>,
}

/// One answer, as saved per question and as sent on submit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedAnswer {
    #[serde(deserialize_with = "external_id")]
    pub question_id: String,
    pub response: serde_json::Value,
    #[serde(default)]
    pub question_type: Option<String>,
}

/// Body of the gateway's lesson completion route: the state the learner
/// asked for, as the client last showed it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetCompletionReq {
    pub completed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SubmitAssessmentReq {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<SavedAnswer>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinishCourseReq {
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FinishCourseResp {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}
