#![allow(dead_code)]

use async_trait::async_trait;
use course_player_runtime::{
    error::ApiError,
    models::*,
    session::LearnerContext,
    CourseApi,
};
use http::StatusCode;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Op {
    FetchCourse,
    FetchProgress,
    LessonCompletion,
    Start,
    SavedAnswers,
    SaveAnswer,
    Submit,
    Finish,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    /// Course, assessment or submission id the call addressed.
    pub target: String,
    pub body: Value,
}

/// In-memory course API. Behaves like a well-formed server unless told to
/// fail an operation.
#[derive(Default)]
pub struct MockCourseApi {
    pub course: Mutex<Option<Value>>,
    pub progress: Mutex<ProgressSnapshot>,
    pub resume: Mutex<bool>,
    pub saved_answers: Mutex<Vec<SavedAnswer>>,
    pub grade_passed: Mutex<bool>,
    failing: Mutex<BTreeSet<Op>>,
    calls: Mutex<Vec<Call>>,
    submissions: Mutex<HashMap<String, String>>,
}

impl MockCourseApi {
    pub fn with_course(course: Value) -> Self {
        let api = MockCourseApi::default();
        *api.course.lock().unwrap() = Some(course);
        api
    }

    pub fn fail(&self, op: Op) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: Op) {
        self.failing.lock().unwrap().remove(&op);
    }

    pub fn set_completed(&self, ids: &[&str]) {
        self.progress.lock().unwrap().completed_lesson_ids = ids.iter().map(|s| s.to_string()).collect();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    pub fn count(&self, op: Op) -> usize {
        self.ops().into_iter().filter(|o| *o == op).count()
    }

    pub fn last(&self, op: Op) -> Option<Call> {
        self.calls().into_iter().rev().find(|c| c.op == op)
    }

    fn record(&self, op: Op, target: &str, body: Value) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(Call {
            op,
            target: target.to_string(),
            body,
        });
        if self.failing.lock().unwrap().contains(&op) {
            return Err(ApiError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CourseApi for MockCourseApi {
    async fn fetch_course(&self, course_id: &str, user_id: Option<&str>) -> Result<CourseDocument, ApiError> {
        self.record(Op::FetchCourse, course_id, json!({ "userId": user_id }))?;
        let course = self.course.lock().unwrap().clone();
        match course {
            Some(v) => Ok(serde_json::from_value(v).expect("fixture course parses")),
            None => Err(ApiError::Status {
                status: StatusCode::NOT_FOUND,
            }),
        }
    }

    async fn fetch_progress(&self, course_id: &str, user_id: &str) -> Result<ProgressSnapshot, ApiError> {
        self.record(Op::FetchProgress, course_id, json!({ "userId": user_id }))?;
        Ok(self.progress.lock().unwrap().clone())
    }

    async fn set_lesson_completion(&self, course_id: &str, req: &LessonCompletionReq) -> Result<(), ApiError> {
        // let a concurrent request run before this one lands
        tokio::task::yield_now().await;
        self.record(Op::LessonCompletion, course_id, serde_json::to_value(req).unwrap())?;
        let mut progress = self.progress.lock().unwrap();
        progress.completed_lesson_ids.retain(|id| id != &req.lesson_id);
        if req.completed {
            progress.completed_lesson_ids.push(req.lesson_id.clone());
        }
        Ok(())
    }

    async fn start_assessment(
        &self,
        assessment_id: &str,
        req: &StartAssessmentReq,
    ) -> Result<StartAssessmentResp, ApiError> {
        self.record(Op::Start, assessment_id, serde_json::to_value(req).unwrap())?;
        let mut subs = self.submissions.lock().unwrap();
        let submission_id = format!("sub-{}", subs.len() + 1);
        subs.insert(submission_id.clone(), assessment_id.to_string());
        Ok(StartAssessmentResp {
            submission_id,
            is_resumed: *self.resume.lock().unwrap(),
            saved_answers: None,
        })
    }

    async fn fetch_saved_answers(&self, submission_id: &str) -> Result<Vec<SavedAnswer>, ApiError> {
        self.record(Op::SavedAnswers, submission_id, Value::Null)?;
        Ok(self.saved_answers.lock().unwrap().clone())
    }

    async fn save_answer(&self, submission_id: &str, answer: &SavedAnswer) -> Result<(), ApiError> {
        self.record(Op::SaveAnswer, submission_id, serde_json::to_value(answer).unwrap())?;
        Ok(())
    }

    async fn submit_assessment(
        &self,
        submission_id: &str,
        req: &SubmitAssessmentReq,
    ) -> Result<Value, ApiError> {
        self.record(Op::Submit, submission_id, serde_json::to_value(req).unwrap())?;
        let passed = *self.grade_passed.lock().unwrap();
        let assessment_id = self
            .submissions
            .lock()
            .unwrap()
            .get(submission_id)
            .cloned()
            .unwrap_or_default();

        let mut progress = self.progress.lock().unwrap();
        let count = progress.attempt_counts.entry(assessment_id.clone()).or_insert(0);
        *count += 1;
        let attempt_number = *count;
        progress
            .submission_history
            .entry(assessment_id)
            .or_default()
            .push(AttemptSummary {
                submission_id: Some(submission_id.to_string()),
                attempt_number: Some(attempt_number),
                score: Some(if passed { 90.0 } else { 40.0 }),
                passed: Some(passed),
                status: Some("graded".into()),
                submitted_at: None,
            });
        Ok(json!({ "passed": passed, "score": if passed { 90 } else { 40 } }))
    }

    async fn finish_course(&self, course_id: &str, req: &FinishCourseReq) -> Result<(), ApiError> {
        self.record(Op::Finish, course_id, serde_json::to_value(req).unwrap())?;
        Ok(())
    }
}

/// Module "Intro" holds lessons Alpha and Beta and the quiz Checkpoint;
/// a final exam closes the course.
pub fn course_json(status: Option<&str>) -> Value {
    json!({
        "title": "Rust Fundamentals",
        "enrollmentStatus": status,
        "evaluationMode": "lessons",
        "completedLessons": ["A"],
        "curriculum": {
            "modules": [
                {
                    "id": "m1",
                    "title": "Intro",
                    "items": [
                        { "relationTo": "course-lessons", "value": { "id": "A", "title": "Alpha" } },
                        { "relationTo": "course-lessons", "value": { "id": "B", "title": "Beta" } },
                        { "relationTo": "assessments", "value": {
                            "id": "C", "title": "Checkpoint", "assessmentType": "quiz",
                            "passingScore": 70, "maxAttempts": 2,
                            "items": [
                                { "question": { "id": "q1", "questionType": "trueFalse" } },
                                { "question": { "id": "q2", "questionType": "shortAnswer" } }
                            ]
                        } }
                    ]
                }
            ],
            "finalExam": { "id": "F", "title": "Final Exam", "questions": ["fq1", "fq2"] }
        }
    })
}

pub fn signed_in(course_id: &str) -> LearnerContext {
    LearnerContext {
        course_id: course_id.into(),
        user_id: Some("u1".into()),
    }
}

pub fn anonymous(course_id: &str) -> LearnerContext {
    LearnerContext {
        course_id: course_id.into(),
        user_id: None,
    }
}

pub fn answer(question_id: &str, response: Value) -> SavedAnswer {
    SavedAnswer {
        question_id: question_id.into(),
        response,
        question_type: Some("shortAnswer".into()),
    }
}
