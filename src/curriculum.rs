use serde::{Deserialize, Serialize, Serializer};
use std::{fmt, str::FromStr};

use crate::models::{
    Assessment, AssessmentRules, Curriculum, FinalExam, Lesson, ModuleItem, Question, Relation,
};
use crate::slug::slugify;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    Lesson,
    Assessment,
    FinalExam,
}

impl ItemType {
    fn as_str(self) -> &'static str {
        match self {
            ItemType::Lesson => "lesson",
            ItemType::Assessment => "assessment",
            ItemType::FinalExam => "finalExam",
        }
    }
}

/// Identity of a player item: the item type plus the CMS id.
///
/// Two keys are equal only when both parts are equal, so a lesson `"1-2"`
/// and an assessment `"2"` can never collide. The string form
/// (`lesson:1-2`) splits on the first `:`, which no type name contains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    kind: ItemType,
    id: String,
}

pub fn build_item_key(kind: ItemType, id: &str) -> ItemKey {
    ItemKey {
        kind,
        id: id.to_string(),
    }
}

impl ItemKey {
    pub fn kind(&self) -> ItemType {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

impl FromStr for ItemKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once(':').ok_or(())?;
        let kind = match kind {
            "lesson" => ItemType::Lesson,
            "assessment" => ItemType::Assessment,
            "finalExam" => ItemType::FinalExam,
            _ => return Err(()),
        };
        Ok(build_item_key(kind, id))
    }
}

impl Serialize for ItemKey {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AssessmentKind {
    Quiz,
    Exam,
    Final,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentDetails {
    pub passing_score: Option<f64>,
    pub time_limit_minutes: Option<u32>,
    pub max_attempts: Option<u32>,
    pub questions_count: usize,
    pub questions: Vec<Question>,
    pub show_correct_answer: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentFacet {
    pub assessment_kind: AssessmentKind,
    pub assessment_details: AssessmentDetails,
}

/// One navigable unit of a course, in flattened traversal order.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerItem {
    pub key: ItemKey,
    #[serde(rename = "type")]
    pub kind: ItemType,
    pub id: String,
    pub title: String,
    pub estimated_duration_minutes: Option<u32>,
    pub content: Option<serde_json::Value>,
    pub module_id: Option<String>,
    pub module_slug: Option<String>,
    pub slug: String,
    #[serde(flatten)]
    pub assessment: Option<AssessmentFacet>,
}

impl PlayerItem {
    pub fn is_lesson(&self) -> bool {
        self.kind == ItemType::Lesson
    }

    pub fn details(&self) -> Option<&AssessmentDetails> {
        self.assessment.as_ref().map(|a| &a.assessment_details)
    }
}

struct ModuleRef<'a> {
    id: &'a str,
    slug: String,
}

/// Flattens modules (in authored order) and the trailing final exam into the
/// player's traversal order. Relations the CMS did not expand are skipped.
pub fn flatten(curriculum: &Curriculum) -> Vec<PlayerItem> {
    let mut out = Vec::new();

    for module in &curriculum.modules {
        let parent = ModuleRef {
            id: &module.id,
            slug: slugify(&module.title),
        };
        for item in &module.items {
            match item {
                ModuleItem::Lesson(Relation::Resolved(lesson)) => {
                    out.push(lesson_item(lesson, &parent));
                }
                ModuleItem::Assessment(Relation::Resolved(assessment)) => {
                    out.push(assessment_item(assessment, &parent));
                }
                ModuleItem::Lesson(Relation::Unresolved(_))
                | ModuleItem::Assessment(Relation::Unresolved(_)) => {}
                ModuleItem::Lesson(Relation::Malformed(raw))
                | ModuleItem::Assessment(Relation::Malformed(raw)) => {
                    tracing::warn!(module_id = %module.id, item = %raw, "skipping malformed curriculum item");
                }
            }
        }
    }

    if let Some(exam) = &curriculum.final_exam {
        out.push(final_exam_item(exam));
    }
    out
}

fn lesson_item(lesson: &Lesson, parent: &ModuleRef<'_>) -> PlayerItem {
    PlayerItem {
        key: build_item_key(ItemType::Lesson, &lesson.id),
        kind: ItemType::Lesson,
        id: lesson.id.clone(),
        title: lesson.title.clone(),
        estimated_duration_minutes: lesson.estimated_duration,
        content: lesson.content.clone(),
        module_id: Some(parent.id.to_string()),
        module_slug: Some(parent.slug.clone()),
        slug: slugify(&lesson.title),
        assessment: None,
    }
}

fn assessment_item(assessment: &Assessment, parent: &ModuleRef<'_>) -> PlayerItem {
    let questions: Vec<Question> = assessment
        .items
        .iter()
        .filter_map(|entry| entry.question.resolved().cloned())
        .collect();
    let kind = match assessment.assessment_type.as_deref() {
        Some("exam") => AssessmentKind::Exam,
        _ => AssessmentKind::Quiz,
    };
    // Fall back to the raw entry count when questions came back as bare ids.
    let questions_count = if questions.is_empty() {
        assessment.items.len()
    } else {
        questions.len()
    };

    PlayerItem {
        key: build_item_key(ItemType::Assessment, &assessment.id),
        kind: ItemType::Assessment,
        id: assessment.id.clone(),
        title: assessment.title.clone(),
        estimated_duration_minutes: assessment.estimated_duration,
        content: assessment.content.clone(),
        module_id: Some(parent.id.to_string()),
        module_slug: Some(parent.slug.clone()),
        slug: slugify(&assessment.title),
        assessment: Some(AssessmentFacet {
            assessment_kind: kind,
            assessment_details: details(&assessment.rules, questions, questions_count),
        }),
    }
}

fn final_exam_item(exam: &FinalExam) -> PlayerItem {
    let questions: Vec<Question> = exam
        .questions
        .iter()
        .filter_map(|q| q.resolved().cloned())
        .collect();
    let questions_count = if questions.is_empty() {
        exam.questions.len()
    } else {
        questions.len()
    };

    PlayerItem {
        key: build_item_key(ItemType::FinalExam, &exam.id),
        kind: ItemType::FinalExam,
        id: exam.id.clone(),
        title: exam.title.clone(),
        estimated_duration_minutes: exam.estimated_duration,
        content: exam.content.clone(),
        module_id: None,
        module_slug: None,
        slug: slugify(&exam.title),
        assessment: Some(AssessmentFacet {
            assessment_kind: AssessmentKind::Final,
            assessment_details: details(&exam.rules, questions, questions_count),
        }),
    }
}

fn details(rules: &AssessmentRules, questions: Vec<Question>, questions_count: usize) -> AssessmentDetails {
    AssessmentDetails {
        passing_score: rules.passing_score,
        time_limit_minutes: rules.time_limit,
        max_attempts: rules.max_attempts,
        questions_count,
        questions,
        show_correct_answer: rules.show_correct_answer,
    }
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumStats {
    pub total_modules: usize,
    pub total_lessons: usize,
    pub total_quizzes: usize,
    pub total_exams: usize,
}

/// Counts over the source graph. Modules count even when empty; the final
/// exam adds one exam.
pub fn stats(curriculum: &Curriculum) -> CurriculumStats {
    let mut stats = CurriculumStats {
        total_modules: curriculum.modules.len(),
        ..Default::default()
    };
    for item in curriculum.modules.iter().flat_map(|m| m.items.iter()) {
        match item {
            ModuleItem::Lesson(Relation::Resolved(_)) => stats.total_lessons += 1,
            ModuleItem::Assessment(Relation::Resolved(a)) => {
                if a.assessment_type.as_deref() == Some("exam") {
                    stats.total_exams += 1;
                } else {
                    stats.total_quizzes += 1;
                }
            }
            _ => {}
        }
    }
    if curriculum.final_exam.is_some() {
        stats.total_exams += 1;
    }
    stats
}
