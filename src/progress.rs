use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::api::CourseApi;
use crate::curriculum::PlayerItem;
use crate::error::ApiError;
use crate::models::{AttemptSummary, CourseDocument, LessonCompletionReq, ProgressSnapshot};
use crate::optimistic::{Mutation, Pending};
use crate::session::LearnerContext;

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProgressSource {
    /// Nothing loaded.
    #[default]
    Empty,
    /// `completedLessons` carried by the course document.
    CourseDocument,
    /// The progress endpoint.
    Remote,
}

/// Sets one lesson's completion flag; reverting restores its previous
/// membership, not the whole set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetLessonCompleted {
    pub lesson_id: String,
    pub completed: bool,
}

impl Mutation for SetLessonCompleted {
    type Target = BTreeSet<String>;
    type Undo = bool;

    fn apply(&self, set: &mut BTreeSet<String>) -> bool {
        let was = set.contains(&self.lesson_id);
        if self.completed {
            set.insert(self.lesson_id.clone());
        } else {
            set.remove(&self.lesson_id);
        }
        was
    }

    fn revert(&self, set: &mut BTreeSet<String>, was: bool) {
        if was {
            set.insert(self.lesson_id.clone());
        } else {
            set.remove(&self.lesson_id);
        }
    }
}

pub type PendingToggle = Pending<SetLessonCompleted>;

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub completed: usize,
    pub total: usize,
    /// Floored, so 100 means every lesson is done.
    pub percent: u8,
}

/// Local mirror of the learner's progress.
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    completed: BTreeSet<String>,
    attempt_counts: BTreeMap<String, u32>,
    submission_history: BTreeMap<String, Vec<AttemptSummary>>,
    source: ProgressSource,
}

impl ProgressStore {
    /// Initial progress for a freshly fetched course. The progress endpoint
    /// wins whenever a user id is known; the legacy course field is only
    /// consulted when no fetch was made. The two are never merged.
    pub async fn load(api: &dyn CourseApi, ctx: &LearnerContext, course: &CourseDocument) -> ProgressStore {
        let mut store = ProgressStore::default();
        if ctx.user_id().is_some() {
            store.refresh(api, ctx).await;
        } else if let Some(ids) = &course.completed_lessons {
            store.completed = ids.iter().cloned().collect();
            store.source = ProgressSource::CourseDocument;
        }
        store
    }

    pub fn from_snapshot(snapshot: ProgressSnapshot) -> ProgressStore {
        let mut store = ProgressStore::default();
        store.replace(snapshot);
        store
    }

    pub fn replace(&mut self, snapshot: ProgressSnapshot) {
        self.completed = snapshot.completed_lesson_ids.into_iter().collect();
        self.attempt_counts = snapshot.attempt_counts;
        self.submission_history = snapshot.submission_history;
        self.source = ProgressSource::Remote;
    }

    /// Refetches progress. A failed refresh leaves the cached state alone.
    pub async fn refresh(&mut self, api: &dyn CourseApi, ctx: &LearnerContext) -> bool {
        let Some(user_id) = ctx.user_id() else {
            tracing::debug!(course_id = %ctx.course_id, "no user id, skipping progress fetch");
            return false;
        };
        match api.fetch_progress(&ctx.course_id, user_id).await {
            Ok(snapshot) => {
                self.replace(snapshot);
                true
            }
            Err(e) => {
                tracing::warn!(course_id = %ctx.course_id, error = %e, "progress fetch failed");
                false
            }
        }
    }

    pub fn source(&self) -> ProgressSource {
        self.source
    }

    pub fn completed_lesson_ids(&self) -> &BTreeSet<String> {
        &self.completed
    }

    pub fn is_completed(&self, lesson_id: &str) -> bool {
        self.completed.contains(lesson_id)
    }

    pub fn attempt_count(&self, assessment_id: &str) -> u32 {
        self.attempt_counts.get(assessment_id).copied().unwrap_or(0)
    }

    pub fn history(&self, assessment_id: &str) -> &[AttemptSummary] {
        self.submission_history
            .get(assessment_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Flips the lesson locally and returns the change to persist. The
    /// local set always reflects the latest click, even with earlier
    /// requests still in flight.
    pub fn begin_toggle(&mut self, lesson_id: &str) -> PendingToggle {
        let completed = !self.completed.contains(lesson_id);
        self.begin_set(lesson_id, completed)
    }

    /// Sets the lesson to an explicit state locally, for callers that track
    /// the learner's intent themselves.
    pub fn begin_set(&mut self, lesson_id: &str, completed: bool) -> PendingToggle {
        let mutation = SetLessonCompleted {
            lesson_id: lesson_id.to_string(),
            completed,
        };
        Pending::apply(mutation, &mut self.completed)
    }

    /// Applies the remote outcome of an earlier `begin_toggle`. A success
    /// body never overwrites the local set.
    pub fn settle_toggle(&mut self, pending: PendingToggle, outcome: Result<(), ApiError>) -> bool {
        pending.settle(&mut self.completed, outcome)
    }

    /// Optimistic toggle: flip, persist, roll back on failure. Without a
    /// user id nothing changes. Returns whether the change was persisted.
    pub async fn toggle_lesson_completion(
        &mut self,
        api: &dyn CourseApi,
        ctx: &LearnerContext,
        lesson_id: &str,
    ) -> bool {
        let completed = !self.is_completed(lesson_id);
        self.set_lesson_completion(api, ctx, lesson_id, completed).await
    }

    /// Like `toggle_lesson_completion`, with the desired state given.
    pub async fn set_lesson_completion(
        &mut self,
        api: &dyn CourseApi,
        ctx: &LearnerContext,
        lesson_id: &str,
        completed: bool,
    ) -> bool {
        let Some(user_id) = ctx.user_id() else {
            tracing::debug!(lesson_id, "no user id, lesson completion not changed");
            return false;
        };
        let pending = self.begin_set(lesson_id, completed);
        let outcome = persist_lesson_completion(api, ctx, user_id, pending.mutation()).await;
        self.settle_toggle(pending, outcome)
    }

    /// Completion over the lesson items of the course only.
    pub fn lesson_progress(&self, items: &[PlayerItem]) -> LessonProgress {
        let lessons = items.iter().filter(|i| i.is_lesson());
        let (mut completed, mut total) = (0, 0);
        for lesson in lessons {
            total += 1;
            if self.completed.contains(&lesson.id) {
                completed += 1;
            }
        }
        let percent = if total == 0 { 0 } else { (completed * 100 / total) as u8 };
        LessonProgress {
            completed,
            total,
            percent,
        }
    }
}

/// Sends one completion change to the course API.
pub async fn persist_lesson_completion(
    api: &dyn CourseApi,
    ctx: &LearnerContext,
    user_id: &str,
    change: &SetLessonCompleted,
) -> Result<(), ApiError> {
    let req = LessonCompletionReq {
        lesson_id: change.lesson_id.clone(),
        completed: change.completed,
        user_id: user_id.to_string(),
    };
    api.set_lesson_completion(&ctx.course_id, &req).await
}
