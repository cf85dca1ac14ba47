use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::CourseApi;
use crate::assessment::{AssessmentAttempt, AttemptInfo, OpenAttempt};
use crate::completion;
use crate::curriculum::{self, CurriculumStats, ItemKey, ItemType, PlayerItem};
use crate::error::{AttemptError, PlayerError};
use crate::models::{CourseDocument, EnrollmentStatus, EvaluationMode, SavedAnswer};
use crate::progress::{LessonProgress, ProgressStore};
use crate::session::LearnerContext;
use crate::slug::{self, PlayerRoute};

/// Set while the player is mounted. Loading checks it after every await and
/// stops writing state once it is cleared.
#[derive(Debug, Clone)]
pub struct ActiveFlag(Arc<AtomicBool>);

impl ActiveFlag {
    pub fn new() -> Self {
        ActiveFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn deactivate(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for ActiveFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of navigating to a player URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Enrollment does not open the curriculum.
    Locked,
    /// No path and nothing to play.
    Empty,
    /// No path given; go to this URL instead.
    Redirect(String),
    Selected(ItemKey),
    /// The path matched nothing; selection is unchanged.
    NotFound,
}

/// Everything the course player needs, owned by whoever drives it.
#[derive(Debug)]
pub struct PlayerSession {
    ctx: LearnerContext,
    title: Option<String>,
    items: Vec<PlayerItem>,
    stats: CurriculumStats,
    enrollment: Option<EnrollmentStatus>,
    evaluation_mode: Option<EvaluationMode>,
    progress: ProgressStore,
    selected: Option<ItemKey>,
    expanded_modules: BTreeSet<String>,
    attempts: BTreeMap<String, AssessmentAttempt>,
    completion_open: bool,
    finish_error: Option<String>,
}

impl PlayerSession {
    /// Fetches the course, then the learner's progress. Only a failed course
    /// fetch is an error; progress problems degrade to empty progress.
    pub async fn load(api: &dyn CourseApi, ctx: LearnerContext, active: &ActiveFlag) -> Result<Self, PlayerError> {
        let course = match api.fetch_course(&ctx.course_id, ctx.user_id()).await {
            Ok(course) => course,
            Err(source) => {
                tracing::error!(course_id = %ctx.course_id, error = %source, "course fetch failed");
                return Err(PlayerError::Unavailable {
                    course_id: ctx.course_id,
                    source,
                });
            }
        };
        if !active.is_active() {
            return Err(PlayerError::Cancelled);
        }

        let progress = ProgressStore::load(api, &ctx, &course).await;
        if !active.is_active() {
            return Err(PlayerError::Cancelled);
        }

        let session = Self::from_parts(ctx, course, progress);
        tracing::info!(
            course_id = %session.ctx.course_id,
            items = session.items.len(),
            progress = ?session.progress.source(),
            "player loaded"
        );
        Ok(session)
    }

    pub fn from_parts(ctx: LearnerContext, course: CourseDocument, progress: ProgressStore) -> Self {
        PlayerSession {
            items: curriculum::flatten(&course.curriculum),
            stats: curriculum::stats(&course.curriculum),
            title: course.title,
            enrollment: course.enrollment_status,
            evaluation_mode: course.evaluation_mode,
            ctx,
            progress,
            selected: None,
            expanded_modules: BTreeSet::new(),
            attempts: BTreeMap::new(),
            completion_open: false,
            finish_error: None,
        }
    }

    pub fn context(&self) -> &LearnerContext {
        &self.ctx
    }

    pub fn items(&self) -> &[PlayerItem] {
        &self.items
    }

    pub fn stats(&self) -> CurriculumStats {
        self.stats
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    pub fn enrollment(&self) -> Option<EnrollmentStatus> {
        self.enrollment
    }

    pub fn is_unlocked(&self) -> bool {
        EnrollmentStatus::unlocks_curriculum(self.enrollment)
    }

    pub fn expanded_modules(&self) -> &BTreeSet<String> {
        &self.expanded_modules
    }

    pub fn item(&self, key: &ItemKey) -> Option<&PlayerItem> {
        self.items.iter().find(|i| &i.key == key)
    }

    pub fn selected_item(&self) -> Option<&PlayerItem> {
        self.selected.as_ref().and_then(|k| self.item(k))
    }

    /// `/player/<course>/<canonical path>`.
    pub fn item_url(&self, item: &PlayerItem) -> Option<String> {
        let path = slug::canonical_path(item)?;
        Some(format!("{}/{}", self.base_url(), path))
    }

    pub fn base_url(&self) -> String {
        format!(
            "/player/{}",
            utf8_percent_encode(&self.ctx.course_id, NON_ALPHANUMERIC)
        )
    }

    /// Handles a player URL given as path segments after the course id.
    pub fn navigate<S: AsRef<str>>(&mut self, segments: &[S]) -> Navigation {
        if !self.is_unlocked() {
            return Navigation::Locked;
        }
        if segments.iter().all(|s| s.as_ref().is_empty()) {
            let Some(target) = slug::redirect_target(&self.items, self.progress.completed_lesson_ids()) else {
                return Navigation::Empty;
            };
            let module_id = target.module_id.clone();
            let Some(url) = self.item_url(target) else {
                return Navigation::Empty;
            };
            if let Some(module_id) = module_id {
                self.expanded_modules.insert(module_id);
            }
            return Navigation::Redirect(url);
        }

        let found = PlayerRoute::parse(segments).and_then(|route| slug::resolve(&self.items, &route));
        match found.map(|item| item.key.clone()) {
            Some(key) => {
                self.select(&key);
                Navigation::Selected(key)
            }
            None => {
                tracing::debug!(course_id = %self.ctx.course_id, "player path matched no item");
                Navigation::NotFound
            }
        }
    }

    /// Selects an item by key and reveals its module in the sidebar.
    pub fn select(&mut self, key: &ItemKey) -> Option<&PlayerItem> {
        let idx = self.items.iter().position(|i| &i.key == key)?;
        if let Some(module_id) = &self.items[idx].module_id {
            self.expanded_modules.insert(module_id.clone());
        }
        self.selected = Some(key.clone());
        Some(&self.items[idx])
    }

    fn selected_index(&self) -> Option<usize> {
        let key = self.selected.as_ref()?;
        self.items.iter().position(|i| &i.key == key)
    }

    pub fn next_item(&self) -> Option<&PlayerItem> {
        self.items.get(self.selected_index()? + 1)
    }

    pub fn previous_item(&self) -> Option<&PlayerItem> {
        let idx = self.selected_index()?;
        idx.checked_sub(1).and_then(|i| self.items.get(i))
    }

    pub fn toggle_module(&mut self, module_id: &str) {
        if !self.expanded_modules.remove(module_id) {
            self.expanded_modules.insert(module_id.to_string());
        }
    }

    pub fn lesson_progress(&self) -> LessonProgress {
        self.progress.lesson_progress(&self.items)
    }

    pub fn show_finish_button(&self) -> bool {
        completion::show_finish_button(self.evaluation_mode, self.enrollment, self.lesson_progress().percent)
    }

    pub async fn toggle_lesson_completion(&mut self, api: &dyn CourseApi, lesson_id: &str) -> bool {
        self.progress.toggle_lesson_completion(api, &self.ctx, lesson_id).await
    }

    pub async fn set_lesson_completion(&mut self, api: &dyn CourseApi, lesson_id: &str, completed: bool) -> bool {
        self.progress
            .set_lesson_completion(api, &self.ctx, lesson_id, completed)
            .await
    }

    /// Finishes the course when eligible. The success dialog opens at once;
    /// a failure closes it again and leaves a message for the learner.
    pub async fn finish_course(&mut self, api: &dyn CourseApi) -> bool {
        if !self.show_finish_button() {
            return false;
        }
        self.completion_open = true;
        self.finish_error = None;
        let finished = completion::finish_course(api, &self.ctx, &mut self.enrollment).await;
        if !finished {
            self.completion_open = false;
            self.finish_error = Some("We could not record your course completion. Please try again.".into());
        }
        finished
    }

    pub fn completion_open(&self) -> bool {
        self.completion_open
    }

    pub fn finish_error(&self) -> Option<&str> {
        self.finish_error.as_deref()
    }

    fn assessment_item(&self, assessment_id: &str) -> Option<&PlayerItem> {
        self.items
            .iter()
            .find(|i| i.kind != ItemType::Lesson && i.id == assessment_id)
    }

    pub fn attempt(&self, assessment_id: &str) -> Option<&AssessmentAttempt> {
        self.attempts.get(assessment_id)
    }

    pub fn attempt_info(&self, assessment_id: &str) -> Option<AttemptInfo> {
        let item = self.assessment_item(assessment_id)?;
        let max = item.details().and_then(|d| d.max_attempts);
        Some(AttemptInfo::new(&self.progress, assessment_id, max))
    }

    pub async fn start_assessment(
        &mut self,
        api: &dyn CourseApi,
        assessment_id: &str,
    ) -> Result<OpenAttempt, AttemptError> {
        if self.assessment_item(assessment_id).is_none() {
            return Err(AttemptError::UnknownAssessment(assessment_id.to_string()));
        }
        let attempt = self
            .attempts
            .entry(assessment_id.to_string())
            .or_insert_with(|| AssessmentAttempt::new(assessment_id));
        attempt.start(api, &self.ctx).await
    }

    /// Re-attaches to a submission the caller already holds, after checking
    /// the assessment belongs to this course.
    pub fn resume_attempt(&mut self, assessment_id: &str, submission_id: &str) -> Result<(), AttemptError> {
        if self.assessment_item(assessment_id).is_none() {
            return Err(AttemptError::UnknownAssessment(assessment_id.to_string()));
        }
        self.attempts.insert(
            assessment_id.to_string(),
            AssessmentAttempt::in_progress(assessment_id, submission_id),
        );
        Ok(())
    }

    pub async fn save_answer(
        &mut self,
        api: &dyn CourseApi,
        assessment_id: &str,
        answer: SavedAnswer,
    ) -> Result<bool, AttemptError> {
        let attempt = self
            .attempts
            .get_mut(assessment_id)
            .ok_or_else(|| AttemptError::UnknownAssessment(assessment_id.to_string()))?;
        attempt.save_answer(api, answer).await
    }

    pub async fn submit_assessment(
        &mut self,
        api: &dyn CourseApi,
        assessment_id: &str,
        answers: Option<Vec<SavedAnswer>>,
    ) -> Option<serde_json::Value> {
        let attempt = self.attempts.get_mut(assessment_id)?;
        attempt.submit(api, &self.ctx, &mut self.progress, answers).await
    }

    pub fn retry_assessment(&mut self, assessment_id: &str) {
        if let Some(attempt) = self.attempts.get_mut(assessment_id) {
            attempt.retry();
        }
    }

    pub fn view(&self) -> PlayerView<'_> {
        let selected = self.selected_item();
        PlayerView {
            course_id: &self.ctx.course_id,
            title: self.title.as_deref(),
            enrollment_status: self.enrollment,
            stats: self.stats,
            items: &self.items,
            selected,
            attempt: selected
                .filter(|i| i.kind != ItemType::Lesson)
                .and_then(|i| self.attempt_info(&i.id)),
            previous_url: self.previous_item().and_then(|i| self.item_url(i)),
            next_url: self.next_item().and_then(|i| self.item_url(i)),
            expanded_modules: &self.expanded_modules,
            completed_lesson_ids: self.progress.completed_lesson_ids(),
            progress: self.lesson_progress(),
            show_finish_button: self.show_finish_button(),
            completion_open: self.completion_open,
            finish_error: self.finish_error.as_deref(),
        }
    }
}

/// Serializable snapshot of the player for the shell.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView<'a> {
    pub course_id: &'a str,
    pub title: Option<&'a str>,
    pub enrollment_status: Option<EnrollmentStatus>,
    pub stats: CurriculumStats,
    pub items: &'a [PlayerItem],
    pub selected: Option<&'a PlayerItem>,
    pub attempt: Option<AttemptInfo>,
    pub previous_url: Option<String>,
    pub next_url: Option<String>,
    pub expanded_modules: &'a BTreeSet<String>,
    pub completed_lesson_ids: &'a BTreeSet<String>,
    pub progress: LessonProgress,
    pub show_finish_button: bool,
    pub completion_open: bool,
    pub finish_error: Option<&'a str>,
}
