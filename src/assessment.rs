use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::api::CourseApi;
use crate::error::AttemptError;
use crate::models::{SavedAnswer, StartAssessmentReq, SubmitAssessmentReq};
use crate::progress::ProgressStore;
use crate::session::LearnerContext;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AttemptPhase {
    NotStarted,
    InProgress,
    Submitted,
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttemptPhase::NotStarted => "not started",
            AttemptPhase::InProgress => "in progress",
            AttemptPhase::Submitted => "submitted",
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenAttempt {
    pub submission_id: String,
    pub resumed: bool,
    /// Latest local answer per question id.
    pub answers: BTreeMap<String, SavedAnswer>,
    /// Questions whose last autosave did not reach the server.
    pub unsaved: BTreeSet<String>,
}

impl OpenAttempt {
    fn new(submission_id: String, resumed: bool, answers: Vec<SavedAnswer>) -> Self {
        OpenAttempt {
            submission_id,
            resumed,
            answers: answers
                .into_iter()
                .map(|a| (a.question_id.clone(), a))
                .collect(),
            unsaved: BTreeSet::new(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum AttemptState {
    NotStarted,
    InProgress(OpenAttempt),
    Submitted {
        #[serde(rename = "submissionId")]
        submission_id: String,
        result: serde_json::Value,
    },
}

/// Lifecycle of one attempt at an assessment:
/// not started, in progress (autosaving), submitted.
///
/// Attempt counts are never tracked here; they come back from the server
/// with every progress refresh.
#[derive(Debug, Clone)]
pub struct AssessmentAttempt {
    assessment_id: String,
    state: AttemptState,
}

impl AssessmentAttempt {
    pub fn new(assessment_id: impl Into<String>) -> Self {
        AssessmentAttempt {
            assessment_id: assessment_id.into(),
            state: AttemptState::NotStarted,
        }
    }

    /// Re-attaches to a submission the caller already holds an id for.
    pub fn in_progress(assessment_id: impl Into<String>, submission_id: impl Into<String>) -> Self {
        AssessmentAttempt {
            assessment_id: assessment_id.into(),
            state: AttemptState::InProgress(OpenAttempt::new(submission_id.into(), true, Vec::new())),
        }
    }

    pub fn assessment_id(&self) -> &str {
        &self.assessment_id
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    pub fn phase(&self) -> AttemptPhase {
        match self.state {
            AttemptState::NotStarted => AttemptPhase::NotStarted,
            AttemptState::InProgress(_) => AttemptPhase::InProgress,
            AttemptState::Submitted { .. } => AttemptPhase::Submitted,
        }
    }

    pub fn submission_id(&self) -> Option<&str> {
        match &self.state {
            AttemptState::NotStarted => None,
            AttemptState::InProgress(open) => Some(&open.submission_id),
            AttemptState::Submitted { submission_id, .. } => Some(submission_id),
        }
    }

    pub fn open(&self) -> Option<&OpenAttempt> {
        match &self.state {
            AttemptState::InProgress(open) => Some(open),
            _ => None,
        }
    }

    /// Starts a new attempt or resumes the open one. When the server says
    /// the attempt is resumed, saved answers are fetched before the attempt
    /// counts as in progress. On failure the attempt stays not started.
    pub async fn start(&mut self, api: &dyn CourseApi, ctx: &LearnerContext) -> Result<OpenAttempt, AttemptError> {
        if self.phase() != AttemptPhase::NotStarted {
            return Err(AttemptError::InvalidTransition {
                action: "start",
                phase: self.phase(),
            });
        }
        let user_id = ctx.user_id().ok_or(AttemptError::NoLearner)?;
        let req = StartAssessmentReq {
            user_id: user_id.to_string(),
            course_id: ctx.course_id.clone(),
        };
        let resp = api.start_assessment(&self.assessment_id, &req).await.map_err(|e| {
            tracing::warn!(assessment_id = %self.assessment_id, error = %e, "assessment start failed");
            e
        })?;

        let mut answers = resp.saved_answers.unwrap_or_default();
        if resp.is_resumed {
            match api.fetch_saved_answers(&resp.submission_id).await {
                Ok(saved) => answers = saved,
                Err(e) => tracing::warn!(
                    submission_id = %resp.submission_id,
                    error = %e,
                    "could not load saved answers for resumed attempt"
                ),
            }
        }
        tracing::info!(
            assessment_id = %self.assessment_id,
            submission_id = %resp.submission_id,
            resumed = resp.is_resumed,
            answers = answers.len(),
            "attempt in progress"
        );

        let open = OpenAttempt::new(resp.submission_id, resp.is_resumed, answers);
        self.state = AttemptState::InProgress(open.clone());
        Ok(open)
    }

    /// Records one answer locally and autosaves it. A failed autosave is
    /// logged and marks the question unsaved; it never fails the call.
    /// Returns whether the answer reached the server.
    pub async fn save_answer(&mut self, api: &dyn CourseApi, answer: SavedAnswer) -> Result<bool, AttemptError> {
        let phase = self.phase();
        let AttemptState::InProgress(open) = &mut self.state else {
            return Err(AttemptError::InvalidTransition {
                action: "save an answer to",
                phase,
            });
        };
        let question_id = answer.question_id.clone();
        let outcome = api.save_answer(&open.submission_id, &answer).await;
        open.answers.insert(question_id.clone(), answer);
        match outcome {
            Ok(()) => {
                open.unsaved.remove(&question_id);
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(
                    submission_id = %open.submission_id,
                    question_id = %question_id,
                    error = %e,
                    "autosave failed"
                );
                open.unsaved.insert(question_id);
                Ok(false)
            }
        }
    }

    /// Submits the attempt. Without explicit `answers` the server grades what
    /// was autosaved, unless some autosave failed, in which case the full
    /// local answer set goes along. Every successful submit refetches
    /// progress, pass or fail. On failure the attempt stays in progress and
    /// `None` comes back.
    pub async fn submit(
        &mut self,
        api: &dyn CourseApi,
        ctx: &LearnerContext,
        progress: &mut ProgressStore,
        answers: Option<Vec<SavedAnswer>>,
    ) -> Option<serde_json::Value> {
        let AttemptState::InProgress(open) = &self.state else {
            tracing::warn!(assessment_id = %self.assessment_id, phase = %self.phase(), "submit ignored");
            return None;
        };
        let answers = answers.or_else(|| {
            (!open.unsaved.is_empty()).then(|| open.answers.values().cloned().collect())
        });
        let submission_id = open.submission_id.clone();

        let result = match api
            .submit_assessment(&submission_id, &SubmitAssessmentReq { answers })
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(submission_id = %submission_id, error = %e, "submit failed, attempt still open");
                return None;
            }
        };

        tracing::info!(assessment_id = %self.assessment_id, submission_id = %submission_id, "attempt submitted");
        self.state = AttemptState::Submitted {
            submission_id,
            result: result.clone(),
        };
        progress.refresh(api, ctx).await;
        Some(result)
    }

    /// Drops the current submission so a fresh `start` can begin a new
    /// attempt. Attempt limits are enforced by the server, not here.
    pub fn retry(&mut self) {
        self.state = AttemptState::NotStarted;
    }
}

/// Attempt bookkeeping surfaced to the quiz UI.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptInfo {
    pub attempts_used: u32,
    pub attempts_remaining: Option<u32>,
    pub history: Vec<crate::models::AttemptSummary>,
}

impl AttemptInfo {
    pub fn new(progress: &ProgressStore, assessment_id: &str, max_attempts: Option<u32>) -> Self {
        let used = progress.attempt_count(assessment_id);
        AttemptInfo {
            attempts_used: used,
            attempts_remaining: max_attempts.map(|max| max.saturating_sub(used)),
            history: progress.history(assessment_id).to_vec(),
        }
    }
}
