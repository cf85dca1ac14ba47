use http::StatusCode;
use thiserror::Error;

use crate::assessment::AttemptPhase;

/// Failure talking to the remote course API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("course api transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("course api responded with {status}")]
    Status { status: StatusCode },
    #[error("course api rejected the request: {0}")]
    Rejected(String),
}

/// Errors that block the player as a whole.
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("course {course_id} is unavailable: {source}")]
    Unavailable {
        course_id: String,
        #[source]
        source: ApiError,
    },
    #[error("player was unmounted before loading finished")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("no signed-in learner")]
    NoLearner,
    #[error("assessment {0} is not part of this course")]
    UnknownAssessment(String),
    #[error("cannot {action} an attempt that is {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: AttemptPhase,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}
