use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use crate::models::ExternalId;

/// Name of the cookie carrying the learner's session record.
pub const SESSION_COOKIE: &str = "player_session";

/// The locally persisted session record, `{ "id": ... }`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SessionRecord {
    #[serde(default)]
    pub id: Option<ExternalId>,
}

impl SessionRecord {
    /// Parses a percent-encoded JSON cookie value. Anything unreadable is
    /// treated as no session.
    pub fn from_cookie_value(raw: &str) -> Option<SessionRecord> {
        let decoded = percent_decode_str(raw).decode_utf8().ok()?;
        match serde_json::from_str(&decoded) {
            Ok(rec) => Some(rec),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed session record");
                None
            }
        }
    }

    pub fn user_id(&self) -> Option<String> {
        self.id
            .clone()
            .map(ExternalId::into_string)
            .filter(|id| !id.trim().is_empty())
    }
}

/// Who is playing which course. A missing user id means calls that need one
/// are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnerContext {
    pub course_id: String,
    pub user_id: Option<String>,
}

impl LearnerContext {
    pub fn new(course_id: impl Into<String>, session: Option<&SessionRecord>) -> Self {
        LearnerContext {
            course_id: course_id.into(),
            user_id: session.and_then(SessionRecord::user_id),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}
