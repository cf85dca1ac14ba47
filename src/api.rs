use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::ApiError;
use crate::models::*;

/// The remote course/assessment API, the store of record for progress and
/// submissions.
#[async_trait]
pub trait CourseApi: Send + Sync {
    async fn fetch_course(&self, course_id: &str, user_id: Option<&str>) -> Result<CourseDocument, ApiError>;

    async fn fetch_progress(&self, course_id: &str, user_id: &str) -> Result<ProgressSnapshot, ApiError>;

    /// The response body is deliberately not returned.
    async fn set_lesson_completion(&self, course_id: &str, req: &LessonCompletionReq) -> Result<(), ApiError>;

    async fn start_assessment(
        &self,
        assessment_id: &str,
        req: &StartAssessmentReq,
    ) -> Result<StartAssessmentResp, ApiError>;

    async fn fetch_saved_answers(&self, submission_id: &str) -> Result<Vec<SavedAnswer>, ApiError>;

    async fn save_answer(&self, submission_id: &str, answer: &SavedAnswer) -> Result<(), ApiError>;

    /// Returns the grading result untouched.
    async fn submit_assessment(
        &self,
        submission_id: &str,
        req: &SubmitAssessmentReq,
    ) -> Result<serde_json::Value, ApiError>;

    async fn finish_course(&self, course_id: &str, req: &FinishCourseReq) -> Result<(), ApiError>;
}

// Path segments keep only unreserved characters verbatim.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

#[derive(Clone, Debug)]
pub struct HttpCourseApi {
    http: Client,
    base_url: String,
}

impl HttpCourseApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for seg in path {
            url.push('/');
            url.extend(utf8_percent_encode(seg, SEGMENT));
        }
        url
    }

    async fn send(&self, rb: RequestBuilder) -> Result<Response, ApiError> {
        let res = rb.send().await?;
        let status = res.status();
        if !status.is_success() {
            tracing::debug!(%status, url = %res.url(), "course api returned non-OK");
            return Err(ApiError::Status { status });
        }
        Ok(res)
    }

    async fn send_json<T: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<T, ApiError> {
        Ok(self.send(rb).await?.json::<T>().await?)
    }
}

#[async_trait]
impl CourseApi for HttpCourseApi {
    async fn fetch_course(&self, course_id: &str, user_id: Option<&str>) -> Result<CourseDocument, ApiError> {
        let mut rb = self.http.get(self.url(&["api", "courses", course_id]));
        if let Some(uid) = user_id {
            rb = rb.query(&[("userId", uid)]);
        }
        self.send_json(rb).await
    }

    async fn fetch_progress(&self, course_id: &str, user_id: &str) -> Result<ProgressSnapshot, ApiError> {
        let rb = self
            .http
            .get(self.url(&["api", "courses", course_id, "progress"]))
            .query(&[("userId", user_id)]);
        self.send_json(rb).await
    }

    async fn set_lesson_completion(&self, course_id: &str, req: &LessonCompletionReq) -> Result<(), ApiError> {
        let rb = self
            .http
            .post(self.url(&["api", "courses", course_id, "lesson-completion"]))
            .json(req);
        self.send(rb).await.map(|_| ())
    }

    async fn start_assessment(
        &self,
        assessment_id: &str,
        req: &StartAssessmentReq,
    ) -> Result<StartAssessmentResp, ApiError> {
        let rb = self
            .http
            .post(self.url(&["api", "assessments", assessment_id, "start"]))
            .json(req);
        self.send_json(rb).await
    }

    async fn fetch_saved_answers(&self, submission_id: &str) -> Result<Vec<SavedAnswer>, ApiError> {
        let rb = self
            .http
            .get(self.url(&["api", "assessments", "submission", submission_id, "answers"]));
        let body: SavedAnswersResp = self.send_json(rb).await?;
        Ok(body.answers)
    }

    async fn save_answer(&self, submission_id: &str, answer: &SavedAnswer) -> Result<(), ApiError> {
        let rb = self
            .http
            .put(self.url(&["api", "assessments", "submission", submission_id, "save"]))
            .json(answer);
        self.send(rb).await.map(|_| ())
    }

    async fn submit_assessment(
        &self,
        submission_id: &str,
        req: &SubmitAssessmentReq,
    ) -> Result<serde_json::Value, ApiError> {
        let rb = self
            .http
            .post(self.url(&["api", "assessments", "submission", submission_id, "submit"]))
            .json(req);
        let body = self.send(rb).await?.bytes().await?;
        Ok(opaque_body(&body))
    }

    async fn finish_course(&self, course_id: &str, req: &FinishCourseReq) -> Result<(), ApiError> {
        let rb = self
            .http
            .post(self.url(&["api", "courses", course_id, "finish-course"]))
            .json(req);
        let body: FinishCourseResp = self.send_json(rb).await?;
        if body.success {
            Ok(())
        } else {
            Err(ApiError::Rejected(
                body.error.unwrap_or_else(|| "finish-course was not accepted".into()),
            ))
        }
    }
}

/// A graded submission is accepted whatever its body looks like: empty bodies
/// become `null` and non-JSON bodies are passed through as text.
fn opaque_body(body: &[u8]) -> serde_json::Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(body).into_owned()))
}
