use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::{headers::Cookie, TypedHeader};
use serde_json::json;
use std::sync::Arc;

use crate::{
    api::CourseApi,
    error::{AttemptError, PlayerError},
    models::{SavedAnswer, SetCompletionReq, SubmitAssessmentReq},
    player::{ActiveFlag, Navigation, PlayerSession},
    session::{LearnerContext, SessionRecord, SESSION_COOKIE},
};

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn CourseApi>,
}

type HttpResult<T> = Result<T, (StatusCode, String)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        // player navigation
        .route("/player/:course_id", get(player_root))
        .route("/player/:course_id/*path", get(player_path))
        // progress
        .route("/api/player/:course_id/lessons/:lesson_id/toggle", post(toggle_lesson))
        .route("/api/player/:course_id/finish", post(finish_course))
        // assessment lifecycle
        .route(
            "/api/player/:course_id/assessments/:assessment_id/start",
            post(start_assessment),
        )
        .route(
            "/api/player/:course_id/assessments/:assessment_id/submissions/:submission_id/answers",
            put(save_answer),
        )
        .route(
            "/api/player/:course_id/assessments/:assessment_id/submissions/:submission_id/submit",
            post(submit_assessment),
        )
        .with_state(state)
}

fn learner(course_id: &str, cookies: Option<TypedHeader<Cookie>>) -> LearnerContext {
    let record = cookies
        .as_ref()
        .and_then(|TypedHeader(c)| c.get(SESSION_COOKIE))
        .and_then(SessionRecord::from_cookie_value);
    LearnerContext::new(course_id, record.as_ref())
}

fn signed_in(ctx: LearnerContext) -> HttpResult<LearnerContext> {
    if ctx.user_id().is_none() {
        return Err(e401("sign in to continue"));
    }
    Ok(ctx)
}

async fn load(st: &AppState, ctx: LearnerContext) -> HttpResult<PlayerSession> {
    // A request has no unmount of its own; dropping the future cancels it.
    let session = PlayerSession::load(st.api.as_ref(), ctx, &ActiveFlag::new())
        .await
        .map_err(e503::<PlayerError>)?;
    if !session.is_unlocked() {
        return Err(e403(format!(
            "enrollment status {:?} does not open this course",
            session.enrollment()
        )));
    }
    Ok(session)
}

// --- navigation ---

async fn player_root(
    State(st): State<AppState>,
    Path(course_id): Path<String>,
    cookies: Option<TypedHeader<Cookie>>,
) -> HttpResult<Response> {
    let mut session = load(&st, learner(&course_id, cookies)).await?;
    respond(&mut session, &[])
}

async fn player_path(
    State(st): State<AppState>,
    Path((course_id, path)): Path<(String, String)>,
    cookies: Option<TypedHeader<Cookie>>,
) -> HttpResult<Response> {
    let mut session = load(&st, learner(&course_id, cookies)).await?;
    let segments: Vec<&str> = path.split('/').collect();
    respond(&mut session, &segments)
}

fn respond(session: &mut PlayerSession, segments: &[&str]) -> HttpResult<Response> {
    match session.navigate(segments) {
        Navigation::Redirect(url) => Ok(Redirect::temporary(&url).into_response()),
        Navigation::Locked => Err(e403("enrollment does not open this course")),
        Navigation::Empty | Navigation::Selected(_) | Navigation::NotFound => {
            Ok(Json(session.view()).into_response())
        }
    }
}

// --- progress ---

async fn toggle_lesson(
    State(st): State<AppState>,
    Path((course_id, lesson_id)): Path<(String, String)>,
    cookies: Option<TypedHeader<Cookie>>,
    Json(req): Json<SetCompletionReq>,
) -> HttpResult<Json<serde_json::Value>> {
    let ctx = signed_in(learner(&course_id, cookies))?;
    let mut session = load(&st, ctx).await?;
    if !session.items().iter().any(|i| i.is_lesson() && i.id == lesson_id) {
        return Err(e404("lesson not found in this course"));
    }

    // desired state from the client's optimistic view, never a flip
    let persisted = session
        .set_lesson_completion(st.api.as_ref(), &lesson_id, req.completed)
        .await;
    Ok(Json(json!({
        "lessonId": lesson_id,
        "completed": session.progress().is_completed(&lesson_id),
        "persisted": persisted,
        "progress": session.lesson_progress(),
        "showFinishButton": session.show_finish_button(),
    })))
}

async fn finish_course(
    State(st): State<AppState>,
    Path(course_id): Path<String>,
    cookies: Option<TypedHeader<Cookie>>,
) -> HttpResult<Json<serde_json::Value>> {
    let ctx = signed_in(learner(&course_id, cookies))?;
    let mut session = load(&st, ctx).await?;
    if !session.show_finish_button() {
        return Err((StatusCode::CONFLICT, "course is not ready to be finished".into()));
    }
    if !session.finish_course(st.api.as_ref()).await {
        let msg = session.finish_error().unwrap_or("finish-course failed").to_string();
        return Err(e502(msg));
    }
    Ok(Json(json!({
        "finished": true,
        "enrollmentStatus": session.enrollment(),
    })))
}

// --- assessments ---

async fn start_assessment(
    State(st): State<AppState>,
    Path((course_id, assessment_id)): Path<(String, String)>,
    cookies: Option<TypedHeader<Cookie>>,
) -> HttpResult<Json<serde_json::Value>> {
    let ctx = signed_in(learner(&course_id, cookies))?;
    let mut session = load(&st, ctx).await?;
    let open = session
        .start_assessment(st.api.as_ref(), &assessment_id)
        .await
        .map_err(attempt_err)?;

    Ok(Json(json!({
        "submissionId": open.submission_id,
        "isResumed": open.resumed,
        "answers": open.answers.values().collect::<Vec<_>>(),
        "attempt": session.attempt_info(&assessment_id),
    })))
}

async fn save_answer(
    State(st): State<AppState>,
    Path((course_id, assessment_id, submission_id)): Path<(String, String, String)>,
    cookies: Option<TypedHeader<Cookie>>,
    Json(answer): Json<SavedAnswer>,
) -> HttpResult<Json<serde_json::Value>> {
    let ctx = signed_in(learner(&course_id, cookies))?;
    let mut session = load(&st, ctx).await?;
    session
        .resume_attempt(&assessment_id, &submission_id)
        .map_err(attempt_err)?;
    let saved = session
        .save_answer(st.api.as_ref(), &assessment_id, answer)
        .await
        .map_err(attempt_err)?;
    Ok(Json(json!({ "saved": saved })))
}

async fn submit_assessment(
    State(st): State<AppState>,
    Path((course_id, assessment_id, submission_id)): Path<(String, String, String)>,
    cookies: Option<TypedHeader<Cookie>>,
    Json(req): Json<SubmitAssessmentReq>,
) -> HttpResult<Json<serde_json::Value>> {
    let ctx = signed_in(learner(&course_id, cookies))?;
    let mut session = load(&st, ctx).await?;
    session
        .resume_attempt(&assessment_id, &submission_id)
        .map_err(attempt_err)?;

    let Some(result) = session
        .submit_assessment(st.api.as_ref(), &assessment_id, req.answers)
        .await
    else {
        return Err(e502("submission failed, please try again"));
    };

    let progress = session.progress();
    Ok(Json(json!({
        "result": result,
        "attemptsUsed": progress.attempt_count(&assessment_id),
        "attempt": session.attempt_info(&assessment_id),
        "history": progress.history(&assessment_id),
        "completedLessonIds": progress.completed_lesson_ids(),
    })))
}

// --- helpers ---

fn attempt_err(e: AttemptError) -> (StatusCode, String) {
    match e {
        AttemptError::NoLearner => e401(e.to_string()),
        AttemptError::UnknownAssessment(_) => e404(e.to_string()),
        AttemptError::InvalidTransition { .. } => (StatusCode::CONFLICT, e.to_string()),
        AttemptError::Api(_) => e502(e.to_string()),
    }
}

fn e401<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, msg.into())
}

fn e403<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::FORBIDDEN, msg.into())
}

fn e404<T: Into<String>>(msg: T) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, msg.into())
}

fn e502<T: Into<String>>(msg: T) -> (StatusCode, String) {
    let msg = msg.into();
    tracing::warn!(error = %msg, "upstream operation failed");
    (StatusCode::BAD_GATEWAY, msg)
}

fn e503<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    tracing::error!(error = %e, "course unavailable");
    (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
}
