use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use course_player_runtime::routes::{router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

mod common;
use common::{course_json, MockCourseApi, Op};

const COOKIE: &str = "player_session=%7B%22id%22%3A%22u1%22%7D";

fn app(api: &Arc<MockCourseApi>) -> Router {
    router(AppState { api: api.clone() })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, COOKIE)
        .body(Body::empty())
        .unwrap()
}

fn send_json(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, COOKIE)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(res: axum::response::Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn bare_player_url_redirects_to_resume_point() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));
    api.set_completed(&["B"]);

    let res = app(&api).oneshot(get("/player/c1")).await.unwrap();

    assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        res.headers().get(header::LOCATION).unwrap(),
        "/player/c1/module/intro/lesson/beta"
    );
}

#[tokio::test]
async fn player_path_returns_selected_item() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));

    let res = app(&api)
        .oneshot(get("/player/c1/module/intro/assessment/checkpoint"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let view = body_json(res).await;
    assert_eq!(view["selected"]["id"], "C");
    assert_eq!(view["attempt"]["attemptsRemaining"], 2);
    assert_eq!(view["previousUrl"], "/player/c1/module/intro/lesson/beta");
    assert_eq!(view["nextUrl"], "/player/c1/assessment/final-exam");
}

#[tokio::test]
async fn locked_enrollment_is_forbidden() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("pending"))));
    let res = app(&api).oneshot(get("/player/c1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_course_is_unavailable() {
    let api = Arc::new(MockCourseApi::default());
    let res = app(&api).oneshot(get("/player/c1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn toggle_requires_session_cookie() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/player/c1/lessons/B/toggle")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"completed":true}"#))
        .unwrap();

    let res = app(&api).oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn toggle_marks_lesson_and_reports_progress() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));
    api.set_completed(&["A"]);

    let res = app(&api)
        .oneshot(send_json(
            Method::POST,
            "/api/player/c1/lessons/B/toggle",
            json!({ "completed": true }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["completed"], true);
    assert_eq!(body["persisted"], true);
    assert_eq!(body["progress"]["percent"], 100);
    assert_eq!(body["showFinishButton"], true);
}

#[tokio::test]
async fn overlapping_toggles_follow_the_latest_click() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));
    let uri = "/api/player/c1/lessons/B/toggle";

    // the client flips B on, then off again, before either request lands
    let (on, off) = tokio::join!(
        app(&api).oneshot(send_json(Method::POST, uri, json!({ "completed": true }))),
        app(&api).oneshot(send_json(Method::POST, uri, json!({ "completed": false }))),
    );
    assert_eq!(on.unwrap().status(), StatusCode::OK);
    assert_eq!(off.unwrap().status(), StatusCode::OK);

    // both intents reach the server; the last one to land wins
    let sent: Vec<bool> = api
        .calls()
        .into_iter()
        .filter(|c| c.op == Op::LessonCompletion)
        .map(|c| c.body["completed"].as_bool().unwrap())
        .collect();
    assert_eq!(sent.len(), 2);
    assert!(sent.contains(&true) && sent.contains(&false));
    let server_has_b = api
        .progress
        .lock()
        .unwrap()
        .completed_lesson_ids
        .contains(&"B".to_string());
    assert_eq!(server_has_b, sent[1]);
}

#[tokio::test]
async fn toggle_without_desired_state_is_rejected() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));
    let res = app(&api)
        .oneshot(send_json(Method::POST, "/api/player/c1/lessons/B/toggle", json!({})))
        .await
        .unwrap();
    assert!(res.status().is_client_error());
    assert_eq!(api.count(Op::LessonCompletion), 0);
}

#[tokio::test]
async fn toggle_of_unknown_lesson_is_not_found() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));
    let res = app(&api)
        .oneshot(send_json(
            Method::POST,
            "/api/player/c1/lessons/C/toggle",
            json!({ "completed": true }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(api.count(Op::LessonCompletion), 0);
}

#[tokio::test]
async fn assessment_start_save_submit() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));

    let res = app(&api)
        .oneshot(send_json(Method::POST, "/api/player/c1/assessments/C/start", Value::Null))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let started = body_json(res).await;
    assert_eq!(started["submissionId"], "sub-1");
    assert_eq!(started["isResumed"], false);

    let res = app(&api)
        .oneshot(send_json(
            Method::PUT,
            "/api/player/c1/assessments/C/submissions/sub-1/answers",
            json!({ "questionId": "q1", "response": true, "questionType": "trueFalse" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["saved"], true);

    let res = app(&api)
        .oneshot(send_json(
            Method::POST,
            "/api/player/c1/assessments/C/submissions/sub-1/submit",
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let submitted = body_json(res).await;
    assert_eq!(submitted["result"]["passed"], true);
    assert_eq!(submitted["attemptsUsed"], 1);
    assert_eq!(submitted["history"].as_array().unwrap().len(), 1);

    let ops = api.ops();
    assert_eq!(ops.last(), Some(&Op::FetchProgress));
}

#[tokio::test]
async fn answers_for_foreign_assessment_are_not_found() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));

    let res = app(&api)
        .oneshot(send_json(
            Method::PUT,
            "/api/player/c1/assessments/other/submissions/sub-1/answers",
            json!({ "questionId": "q1", "response": true }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(api.count(Op::SaveAnswer), 0);
}

#[tokio::test]
async fn submit_on_locked_enrollment_is_forbidden() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("expired"))));

    let res = app(&api)
        .oneshot(send_json(
            Method::POST,
            "/api/player/c1/assessments/C/submissions/sub-1/submit",
            json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(api.count(Op::Submit), 0);
}

#[tokio::test]
async fn failed_submit_is_bad_gateway() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));
    api.fail(Op::Submit);

    let res = app(&api)
        .oneshot(send_json(
            Method::POST,
            "/api/player/c1/assessments/C/submissions/sub-9/submit",
            json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    // only the load; no refetch after a failed submit
    assert_eq!(api.count(Op::FetchProgress), 1);
}

#[tokio::test]
async fn finish_before_all_lessons_is_conflict() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));
    api.set_completed(&["A"]);

    let res = app(&api)
        .oneshot(send_json(Method::POST, "/api/player/c1/finish", Value::Null))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(api.count(Op::Finish), 0);
}

#[tokio::test]
async fn finish_completes_enrollment() {
    let api = Arc::new(MockCourseApi::with_course(course_json(Some("active"))));
    api.set_completed(&["A", "B"]);

    let res = app(&api)
        .oneshot(send_json(Method::POST, "/api/player/c1/finish", Value::Null))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["finished"], true);
    assert_eq!(body["enrollmentStatus"], "completed");
}
