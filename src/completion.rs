use crate::api::CourseApi;
use crate::models::{EnrollmentStatus, EvaluationMode, FinishCourseReq};
use crate::optimistic::{apply_and_persist, Mutation};
use crate::session::LearnerContext;

/// Whether the learner may finish the course themselves: lesson-evaluated
/// course, active enrollment, every lesson done.
pub fn show_finish_button(
    mode: Option<EvaluationMode>,
    status: Option<EnrollmentStatus>,
    lesson_percent: u8,
) -> bool {
    mode == Some(EvaluationMode::Lessons)
        && status == Some(EnrollmentStatus::Active)
        && lesson_percent == 100
}

pub struct SetEnrollment(pub Option<EnrollmentStatus>);

impl Mutation for SetEnrollment {
    type Target = Option<EnrollmentStatus>;
    type Undo = Option<EnrollmentStatus>;

    fn apply(&self, status: &mut Option<EnrollmentStatus>) -> Option<EnrollmentStatus> {
        std::mem::replace(status, self.0)
    }

    fn revert(&self, status: &mut Option<EnrollmentStatus>, previous: Option<EnrollmentStatus>) {
        *status = previous;
    }
}

/// Marks the enrollment completed right away, then asks the server to
/// finish the course. On failure the previous status comes back. Without a
/// user id nothing happens.
pub async fn finish_course(
    api: &dyn CourseApi,
    ctx: &LearnerContext,
    enrollment: &mut Option<EnrollmentStatus>,
) -> bool {
    let Some(user_id) = ctx.user_id() else {
        tracing::debug!(course_id = %ctx.course_id, "no user id, not finishing course");
        return false;
    };
    let req = FinishCourseReq {
        user_id: user_id.to_string(),
    };
    let finished = apply_and_persist(
        enrollment,
        SetEnrollment(Some(EnrollmentStatus::Completed)),
        api.finish_course(&ctx.course_id, &req),
    )
    .await;
    if finished {
        tracing::info!(course_id = %ctx.course_id, "course finished");
    }
    finished
}
