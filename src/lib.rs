pub mod api;
pub mod assessment;
pub mod completion;
pub mod config;
pub mod curriculum;
pub mod error;
pub mod models;
pub mod optimistic;
pub mod player;
pub mod progress;
pub mod routes;
pub mod session;
pub mod slug;

pub use api::{CourseApi, HttpCourseApi};
pub use error::{ApiError, AttemptError, PlayerError};
pub use player::{ActiveFlag, Navigation, PlayerSession};
