mod auth;
mod health;
mod users;

pub use auth::{login, session};
pub use health::{health_check, readiness_check, stats};
pub use users::{get_user, me};
