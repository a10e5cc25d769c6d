mod api;
mod identity;

pub use api::{
    HealthResponse, LoginRequest, LoginResponse, SessionResponse, StatsResponse, UserProfile,
};
pub use identity::{Claims, Identity};
