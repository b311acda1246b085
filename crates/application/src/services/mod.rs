mod realtime_service;
mod user_service;

pub use realtime_service::{RealtimeService, RealtimeServiceDependencies};
pub use user_service::{
    AuthenticateUserRequest, RegisterUserRequest, UserService, UserServiceDependencies,
};

#[cfg(test)]
mod realtime_service_tests;
