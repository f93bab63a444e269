//! The authentication engine: login state machine, session lifecycle and
//! the role/permission query surface.

mod core;
mod errors;
mod scheduler;
mod types;

pub use self::core::AuthClient;
pub use errors::AuthError;
pub use types::{
    AuthorizationRequest, CallbackData, CallbackOutcome, LoginInitiation, LoginRequest,
};
