//! Caller identity and course-ownership checks.

mod guard;
pub mod token;

pub use guard::{
    AuthorizedPlan, CallerIdentity, GenerationRequest, authorize, authorize_request,
    resolve_caller,
};
pub use token::{TokenConfig, TokenError, generate_token, validate_token};
