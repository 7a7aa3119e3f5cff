//! Authentication module

pub mod provider;
pub mod token;
pub mod user;

// Re-export main components
pub use provider::{Authenticator, SharedAuthenticator};
pub use token::{extract_bearer_token, Claims, TokenManager};
pub use user::User;
