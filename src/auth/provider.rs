//! Connection authentication seam
//!
//! The accept path only needs to turn a bearer token into a [`User`]. JWT is
//! the built-in implementation; anything else can plug in behind the trait.

use async_trait::async_trait;
use std::sync::Arc;

use crate::auth::user::User;
use crate::error::Result;

/// Resolves the credential presented at upgrade time
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate a token and return the user it belongs to
    async fn authenticate_connection(&self, token: &str) -> Result<User>;
}

pub type SharedAuthenticator = Arc<dyn Authenticator>;
