use serde::{Deserialize, Serialize};

/// Represents an authenticated user as seen by the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: String,
    /// Username for display
    pub username: String,
    /// Email address (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Team the user follows (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite_team: Option<String>,
    /// Avatar URL (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

impl User {
    /// Creates a new user with basic information
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: None,
            favorite_team: None,
            avatar_url: None,
            is_admin: false,
        }
    }

    /// Marks the user as an administrator
    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}
