use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::provider::Authenticator;
use crate::auth::user::User;
use crate::error::{HubError, Result};

/// Default token lifetime
const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Username
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    /// Session id
    pub sid: String,
    /// Unique token id
    pub jti: String,
    /// Expiration time (as UTC timestamp)
    pub exp: i64,
    /// Issued at (as UTC timestamp)
    pub iat: i64,
    /// Not before (as UTC timestamp)
    pub nbf: i64,
}

impl Claims {
    /// Creates new claims for a user, valid for 24 hours
    pub fn new(user: &User) -> Self {
        Self::with_ttl(user, Duration::hours(DEFAULT_TOKEN_TTL_HOURS))
    }

    /// Creates claims with a custom lifetime
    pub fn with_ttl(user: &User, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user.id.clone(),
            username: user.username.clone(),
            is_admin: user.is_admin,
            sid: Uuid::new_v4().to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: now + ttl.num_seconds(),
            iat: now,
            nbf: now,
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    /// The user the token was issued for
    pub fn to_user(&self) -> User {
        let user = User::new(self.sub.clone(), self.username.clone());
        if self.is_admin {
            user.admin()
        } else {
            user
        }
    }
}

/// Manages JWT token operations (HS512)
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenManager {
    /// Creates a new token manager with a secret
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;
        validation.validate_nbf = true;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Signs the given claims
    pub fn encode_claims(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS512), claims, &self.encoding_key)
            .map_err(|e| HubError::AuthError(format!("Failed to generate token: {}", e)))
    }

    /// Issues a token for a user with the default lifetime
    pub fn generate_token(&self, user: &User) -> Result<String> {
        self.encode_claims(&Claims::new(user))
    }

    /// Validates and decodes a JWT token
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        Ok(decode::<Claims>(token, &self.decoding_key, &self.validation)?)
    }

    /// Extracts claims from a token string
    pub fn get_claims(&self, token: &str) -> Result<Claims> {
        let token_data = self.validate_token(token)?;
        if token_data.claims.sub.is_empty() || token_data.claims.username.is_empty() {
            return Err(HubError::AuthError("Token is missing its subject".to_string()));
        }
        Ok(token_data.claims)
    }
}

#[async_trait]
impl Authenticator for TokenManager {
    async fn authenticate_connection(&self, token: &str) -> Result<User> {
        Ok(self.get_claims(token)?.to_user())
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<String> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
