//! Request and response models for the API.
//!
//! All models use serde for serialization/deserialization.
//! Storage models represent the data kept by the account and revocation stores.

use serde::{Deserialize, Serialize};

// ============================================================================
// Auth Models
// ============================================================================

/// Credentials presented to `/auth/login`.
///
/// Accepts both `{username, password}` and `{identifier, secret}`.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "identifier")]
    pub username: String,
    #[serde(alias = "secret")]
    pub password: String,
}

/// New account presented to `/auth/register`.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Token issued by login, register and refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token_type: &'static str,
    pub token: String,
    pub username: String,
    pub expires_at: u64,
}

// ============================================================================
// Admin Models
// ============================================================================

/// Query string for the admin user listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

/// One page of accounts.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub items: Vec<UserInfo>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

/// Public view of an account. Never carries the password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub created_at: u64,
    pub updated_at: Option<u64>,
}

impl From<StoredUser> for UserInfo {
    fn from(user: StoredUser) -> Self {
        UserInfo {
            id: user.id,
            username: user.username,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Response after rotating the signing key.
#[derive(Debug, Serialize)]
pub struct RotateKeyResponse {
    pub kid: String,
}

// ============================================================================
// Storage Models
// ============================================================================

/// Account data as stored.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredUser {
    pub id: String,
    pub username: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub role: Role,
    pub created_at: u64,
    pub updated_at: Option<u64>,
}

impl std::fmt::Debug for StoredUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredUser")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// A token invalidated before its natural expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    pub token_id: String,
    pub subject: String,
    pub revoked_at: u64,
    /// Natural expiry of the revoked token; the entry is useless after this.
    pub expires_at: u64,
}

// ============================================================================
// User Roles
// ============================================================================

/// User role types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_format() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
        let role: Role = serde_json::from_str("\"USER\"").unwrap();
        assert_eq!(role, Role::User);
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_login_request_accepts_identifier_alias() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"identifier":"alice","secret":"correct-horse"}"#).unwrap();
        assert_eq!(req.username, "alice");
        assert_eq!(req.password, "correct-horse");
    }

    #[test]
    fn test_stored_user_debug_redacts_hash() {
        let user = StoredUser {
            id: "abc".to_string(),
            username: "alice".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            role: Role::User,
            created_at: 1,
            updated_at: None,
        };
        let debug = format!("{:?}", user);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("argon2id"));
    }

    #[test]
    fn test_auth_response_is_camel_case() {
        let resp = AuthResponse {
            token_type: "Bearer",
            token: "t".to_string(),
            username: "alice".to_string(),
            expires_at: 42,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["tokenType"], "Bearer");
        assert_eq!(json["expiresAt"], 42);
    }
}
