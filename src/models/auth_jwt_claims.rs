use serde::{Deserialize, Serialize};

/// JWT claims issued by the login service and presented by devices and dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Account role ("CLIENT" for display devices, "ADMIN" for dashboards)
    pub role: String,
    /// Expiration time (as UTC timestamp)
    pub exp: usize,
    /// Issued at (as UTC timestamp)
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, rename = "loginId", skip_serializing_if = "Option::is_none")]
    pub login_id: Option<String>,
}

/// Role carried by an authenticated subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Client,
    Admin,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "CLIENT" | "DEVICE" => Role::Client,
            "ADMIN" => Role::Admin,
            _ => Role::Other(raw.to_string()),
        }
    }

    pub fn is_device(&self) -> bool {
        matches!(self, Role::Client)
    }
}

/// Identity extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedSubject {
    pub subject_id: String,
    pub role: Role,
}

impl From<Claims> for AuthenticatedSubject {
    fn from(claims: Claims) -> Self {
        Self {
            role: Role::parse(&claims.role),
            subject_id: claims.sub,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::parse("CLIENT"), Role::Client);
        assert_eq!(Role::parse("client"), Role::Client);
        assert_eq!(Role::parse("ADMIN"), Role::Admin);
        assert_eq!(Role::parse("EDITOR"), Role::Other("EDITOR".to_string()));
        assert!(Role::parse("Client").is_device());
        assert!(!Role::parse("ADMIN").is_device());
    }

    #[test]
    fn test_claims_accept_login_id() {
        let claims: Claims = serde_json::from_value(serde_json::json!({
            "sub": "user-1",
            "role": "CLIENT",
            "exp": 2_000_000_000usize,
            "iat": 1_700_000_000usize,
            "loginId": "lobby-screen"
        }))
        .unwrap();

        assert_eq!(claims.login_id.as_deref(), Some("lobby-screen"));
        assert!(claims.email.is_none());

        let subject = AuthenticatedSubject::from(claims);
        assert_eq!(subject.subject_id, "user-1");
        assert_eq!(subject.role, Role::Client);
    }
}
