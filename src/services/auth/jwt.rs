use crate::error::AppError;
use crate::models::auth_jwt_claims::{AuthenticatedSubject, Claims};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::{debug, trace, warn};

/// HS256 keys shared with the login service that issues tokens.
#[derive(Clone)]
pub struct JwtKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: Option<String>,
}

impl JwtKeys {
    pub fn from_secret(jwt_secret: &str, issuer: Option<String>) -> Self {
        let secret = jwt_secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer,
        }
    }

    /// Verify signature and expiry, then extract subject and role.
    pub fn validate(&self, token: &str) -> Result<AuthenticatedSubject, AppError> {
        trace!("Verifying JWT token");

        if token.trim().is_empty() {
            return Err(AppError::Auth("Missing credential".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // No clock tolerance on `exp`.
        validation.leeway = 0;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|err| {
            warn!("JWT validation failed: {}", err);
            match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Auth("Token has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    AppError::Auth("Invalid token format".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AppError::Auth("Invalid token signature".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                    AppError::Auth("Invalid token issuer".to_string())
                }
                jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(claim) => {
                    AppError::Auth(format!("Token missing required claim: {}", claim))
                }
                _ => AppError::Auth(format!("Token validation failed: {:?}", err.kind())),
            }
        })?;

        if token_data.claims.sub.is_empty() {
            return Err(AppError::Auth("Token has an empty subject".to_string()));
        }

        debug!("JWT token verified for subject {}", token_data.claims.sub);
        Ok(token_data.claims.into())
    }

    /// Sign a token with the shared secret. Used by the issuing side and tests.
    pub fn create_token(
        &self,
        subject_id: &str,
        role: &str,
        duration: Duration,
    ) -> Result<String, AppError> {
        let iat = Utc::now();
        let exp = iat + duration;

        let claims = Claims {
            sub: subject_id.to_string(),
            role: role.to_string(),
            exp: exp.timestamp().max(0) as usize,
            iat: iat.timestamp() as usize,
            iss: self.issuer.clone(),
            email: None,
            login_id: None,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token creation failed: {}", e)))
    }
}

/// Pick the bearer credential from a handshake: the explicit auth field wins,
/// otherwise an `Authorization: Bearer <token>` style header.
pub fn extract_bearer(auth_field: Option<&str>, header: Option<&str>) -> Option<String> {
    if let Some(token) = auth_field.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    let header = header?.trim();
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?
        .trim();

    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn keys() -> JwtKeys {
        JwtKeys::from_secret("test-secret", None)
    }

    #[test]
    fn test_round_trip_extracts_subject_and_role() {
        let keys = keys();
        let token = keys.create_token("user-42", "CLIENT", Duration::hours(1)).unwrap();

        let subject = keys.validate(&token).unwrap();
        assert_eq!(subject.subject_id, "user-42");
        assert_eq!(subject.role, Role::Client);
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = keys();
        let token = keys.create_token("user-42", "CLIENT", Duration::hours(-2)).unwrap();

        match keys.validate(&token) {
            Err(AppError::Auth(msg)) => assert_eq!(msg, "Token has expired"),
            other => panic!("expected expiry failure, got {:?}", other.map(|s| s.subject_id)),
        }
    }

    #[test]
    fn test_recently_expired_token_is_rejected() {
        let keys = keys();
        let token = keys.create_token("user-42", "CLIENT", Duration::seconds(-5)).unwrap();

        assert!(matches!(
            keys.validate(&token),
            Err(AppError::Auth(msg)) if msg == "Token has expired"
        ));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = JwtKeys::from_secret("other-secret", None)
            .create_token("user-42", "ADMIN", Duration::hours(1))
            .unwrap();
        assert!(matches!(keys().validate(&token), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_malformed_and_empty_tokens_are_rejected() {
        assert!(matches!(keys().validate("not-a-jwt"), Err(AppError::Auth(_))));
        assert!(matches!(keys().validate(""), Err(AppError::Auth(_))));
    }

    #[test]
    fn test_issuer_is_enforced_when_configured() {
        let strict = JwtKeys::from_secret("test-secret", Some("signage".to_string()));
        let foreign = keys().create_token("user-1", "ADMIN", Duration::hours(1)).unwrap();
        assert!(strict.validate(&foreign).is_err());

        let own = strict.create_token("user-1", "ADMIN", Duration::hours(1)).unwrap();
        assert!(strict.validate(&own).is_ok());
    }

    #[test]
    fn test_extract_bearer_prefers_auth_field() {
        assert_eq!(
            extract_bearer(Some("field-token"), Some("Bearer header-token")).as_deref(),
            Some("field-token")
        );
        assert_eq!(
            extract_bearer(None, Some("Bearer header-token")).as_deref(),
            Some("header-token")
        );
        assert_eq!(
            extract_bearer(Some("  "), Some("Bearer header-token")).as_deref(),
            Some("header-token")
        );
        assert_eq!(extract_bearer(None, Some("Basic abc")), None);
        assert_eq!(extract_bearer(None, Some("Bearer ")), None);
        assert_eq!(extract_bearer(None, None), None);
    }
}
