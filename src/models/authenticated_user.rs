use actix_web::{dev::Payload, http::header::AUTHORIZATION, web, FromRequest, HttpRequest};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::error::AppError;
use crate::models::auth_jwt_claims::{AuthenticatedSubject, Role};
use crate::services::auth::jwt::{extract_bearer, JwtKeys};

/// Caller of an HTTP endpoint, verified from the `Authorization: Bearer` header.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub role: Role,
}

impl AuthenticatedUser {
    /// Dashboards and other non-device accounts.
    pub fn require_observer(&self) -> Result<(), AppError> {
        if self.role.is_device() {
            Err(AppError::Forbidden("Device accounts cannot use this endpoint".to_string()))
        } else {
            Ok(())
        }
    }

    pub fn require_device(&self) -> Result<(), AppError> {
        if self.role.is_device() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Device role required".to_string()))
        }
    }
}

impl From<AuthenticatedSubject> for AuthenticatedUser {
    fn from(subject: AuthenticatedSubject) -> Self {
        Self {
            user_id: subject.subject_id,
            role: subject.role,
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let Some(keys) = req.app_data::<web::Data<JwtKeys>>() else {
            return ready(Err(AppError::Configuration(
                "JWT keys are not registered with the application".to_string(),
            )));
        };

        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let result = match extract_bearer(None, header) {
            Some(token) => keys.validate(&token).map(AuthenticatedUser::from),
            None => Err(AppError::Auth("Missing bearer credential".to_string())),
        };

        ready(result)
    }
}
