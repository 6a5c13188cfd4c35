pub mod auth_jwt_claims;
pub mod authenticated_user;
pub mod presence;
pub mod protocol;

pub use auth_jwt_claims::{AuthenticatedSubject, Claims, Role};
pub use authenticated_user::AuthenticatedUser;
pub use presence::DevicePresenceRecord;
