pub mod jwt;

pub use jwt::{JwtKeys, extract_bearer};
