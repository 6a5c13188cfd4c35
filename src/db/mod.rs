pub mod connection;
pub mod presence_store;
pub mod repositories;

pub use connection::{create_pool, verify_connection};
pub use presence_store::{InMemoryPresenceStore, PresenceStore};
pub use repositories::PgPresenceStore;
