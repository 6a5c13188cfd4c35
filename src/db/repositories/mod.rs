pub mod client_presence_repository;

pub use client_presence_repository::PgPresenceStore;
