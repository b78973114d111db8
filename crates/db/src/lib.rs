pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_store, connect_with_settings, DbPool};
pub use fixtures::{SeedDataset, SeedResult};
