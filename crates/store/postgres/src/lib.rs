pub mod config;
pub mod migrations;
pub mod sql;
pub mod store;

pub use config::PostgresLogConfig;
pub use store::{PgEntity, PostgresLogStore, connect};
