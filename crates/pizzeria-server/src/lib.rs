pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod serializers;
pub mod server;

pub use config::{AppConfig, LoggingConfig, PostgresStorageConfig, ServerConfig, StorageConfig};
pub use observability::init_tracing;
pub use serializers::Serializer;
pub use server::{AppState, PizzeriaServer, ServerBuilder, build_app};
