pub mod config;
pub mod error;
pub mod provider;
pub mod schema;
pub mod store;

pub use config::{CACHE_FILE, CONFIG_FILE, LuminaraConfig, default_base_dir};
pub use error::{Result, StoreError};
pub use provider::PersistentProvider;
pub use store::{PositionStore, StoreStats};
