pub mod config;
pub mod layer;

pub use config::CacheConfig;
pub use layer::CacheLayer;
