pub mod config;

pub use config::{load_config, load_from_env, save_config, CatalogConfig};
