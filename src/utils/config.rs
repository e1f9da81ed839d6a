use std::env;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::CatalogError;
use crate::similarity::{IdfFormula, SimilarityPolicy};

const KEY_DB_PATH: &str = "CATALOG_DB_PATH";
const KEY_SIMILARITY: &str = "CATALOG_SIMILARITY";
const KEY_IDF: &str = "CATALOG_IDF";
const KEY_EXTENDED: &str = "CATALOG_EXTENDED_CATEGORIES";
const KEY_RELATED_CACHE: &str = "CATALOG_RELATED_CACHE";

const KEYS: [&str; 5] = [
    KEY_DB_PATH,
    KEY_SIMILARITY,
    KEY_IDF,
    KEY_EXTENDED,
    KEY_RELATED_CACHE,
];

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    pub db_path: PathBuf,
    pub similarity: SimilarityPolicy,
    pub idf: IdfFormula,
    /// Weigh tags by their fine-grained category where one is recorded.
    pub extended_categories: bool,
    /// Entries kept by the related-items memo.
    pub related_cache_capacity: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("catalog.db"),
            similarity: SimilarityPolicy::default(),
            idf: IdfFormula::default(),
            extended_categories: false,
            related_cache_capacity: 256,
        }
    }
}

impl CatalogConfig {
    /// Applies one `KEY=value` pair. Unknown keys are ignored; an unusable
    /// value is reported and leaves the current setting in place.
    fn apply(&mut self, key: &str, value: &str) -> std::result::Result<(), CatalogError> {
        let value = value.trim();
        let unusable = || CatalogError::Config(format!("unusable value {}={:?}", key, value));
        match key {
            KEY_DB_PATH if !value.is_empty() => self.db_path = PathBuf::from(value),
            KEY_SIMILARITY => {
                self.similarity = SimilarityPolicy::parse(value).ok_or_else(unusable)?
            }
            KEY_IDF => self.idf = IdfFormula::parse(value).ok_or_else(unusable)?,
            KEY_EXTENDED => {
                self.extended_categories = match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" => false,
                    _ => return Err(unusable()),
                }
            }
            KEY_RELATED_CACHE => {
                self.related_cache_capacity = value
                    .parse::<usize>()
                    .ok()
                    .filter(|&capacity| capacity > 0)
                    .ok_or_else(unusable)?
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_or_warn(&mut self, key: &str, value: &str) {
        if let Err(e) = self.apply(key, value) {
            warn!("Ignoring {}", e);
        }
    }
}

/// Main entry point for configuration.
/// Starts from defaults, applies .env if present, then process environment.
pub fn load_config() -> Result<CatalogConfig> {
    let env_path = Path::new(".env");

    let mut config = if env_path.exists() {
        let config = load_from_env(env_path)?;
        info!("Loaded catalog settings from .env");
        config
    } else {
        CatalogConfig::default()
    };

    for key in KEYS {
        if let Ok(value) = env::var(key) {
            config.apply_or_warn(key, &value);
        }
    }
    Ok(config)
}

/// Reads settings from a dotenv file on top of the defaults.
pub fn load_from_env(path: &Path) -> Result<CatalogConfig> {
    let mut config = CatalogConfig::default();
    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    for entry in entries {
        let (key, value) = entry.with_context(|| format!("Malformed line in {}", path.display()))?;
        config.apply_or_warn(&key, &value);
    }
    Ok(config)
}

pub fn save_config(path: &Path, config: &CatalogConfig) -> Result<()> {
    let mut file = File::create(path).context("Failed to create .env file")?;
    writeln!(file, "{}={}", KEY_DB_PATH, config.db_path.display())?;
    writeln!(file, "{}={}", KEY_SIMILARITY, config.similarity.as_str())?;
    writeln!(file, "{}={}", KEY_IDF, config.idf.as_str())?;
    writeln!(file, "{}={}", KEY_EXTENDED, config.extended_categories)?;
    writeln!(file, "{}={}", KEY_RELATED_CACHE, config.related_cache_capacity)?;
    Ok(())
}
