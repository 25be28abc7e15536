//! Scraper registry loading
//!
//! Maps scraper names to their script and the parameter names the script
//! accepts. Tasks referencing a name absent from the registry are rejected at
//! the task boundary.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::Deserialize;

/// One registered scraper
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperEntry {
    /// Path to the executable scraper script
    pub script: PathBuf,

    /// Parameter names the script accepts; anything else in a task's
    /// parameter map is dropped at invocation time
    #[serde(default)]
    pub accepted_parameters: Vec<String>,
}

/// The scraper registry, read-only after load
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScraperRegistry {
    #[serde(default)]
    pub scrapers: HashMap<String, ScraperEntry>,
}

impl ScraperRegistry {
    /// Load the registry file. Missing or malformed files are fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read scraper registry {}", path.display()))?;
        let registry: Self = serde_yaml::from_str(&content)
            .context(format!("Failed to parse scraper registry {}", path.display()))?;
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&ScraperEntry> {
        self.scrapers.get(name)
    }

    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }
}
