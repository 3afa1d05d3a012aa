// ⚙️ Pipeline configuration (county-housing.toml)
// Every key is optional; missing keys fall back to the standard data/ layout.

use crate::affordability::AffordabilityRule;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "county-housing.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    /// Write the six cleaned tables as CSV next to the database
    pub export_csv: bool,
    pub database_path: PathBuf,
    pub sources: SourceFiles,
    pub affordability: AffordabilityRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFiles {
    pub unemployment: SourceFile,
    pub population: SourceFile,
    pub bottom_tier_prices: SourceFile,
    pub top_tier_prices: SourceFile,
}

/// A CSV export under `raw_dir`, with the caption rows above its header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub file: PathBuf,
    #[serde(default)]
    pub skip_rows: usize,
}

impl SourceFile {
    pub fn new(file: &str, skip_rows: usize) -> Self {
        SourceFile {
            file: PathBuf::from(file),
            skip_rows,
        }
    }
}

impl Default for SourceFiles {
    fn default() -> Self {
        SourceFiles {
            unemployment: SourceFile::new("Unemployment2023.csv", 4),
            population: SourceFile::new("2024_pop_county.csv", 3),
            bottom_tier_prices: SourceFile::new("bottom_tier_prices_county.csv", 0),
            top_tier_prices: SourceFile::new("top_tier_prices_county.csv", 0),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            export_csv: true,
            database_path: PathBuf::from("data/housing_market.db"),
            sources: SourceFiles::default(),
            affordability: AffordabilityRule::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(text).context("Invalid pipeline config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("In config file '{}'", path.display()))
    }

    /// Explicit path, else ./county-housing.toml if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    log::info!("Using {}", local.display());
                    Self::load(local)
                } else {
                    log::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Absolute file names are used as given
    pub fn source_path(&self, source: &SourceFile) -> PathBuf {
        self.raw_dir.join(&source.file)
    }

    pub fn validate(&self) -> Result<()> {
        self.affordability
            .validate()
            .context("Invalid [affordability] section")?;

        let sources = &self.sources;
        for (key, source) in [
            ("unemployment", &sources.unemployment),
            ("population", &sources.population),
            ("bottom_tier_prices", &sources.bottom_tier_prices),
            ("top_tier_prices", &sources.top_tier_prices),
        ] {
            ensure!(
                !source.file.as_os_str().is_empty(),
                "[sources.{}] file must not be empty",
                key
            );
        }

        ensure!(
            !self.database_path.as_os_str().is_empty(),
            "database_path must not be empty"
        );

        Ok(())
    }
}
