// 🔄 Pipeline - raw source files → cleaned tables → SQLite
//
// read_sources → clean_tables → export_csv (optional) → rebuild_tables →
// record_load_run

use crate::affordability::compute_affordability;
use crate::config::PipelineConfig;
use crate::db::{
    rebuild_tables, record_load_run, table_counts, LoadRun, SourceFingerprint, TableCount,
};
use crate::fips::{CountyKeyIndex, MatchStats};
use crate::records::CleanedData;
use crate::reshape::WideTable;
use crate::sources::{
    clean_housing, clean_population, clean_unemployment, RegionConflict, UnemploymentStats,
};
use crate::trends::{annual_averages, price_trends};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const COUNTIES_CSV: &str = "counties_clean.csv";
pub const ECONOMIC_CSV: &str = "economic_annual_clean.csv";
pub const POPULATION_CSV: &str = "population_annual_clean.csv";
pub const HOUSING_MONTHLY_CSV: &str = "housing_prices_monthly_clean.csv";
pub const AFFORDABILITY_CSV: &str = "housing_affordability_clean.csv";
pub const TRENDS_CSV: &str = "price_trends_annual_clean.csv";

// ============================================================================
// REPORTS
// ============================================================================

/// The four raw tables, read and header-split
pub struct SourceTables {
    pub unemployment: WideTable,
    pub population: WideTable,
    pub bottom_tier: WideTable,
    pub top_tier: WideTable,
    /// Hashes of the exact bytes the tables were parsed from
    pub fingerprints: Vec<SourceFingerprint>,
}

/// How well each source lined up with the county master list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationSummary {
    pub unemployment: UnemploymentStats,
    pub population: MatchStats,
    pub housing: MatchStats,
    pub housing_matched_by_code: usize,
    pub region_conflicts: Vec<RegionConflict>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub database_path: PathBuf,
    pub table_counts: Vec<TableCount>,
    pub reconciliation: ReconciliationSummary,
    pub sources: Vec<SourceFingerprint>,
    /// Directory the processed CSVs went to, when exported
    pub exported_to: Option<PathBuf>,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn source_paths(&self) -> [PathBuf; 4] {
        let sources = &self.config.sources;
        [
            self.config.source_path(&sources.unemployment),
            self.config.source_path(&sources.population),
            self.config.source_path(&sources.bottom_tier_prices),
            self.config.source_path(&sources.top_tier_prices),
        ]
    }

    pub fn read_sources(&self) -> Result<SourceTables> {
        let sources = &self.config.sources;
        let [unemployment, population, bottom, top] = self.source_paths();

        let (unemployment, unemployment_print) =
            read_source(&unemployment, sources.unemployment.skip_rows)?;
        let (population, population_print) =
            read_source(&population, sources.population.skip_rows)?;
        let (bottom_tier, bottom_print) = read_source(&bottom, sources.bottom_tier_prices.skip_rows)?;
        let (top_tier, top_print) = read_source(&top, sources.top_tier_prices.skip_rows)?;

        Ok(SourceTables {
            unemployment,
            population,
            bottom_tier,
            top_tier,
            fingerprints: vec![unemployment_print, population_print, bottom_print, top_print],
        })
    }

    /// No I/O: every table is derived from the in-memory sources
    pub fn clean_tables(&self, sources: &SourceTables) -> Result<(CleanedData, ReconciliationSummary)> {
        let unemployment = clean_unemployment(&sources.unemployment)
            .context("Failed to clean unemployment source")?;
        let index = CountyKeyIndex::build(&unemployment.counties);

        let population = clean_population(&sources.population, &index)
            .context("Failed to clean population source")?;
        let housing = clean_housing(&sources.bottom_tier, &sources.top_tier, &index)
            .context("Failed to clean housing sources")?;

        let annual = annual_averages(&housing.monthly);
        let affordability = compute_affordability(&annual, &self.config.affordability);
        let trends = price_trends(&annual);

        let data = CleanedData {
            counties: unemployment.counties,
            economic: unemployment.economic,
            population: population.records,
            housing_monthly: housing.monthly,
            affordability,
            trends,
        };

        let summary = ReconciliationSummary {
            unemployment: unemployment.stats,
            population: population.matching,
            housing: housing.matching,
            housing_matched_by_code: housing.matched_by_code,
            region_conflicts: housing.conflicts,
        };

        Ok((data, summary))
    }

    pub fn run(&self) -> Result<PipelineReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        log::info!("Pipeline run {} started", run_id);

        let sources = self.read_sources()?;
        let fingerprints = sources.fingerprints.clone();

        let (data, reconciliation) = self.clean_tables(&sources)?;

        let exported_to = if self.config.export_csv {
            export_csv(&data, &self.config.processed_dir)?;
            Some(self.config.processed_dir.clone())
        } else {
            None
        };

        let db_path = &self.config.database_path;
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;
        rebuild_tables(&mut conn, &data)?;

        let counts = table_counts(&conn)?;
        record_load_run(
            &conn,
            &LoadRun {
                run_id: run_id.clone(),
                started_at,
                finished_at: Utc::now(),
                sources: fingerprints.clone(),
                table_counts: counts.clone(),
            },
        )?;

        log::info!("Pipeline run {} finished: {}", run_id, db_path.display());

        Ok(PipelineReport {
            run_id,
            database_path: db_path.clone(),
            table_counts: counts,
            reconciliation,
            sources: fingerprints,
            exported_to,
        })
    }
}

// ============================================================================
// FILE HELPERS
// ============================================================================

pub fn fingerprint(path: &Path) -> Result<SourceFingerprint> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(fingerprint_bytes(path, &bytes))
}

fn fingerprint_bytes(path: &Path, bytes: &[u8]) -> SourceFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);

    SourceFingerprint {
        path: path.display().to_string(),
        sha256: format!("{:x}", hasher.finalize()),
        bytes: bytes.len() as u64,
    }
}

/// One read per file: the table and its fingerprint share the same buffer
fn read_source(path: &Path, skip_rows: usize) -> Result<(WideTable, SourceFingerprint)> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.csv");

    let table = WideTable::from_reader(source, bytes.as_slice(), skip_rows)?;
    Ok((table, fingerprint_bytes(path, &bytes)))
}

fn write_records<T: Serialize>(dir: &Path, file: &str, records: &[T]) -> Result<()> {
    let path = dir.join(file);
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    writer.flush()?;

    log::debug!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

/// Six processed CSVs, one per table
pub fn export_csv(data: &CleanedData, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    write_records(dir, COUNTIES_CSV, &data.counties)?;
    write_records(dir, ECONOMIC_CSV, &data.economic)?;
    write_records(dir, POPULATION_CSV, &data.population)?;
    write_records(dir, HOUSING_MONTHLY_CSV, &data.housing_monthly)?;
    write_records(dir, AFFORDABILITY_CSV, &data.affordability)?;
    write_records(dir, TRENDS_CSV, &data.trends)?;

    log::info!("Exported processed tables to {}", dir.display());
    Ok(())
}
