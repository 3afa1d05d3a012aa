// County Housing - Core Library
// FIPS normalization, wide-to-long reshaping, affordability and the SQLite loader

pub mod fips;
pub mod reshape;
pub mod records;
pub mod sources;
pub mod trends;
pub mod affordability;
pub mod db;
pub mod data_quality;
pub mod queries;
pub mod config;
pub mod pipeline;

// Re-export commonly used types
pub use fips::{
    Fips, FipsError, CountyKeyIndex, KeyMiss, MatchStats, UsState,
    normalize_county_name, split_area_name, state_by_abbr, state_by_fips, state_by_name,
};
pub use reshape::{WideTable, Melted, melt, melt_record, parse_numeric};
pub use records::{
    County, EconomicAnnual, PopulationAnnual, HousingPriceMonthly,
    HousingAffordability, PriceTrendAnnual, CleanedData,
};
pub use trends::{AnnualPrice, annual_averages, price_trends};
pub use affordability::{AffordabilityRule, compute_affordability};
pub use db::{
    LoadRun, SourceFingerprint, TableCount, TableDef, TABLES,
    configure_connection, create_schema, setup_database, load_tables, rebuild_tables,
    record_load_run, latest_load_run, count_rows, table_counts, get_counties, get_economic_for_county,
};
pub use data_quality::{DataQualityEngine, QualityReport, CheckResult, Severity};
pub use queries::{AnalysisQuery, QueryResult, catalog, run_query};
pub use config::{PipelineConfig, SourceFile, SourceFiles};
pub use pipeline::{Pipeline, PipelineReport, ReconciliationSummary, SourceTables};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
