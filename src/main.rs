use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

use county_housing::{
    catalog, latest_load_run, queries, DataQualityEngine, Pipeline, PipelineConfig, PipelineReport,
    QueryResult,
};

#[derive(Parser)]
#[command(name = "county-housing")]
#[command(about = "County economic and housing data normalization pipeline")]
#[command(version)]
struct Cli {
    /// Pipeline config (defaults to ./county-housing.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the raw sources and rebuild the database
    Build {
        /// Skip writing the processed CSV files
        #[arg(long)]
        no_export: bool,
    },
    /// Run the data quality checks against the built database
    Check,
    /// List the analysis queries
    Queries,
    /// Run one analysis query
    Query {
        name: String,
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write the analysis catalog as a .sql file
    WriteSql { path: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Build { no_export } => {
            if no_export {
                config.export_csv = false;
            }
            run_build(config)?;
        }
        Commands::Check => run_check(&config)?,
        Commands::Queries => {
            println!("🔎 Analysis queries");
            for query in catalog() {
                println!("   {:<28} {}", query.name, query.title);
            }
        }
        Commands::Query { name, json } => {
            let conn = open_read_only(&config.database_path)?;
            let result = queries::run_named(&conn, &name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_table(&result);
            }
        }
        Commands::WriteSql { path } => {
            queries::write_sql_file(&path)?;
            println!("✅ Analysis queries saved to: {}", path.display());
        }
    }

    Ok(())
}

fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.exists() {
        eprintln!("❌ Database not found: {}", path.display());
        eprintln!("   Run: county-housing build");
        std::process::exit(1);
    }
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open {}", path.display()))
}

fn run_build(config: PipelineConfig) -> Result<()> {
    println!("🏗️  County Housing Database - sources → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("\n📂 Raw sources: {}", config.raw_dir.display());

    let pipeline = Pipeline::new(config)?;
    let report = pipeline.run()?;

    print_build_report(&report);
    Ok(())
}

fn print_build_report(report: &PipelineReport) {
    let rec = &report.reconciliation;

    println!("\n🗺️  FIPS reconciliation");
    println!(
        "✓ Unemployment: {} counties ({} summary rows, {} invalid, {} duplicate)",
        rec.unemployment.counties,
        rec.unemployment.summary_rows,
        rec.unemployment.invalid_fips,
        rec.unemployment.duplicate_fips
    );
    println!("✓ Population: {}", rec.population.summary());
    println!(
        "✓ Housing: {} ({} by code, {} conflicts)",
        rec.housing.summary(),
        rec.housing_matched_by_code,
        rec.region_conflicts.len()
    );

    if let Some(dir) = &report.exported_to {
        println!("\n💾 Processed CSVs: {}", dir.display());
    }

    println!("\n🔍 Database: {}", report.database_path.display());
    for count in &report.table_counts {
        println!("   {:<24} {:>10} records", count.table, count.rows);
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🎉 Build complete (run {})", report.run_id);
}

fn run_check(config: &PipelineConfig) -> Result<()> {
    let conn = open_read_only(&config.database_path)?;

    println!("✅ Data quality: {}", config.database_path.display());
    if let Some(run) = latest_load_run(&conn)? {
        println!("   Last build: {} ({})", run.finished_at, run.run_id);
    }

    let report = DataQualityEngine::new(config.affordability).run(&conn)?;
    for check in &report.checks {
        let mark = if check.passed { "✓" } else { "✗" };
        println!("   {} {:<28} {}", mark, check.name, check.message);
    }
    println!("\n📊 {}", report.summary());

    if report.has_critical_issues() {
        eprintln!("❌ Critical data quality issues found");
        std::process::exit(1);
    }

    Ok(())
}

fn print_table(result: &QueryResult) {
    println!("{}", result.columns.join(" | "));
    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                serde_json::Value::Null => "NULL".to_string(),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join(" | "));
    }
    println!("\n({} rows)", result.rows.len());
}
