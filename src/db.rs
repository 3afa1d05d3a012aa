use crate::fips::Fips;
use crate::records::{
    CleanedData, County, EconomicAnnual, HousingAffordability, HousingPriceMonthly,
    PopulationAnnual, PriceTrendAnnual,
};
use anyhow::{ensure, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

// ============================================================================
// SCHEMA
// ============================================================================

/// One of the six analytical tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub key_columns: &'static [&'static str],
}

/// Schema order: parents before children
pub const TABLES: &[TableDef] = &[
    TableDef { name: "counties", key_columns: &["fips_code"] },
    TableDef { name: "economic_annual", key_columns: &["fips_code", "year"] },
    TableDef { name: "population_annual", key_columns: &["fips_code", "year"] },
    TableDef { name: "housing_prices_monthly", key_columns: &["fips_code", "date"] },
    TableDef { name: "housing_affordability", key_columns: &["fips_code", "year"] },
    TableDef { name: "price_trends_annual", key_columns: &["fips_code", "year"] },
];

pub const LOAD_RUNS_TABLE: &str = "load_runs";

/// Tables that reference counties(fips_code)
pub fn child_tables() -> impl Iterator<Item = &'static TableDef> {
    TABLES.iter().filter(|t| t.name != "counties")
}

/// Connection pragmas; both are no-ops inside a transaction
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Configure the connection and recreate the six tables empty
pub fn setup_database(conn: &Connection) -> Result<()> {
    configure_connection(conn)?;
    create_schema(conn)
}

/// Drop and recreate the six tables and their indexes; `load_runs` is kept
pub fn create_schema(conn: &Connection) -> Result<()> {
    // Children first so no foreign key is left dangling
    for table in TABLES.iter().rev() {
        conn.execute(&format!("DROP TABLE IF EXISTS {}", table.name), [])?;
    }

    // ==========================================================================
    // Counties (master geographic reference)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE counties (
            fips_code TEXT PRIMARY KEY NOT NULL,
            state TEXT NOT NULL,
            county_name TEXT NOT NULL,
            rural_urban_code INTEGER,
            urban_influence_code INTEGER,
            metro_status INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE economic_annual (
            fips_code TEXT NOT NULL REFERENCES counties(fips_code),
            year INTEGER NOT NULL,
            unemployment_rate REAL NOT NULL,
            civilian_labor_force REAL,
            employed REAL,
            unemployed REAL,
            median_household_income REAL,
            income_year INTEGER,
            PRIMARY KEY (fips_code, year)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE population_annual (
            fips_code TEXT NOT NULL REFERENCES counties(fips_code),
            year INTEGER NOT NULL,
            population INTEGER NOT NULL,
            PRIMARY KEY (fips_code, year)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE housing_prices_monthly (
            fips_code TEXT NOT NULL REFERENCES counties(fips_code),
            date TEXT NOT NULL,
            region_id INTEGER NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            bottom_tier_price REAL,
            top_tier_price REAL,
            PRIMARY KEY (fips_code, date)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE housing_affordability (
            fips_code TEXT NOT NULL REFERENCES counties(fips_code),
            year INTEGER NOT NULL,
            region_id INTEGER NOT NULL,
            bottom_tier_price REAL,
            top_tier_price REAL,
            bottom_tier_annual_cost REAL,
            top_tier_annual_cost REAL,
            bottom_tier_min_salary REAL,
            top_tier_min_salary REAL,
            PRIMARY KEY (fips_code, year)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE price_trends_annual (
            fips_code TEXT NOT NULL REFERENCES counties(fips_code),
            year INTEGER NOT NULL,
            region_id INTEGER NOT NULL,
            bottom_tier_price REAL,
            top_tier_price REAL,
            bottom_tier_growth REAL,
            top_tier_growth REAL,
            PRIMARY KEY (fips_code, year)
        )",
        [],
    )?;

    // ==========================================================================
    // Load runs (provenance, survives rebuilds)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS load_runs (
            run_id TEXT PRIMARY KEY NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            sources TEXT NOT NULL,
            table_counts TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_counties_state ON counties(state)",
        "CREATE INDEX IF NOT EXISTS idx_economic_year ON economic_annual(year)",
        "CREATE INDEX IF NOT EXISTS idx_population_year ON population_annual(year)",
        "CREATE INDEX IF NOT EXISTS idx_housing_monthly_region ON housing_prices_monthly(region_id)",
        "CREATE INDEX IF NOT EXISTS idx_housing_monthly_year ON housing_prices_monthly(year)",
        "CREATE INDEX IF NOT EXISTS idx_affordability_year ON housing_affordability(year)",
        "CREATE INDEX IF NOT EXISTS idx_trends_year ON price_trends_annual(year)",
    ];

    for index_sql in indexes {
        conn.execute(index_sql, [])?;
    }

    Ok(())
}

// ============================================================================
// LOADING
// ============================================================================

/// Row count for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

/// Insert all six tables in one transaction; any failure rolls back everything
pub fn load_tables(conn: &mut Connection, data: &CleanedData) -> Result<()> {
    let tx = conn.transaction()?;
    insert_all(&tx, data)?;
    tx.commit()?;

    log_loaded(data);
    Ok(())
}

/// Drop, recreate and load in a single transaction
///
/// A failure anywhere leaves the previous tables exactly as they were.
pub fn rebuild_tables(conn: &mut Connection, data: &CleanedData) -> Result<()> {
    configure_connection(conn)?;

    let tx = conn.transaction()?;
    create_schema(&tx).context("Failed to recreate schema")?;
    insert_all(&tx, data)?;
    tx.commit()?;

    log_loaded(data);
    Ok(())
}

fn insert_all(conn: &Connection, data: &CleanedData) -> Result<()> {
    insert_counties(conn, &data.counties).context("Failed to load counties")?;
    insert_economic(conn, &data.economic).context("Failed to load economic_annual")?;
    insert_population(conn, &data.population).context("Failed to load population_annual")?;
    insert_housing_monthly(conn, &data.housing_monthly)
        .context("Failed to load housing_prices_monthly")?;
    insert_affordability(conn, &data.affordability)
        .context("Failed to load housing_affordability")?;
    insert_trends(conn, &data.trends).context("Failed to load price_trends_annual")?;
    Ok(())
}

fn log_loaded(data: &CleanedData) {
    log::info!(
        "Loaded {} counties, {} economic, {} population, {} monthly, {} affordability, {} trend rows",
        data.counties.len(),
        data.economic.len(),
        data.population.len(),
        data.housing_monthly.len(),
        data.affordability.len(),
        data.trends.len()
    );
}

pub fn insert_counties(conn: &Connection, counties: &[County]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO counties (
            fips_code, state, county_name, rural_urban_code, urban_influence_code, metro_status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;

    for county in counties {
        stmt.execute(params![
            county.fips_code,
            county.state,
            county.county_name,
            county.rural_urban_code,
            county.urban_influence_code,
            county.metro_status,
        ])
        .with_context(|| format!("county {}", county.fips_code))?;
    }

    Ok(counties.len())
}

pub fn insert_economic(conn: &Connection, rows: &[EconomicAnnual]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO economic_annual (
            fips_code, year, unemployment_rate, civilian_labor_force, employed, unemployed,
            median_household_income, income_year
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    for row in rows {
        stmt.execute(params![
            row.fips_code,
            row.year,
            row.unemployment_rate,
            row.civilian_labor_force,
            row.employed,
            row.unemployed,
            row.median_household_income,
            row.income_year,
        ])
        .with_context(|| format!("economic row {} {}", row.fips_code, row.year))?;
    }

    Ok(rows.len())
}

pub fn insert_population(conn: &Connection, rows: &[PopulationAnnual]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO population_annual (fips_code, year, population) VALUES (?1, ?2, ?3)",
    )?;

    for row in rows {
        stmt.execute(params![row.fips_code, row.year, row.population])
            .with_context(|| format!("population row {} {}", row.fips_code, row.year))?;
    }

    Ok(rows.len())
}

pub fn insert_housing_monthly(conn: &Connection, rows: &[HousingPriceMonthly]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO housing_prices_monthly (
            fips_code, date, region_id, year, month, bottom_tier_price, top_tier_price
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    for row in rows {
        let date = row.date.format("%Y-%m-%d").to_string();
        stmt.execute(params![
            row.fips_code,
            date,
            row.region_id,
            row.year,
            row.month,
            row.bottom_tier_price,
            row.top_tier_price,
        ])
        .with_context(|| format!("monthly price {} {}", row.fips_code, date))?;
    }

    Ok(rows.len())
}

pub fn insert_affordability(conn: &Connection, rows: &[HousingAffordability]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO housing_affordability (
            fips_code, year, region_id, bottom_tier_price, top_tier_price,
            bottom_tier_annual_cost, top_tier_annual_cost,
            bottom_tier_min_salary, top_tier_min_salary
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;

    for row in rows {
        stmt.execute(params![
            row.fips_code,
            row.year,
            row.region_id,
            row.bottom_tier_price,
            row.top_tier_price,
            row.bottom_tier_annual_cost,
            row.top_tier_annual_cost,
            row.bottom_tier_min_salary,
            row.top_tier_min_salary,
        ])
        .with_context(|| format!("affordability row {} {}", row.fips_code, row.year))?;
    }

    Ok(rows.len())
}

pub fn insert_trends(conn: &Connection, rows: &[PriceTrendAnnual]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO price_trends_annual (
            fips_code, year, region_id, bottom_tier_price, top_tier_price,
            bottom_tier_growth, top_tier_growth
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    for row in rows {
        stmt.execute(params![
            row.fips_code,
            row.year,
            row.region_id,
            row.bottom_tier_price,
            row.top_tier_price,
            row.bottom_tier_growth,
            row.top_tier_growth,
        ])
        .with_context(|| format!("trend row {} {}", row.fips_code, row.year))?;
    }

    Ok(rows.len())
}

// ============================================================================
// LOAD RUNS
// ============================================================================

/// SHA-256 of a source file as it was read for a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceFingerprint>,
    pub table_counts: Vec<TableCount>,
}

pub fn record_load_run(conn: &Connection, run: &LoadRun) -> Result<()> {
    let sources_json = serde_json::to_string(&run.sources)?;
    let counts_json = serde_json::to_string(&run.table_counts)?;

    conn.execute(
        "INSERT INTO load_runs (run_id, started_at, finished_at, sources, table_counts)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            run.run_id,
            run.started_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            run.finished_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            sources_json,
            counts_json,
        ],
    )?;

    Ok(())
}

pub fn latest_load_run(conn: &Connection) -> Result<Option<LoadRun>> {
    let row = conn
        .query_row(
            "SELECT run_id, started_at, finished_at, sources, table_counts
             FROM load_runs
             ORDER BY finished_at DESC, rowid DESC
             LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((run_id, started_at, finished_at, sources, table_counts)) = row else {
        return Ok(None);
    };

    Ok(Some(LoadRun {
        run_id,
        started_at: DateTime::parse_from_rfc3339(&started_at)
            .context("Bad started_at in load_runs")?
            .with_timezone(&Utc),
        finished_at: DateTime::parse_from_rfc3339(&finished_at)
            .context("Bad finished_at in load_runs")?
            .with_timezone(&Utc),
        sources: serde_json::from_str(&sources).context("Bad sources in load_runs")?,
        table_counts: serde_json::from_str(&table_counts)
            .context("Bad table_counts in load_runs")?,
    }))
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    ensure!(
        TABLES.iter().any(|t| t.name == table) || table == LOAD_RUNS_TABLE,
        "Unknown table: {}",
        table
    );

    let count: i64 =
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;

    Ok(count)
}

/// Counts for the six tables, in schema order
pub fn table_counts(conn: &Connection) -> Result<Vec<TableCount>> {
    TABLES
        .iter()
        .map(|t| {
            Ok(TableCount {
                table: t.name.to_string(),
                rows: count_rows(conn, t.name)?,
            })
        })
        .collect()
}

pub fn get_counties(conn: &Connection) -> Result<Vec<County>> {
    let mut stmt = conn.prepare(
        "SELECT fips_code, state, county_name, rural_urban_code, urban_influence_code, metro_status
         FROM counties
         ORDER BY fips_code",
    )?;

    let counties = stmt
        .query_map([], |row| {
            Ok(County {
                fips_code: row.get(0)?,
                state: row.get(1)?,
                county_name: row.get(2)?,
                rural_urban_code: row.get(3)?,
                urban_influence_code: row.get(4)?,
                metro_status: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(counties)
}

pub fn get_economic_for_county(conn: &Connection, fips: &Fips) -> Result<Vec<EconomicAnnual>> {
    let mut stmt = conn.prepare(
        "SELECT fips_code, year, unemployment_rate, civilian_labor_force, employed, unemployed,
                median_household_income, income_year
         FROM economic_annual
         WHERE fips_code = ?1
         ORDER BY year",
    )?;

    let rows = stmt
        .query_map([fips], |row| {
            Ok(EconomicAnnual {
                fips_code: row.get(0)?,
                year: row.get(1)?,
                unemployment_rate: row.get(2)?,
                civilian_labor_force: row.get(3)?,
                employed: row.get(4)?,
                unemployed: row.get(5)?,
                median_household_income: row.get(6)?,
                income_year: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

// ============================================================================
// SQL CONVERSIONS
// ============================================================================

impl ToSql for Fips {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Fips {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Fips::parse(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
