// 📉 Unemployment & median household income (USDA ERS county file)
// Produces the master county list and the economic_annual rows.

use crate::fips::{split_area_name, Fips};
use crate::records::{County, EconomicAnnual};
use crate::reshape::{latest_year_column, melt_record, parse_code, parse_numeric, year_columns, WideTable};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub const FIPS_COLUMN: &str = "FIPS_Code";
pub const STATE_COLUMN: &str = "State";
pub const AREA_COLUMN: &str = "Area_Name";

const RURAL_URBAN_PREFIX: &str = "Rural_Urban_Continuum_Code_";
const URBAN_INFLUENCE_PREFIX: &str = "Urban_Influence_Code_";
const METRO_PREFIX: &str = "Metro_";
const RATE_PREFIX: &str = "Unemployment_rate_";
const LABOR_FORCE_PREFIX: &str = "Civilian_labor_force_";
const EMPLOYED_PREFIX: &str = "Employed_";
const UNEMPLOYED_PREFIX: &str = "Unemployed_";
const INCOME_PREFIX: &str = "Median_Household_Income_";

/// What happened to each input row
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct UnemploymentStats {
    pub rows_read: usize,
    pub blank_fips: usize,
    /// State and national totals
    pub summary_rows: usize,
    pub invalid_fips: usize,
    pub duplicate_fips: usize,
    /// Rate cells dropped because an earlier column had the same year
    pub duplicate_years: usize,
    pub counties: usize,
}

#[derive(Debug, Clone)]
pub struct UnemploymentOutput {
    pub counties: Vec<County>,
    pub economic: Vec<EconomicAnnual>,
    pub stats: UnemploymentStats,
}

pub fn clean_unemployment(table: &WideTable) -> Result<UnemploymentOutput> {
    let fips_col = table.require_column(FIPS_COLUMN)?;
    let state_col = table.require_column(STATE_COLUMN)?;
    let area_col = table.require_column(AREA_COLUMN)?;

    let rural_urban_col = latest_year_column(&table.headers, RURAL_URBAN_PREFIX).map(|(i, _)| i);
    let urban_influence_col = latest_year_column(&table.headers, URBAN_INFLUENCE_PREFIX).map(|(i, _)| i);
    let metro_col = latest_year_column(&table.headers, METRO_PREFIX).map(|(i, _)| i);

    let rate_columns = year_columns(&table.headers, RATE_PREFIX);
    if rate_columns.is_empty() {
        return Err(anyhow!(
            "{} has no {}<year> columns",
            table.source,
            RATE_PREFIX
        ));
    }

    let labor_force_cols = columns_by_year(&table.headers, LABOR_FORCE_PREFIX);
    let employed_cols = columns_by_year(&table.headers, EMPLOYED_PREFIX);
    let unemployed_cols = columns_by_year(&table.headers, UNEMPLOYED_PREFIX);
    let income_col = latest_year_column(&table.headers, INCOME_PREFIX);

    let mut stats = UnemploymentStats::default();
    let mut counties = Vec::new();
    let mut economic = Vec::new();
    let mut seen: HashSet<Fips> = HashSet::new();

    for record in &table.rows {
        stats.rows_read += 1;

        let raw_fips = table.cell(record, fips_col);
        if raw_fips.is_empty() {
            stats.blank_fips += 1;
            continue;
        }

        let fips = match Fips::parse(raw_fips) {
            Ok(fips) => fips,
            Err(e) => {
                log::warn!("{}: skipping row: {}", table.source, e);
                stats.invalid_fips += 1;
                continue;
            }
        };

        if fips.is_summary() {
            stats.summary_rows += 1;
            continue;
        }

        if !seen.insert(fips.clone()) {
            log::warn!("{}: duplicate county {}, keeping the first row", table.source, fips);
            stats.duplicate_fips += 1;
            continue;
        }

        let code = |col: Option<usize>| col.and_then(|i| parse_code(table.cell(record, i)));
        let (county_name, _) = split_area_name(table.cell(record, area_col));

        counties.push(County {
            fips_code: fips.clone(),
            state: table.cell(record, state_col).to_ascii_uppercase(),
            county_name: county_name.to_string(),
            rural_urban_code: code(rural_urban_col),
            urban_influence_code: code(urban_influence_col),
            metro_status: code(metro_col),
        });

        let median_income = income_col.and_then(|(i, _)| parse_numeric(table.cell(record, i)));
        let income_year = median_income.and(income_col.map(|(_, year)| year));

        let same_year = |columns: &HashMap<i32, usize>, year: i32| {
            columns
                .get(&year)
                .and_then(|&i| parse_numeric(table.cell(record, i)))
        };

        // "_2021" and "_2021.0" headers both read as 2021
        let mut years = HashSet::new();
        for (year, rate) in melt_record(record, &rate_columns) {
            if !years.insert(year) {
                log::warn!(
                    "{}: duplicate {} year for {}, keeping the first column",
                    table.source,
                    year,
                    fips
                );
                stats.duplicate_years += 1;
                continue;
            }

            economic.push(EconomicAnnual {
                fips_code: fips.clone(),
                year,
                unemployment_rate: rate,
                civilian_labor_force: same_year(&labor_force_cols, year),
                employed: same_year(&employed_cols, year),
                unemployed: same_year(&unemployed_cols, year),
                median_household_income: median_income,
                income_year,
            });
        }
    }

    stats.counties = counties.len();

    log::info!(
        "{}: {} counties, {} economic rows ({} summary, {} blank, {} invalid, {} duplicate rows dropped; {} duplicate years)",
        table.source,
        counties.len(),
        economic.len(),
        stats.summary_rows,
        stats.blank_fips,
        stats.invalid_fips,
        stats.duplicate_fips,
        stats.duplicate_years
    );

    Ok(UnemploymentOutput {
        counties,
        economic,
        stats,
    })
}

fn columns_by_year(headers: &[String], prefix: &str) -> HashMap<i32, usize> {
    let mut columns = HashMap::new();
    for (index, year) in year_columns(headers, prefix) {
        columns.entry(year).or_insert(index);
    }
    columns
}
