// 🔎 Analysis catalog - named read-only queries over the six tables
//
// The same catalog backs `county-housing query <name>` and the generated
// analysis_queries.sql file.

use anyhow::{anyhow, ensure, Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalysisQuery {
    pub name: &'static str,
    pub title: &'static str,
    pub sql: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

// ============================================================================
// CATALOG
// ============================================================================

const INCOME_GAP: &str = "\
SELECT
    c.county_name,
    c.state,
    e.median_household_income,
    h.bottom_tier_min_salary,
    ROUND((h.bottom_tier_min_salary / e.median_household_income - 1) * 100, 1) AS income_gap_percent
FROM counties c
JOIN economic_annual e ON c.fips_code = e.fips_code AND e.year = 2022
JOIN housing_affordability h ON c.fips_code = h.fips_code AND h.year = 2022
WHERE e.median_household_income IS NOT NULL
  AND h.bottom_tier_min_salary IS NOT NULL
ORDER BY income_gap_percent DESC
LIMIT 10";

const PRICE_GROWTH_BY_YEAR: &str = "\
SELECT
    year,
    ROUND(AVG(bottom_tier_price), 0) AS avg_bottom_tier_price,
    ROUND(AVG(top_tier_price), 0) AS avg_top_tier_price,
    ROUND(AVG(bottom_tier_growth), 2) AS avg_bottom_growth_rate,
    ROUND(AVG(top_tier_growth), 2) AS avg_top_growth_rate
FROM price_trends_annual
WHERE year >= 2010
GROUP BY year
ORDER BY year";

const STATE_AFFORDABILITY: &str = "\
SELECT
    c.state,
    COUNT(*) AS county_count,
    ROUND(AVG(e.median_household_income), 0) AS avg_income,
    ROUND(AVG(h.bottom_tier_min_salary), 0) AS avg_min_salary_needed,
    ROUND(AVG(e.unemployment_rate), 1) AS avg_unemployment_rate
FROM counties c
JOIN economic_annual e ON c.fips_code = e.fips_code AND e.year = 2022
JOIN housing_affordability h ON c.fips_code = h.fips_code AND h.year = 2022
GROUP BY c.state
HAVING COUNT(*) >= 5
ORDER BY avg_min_salary_needed DESC
LIMIT 15";

const COVID_AFFORDABILITY_SHIFT: &str = "\
WITH affordability_change AS (
    SELECT
        c.county_name,
        c.state,
        h2019.bottom_tier_min_salary AS min_salary_2019,
        h2022.bottom_tier_min_salary AS min_salary_2022,
        e.median_household_income,
        (h2022.bottom_tier_min_salary - h2019.bottom_tier_min_salary)
            / h2019.bottom_tier_min_salary * 100 AS salary_increase_needed
    FROM counties c
    JOIN housing_affordability h2019 ON c.fips_code = h2019.fips_code AND h2019.year = 2019
    JOIN housing_affordability h2022 ON c.fips_code = h2022.fips_code AND h2022.year = 2022
    JOIN economic_annual e ON c.fips_code = e.fips_code AND e.year = 2022
    WHERE h2019.bottom_tier_min_salary IS NOT NULL
      AND h2022.bottom_tier_min_salary IS NOT NULL
)
SELECT
    county_name,
    state,
    ROUND(min_salary_2019, 0) AS min_salary_2019,
    ROUND(min_salary_2022, 0) AS min_salary_2022,
    ROUND(median_household_income, 0) AS actual_income,
    ROUND(salary_increase_needed, 1) AS salary_increase_needed_percent
FROM affordability_change
WHERE salary_increase_needed > 20
ORDER BY salary_increase_needed DESC
LIMIT 20";

const UNEMPLOYMENT_VS_COST: &str = "\
SELECT
    CASE
        WHEN e.unemployment_rate < 3 THEN 'Low (< 3%)'
        WHEN e.unemployment_rate < 5 THEN 'Medium (3-5%)'
        ELSE 'High (> 5%)'
    END AS unemployment_category,
    COUNT(*) AS county_count,
    ROUND(AVG(h.bottom_tier_min_salary), 0) AS avg_min_salary,
    ROUND(AVG(e.median_household_income), 0) AS avg_income
FROM economic_annual e
JOIN housing_affordability h ON e.fips_code = h.fips_code AND e.year = h.year
WHERE e.year = 2022 AND e.unemployment_rate IS NOT NULL
GROUP BY unemployment_category
ORDER BY avg_min_salary";

const POPULATION_VS_PRICE_GROWTH: &str = "\
SELECT
    c.county_name,
    c.state,
    p2020.population AS pop_2020,
    p2024.population AS pop_2024,
    ROUND((p2024.population - p2020.population) * 100.0 / p2020.population, 1) AS pop_growth_percent,
    ROUND(t2020.bottom_tier_price, 0) AS price_2020,
    ROUND(t2024.bottom_tier_price, 0) AS price_2024,
    ROUND((t2024.bottom_tier_price - t2020.bottom_tier_price) * 100.0 / t2020.bottom_tier_price, 1) AS price_growth_percent
FROM counties c
JOIN population_annual p2020 ON c.fips_code = p2020.fips_code AND p2020.year = 2020
JOIN population_annual p2024 ON c.fips_code = p2024.fips_code AND p2024.year = 2024
JOIN price_trends_annual t2020 ON c.fips_code = t2020.fips_code AND t2020.year = 2020
JOIN price_trends_annual t2024 ON c.fips_code = t2024.fips_code AND t2024.year = 2024
WHERE p2020.population > 50000
ORDER BY pop_growth_percent DESC
LIMIT 15";

const AFFORDABLE_MARKETS: &str = "\
SELECT
    c.county_name,
    c.state,
    ROUND(h.bottom_tier_min_salary, 0) AS bottom_tier_min_salary,
    ROUND(e.median_household_income, 0) AS median_household_income
FROM counties c
JOIN housing_affordability h ON c.fips_code = h.fips_code AND h.year = 2022
LEFT JOIN economic_annual e ON c.fips_code = e.fips_code AND e.year = 2022
WHERE h.bottom_tier_min_salary < 80000
ORDER BY h.bottom_tier_min_salary
LIMIT 10";

const CATALOG: &[AnalysisQuery] = &[
    AnalysisQuery {
        name: "income_gap",
        title: "Counties where the salary needed most exceeds median income (2022)",
        sql: INCOME_GAP,
    },
    AnalysisQuery {
        name: "price_growth_by_year",
        title: "Average home prices and growth by year",
        sql: PRICE_GROWTH_BY_YEAR,
    },
    AnalysisQuery {
        name: "state_affordability",
        title: "State-level affordability comparison (2022, states with 5+ counties)",
        sql: STATE_AFFORDABILITY,
    },
    AnalysisQuery {
        name: "covid_affordability_shift",
        title: "Counties needing 20%+ more salary in 2022 than in 2019",
        sql: COVID_AFFORDABILITY_SHIFT,
    },
    AnalysisQuery {
        name: "unemployment_vs_cost",
        title: "Housing cost by unemployment band (2022)",
        sql: UNEMPLOYMENT_VS_COST,
    },
    AnalysisQuery {
        name: "population_vs_price_growth",
        title: "Population growth against price growth, 2020 to 2024 (counties over 50k)",
        sql: POPULATION_VS_PRICE_GROWTH,
    },
    AnalysisQuery {
        name: "affordable_markets",
        title: "Cheapest markets by bottom-tier salary needed (2022, under $80k)",
        sql: AFFORDABLE_MARKETS,
    },
];

pub fn catalog() -> &'static [AnalysisQuery] {
    CATALOG
}

pub fn find(name: &str) -> Option<&'static AnalysisQuery> {
    CATALOG.iter().find(|q| q.name == name)
}

// ============================================================================
// EXECUTION
// ============================================================================

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<{} bytes>", b.len())),
    }
}

pub fn run_query(conn: &Connection, query: &AnalysisQuery) -> Result<QueryResult> {
    let mut stmt = conn
        .prepare(query.sql)
        .with_context(|| format!("Failed to prepare query '{}'", query.name))?;
    ensure!(stmt.readonly(), "Query '{}' is not read-only", query.name);

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|i| row.get_ref(i).map(to_json))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to run query '{}'", query.name))?;

    log::debug!("Query '{}' returned {} rows", query.name, rows.len());

    Ok(QueryResult { columns, rows })
}

pub fn run_named(conn: &Connection, name: &str) -> Result<QueryResult> {
    let query = find(name).ok_or_else(|| {
        let known: Vec<&str> = CATALOG.iter().map(|q| q.name).collect();
        anyhow!("Unknown query '{}' (known: {})", name, known.join(", "))
    })?;
    run_query(conn, query)
}

// ============================================================================
// SQL FILE
// ============================================================================

pub fn render_sql_file() -> String {
    let mut out = String::from(
        "-- County housing market analysis queries\n\
         -- Tables: counties, economic_annual, population_annual,\n\
         --         housing_prices_monthly, housing_affordability, price_trends_annual\n",
    );

    for (i, query) in CATALOG.iter().enumerate() {
        out.push_str(&format!(
            "\n-- {}. {} ({})\n{};\n",
            i + 1,
            query.title,
            query.name,
            query.sql
        ));
    }

    out
}

pub fn write_sql_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, render_sql_file())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
