// End-to-end build: fixture CSVs → cleaned tables → SQLite → checks and queries

use county_housing::{
    catalog, count_rows, get_economic_for_county, latest_load_run, queries, run_query,
    DataQualityEngine, Fips, Pipeline, PipelineConfig, PipelineReport,
};
use rusqlite::Connection;
use std::fs;
use std::path::Path;

const UNEMPLOYMENT: &str = "\
Unemployment and median household income for the United States, States, and counties, 2000-23
Source: U.S. Department of Labor and U.S. Census Bureau
For definitions of rural classifications see the ERS website,
All unemployment rates are annual averages
FIPS_Code,State,Area_Name,Rural_Urban_Continuum_Code_2023,Urban_Influence_Code_2013,Metro_2023,Civilian_labor_force_2021,Unemployment_rate_2020,Unemployment_rate_2021,Unemployment_rate_2022,Median_Household_Income_2022
0,US,United States,,,,,8.1,5.3,3.6,74755
1000,AL,Alabama,,,,,6.5,3.4,2.6,59674
1001,AL,\"Autauga County, AL\",2,2,1,26000,4.9,2.9,2.6,68315
1003,AL,\"Baldwin County, AL\",3,2,1,,5.5,3.1,,71039
6000,CA,California,,,,,10.1,7.3,4.2,91551
6037.0,CA,\"Los Angeles County, CA\",1,1,1,,12.3,8.9,5.0,83411
5143,AR,\"Washington County, AR\",2,1,1,,5.3,3.6,2.9,62324
,,,,,,,,,,
";

const POPULATION: &str = "\
table with row headers in column A and column headers in rows 3 through 4
Annual Estimates of the Resident Population for Counties: April 1 2020 to July 1 2024
,April 1 2020,Population Estimate (as of July 1)
Geographic Area,Estimates Base,2020,2021,2022,2023,2024
United States,331449520,331526933,332048977,333271411,334914895,340110988
Alabama,5024803,5031864,5050380,5073903,5108468,5157699
\".Autauga County, Alabama\",58805,58877,59203,59759,60342,61464
\".Baldwin County, Alabama\",231767,233140,239294,246531,253507,261608
\".Nowhere County, Alabama\",10,10,10,10,10,10
California,39538245,39503200,39145060,39040616,38965193,39431263
\".Los Angeles County, California\",10014009,10006807,9829544,9721138,9663345,9757179
\".Washington County, Arkansas\",245871,246446,250739,256381,261549,267142
";

const BOTTOM_TIER: &str = "\
RegionID,SizeRank,RegionName,RegionType,StateName,State,Metro,StateCodeFIPS,MunicipalCodeFIPS,2019-06-30,2020-06-30,2021-06-30,2022-06-30,2022-12-31
3101,0,Los Angeles County,county,CA,CA,Los Angeles-Long Beach-Anaheim,6,37,480000,500000,505000,600000,620000
1090,1,Autauga County,county,AL,AL,Montgomery,1,1,110000,112000,120000,140000,142000
2000,2,Baldwin County,county,AL,AL,Daphne-Fairhope-Foley,,,150000,160000,175000,205000,215000
2500,3,Baldwin County,county,AL,AL,Daphne-Fairhope-Foley,,,1,1,1,1,1
9999,4,Atlantis County,county,ZZ,ZZ,,,,50,50,50,50,50
";

const TOP_TIER: &str = "\
RegionID,SizeRank,RegionName,RegionType,StateName,State,Metro,StateCodeFIPS,MunicipalCodeFIPS,2019-06-30,2020-06-30,2021-06-30,2022-06-30,2022-12-31
3101,0,Los Angeles County,county,CA,CA,Los Angeles-Long Beach-Anaheim,6,37,1400000,1450000,1500000,1700000,1750000
1090,1,Autauga County,county,AL,AL,Montgomery,1,1,,,300000,330000,
5000,5,Washington County,county,AR,AR,Fayetteville-Springdale-Rogers,5,143,250000,260000,280000,320000,330000
";

fn write_fixtures(root: &Path) -> PipelineConfig {
    let raw = root.join("raw");
    fs::create_dir_all(&raw).unwrap();
    fs::write(raw.join("Unemployment2023.csv"), UNEMPLOYMENT).unwrap();
    fs::write(raw.join("2024_pop_county.csv"), POPULATION).unwrap();
    fs::write(raw.join("bottom_tier_prices_county.csv"), BOTTOM_TIER).unwrap();
    fs::write(raw.join("top_tier_prices_county.csv"), TOP_TIER).unwrap();

    PipelineConfig {
        raw_dir: raw,
        processed_dir: root.join("processed"),
        database_path: root.join("db").join("housing_market.db"),
        ..PipelineConfig::default()
    }
}

fn build(root: &Path) -> (PipelineConfig, PipelineReport) {
    let config = write_fixtures(root);
    let report = Pipeline::new(config.clone()).unwrap().run().unwrap();
    (config, report)
}

fn fips(code: &str) -> Fips {
    Fips::parse(code).unwrap()
}

#[test]
fn test_build_loads_all_six_tables() {
    let dir = tempfile::tempdir().unwrap();
    let (config, report) = build(dir.path());

    let counts: Vec<(&str, i64)> = report
        .table_counts
        .iter()
        .map(|c| (c.table.as_str(), c.rows))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("counties", 4),
            ("economic_annual", 11),
            ("population_annual", 20),
            ("housing_prices_monthly", 20),
            ("housing_affordability", 16),
            ("price_trends_annual", 16),
        ]
    );

    let conn = Connection::open(&config.database_path).unwrap();
    assert_eq!(count_rows(&conn, "counties").unwrap(), 4);

    let county_codes: Vec<String> = conn
        .prepare("SELECT fips_code FROM counties ORDER BY fips_code")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(county_codes, vec!["01001", "01003", "05143", "06037"]);
}

#[test]
fn test_reconciliation_summary() {
    let dir = tempfile::tempdir().unwrap();
    let (_, report) = build(dir.path());
    let rec = &report.reconciliation;

    assert_eq!(rec.unemployment.counties, 4);
    assert_eq!(rec.unemployment.summary_rows, 3);
    assert_eq!(rec.unemployment.blank_fips, 1);

    assert_eq!(rec.population.matched, 4);
    assert_eq!(rec.population.unmatched, 1);
    assert!(rec.population.unmatched_labels.contains("Nowhere County, Alabama"));

    assert_eq!(rec.housing.matched, 5);
    assert_eq!(rec.housing.unmatched, 1);
    assert_eq!(rec.housing_matched_by_code, 3);
    assert_eq!(rec.region_conflicts.len(), 1);
    assert_eq!(rec.region_conflicts[0].kept_region, 2000);
    assert_eq!(rec.region_conflicts[0].dropped_region, 2500);
}

#[test]
fn test_derived_values() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _) = build(dir.path());
    let conn = Connection::open(&config.database_path).unwrap();

    let (price, growth): (f64, f64) = conn
        .query_row(
            "SELECT bottom_tier_price, bottom_tier_growth FROM price_trends_annual
             WHERE fips_code = '06037' AND year = 2022",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert!((price - 610000.0).abs() < 1e-6);
    assert!((growth - (610000.0 / 505000.0 - 1.0) * 100.0).abs() < 1e-9);

    let (salary, top_salary): (f64, Option<f64>) = conn
        .query_row(
            "SELECT bottom_tier_min_salary, top_tier_min_salary FROM housing_affordability
             WHERE fips_code = '06037' AND year = 2022",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert!((salary - 610000.0 * 0.05 / 0.30).abs() < 1e-6);
    assert!((top_salary.unwrap() - 1725000.0 * 0.05 / 0.30).abs() < 1e-6);

    // Washington County has no bottom-tier series
    let bottom: Option<f64> = conn
        .query_row(
            "SELECT bottom_tier_min_salary FROM housing_affordability
             WHERE fips_code = '05143' AND year = 2022",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(bottom, None);

    let economic = get_economic_for_county(&conn, &fips("1001")).unwrap();
    assert_eq!(economic.len(), 3);
    assert_eq!(economic[1].year, 2021);
    assert_eq!(economic[1].civilian_labor_force, Some(26000.0));
    assert!(economic.iter().all(|e| e.median_household_income == Some(68315.0)));
    assert!(economic.iter().all(|e| e.income_year == Some(2022)));
}

#[test]
fn test_quality_checks_pass_on_built_database() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _) = build(dir.path());
    let conn = Connection::open(&config.database_path).unwrap();

    let report = DataQualityEngine::new(config.affordability).run(&conn).unwrap();
    let failed: Vec<String> = report.failed().iter().map(|c| c.message.clone()).collect();

    assert!(failed.is_empty(), "{:?}", failed);
    assert!(!report.has_critical_issues());
}

#[test]
fn test_analysis_queries_run() {
    let dir = tempfile::tempdir().unwrap();
    let (config, _) = build(dir.path());
    let conn = Connection::open(&config.database_path).unwrap();

    for query in catalog() {
        run_query(&conn, query).unwrap();
    }

    let gap = queries::run_named(&conn, "income_gap").unwrap();
    assert_eq!(gap.rows.len(), 2);

    // 2019 → 2022: Autauga +28.2%, Los Angeles +27.1%
    let shift = queries::run_named(&conn, "covid_affordability_shift").unwrap();
    assert_eq!(shift.rows.len(), 2);
    assert_eq!(shift.rows[0][0], serde_json::json!("Autauga County"));
    assert_eq!(shift.rows[1][0], serde_json::json!("Los Angeles County"));
}

#[test]
fn test_export_and_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let (config, first) = build(dir.path());

    assert_eq!(first.exported_to.as_deref(), Some(config.processed_dir.as_path()));
    let processed: Vec<_> = fs::read_dir(&config.processed_dir).unwrap().collect();
    assert_eq!(processed.len(), 6);

    // Second build replaces the tables and appends to the run log
    let second = Pipeline::new(config.clone()).unwrap().run().unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.table_counts, second.table_counts);

    let conn = Connection::open(&config.database_path).unwrap();
    assert_eq!(count_rows(&conn, "load_runs").unwrap(), 2);

    let latest = latest_load_run(&conn).unwrap().unwrap();
    assert_eq!(latest.sources.len(), 4);
    assert_eq!(latest.sources, second.sources);
    assert!(latest.sources.iter().all(|s| s.sha256.len() == 64));
}

#[test]
fn test_build_without_export() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = write_fixtures(dir.path());
    config.export_csv = false;

    let report = Pipeline::new(config.clone()).unwrap().run().unwrap();

    assert!(report.exported_to.is_none());
    assert!(!config.processed_dir.exists());
    assert!(config.database_path.exists());
}

#[test]
fn test_missing_source_fails_before_touching_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_fixtures(dir.path());
    fs::remove_file(config.raw_dir.join("top_tier_prices_county.csv")).unwrap();

    let err = Pipeline::new(config.clone()).unwrap().run().unwrap_err();

    assert!(format!("{:#}", err).contains("top_tier_prices_county.csv"));
    assert!(!config.database_path.exists());
}
