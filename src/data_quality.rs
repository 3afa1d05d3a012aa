// ✅ Data Quality Engine - post-load validation of the six tables
//
// Every check runs as SQL against the loaded database, so the report
// describes exactly what downstream queries will see.

use crate::affordability::AffordabilityRule;
use crate::db::{child_tables, TABLES};
use anyhow::Result;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

/// Allowed drift between a stored salary and one recomputed from its price
pub const SALARY_TOLERANCE: f64 = 0.01;

// ============================================================================
// CHECK RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Keys, references or derived values are wrong
    Warning,  // Values are missing
    Info,     // Worth knowing, nothing is wrong
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub table: String,
    pub passed: bool,
    pub violations: i64,
    pub severity: Severity,
    pub message: String,
}

impl CheckResult {
    fn from_count(name: &str, table: &str, violations: i64, severity: Severity, what: &str) -> Self {
        let passed = violations == 0;
        CheckResult {
            name: name.to_string(),
            table: table.to_string(),
            passed,
            violations,
            severity: if passed { Severity::Info } else { severity },
            message: if passed {
                format!("{}: no {}", table, what)
            } else {
                format!("{}: {} {}", table, violations, what)
            },
        }
    }
}

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityReport {
    pub checks: Vec<CheckResult>,
}

impl QualityReport {
    pub fn summary(&self) -> String {
        let failed = self.failed();
        format!(
            "Checks: {}, Passed: {}, Failed: {} ({} critical)",
            self.checks.len(),
            self.checks.len() - failed.len(),
            failed.len(),
            failed
                .iter()
                .filter(|c| c.severity == Severity::Critical)
                .count()
        )
    }

    pub fn has_critical_issues(&self) -> bool {
        self.checks
            .iter()
            .any(|c| !c.passed && c.severity == Severity::Critical)
    }

    pub fn failed(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }
}

// ============================================================================
// DATA QUALITY ENGINE
// ============================================================================

pub struct DataQualityEngine {
    /// Rule the affordability table was built with
    rule: AffordabilityRule,

    tolerance: f64,
}

impl Default for DataQualityEngine {
    fn default() -> Self {
        Self::new(AffordabilityRule::default())
    }
}

impl DataQualityEngine {
    pub fn new(rule: AffordabilityRule) -> Self {
        DataQualityEngine {
            rule,
            tolerance: SALARY_TOLERANCE,
        }
    }

    pub fn run(&self, conn: &Connection) -> Result<QualityReport> {
        let mut checks = Vec::new();

        // Rule 1: every key is a 5-digit text FIPS
        for table in TABLES {
            checks.push(self.check_fips_format(conn, table.name)?);
        }

        // Rule 2: composite keys are unique
        for table in TABLES {
            checks.push(self.check_duplicate_keys(conn, table.name, table.key_columns)?);
        }

        // Rule 3: every child row points at a county
        for table in child_tables() {
            checks.push(self.check_orphans(conn, table.name)?);
        }

        // Rule 4: required values present
        checks.push(self.check_nulls(conn, "counties", &["state", "county_name"])?);
        checks.push(self.check_nulls(conn, "economic_annual", &["unemployment_rate"])?);
        checks.push(self.check_nulls(conn, "population_annual", &["population"])?);
        checks.push(self.check_monthly_prices(conn)?);

        // Rule 5: stored salaries agree with the rule
        checks.push(self.check_affordability(conn, "bottom_tier")?);
        checks.push(self.check_affordability(conn, "top_tier")?);

        // Rule 6: nothing came out empty
        for table in TABLES {
            checks.push(self.check_not_empty(conn, table.name)?);
        }

        let report = QualityReport { checks };
        log::info!("Data quality: {}", report.summary());
        for check in report.failed() {
            log::warn!("{:?} {}: {}", check.severity, check.name, check.message);
        }

        Ok(report)
    }

    fn count(conn: &Connection, sql: &str) -> Result<i64> {
        Ok(conn.query_row(sql, [], |row| row.get(0))?)
    }

    fn check_fips_format(&self, conn: &Connection, table: &str) -> Result<CheckResult> {
        let violations = Self::count(
            conn,
            &format!(
                "SELECT COUNT(*) FROM {} \
                 WHERE typeof(fips_code) != 'text' \
                    OR length(fips_code) != 5 \
                    OR fips_code GLOB '*[^0-9]*'",
                table
            ),
        )?;

        Ok(CheckResult::from_count(
            "fips_format",
            table,
            violations,
            Severity::Critical,
            "malformed FIPS codes",
        ))
    }

    fn check_duplicate_keys(&self, conn: &Connection, table: &str, key: &[&str]) -> Result<CheckResult> {
        let columns = key.join(", ");
        let violations = Self::count(
            conn,
            &format!(
                "SELECT COUNT(*) FROM (
                    SELECT {columns} FROM {table} GROUP BY {columns} HAVING COUNT(*) > 1
                 )"
            ),
        )?;

        Ok(CheckResult::from_count(
            "duplicate_keys",
            table,
            violations,
            Severity::Critical,
            &format!("duplicated ({}) keys", columns),
        ))
    }

    fn check_orphans(&self, conn: &Connection, table: &str) -> Result<CheckResult> {
        let violations = Self::count(
            conn,
            &format!(
                "SELECT COUNT(*) FROM {} t
                 LEFT JOIN counties c ON c.fips_code = t.fips_code
                 WHERE c.fips_code IS NULL",
                table
            ),
        )?;

        Ok(CheckResult::from_count(
            "orphan_rows",
            table,
            violations,
            Severity::Critical,
            "rows without a matching county",
        ))
    }

    fn check_nulls(&self, conn: &Connection, table: &str, columns: &[&str]) -> Result<CheckResult> {
        let condition = columns
            .iter()
            .map(|c| format!("{} IS NULL", c))
            .collect::<Vec<_>>()
            .join(" OR ");
        let violations =
            Self::count(conn, &format!("SELECT COUNT(*) FROM {} WHERE {}", table, condition))?;

        Ok(CheckResult::from_count(
            "required_values",
            table,
            violations,
            Severity::Warning,
            &format!("rows missing {}", columns.join("/")),
        ))
    }

    fn check_monthly_prices(&self, conn: &Connection) -> Result<CheckResult> {
        let violations = Self::count(
            conn,
            "SELECT COUNT(*) FROM housing_prices_monthly
             WHERE bottom_tier_price IS NULL AND top_tier_price IS NULL",
        )?;

        Ok(CheckResult::from_count(
            "required_values",
            "housing_prices_monthly",
            violations,
            Severity::Warning,
            "months with neither tier priced",
        ))
    }

    fn check_affordability(&self, conn: &Connection, tier: &str) -> Result<CheckResult> {
        let sql = format!(
            "SELECT COUNT(*) FROM housing_affordability
             WHERE ({tier}_price IS NULL) != ({tier}_min_salary IS NULL)
                OR abs({tier}_min_salary - {tier}_price * ?1 / ?2) > ?3"
        );
        let violations: i64 = conn.query_row(
            &sql,
            params![
                self.rule.annual_cost_rate,
                self.rule.max_income_share,
                self.tolerance
            ],
            |row| row.get(0),
        )?;

        Ok(CheckResult::from_count(
            &format!("{}_salary_consistency", tier),
            "housing_affordability",
            violations,
            Severity::Critical,
            "salaries that disagree with the affordability rule",
        ))
    }

    fn check_not_empty(&self, conn: &Connection, table: &str) -> Result<CheckResult> {
        let rows = Self::count(conn, &format!("SELECT COUNT(*) FROM {}", table))?;
        let passed = rows > 0;

        Ok(CheckResult {
            name: "not_empty".to_string(),
            table: table.to_string(),
            passed,
            violations: if passed { 0 } else { 1 },
            severity: if passed { Severity::Info } else { Severity::Warning },
            message: format!("{}: {} rows", table, rows),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO counties VALUES ('01001', 'AL', 'Autauga County', 2, 2, 1);
             INSERT INTO economic_annual VALUES ('01001', 2022, 2.6, 26500, 25800, 700, 68315, 2022);
             INSERT INTO population_annual VALUES ('01001', 2022, 59759);
             INSERT INTO housing_prices_monthly VALUES ('01001', '2022-01-31', 1090, 2022, 1, 210000, 330000);
             INSERT INTO housing_affordability VALUES
                ('01001', 2022, 1090, 210000, 330000, 10500, 16500, 35000, 55000);
             INSERT INTO price_trends_annual VALUES ('01001', 2022, 1090, 210000, 330000, NULL, NULL);",
        )
        .unwrap();

        conn
    }

    fn failed_names(report: &QualityReport) -> Vec<(String, String)> {
        report
            .failed()
            .iter()
            .map(|c| (c.name.clone(), c.table.clone()))
            .collect()
    }

    #[test]
    fn test_clean_database_passes() {
        let conn = seeded();
        let report = DataQualityEngine::default().run(&conn).unwrap();

        assert!(report.failed().is_empty(), "{:?}", failed_names(&report));
        assert!(!report.has_critical_issues());
        assert!(report.summary().contains("Failed: 0"));
    }

    #[test]
    fn test_orphans_and_bad_fips_are_critical() {
        let conn = seeded();
        conn.pragma_update(None, "foreign_keys", "OFF").unwrap();
        conn.execute_batch(
            "INSERT INTO population_annual VALUES ('99999', 2022, 10);
             INSERT INTO population_annual VALUES ('1001', 2021, 10);",
        )
        .unwrap();

        let report = DataQualityEngine::default().run(&conn).unwrap();
        let failed = failed_names(&report);

        assert!(report.has_critical_issues());
        assert!(failed.contains(&("orphan_rows".to_string(), "population_annual".to_string())));
        assert!(failed.contains(&("fips_format".to_string(), "population_annual".to_string())));

        let orphans = report
            .checks
            .iter()
            .find(|c| c.name == "orphan_rows" && c.table == "population_annual")
            .unwrap();
        assert_eq!(orphans.violations, 2);
    }

    #[test]
    fn test_salary_drift_is_flagged() {
        let conn = seeded();
        conn.execute(
            "UPDATE housing_affordability SET top_tier_min_salary = 54000",
            [],
        )
        .unwrap();

        let report = DataQualityEngine::default().run(&conn).unwrap();
        let failed = failed_names(&report);

        assert_eq!(
            failed,
            vec![("top_tier_salary_consistency".to_string(), "housing_affordability".to_string())]
        );
        assert!(report.has_critical_issues());
    }

    #[test]
    fn test_custom_rule_changes_expected_salary() {
        let conn = seeded();
        let rule = AffordabilityRule::new(0.06, 0.30).unwrap();

        let report = DataQualityEngine::new(rule).run(&conn).unwrap();
        assert_eq!(report.failed().len(), 2);
    }

    #[test]
    fn test_empty_tables_are_warnings() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let report = DataQualityEngine::default().run(&conn).unwrap();
        let empty: Vec<_> = report
            .failed()
            .into_iter()
            .filter(|c| c.name == "not_empty")
            .collect();

        assert_eq!(empty.len(), TABLES.len());
        assert!(!report.has_critical_issues());
    }
}
