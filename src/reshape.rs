// 🔄 Wide-to-Long Reshaper
// Source files put one period per column (Unemployment_rate_2000 ...
// Unemployment_rate_2023, or 300+ monthly date columns). Everything downstream
// wants one row per period.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;

// ============================================================================
// WIDE TABLE
// ============================================================================

/// A source table as read: header row plus raw string records
#[derive(Debug, Clone)]
pub struct WideTable {
    /// Label used in error messages (usually the file name)
    pub source: String,
    pub headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl WideTable {
    /// Read a CSV file, skipping `skip_rows` caption records above the header
    pub fn from_path(path: &Path, skip_rows: usize) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;

        let source = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
            .to_string();

        Self::from_reader(&source, file, skip_rows)
    }

    pub fn from_reader<R: Read>(source: &str, reader: R, skip_rows: usize) -> Result<Self> {
        // Caption rows rarely have as many fields as the data
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut records = reader.records();

        for skipped in 0..skip_rows {
            match records.next() {
                Some(result) => {
                    result.with_context(|| {
                        format!("Failed to read caption row {} in {}", skipped + 1, source)
                    })?;
                }
                None => return Err(anyhow!("{} ended inside its {} caption rows", source, skip_rows)),
            }
        }

        let header_record = records
            .next()
            .ok_or_else(|| anyhow!("{} has no header row", source))?
            .with_context(|| format!("Failed to read header row in {}", source))?;

        let headers: Vec<String> = header_record.iter().map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        for (line_num, result) in records.enumerate() {
            let record = result.with_context(|| {
                format!(
                    "Failed to parse CSV record {} in {}",
                    skip_rows + line_num + 2,
                    source
                )
            })?;
            rows.push(record);
        }

        log::debug!("Read {} rows x {} columns from {}", rows.len(), headers.len(), source);

        Ok(WideTable {
            source: source.to_string(),
            headers,
            rows,
        })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column(name)
            .ok_or_else(|| anyhow!("{} is missing required column '{}'", self.source, name))
    }

    /// Cell text, trimmed; ragged rows read as empty
    pub fn cell<'r>(&self, record: &'r StringRecord, index: usize) -> &'r str {
        record.get(index).map(str::trim).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// PERIOD COLUMNS
// ============================================================================

/// `(column index, year)` for every header equal to `prefix` + a 4-digit year
///
/// An empty prefix matches bare years ("2020", or "2020.0" from a spreadsheet).
pub fn year_columns(headers: &[String], prefix: &str) -> Vec<(usize, i32)> {
    headers
        .iter()
        .enumerate()
        .filter_map(|(index, header)| {
            let suffix = header.strip_prefix(prefix)?;
            parse_year(suffix).map(|year| (index, year))
        })
        .collect()
}

/// The year column with the greatest year, e.g. the newest Metro_<year>
pub fn latest_year_column(headers: &[String], prefix: &str) -> Option<(usize, i32)> {
    year_columns(headers, prefix)
        .into_iter()
        .max_by_key(|&(_, year)| year)
}

/// `(column index, date)` for every `YYYY-MM-DD` header
pub fn date_columns(headers: &[String]) -> Vec<(usize, NaiveDate)> {
    headers
        .iter()
        .enumerate()
        .filter_map(|(index, header)| {
            if header.len() != 10 {
                return None;
            }
            NaiveDate::parse_from_str(header, "%Y-%m-%d")
                .ok()
                .map(|date| (index, date))
        })
        .collect()
}

fn parse_year(text: &str) -> Option<i32> {
    let text = text.strip_suffix(".0").unwrap_or(text);
    if text.len() != 4 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

// ============================================================================
// MELT
// ============================================================================

/// One non-null cell of a wide table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Melted<P> {
    /// Index into `WideTable::rows`
    pub row: usize,
    pub period: P,
    pub value: f64,
}

/// `(period, value)` for each non-null cell of one record, in column order
pub fn melt_record<P: Copy>(record: &StringRecord, columns: &[(usize, P)]) -> Vec<(P, f64)> {
    columns
        .iter()
        .filter_map(|&(index, period)| {
            let cell = record.get(index)?;
            parse_numeric(cell).map(|value| (period, value))
        })
        .collect()
}

/// Melt a whole table, row-major
pub fn melt<P: Copy>(table: &WideTable, columns: &[(usize, P)]) -> Vec<Melted<P>> {
    table
        .rows
        .iter()
        .enumerate()
        .flat_map(|(row, record)| {
            melt_record(record, columns)
                .into_iter()
                .map(move |(period, value)| Melted { row, period, value })
        })
        .collect()
}

// ============================================================================
// CELL COERCION
// ============================================================================

const NULL_MARKERS: &[&str] = &["", "na", "n/a", "nan", "null", "-", "(x)"];

/// Coerce a cell to a number; anything unusable becomes `None`
pub fn parse_numeric(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if NULL_MARKERS.iter().any(|m| trimmed.eq_ignore_ascii_case(m)) {
        return None;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%'))
        .collect();

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer-valued cell ("3" or "3.0"); fractional values are rejected
pub fn parse_code(cell: &str) -> Option<i64> {
    let value = parse_numeric(cell)?;
    if value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        return None;
    }
    Some(value as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_reader_skips_caption_rows() {
        let data = "Unemployment and median household income\n\
                    Source: USDA ERS,,\n\
                    FIPS_Code , State,Area_Name\n\
                    1001,AL,\"Autauga County, AL\"\n\
                    1003,AL\n";
        let table = WideTable::from_reader("test.csv", data.as_bytes(), 2).unwrap();

        assert_eq!(table.headers, headers(&["FIPS_Code", "State", "Area_Name"]));
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(&table.rows[0], 2), "Autauga County, AL");
        // Ragged row reads as empty
        assert_eq!(table.cell(&table.rows[1], 2), "");
        assert_eq!(table.require_column("State").unwrap(), 1);
        assert!(table.require_column("Missing").is_err());
    }

    #[test]
    fn test_from_reader_errors_when_short() {
        let data = "only a caption\n";
        assert!(WideTable::from_reader("short.csv", data.as_bytes(), 3).is_err());
        assert!(WideTable::from_reader("short.csv", data.as_bytes(), 1).is_err());
    }

    #[test]
    fn test_year_columns() {
        let h = headers(&[
            "FIPS_Code",
            "Unemployment_rate_2000",
            "Unemployment_rate_2001",
            "Unemployment_rate_20x2",
            "Employed_2000",
            "2020",
            "2021.0",
        ]);

        assert_eq!(year_columns(&h, "Unemployment_rate_"), vec![(1, 2000), (2, 2001)]);
        assert_eq!(year_columns(&h, ""), vec![(5, 2020), (6, 2021)]);
        assert_eq!(latest_year_column(&h, "Employed_"), Some((4, 2000)));
        assert_eq!(latest_year_column(&h, "Metro_"), None);
    }

    #[test]
    fn test_date_columns() {
        let h = headers(&["RegionID", "2000-01-31", "2000-02-29", "2000-13-01", "2000-1-31"]);
        let dates = date_columns(&h);

        assert_eq!(dates.len(), 2);
        assert_eq!(dates[0], (1, NaiveDate::from_ymd_opt(2000, 1, 31).unwrap()));
        assert_eq!(dates[1].0, 2);
    }

    #[test]
    fn test_melt_drops_nulls_and_keeps_order() {
        let data = "id,2020,2021,2022\n\
                    a,10,,30\n\
                    b,NA,20,(X)\n";
        let table = WideTable::from_reader("pop.csv", data.as_bytes(), 0).unwrap();
        let columns = year_columns(&table.headers, "");
        let melted = melt(&table, &columns);

        assert_eq!(
            melted,
            vec![
                Melted { row: 0, period: 2020, value: 10.0 },
                Melted { row: 0, period: 2022, value: 30.0 },
                Melted { row: 1, period: 2021, value: 20.0 },
            ]
        );
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("1,234.5"), Some(1234.5));
        assert_eq!(parse_numeric(" $250,000 "), Some(250000.0));
        assert_eq!(parse_numeric("3.5%"), Some(3.5));
        assert_eq!(parse_numeric("N/A"), None);
        assert_eq!(parse_numeric("nan"), None);
        assert_eq!(parse_numeric("inf"), None);
        assert_eq!(parse_numeric("abc"), None);
    }

    #[test]
    fn test_parse_code() {
        assert_eq!(parse_code("3"), Some(3));
        assert_eq!(parse_code("3.0"), Some(3));
        assert_eq!(parse_code("3.5"), None);
        assert_eq!(parse_code(""), None);
    }
}
