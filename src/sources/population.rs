// 👥 Census county population estimates (CO-EST)
// The Census sheet has no FIPS column. Rows are labelled
// ".Autauga County, Alabama", so each one is reconciled by (state, name).

use crate::fips::{split_area_name, CountyKeyIndex, Fips, MatchStats};
use crate::records::PopulationAnnual;
use crate::reshape::{melt_record, year_columns, WideTable};
use anyhow::{anyhow, Result};
use std::collections::HashSet;

/// The geographic label is always the first column; its header varies by vintage
const AREA_COLUMN_INDEX: usize = 0;

#[derive(Debug, Clone)]
pub struct PopulationOutput {
    pub records: Vec<PopulationAnnual>,
    pub matching: MatchStats,
}

pub fn clean_population(table: &WideTable, index: &CountyKeyIndex) -> Result<PopulationOutput> {
    let year_cols = year_columns(&table.headers, "");
    if year_cols.is_empty() {
        return Err(anyhow!("{} has no year columns", table.source));
    }

    let mut records = Vec::new();
    let mut matching = MatchStats::default();
    let mut seen: HashSet<(Fips, i32)> = HashSet::new();

    for record in &table.rows {
        let area = table.cell(record, AREA_COLUMN_INDEX);

        // Only county rows carry ", <State>"; national and state rows don't
        let (county_name, Some(state)) = split_area_name(area) else {
            continue;
        };

        let outcome = index.resolve(state, county_name);
        matching.record(area.trim_start_matches('.'), &outcome);

        let Ok(fips) = outcome else {
            log::debug!("{}: no county for '{}'", table.source, area);
            continue;
        };

        for (year, value) in melt_record(record, &year_cols) {
            if !seen.insert((fips.clone(), year)) {
                log::warn!(
                    "{}: second estimate for {} in {}, keeping the first",
                    table.source,
                    fips,
                    year
                );
                continue;
            }

            records.push(PopulationAnnual {
                fips_code: fips.clone(),
                year,
                population: value.round() as i64,
            });
        }
    }

    if matching.unmatched + matching.ambiguous > 0 {
        log::warn!(
            "{}: {} county rows could not be reconciled",
            table.source,
            matching.unmatched + matching.ambiguous
        );
    }
    log::info!(
        "{}: {} population rows, FIPS mapping {}",
        table.source,
        records.len(),
        matching.summary()
    );

    Ok(PopulationOutput { records, matching })
}
