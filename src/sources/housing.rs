// 🏠 Zillow ZHVI county series (bottom tier + top tier)
//
// Two wide files, one column per month. Regions are identified by Zillow's
// RegionID. Newer exports also carry StateCodeFIPS/MunicipalCodeFIPS, which are
// preferred over name matching when they point at a known county.

use crate::fips::{CountyKeyIndex, Fips, KeyMiss, MatchStats};
use crate::records::HousingPriceMonthly;
use crate::reshape::{date_columns, melt_record, parse_code, WideTable};
use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const REGION_ID_COLUMN: &str = "RegionID";
pub const REGION_NAME_COLUMN: &str = "RegionName";
pub const STATE_COLUMN: &str = "State";
pub const STATE_NAME_COLUMN: &str = "StateName";
pub const STATE_FIPS_COLUMN: &str = "StateCodeFIPS";
pub const COUNTY_FIPS_COLUMN: &str = "MunicipalCodeFIPS";

/// A region that lost its county code to a lower RegionID
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionConflict {
    pub fips_code: Fips,
    pub kept_region: i64,
    pub dropped_region: i64,
    pub region_name: String,
}

#[derive(Debug, Clone)]
pub struct HousingOutput {
    /// Sorted by (region, date)
    pub monthly: Vec<HousingPriceMonthly>,
    pub matching: MatchStats,
    /// Regions resolved through their FIPS columns rather than by name
    pub matched_by_code: usize,
    pub conflicts: Vec<RegionConflict>,
}

#[derive(Debug, Clone, PartialEq)]
struct Region {
    name: String,
    state: String,
    fips_parts: Option<(String, String)>,
}

impl Region {
    fn label(&self) -> String {
        format!("{} ({})", self.name, self.state)
    }
}

struct TierSeries {
    regions: BTreeMap<i64, Region>,
    values: BTreeMap<(i64, NaiveDate), f64>,
}

fn read_tier(table: &WideTable) -> Result<TierSeries> {
    let id_col = table.require_column(REGION_ID_COLUMN)?;
    let name_col = table.require_column(REGION_NAME_COLUMN)?;
    let state_col = table.column(STATE_COLUMN);
    let state_name_col = table.column(STATE_NAME_COLUMN);
    if state_col.is_none() && state_name_col.is_none() {
        return Err(anyhow!(
            "{} needs a {} or {} column",
            table.source,
            STATE_COLUMN,
            STATE_NAME_COLUMN
        ));
    }
    let state_fips_col = table.column(STATE_FIPS_COLUMN);
    let county_fips_col = table.column(COUNTY_FIPS_COLUMN);

    let dates = date_columns(&table.headers);
    if dates.is_empty() {
        return Err(anyhow!("{} has no YYYY-MM-DD columns", table.source));
    }

    let mut regions = BTreeMap::new();
    let mut values = BTreeMap::new();

    for record in &table.rows {
        let Some(region_id) = parse_code(table.cell(record, id_col)) else {
            log::warn!(
                "{}: skipping row with RegionID '{}'",
                table.source,
                table.cell(record, id_col)
            );
            continue;
        };

        let non_empty = |col: Option<usize>| {
            col.map(|i| table.cell(record, i)).filter(|s| !s.is_empty())
        };

        let state = non_empty(state_col)
            .or_else(|| non_empty(state_name_col))
            .unwrap_or("")
            .to_string();

        let fips_parts = match (non_empty(state_fips_col), non_empty(county_fips_col)) {
            (Some(s), Some(c)) => Some((s.to_string(), c.to_string())),
            _ => None,
        };

        regions.entry(region_id).or_insert_with(|| Region {
            name: table.cell(record, name_col).to_string(),
            state,
            fips_parts,
        });

        for (date, value) in melt_record(record, &dates) {
            values.entry((region_id, date)).or_insert(value);
        }
    }

    log::debug!(
        "{}: {} regions, {} monthly values across {} months",
        table.source,
        regions.len(),
        values.len(),
        dates.len()
    );

    Ok(TierSeries { regions, values })
}

/// Code columns first, then (state, name)
fn resolve_region(region: &Region, index: &CountyKeyIndex) -> (Result<Fips, KeyMiss>, bool) {
    if let Some((state, county)) = &region.fips_parts {
        match Fips::from_parts(state, county) {
            Ok(fips) if index.contains(&fips) => return (Ok(fips), true),
            Ok(fips) => log::debug!(
                "{} carries code {} which is not a known county, matching by name",
                region.label(),
                fips
            ),
            Err(e) => log::debug!("{} has unusable FIPS columns: {}", region.label(), e),
        }
    }

    (index.resolve(&region.state, &region.name), false)
}

pub fn clean_housing(
    bottom_table: &WideTable,
    top_table: &WideTable,
    index: &CountyKeyIndex,
) -> Result<HousingOutput> {
    let TierSeries {
        mut regions,
        values: bottom,
    } = read_tier(bottom_table)?;
    let TierSeries {
        regions: top_regions,
        values: top,
    } = read_tier(top_table)?;

    for (id, region) in top_regions {
        regions.entry(id).or_insert(region);
    }

    // BTreeMap order: the lowest RegionID claims a contested code
    let mut matching = MatchStats::default();
    let mut matched_by_code = 0;
    let mut conflicts = Vec::new();
    let mut assigned: HashMap<i64, Fips> = HashMap::new();
    let mut owners: HashMap<Fips, i64> = HashMap::new();

    for (&region_id, region) in &regions {
        let (outcome, by_code) = resolve_region(region, index);
        matching.record(&region.label(), &outcome);

        let Ok(fips) = outcome else {
            continue;
        };

        if let Some(&kept_region) = owners.get(&fips) {
            log::warn!(
                "Region {} ({}) also resolves to {}, already held by region {}; dropped",
                region_id,
                region.label(),
                fips,
                kept_region
            );
            conflicts.push(RegionConflict {
                fips_code: fips,
                kept_region,
                dropped_region: region_id,
                region_name: region.name.clone(),
            });
            continue;
        }

        if by_code {
            matched_by_code += 1;
        }
        owners.insert(fips.clone(), region_id);
        assigned.insert(region_id, fips);
    }

    // Outer merge of the two tiers
    let keys: BTreeSet<(i64, NaiveDate)> = bottom.keys().chain(top.keys()).copied().collect();
    let mut monthly = Vec::with_capacity(keys.len());

    for key in keys {
        let (region_id, date) = key;
        let Some(fips) = assigned.get(&region_id) else {
            continue;
        };

        let bottom_tier_price = bottom.get(&key).copied();
        let top_tier_price = top.get(&key).copied();
        if bottom_tier_price.is_none() && top_tier_price.is_none() {
            continue;
        }

        monthly.push(HousingPriceMonthly {
            fips_code: fips.clone(),
            region_id,
            date,
            year: date.year(),
            month: date.month(),
            bottom_tier_price,
            top_tier_price,
        });
    }

    log::info!(
        "Housing prices: {} monthly rows for {} counties, FIPS mapping {} ({} by code, {} conflicts)",
        monthly.len(),
        assigned.len(),
        matching.summary(),
        matched_by_code,
        conflicts.len()
    );

    Ok(HousingOutput {
        monthly,
        matching,
        matched_by_code,
        conflicts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::County;

    fn county(fips: &str, state: &str, name: &str) -> County {
        County {
            fips_code: Fips::parse(fips).unwrap(),
            state: state.to_string(),
            county_name: name.to_string(),
            rural_urban_code: None,
            urban_influence_code: None,
            metro_status: None,
        }
    }

    fn index() -> CountyKeyIndex {
        CountyKeyIndex::build(&vec![
            county("1001", "AL", "Autauga County"),
            county("1003", "AL", "Baldwin County"),
            county("6037", "CA", "Los Angeles County"),
        ])
    }

    fn table(name: &str, data: &str) -> WideTable {
        WideTable::from_reader(name, data.as_bytes(), 0).unwrap()
    }

    const BOTTOM: &str = "\
RegionID,RegionName,StateName,State,StateCodeFIPS,MunicipalCodeFIPS,2021-01-31,2021-02-28
3101,Los Angeles County,CA,CA,6,37,500000,510000
1090,Autauga County,AL,AL,,,100000,
2000,Baldwin County,AL,AL,,,150000,152000
2500,Baldwin County,AL,AL,,,1,1
9999,Atlantis County,ZZ,ZZ,,,50,50
";

    const TOP: &str = "\
RegionID,RegionName,StateName,State,StateCodeFIPS,MunicipalCodeFIPS,2021-01-31,2021-02-28
3101,Los Angeles County,CA,CA,6,37,1500000,
1090,Autauga County,AL,AL,,,,305000
";

    #[test]
    fn test_outer_merge_of_tiers() {
        let output = clean_housing(&table("bottom.csv", BOTTOM), &table("top.csv", TOP), &index()).unwrap();

        // 1090: 2 months, 2000: 2 months, 3101: 2 months
        assert_eq!(output.monthly.len(), 6);

        let autauga: Vec<_> = output.monthly.iter().filter(|r| r.region_id == 1090).collect();
        assert_eq!(autauga[0].bottom_tier_price, Some(100000.0));
        assert_eq!(autauga[0].top_tier_price, None);
        assert_eq!(autauga[1].bottom_tier_price, None);
        assert_eq!(autauga[1].top_tier_price, Some(305000.0));
        assert_eq!(autauga[1].month, 2);
        assert_eq!(autauga[1].year, 2021);
    }

    #[test]
    fn test_code_columns_win_and_lowest_region_keeps_conflicts() {
        let output = clean_housing(&table("bottom.csv", BOTTOM), &table("top.csv", TOP), &index()).unwrap();

        let la = output.monthly.iter().find(|r| r.region_id == 3101).unwrap();
        assert_eq!(la.fips_code.as_str(), "06037");
        assert_eq!(output.matched_by_code, 1);

        assert_eq!(output.conflicts.len(), 1);
        assert_eq!(output.conflicts[0].kept_region, 2000);
        assert_eq!(output.conflicts[0].dropped_region, 2500);
        assert!(output.monthly.iter().all(|r| r.region_id != 2500));

        assert_eq!(output.matching.matched, 4);
        assert_eq!(output.matching.unmatched, 1);
        assert!(output.matching.unmatched_labels.contains("Atlantis County (ZZ)"));
    }

    #[test]
    fn test_output_is_sorted_by_region_then_date() {
        let output = clean_housing(&table("bottom.csv", BOTTOM), &table("top.csv", TOP), &index()).unwrap();
        let keys: Vec<(i64, NaiveDate)> = output.monthly.iter().map(|r| (r.region_id, r.date)).collect();

        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_unknown_code_falls_back_to_name() {
        // 06999 parses but is not in the county list
        let data = "\
RegionID,RegionName,State,StateCodeFIPS,MunicipalCodeFIPS,2021-01-31
3101,Los Angeles County,CA,6,999,500000
1090,Autauga County,AL,1,x,100000
";
        let output = clean_housing(&table("bottom.csv", data), &table("top.csv", data), &index()).unwrap();

        let codes: Vec<(i64, &str)> = output.monthly.iter().map(|r| (r.region_id, r.fips_code.as_str())).collect();
        assert_eq!(codes, vec![(1090, "01001"), (3101, "06037")]);
        assert_eq!(output.matched_by_code, 0);
        assert_eq!(output.matching.matched, 2);
    }

    #[test]
    fn test_state_name_column_alone_is_enough() {
        let data = "\
RegionID,RegionName,StateName,2021-01-31
3101,Los Angeles County,California,500000
1090,Autauga County,AL,100000
";
        let output = clean_housing(&table("bottom.csv", data), &table("top.csv", data), &index()).unwrap();

        let codes: Vec<&str> = output.monthly.iter().map(|r| r.fips_code.as_str()).collect();
        assert_eq!(codes, vec!["01001", "06037"]);
        assert_eq!(output.matching.unmatched, 0);
    }

    #[test]
    fn test_missing_state_columns_is_an_error() {
        let data = "RegionID,RegionName,2021-01-31\n1,Autauga County,1\n";
        let err = clean_housing(&table("a.csv", data), &table("b.csv", data), &index()).unwrap_err();
        assert!(err.to_string().contains("StateName"));
    }

    #[test]
    fn test_missing_date_columns_is_an_error() {
        let data = "RegionID,RegionName,State\n1,Autauga County,AL\n";
        assert!(clean_housing(&table("a.csv", data), &table("b.csv", data), &index()).is_err());
    }
}
