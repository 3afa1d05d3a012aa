// 📈 Price trends - annual averages and year-over-year growth

use crate::fips::Fips;
use crate::records::{HousingPriceMonthly, PriceTrendAnnual};
use serde::Serialize;
use std::collections::BTreeMap;

/// Mean of a county's monthly prices within one year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualPrice {
    pub fips_code: Fips,
    pub region_id: i64,
    pub year: i32,
    pub bottom_tier_price: Option<f64>,
    pub top_tier_price: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Group monthly rows by (county, year); missing months are skipped, not zeroed
///
/// Output is sorted by (fips, year).
pub fn annual_averages(monthly: &[HousingPriceMonthly]) -> Vec<AnnualPrice> {
    let mut groups: BTreeMap<(Fips, i32), (i64, Mean, Mean)> = BTreeMap::new();

    for row in monthly {
        let (_, bottom, top) = groups
            .entry((row.fips_code.clone(), row.year))
            .or_insert_with(|| (row.region_id, Mean::default(), Mean::default()));
        bottom.add(row.bottom_tier_price);
        top.add(row.top_tier_price);
    }

    groups
        .into_iter()
        .map(|((fips_code, year), (region_id, bottom, top))| AnnualPrice {
            fips_code,
            region_id,
            year,
            bottom_tier_price: bottom.value(),
            top_tier_price: top.value(),
        })
        .collect()
}

/// Percent change from `previous` to `current`
pub fn growth(previous: Option<f64>, current: Option<f64>) -> Option<f64> {
    match (previous, current) {
        (Some(p), Some(c)) if p != 0.0 => Some((c / p - 1.0) * 100.0),
        _ => None,
    }
}

/// Year-over-year growth per county
///
/// Each tier compares against its last earlier non-null year, so a gap year
/// does not break the series.
pub fn price_trends(annual: &[AnnualPrice]) -> Vec<PriceTrendAnnual> {
    let mut sorted: Vec<&AnnualPrice> = annual.iter().collect();
    sorted.sort_by(|a, b| (&a.fips_code, a.year).cmp(&(&b.fips_code, b.year)));

    let mut trends = Vec::with_capacity(sorted.len());
    let mut current: Option<&Fips> = None;
    let mut last_bottom: Option<f64> = None;
    let mut last_top: Option<f64> = None;

    for row in sorted {
        if current != Some(&row.fips_code) {
            current = Some(&row.fips_code);
            last_bottom = None;
            last_top = None;
        }

        trends.push(PriceTrendAnnual {
            fips_code: row.fips_code.clone(),
            region_id: row.region_id,
            year: row.year,
            bottom_tier_price: row.bottom_tier_price,
            top_tier_price: row.top_tier_price,
            bottom_tier_growth: growth(last_bottom, row.bottom_tier_price),
            top_tier_growth: growth(last_top, row.top_tier_price),
        });

        last_bottom = row.bottom_tier_price.or(last_bottom);
        last_top = row.top_tier_price.or(last_top);
    }

    trends
}
