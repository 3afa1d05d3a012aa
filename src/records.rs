// 📋 Normalized records - one struct per table
// Every record carries the canonical `Fips` key. Field names match the SQL
// columns and the processed CSV headers.

use crate::fips::Fips;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Master geographic reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct County {
    pub fips_code: Fips,
    /// Postal abbreviation ("CA")
    pub state: String,
    /// Display name without the state suffix ("Los Angeles County")
    pub county_name: String,
    pub rural_urban_code: Option<i64>,
    pub urban_influence_code: Option<i64>,
    /// 1 = metro, 0 = non-metro
    pub metro_status: Option<i64>,
}

/// Unemployment and income, one row per county-year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicAnnual {
    pub fips_code: Fips,
    pub year: i32,
    pub unemployment_rate: f64,
    pub civilian_labor_force: Option<f64>,
    pub employed: Option<f64>,
    pub unemployed: Option<f64>,
    /// Latest available median household income, repeated on every year
    pub median_household_income: Option<f64>,
    /// Year the income figure was measured in
    pub income_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationAnnual {
    pub fips_code: Fips,
    pub year: i32,
    pub population: i64,
}

/// Bottom and top tier home values for one county-month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HousingPriceMonthly {
    pub fips_code: Fips,
    pub region_id: i64,
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub bottom_tier_price: Option<f64>,
    pub top_tier_price: Option<f64>,
}

/// Annual average prices with the derived minimum qualifying salary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HousingAffordability {
    pub fips_code: Fips,
    pub region_id: i64,
    pub year: i32,
    pub bottom_tier_price: Option<f64>,
    pub top_tier_price: Option<f64>,
    pub bottom_tier_annual_cost: Option<f64>,
    pub top_tier_annual_cost: Option<f64>,
    pub bottom_tier_min_salary: Option<f64>,
    pub top_tier_min_salary: Option<f64>,
}

/// Annual average prices with year-over-year growth in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTrendAnnual {
    pub fips_code: Fips,
    pub region_id: i64,
    pub year: i32,
    pub bottom_tier_price: Option<f64>,
    pub top_tier_price: Option<f64>,
    pub bottom_tier_growth: Option<f64>,
    pub top_tier_growth: Option<f64>,
}

/// The six normalized tables, ready to export or load
#[derive(Debug, Default, Clone)]
pub struct CleanedData {
    pub counties: Vec<County>,
    pub economic: Vec<EconomicAnnual>,
    pub population: Vec<PopulationAnnual>,
    pub housing_monthly: Vec<HousingPriceMonthly>,
    pub affordability: Vec<HousingAffordability>,
    pub trends: Vec<PriceTrendAnnual>,
}
