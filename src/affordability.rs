// 💵 Affordability Calculator
//
// Minimum qualifying salary for a home at a given price:
//   annual housing cost = price × annual_cost_rate   (mortgage + taxes + insurance)
//   min salary          = annual cost ÷ max_income_share
// With the defaults (5%, 30%) a $300,000 home needs a $50,000 salary.

use crate::records::HousingAffordability;
use crate::trends::AnnualPrice;
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ANNUAL_COST_RATE: f64 = 0.05;
pub const DEFAULT_MAX_INCOME_SHARE: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffordabilityRule {
    /// Yearly cost of owning, as a fraction of home value
    pub annual_cost_rate: f64,
    /// Largest fraction of income housing may take
    pub max_income_share: f64,
}

impl Default for AffordabilityRule {
    fn default() -> Self {
        AffordabilityRule {
            annual_cost_rate: DEFAULT_ANNUAL_COST_RATE,
            max_income_share: DEFAULT_MAX_INCOME_SHARE,
        }
    }
}

impl AffordabilityRule {
    pub fn new(annual_cost_rate: f64, max_income_share: f64) -> Result<Self> {
        let rule = AffordabilityRule {
            annual_cost_rate,
            max_income_share,
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.annual_cost_rate.is_finite() && self.annual_cost_rate > 0.0,
            "annual_cost_rate must be positive, got {}",
            self.annual_cost_rate
        );
        ensure!(
            self.max_income_share.is_finite()
                && self.max_income_share > 0.0
                && self.max_income_share <= 1.0,
            "max_income_share must be in (0, 1], got {}",
            self.max_income_share
        );
        Ok(())
    }

    pub fn annual_cost(&self, price: f64) -> f64 {
        price * self.annual_cost_rate
    }

    pub fn min_salary(&self, price: f64) -> f64 {
        self.annual_cost(price) / self.max_income_share
    }
}

pub fn compute_affordability(annual: &[AnnualPrice], rule: &AffordabilityRule) -> Vec<HousingAffordability> {
    annual
        .iter()
        .map(|row| HousingAffordability {
            fips_code: row.fips_code.clone(),
            region_id: row.region_id,
            year: row.year,
            bottom_tier_price: row.bottom_tier_price,
            top_tier_price: row.top_tier_price,
            bottom_tier_annual_cost: row.bottom_tier_price.map(|p| rule.annual_cost(p)),
            top_tier_annual_cost: row.top_tier_price.map(|p| rule.annual_cost(p)),
            bottom_tier_min_salary: row.bottom_tier_price.map(|p| rule.min_salary(p)),
            top_tier_min_salary: row.top_tier_price.map(|p| rule.min_salary(p)),
        })
        .collect()
}
