use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::SimulationError;
use super::schedule::Frequency;

/// Moments of a normal distribution of monthly log returns.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Distribution {
    pub mean: f64,
    pub std_dev: f64,
}

/// A declarative recurring or one-time expense. `frequency` is kept as the
/// raw wire string and classified during materialization so that an unknown
/// value produces a diagnostic instead of a decode failure.
#[derive(Debug, Clone, Deserialize)]
pub struct Expense {
    pub amount: f64,
    pub frequency: String,
    #[serde(default)]
    pub onetime_on: i64,
    #[serde(default)]
    pub ends: i64,
}

/// Household description. Monetary values are nominal at simulation start;
/// percentage fields are whole numbers (35 means 35%). Age 0 means the
/// member is absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Parameters {
    pub male: bool,
    pub married: bool,
    pub retired: bool,
    pub male_age: u32,
    pub retirement_age_male: u32,
    pub female_age: u32,
    pub retirement_age_female: u32,
    pub expenses_multiplier: f64,
    pub fraction_single_income: f64,
    pub starting_assets: f64,
    pub income: f64,
    pub current_tax: f64,
    pub salary_increase: f64,
    pub income_inflation_index: f64,
    pub expenses_inflation_index: f64,
    pub retirement_income: f64,
    pub retirement_expenses: f64,
    pub retirement_tax: f64,
    pub life_insurance: f64,
    pub include_home: bool,
    pub home_value: f64,
    pub sell_house_in: u32,
    pub new_home_relative_value: f64,
}

/// One simulation request. Immutable once decoded; shared by reference
/// across all trials.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationInput {
    #[serde(default)]
    pub in_todays_dollars: bool,
    pub number_of_trials: u32,
    pub cholesky_decomposition: Vec<f64>,
    pub inflation: Distribution,
    pub real_estate: Distribution,
    pub asset_performance_data: HashMap<String, Distribution>,
    #[serde(rename = "simulation_parameters")]
    pub parameters: Parameters,
    pub expenses: Vec<Expense>,
    pub selected_portfolio_weights: HashMap<String, f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// One month of one trial. Created from the shared baseline (date and
/// materialized expenses), then mutated in place by the engine passes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeStep {
    pub date_unix: i64,
    pub expenses: f64,
    pub income: f64,
    pub assets: f64,
    pub male_age: u32,
    pub female_age: u32,
    pub male_alive: bool,
    pub female_alive: bool,
    pub male_retired: bool,
    pub female_retired: bool,
}

/// Cross-trial summary for one month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryTimeStep {
    pub assets_mean: f64,
    pub assets_ci_low: f64,
    pub assets_ci_high: f64,

    pub income_mean: f64,
    pub income_ci_low: f64,
    pub income_ci_high: f64,

    pub expenses_mean: f64,
    pub expenses_ci_low: f64,
    pub expenses_ci_high: f64,

    pub out_of_money_percentage: f64,
    pub date: i64,
}

impl SimulationInput {
    /// Checks the semantic constraints the decoder cannot express. These
    /// surface as 400 responses with a diagnostic message.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.number_of_trials == 0 {
            return Err(SimulationError::NoTrials);
        }

        let p = &self.parameters;
        if p.male_age == 0 && p.female_age == 0 {
            return Err(SimulationError::NoHouseholdMembers);
        }

        let assets = self.selected_portfolio_weights.len();
        let expected = assets * assets;
        if self.cholesky_decomposition.len() != expected {
            return Err(SimulationError::CholeskySizeMismatch {
                len: self.cholesky_decomposition.len(),
                expected,
                assets,
            });
        }

        for asset_id in self.selected_portfolio_weights.keys() {
            if !self.asset_performance_data.contains_key(asset_id) {
                return Err(SimulationError::MissingAssetDistribution(asset_id.clone()));
            }
        }

        for expense in &self.expenses {
            Frequency::parse(&expense.frequency)?;
        }

        Ok(())
    }

    /// Number of months to simulate: through age 120 of the youngest
    /// present household member.
    pub fn months_to_simulate(&self) -> usize {
        let p = &self.parameters;
        let youngest = match (p.male_age, p.female_age) {
            (0, female) => female,
            (male, 0) => male,
            (male, female) => male.min(female),
        };
        12 * 120usize.saturating_sub(youngest as usize)
    }

    /// Portfolio asset ids in alphabetical order. Column order of every
    /// per-asset matrix in the return generator.
    pub fn asset_class_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .selected_portfolio_weights
            .keys()
            .map(String::as_str)
            .collect();
        ids.sort_unstable();
        ids
    }
}
