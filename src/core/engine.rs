//! The per-trial state machine and the cross-trial reduction.
//!
//! A trial runs seven passes over its month rows, strictly in order:
//! demographics (aging, mortality, retirement, insurance, couple expense
//! adjustments), income evolution, inflation, tax, home sale, post-mortem
//! zeroing, and the asset roll-forward. Trials are independent and run in
//! parallel; aggregation happens only after every trial has finished.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use super::error::SimulationError;
use super::mortality::MortalityTable;
use super::returns::generate_trial_returns;
use super::schedule::{BaselineStep, build_baseline};
use super::types::{Parameters, SimulationInput, SummaryTimeStep, TimeStep};

/// Runs the full request: validate, materialize the shared expense
/// baseline once, fan `number_of_trials` independent trials out across the
/// worker pool, then collapse the results into per-month summaries.
pub fn run_simulation(
    input: &SimulationInput,
    mortality: &MortalityTable,
    seed: u64,
) -> Result<Vec<SummaryTimeStep>, SimulationError> {
    input.validate()?;

    let months = input.months_to_simulate();
    let baseline = build_baseline(&input.expenses, months)?;

    let trials: Vec<Vec<TimeStep>> = (0..input.number_of_trials)
        .into_par_iter()
        .map(|trial| {
            let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(seed, trial));
            run_trial(input, mortality, &baseline, &mut rng)
        })
        .collect();

    Ok(summarize(&trials))
}

/// One independent sample path across all months.
pub(crate) fn run_trial(
    input: &SimulationInput,
    mortality: &MortalityTable,
    baseline: &[BaselineStep],
    rng: &mut ChaCha8Rng,
) -> Vec<TimeStep> {
    let returns = generate_trial_returns(input, baseline.len(), rng);
    let p = &input.parameters;

    let mut steps: Vec<TimeStep> = baseline
        .iter()
        .map(|base| TimeStep {
            date_unix: base.date_unix,
            expenses: base.expenses,
            ..TimeStep::default()
        })
        .collect();
    if let Some(first) = steps.first_mut() {
        first.income = p.income / 12.0;
    }

    demographics_pass(p, mortality, &mut steps, rng);
    income_pass(p, &mut steps);
    inflation_pass(p, &returns.inflation, &mut steps);
    tax_pass(p, &mut steps);
    home_sale_pass(p, &returns.real_estate, &mut steps);
    post_mortem_pass(p, &mut steps);
    asset_pass(p.starting_assets, &returns.portfolio, &mut steps);

    steps
}

/// Retirement state of the household as a whole: both members for a
/// couple, the single present member otherwise.
fn household_retired(p: &Parameters, male_retired: bool, female_retired: bool) -> bool {
    if p.married {
        male_retired && female_retired
    } else if p.male {
        male_retired
    } else {
        female_retired
    }
}

fn anyone_dead(p: &Parameters, male_alive: bool, female_alive: bool) -> bool {
    if p.married {
        !male_alive || !female_alive
    } else if p.male {
        !male_alive
    } else {
        !female_alive
    }
}

fn everyone_dead(p: &Parameters, male_alive: bool, female_alive: bool) -> bool {
    if p.married {
        !male_alive && !female_alive
    } else if p.male {
        !male_alive
    } else {
        !female_alive
    }
}

/// Pass 1: ages tick at year boundaries and the mortality oracle is
/// consulted for each living member; retirement flags latch on; a retired
/// household scales expenses; the first death pays out life insurance and
/// survivor months divide expenses by the couple multiplier.
fn demographics_pass(
    p: &Parameters,
    mortality: &MortalityTable,
    steps: &mut [TimeStep],
    rng: &mut ChaCha8Rng,
) {
    let mut male_age = p.male_age;
    let mut female_age = p.female_age;
    let mut male_alive = p.married || p.male;
    let mut female_alive = p.married || !p.male;
    let mut male_retired = false;
    let mut female_retired = false;
    let mut insurance_paid = false;

    for (month, step) in steps.iter_mut().enumerate() {
        if month > 0 && month % 12 == 0 {
            if male_alive {
                male_age += 1;
                if mortality.male_dies_at(male_age, rng) {
                    male_alive = false;
                }
            }
            if female_alive {
                female_age += 1;
                if mortality.female_dies_at(female_age, rng) {
                    female_alive = false;
                }
            }
        }

        male_retired = male_retired || male_age >= p.retirement_age_male;
        female_retired = female_retired || female_age >= p.retirement_age_female;

        step.male_age = male_age;
        step.female_age = female_age;
        step.male_alive = male_alive;
        step.female_alive = female_alive;
        step.male_retired = male_retired;
        step.female_retired = female_retired;

        if household_retired(p, male_retired, female_retired) {
            step.expenses *= p.retirement_expenses / 100.0;
        }

        if anyone_dead(p, male_alive, female_alive) {
            if !insurance_paid {
                step.income += p.life_insurance;
                insurance_paid = true;
            }
            if p.expenses_multiplier != 0.0 {
                step.expenses /= p.expenses_multiplier;
            }
        }
    }
}

/// Pass 2: income carries forward month to month; a couple's income drops
/// to the single-earner fraction once the first member retires; once the
/// household is fully retired the retirement income overrides everything,
/// otherwise salary grows at each year boundary.
fn income_pass(p: &Parameters, steps: &mut [TimeStep]) {
    let apply_fraction_single = p.married
        && p.male_age < p.retirement_age_male
        && p.female_age < p.retirement_age_female
        && p.fraction_single_income != 0.0;
    let mut have_not_applied_fraction = true;
    let mut fully_retired = false;

    for month in 1..steps.len() {
        let mut income = steps[month - 1].income;

        if apply_fraction_single
            && have_not_applied_fraction
            && (steps[month].male_retired || steps[month].female_retired)
        {
            income *= p.fraction_single_income / 100.0;
            have_not_applied_fraction = false;
        }

        fully_retired = fully_retired
            || household_retired(p, steps[month].male_retired, steps[month].female_retired);

        if fully_retired {
            // Overrides the salary bump in the same month.
            income = p.retirement_income / 12.0;
        } else if month % 12 == 0 {
            income *= 1.0 + p.salary_increase / 100.0;
        }

        steps[month].income = income;
    }
}

/// Pass 3: the monthly inflation series becomes a cumulative factor.
/// Expenses are indexed every month; income only at year boundaries.
fn inflation_pass(p: &Parameters, inflation: &[f64], steps: &mut [TimeStep]) {
    let mut factor = 1.0;
    for (month, step) in steps.iter_mut().enumerate() {
        factor *= 1.0 + inflation[month];
        step.expenses *= (factor - 1.0) * p.expenses_inflation_index / 100.0 + 1.0;
        if month > 0 && month % 12 == 0 {
            step.income *= (factor - 1.0) * p.income_inflation_index / 100.0 + 1.0;
        }
    }
}

/// Pass 4: the retirement tax rate applies once the household is retired,
/// the working rate before that.
fn tax_pass(p: &Parameters, steps: &mut [TimeStep]) {
    for step in steps.iter_mut() {
        let rate = if household_retired(p, step.male_retired, step.female_retired) {
            p.retirement_tax
        } else {
            p.current_tax
        };
        step.income *= 1.0 - rate / 100.0;
    }
}

/// Pass 5: the house sells after `sell_house_in` years, compounded by the
/// real-estate series, keeping the non-downsized share. The credit lands
/// on the assets field before the roll-forward pass, which overwrites
/// every assets value.
fn home_sale_pass(p: &Parameters, real_estate: &[f64], steps: &mut [TimeStep]) {
    if !p.include_home {
        return;
    }
    let sale_month = p.sell_house_in as usize * 12;
    if let Some(step) = steps.get_mut(sale_month) {
        let growth: f64 = real_estate[..sale_month].iter().map(|r| 1.0 + r).product();
        step.assets += p.home_value * growth * (1.0 - p.new_home_relative_value / 100.0);
    }
}

/// Pass 6: months where every tracked member is dead carry no income and
/// no expenses.
fn post_mortem_pass(p: &Parameters, steps: &mut [TimeStep]) {
    for step in steps.iter_mut() {
        if everyone_dead(p, step.male_alive, step.female_alive) {
            step.income = 0.0;
            step.expenses = 0.0;
        }
    }
}

/// Pass 7: the asset roll-forward. Month 0 always reports the starting
/// assets; the balance may go negative, which is what ruin detection reads.
fn asset_pass(starting_assets: f64, portfolio: &[f64], steps: &mut [TimeStep]) {
    let mut balance = starting_assets;
    for (month, step) in steps.iter_mut().enumerate() {
        step.assets = balance;
        let impact = balance * portfolio[month] - (step.expenses - step.income);
        balance += impact;
    }
}

/// Collapses N×M trial rows into M summaries: per-month sample mean,
/// Bessel-corrected standard deviation, normal-approximation 95% CI, and
/// the fraction of trials whose balance has gone below zero.
pub fn summarize(trials: &[Vec<TimeStep>]) -> Vec<SummaryTimeStep> {
    let trial_count = trials.len();
    let periods = trials.first().map_or(0, Vec::len);
    let mut summaries = Vec::with_capacity(periods);

    let mut assets = vec![0.0; trial_count];
    let mut income = vec![0.0; trial_count];
    let mut expenses = vec![0.0; trial_count];

    for period in 0..periods {
        let mut out_of_money = 0usize;
        for (trial_index, trial) in trials.iter().enumerate() {
            let step = &trial[period];
            assets[trial_index] = step.assets;
            income[trial_index] = step.income;
            expenses[trial_index] = step.expenses;
            if step.assets < 0.0 {
                out_of_money += 1;
            }
        }

        let (assets_mean, assets_ci) = mean_and_ci_half_width(&assets);
        let (income_mean, income_ci) = mean_and_ci_half_width(&income);
        let (expenses_mean, expenses_ci) = mean_and_ci_half_width(&expenses);

        summaries.push(SummaryTimeStep {
            assets_mean,
            assets_ci_low: assets_mean - assets_ci,
            assets_ci_high: assets_mean + assets_ci,
            income_mean,
            income_ci_low: income_mean - income_ci,
            income_ci_high: income_mean + income_ci,
            expenses_mean,
            expenses_ci_low: expenses_mean - expenses_ci,
            expenses_ci_high: expenses_mean + expenses_ci,
            out_of_money_percentage: out_of_money as f64 / trial_count as f64,
            date: trials[0][period].date_unix,
        });
    }

    summaries
}

/// Sample mean and `1.96·σ̂/√N`. With a single sample the corrected
/// deviation is undefined; the half-width collapses to zero.
fn mean_and_ci_half_width(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    if samples.len() < 2 {
        return (mean, 0.0);
    }
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let half_width = 1.96 * variance.sqrt() / n.sqrt();
    (mean, half_width)
}

fn derive_seed(base_seed: u64, trial: u32) -> u64 {
    splitmix64(base_seed ^ u64::from(trial))
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
