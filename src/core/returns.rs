//! Per-trial return series.
//!
//! All per-asset matrices are laid out months × assets, columns indexed by
//! alphabetical asset id. The correlation step applies only the strictly
//! lower triangle of the factor: column 0 passes the raw noise through, and
//! column `c > 0` sums `Z[r][i] · L[c][i]` for `i < c`, never touching the
//! `L[c][c]` diagonal term. Calibrated factors assume this construction;
//! extending the sum to the diagonal changes every downstream price path.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use super::types::{Distribution, SimulationInput};

/// The three return series one trial consumes.
#[derive(Debug, Clone)]
pub struct TrialReturns {
    pub real_estate: Vec<f64>,
    pub inflation: Vec<f64>,
    pub portfolio: Vec<f64>,
}

/// Row-major square lower-triangular factor, side length `k`.
struct CholeskyFactor<'a> {
    vals: &'a [f64],
    k: usize,
}

impl CholeskyFactor<'_> {
    fn get(&self, row: usize, col: usize) -> f64 {
        self.vals[row * self.k + col]
    }
}

/// Generates the full set of return series for one trial.
pub fn generate_trial_returns(
    input: &SimulationInput,
    months: usize,
    rng: &mut ChaCha8Rng,
) -> TrialReturns {
    let real_estate = randoms_from_distribution(input.real_estate, months, rng);
    let inflation = randoms_from_distribution(input.inflation, months, rng);
    let portfolio = portfolio_returns(input, months, rng);
    TrialReturns {
        real_estate,
        inflation,
        portfolio,
    }
}

/// Independent draws `μ + σ·Z`, one per month.
fn randoms_from_distribution(
    distribution: Distribution,
    months: usize,
    rng: &mut impl Rng,
) -> Vec<f64> {
    (0..months)
        .map(|_| {
            let z: f64 = rng.sample(StandardNormal);
            distribution.mean + distribution.std_dev * z
        })
        .collect()
}

fn standard_normal_matrix(rows: usize, cols: usize, rng: &mut impl Rng) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|_| (0..cols).map(|_| rng.sample(StandardNormal)).collect())
        .collect()
}

/// Applies the correlation factor to an M×k noise matrix. Column 0 is the
/// raw noise; column `c` sums only over `i < c` (diagonal excluded).
fn apply_correlation(z: &[Vec<f64>], cholesky: &CholeskyFactor<'_>) -> Vec<Vec<f64>> {
    z.iter()
        .map(|row| {
            (0..cholesky.k)
                .map(|col| {
                    if col == 0 {
                        row[0]
                    } else {
                        (0..col).map(|i| row[i] * cholesky.get(col, i)).sum()
                    }
                })
                .collect()
        })
        .collect()
}

/// Weighted portfolio return per month: correlated geometric-Brownian
/// price paths per asset, converted to period-over-period returns against
/// an implicit t=0 price of 1, then combined with the weights as provided
/// (no renormalization).
fn portfolio_returns(input: &SimulationInput, months: usize, rng: &mut ChaCha8Rng) -> Vec<f64> {
    let asset_ids = input.asset_class_ids();
    let k = asset_ids.len();
    let cholesky = CholeskyFactor {
        vals: &input.cholesky_decomposition,
        k,
    };

    let noise = standard_normal_matrix(months, k, rng);
    let correlated = apply_correlation(&noise, &cholesky);

    // Cumulative log prices with the Itô drift correction, then prices.
    let mut prices = vec![vec![0.0f64; k]; months];
    for row in 0..months {
        for (col, asset_id) in asset_ids.iter().enumerate() {
            let stats = input.asset_performance_data[*asset_id];
            let drift = stats.mean - 0.5 * stats.std_dev.powi(2);
            let previous = if row == 0 { 0.0 } else { prices[row - 1][col] };
            prices[row][col] = previous + drift + stats.std_dev * correlated[row][col];
        }
    }
    for row in prices.iter_mut() {
        for price in row.iter_mut() {
            *price = price.exp();
        }
    }

    // Percent returns per asset, then the weighted sum per month.
    (0..months)
        .map(|row| {
            asset_ids
                .iter()
                .enumerate()
                .map(|(col, asset_id)| {
                    let previous = if row == 0 { 1.0 } else { prices[row - 1][col] };
                    let asset_return = (prices[row][col] - previous) / previous;
                    asset_return * input.selected_portfolio_weights[*asset_id]
                })
                .sum()
        })
        .collect()
}
