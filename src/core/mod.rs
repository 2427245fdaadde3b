mod engine;
mod error;
mod mortality;
mod returns;
mod schedule;
mod types;

pub use engine::{run_simulation, summarize};
pub use error::SimulationError;
pub use mortality::{MAX_AGE, MortalityTable};
pub use returns::{TrialReturns, generate_trial_returns};
pub use schedule::{BaselineStep, build_baseline, end_of_month, month_end_grid};
pub use types::{
    Distribution, Expense, Parameters, SimulationInput, SummaryTimeStep, TimeStep,
};
