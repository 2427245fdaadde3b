use thiserror::Error;

/// Semantic input errors surfaced to the client as HTTP 400.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("number_of_trials must be at least 1")]
    NoTrials,

    #[error("at least one of male_age or female_age must be non-zero")]
    NoHouseholdMembers,

    #[error(
        "cholesky_decomposition has {len} entries, expected {expected} for {assets} portfolio assets"
    )]
    CholeskySizeMismatch {
        len: usize,
        expected: usize,
        assets: usize,
    },

    #[error("no performance distribution for portfolio asset '{0}'")]
    MissingAssetDistribution(String),

    #[error("unknown expense frequency '{0}'")]
    UnknownFrequency(String),
}
