use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring the engine or loading flag definitions.
///
/// Resolution itself never fails: request-time problems are reported through
/// [`ErrorCode`](crate::ErrorCode) on the returned result.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The flag set violates one of the definition invariants.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Flag file is not valid JSON for the flag-file format.
    #[error("error parsing JSON flag file")]
    Json(#[source] Arc<serde_json::Error>),

    /// Flag file is not valid YAML for the flag-file format.
    #[error("error parsing YAML flag file")]
    Yaml(#[source] Arc<serde_yaml::Error>),

    #[error("invalid flags location")]
    InvalidLocation(#[source] url::ParseError),

    #[error("no flags location configured")]
    MissingFlagsLocation,

    #[error("unsupported flags location {0:?}")]
    UnsupportedLocation(String),

    #[error("invalid value {value:?} for setting {name}")]
    InvalidSetting { name: &'static str, value: String },

    /// The flag source rejected our token.
    #[error("unauthorized, read token is likely invalid")]
    Unauthorized,

    #[error("unexpected status code {0} from flag source")]
    UnexpectedStatus(u16),

    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    #[error("poller thread panicked")]
    PollerThreadPanicked,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Arc::new(value))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(Arc::new(value))
    }
}

/// A flag definition that can never be served consistently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("flag missing key")]
    MissingKey,

    #[error("flag {flag:?} has no variants")]
    NoVariants { flag: String },

    #[error("flag {flag:?} is missing its default variant {variant:?}")]
    MissingDefaultVariant { flag: String, variant: String },

    #[error("flag {flag:?} has variants of different types")]
    MixedVariantTypes { flag: String },

    #[error("flag {flag:?} has a non-finite number in {name:?}")]
    NonFiniteNumber { flag: String, name: String },

    #[error("flag {flag:?} has a rule without a name")]
    RuleMissingName { flag: String },

    #[error("rule {rule:?} of flag {flag:?} has no variant")]
    RuleMissingVariant { flag: String, rule: String },

    #[error("rule {rule:?} of flag {flag:?} references unknown variant {variant:?}")]
    UnknownVariant {
        flag: String,
        rule: String,
        variant: String,
    },

    #[error("flag {flag:?} has multiple rules named {rule:?}")]
    DuplicateRule { flag: String, rule: String },

    #[error("rule {rule:?} of flag {flag:?} has a rollout percentage outside 0..=100")]
    InvalidRollout { flag: String, rule: String },
}
