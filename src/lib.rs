//! A feature flag resolution engine.
//!
//! # Overview
//!
//! The crate revolves around an [`Engine`] that resolves feature flag values for an
//! [`EvaluationContext`]: a targeting key plus arbitrary typed attributes. Every resolution
//! returns a [`ResolutionResult`] carrying the value, the variant that produced it, a [`Reason`]
//! and, on failure, an [`ErrorCode`]. Failures never panic and always hand back the caller's
//! default value.
//!
//! Callers present a bearer credential that is checked against a [`CredentialRegistry`] before
//! any flag is looked up. Flags live in a [`FlagStore`] as immutable [`FlagSet`] snapshots,
//! which a [`PollerThread`] can keep in sync with a YAML or JSON flag file on disk or over
//! HTTP.
//!
//! An [`EvaluationLogger`] may be provided to export an [`EvaluationEvent`] for each
//! resolution.
//!
//! # Error Handling
//!
//! Request-time problems are reported through [`ErrorCode`]. Configuration and loading problems
//! are represented by the [`Error`] enum.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages
//! under the `flags` target. Consider integrating a `log`-compatible logger implementation for
//! better visibility into engine operations.
//!
//! # Examples
//!
//! ```
//! # use flags::{EngineConfig, EvaluationContext, FlagFormat, FlagSet, Reason};
//! let engine = EngineConfig::from_api_keys(["mytoken"]).to_engine();
//! engine.store().set_flags(FlagSet::from_slice(br#"
//! new-checkout:
//!   enabled: true
//!   variants: { default: false, "on": true }
//!   rules:
//!     - name: beta-testers
//!       variant: "on"
//!       conditions:
//!         - { attribute: beta, operator: EQUALS, value: true }
//! "#, FlagFormat::Yaml)?);
//!
//! let context = EvaluationContext::new("user-1").with_attribute("beta", true);
//! let result = engine.resolve_boolean("Bearer mytoken", "new-checkout", false, &context);
//! assert!(result.value);
//! assert_eq!(result.reason, Reason::TargetingMatch);
//! # Ok::<(), flags::Error>(())
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

mod auth;
mod config;
mod context;
mod engine;
mod error;
mod eval;
mod evaluation_logger;
mod flag;
mod poller;
mod reader;
mod rules;
mod sharder;
mod store;

pub use auth::{ApiKeys, Authenticator, Authorization, CredentialRegistry, BEARER_SCHEME};
pub use config::EngineConfig;
pub use context::{AttributeValue, Attributes, EvaluationContext, TARGETING_KEY};
pub use engine::{
    BulkResolution, Engine, ErrorCode, FlagValue, Reason, ResolutionResult,
    FLAG_NOT_FOUND_MESSAGE, TYPE_MISMATCH_MESSAGE,
};
pub use error::{ConfigurationError, Error, Result};
pub use evaluation_logger::{EvaluationEvent, EvaluationLogger};
pub use flag::{
    FlagConfig, FlagDefinition, FlagDiff, FlagFormat, FlagSet, FlagType, Value, DEFAULT_VARIANT,
};
pub use poller::PollerThread;
pub use reader::{FlagReader, HttpReader, LocalFileReader};
pub use rules::{Condition, ConditionValue, Operator, Rollout, TargetingRule};
pub use store::FlagStore;
