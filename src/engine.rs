use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    auth::{Authenticator, Authorization},
    config::SourceConfig,
    eval::Resolution,
    evaluation_logger::{EvaluationEvent, EvaluationLogger},
    flag::{FlagFormat, FlagSet, FlagType, Value},
    poller::{PollerThread, PollerThreadConfig},
    reader,
    sharder::Md5Sharder,
    store::FlagStore,
    EngineConfig, Error, EvaluationContext, Result,
};

/// Message returned alongside [`ErrorCode::FlagNotFound`].
pub const FLAG_NOT_FOUND_MESSAGE: &str = "FLAG_NOT_FOUND";
/// Message returned alongside [`ErrorCode::TypeMismatch`].
pub const TYPE_MISMATCH_MESSAGE: &str = "Flag is not of expected type";

/// How a resolution outcome was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// Part of the wire vocabulary; this engine doesn't produce it.
    Static,
    TargetingMatch,
    Default,
    Disabled,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Used for authentication failures. Carries no detail.
    General,
    FlagNotFound,
    TypeMismatch,
}

impl ErrorCode {
    /// The fixed message reported with this code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::General => "",
            ErrorCode::FlagNotFound => FLAG_NOT_FOUND_MESSAGE,
            ErrorCode::TypeMismatch => TYPE_MISMATCH_MESSAGE,
        }
    }
}

/// Result of resolving one flag.
///
/// On error `value` is the caller's default, `variant` is absent and `error_code` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult<T> {
    pub flag_key: String,
    pub value: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub reason: Reason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub flag_metadata: HashMap<String, Value>,
}

impl<T> ResolutionResult<T> {
    fn success(flag_key: &str, value: T, resolved: &Resolved) -> Self {
        ResolutionResult {
            flag_key: flag_key.to_owned(),
            value,
            variant: Some(resolved.resolution.variant.to_owned()),
            reason: resolved.resolution.reason,
            error_code: None,
            error_message: None,
            flag_metadata: resolved.metadata.clone(),
        }
    }

    fn error(flag_key: &str, default_value: T, error_code: ErrorCode) -> Self {
        ResolutionResult {
            flag_key: flag_key.to_owned(),
            value: default_value,
            variant: None,
            reason: Reason::Error,
            error_code: Some(error_code),
            error_message: Some(error_code.message().to_owned()),
            flag_metadata: HashMap::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.reason == Reason::Error
    }
}

/// Result of resolving every flag at once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResolution {
    /// Sorted by flag key.
    pub flags: Vec<ResolutionResult<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Rust types a flag can be resolved into.
pub trait FlagValue: Clone {
    const FLAG_TYPE: FlagType;

    /// `None` if `value` holds a different type.
    fn from_value(value: &Value) -> Option<Self>;

    fn to_value(&self) -> Value;
}

impl FlagValue for bool {
    const FLAG_TYPE: FlagType = FlagType::Boolean;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }
}

impl FlagValue for f64 {
    const FLAG_TYPE: FlagType = FlagType::Number;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        Value::Number(*self)
    }
}

impl FlagValue for String {
    const FLAG_TYPE: FlagType = FlagType::String;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }
}

/// The flag resolution engine.
///
/// In order to create an engine instance, first create [`EngineConfig`].
///
/// # Examples
/// ```
/// # use flags::{EngineConfig, EvaluationContext, Reason, ErrorCode};
/// let engine = EngineConfig::from_api_keys(["mytoken"]).to_engine();
///
/// // Nothing is loaded yet, so every flag is unknown.
/// let result = engine.resolve_boolean("Bearer mytoken", "new-ui", false, &EvaluationContext::default());
/// assert_eq!(result.reason, Reason::Error);
/// assert_eq!(result.error_code, Some(ErrorCode::FlagNotFound));
/// assert!(!result.value);
/// ```
pub struct Engine<'a> {
    store: Arc<FlagStore>,
    authenticator: Authenticator<'a>,
    evaluation_logger: Box<dyn EvaluationLogger + Send + Sync + 'a>,
    source: SourceConfig,
}

impl<'a> Engine<'a> {
    /// Create a new `Engine` with an empty flag store.
    pub fn new(config: EngineConfig<'a>) -> Self {
        Engine::new_with_store(config, Arc::new(FlagStore::new()))
    }

    /// Create a new `Engine` reading flags from an existing store.
    pub fn new_with_store(config: EngineConfig<'a>, store: Arc<FlagStore>) -> Self {
        Engine {
            store,
            authenticator: config.authenticator,
            evaluation_logger: config.evaluation_logger,
            source: config.source,
        }
    }

    pub fn store(&self) -> &Arc<FlagStore> {
        &self.store
    }

    pub fn resolve_boolean(
        &self,
        credential: &str,
        flag_key: &str,
        default_value: bool,
        context: &EvaluationContext,
    ) -> ResolutionResult<bool> {
        self.resolve(credential, flag_key, default_value, context)
    }

    pub fn resolve_number(
        &self,
        credential: &str,
        flag_key: &str,
        default_value: f64,
        context: &EvaluationContext,
    ) -> ResolutionResult<f64> {
        self.resolve(credential, flag_key, default_value, context)
    }

    pub fn resolve_string(
        &self,
        credential: &str,
        flag_key: &str,
        default_value: impl Into<String>,
        context: &EvaluationContext,
    ) -> ResolutionResult<String> {
        self.resolve(credential, flag_key, default_value.into(), context)
    }

    /// Resolve `flag_key` as a `T`.
    ///
    /// Checks run in order: credential, flag existence, declared type, enablement, then rules.
    /// Every error path returns `default_value`.
    pub fn resolve<T: FlagValue>(
        &self,
        credential: &str,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> ResolutionResult<T> {
        let result = match self.authenticator.authenticate(credential) {
            Authorization::Authorized => {
                let flags = self.store.snapshot();
                match resolve_in(&flags, flag_key, Some(T::FLAG_TYPE), context) {
                    Ok(resolved) => match T::from_value(resolved.resolution.value) {
                        Some(value) => ResolutionResult::success(flag_key, value, &resolved),
                        None => {
                            ResolutionResult::error(flag_key, default_value, ErrorCode::TypeMismatch)
                        }
                    },
                    Err(error_code) => ResolutionResult::error(flag_key, default_value, error_code),
                }
            }
            Authorization::Unauthorized => {
                ResolutionResult::error(flag_key, default_value, ErrorCode::General)
            }
        };

        log::trace!(target: "flags",
                    flag_key,
                    targeting_key = context.targeting_key(),
                    reason:serde = result.reason,
                    variant:serde = result.variant,
                    error_code:serde = result.error_code;
                    "resolved a flag");

        self.evaluation_logger.log_evaluation(EvaluationEvent {
            creation_date: chrono::Utc::now().timestamp(),
            key: result.flag_key.clone(),
            value: result.value.to_value(),
            variant: result.variant.clone(),
            reason: result.reason,
            error_code: result.error_code,
            error_message: result.error_message.clone(),
        });

        result
    }

    /// Resolve every flag of the current snapshot with its own declared type.
    pub fn resolve_all(&self, credential: &str, context: &EvaluationContext) -> BulkResolution {
        if self.authenticator.authenticate(credential) == Authorization::Unauthorized {
            return BulkResolution {
                flags: Vec::new(),
                error_code: Some(ErrorCode::General),
                error_message: Some(ErrorCode::General.message().to_owned()),
            };
        }

        let flags = self.store.snapshot();
        let results = flags
            .keys()
            .into_iter()
            .filter_map(|flag_key| match resolve_in(&flags, flag_key, None, context) {
                Ok(resolved) => Some(ResolutionResult::success(
                    flag_key,
                    resolved.resolution.value.clone(),
                    &resolved,
                )),
                Err(error_code) => {
                    log::warn!(target: "flags",
                               flag_key,
                               error_code:serde = error_code;
                               "skipping flag that failed to resolve");
                    None
                }
            })
            .collect::<Vec<_>>();

        log::trace!(target: "flags",
                    targeting_key = context.targeting_key(),
                    count = results.len();
                    "resolved all flags");

        BulkResolution {
            flags: results,
            error_code: None,
            error_message: None,
        }
    }

    /// Start a poller thread that keeps the store in sync with the configured flags location.
    pub fn start_poller_thread(&self) -> Result<PollerThread> {
        let location = self
            .source
            .location
            .as_deref()
            .ok_or(Error::MissingFlagsLocation)?;

        PollerThread::start(PollerThreadConfig {
            store: self.store.clone(),
            reader: reader::from_location(location, self.source.token.clone())?,
            format: self
                .source
                .format
                .unwrap_or_else(|| FlagFormat::from_path(location)),
            interval: self.source.interval,
        })
    }
}

struct Resolved<'f> {
    resolution: Resolution<'f>,
    metadata: &'f HashMap<String, Value>,
}

/// Look up and run one flag of `flags`. `expected` is the type the caller asked for, if any.
fn resolve_in<'f>(
    flags: &'f FlagSet,
    flag_key: &str,
    expected: Option<FlagType>,
    context: &EvaluationContext,
) -> std::result::Result<Resolved<'f>, ErrorCode> {
    let flag = flags.get(flag_key).ok_or(ErrorCode::FlagNotFound)?;

    if let Some(expected) = expected {
        if flag.flag_type() != expected {
            return Err(ErrorCode::TypeMismatch);
        }
    }

    let resolution = flag
        .resolve(context, &Md5Sharder)
        .ok_or(ErrorCode::General)?;

    Ok(Resolved {
        resolution,
        metadata: flag.metadata(),
    })
}
