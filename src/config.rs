use std::time::Duration;

use envconfig::Envconfig;

use crate::{
    auth::{ApiKeys, Authenticator, CredentialRegistry},
    evaluation_logger::NoopEvaluationLogger,
    flag::FlagFormat,
    Engine, Error, EvaluationLogger, Result,
};

/// Where the poller reads flags from.
pub(crate) struct SourceConfig {
    pub location: Option<String>,
    /// `None` means guess from the location's extension.
    pub format: Option<FlagFormat>,
    pub interval: Duration,
    pub token: Option<String>,
}

/// Environment settings, see [`EngineConfig::from_env`].
#[derive(Envconfig, Debug)]
struct Settings {
    #[envconfig(from = "API_KEYS", default = "")]
    api_keys: String,

    #[envconfig(from = "FLAGS_LOCATION")]
    flags_location: Option<String>,

    #[envconfig(from = "FLAG_FORMAT")]
    flag_format: Option<FlagFormat>,

    /// Seconds between reads.
    #[envconfig(from = "READ_INTERVAL", default = "60")]
    read_interval: u64,

    #[envconfig(from = "READ_TOKEN")]
    read_token: Option<String>,
}

impl Settings {
    fn into_config<'a>(self) -> Result<EngineConfig<'a>> {
        if self.read_interval == 0 {
            return Err(Error::InvalidSetting {
                name: "READ_INTERVAL",
                value: self.read_interval.to_string(),
            });
        }

        let mut config = EngineConfig::from_credential_registry(ApiKeys::parse(&self.api_keys));
        config.read_interval(Duration::from_secs(self.read_interval));
        if let Some(location) = non_blank(self.flags_location) {
            config.flags_location(location);
        }
        if let Some(format) = self.flag_format {
            config.flag_format(format);
        }
        if let Some(token) = non_blank(self.read_token) {
            config.read_token(token);
        }
        Ok(config)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Turn an envconfig failure into [`Error::InvalidSetting`], looking up the offending value.
fn invalid_setting(err: envconfig::Error, lookup: impl Fn(&str) -> Option<String>) -> Error {
    let name = match err {
        envconfig::Error::EnvVarMissing { name } | envconfig::Error::ParseError { name } => name,
    };
    Error::InvalidSetting {
        name,
        value: lookup(name).unwrap_or_default(),
    }
}

/// Configuration for [`Engine`].
pub struct EngineConfig<'a> {
    pub(crate) authenticator: Authenticator<'a>,
    pub(crate) evaluation_logger: Box<dyn EvaluationLogger + Send + Sync + 'a>,
    pub(crate) source: SourceConfig,
}

impl<'a> EngineConfig<'a> {
    /// Default interval between flag reads.
    pub const DEFAULT_READ_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a default configuration accepting the specified API keys.
    ///
    /// ```
    /// # use flags::EngineConfig;
    /// EngineConfig::from_api_keys(["api-key"]);
    /// ```
    pub fn from_api_keys<S: Into<String>>(api_keys: impl IntoIterator<Item = S>) -> Self {
        EngineConfig::from_credential_registry(api_keys.into_iter().collect::<ApiKeys>())
    }

    /// Create a default configuration checking bearer tokens against `registry`.
    ///
    /// ```
    /// # use flags::EngineConfig;
    /// EngineConfig::from_credential_registry(|token: &str| token.starts_with("svc-"));
    /// ```
    pub fn from_credential_registry(registry: impl CredentialRegistry + Send + Sync + 'a) -> Self {
        EngineConfig {
            authenticator: Authenticator::new(registry),
            evaluation_logger: Box::new(NoopEvaluationLogger),
            source: SourceConfig {
                location: None,
                format: None,
                interval: EngineConfig::DEFAULT_READ_INTERVAL,
                token: None,
            },
        }
    }

    /// Build a configuration from the process environment.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `API_KEYS` | comma-separated accepted bearer tokens |
    /// | `FLAGS_LOCATION` | file path or `http(s)://` URL of the flag file |
    /// | `FLAG_FORMAT` | `json` or `yaml`, guessed from the location when unset |
    /// | `READ_INTERVAL` | seconds between reads, default 60 |
    /// | `READ_TOKEN` | bearer token sent to the flag source |
    pub fn from_env() -> Result<Self> {
        let settings = Settings::init_from_env()
            .map_err(|err| invalid_setting(err, |name| std::env::var(name).ok()))?;
        settings.into_config()
    }

    /// Set the file path or `http(s)://` URL flags are read from by the poller.
    pub fn flags_location(&mut self, location: impl Into<String>) -> &mut Self {
        self.source.location = Some(location.into());
        self
    }

    /// Override the flag file format. By default, `.json` locations are parsed as JSON and
    /// everything else as YAML.
    pub fn flag_format(&mut self, format: FlagFormat) -> &mut Self {
        self.source.format = Some(format);
        self
    }

    pub fn read_interval(&mut self, interval: Duration) -> &mut Self {
        self.source.interval = interval;
        self
    }

    /// Bearer token sent when reading flags over HTTP.
    pub fn read_token(&mut self, token: impl Into<String>) -> &mut Self {
        self.source.token = Some(token.into());
        self
    }

    /// Set evaluation logger to pass resolution events to your data warehouse.
    ///
    /// ```
    /// # use flags::{EngineConfig, EvaluationEvent};
    /// let mut config = EngineConfig::from_api_keys(["api-key"]);
    /// config.evaluation_logger(|event: EvaluationEvent| {
    ///   println!("{:?}", event);
    /// });
    /// ```
    pub fn evaluation_logger(
        &mut self,
        evaluation_logger: impl EvaluationLogger + Send + Sync + 'a,
    ) -> &mut Self {
        self.evaluation_logger = Box::new(evaluation_logger);
        self
    }

    /// Create a new [`Engine`] using the specified configuration.
    ///
    /// ```
    /// # use flags::{EngineConfig, Engine};
    /// let engine: Engine = EngineConfig::from_api_keys(["api-key"]).to_engine();
    /// ```
    pub fn to_engine(self) -> Engine<'a> {
        Engine::new(self)
    }
}
