use std::{
    collections::{HashMap, HashSet},
    path::Path,
    str::FromStr,
    sync::Arc,
};

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::{rules::TargetingRule, ConfigurationError, Error, Result};

/// Variant name used when a flag doesn't specify `defaultVariant`.
pub const DEFAULT_VARIANT: &str = "default";

/// Concrete value of a flag variant.
///
/// The set is closed: a flag serves booleans, numbers or strings, and the engine never converts
/// between them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, From)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Number(f64),
    String(String),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl Value {
    pub fn flag_type(&self) -> FlagType {
        match self {
            Value::Boolean(_) => FlagType::Boolean,
            Value::Number(_) => FlagType::Number,
            Value::String(_) => FlagType::String,
        }
    }

    /// Canonical string form, matching [`AttributeValue`](crate::AttributeValue)'s.
    pub(crate) fn to_comparable_string(&self) -> String {
        match self {
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagType {
    Boolean,
    Number,
    String,
}

/// A flag as written in a flag file. Turned into a [`FlagDefinition`] after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FlagConfig {
    /// Flags are disabled unless explicitly enabled.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_variant_name")]
    pub default_variant: String,
    #[serde(default)]
    pub variants: HashMap<String, Value>,
    #[serde(default)]
    pub rules: Vec<TargetingRule>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

fn default_variant_name() -> String {
    DEFAULT_VARIANT.to_owned()
}

impl Default for FlagConfig {
    fn default() -> Self {
        FlagConfig {
            enabled: false,
            default_variant: default_variant_name(),
            variants: HashMap::new(),
            rules: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

/// A validated flag.
///
/// Every variant referenced by a rule or by the default variant exists, and all variants share
/// the flag's declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagDefinition {
    pub(crate) key: String,
    pub(crate) flag_type: FlagType,
    pub(crate) enabled: bool,
    pub(crate) default_variant: String,
    pub(crate) variants: HashMap<String, Value>,
    pub(crate) rules: Vec<TargetingRule>,
    pub(crate) metadata: HashMap<String, Value>,
}

impl FlagDefinition {
    pub fn try_from_config(
        key: impl Into<String>,
        config: FlagConfig,
    ) -> std::result::Result<Self, ConfigurationError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ConfigurationError::MissingKey);
        }

        let mut variant_types = config.variants.values().map(Value::flag_type);
        let Some(flag_type) = variant_types.next() else {
            return Err(ConfigurationError::NoVariants { flag: key });
        };
        if variant_types.any(|t| t != flag_type) {
            return Err(ConfigurationError::MixedVariantTypes { flag: key });
        }

        let non_finite = config
            .variants
            .iter()
            .chain(&config.metadata)
            .find(|(_, value)| matches!(value, Value::Number(n) if !n.is_finite()));
        if let Some((name, _)) = non_finite {
            return Err(ConfigurationError::NonFiniteNumber {
                flag: key,
                name: name.clone(),
            });
        }

        if !config.variants.contains_key(&config.default_variant) {
            return Err(ConfigurationError::MissingDefaultVariant {
                flag: key,
                variant: config.default_variant,
            });
        }

        let mut rule_names = HashSet::new();
        for rule in &config.rules {
            rule.validate(&key, &config.variants)?;
            if !rule_names.insert(rule.name.as_str()) {
                return Err(ConfigurationError::DuplicateRule {
                    flag: key.clone(),
                    rule: rule.name.clone(),
                });
            }
        }

        Ok(FlagDefinition {
            key,
            flag_type,
            enabled: config.enabled,
            default_variant: config.default_variant,
            variants: config.variants,
            rules: config.rules,
            metadata: config.metadata,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn flag_type(&self) -> FlagType {
        self.flag_type
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn default_variant(&self) -> &str {
        &self.default_variant
    }

    pub fn variant_value(&self, variant: &str) -> Option<&Value> {
        self.variants.get(variant)
    }

    pub fn rules(&self) -> &[TargetingRule] {
        &self.rules
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }
}

/// Serialization format of a flag file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagFormat {
    Json,
    #[default]
    Yaml,
}

impl FlagFormat {
    /// Guess format from file extension: `.json` is JSON, anything else is YAML.
    pub fn from_path(path: impl AsRef<Path>) -> FlagFormat {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => FlagFormat::Json,
            _ => FlagFormat::Yaml,
        }
    }

    /// Parse a case-insensitive format name (`json` or `yaml`/`yml`).
    pub fn from_name(name: &str) -> Option<FlagFormat> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(FlagFormat::Json),
            "yaml" | "yml" => Some(FlagFormat::Yaml),
            _ => None,
        }
    }
}

impl FromStr for FlagFormat {
    type Err = Error;

    fn from_str(name: &str) -> Result<FlagFormat> {
        FlagFormat::from_name(name.trim()).ok_or_else(|| Error::InvalidSetting {
            name: "flag_format",
            value: name.to_owned(),
        })
    }
}

/// An immutable, validated set of flags. This is the snapshot unit of [`FlagStore`](crate::FlagStore).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagSet {
    flags: HashMap<String, Arc<FlagDefinition>>,
}

impl FlagSet {
    /// Parse and validate a flag file. Any invalid flag rejects the whole set.
    pub fn from_slice(bytes: &[u8], format: FlagFormat) -> Result<FlagSet> {
        let configs: HashMap<String, FlagConfig> = match format {
            FlagFormat::Json => serde_json::from_slice(bytes)?,
            FlagFormat::Yaml => serde_yaml::from_slice(bytes)?,
        };
        FlagSet::from_configs(configs)
    }

    pub fn from_configs(configs: HashMap<String, FlagConfig>) -> Result<FlagSet> {
        let flags: HashMap<String, Arc<FlagDefinition>> = configs
            .into_iter()
            .map(|(key, config)| {
                FlagDefinition::try_from_config(key.clone(), config)
                    .map(|flag| (key, Arc::new(flag)))
            })
            .collect::<std::result::Result<_, ConfigurationError>>()
            .map_err(Error::from)?;
        Ok(FlagSet { flags })
    }

    pub fn get(&self, flag_key: &str) -> Option<&Arc<FlagDefinition>> {
        self.flags.get(flag_key)
    }

    /// Flag keys in lexicographic order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.flags.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// What changed going from `self` to `next`.
    pub fn diff(&self, next: &FlagSet) -> FlagDiff {
        let mut diff = FlagDiff::default();
        for (key, flag) in &self.flags {
            match next.flags.get(key) {
                None => diff.deleted.push(key.clone()),
                Some(next_flag) if next_flag != flag => diff.updated.push(key.clone()),
                Some(_) => {}
            }
        }
        for key in next.flags.keys() {
            if !self.flags.contains_key(key) {
                diff.added.push(key.clone());
            }
        }
        diff.added.sort_unstable();
        diff.deleted.sort_unstable();
        diff.updated.sort_unstable();
        diff
    }
}

/// Flag keys that differ between two snapshots, each list sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlagDiff {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub updated: Vec<String>,
}

impl FlagDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.updated.is_empty()
    }
}
