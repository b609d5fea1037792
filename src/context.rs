use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Name under which the targeting key is visible to rule conditions.
pub const TARGETING_KEY: &str = "targetingKey";

pub type Attributes = HashMap<String, AttributeValue>;

/// Per-request evaluation context: a targeting key plus arbitrary attributes.
///
/// Serializes as a flat object, the way OpenFeature providers send it:
///
/// ```
/// # use flags::EvaluationContext;
/// let context: EvaluationContext =
///     serde_json::from_str(r#"{"targetingKey": "123456", "plan": "pro"}"#).unwrap();
/// assert_eq!(context.targeting_key(), "123456");
/// assert_eq!(context.attributes()["plan"], "pro".into());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    /// An absent targeting key is the empty string, which is a legal value.
    #[serde(default)]
    targeting_key: String,
    #[serde(flatten)]
    attributes: Attributes,
}

impl EvaluationContext {
    pub fn new(targeting_key: impl Into<String>) -> Self {
        EvaluationContext {
            targeting_key: targeting_key.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add an attribute to the context.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn targeting_key(&self) -> &str {
        &self.targeting_key
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Attributes as seen by rule conditions: the context attributes with `targetingKey`
    /// overriding any attribute of the same name.
    pub(crate) fn augmented_attributes(&self) -> Attributes {
        let mut attributes = self.attributes.clone();
        attributes.insert(
            TARGETING_KEY.to_owned(),
            AttributeValue::String(self.targeting_key.clone()),
        );
        attributes
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Number(f64),
    Boolean(bool),
    List(Vec<AttributeValue>),
    Object(HashMap<String, AttributeValue>),
    Null,
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl AttributeValue {
    /// Canonical string form of a scalar attribute, used for equality and set membership.
    pub(crate) fn to_comparable_string(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Number(n) => Some(n.to_string()),
            AttributeValue::Boolean(b) => Some(b.to_string()),
            AttributeValue::List(_) | AttributeValue::Object(_) | AttributeValue::Null => None,
        }
    }
}

/// Look up `name` in `attributes`.
///
/// An attribute whose name literally equals `name` wins. Otherwise a dotted name (`user.plan`)
/// walks through nested objects.
pub(crate) fn lookup<'a>(attributes: &'a Attributes, name: &str) -> Option<&'a AttributeValue> {
    if let Some(value) = attributes.get(name) {
        return Some(value);
    }

    let mut segments = name.split('.');
    let mut current = attributes.get(segments.next()?)?;
    for segment in segments {
        match current {
            AttributeValue::Object(object) => current = object.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}
