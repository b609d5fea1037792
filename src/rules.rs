use std::collections::HashMap;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{
    context::{self, AttributeValue, Attributes},
    sharder::{Sharder, TOTAL_SHARDS},
    ConfigurationError, EvaluationContext, Value,
};

/// Find the first rule in `rules` that matches `context`.
///
/// Rules are tried in declaration order. `None` means no rule matched and the caller should
/// fall back to the flag's default variant.
pub fn evaluate<'r>(
    rules: &'r [TargetingRule],
    context: &EvaluationContext,
    sharder: &impl Sharder,
) -> Option<&'r TargetingRule> {
    if rules.is_empty() {
        return None;
    }

    let attributes = context.augmented_attributes();
    rules
        .iter()
        .find(|rule| rule.matches(&attributes, context.targeting_key(), sharder))
}

/// A predicate over the evaluation context paired with the variant it selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetingRule {
    pub name: String,
    pub variant: String,
    /// All conditions must hold. No conditions means the rule always matches.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub rollout: Option<Rollout>,
}

impl TargetingRule {
    pub(crate) fn matches(
        &self,
        attributes: &Attributes,
        targeting_key: &str,
        sharder: &impl Sharder,
    ) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.eval(attributes))
            && self.rollout.as_ref().map_or(true, |rollout| {
                rollout.contains(&self.name, targeting_key, sharder)
            })
    }

    pub(crate) fn validate(
        &self,
        flag_key: &str,
        variants: &HashMap<String, Value>,
    ) -> Result<(), ConfigurationError> {
        if self.name.is_empty() {
            return Err(ConfigurationError::RuleMissingName {
                flag: flag_key.to_owned(),
            });
        }
        if self.variant.is_empty() {
            return Err(ConfigurationError::RuleMissingVariant {
                flag: flag_key.to_owned(),
                rule: self.name.clone(),
            });
        }
        if !variants.contains_key(&self.variant) {
            return Err(ConfigurationError::UnknownVariant {
                flag: flag_key.to_owned(),
                rule: self.name.clone(),
                variant: self.variant.clone(),
            });
        }
        if let Some(rollout) = &self.rollout {
            if !(0.0..=100.0).contains(&rollout.percentage) {
                return Err(ConfigurationError::InvalidRollout {
                    flag: flag_key.to_owned(),
                    rule: self.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Restricts a rule to a deterministic percentage of targeting keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Rollout {
    pub percentage: f64,
    /// Defaults to the rule name.
    #[serde(default)]
    pub salt: Option<String>,
}

impl Rollout {
    fn contains(&self, rule_name: &str, targeting_key: &str, sharder: &impl Sharder) -> bool {
        let salt = self.salt.as_deref().unwrap_or(rule_name);
        let shard = sharder.get_shard(&format!("{}-{}", salt, targeting_key), TOTAL_SHARDS);
        (shard as f64) < self.percentage * (TOTAL_SHARDS as f64) / 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Condition {
    pub attribute: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

impl Condition {
    pub fn eval(&self, attributes: &Attributes) -> bool {
        self.operator
            .eval(context::lookup(attributes, &self.attribute), &self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Multiple(Vec<Value>),
    Single(Value),
}

impl<T: Into<Value>> From<T> for ConditionValue {
    fn from(value: T) -> Self {
        Self::Single(value.into())
    }
}
impl<T: Into<Value>> From<Vec<T>> for ConditionValue {
    fn from(value: Vec<T>) -> Self {
        Self::Multiple(value.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    NotEquals,
    OneOf,
    NotOneOf,
    StartsWith,
    EndsWith,
    Matches,
    NotMatches,
    Gte,
    Gt,
    Lte,
    Lt,
    IsNull,
}

impl Operator {
    /// Applying `Operator` to the values. Returns `false` if the operator cannot be applied or
    /// there's a misconfiguration.
    pub fn eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
    ) -> bool {
        self.try_eval(attribute, condition_value).unwrap_or(false)
    }

    /// Try applying `Operator` to the values, returning `None` if the operator cannot be applied.
    fn try_eval(
        &self,
        attribute: Option<&AttributeValue>,
        condition_value: &ConditionValue,
    ) -> Option<bool> {
        match self {
            Self::Equals | Self::NotEquals => {
                let s = attribute?.to_comparable_string()?;
                let expected = match condition_value {
                    ConditionValue::Single(v) => v.to_comparable_string(),
                    _ => return None,
                };
                let equals = s == expected;
                Some(if *self == Self::Equals {
                    equals
                } else {
                    !equals
                })
            }

            Self::OneOf | Self::NotOneOf => {
                let s = attribute?.to_comparable_string()?;
                let values = match condition_value {
                    ConditionValue::Multiple(v) => v,
                    _ => return None,
                };
                let is_one_of = values.iter().any(|v| v.to_comparable_string() == s);
                Some(if *self == Self::OneOf {
                    is_one_of
                } else {
                    !is_one_of
                })
            }

            Self::StartsWith | Self::EndsWith => {
                let s = match attribute {
                    Some(AttributeValue::String(s)) => s,
                    _ => return None,
                };
                let affix = match condition_value {
                    ConditionValue::Single(Value::String(affix)) => affix,
                    _ => return None,
                };
                Some(if *self == Self::StartsWith {
                    s.starts_with(affix.as_str())
                } else {
                    s.ends_with(affix.as_str())
                })
            }

            Self::Matches | Self::NotMatches => {
                let s = match attribute {
                    Some(AttributeValue::String(s)) => s,
                    _ => return None,
                };
                let regex = match condition_value {
                    ConditionValue::Single(Value::String(s)) => Regex::new(s).ok()?,
                    _ => return None,
                };
                let matches = regex.is_match(s);
                Some(if *self == Self::Matches {
                    matches
                } else {
                    !matches
                })
            }

            Self::IsNull => {
                let is_null = matches!(attribute, None | Some(AttributeValue::Null));
                match condition_value {
                    ConditionValue::Single(Value::Boolean(true)) => Some(is_null),
                    ConditionValue::Single(Value::Boolean(false)) => Some(!is_null),
                    _ => None,
                }
            }

            Self::Gte | Self::Gt | Self::Lte | Self::Lt => {
                let condition_version = match condition_value {
                    ConditionValue::Single(Value::String(s)) => Version::parse(s).ok(),
                    _ => None,
                };

                let ordering = if let Some(condition_version) = condition_version {
                    let attribute_version = match attribute {
                        Some(AttributeValue::String(s)) => Version::parse(s).ok(),
                        _ => None,
                    }?;
                    attribute_version.cmp(&condition_version)
                } else {
                    let condition_value = match condition_value {
                        ConditionValue::Single(Value::Number(n)) => *n,
                        ConditionValue::Single(Value::String(s)) => s.parse().ok()?,
                        _ => return None,
                    };
                    let attribute_value = match attribute {
                        Some(AttributeValue::Number(n)) => *n,
                        Some(AttributeValue::String(s)) => s.parse().ok()?,
                        _ => return None,
                    };
                    attribute_value.partial_cmp(&condition_value)?
                };

                Some(match self {
                    Self::Gt => ordering.is_gt(),
                    Self::Gte => ordering.is_ge(),
                    Self::Lt => ordering.is_lt(),
                    Self::Lte => ordering.is_le(),
                    _ => {
                        // unreachable
                        return None;
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::{
        context::AttributeValue,
        rules::{Condition, Operator, Rollout},
        sharder::{DeterministicSharder, Md5Sharder},
        EvaluationContext, Value,
    };

    use super::{evaluate, TargetingRule};

    fn rule(name: &str, variant: &str, conditions: Vec<Condition>) -> TargetingRule {
        TargetingRule {
            name: name.into(),
            variant: variant.into(),
            conditions,
            rollout: None,
        }
    }

    fn targeting_key_one_of(keys: &[&str]) -> Condition {
        Condition {
            attribute: "targetingKey".into(),
            operator: Operator::OneOf,
            value: keys.to_vec().into(),
        }
    }

    #[test]
    fn equals() {
        assert!(Operator::Equals.eval(Some(&"alice".into()), &"alice".into()));
        assert!(!Operator::Equals.eval(Some(&"bob".into()), &"alice".into()));
        assert!(Operator::Equals.eval(Some(&42.0.into()), &"42".into()));
        assert!(Operator::Equals.eval(Some(&true.into()), &true.into()));
        assert!(!Operator::Equals.eval(None, &"alice".into()));
    }

    #[test]
    fn not_equals() {
        assert!(Operator::NotEquals.eval(Some(&"bob".into()), &"alice".into()));
        assert!(!Operator::NotEquals.eval(Some(&"alice".into()), &"alice".into()));
        // NOT_EQUALS fails when attribute is not specified
        assert!(!Operator::NotEquals.eval(None, &"alice".into()));
    }

    #[test]
    fn matches_regex() {
        assert!(Operator::Matches.eval(Some(&"test@example.com".into()), &"^test.*".into()));
        assert!(!Operator::Matches.eval(Some(&"example@test.com".into()), &"^test.*".into()));
        assert!(!Operator::Matches.eval(Some(&"test".into()), &"(unclosed".into()));
    }

    #[test]
    fn not_matches_regex() {
        assert!(!Operator::NotMatches.eval(Some(&"test@example.com".into()), &"^test.*".into()));
        assert!(!Operator::NotMatches.eval(None, &"^test.*".into()));
        assert!(Operator::NotMatches.eval(Some(&"example@test.com".into()), &"^test.*".into()));
    }

    #[test]
    fn starts_and_ends_with() {
        assert!(Operator::EndsWith.eval(Some(&"john@company.com".into()), &"@company.com".into()));
        assert!(!Operator::EndsWith.eval(Some(&"john@other.com".into()), &"@company.com".into()));
        assert!(Operator::StartsWith.eval(Some(&"beta-user".into()), &"beta-".into()));
        assert!(!Operator::StartsWith.eval(Some(&1.0.into()), &"1".into()));
    }

    #[test]
    fn one_of() {
        assert!(Operator::OneOf.eval(
            Some(&"alice".into()),
            &vec![Value::from("alice"), Value::from("bob")].into()
        ));
        assert!(!Operator::OneOf.eval(
            Some(&"charlie".into()),
            &vec![Value::from("alice"), Value::from("bob")].into()
        ));
        assert!(Operator::OneOf.eval(Some(&42.0.into()), &vec![Value::from(42.0)].into()));
    }

    #[test]
    fn not_one_of() {
        assert!(Operator::NotOneOf.eval(
            Some(&"charlie".into()),
            &vec![Value::from("alice"), Value::from("bob")].into()
        ));
        assert!(!Operator::NotOneOf.eval(
            Some(&"alice".into()),
            &vec![Value::from("alice"), Value::from("bob")].into()
        ));

        // NOT_ONE_OF fails when attribute is not specified
        assert!(
            !Operator::NotOneOf.eval(None, &vec![Value::from("alice"), Value::from("bob")].into())
        );
    }

    #[test]
    fn one_of_bool() {
        assert!(Operator::OneOf.eval(Some(&true.into()), &vec![Value::from("true")].into()));
        assert!(!Operator::OneOf.eval(Some(&1.0.into()), &vec![Value::from("true")].into()));
        assert!(!Operator::OneOf.eval(None, &vec![Value::from("true")].into()));
    }

    #[test]
    fn is_null() {
        assert!(Operator::IsNull.eval(None, &true.into()));
        assert!(Operator::IsNull.eval(Some(&AttributeValue::Null), &true.into()));
        assert!(!Operator::IsNull.eval(Some(&10.0.into()), &true.into()));
        assert!(Operator::IsNull.eval(Some(&10.0.into()), &false.into()));
    }

    #[test]
    fn numeric_comparison() {
        assert!(Operator::Gte.eval(Some(&18.0.into()), &18.0.into()));
        assert!(!Operator::Gte.eval(Some(&17.0.into()), &18.0.into()));
        assert!(Operator::Gt.eval(Some(&19.0.into()), &18.0.into()));
        assert!(!Operator::Gt.eval(Some(&18.0.into()), &18.0.into()));
        assert!(Operator::Lte.eval(Some(&"18".into()), &18.0.into()));
        assert!(Operator::Lt.eval(Some(&17.0.into()), &"18".into()));
        assert!(!Operator::Lt.eval(Some(&true.into()), &18.0.into()));
    }

    #[test]
    fn semver_comparison() {
        assert!(Operator::Gte.eval(Some(&"1.0.1".into()), &"1.0.0".into()));
        assert!(!Operator::Gte.eval(Some(&"1.2.0".into()), &"1.10.0".into()));
        assert!(Operator::Gt.eval(Some(&"1.13.0".into()), &"1.5.0".into()));
        assert!(Operator::Lt.eval(Some(&"0.9.9".into()), &"1.0.0".into()));
        assert!(!Operator::Lte.eval(Some(&"1.0.1".into()), &"1.0.0".into()));
    }

    #[test]
    fn nested_attribute_condition() {
        let condition = Condition {
            attribute: "org.tier".into(),
            operator: Operator::Equals,
            value: "gold".into(),
        };
        let attributes = HashMap::from([(
            "org".to_owned(),
            AttributeValue::Object(HashMap::from([("tier".to_owned(), "gold".into())])),
        )]);
        assert!(condition.eval(&attributes));
    }

    #[test]
    fn empty_rule_always_matches() {
        let rule = rule("always", "on", vec![]);
        assert!(rule.matches(&HashMap::new(), "", &Md5Sharder));
    }

    #[test]
    fn first_match_wins() {
        let rules = vec![
            rule("allow-list", "true", vec![targeting_key_one_of(&["123456"])]),
            rule("everyone-else", "false", vec![]),
        ];

        let matched = evaluate(&rules, &EvaluationContext::new("123456"), &Md5Sharder);
        assert_eq!(matched.map(|r| r.variant.as_str()), Some("true"));

        let matched = evaluate(&rules, &EvaluationContext::new("654321"), &Md5Sharder);
        assert_eq!(matched.map(|r| r.variant.as_str()), Some("false"));
    }

    #[test]
    fn no_match() {
        let rules = vec![rule(
            "allow-list",
            "true",
            vec![targeting_key_one_of(&["123456"])],
        )];
        assert!(evaluate(&rules, &EvaluationContext::new(""), &Md5Sharder).is_none());
        assert!(evaluate(&[], &EvaluationContext::new("123456"), &Md5Sharder).is_none());
    }

    #[test]
    fn empty_targeting_key_is_a_value() {
        let rules = vec![rule("anonymous", "anon", vec![targeting_key_one_of(&[""])])];
        let matched = evaluate(&rules, &EvaluationContext::default(), &Md5Sharder);
        assert_eq!(matched.map(|r| r.name.as_str()), Some("anonymous"));
    }

    #[test]
    fn all_conditions_must_hold() {
        let rules = vec![rule(
            "adults",
            "on",
            vec![
                Condition {
                    attribute: "age".into(),
                    operator: Operator::Gt,
                    value: 18.0.into(),
                },
                Condition {
                    attribute: "age".into(),
                    operator: Operator::Lt,
                    value: 100.0.into(),
                },
            ],
        )];

        let context = EvaluationContext::new("u").with_attribute("age", 20.0);
        assert!(evaluate(&rules, &context, &Md5Sharder).is_some());
        let context = EvaluationContext::new("u").with_attribute("age", 110.0);
        assert!(evaluate(&rules, &context, &Md5Sharder).is_none());
        let context = EvaluationContext::new("u").with_attribute("name", "alice");
        assert!(evaluate(&rules, &context, &Md5Sharder).is_none());
    }

    #[test]
    fn rollout_buckets() {
        let sharder = DeterministicSharder(HashMap::from([
            ("canary-low".to_owned(), 999),
            ("canary-high".to_owned(), 1000),
        ]));
        let rules = vec![TargetingRule {
            name: "canary".into(),
            variant: "on".into(),
            conditions: vec![],
            rollout: Some(Rollout {
                percentage: 10.0,
                salt: None,
            }),
        }];

        assert!(evaluate(&rules, &EvaluationContext::new("low"), &sharder).is_some());
        assert!(evaluate(&rules, &EvaluationContext::new("high"), &sharder).is_none());
    }

    #[test]
    fn rollout_edges() {
        let rollout = |percentage| Rollout {
            percentage,
            salt: Some("salt".into()),
        };
        for key in ["", "a", "123456", "654321"] {
            assert!(!rollout(0.0).contains("r", key, &Md5Sharder));
            assert!(rollout(100.0).contains("r", key, &Md5Sharder));
        }
    }

    #[test]
    fn parses_rule_yaml() {
        let rule: TargetingRule = serde_yaml::from_str(
            r#"
            name: allow-list
            variant: "true"
            conditions:
              - { attribute: targetingKey, operator: ONE_OF, value: ["123456", 42] }
            rollout: { percentage: 50 }
            "#,
        )
        .unwrap();

        assert_eq!(rule.conditions[0].operator, Operator::OneOf);
        assert_eq!(
            rule.conditions[0].value,
            vec![Value::from("123456"), Value::from(42.0)].into()
        );
        assert_eq!(rule.rollout.map(|r| r.percentage), Some(50.0));
    }
}
