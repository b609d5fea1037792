use crate::{flag::FlagDefinition, rules, sharder::Sharder, EvaluationContext, Reason, Value};

/// Outcome of running a flag against a context, before it is shaped into a
/// [`ResolutionResult`](crate::ResolutionResult).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Resolution<'a> {
    pub variant: &'a str,
    pub value: &'a Value,
    pub reason: Reason,
}

impl FlagDefinition {
    /// Pick the variant that applies to `context`.
    ///
    /// Disabled flags never reach rule evaluation. Returns `None` only if a variant is missing,
    /// which validation rules out.
    pub(crate) fn resolve(
        &self,
        context: &EvaluationContext,
        sharder: &impl Sharder,
    ) -> Option<Resolution<'_>> {
        if !self.enabled {
            return self.resolve_default(Reason::Disabled);
        }

        match rules::evaluate(&self.rules, context, sharder) {
            Some(rule) => {
                let value = self.variants.get(&rule.variant).or_else(|| {
                    log::warn!(target: "flags",
                               flag_key:display = self.key,
                               rule:display = rule.name,
                               variant:display = rule.variant;
                               "internal: unable to find variation");
                    None
                })?;
                Some(Resolution {
                    variant: &rule.variant,
                    value,
                    reason: Reason::TargetingMatch,
                })
            }
            None => self.resolve_default(Reason::Default),
        }
    }

    fn resolve_default(&self, reason: Reason) -> Option<Resolution<'_>> {
        let value = self.variants.get(&self.default_variant).or_else(|| {
            log::warn!(target: "flags",
                       flag_key:display = self.key,
                       variant:display = self.default_variant;
                       "internal: unable to find default variation");
            None
        })?;
        Some(Resolution {
            variant: &self.default_variant,
            value,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::{
        flag::{FlagFormat, FlagSet},
        sharder::Md5Sharder,
        EvaluationContext, Reason, Value,
    };

    fn flags() -> FlagSet {
        FlagSet::from_slice(
            &fs::read("tests/data/flags.yaml").unwrap(),
            FlagFormat::Yaml,
        )
        .unwrap()
    }

    fn resolve(flag_key: &str, targeting_key: &str) -> (String, Value, Reason) {
        let flags = flags();
        let resolution = flags
            .get(flag_key)
            .unwrap()
            .resolve(&EvaluationContext::new(targeting_key), &Md5Sharder)
            .unwrap();
        (
            resolution.variant.to_owned(),
            resolution.value.clone(),
            resolution.reason,
        )
    }

    #[test]
    fn disabled_flag_serves_default_for_every_context() {
        for targeting_key in ["", "123456", "654321"] {
            assert_eq!(
                resolve("disabled_bool", targeting_key),
                ("default".to_owned(), false.into(), Reason::Disabled)
            );
        }
    }

    #[test]
    fn disabled_flag_skips_matching_rules() {
        assert_eq!(
            resolve("disabled_query", "123456"),
            ("default".to_owned(), "off".into(), Reason::Disabled)
        );
    }

    #[test]
    fn targeting_match() {
        assert_eq!(
            resolve("bool_targeting_match", ""),
            ("true".to_owned(), true.into(), Reason::TargetingMatch)
        );
    }

    #[test]
    fn falls_through_to_default() {
        assert_eq!(
            resolve("default_bool", ""),
            ("default".to_owned(), false.into(), Reason::Default)
        );
    }

    #[test]
    fn backup_rule() {
        assert_eq!(
            resolve("float_query", "123456"),
            ("true".to_owned(), 100.1.into(), Reason::TargetingMatch)
        );
        assert_eq!(
            resolve("float_query", "654321"),
            ("false".to_owned(), 100.0.into(), Reason::TargetingMatch)
        );
    }
}
