use std::collections::HashSet;

/// Scheme prefix expected on the `Authorization` credential.
pub const BEARER_SCHEME: &str = "Bearer ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Unauthorized,
}

/// Source of truth for which bearer tokens are accepted.
pub trait CredentialRegistry {
    fn contains(&self, token: &str) -> bool;
}

/// A fixed set of accepted API keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeys(HashSet<String>);

impl ApiKeys {
    /// Parse a comma-separated list of keys. Blank entries are ignored.
    pub fn parse(keys: &str) -> ApiKeys {
        keys.split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ApiKeys {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        ApiKeys(iter.into_iter().map(Into::into).collect())
    }
}

impl CredentialRegistry for ApiKeys {
    fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }
}

impl<T: Fn(&str) -> bool> CredentialRegistry for T {
    fn contains(&self, token: &str) -> bool {
        self(token)
    }
}

/// Checks caller credentials before any flag is resolved.
///
/// Every failure (empty, malformed or unknown credential) collapses into
/// [`Authorization::Unauthorized`] so callers learn nothing about why.
pub struct Authenticator<'a> {
    registry: Box<dyn CredentialRegistry + Send + Sync + 'a>,
}

impl<'a> Authenticator<'a> {
    pub fn new(registry: impl CredentialRegistry + Send + Sync + 'a) -> Self {
        Authenticator {
            registry: Box::new(registry),
        }
    }

    /// Check an `Authorization` credential of the form `Bearer <token>`.
    pub fn authenticate(&self, credential: &str) -> Authorization {
        let Some(token) = credential.strip_prefix(BEARER_SCHEME) else {
            log::debug!(target: "flags", "rejected credential without bearer scheme");
            return Authorization::Unauthorized;
        };

        if !token.is_empty() && self.registry.contains(token) {
            Authorization::Authorized
        } else {
            log::debug!(target: "flags", "rejected unknown bearer token");
            Authorization::Unauthorized
        }
    }
}
