//! The environment-variable source.

use std::{collections::HashMap, env};

use super::{Source, ENV_ORDINAL};

/// A [`Source`] backed by process environment variables, with name mangling: an exact-case
/// lookup is tried first, then the name with every non `[A-Za-z0-9_]` character rewritten to
/// `_`, then the upper-cased form of that rewrite.
#[derive(Debug, Clone)]
pub struct EnvSource {
    vars: HashMap<String, String>,
}

impl EnvSource {
    /// Captures the current process environment.
    pub fn from_process() -> Self {
        Self::from_iter(env::vars())
    }

    /// Builds an environment source from an explicit iterator, for tests and for hosts that
    /// source their "environment" from somewhere other than `std::env`.
    pub fn from_iter<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Rewrites every character outside `[A-Za-z0-9_]` to `_`.
    fn mangle(name: &str) -> String {
        name.chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
            .collect()
    }
}

impl Source for EnvSource {
    fn name(&self) -> String {
        "environment variables".to_owned()
    }

    fn ordinal(&self) -> i32 {
        ENV_ORDINAL
    }

    fn property_names(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }

    fn value(&self, name: &str) -> Option<String> {
        if let Some(value) = self.vars.get(name) {
            return Some(value.clone());
        }
        let mangled = Self::mangle(name);
        if let Some(value) = self.vars.get(&mangled) {
            return Some(value.clone());
        }
        self.vars.get(&mangled.to_ascii_uppercase()).cloned()
    }

    fn properties(&self) -> HashMap<String, String> {
        self.vars.clone()
    }
}
