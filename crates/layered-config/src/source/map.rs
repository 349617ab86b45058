//! An in-memory [`Source`] for tests, discovery-adjacent code, and anywhere a caller wants to
//! hand over a fixed set of key-value pairs without reaching for a file or the environment.

use std::collections::HashMap;

use super::{Source, DEFAULT_ORDINAL};

/// A source backed by a plain in-memory map: process properties, explicit test fixtures, and
/// anything a [`crate::source::SourceProvider`] constructs on the fly.
#[derive(Debug, Clone)]
pub struct MapSource {
    name: String,
    ordinal: i32,
    values: HashMap<String, String>,
}

impl MapSource {
    /// Creates a named source at the default ordinal (100).
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            name: name.into(),
            ordinal: DEFAULT_ORDINAL,
            values: values.into_iter().collect(),
        }
    }

    /// Overrides the default ordinal.
    #[must_use]
    pub fn with_ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }
}

impl Source for MapSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }

    fn property_names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn value(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }

    fn properties(&self) -> HashMap<String, String> {
        self.values.clone()
    }
}
