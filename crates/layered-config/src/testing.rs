//! Test tooling for building a [`Configuration`] from an explicit source list.

use crate::{config::ConfigurationBuilder, source::Source, Configuration};

/// Builds a [`Configuration`] from exactly the given sources — no default sources, no discovery,
/// no [`crate::ProviderRegistry`] involvement. Useful for exercising priority and conversion
/// behavior without touching the process environment.
pub fn configuration(sources: impl IntoIterator<Item = Box<dyn Source>>) -> Configuration {
    let mut builder = ConfigurationBuilder::new();
    for source in sources {
        builder = builder.with_source(BoxedSource(source));
    }
    builder.build()
}

/// Adapts an already-boxed [`Source`] trait object back into something
/// [`ConfigurationBuilder::with_source`] (which takes `impl Source + 'static`) can accept.
struct BoxedSource(Box<dyn Source>);

impl std::fmt::Debug for BoxedSource {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(formatter)
    }
}

impl Source for BoxedSource {
    fn name(&self) -> String {
        self.0.name()
    }
    fn ordinal(&self) -> i32 {
        self.0.ordinal()
    }
    fn property_names(&self) -> Vec<String> {
        self.0.property_names()
    }
    fn value(&self, name: &str) -> Option<String> {
        self.0.value(name)
    }
    fn properties(&self) -> std::collections::HashMap<String, String> {
        self.0.properties()
    }
    fn close(&self) -> anyhow::Result<()> {
        self.0.close()
    }
}
