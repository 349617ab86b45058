//! [`Configuration`] and [`ConfigurationBuilder`].

use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
    sync::{atomic::AtomicBool, atomic::Ordering, Arc},
};

use crate::{
    convert::{registry::ConverterRegistry, Converter},
    error::{ConfigError, ConfigResult},
    registry::{ProviderRegistry, ScopeKey},
    source::{
        compare_sources, properties_file, EnvSource, MapSource, Source, SourceProvider,
        PROCESS_PROPERTIES_ORDINAL,
    },
};

/// Maximum depth of nested `${other.key}` expansion before [`ConfigError::ExpansionCycle`] is
/// raised even without a literal self-reference.
const MAX_EXPANSION_DEPTH: usize = 32;

/// Holds the sorted source chain and a [`ConverterRegistry`].
///
/// Once built, the source sequence never changes: there is no API to add a source after
/// construction. After [`Self::close`], every operation but [`Self::is_closed`] fails with
/// [`ConfigError::Closed`]; `close` itself is idempotent.
pub struct Configuration {
    sources: Vec<Box<dyn Source>>,
    converters: ConverterRegistry,
    closed: AtomicBool,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Configuration")
            .field("sources", &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Configuration {
    fn check_open(&self) -> ConfigResult<()> {
        if self.is_closed() {
            Err(ConfigError::Closed)
        } else {
            Ok(())
        }
    }

    /// Returns the value of `name` converted to `T`, failing with [`ConfigError::Missing`] if no
    /// source provides it.
    ///
    /// `T` needs no [`FromConfigValue`] bound: any type with an explicit [`Converter`]
    /// registered on this configuration converts just as well as one with a derivation recipe.
    /// A type with neither fails with [`ConfigError::UnsupportedType`] instead of failing to
    /// compile.
    pub fn get_value<T>(&self, name: &str) -> ConfigResult<T>
    where
        T: fmt::Debug + Send + Sync + 'static,
    {
        self.get_optional_value(name)?
            .ok_or_else(|| ConfigError::Missing { name: name.to_owned() })
    }

    /// Returns the value of `name` converted to `T`, or `None` if no source provides it. An
    /// empty string counts as present. See [`Self::get_value`] for the conversion contract.
    pub fn get_optional_value<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: fmt::Debug + Send + Sync + 'static,
    {
        self.check_open()?;
        let mut visiting = HashSet::new();
        let Some(raw) = self.resolve_expanded(name, &mut visiting, 0)? else {
            return Ok(None);
        };
        self.converters.convert(Some(&raw)).map(Some)
    }

    /// Looks up `name` in source order, then expands any `${other.key}` / `${other.key:default}`
    /// references in the raw string, recursing with cycle detection.
    fn resolve_expanded(
        &self,
        name: &str,
        visiting: &mut HashSet<String>,
        depth: usize,
    ) -> ConfigResult<Option<String>> {
        let Some(raw) = self.raw_value(name) else {
            return Ok(None);
        };
        if !raw.contains("${") {
            return Ok(Some(raw));
        }
        if depth >= MAX_EXPANSION_DEPTH || !visiting.insert(name.to_owned()) {
            return Err(ConfigError::ExpansionCycle { key: name.to_owned() });
        }
        let expanded = self.expand(&raw, visiting, depth)?;
        visiting.remove(name);
        Ok(Some(expanded))
    }

    fn expand(&self, raw: &str, visiting: &mut HashSet<String>, depth: usize) -> ConfigResult<String> {
        let mut result = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                // Unterminated reference: pass the literal text through unchanged.
                result.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let reference = &after[..end];
            let (ref_key, default) = match reference.split_once(':') {
                Some((key, default)) => (key, Some(default)),
                None => (reference, None),
            };
            let resolved = self.resolve_expanded(ref_key, visiting, depth + 1)?;
            match resolved.or_else(|| default.map(str::to_owned)) {
                Some(value) => result.push_str(&value),
                None => return Err(ConfigError::Missing { name: ref_key.to_owned() }),
            }
            rest = &after[end + 1..];
        }
        result.push_str(rest);
        Ok(result)
    }

    /// First non-absent raw string across the sorted source chain.
    fn raw_value(&self, name: &str) -> Option<String> {
        self.sources.iter().find_map(|source| source.value(name))
    }

    /// Snapshot union of property names across every source, duplicates coalesced.
    pub fn get_property_names(&self) -> ConfigResult<HashSet<String>> {
        self.check_open()?;
        Ok(self.sources.iter().flat_map(|s| s.property_names()).collect())
    }

    /// Immutable snapshot of the sorted source chain.
    pub fn get_sources(&self) -> ConfigResult<&[Box<dyn Source>]> {
        self.check_open()?;
        Ok(&self.sources)
    }

    /// Returns whether `close` has already run. The only operation permitted after close.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes every source and converter that exposes a closer, then marks this configuration
    /// closed. Idempotent: a second call performs no additional releases.
    pub fn close(&self) -> ConfigResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(source_count = self.sources.len(), "closing configuration");
        let mut errors = Vec::new();
        for source in &self.sources {
            if let Err(cause) = source.close() {
                errors.push(ConfigError::conversion("", "source close", cause));
            }
        }
        if let Err(err) = self.converters.close() {
            errors.push(err);
        }
        ConfigError::aggregate(errors)
    }
}

impl Drop for Configuration {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

type ConverterRegistrar = Box<dyn FnOnce(&ConverterRegistry) + Send>;

/// Accumulates sources and converters, then produces an immutable [`Configuration`].
///
/// Every toggle is idempotent: calling `add_default_sources()` twice has the same effect as
/// calling it once.
pub struct ConfigurationBuilder {
    default_sources: bool,
    discovered_sources: bool,
    discovered_converters: Vec<ConverterRegistrar>,
    explicit_sources: Vec<Box<dyn Source>>,
    source_providers: Vec<Arc<dyn SourceProvider>>,
    explicit_converters: Vec<ConverterRegistrar>,
    process_properties: Option<MapSource>,
    resource_dirs: Vec<PathBuf>,
    scope: Option<ScopeKey>,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationBuilder {
    /// Starts an empty builder: no sources, no converters, no scope binding.
    pub fn new() -> Self {
        Self {
            default_sources: false,
            discovered_sources: false,
            discovered_converters: Vec::new(),
            explicit_sources: Vec::new(),
            source_providers: Vec::new(),
            explicit_converters: Vec::new(),
            process_properties: None,
            resource_dirs: Vec::new(),
            scope: None,
        }
    }

    /// Appends the process-properties source, the environment source, and every
    /// `config.properties` file found under [`Self::with_resource_dir`] directories.
    #[must_use]
    pub fn add_default_sources(mut self) -> Self {
        self.default_sources = true;
        self
    }

    /// Directory to search for `config.properties` resources when default sources are enabled.
    /// May be called more than once; every directory supplied is searched.
    #[must_use]
    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dirs.push(dir.into());
        self
    }

    /// Supplies the process-properties source's contents for [`Self::add_default_sources`].
    /// Without this, the process-properties source is present but empty.
    #[must_use]
    pub fn with_process_properties(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.process_properties = Some(MapSource::new("process properties", values).with_ordinal(PROCESS_PROPERTIES_ORDINAL));
        self
    }

    /// Appends every [`Source`] produced by `provider`, scoped to this builder's eventual scope
    /// key, when the built configuration is later requested to include discovered sources.
    #[must_use]
    pub fn add_source_provider(mut self, provider: impl SourceProvider + 'static) -> Self {
        self.source_providers.push(Arc::new(provider));
        self
    }

    /// Appends every already-shared [`SourceProvider`] handle in `providers`. Equivalent to
    /// calling [`Self::add_source_provider`] once per item, for callers that already hold
    /// `Arc<dyn SourceProvider>` handles (e.g. [`crate::ProviderRegistry::current_or_init_default`]).
    #[must_use]
    pub fn with_source_providers(mut self, providers: impl IntoIterator<Item = Arc<dyn SourceProvider>>) -> Self {
        self.source_providers.extend(providers);
        self
    }

    /// Marks discovered sources as wanted; they are collected from providers added via
    /// [`Self::add_source_provider`] at [`Self::build`] time.
    #[must_use]
    pub fn add_discovered_sources(mut self) -> Self {
        self.discovered_sources = true;
        self
    }

    /// Registers a converter discovered via the host's plug-in mechanism. Discovered converters
    /// are seeded into the registry before explicit ones, at `priority`.
    #[must_use]
    pub fn add_discovered_converter<T: Send + Sync + 'static>(
        mut self,
        converter: impl Converter<T>,
        priority: i32,
    ) -> Self {
        self.discovered_converters
            .push(Box::new(move |registry| registry.register(converter, priority)));
        self
    }

    /// Appends an explicit source.
    #[must_use]
    pub fn with_source(mut self, source: impl Source + 'static) -> Self {
        self.explicit_sources.push(Box::new(source));
        self
    }

    /// Appends an explicit converter registration.
    #[must_use]
    pub fn with_converter<T: Send + Sync + 'static>(
        mut self,
        priority: i32,
        converter: impl Converter<T>,
    ) -> Self {
        self.explicit_converters
            .push(Box::new(move |registry| registry.register_if_exceeds(converter, priority)));
        self
    }

    /// Binds the produced [`Configuration`] to `scope` in `registry` once built.
    #[must_use]
    pub fn for_scope(mut self, scope: ScopeKey) -> Self {
        self.scope = Some(scope);
        self
    }

    fn collect_default_sources(&self) -> Vec<Box<dyn Source>> {
        let mut sources: Vec<Box<dyn Source>> = vec![Box::new(EnvSource::from_process())];
        sources.push(Box::new(
            self.process_properties
                .clone()
                .unwrap_or_else(|| MapSource::new("process properties", []).with_ordinal(PROCESS_PROPERTIES_ORDINAL)),
        ));
        for dir in &self.resource_dirs {
            if let Some(source) = load_properties_file_if_present(dir) {
                sources.push(Box::new(source));
            }
        }
        sources
    }

    /// Assembles the source chain, builds the converter registry, and returns the immutable
    /// [`Configuration`]. If [`Self::for_scope`] was called, the configuration is additionally
    /// registered with `registry`.
    pub fn build_and_register(self, registry: &ProviderRegistry) -> ConfigResult<Arc<Configuration>> {
        let scope = self.scope.clone();
        let config = Arc::new(self.build());
        if let Some(scope) = scope {
            registry.register(&scope, config.clone())?;
        }
        Ok(config)
    }

    /// Assembles the source chain, builds the converter registry, and returns the immutable
    /// [`Configuration`] without touching any [`ProviderRegistry`] or scope binding — use
    /// [`Self::build_and_register`] when a scope was set.
    pub fn build(self) -> Configuration {
        let mut sources = Vec::new();
        if self.default_sources {
            sources.extend(self.collect_default_sources());
        }
        if self.discovered_sources {
            let scope = self.scope.clone().unwrap_or_else(ScopeKey::ambient);
            for provider in &self.source_providers {
                sources.extend(provider.provide(&scope));
            }
        }
        sources.extend(self.explicit_sources);
        sources.sort_by(|a, b| compare_sources(a.as_ref(), b.as_ref()));

        let converters = ConverterRegistry::new();
        for seed in self.discovered_converters {
            seed(&converters);
        }
        for register in self.explicit_converters {
            register(&converters);
        }

        tracing::debug!(
            source_names = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "built configuration"
        );

        Configuration {
            sources,
            converters,
            closed: AtomicBool::new(false),
        }
    }
}

fn load_properties_file_if_present(dir: &Path) -> Option<crate::source::PropertiesSource> {
    let candidate = dir.join("config.properties");
    if !candidate.is_file() {
        return None;
    }
    match properties_file(&candidate) {
        Ok(source) => Some(source),
        Err(err) => {
            tracing::warn!(path = %candidate.display(), %err, "failed loading property file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MapSource;

    #[test]
    fn priority_order_picks_highest_ordinal() {
        let config = ConfigurationBuilder::new()
            .with_source(MapSource::new("file", [("color".into(), "red".into())]).with_ordinal(100))
            .with_source(MapSource::new("process", [("color".into(), "blue".into())]).with_ordinal(400))
            .build();
        assert_eq!(config.get_value::<String>("color").unwrap(), "blue");
    }

    #[test]
    fn ordinal_ties_break_on_name() {
        let config = ConfigurationBuilder::new()
            .with_source(MapSource::new("b", [("k".into(), "from-b".into())]))
            .with_source(MapSource::new("a", [("k".into(), "from-a".into())]))
            .build();
        assert_eq!(config.get_value::<String>("k").unwrap(), "from-a");
    }

    #[test]
    fn missing_key_yields_none_then_missing_error() {
        let config = ConfigurationBuilder::new().build();
        assert_eq!(config.get_optional_value::<String>("nope").unwrap(), None);
        let err = config.get_value::<String>("nope").unwrap_err();
        assert_matches::assert_matches!(err, ConfigError::Missing { name } if name == "nope");
    }

    #[test]
    fn empty_string_is_present() {
        let config = ConfigurationBuilder::new()
            .with_source(MapSource::new("m", [("k".into(), String::new())]))
            .build();
        assert_eq!(config.get_optional_value::<String>("k").unwrap(), Some(String::new()));
    }

    #[test]
    fn list_conversion_splits_on_comma() {
        let config = ConfigurationBuilder::new()
            .with_source(MapSource::new("m", [("xs".into(), "1,2,3".into())]))
            .build();
        assert_eq!(config.get_value::<Vec<i32>>("xs").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn explicit_converter_outranks_discovered() {
        #[derive(Debug)]
        struct AlwaysSeven;
        impl Converter<i32> for AlwaysSeven {
            fn convert(&self, _raw: &str) -> ConfigResult<i32> {
                Ok(7)
            }
        }
        let config = ConfigurationBuilder::new()
            .with_source(MapSource::new("m", [("n".into(), "not-a-number".into())]))
            .add_discovered_converter(AlwaysSeven, 100)
            .with_converter(200, AlwaysSeven)
            .build();
        assert_eq!(config.get_value::<i32>("n").unwrap(), 7);
    }

    #[test]
    fn expansion_resolves_other_keys_with_default_fallback() {
        let config = ConfigurationBuilder::new()
            .with_source(MapSource::new(
                "m",
                [
                    ("host".into(), "db.internal".into()),
                    ("url".into(), "postgres://${host}:${port:5432}".into()),
                ],
            ))
            .build();
        assert_eq!(
            config.get_value::<String>("url").unwrap(),
            "postgres://db.internal:5432"
        );
    }

    #[test]
    fn self_referential_expansion_is_a_cycle() {
        let config = ConfigurationBuilder::new()
            .with_source(MapSource::new("m", [("a".into(), "${a}".into())]))
            .build();
        let err = config.get_value::<String>("a").unwrap_err();
        assert_matches::assert_matches!(err, ConfigError::ExpansionCycle { .. });
    }

    #[test]
    fn closed_configuration_rejects_further_operations() {
        let config = ConfigurationBuilder::new().build();
        config.close().unwrap();
        assert!(config.is_closed());
        let err = config.get_optional_value::<String>("k").unwrap_err();
        assert_matches::assert_matches!(err, ConfigError::Closed);
        config.close().unwrap(); // idempotent
    }

    /// Has no [`FromConfigValue`] impl at all; only reachable through an explicit [`Converter`].
    #[derive(Debug, PartialEq, Eq)]
    struct Weekday(u8);

    #[test]
    fn a_type_with_only_an_explicit_converter_still_compiles_and_converts() {
        #[derive(Debug)]
        struct ParseWeekday;
        impl Converter<Weekday> for ParseWeekday {
            fn convert(&self, raw: &str) -> ConfigResult<Weekday> {
                raw.parse::<u8>()
                    .map(Weekday)
                    .map_err(|err| ConfigError::conversion(raw, "Weekday", err))
            }
        }
        let config = ConfigurationBuilder::new()
            .with_source(MapSource::new("m", [("day".into(), "3".into())]))
            .with_converter(200, ParseWeekday)
            .build();
        assert_eq!(config.get_value::<Weekday>("day").unwrap(), Weekday(3));
    }

    #[test]
    fn a_type_with_neither_a_converter_nor_a_derivation_recipe_is_unsupported() {
        let config = ConfigurationBuilder::new()
            .with_source(MapSource::new("m", [("day".into(), "3".into())]))
            .build();
        let err = config.get_value::<Weekday>("day").unwrap_err();
        assert_matches::assert_matches!(err, ConfigError::UnsupportedType { .. });
    }
}
