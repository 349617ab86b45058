//! The [`Source`] SPI, ordinal-based ordering, and the built-in sources.

mod env;
mod map;
mod properties;

use std::cmp::Ordering;

pub use self::{
    env::EnvSource,
    map::MapSource,
    properties::{properties_file, PropertiesError, PropertiesSource},
};

/// Default ordinal assigned to a source that doesn't declare one.
pub const DEFAULT_ORDINAL: i32 = 100;
/// Ordinal of the built-in environment variable source.
pub const ENV_ORDINAL: i32 = 300;
/// Ordinal of the built-in process-properties source.
pub const PROCESS_PROPERTIES_ORDINAL: i32 = 400;

/// Opaque provider of a property-name set and name-to-string lookup, plus an ordinal and a
/// display name.
///
/// Implementations are assumed individually thread-safe: [`crate::Configuration`] never takes a
/// lock of its own around a `Source` call.
pub trait Source: std::fmt::Debug + Send + Sync {
    /// Display-only name, used for diagnostics and as a comparator tie-break.
    fn name(&self) -> String;

    /// Signed priority; higher wins. Stable over the source's lifetime.
    fn ordinal(&self) -> i32 {
        DEFAULT_ORDINAL
    }

    /// The full set of property names this source currently exposes.
    fn property_names(&self) -> Vec<String>;

    /// Looks up `name`. Returns `None` — never an empty string standing in for absence — when
    /// `name` is unknown; an empty string is itself a legitimate present value.
    fn value(&self, name: &str) -> Option<String>;

    /// Semantic snapshot of every name this source currently exposes, paired with its value.
    /// Defaults to calling [`Self::value`] once per name in [`Self::property_names`].
    fn properties(&self) -> std::collections::HashMap<String, String> {
        self.property_names()
            .into_iter()
            .filter_map(|name| {
                let value = self.value(&name)?;
                Some((name, value))
            })
            .collect()
    }

    /// Releases resources held by this source. Invoked by [`crate::Configuration::close`] if the
    /// configuration owns this source. Default: no-op.
    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Produces zero or more [`Source`]s for a given scope key.
///
/// This crate only defines the shape discovered sources arrive in; the discovery mechanism
/// itself (plug-in scanning, bean lookup, ...) is an external collaborator.
pub trait SourceProvider: Send + Sync {
    /// Produces the sources this provider contributes for `scope`. `scope` is an opaque token —
    /// see [`crate::registry::ScopeKey`].
    fn provide(&self, scope: &crate::registry::ScopeKey) -> Vec<Box<dyn Source>>;
}

/// Orders two sources by descending ordinal, breaking ties by ascending name. The ordering is
/// **inconsistent with equality** by design — two distinct sources with the same
/// ordinal and name compare equal, and their relative order, while unspecified, stays stable
/// within one build because [`Vec::sort_by`] is a stable sort.
pub(crate) fn compare_sources(a: &dyn Source, b: &dyn Source) -> Ordering {
    b.ordinal().cmp(&a.ordinal()).then_with(|| a.name().cmp(&b.name()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Debug)]
    struct Stub {
        name: &'static str,
        ordinal: i32,
    }

    impl Source for Stub {
        fn name(&self) -> String {
            self.name.to_owned()
        }
        fn ordinal(&self) -> i32 {
            self.ordinal
        }
        fn property_names(&self) -> Vec<String> {
            Vec::new()
        }
        fn value(&self, _name: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn higher_ordinal_sorts_first() {
        let low = Stub { name: "a", ordinal: 100 };
        let high = Stub { name: "b", ordinal: 400 };
        assert_eq!(compare_sources(&high, &low), Ordering::Less);
        assert_eq!(compare_sources(&low, &high), Ordering::Greater);
    }

    #[test]
    fn ties_break_on_name_ascending() {
        let a = Stub { name: "a", ordinal: 100 };
        let b = Stub { name: "b", ordinal: 100 };
        assert_eq!(compare_sources(&a, &b), Ordering::Less);
        assert_eq!(compare_sources(&b, &a), Ordering::Greater);
    }

    #[test]
    fn default_properties_defers_to_property_names_and_value() {
        struct Two;
        impl std::fmt::Debug for Two {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("Two")
            }
        }
        impl Source for Two {
            fn name(&self) -> String {
                "two".to_owned()
            }
            fn property_names(&self) -> Vec<String> {
                vec!["a".to_owned(), "b".to_owned()]
            }
            fn value(&self, name: &str) -> Option<String> {
                match name {
                    "a" => Some("1".to_owned()),
                    "b" => Some("2".to_owned()),
                    _ => None,
                }
            }
        }
        let expected: HashMap<_, _> =
            [("a".to_owned(), "1".to_owned()), ("b".to_owned(), "2".to_owned())]
                .into_iter()
                .collect();
        assert_eq!(Two.properties(), expected);
    }
}
