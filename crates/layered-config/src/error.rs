//! The error taxonomy surfaced by [`crate::Configuration`], [`crate::convert::ConverterRegistry`]
//! and [`crate::ProviderRegistry`].

use std::{any, fmt};

use crate::registry::ScopeKey;

/// Errors produced by this crate.
///
/// Conversion and lookup errors surface to the caller unchanged. Cleanup errors raised while
/// closing a [`crate::Configuration`] or releasing a [`crate::ProviderRegistry`] binding are
/// aggregated into [`ConfigError::Aggregate`], with the first error treated as primary.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// `get_value` was called for a name no source provides.
    Missing {
        /// The property name that was looked up.
        name: String,
    },
    /// A converter, or the built-in derivation logic, failed to turn a raw string into the
    /// requested type.
    Conversion {
        /// The raw string that failed to convert.
        raw: String,
        /// Name of the target type, for diagnostics.
        target_type: &'static str,
        /// The underlying failure.
        cause: anyhow::Error,
    },
    /// No explicit converter was registered for `target_type` and no derivation recipe applies.
    UnsupportedType {
        /// Name of the target type, for diagnostics.
        target_type: &'static str,
    },
    /// A converter was invoked with an absent raw value. This indicates a bug inside this crate:
    /// converters are never meant to observe absence.
    NullInput,
    /// A second [`crate::Configuration`] was registered under a scope key that already has a live
    /// binding.
    AlreadyBound {
        /// The scope key that already has a live binding.
        scope: ScopeKey,
    },
    /// An operation was attempted on a [`crate::Configuration`] or registry after it was closed.
    Closed,
    /// Resolving a `${other.key}` reference inside a raw value revisited a key already being
    /// resolved.
    ExpansionCycle {
        /// The key at which the cycle was detected.
        key: String,
    },
    /// Multiple cleanup errors occurred while closing or releasing; the first is primary and the
    /// rest are attached as suppressed children.
    Aggregate {
        /// `errors[0]` is the primary error.
        errors: Vec<ConfigError>,
    },
}

impl ConfigError {
    pub(crate) fn conversion(
        raw: impl Into<String>,
        target_type: &'static str,
        cause: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Conversion {
            raw: raw.into(),
            target_type,
            cause: cause.into(),
        }
    }

    pub(crate) fn unsupported_type<T: ?Sized>() -> Self {
        Self::UnsupportedType {
            target_type: any::type_name::<T>(),
        }
    }

    /// Combines zero or more errors collected during a cleanup pass into a single result.
    ///
    /// Returns `Ok(())` if `errors` is empty, the lone error unwrapped if there is exactly one,
    /// and [`ConfigError::Aggregate`] otherwise.
    pub(crate) fn aggregate(errors: Vec<ConfigError>) -> Result<(), ConfigError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.into_iter().next().unwrap()),
            _ => Err(ConfigError::Aggregate { errors }),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { name } => write!(formatter, "no configured value for `{name}`"),
            Self::Conversion {
                raw,
                target_type,
                cause,
            } => write!(
                formatter,
                "failed converting `{raw}` to `{target_type}`: {cause}"
            ),
            Self::UnsupportedType { target_type } => {
                write!(formatter, "no converter available for `{target_type}`")
            }
            Self::NullInput => {
                formatter.write_str("a converter was invoked with an absent raw value")
            }
            Self::AlreadyBound { scope } => {
                write!(formatter, "a configuration is already bound to {scope:?}")
            }
            Self::Closed => formatter.write_str("operation attempted on a closed configuration"),
            Self::ExpansionCycle { key } => {
                write!(formatter, "cyclic `${{...}}` reference while expanding `{key}`")
            }
            Self::Aggregate { errors } => {
                write!(formatter, "{}", errors[0])?;
                if errors.len() > 1 {
                    write!(formatter, " (and {} more suppressed errors)", errors.len() - 1)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Conversion { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
