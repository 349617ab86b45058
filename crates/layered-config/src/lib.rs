//! A layered configuration runtime: a single logical [`Configuration`] view over a
//! priority-ordered chain of [`Source`]s, resolving named keys to strongly typed values through a
//! registry of [`Converter`]s.
//!
//! In one sentence: many [`Source`]s are merged by [`ConfigurationBuilder`] into one immutable,
//! ordinal-sorted [`Configuration`]; a lookup walks that chain for the first present raw string
//! and hands it to the [`convert::ConverterRegistry`] to produce a typed value; [`ProviderRegistry`]
//! is the process-wide directory mapping an opaque [`registry::ScopeKey`] to a built
//! `Configuration`.
//!
//! Deliberately out of scope (external collaborators, not part of this crate): dependency
//! injection integration, a `Properties`-style facade, and the discovery mechanism that supplies
//! [`Source`]s and [`Converter`]s (only the shape it hands over is defined here, via
//! [`source::SourceProvider`]).

/// Re-exported so `#[derive(FromConfigValue)]`-generated code doesn't require callers to add
/// `anyhow` as a direct dependency of their own.
pub use anyhow;

pub mod config;
pub mod convert;
pub mod error;
pub mod registry;
pub mod source;
pub mod testing;

pub use self::{
    config::{Configuration, ConfigurationBuilder},
    convert::{Converter, FromConfigValue},
    error::{ConfigError, ConfigResult},
    registry::{ProviderRegistry, ScopeKey},
    source::{EnvSource, MapSource, PropertiesSource, Source, SourceProvider},
};

/// Derives [`FromConfigValue`] for a single-field newtype by delegating to the field's own
/// [`FromConfigValue`] implementation.
pub use layered_config_macros::FromConfigValue;
