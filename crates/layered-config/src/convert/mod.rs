//! Converters, the [`ConverterRegistry`] and the built-in derivation recipes.
//!
//! A converter carries its target type as a monomorphized generic parameter, erased into the
//! registry behind [`TypeId`]. Types with no explicit registration instead derive a converter
//! from the [`FromConfigValue`] trait: built-in impls cover the common scalar and container
//! shapes, and `#[derive(layered_config_macros::FromConfigValue)]` is the extension hook for
//! newtypes.

mod from_value;
pub(crate) mod registry;
mod split;

use std::{any, fmt, marker::PhantomData};

pub use self::{
    from_value::FromConfigValue,
    split::{join_list, split_list},
};
pub use registry::ConverterRegistry;
use crate::error::ConfigError;

/// Default priority assigned to a registration that doesn't specify one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// A function from a non-empty raw string to a value of a declared target type.
///
/// Implementations must never be invoked with an absent raw value — [`ConverterRegistry`]
/// enforces this before dispatching. A converter must either return a value of `T` or fail with
/// [`ConfigError::Conversion`].
pub trait Converter<T>: fmt::Debug + Send + Sync + 'static {
    /// Converts a raw string into `T`.
    fn convert(&self, raw: &str) -> Result<T, ConfigError>;

    /// Releases resources held by this converter. Invoked once when the owning
    /// [`ConverterRegistry`] is closed. The default implementation does nothing.
    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The derived converter installed automatically for any type implementing [`FromConfigValue`],
/// at [`i32::MIN`] priority so that an explicit registration always outranks it.
#[derive(Debug)]
pub(crate) struct Derived<T>(PhantomData<fn() -> T>);

impl<T> Derived<T> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: FromConfigValue + fmt::Debug + 'static> Converter<T> for Derived<T> {
    fn convert(&self, raw: &str) -> Result<T, ConfigError> {
        T::from_config_value(raw).map_err(|cause| {
            ConfigError::conversion(raw, any::type_name::<T>(), cause)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::convert::registry::ConverterRegistry;

    #[derive(Debug)]
    struct SpyConverter(Arc<Mutex<Vec<String>>>);

    impl Converter<String> for SpyConverter {
        fn convert(&self, raw: &str) -> Result<String, ConfigError> {
            self.0.lock().unwrap().push(raw.to_owned());
            Ok(raw.to_owned())
        }
    }

    #[test]
    fn converter_is_never_invoked_with_absent_input() {
        let registry = ConverterRegistry::new();
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        registry.register(SpyConverter(log.clone()), DEFAULT_PRIORITY);

        let err = registry.convert::<String>(None).unwrap_err();
        assert_matches::assert_matches!(err, ConfigError::NullInput);
        assert!(log.lock().unwrap().is_empty());

        registry.convert::<String>(Some("hi")).unwrap();
        assert_eq!(log.lock().unwrap().as_slice(), ["hi".to_owned()]);
    }
}
