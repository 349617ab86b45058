//! The [`ConverterRegistry`].

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::Arc,
    sync::Mutex,
};

use super::{Converter, Derived, FromConfigValue, DEFAULT_PRIORITY};
use crate::error::ConfigError;

/// Priority at which a derived converter is installed: lower than any explicit registration can
/// legally use, so an explicit registration always wins.
const DERIVED_PRIORITY: i32 = i32::MIN;

/// Carries `T` so whether it derives a converter can be decided by method resolution rather than
/// a trait bound on every caller of [`ConverterRegistry::convert`]. Calling `derive_into` on
/// `&DeriveProbe::<T>(PhantomData)` picks [`DeriveViaFromConfigValue`]'s impl — one fewer autoref
/// than [`DeriveFallback`]'s — whenever `T: FromConfigValue`, and falls back to the latter's
/// no-op otherwise.
struct DeriveProbe<T>(PhantomData<T>);

trait DeriveFallback {
    fn derive_into(&self, registry: &ConverterRegistry, state: &mut RegistryState);
}

impl<T> DeriveFallback for &DeriveProbe<T> {
    fn derive_into(&self, _registry: &ConverterRegistry, _state: &mut RegistryState) {}
}

trait DeriveViaFromConfigValue {
    fn derive_into(&self, registry: &ConverterRegistry, state: &mut RegistryState);
}

impl<T: FromConfigValue + fmt::Debug + Send + Sync + 'static> DeriveViaFromConfigValue for DeriveProbe<T> {
    fn derive_into(&self, registry: &ConverterRegistry, state: &mut RegistryState) {
        registry.derive::<T>(state);
    }
}

trait ErasedConverter: fmt::Debug + Send + Sync {
    fn convert_erased(&self, raw: &str) -> Result<Box<dyn Any + Send + Sync>, ConfigError>;
    fn close_erased(&self) -> anyhow::Result<()>;
}

struct ConverterSlot<T, C> {
    inner: C,
    _ty: std::marker::PhantomData<fn() -> T>,
}

impl<T, C: fmt::Debug> fmt::Debug for ConverterSlot<T, C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(formatter)
    }
}

impl<T: Send + Sync + 'static, C: Converter<T>> ErasedConverter for ConverterSlot<T, C> {
    fn convert_erased(&self, raw: &str) -> Result<Box<dyn Any + Send + Sync>, ConfigError> {
        self.inner.convert(raw).map(|value| Box::new(value) as _)
    }

    fn close_erased(&self) -> anyhow::Result<()> {
        self.inner.close()
    }
}

struct Registration {
    converter: Arc<dyn ErasedConverter>,
    priority: i32,
    /// Insertion order, used to break priority ties. Monotonically increasing, assigned under
    /// the same lock as the map mutation.
    seq: u64,
}

impl fmt::Debug for Registration {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Registration")
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    registrations: HashMap<TypeId, Registration>,
    next_seq: u64,
}

/// Indexed store of converters keyed by target type, with priority-based arbitration and lazy
/// derivation for unknown types.
///
/// Thread-safe: `register` and `convert` are internally serialized on one mutex covering both the
/// registration map and the derivation state — a derived converter, once installed, lives in the
/// very same map, which is what gives [`Self::convert`] its memoization guarantee.
#[derive(Debug, Default)]
pub struct ConverterRegistry {
    state: Mutex<RegistryState>,
}

impl ConverterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `converter` for `T` at `priority`. If a registration for `T` already exists with
    /// strictly higher priority, the existing one is kept; otherwise `converter` replaces it.
    pub fn register<T: Send + Sync + 'static>(&self, converter: impl Converter<T>, priority: i32) {
        let type_id = TypeId::of::<T>();
        let slot = Arc::new(ConverterSlot::<T, _> {
            inner: converter,
            _ty: std::marker::PhantomData,
        });
        let mut state = self.state.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;

        let keep_existing = state
            .registrations
            .get(&type_id)
            .is_some_and(|existing| existing.priority > priority);
        if keep_existing {
            tracing::trace!(target_type = std::any::type_name::<T>(), priority, "kept higher-priority existing converter");
            return;
        }
        tracing::debug!(target_type = std::any::type_name::<T>(), priority, "registered converter");
        state.registrations.insert(
            type_id,
            Registration {
                converter: slot,
                priority,
                seq,
            },
        );
    }

    /// Registers `converter` for `T` at the default priority.
    pub fn register_default<T: Send + Sync + 'static>(&self, converter: impl Converter<T>) {
        self.register(converter, DEFAULT_PRIORITY);
    }

    fn derive<T: FromConfigValue + fmt::Debug + Send + Sync + 'static>(&self, state: &mut RegistryState) {
        let type_id = TypeId::of::<T>();
        if state.registrations.contains_key(&type_id) {
            return;
        }
        tracing::trace!(target_type = std::any::type_name::<T>(), "deriving converter");
        let seq = state.next_seq;
        state.next_seq += 1;
        state.registrations.insert(
            type_id,
            Registration {
                converter: Arc::new(ConverterSlot::<T, _> {
                    inner: Derived::<T>::new(),
                    _ty: std::marker::PhantomData,
                }),
                priority: DERIVED_PRIORITY,
                seq,
            },
        );
    }

    /// Converts `raw` to `T`, consulting an explicit registration first and, for any `T` that
    /// implements [`FromConfigValue`], falling back to derivation. `T` itself carries no
    /// `FromConfigValue` bound here — a type reachable only through an explicit [`Self::register`]
    /// call converts just as well as one with a derivation recipe. A type with neither fails with
    /// [`ConfigError::UnsupportedType`].
    ///
    /// `raw` being `None` is an internal guard: [`crate::Configuration`] only calls this once it
    /// has already found a present raw value, so a `None` here signals a bug in the caller rather
    /// than a user error, and is reported as [`ConfigError::NullInput`].
    pub fn convert<T>(&self, raw: Option<&str>) -> Result<T, ConfigError>
    where
        T: fmt::Debug + Send + Sync + 'static,
    {
        let Some(raw) = raw else {
            return Err(ConfigError::NullInput);
        };

        let type_id = TypeId::of::<T>();
        let mut state = self.state.lock().unwrap();
        if !state.registrations.contains_key(&type_id) {
            (&DeriveProbe::<T>(PhantomData)).derive_into(self, &mut state);
        }
        let Some(registration) = state.registrations.get(&type_id) else {
            drop(state);
            return Err(ConfigError::unsupported_type::<T>());
        };
        let converter = registration.converter.clone();
        drop(state); // never hold the lock while invoking user code

        let boxed = converter.convert_erased(raw)?;
        Ok(*boxed
            .downcast::<T>()
            .expect("erased converter returned a value of the wrong type"))
    }

    /// Closes every registered converter that overrides [`Converter::close`], aggregating
    /// failures.
    pub fn close(&self) -> Result<(), ConfigError> {
        let converters: Vec<Arc<dyn ErasedConverter>> = {
            let state = self.state.lock().unwrap();
            state.registrations.values().map(|r| r.converter.clone()).collect()
        };
        let mut errors = Vec::new();
        for converter in converters {
            if let Err(cause) = converter.close_erased() {
                errors.push(ConfigError::conversion("", "close", cause));
            }
        }
        ConfigError::aggregate(errors)
    }

    /// Registers `converter` for `T`, replacing the current registration only if `priority`
    /// *strictly exceeds* the stored one. This is a stricter tie-break than [`Self::register`]'s:
    /// used by [`crate::ConfigurationBuilder::build`] when folding its list of explicit converters
    /// in insertion order, so that on a priority tie the earliest registration wins rather than
    /// the latest.
    pub(crate) fn register_if_exceeds<T: Send + Sync + 'static>(
        &self,
        converter: impl Converter<T>,
        priority: i32,
    ) {
        let type_id = TypeId::of::<T>();
        let mut state = self.state.lock().unwrap();
        let should_skip = state
            .registrations
            .get(&type_id)
            .is_some_and(|existing| existing.priority >= priority);
        if should_skip {
            return;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.registrations.insert(
            type_id,
            Registration {
                converter: Arc::new(ConverterSlot::<T, _> {
                    inner: converter,
                    _ty: std::marker::PhantomData,
                }),
                priority,
                seq,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fixed(i64);

    impl Converter<i64> for Fixed {
        fn convert(&self, _raw: &str) -> Result<i64, ConfigError> {
            Ok(self.0)
        }
    }

    #[test]
    fn higher_priority_registration_wins() {
        let registry = ConverterRegistry::new();
        registry.register(Fixed(1), 100);
        registry.register(Fixed(2), 200);
        assert_eq!(registry.convert::<i64>(Some("ignored")).unwrap(), 2);

        // A subsequent lower-priority registration does not override.
        registry.register(Fixed(3), 50);
        assert_eq!(registry.convert::<i64>(Some("ignored")).unwrap(), 2);
    }

    #[test]
    fn explicit_registration_outranks_derivation() {
        let registry = ConverterRegistry::new();
        assert_eq!(registry.convert::<i32>(Some("7")).unwrap(), 7);
        registry.register(DoubleItUp, DEFAULT_PRIORITY);
        assert_eq!(registry.convert::<i32>(Some("7")).unwrap(), 14);
    }

    #[derive(Debug)]
    struct DoubleItUp;
    impl Converter<i32> for DoubleItUp {
        fn convert(&self, raw: &str) -> Result<i32, ConfigError> {
            Ok(raw.parse::<i32>().unwrap() * 2)
        }
    }

    #[test]
    fn derivation_is_memoized() {
        let registry = ConverterRegistry::new();
        registry.convert::<i32>(Some("1")).unwrap();
        let type_id = TypeId::of::<i32>();
        let first_ptr = {
            let state = registry.state.lock().unwrap();
            Arc::as_ptr(&state.registrations.get(&type_id).unwrap().converter) as *const () as usize
        };
        registry.convert::<i32>(Some("2")).unwrap();
        let second_ptr = {
            let state = registry.state.lock().unwrap();
            Arc::as_ptr(&state.registrations.get(&type_id).unwrap().converter) as *const () as usize
        };
        assert_eq!(first_ptr, second_ptr);
    }

    #[test]
    fn null_input_never_reaches_a_converter() {
        let registry = ConverterRegistry::new();
        let err = registry.convert::<i32>(None).unwrap_err();
        assert_matches::assert_matches!(err, ConfigError::NullInput);
    }
}
