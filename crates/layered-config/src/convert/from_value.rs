//! Built-in derivation recipes, expressed as impls of [`FromConfigValue`] — see the module docs
//! on [`super`].

use std::{
    collections::{BTreeSet, HashSet},
    hash::Hash,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    path::PathBuf,
};

use super::split::split_list;

/// A type that knows how to parse itself from a single raw configuration string.
///
/// [`ConverterRegistry`](super::ConverterRegistry) falls back to this trait whenever no explicit
/// converter has been registered for a type. Implement it for your own scalar types, or derive it
/// for a single-field newtype with `#[derive(layered_config_macros::FromConfigValue)]`.
pub trait FromConfigValue: Sized {
    /// Parses `raw` into `Self`. `raw` is always non-absent: callers never invoke this with an
    /// empty `Option`, only with an empty *string*, which is itself a present value.
    fn from_config_value(raw: &str) -> anyhow::Result<Self>;
}

/// Identity conversion for string types.
impl FromConfigValue for String {
    fn from_config_value(raw: &str) -> anyhow::Result<Self> {
        Ok(raw.to_owned())
    }
}

/// Never raises; anything not in the truthy set is `false`.
impl FromConfigValue for bool {
    fn from_config_value(raw: &str) -> anyhow::Result<Self> {
        Ok(matches!(
            raw.to_ascii_lowercase().as_str(),
            "true" | "y" | "yes" | "on" | "1"
        ))
    }
}

macro_rules! impl_from_str_config_value {
    ($($ty:ty),+ $(,)?) => {
        $(
        impl FromConfigValue for $ty {
            fn from_config_value(raw: &str) -> anyhow::Result<Self> {
                raw.parse::<$ty>()
                    .map_err(|err| anyhow::anyhow!("{err}"))
            }
        }
        )+
    };
}

impl_from_str_config_value!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, char, IpAddr,
    Ipv4Addr, Ipv6Addr, SocketAddr, PathBuf
);

#[cfg(feature = "url")]
impl FromConfigValue for url::Url {
    fn from_config_value(raw: &str) -> anyhow::Result<Self> {
        url::Url::parse(raw).map_err(|err| anyhow::anyhow!("{err}"))
    }
}

/// `Option<E>` derives recursively. An empty string is present, so it is routed to `E`'s own
/// parser rather than treated as `None`; `None` only arises for genuinely absent values, which
/// this trait never observes directly (that branch lives in
/// [`crate::config::Configuration::get_optional_value`]).
impl<E: FromConfigValue> FromConfigValue for Option<E> {
    fn from_config_value(raw: &str) -> anyhow::Result<Self> {
        E::from_config_value(raw).map(Some)
    }
}

/// Resizable-array shape: split on unescaped commas, derive `E`, convert each element.
impl<E: FromConfigValue> FromConfigValue for Vec<E> {
    fn from_config_value(raw: &str) -> anyhow::Result<Self> {
        split_list(raw).iter().map(|part| E::from_config_value(part)).collect()
    }
}

/// `Set<E>` shape.
impl<E: FromConfigValue + Eq + Hash> FromConfigValue for HashSet<E> {
    fn from_config_value(raw: &str) -> anyhow::Result<Self> {
        split_list(raw).iter().map(|part| E::from_config_value(part)).collect()
    }
}

impl<E: FromConfigValue + Eq + Ord> FromConfigValue for BTreeSet<E> {
    fn from_config_value(raw: &str) -> anyhow::Result<Self> {
        split_list(raw).iter().map(|part| E::from_config_value(part)).collect()
    }
}

/// Fixed-length array. Fails if the split count doesn't match `N`.
impl<E: FromConfigValue, const N: usize> FromConfigValue for [E; N] {
    fn from_config_value(raw: &str) -> anyhow::Result<Self> {
        let parts = split_list(raw);
        if parts.len() != N {
            anyhow::bail!(
                "expected exactly {N} comma-separated elements, found {}",
                parts.len()
            );
        }
        let values = parts
            .iter()
            .map(|part| E::from_config_value(part))
            .collect::<anyhow::Result<Vec<E>>>()?;
        match values.try_into() {
            Ok(array) => Ok(array),
            Err(_) => unreachable!("length already checked above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_truthy_set() {
        for raw in ["true", "Y", "yes", "ON", "1"] {
            assert_eq!(bool::from_config_value(raw).unwrap(), true, "{raw}");
        }
        for raw in ["false", "no", "0", "anything else"] {
            assert_eq!(bool::from_config_value(raw).unwrap(), false, "{raw}");
        }
    }

    #[test]
    fn vec_derivation_splits_on_comma() {
        let xs: Vec<i32> = FromConfigValue::from_config_value("1,2,3").unwrap();
        assert_eq!(xs, vec![1, 2, 3]);
    }

    #[test]
    fn array_derivation_checks_length() {
        let xs: [i32; 3] = FromConfigValue::from_config_value("1,2,3").unwrap();
        assert_eq!(xs, [1, 2, 3]);
        assert!(<[i32; 2] as FromConfigValue>::from_config_value("1,2,3").is_err());
    }

    #[test]
    fn option_routes_present_values_including_empty_string() {
        let value: Option<String> = FromConfigValue::from_config_value("").unwrap();
        assert_eq!(value, Some(String::new()));
    }
}
