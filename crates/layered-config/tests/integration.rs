//! End-to-end scenarios exercising the public surface the way an embedding application would:
//! building a configuration from several sources, converting values, overriding converters, and
//! running two independent scopes through [`ProviderRegistry`].

use std::sync::Arc;

use layered_config::{
    Configuration, ConfigurationBuilder, Converter, ConfigResult, EnvSource, FromConfigValue,
    MapSource, ProviderRegistry, ScopeKey,
};

#[derive(Debug, layered_config::FromConfigValue, PartialEq, Eq)]
struct Port(u16);

#[test]
fn env_mangling_feeds_a_derived_numeric_conversion() {
    let config = ConfigurationBuilder::new()
        .with_source(EnvSource::from_iter([("MY_INT_PROPERTY", "45")]))
        .build();
    assert_eq!(config.get_value::<i32>("my.int.property").unwrap(), 45);
}

#[test]
fn derived_newtype_delegates_to_its_inner_field() {
    let config = ConfigurationBuilder::new()
        .with_source(MapSource::new("m", [("port".into(), "8080".into())]))
        .build();
    assert_eq!(config.get_value::<Port>("port").unwrap(), Port(8080));
}

#[test]
fn process_properties_outrank_a_lower_ordinal_file_source() {
    let config = ConfigurationBuilder::new()
        .with_source(MapSource::new("config.properties", [("color".into(), "red".into())]).with_ordinal(100))
        .with_process_properties([("color".to_owned(), "blue".to_owned())])
        .build();
    assert_eq!(config.get_value::<String>("color").unwrap(), "blue");
}

#[test]
fn string_array_conversion_respects_escaped_commas() {
    let config = ConfigurationBuilder::new()
        .with_source(MapSource::new("m", [("xs".into(), r"a\,b,c".into())]))
        .build();
    let xs = config.get_value::<Vec<String>>("xs").unwrap();
    assert_eq!(xs, vec!["a,b".to_owned(), "c".to_owned()]);
}

#[test]
fn an_explicit_higher_priority_converter_overrides_the_derived_one() {
    #[derive(Debug)]
    struct UppercasingConverter;
    impl Converter<String> for UppercasingConverter {
        fn convert(&self, raw: &str) -> ConfigResult<String> {
            Ok(raw.to_ascii_uppercase())
        }
    }

    let config = ConfigurationBuilder::new()
        .with_source(MapSource::new("m", [("name".into(), "hello".into())]))
        .with_converter(200, UppercasingConverter)
        .build();
    assert_eq!(config.get_value::<String>("name").unwrap(), "HELLO");
}

#[test]
fn two_scopes_release_independently() {
    let registry = ProviderRegistry::new();
    let scope_a = ScopeKey::new("tenant-a");
    let scope_b = ScopeKey::new("tenant-b");

    let config_a = Arc::new(
        ConfigurationBuilder::new()
            .with_source(MapSource::new("m", [("tenant".into(), "a".into())]))
            .build(),
    );
    let config_b = Arc::new(
        ConfigurationBuilder::new()
            .with_source(MapSource::new("m", [("tenant".into(), "b".into())]))
            .build(),
    );
    registry.register(&scope_a, config_a.clone()).unwrap();
    registry.register(&scope_b, config_b.clone()).unwrap();

    registry.release(&config_a).unwrap();

    assert!(registry.current(&scope_a).is_none());
    let remaining: Arc<Configuration> = registry.current(&scope_b).unwrap();
    assert_eq!(remaining.get_value::<String>("tenant").unwrap(), "b");

    registry.close().unwrap();
}
