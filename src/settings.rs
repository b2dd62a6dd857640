use config::{Config, Environment, File};
use serde::Deserialize;

/// Engine settings supplied by the surrounding configuration system.
/// Priority: environment variables > config file > defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineSettings {
    /// Ordered statement-resource locations handed to the factory.
    #[serde(default)]
    pub resource_locations: Vec<String>,
}

impl EngineSettings {
    /// Load from an optional `sqlbind` config file (toml/yaml/json) in the
    /// working directory plus `SQLBIND_*` environment overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("sqlbind")
    }

    pub fn load_from(basename: &str) -> Result<Self, config::ConfigError> {
        Config::builder()
            .add_source(File::with_name(basename).required(false))
            .add_source(
                Environment::with_prefix("SQLBIND")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("resource_locations"),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_configured() {
        let settings = EngineSettings::load_from("no_such_config_basename").unwrap();
        assert!(settings.resource_locations.is_empty());
    }

    #[test]
    fn test_deserialize_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            "resource_locations = [\"statements/users.xml\", \"statements/orders.xml\"]\n",
        )
        .unwrap();
        let basename = path.with_extension("");
        let settings = EngineSettings::load_from(basename.to_str().unwrap()).unwrap();
        assert_eq!(
            settings.resource_locations,
            vec!["statements/users.xml", "statements/orders.xml"]
        );
    }
}
