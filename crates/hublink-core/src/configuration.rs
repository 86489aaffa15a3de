//! Service configuration parameters and their on-disk persistence.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::PersistenceResult;
use crate::schema::describe_value;

/// Default directory for persisted configurations.
pub const DEFAULT_CONFIGURATION_DIR: &str = "config";

/// A configuration parameter value and its derived type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationParameterValue {
    pub value: Value,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ConfigurationParameterValue {
    /// Creates a parameter; `type` and `format` follow the value's shape.
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        let shape = describe_value(&value);
        Self {
            type_name: shape.type_name.to_string(),
            format: shape.format.map(str::to_string),
            value,
        }
    }

    /// Replaces the value and recomputes its type.
    pub fn set(&mut self, value: Value) {
        *self = Self::new(value);
    }
}

/// Named configuration parameters of a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub parameters: BTreeMap<String, ConfigurationParameterValue>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ConfigurationParameterValue) {
        self.parameters.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<ConfigurationParameterValue> {
        self.parameters.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ConfigurationParameterValue> {
        self.parameters.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Applies pushed values. Unknown names are added.
    pub fn update_values(&mut self, values: &Map<String, Value>) {
        for (name, value) in values {
            match self.parameters.get_mut(name) {
                Some(param) => param.set(value.clone()),
                None => {
                    self.parameters
                        .insert(name.clone(), ConfigurationParameterValue::new(value.clone()));
                }
            }
        }
    }
}

/// Stores one configuration file per service under a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationStore {
    dir: PathBuf,
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIGURATION_DIR)
    }
}

impl ConfigurationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for a service.
    pub fn path_for(&self, uuid: &str) -> PathBuf {
        self.dir.join(format!("{uuid}.config"))
    }

    /// Loads the configuration of a service, `None` if no file exists.
    pub fn load(&self, uuid: &str) -> PersistenceResult<Option<Configuration>> {
        let path = self.path_for(uuid);
        if !path.exists() {
            info!(path = %path.display(), "no persisted configuration");
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let configuration = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(Some(configuration))
    }

    /// Writes the configuration of a service, creating the directory.
    pub fn save(&self, uuid: &str, configuration: &Configuration) -> PersistenceResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(uuid);
        let content = serde_json::to_string_pretty(configuration)?;
        fs::write(&path, content)?;
        debug!(path = %path.display(), "saved configuration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn parameter_type_follows_value() {
        let param = ConfigurationParameterValue::new(json!(12));
        assert_eq!(param.type_name, "integer");
        assert_eq!(param.format.as_deref(), Some("int32"));

        let param = ConfigurationParameterValue::new(json!("on"));
        assert_eq!(param.type_name, "string");
        assert!(param.format.is_none());
    }

    #[test]
    fn parameter_serialises_without_null_format() {
        let param = ConfigurationParameterValue::new(json!(true));
        assert_eq!(
            serde_json::to_value(&param).unwrap(),
            json!({"value": true, "type": "boolean"})
        );
    }

    #[test]
    fn update_values_recomputes_type() {
        let mut config = Configuration::new();
        config.insert("interval", ConfigurationParameterValue::new(json!(5)));

        let mut pushed = Map::new();
        pushed.insert("interval".into(), json!(2.5));
        pushed.insert("mode".into(), json!("fast"));
        config.update_values(&pushed);

        let interval = config.get("interval").unwrap();
        assert_eq!(interval.value, json!(2.5));
        assert_eq!(interval.type_name, "number");
        assert_eq!(config.get("mode").unwrap().type_name, "string");
    }

    #[test]
    fn store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ConfigurationStore::new(dir.path().join("nested"));
        let mut config = Configuration::new();
        config.insert("threshold", ConfigurationParameterValue::new(json!(40)));

        store.save("svc-1", &config).unwrap();
        assert!(store.path_for("svc-1").ends_with("svc-1.config"));

        let loaded = store.load("svc-1").unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn store_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = ConfigurationStore::new(dir.path());
        assert!(store.load("absent").unwrap().is_none());
    }

    #[test]
    fn store_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let store = ConfigurationStore::new(dir.path());
        fs::write(store.path_for("bad"), "not json").unwrap();
        assert!(matches!(
            store.load("bad"),
            Err(PersistenceError::Serialization(_))
        ));
    }

    #[test]
    fn default_store_uses_config_dir() {
        let store = ConfigurationStore::default();
        assert_eq!(store.path_for("abc"), Path::new("config").join("abc.config"));
    }
}
