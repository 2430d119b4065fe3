//! Application configuration.
//!
//! Values cascade: built-in defaults, then an optional YAML file, then
//! `DOCGATE__SECTION__KEY` environment variables. Each layer is flattened to
//! dotted paths and applied over the previous one before the result is
//! deserialized into [`AppConfig`].

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

const ENV_PREFIX: &str = "DOCGATE__";
const LOCAL_CONFIG: &str = "config/docgate.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub boundary: BoundaryConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Global enrichments copied from request metadata when a request enters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub seeds: Vec<SeedConfig>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            seeds: vec![SeedConfig {
                key: "ownerId".into(),
                from: SeedSource::Cookie("ownerId".into()),
            }],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedConfig {
    pub key: String,
    pub from: SeedSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedSource {
    Cookie(String),
    Header(String),
}

pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: Option<PathBuf>,
}

/// Resolve the config file: explicit path, then `./config/docgate.yaml`,
/// then the user config directory.
pub fn default_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|mut path| {
        path.push("docgate");
        path.push("config.yaml");
        path
    })
}

pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let path = explicit.map(Path::to_path_buf).or_else(default_path);
    let mut tree = serde_json::to_value(AppConfig::default())
        .map_err(|err| ConfigError::Invalid(err.to_string()))?;

    let mut loaded_from = None;
    if let Some(path) = path.as_deref() {
        if path.exists() {
            apply_overlays(&mut tree, overlays_from_file(path)?)?;
            info!(path = %path.display(), "loaded configuration");
            loaded_from = Some(path.to_path_buf());
        } else if explicit.is_some() {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                message: "file not found".into(),
            });
        } else {
            debug!(path = %path.display(), "no configuration file, using defaults");
        }
    }
    apply_overlays(&mut tree, overlays_from_env())?;

    let config =
        serde_json::from_value(tree).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    Ok(LoadedConfig {
        config,
        path: loaded_from,
    })
}

struct Overlay {
    path: Vec<String>,
    value: Value,
}

fn overlays_from_file(path: &Path) -> Result<Vec<Overlay>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    let json = serde_json::to_value(yaml).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    let mut overlays = Vec::new();
    flatten(json, Vec::new(), &mut overlays);
    Ok(overlays)
}

fn overlays_from_env() -> Vec<Overlay> {
    let mut overlays = Vec::new();
    for (key, raw) in env::vars() {
        let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.to_ascii_lowercase())
            .collect();
        if path.is_empty() {
            continue;
        }
        overlays.push(Overlay {
            path,
            value: parse_env_value(&raw),
        });
    }
    overlays.sort_by(|a, b| a.path.cmp(&b.path));
    overlays
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    Value::String(raw.to_string())
}

/// Objects flatten to their leaves; arrays and scalars are leaves.
fn flatten(value: Value, prefix: Vec<String>, out: &mut Vec<Overlay>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                let mut path = prefix.clone();
                path.push(key.trim().to_string());
                flatten(value, path, out);
            }
        }
        other if !prefix.is_empty() => out.push(Overlay {
            path: prefix,
            value: other,
        }),
        _ => {}
    }
}

fn apply_overlays(tree: &mut Value, overlays: Vec<Overlay>) -> Result<(), ConfigError> {
    for overlay in overlays {
        let (leaf, parents) = overlay
            .path
            .split_last()
            .ok_or_else(|| ConfigError::Invalid("empty configuration path".into()))?;
        let mut cursor = &mut *tree;
        for segment in parents {
            let Value::Object(map) = cursor else {
                return Err(ConfigError::Invalid(format!(
                    "{} is not a section",
                    overlay.path.join(".")
                )));
            };
            cursor = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        match cursor {
            Value::Object(map) => {
                map.insert(leaf.clone(), overlay.value);
            }
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "{} is not a section",
                    overlay.path.join(".")
                )))
            }
        }
    }
    Ok(())
}
