//! Layered application configuration: `application.yaml` →
//! `application-{profile}.yaml` → `.env` → `.env.{profile}` → environment
//! variables, with `${...}` secret placeholder resolution.

use std::collections::HashMap;
use std::ops::Deref;
use std::path::Path;

/// A single raw configuration value. String is the common case; the
/// others exist so `get::<T>()` doesn't have to re-parse every access.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

pub trait FromConfigValue: Sized {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError>;
}

impl FromConfigValue for String {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::String(s) => Ok(s.clone()),
            _ => Err(ConfigError::TypeMismatch { key: key.into(), expected: "string" }),
        }
    }
}

impl FromConfigValue for i64 {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::Integer(n) => Ok(*n),
            ConfigValue::String(s) => s.parse().map_err(|_| ConfigError::TypeMismatch { key: key.into(), expected: "integer" }),
            _ => Err(ConfigError::TypeMismatch { key: key.into(), expected: "integer" }),
        }
    }
}

impl FromConfigValue for f64 {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::Float(n) => Ok(*n),
            ConfigValue::Integer(n) => Ok(*n as f64),
            ConfigValue::String(s) => s.parse().map_err(|_| ConfigError::TypeMismatch { key: key.into(), expected: "float" }),
            _ => Err(ConfigError::TypeMismatch { key: key.into(), expected: "float" }),
        }
    }
}

impl FromConfigValue for bool {
    fn from_config_value(value: &ConfigValue, key: &str) -> Result<Self, ConfigError> {
        match value {
            ConfigValue::Bool(b) => Ok(*b),
            ConfigValue::String(s) => s.parse().map_err(|_| ConfigError::TypeMismatch { key: key.into(), expected: "bool" }),
            _ => Err(ConfigError::TypeMismatch { key: key.into(), expected: "bool" }),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    NotFound(String),
    TypeMismatch { key: String, expected: &'static str },
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => write!(f, "config type mismatch for '{key}': expected {expected}"),
            ConfigError::Load(msg) => write!(f, "config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Resolves `${VAR}` placeholders found inside string config values.
/// Applications can substitute their own resolver (e.g. a secrets
/// manager) by implementing this trait instead of using [`EnvSecretResolver`].
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}

pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Application configuration loaded from YAML files, `.env` files, and
/// environment variables.
///
/// Resolution order (lowest to highest priority):
/// 1. `application.yaml`
/// 2. `application-{profile}.yaml`
/// 3. `.env`
/// 4. `.env.{profile}`
/// 5. environment variables (`APP_DATABASE_URL` overrides `app.database.url`)
///
/// Profile is `TRELLIS_PROFILE` env var, else the argument to [`TrellisConfig::load`],
/// else `"dev"`.
#[derive(Debug, Clone)]
pub struct TrellisConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl TrellisConfig {
    pub fn load(profile: &str) -> Result<Self, ConfigError> {
        Self::load_with_resolver(profile, &EnvSecretResolver)
    }

    pub fn load_with_resolver(profile: &str, resolver: &dyn SecretResolver) -> Result<Self, ConfigError> {
        let active_profile = std::env::var("TRELLIS_PROFILE").unwrap_or_else(|_| profile.to_string());

        let mut values = HashMap::new();
        load_yaml_file(Path::new("application.yaml"), &mut values)?;
        load_yaml_file(Path::new(&format!("application-{active_profile}.yaml")), &mut values)?;

        let _ = dotenvy::dotenv();
        let _ = dotenvy::from_filename(format!(".env.{active_profile}"));

        resolve_placeholders(&mut values, resolver)?;

        for (env_key, env_val) in std::env::vars() {
            let config_key = env_key.to_lowercase().replace('_', ".");
            values.insert(config_key, ConfigValue::String(env_val));
        }

        Ok(TrellisConfig { values, profile: active_profile })
    }

    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        load_yaml_into(yaml, &mut values)?;
        Ok(TrellisConfig { values, profile: profile.to_string() })
    }

    pub fn empty() -> Self {
        TrellisConfig { values: HashMap::new(), profile: "test".to_string() }
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self.values.get(key).ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

fn load_yaml_file(path: &Path, values: &mut HashMap<String, ConfigValue>) -> Result<(), ConfigError> {
    if !path.exists() {
        return Ok(());
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
    load_yaml_into(&content, values)
}

fn load_yaml_into(yaml: &str, values: &mut HashMap<String, ConfigValue>) -> Result<(), ConfigError> {
    let parsed: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Load(e.to_string()))?;
    flatten_yaml("", &parsed, values);
    Ok(())
}

fn flatten_yaml(prefix: &str, value: &serde_yaml::Value, out: &mut HashMap<String, ConfigValue>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                let key_str = k.as_str().unwrap_or_default();
                let next_prefix = if prefix.is_empty() { key_str.to_string() } else { format!("{prefix}.{key_str}") };
                flatten_yaml(&next_prefix, v, out);
            }
        }
        serde_yaml::Value::String(s) => {
            out.insert(prefix.to_string(), ConfigValue::String(s.clone()));
        }
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.insert(prefix.to_string(), ConfigValue::Integer(i));
            } else if let Some(f) = n.as_f64() {
                out.insert(prefix.to_string(), ConfigValue::Float(f));
            }
        }
        serde_yaml::Value::Bool(b) => {
            out.insert(prefix.to_string(), ConfigValue::Bool(*b));
        }
        _ => {}
    }
}

fn resolve_placeholders(values: &mut HashMap<String, ConfigValue>, resolver: &dyn SecretResolver) -> Result<(), ConfigError> {
    let keys: Vec<String> = values.keys().cloned().collect();
    for key in keys {
        if let Some(ConfigValue::String(s)) = values.get(&key) {
            if s.contains("${") {
                let resolved = resolve_one(s, resolver)?;
                values.insert(key, ConfigValue::String(resolved));
            }
        }
    }
    Ok(())
}

fn resolve_one(input: &str, resolver: &dyn SecretResolver) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('}') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = &rest[start + 2..start + end];
        let value = resolver.resolve(name).ok_or_else(|| ConfigError::Load(format!("unresolved placeholder: {name}")))?;
        out.push_str(&value);
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

impl Deref for TrellisConfig {
    type Target = HashMap<String, ConfigValue>;
    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_yaml() {
        let config = TrellisConfig::from_yaml_str(
            "app:\n  name: trellis\n  port: 8080\n  debug: true\n",
            "test",
        )
        .unwrap();
        assert_eq!(config.get::<String>("app.name").unwrap(), "trellis");
        assert_eq!(config.get::<i64>("app.port").unwrap(), 8080);
        assert!(config.get::<bool>("app.debug").unwrap());
    }

    #[test]
    fn missing_key_is_not_found() {
        let config = TrellisConfig::empty();
        assert!(matches!(config.get::<String>("missing"), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn get_or_falls_back_to_default() {
        let config = TrellisConfig::empty();
        assert_eq!(config.get_or("app.name", "default".to_string()), "default");
    }

    struct StaticResolver;
    impl SecretResolver for StaticResolver {
        fn resolve(&self, name: &str) -> Option<String> {
            if name == "SECRET" {
                Some("shh".to_string())
            } else {
                None
            }
        }
    }

    #[test]
    fn resolves_placeholders() {
        let mut values = HashMap::new();
        values.insert("app.secret".to_string(), ConfigValue::String("${SECRET}".to_string()));
        resolve_placeholders(&mut values, &StaticResolver).unwrap();
        assert_eq!(values.get("app.secret"), Some(&ConfigValue::String("shh".to_string())));
    }
}
