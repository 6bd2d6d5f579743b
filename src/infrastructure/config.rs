use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use url::Url;

const APP_JSON: &str = "app.json";
const TIMER_JSON: &str = "timer.json";

const REMOTE_URL_KEYS: [&str; 2] = ["FOCUSDESK_SUPABASE_URL", "SUPABASE_URL"];
const REMOTE_ANON_KEY_KEYS: [&str; 2] = ["FOCUSDESK_SUPABASE_ANON_KEY", "SUPABASE_ANON_KEY"];

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub timer: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    pub work_seconds: u32,
    pub break_seconds: u32,
    pub flush_threshold_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: Url,
    pub anon_key: String,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "FocusDesk",
                "timezone": null,
                "remote": {
                    "url": null,
                    "anonKey": null
                }
            }),
        ),
        (
            TIMER_JSON,
            serde_json::json!({
                "schema": 1,
                "workSeconds": 1500,
                "breakSeconds": 300,
                "flushThresholdSeconds": 10
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        timer: read_config(&config_dir.join(TIMER_JSON))?,
    })
}

pub fn read_timezone(config_dir: &Path) -> Result<Option<String>, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned))
}

pub fn read_timer_settings(config_dir: &Path) -> Result<TimerSettings, InfraError> {
    let timer = read_config(&config_dir.join(TIMER_JSON))?;
    let field = |name: &str, default: u32| -> Result<u32, InfraError> {
        match timer.get(name) {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(value) => value
                .as_u64()
                .and_then(|value| u32::try_from(value).ok())
                .filter(|value| *value > 0)
                .ok_or_else(|| {
                    InfraError::InvalidConfig(format!("{name} in {TIMER_JSON} must be a positive integer"))
                }),
        }
    };
    Ok(TimerSettings {
        work_seconds: field("workSeconds", 1500)?,
        break_seconds: field("breakSeconds", 300)?,
        flush_threshold_seconds: field("flushThresholdSeconds", 10)?.max(1),
    })
}

pub fn read_remote_config(config_dir: &Path) -> Result<RemoteConfig, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    remote_config_from_lookup(&app, |key| std::env::var(key).ok())
}

pub fn remote_config_from_lookup<F>(app: &serde_json::Value, lookup: F) -> Result<RemoteConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let remote = app.get("remote");
    let file_value = |name: &str| {
        remote
            .and_then(|remote| remote.get(name))
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    };

    let url = optional_lookup_value(&lookup, &REMOTE_URL_KEYS)
        .or_else(|| file_value("url"))
        .ok_or_else(|| missing_value("remote url", &REMOTE_URL_KEYS, "remote.url"))?;
    let anon_key = optional_lookup_value(&lookup, &REMOTE_ANON_KEY_KEYS)
        .or_else(|| file_value("anonKey"))
        .ok_or_else(|| missing_value("remote anon key", &REMOTE_ANON_KEY_KEYS, "remote.anonKey"))?;

    let url = Url::parse(&url)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid remote url '{url}': {error}")))?;
    Ok(RemoteConfig { url, anon_key })
}

fn missing_value(field_name: &str, keys: &[&str], file_key: &str) -> InfraError {
    InfraError::InvalidConfig(format!(
        "missing {} (set one of: {}, or {} in {})",
        field_name,
        keys.join(", "),
        file_key,
        APP_JSON
    ))
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}
