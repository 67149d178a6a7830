use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const MODELS_JSON: &str = "models.json";
const PREFERENCES_JSON: &str = "preferences.json";
const INTEGRATIONS_JSON: &str = "integrations.json";

pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct:free";

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub models: serde_json::Value,
    pub preferences: serde_json::Value,
    pub integrations: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPreferences {
    pub work_start: String,
    pub work_end: String,
    pub energy_pattern: String,
    pub buffer_minutes: u32,
}

impl Default for PlanPreferences {
    fn default() -> Self {
        Self {
            work_start: "09:00".to_string(),
            work_end: "17:00".to_string(),
            energy_pattern: "morning".to_string(),
            buffer_minutes: 15,
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "TaskPilot",
                "timezone": "UTC"
            }),
        ),
        (
            MODELS_JSON,
            serde_json::json!({
                "schema": 1,
                "defaultModel": DEFAULT_MODEL,
                "models": [
                    DEFAULT_MODEL,
                    "deepseek/deepseek-chat-v3-0324:free",
                    "openai/gpt-4o-mini"
                ]
            }),
        ),
        (
            PREFERENCES_JSON,
            serde_json::json!({
                "schema": 1,
                "workHours": {
                    "start": "09:00",
                    "end": "17:00"
                },
                "energyPattern": "morning",
                "bufferMinutes": 15
            }),
        ),
        (
            INTEGRATIONS_JSON,
            serde_json::json!({
                "schema": 1,
                "webhookUrl": null,
                "emailFrom": "TaskPilot <notifications@taskpilot.dev>",
                "supportInbox": "support@taskpilot.dev",
                "portalReturnUrl": "https://taskpilot.dev/account"
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
        models: read_config(&config_dir.join(MODELS_JSON))?,
        preferences: read_config(&config_dir.join(PREFERENCES_JSON))?,
        integrations: read_config(&config_dir.join(INTEGRATIONS_JSON))?,
    })
}

pub fn read_timezone(config_dir: &Path) -> Result<String, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("UTC")
        .to_string())
}

pub fn read_default_model(config_dir: &Path) -> Result<String, InfraError> {
    let models = read_config(&config_dir.join(MODELS_JSON))?;
    Ok(models
        .get("defaultModel")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_MODEL)
        .to_string())
}

pub fn read_plan_preferences(config_dir: &Path) -> PlanPreferences {
    let mut preferences = PlanPreferences::default();
    let Ok(parsed) = read_config(&config_dir.join(PREFERENCES_JSON)) else {
        return preferences;
    };

    if let Some(work_hours) = parsed.get("workHours") {
        if let Some(start) = work_hours
            .get("start")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            preferences.work_start = start.to_string();
        }
        if let Some(end) = work_hours
            .get("end")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            preferences.work_end = end.to_string();
        }
    }
    if let Some(pattern) = parsed
        .get("energyPattern")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        preferences.energy_pattern = pattern.to_string();
    }
    if let Some(buffer) = parsed
        .get("bufferMinutes")
        .and_then(serde_json::Value::as_u64)
    {
        preferences.buffer_minutes = buffer as u32;
    }

    preferences
}

pub fn read_webhook_url(config_dir: &Path) -> Result<Option<String>, InfraError> {
    let integrations = read_config(&config_dir.join(INTEGRATIONS_JSON))?;
    Ok(integrations
        .get("webhookUrl")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned))
}

pub fn read_email_from(config_dir: &Path) -> Result<String, InfraError> {
    read_integration_string(config_dir, "emailFrom", "TaskPilot <notifications@taskpilot.dev>")
}

pub fn read_support_inbox(config_dir: &Path) -> Result<String, InfraError> {
    read_integration_string(config_dir, "supportInbox", "support@taskpilot.dev")
}

pub fn read_portal_return_url(config_dir: &Path) -> Result<String, InfraError> {
    read_integration_string(config_dir, "portalReturnUrl", "https://taskpilot.dev/account")
}

fn read_integration_string(
    config_dir: &Path,
    key: &str,
    fallback: &str,
) -> Result<String, InfraError> {
    let integrations = read_config(&config_dir.join(INTEGRATIONS_JSON))?;
    Ok(integrations
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
        .to_string())
}

pub fn save_webhook_url(config_dir: &Path, webhook_url: Option<&str>) -> Result<(), InfraError> {
    let path = config_dir.join(INTEGRATIONS_JSON);
    let mut integrations = read_config(&path)?;
    let object = integrations.as_object_mut().ok_or_else(|| {
        InfraError::InvalidConfig(format!("invalid object structure in {}", path.display()))
    })?;
    let value = match webhook_url.map(str::trim).filter(|value| !value.is_empty()) {
        Some(url) => serde_json::Value::String(url.to_string()),
        None => serde_json::Value::Null,
    };
    object.insert("webhookUrl".to_string(), value);

    let formatted = serde_json::to_string_pretty(&integrations)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_ID: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "taskpilot-config-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp directory");
            ensure_default_configs(&path).expect("initialize default configs");
            Self { path }
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn defaults_are_created_and_loadable() {
        let temp = TempConfigDir::new();
        let bundle = load_configs(temp.path()).expect("load configs");
        assert_eq!(bundle.app["appName"], "TaskPilot");
        assert_eq!(read_timezone(temp.path()).expect("timezone"), "UTC");
        assert_eq!(
            read_default_model(temp.path()).expect("model"),
            DEFAULT_MODEL
        );
    }

    #[test]
    fn plan_preferences_fall_back_to_defaults_on_missing_file() {
        let preferences = read_plan_preferences(Path::new("/nonexistent/config"));
        assert_eq!(preferences, PlanPreferences::default());
    }

    #[test]
    fn webhook_url_roundtrip() {
        let temp = TempConfigDir::new();
        assert!(read_webhook_url(temp.path()).expect("read").is_none());

        save_webhook_url(temp.path(), Some("https://hooks.zapier.com/abc")).expect("save");
        assert_eq!(
            read_webhook_url(temp.path()).expect("read").as_deref(),
            Some("https://hooks.zapier.com/abc")
        );

        save_webhook_url(temp.path(), None).expect("clear");
        assert!(read_webhook_url(temp.path()).expect("read").is_none());
    }
}
