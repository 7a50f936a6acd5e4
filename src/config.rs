use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::chat::{DEFAULT_FALLBACK_MESSAGE, ResponseMode};
use crate::errors::CliError;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;
pub const API_URL_ENV: &str = "CHATBOX_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileConfig {
    pub api_url: String,
    #[serde(default)]
    pub mode: ResponseMode,
    /// Applies to the response head and to each idle gap between stream chunks. 0 waits forever.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_message: Option<String>,
    #[serde(
        default = "default_allowed_extensions",
        deserialize_with = "deserialize_extensions"
    )]
    pub allowed_extensions: Vec<String>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            mode: ResponseMode::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            fallback_message: None,
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl ProfileConfig {
    pub fn fallback_message(&self) -> String {
        self.fallback_message
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_FALLBACK_MESSAGE)
            .to_string()
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_allowed_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "jfif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Hand-edited config files get the same cleanup as `config set`.
fn deserialize_extensions<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(normalize_extensions(raw.iter().map(String::as_str)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    pub profile: String,
    pub profiles: HashMap<String, ProfileConfig>,
}

impl Default for CliConfig {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert("default".to_string(), ProfileConfig::default());
        Self {
            profile: "default".to_string(),
            profiles,
        }
    }
}

pub fn config_path() -> Result<PathBuf, CliError> {
    let base = dirs::config_dir().ok_or_else(|| {
        CliError::Generic("Could not resolve config directory for this OS.".to_string())
    })?;
    Ok(base.join("chatbox").join("config.json"))
}

pub fn load_config() -> Result<CliConfig, CliError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(CliConfig::default());
    }

    let text = fs::read_to_string(&path)?;
    let mut config: CliConfig = serde_json::from_str(&text)?;
    let profile = config.profile.clone();
    ensure_profile(&mut config, &profile);
    Ok(config)
}

pub fn save_config(config: &CliConfig) -> Result<PathBuf, CliError> {
    let path = config_path()?;
    let parent = path
        .parent()
        .ok_or_else(|| CliError::Generic("Invalid config path.".to_string()))?;
    fs::create_dir_all(parent)?;
    fs::write(&path, serde_json::to_string_pretty(config)?)?;
    Ok(path)
}

pub fn active_profile_name(config: &CliConfig, profile_override: Option<&str>) -> String {
    profile_override
        .map(|s| s.to_string())
        .unwrap_or_else(|| config.profile.clone())
}

pub fn ensure_profile(config: &mut CliConfig, profile_name: &str) {
    if !config.profiles.contains_key(profile_name) {
        config
            .profiles
            .insert(profile_name.to_string(), ProfileConfig::default());
    }
}

pub fn profile_ref<'a>(config: &'a CliConfig, profile_name: &str) -> Option<&'a ProfileConfig> {
    config.profiles.get(profile_name)
}

pub fn profile_mut<'a>(
    config: &'a mut CliConfig,
    profile_name: &str,
) -> Option<&'a mut ProfileConfig> {
    config.profiles.get_mut(profile_name)
}

pub fn resolve_api_url(
    config: &CliConfig,
    profile_name: &str,
    api_override: Option<&str>,
) -> Result<String, CliError> {
    let from_env = std::env::var(API_URL_ENV).ok();
    pick_api_url(config, profile_name, api_override, from_env.as_deref())
}

fn pick_api_url(
    config: &CliConfig,
    profile_name: &str,
    api_override: Option<&str>,
    from_env: Option<&str>,
) -> Result<String, CliError> {
    let explicit = api_override
        .or(from_env)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(url) = explicit {
        validate_url(url)?;
        return Ok(url.to_string());
    }

    let profile = profile_ref(config, profile_name)
        .ok_or_else(|| CliError::Usage(format!("Profile '{profile_name}' does not exist.")))?;
    validate_url(&profile.api_url)?;
    Ok(profile.api_url.clone())
}

pub fn validate_url(value: &str) -> Result<(), CliError> {
    let parsed = Url::parse(value)?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(CliError::Usage(
            "API URL must use http:// or https://.".to_string(),
        ));
    }
    Ok(())
}

pub fn parse_extension_list(value: &str) -> Vec<String> {
    normalize_extensions(value.split(','))
}

fn normalize_extensions<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    items
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_override_wins_over_env_and_profile() {
        let config = CliConfig::default();
        let url = pick_api_url(
            &config,
            "default",
            Some("https://flag.example"),
            Some("https://env.example"),
        )
        .unwrap();
        assert_eq!(url, "https://flag.example");

        let url = pick_api_url(&config, "default", None, Some("https://env.example")).unwrap();
        assert_eq!(url, "https://env.example");

        let url = pick_api_url(&config, "default", None, Some("  ")).unwrap();
        assert_eq!(url, DEFAULT_API_URL);
    }

    #[test]
    fn missing_profile_is_a_usage_error() {
        let config = CliConfig::default();
        let err = pick_api_url(&config, "nope", None, None).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("https://example.com/chat").is_ok());
    }

    #[test]
    fn older_config_files_get_defaults() {
        let raw = r#"{"profile":"default","profiles":{"default":{"apiUrl":"http://box:8000"}}}"#;
        let config: CliConfig = serde_json::from_str(raw).unwrap();
        let profile = profile_ref(&config, "default").unwrap();
        assert_eq!(profile.api_url, "http://box:8000");
        assert_eq!(profile.mode, ResponseMode::Stream);
        assert_eq!(profile.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(
            profile.allowed_extensions,
            vec!["png", "jpg", "jpeg", "gif", "jfif"]
        );
        assert_eq!(profile.fallback_message(), DEFAULT_FALLBACK_MESSAGE);
    }

    #[test]
    fn stored_extensions_are_normalized_on_load() {
        let raw = r#"{"profile":"default","profiles":{"default":{
            "apiUrl":"http://box:8000","allowedExtensions":[" .JFIF","PNG",""]}}}"#;
        let config: CliConfig = serde_json::from_str(raw).unwrap();
        let profile = profile_ref(&config, "default").unwrap();
        assert_eq!(profile.allowed_extensions, vec!["jfif", "png"]);
    }

    #[test]
    fn extension_list_is_normalized() {
        assert_eq!(parse_extension_list(" .PNG, jpg,,webp "), vec!["png", "jpg", "webp"]);
    }
}
