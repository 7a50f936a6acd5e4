use clap::{Subcommand, ValueEnum};
use serde_json::{Value, json};

use crate::app::Runtime;
use crate::chat::ResponseMode;
use crate::config::{
    ProfileConfig, ensure_profile, parse_extension_list, profile_mut, profile_ref, save_config,
    validate_url,
};
use crate::errors::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Initialize config file and profile
    Init {
        #[arg(long = "api-url")]
        api_url: Option<String>,
        #[arg(long, value_enum)]
        mode: Option<ResponseMode>,
    },
    /// Read a config key from the active profile
    Get { key: ConfigKey },
    /// Set a config key on the active profile
    Set { key: ConfigKey, value: String },
    /// List all profiles
    Profiles,
    /// Switch active profile
    Use { profile: String },
    /// Print the config file location
    Path,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigKey {
    #[value(name = "apiUrl")]
    ApiUrl,
    #[value(name = "mode")]
    Mode,
    #[value(name = "timeoutMs")]
    TimeoutMs,
    #[value(name = "fallbackMessage")]
    FallbackMessage,
    #[value(name = "allowedExtensions")]
    AllowedExtensions,
}

impl ConfigKey {
    fn name(self) -> &'static str {
        match self {
            ConfigKey::ApiUrl => "apiUrl",
            ConfigKey::Mode => "mode",
            ConfigKey::TimeoutMs => "timeoutMs",
            ConfigKey::FallbackMessage => "fallbackMessage",
            ConfigKey::AllowedExtensions => "allowedExtensions",
        }
    }
}

pub async fn handle(runtime: &mut Runtime, command: ConfigCommand) -> Result<(), CliError> {
    match command {
        ConfigCommand::Init { api_url, mode } => init(runtime, api_url, mode).await,
        ConfigCommand::Get { key } => get(runtime, key).await,
        ConfigCommand::Set { key, value } => set(runtime, key, value).await,
        ConfigCommand::Profiles => profiles(runtime).await,
        ConfigCommand::Use { profile } => use_profile(runtime, profile).await,
        ConfigCommand::Path => path(runtime).await,
    }
}

async fn init(
    runtime: &mut Runtime,
    api_url: Option<String>,
    mode: Option<ResponseMode>,
) -> Result<(), CliError> {
    let profile_name = runtime.active_profile();
    ensure_profile(&mut runtime.config, &profile_name);
    if let Some(profile) = profile_mut(&mut runtime.config, &profile_name) {
        if let Some(url) = api_url {
            validate_url(&url)?;
            profile.api_url = url;
        }
        if let Some(mode) = mode {
            profile.mode = mode;
        }
    }

    runtime.config.profile = profile_name;
    let path = save_config(&runtime.config)?;
    runtime.config_path = path.clone();

    if runtime.output.json {
        runtime
            .output
            .print_json(&json!({ "ok": true, "path": path }))?;
    } else {
        runtime
            .output
            .print_human(&format!("Config initialized: {}", path.display()));
    }
    Ok(())
}

async fn get(runtime: &mut Runtime, key: ConfigKey) -> Result<(), CliError> {
    let profile_name = runtime.active_profile();
    let profile = profile_ref(&runtime.config, &profile_name).ok_or_else(|| {
        CliError::Usage(format!(
            "Profile '{profile_name}' not found. Run `chatbox config init` first."
        ))
    })?;

    let value = key_value(profile, key);
    if runtime.output.json {
        runtime
            .output
            .print_json(&json!({ "key": key.name(), "value": value }))?;
        return Ok(());
    }

    match value {
        Value::String(text) => runtime.output.print_human(&text),
        Value::Null => runtime.output.print_human("(not set)"),
        other => runtime.output.print_human(&other.to_string()),
    }
    Ok(())
}

fn key_value(profile: &ProfileConfig, key: ConfigKey) -> Value {
    match key {
        ConfigKey::ApiUrl => json!(profile.api_url),
        ConfigKey::Mode => json!(profile.mode.as_str()),
        ConfigKey::TimeoutMs => json!(profile.timeout_ms),
        ConfigKey::FallbackMessage => json!(profile.fallback_message),
        ConfigKey::AllowedExtensions => json!(profile.allowed_extensions),
    }
}

async fn set(runtime: &mut Runtime, key: ConfigKey, value: String) -> Result<(), CliError> {
    let profile_name = runtime.active_profile();
    ensure_profile(&mut runtime.config, &profile_name);
    let profile = profile_mut(&mut runtime.config, &profile_name).ok_or_else(|| {
        CliError::Generic(format!(
            "Failed to resolve profile '{profile_name}' while setting config."
        ))
    })?;

    apply_key(profile, key, &value)?;

    let path = save_config(&runtime.config)?;
    runtime.config_path = path;

    if runtime.output.json {
        runtime.output.print_json(&json!({ "ok": true }))?;
    } else {
        runtime.output.print_human("Config updated.");
    }

    Ok(())
}

fn apply_key(profile: &mut ProfileConfig, key: ConfigKey, value: &str) -> Result<(), CliError> {
    match key {
        ConfigKey::ApiUrl => {
            validate_url(value)?;
            profile.api_url = value.to_string();
        }
        ConfigKey::Mode => {
            profile.mode = ResponseMode::parse(value).ok_or_else(|| {
                CliError::Usage("mode must be `stream` or `batch`.".to_string())
            })?;
        }
        ConfigKey::TimeoutMs => {
            profile.timeout_ms = value.trim().parse::<u64>().map_err(|_| {
                CliError::Usage("timeoutMs must be a whole number of milliseconds.".to_string())
            })?;
        }
        ConfigKey::FallbackMessage => {
            let trimmed = value.trim();
            profile.fallback_message = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
        ConfigKey::AllowedExtensions => {
            profile.allowed_extensions = parse_extension_list(value);
        }
    }
    Ok(())
}

async fn profiles(runtime: &mut Runtime) -> Result<(), CliError> {
    let active = runtime.active_profile();
    let mut names: Vec<String> = runtime.config.profiles.keys().cloned().collect();
    names.sort();

    if runtime.output.json {
        let payload = names
            .iter()
            .map(|name| {
                let profile = runtime.config.profiles.get(name);
                json!({
                    "name": name,
                    "active": name == &active,
                    "apiUrl": profile.map(|p| p.api_url.clone()).unwrap_or_default(),
                    "mode": profile.map(|p| p.mode.as_str()).unwrap_or_default(),
                })
            })
            .collect::<Vec<_>>();
        runtime.output.print_json(&json!({ "profiles": payload }))?;
        return Ok(());
    }

    for name in names {
        let marker = if name == active { "*" } else { " " };
        runtime.output.print_human(&format!("{marker} {name}"));
    }
    Ok(())
}

async fn use_profile(runtime: &mut Runtime, profile_name: String) -> Result<(), CliError> {
    ensure_profile(&mut runtime.config, &profile_name);
    runtime.config.profile = profile_name.clone();
    let path = save_config(&runtime.config)?;
    runtime.config_path = path;

    if runtime.output.json {
        runtime
            .output
            .print_json(&json!({ "ok": true, "profile": profile_name }))?;
    } else {
        runtime
            .output
            .print_human(&format!("Active profile: {profile_name}"));
    }

    Ok(())
}

async fn path(runtime: &mut Runtime) -> Result<(), CliError> {
    if runtime.output.json {
        runtime
            .output
            .print_json(&json!({ "path": runtime.config_path }))?;
    } else {
        runtime
            .output
            .print_human(&runtime.config_path.display().to_string());
    }
    Ok(())
}
