use std::path::PathBuf;

use crate::api::ApiClient;
use crate::chat::{ChatSettings, ResponseMode};
use crate::config::{
    CliConfig, ProfileConfig, active_profile_name, profile_ref, resolve_api_url,
};
use crate::errors::CliError;
use crate::output::OutputMode;

#[derive(Debug, Clone)]
pub struct Runtime {
    pub output: OutputMode,
    pub config: CliConfig,
    pub config_path: PathBuf,
    pub profile_override: Option<String>,
    pub api_url_override: Option<String>,
    pub mode_override: Option<ResponseMode>,
    pub timeout_override: Option<u64>,
}

impl Runtime {
    pub fn active_profile(&self) -> String {
        active_profile_name(&self.config, self.profile_override.as_deref())
    }

    pub fn profile(&self) -> ProfileConfig {
        profile_ref(&self.config, &self.active_profile())
            .cloned()
            .unwrap_or_default()
    }

    pub fn resolved_api_url(&self) -> Result<String, CliError> {
        resolve_api_url(
            &self.config,
            &self.active_profile(),
            self.api_url_override.as_deref(),
        )
    }

    pub fn resolved_mode(&self) -> ResponseMode {
        self.mode_override.unwrap_or_else(|| self.profile().mode)
    }

    pub fn chat_settings(&self) -> ChatSettings {
        let profile = self.profile();
        ChatSettings {
            mode: self.resolved_mode(),
            fallback_message: profile.fallback_message(),
            allowed_extensions: profile.allowed_extensions,
        }
    }

    pub fn api_client(&self) -> Result<ApiClient, CliError> {
        let timeout_ms = self
            .timeout_override
            .unwrap_or_else(|| self.profile().timeout_ms);
        ApiClient::new(self.resolved_api_url()?, timeout_ms, self.output.debug)
    }
}
