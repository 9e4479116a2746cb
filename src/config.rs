use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KiraError;
use crate::store::Store;

pub const TOPIC_PLACEHOLDER: &str = "{topic}";
pub const DEFAULT_RETMAX: u32 = 5;
pub const MAX_RETMAX: u32 = 500;
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_COMPLETION_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_PROMPT: &str = "Summarize the following recent PubMed papers on the topic '{topic}'. Use markdown for formatting and include references to the papers by their URLs.";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_retmax")]
    pub retmax: u32,
    #[serde(default = "default_prompt")]
    pub prompt: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub detail_proxy: Option<String>,
    #[serde(default = "default_completion_endpoint")]
    pub completion_endpoint: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            retmax: DEFAULT_RETMAX,
            prompt: default_prompt(),
            model: default_model(),
            detail_proxy: None,
            completion_endpoint: default_completion_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub openai_api_key: Option<String>,
    pub retmax: Option<u32>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub detail_proxy: Option<String>,
}

impl Settings {
    pub fn api_key(&self) -> Option<String> {
        self.openai_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    pub fn apply(&mut self, update: SettingsUpdate) -> Result<(), KiraError> {
        if let Some(key) = update.openai_api_key {
            self.openai_api_key = Some(key.trim().to_string()).filter(|key| !key.is_empty());
        }
        if let Some(retmax) = update.retmax {
            self.retmax = retmax;
        }
        if let Some(prompt) = update.prompt {
            self.prompt = prompt;
        }
        if let Some(model) = update.model {
            self.model = model;
        }
        if let Some(proxy) = update.detail_proxy {
            self.detail_proxy = Some(proxy.trim().to_string()).filter(|proxy| !proxy.is_empty());
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), KiraError> {
        validate_retmax(self.retmax)?;
        validate_prompt(&self.prompt)?;
        if self.model.trim().is_empty() {
            return Err(KiraError::InvalidSetting {
                name: "model",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

pub fn validate_retmax(retmax: u32) -> Result<(), KiraError> {
    if retmax == 0 || retmax > MAX_RETMAX {
        return Err(KiraError::InvalidSetting {
            name: "retmax",
            message: format!("expected 1..={MAX_RETMAX}, got {retmax}"),
        });
    }
    Ok(())
}

pub fn validate_prompt(prompt: &str) -> Result<(), KiraError> {
    if !prompt.contains(TOPIC_PLACEHOLDER) {
        return Err(KiraError::InvalidSetting {
            name: "prompt",
            message: format!("template must contain {TOPIC_PLACEHOLDER}"),
        });
    }
    Ok(())
}

pub struct SettingsLoader;

impl SettingsLoader {
    pub fn load(store: &Store) -> Result<Settings, KiraError> {
        Self::load_from(&store.settings_path())
    }

    pub fn load_from(path: &Utf8Path) -> Result<Settings, KiraError> {
        if !path.as_std_path().exists() {
            debug!(path = %path, "no settings file, using defaults");
            return Ok(Settings::default());
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| KiraError::ConfigRead(path.as_std_path().to_path_buf()))?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(store: &Store, settings: &Settings) -> Result<(), KiraError> {
        settings.validate()?;
        let content = serde_json::to_vec_pretty(settings)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;
        Store::write_bytes_atomic(&store.settings_path(), &content)
    }

    pub fn reset(store: &Store) -> Result<Settings, KiraError> {
        Store::remove_if_exists(&store.settings_path())?;
        Ok(Settings::default())
    }
}

fn default_retmax() -> u32 {
    DEFAULT_RETMAX
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_completion_endpoint() -> String {
    DEFAULT_COMPLETION_ENDPOINT.to_string()
}
