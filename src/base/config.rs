//! Load the YAML configuration file and the secrets the bot needs from the environment.

use std::{fmt, ops::Deref, path::Path, sync::Arc};

use anyhow::{Context, anyhow};
use serde::Deserialize;

use super::types::Res;

/// Configuration for the slackbot.
///
/// Cheap to clone; the parsed values live behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Config {
    /// The parsed values.
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Values read from the YAML config file.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigInner {
    /// Base URL of the LLMariner API (`llmarinerBaseUrl`), e.g. `https://api.llm.example.com/v1`.
    pub llmariner_base_url: String,
    /// Model used for chat completions (`modelId`).
    pub model_id: String,
}

impl Config {
    /// Read and validate the config file at `path`.
    pub fn load(path: &Path) -> Res<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("config: read {}", path.display()))?;

        Self::from_yaml(&raw)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(raw: &str) -> Res<Self> {
        let inner: ConfigInner = serde_yaml_ng::from_str(raw).context("config: unmarshal")?;

        let result = Config { inner: Arc::new(inner) };
        result.validate()?;

        Ok(result)
    }

    fn validate(&self) -> Res<()> {
        if self.llmariner_base_url.is_empty() {
            return Err(anyhow!("llmarinerBaseUrl is required"));
        }

        if self.model_id.is_empty() {
            return Err(anyhow!("modelId is required"));
        }

        Ok(())
    }
}

/// Tokens read from the process environment at startup.
///
/// These are handed to the client constructors explicitly; nothing else reads the environment.
#[derive(Clone)]
pub struct Secrets {
    /// Slack bot token (`SLACK_TOKEN`).
    pub slack_token: String,
    /// Slack app-level token used for socket mode (`SLACK_APP_TOKEN`).
    pub slack_app_token: String,
    /// LLMariner API key (`LLMARINER_API_KEY`).
    pub llmariner_api_key: String,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("slack_token", &"<redacted>")
            .field("slack_app_token", &"<redacted>")
            .field("llmariner_api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawSecrets {
    slack_token: Option<String>,
    slack_app_token: Option<String>,
    llmariner_api_key: Option<String>,
}

impl Secrets {
    /// Read the secrets from the process environment.
    pub fn from_env() -> Res<Self> {
        Self::load(None)
    }

    /// Read the secrets from an explicit variable map instead of the process environment.
    pub fn from_map(vars: config::Map<String, String>) -> Res<Self> {
        Self::load(Some(vars))
    }

    fn load(source: Option<config::Map<String, String>>) -> Res<Self> {
        let raw: RawSecrets = config::Config::builder()
            .add_source(config::Environment::default().source(source))
            .build()?
            .try_deserialize()?;

        Ok(Self {
            slack_token: required(raw.slack_token, "SLACK_TOKEN")?,
            slack_app_token: required(raw.slack_app_token, "SLACK_APP_TOKEN")?,
            llmariner_api_key: required(raw.llmariner_api_key, "LLMARINER_API_KEY")?,
        })
    }
}

fn required(value: Option<String>, name: &str) -> Res<String> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(anyhow!("{name} is required")),
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> config::Map<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn parses_camel_case_fields() {
        let config = Config::from_yaml("llmarinerBaseUrl: http://localhost:8080/v1\nmodelId: google-gemma-2b-it-q4_0\n").unwrap();

        assert_eq!(config.llmariner_base_url, "http://localhost:8080/v1");
        assert_eq!(config.model_id, "google-gemma-2b-it-q4_0");
    }

    #[test]
    fn missing_base_url_is_rejected() {
        let err = Config::from_yaml("modelId: some-model\n").unwrap_err();
        assert_eq!(err.to_string(), "llmarinerBaseUrl is required");
    }

    #[test]
    fn empty_model_id_is_rejected() {
        let err = Config::from_yaml("llmarinerBaseUrl: http://localhost\nmodelId: \"\"\n").unwrap_err();
        assert_eq!(err.to_string(), "modelId is required");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(Config::from_yaml("llmarinerBaseUrl: [unterminated").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(err.to_string().starts_with("config: read"));
    }

    #[test]
    fn secrets_are_read_from_the_map() {
        let secrets = Secrets::from_map(vars(&[("SLACK_TOKEN", "xoxb-1"), ("SLACK_APP_TOKEN", "xapp-1"), ("LLMARINER_API_KEY", "key")])).unwrap();

        assert_eq!(secrets.slack_token, "xoxb-1");
        assert_eq!(secrets.slack_app_token, "xapp-1");
        assert_eq!(secrets.llmariner_api_key, "key");
    }

    #[test]
    fn each_missing_secret_is_named() {
        let err = Secrets::from_map(vars(&[("SLACK_APP_TOKEN", "xapp-1"), ("LLMARINER_API_KEY", "key")])).unwrap_err();
        assert_eq!(err.to_string(), "SLACK_TOKEN is required");

        let err = Secrets::from_map(vars(&[("SLACK_TOKEN", "xoxb-1"), ("LLMARINER_API_KEY", "key")])).unwrap_err();
        assert_eq!(err.to_string(), "SLACK_APP_TOKEN is required");

        let err = Secrets::from_map(vars(&[("SLACK_TOKEN", "xoxb-1"), ("SLACK_APP_TOKEN", "xapp-1"), ("LLMARINER_API_KEY", "")])).unwrap_err();
        assert_eq!(err.to_string(), "LLMARINER_API_KEY is required");
    }

    #[test]
    fn secrets_debug_is_redacted() {
        let secrets = Secrets::from_map(vars(&[("SLACK_TOKEN", "xoxb-1"), ("SLACK_APP_TOKEN", "xapp-1"), ("LLMARINER_API_KEY", "key")])).unwrap();
        let debug = format!("{secrets:?}");

        assert!(!debug.contains("xoxb-1"));
        assert!(debug.contains("<redacted>"));
    }
}
