//! Loading service configuration (API endpoint, user-facing strings, analytics
//! routing, signed-in profile) from TOML.
//!
//! See `AppConfig` for the expected schema. Every section is optional.

use serde::Deserialize;
use tracing::{error, info};

use crate::analytics::AnalyticsConfig;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub messages: Messages,
  #[serde(default)]
  pub analytics: AnalyticsConfig,
  #[serde(default)]
  pub profile: ProfileConfig,
}

/// Where the discussion REST API lives.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
  #[serde(default)]
  pub access_token: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 { 20 }

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:18000".into(),
      access_token: None,
      timeout_secs: default_timeout_secs(),
    }
  }
}

/// User-facing strings surfaced through the transient message channel.
/// Override them in TOML to localize.
#[derive(Clone, Debug, Deserialize)]
pub struct Messages {
  pub no_connection: String,
  pub unknown_error: String,
  pub comment_added: String,
}

impl Default for Messages {
  fn default() -> Self {
    Self {
      no_connection: "You are not connected to the Internet. Please check your Internet connection.".into(),
      unknown_error: "Something went wrong".into(),
      comment_added: "Comment successfully added".into(),
    }
  }
}

/// The signed-in user, attached to comments they create.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct ProfileConfig {
  #[serde(default)] pub username: String,
  #[serde(default)] pub image_url: String,
}

impl AppConfig {
  /// Apply env overrides on top of whatever TOML provided.
  pub fn with_env_overrides(mut self) -> Self {
    if let Ok(url) = std::env::var("DISCUSSION_API_BASE_URL") {
      self.api.base_url = url;
    }
    if let Ok(token) = std::env::var("DISCUSSION_ACCESS_TOKEN") {
      self.api.access_token = Some(token);
    }
    self
  }
}

pub fn parse_app_config(s: &str) -> Result<AppConfig, toml::de::Error> {
  toml::from_str::<AppConfig>(s)
}

/// Load `AppConfig` from DISCUSSION_CONFIG_PATH. On any parsing/IO error, falls back to defaults.
pub fn load_app_config_from_env() -> AppConfig {
  let cfg = match std::env::var("DISCUSSION_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match parse_app_config(&s) {
        Ok(cfg) => {
          info!(target: "discussion_responses", %path, "Loaded config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "discussion_responses", %path, error = %e, "Failed to parse TOML config; using defaults");
          AppConfig::default()
        }
      },
      Err(e) => {
        error!(target: "discussion_responses", %path, error = %e, "Failed to read TOML config file; using defaults");
        AppConfig::default()
      }
    },
    Err(_) => AppConfig::default(),
  };
  cfg.with_env_overrides()
}
