//! Configuration for procoder.
//!
//! `~/.procoder/config.toml` is parsed into [`ProcoderConfig`] (every section
//! optional), then [`ProcoderConfig::resolve`] layers environment overrides
//! and built-in defaults on top to produce the [`Settings`] the session runs
//! with.

use std::path::{Path, PathBuf};
use std::{env, fs};

use procoder_types::{ApprovalMode, DuplicatePolicy};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "google/gemini-flash-1.5";
pub const DEFAULT_MAX_HISTORY_MESSAGES: usize = 30;
pub const DEFAULT_TOKEN_LIMIT: u32 = 8000;
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

// Default value function for serde (bool::default() is false, so only true needs a fn)
const fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcoderConfig {
    pub app: Option<AppConfig>,
    pub api: Option<ApiConfig>,
    pub git: Option<GitConfig>,
    pub edits: Option<EditsConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    pub model: Option<String>,
    /// `read_only`, `auto` or `full_access`.
    pub approval_mode: Option<String>,
    pub max_history_messages: Option<usize>,
    pub approx_token_limit: Option<u32>,
}

#[derive(Default, Deserialize)]
pub struct ApiConfig {
    pub openrouter_key: Option<String>,
    pub site_url: Option<String>,
    pub site_name: Option<String>,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = if self.openrouter_key.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ApiConfig")
            .field("openrouter_key", &key)
            .field("site_url", &self.site_url)
            .field("site_name", &self.site_name)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GitConfig {
    #[serde(default)]
    pub auto_stage: bool,
    #[serde(default)]
    pub auto_commit: bool,
}

/// Edit application settings.
///
/// ```toml
/// [edits]
/// backup = true
/// history_limit = 50
/// duplicate_policy = "last_wins"
/// persist_history = false
/// ```
#[derive(Debug, Deserialize)]
pub struct EditsConfig {
    #[serde(default = "default_true")]
    pub backup: bool,
    pub history_limit: Option<usize>,
    pub duplicate_policy: Option<String>,
    #[serde(default)]
    pub persist_history: bool,
}

impl Default for EditsConfig {
    fn default() -> Self {
        Self {
            backup: true,
            history_limit: None,
            duplicate_policy: None,
            persist_history: false,
        }
    }
}

/// Fully resolved runtime settings.
#[derive(Clone)]
pub struct Settings {
    pub model: String,
    pub api_key: Option<String>,
    pub site_url: Option<String>,
    pub site_name: Option<String>,
    pub approval_mode: ApprovalMode,
    pub max_history_messages: usize,
    pub approx_token_limit: u32,
    pub auto_stage: bool,
    pub auto_commit: bool,
    pub backup: bool,
    pub history_limit: usize,
    pub duplicate_policy: DuplicatePolicy,
    pub persist_history: bool,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("approval_mode", &self.approval_mode)
            .field("auto_stage", &self.auto_stage)
            .field("auto_commit", &self.auto_commit)
            .field("backup", &self.backup)
            .field("history_limit", &self.history_limit)
            .field("duplicate_policy", &self.duplicate_policy)
            .field("persist_history", &self.persist_history)
            .finish_non_exhaustive()
    }
}

impl Default for Settings {
    fn default() -> Self {
        ProcoderConfig::default().resolve_with(|_| None)
    }
}

/// Expand `${VAR}` references from the process environment.
///
/// Unset variables expand to the empty string; an unclosed `${` is kept verbatim.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    expand_with(value, &|name| env::var(name).ok())
}

fn expand_with(value: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find("${") {
        let after = &rest[pos + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..pos]);
        let name = &after[..end];
        if !name.is_empty() {
            out.push_str(&lookup(name).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Boolean env value: `true/1/t/y/yes` (any case) is true, anything else false.
#[must_use]
pub fn parse_env_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "t" | "y" | "yes"
    )
}

impl ProcoderConfig {
    /// Load the config file. A missing file (or home directory) is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!(path = %path.display(), "Failed to read config: {source}");
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        toml::from_str(&content).map(Some).map_err(|source| {
            tracing::warn!(path = %path.display(), "Failed to parse config: {source}");
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Resolve against the process environment.
    #[must_use]
    pub fn resolve(&self) -> Settings {
        self.resolve_with(|name| env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup: env overrides file, file
    /// overrides defaults.
    #[must_use]
    pub fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Settings {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let expand = |raw: &String| {
            let value = expand_with(raw, &lookup);
            (!value.trim().is_empty()).then_some(value)
        };

        let app = self.app.as_ref();
        let api = self.api.as_ref();
        let edits_default = EditsConfig::default();
        let edits = self.edits.as_ref().unwrap_or(&edits_default);

        let model = lookup("AI_MODEL_NAME")
            .or_else(|| app.and_then(|a| a.model.as_ref()).and_then(expand))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let approval_mode = app
            .and_then(|a| a.approval_mode.as_deref())
            .and_then(|raw| {
                let parsed = ApprovalMode::parse(raw);
                if parsed.is_none() {
                    tracing::warn!(value = raw, "Unknown approval_mode in config; using default");
                }
                parsed
            })
            .unwrap_or_default();

        let duplicate_policy = edits
            .duplicate_policy
            .as_deref()
            .and_then(|raw| {
                let parsed = DuplicatePolicy::parse(raw);
                if parsed.is_none() {
                    tracing::warn!(value = raw, "Unknown duplicate_policy in config; using default");
                }
                parsed
            })
            .unwrap_or_default();

        let git = self.git.as_ref();
        let env_bool = |name: &str, file: bool| lookup(name).map_or(file, |v| parse_env_bool(&v));

        Settings {
            model,
            api_key: lookup("OPENROUTER_API_KEY")
                .or_else(|| api.and_then(|a| a.openrouter_key.as_ref()).and_then(expand)),
            site_url: lookup("YOUR_SITE_URL")
                .or_else(|| api.and_then(|a| a.site_url.as_ref()).and_then(expand)),
            site_name: lookup("YOUR_SITE_NAME")
                .or_else(|| api.and_then(|a| a.site_name.as_ref()).and_then(expand)),
            approval_mode,
            max_history_messages: app
                .and_then(|a| a.max_history_messages)
                .unwrap_or(DEFAULT_MAX_HISTORY_MESSAGES),
            approx_token_limit: app
                .and_then(|a| a.approx_token_limit)
                .unwrap_or(DEFAULT_TOKEN_LIMIT),
            auto_stage: env_bool("GIT_AUTO_STAGE", git.is_some_and(|g| g.auto_stage)),
            auto_commit: env_bool("GIT_AUTO_COMMIT", git.is_some_and(|g| g.auto_commit)),
            backup: edits.backup,
            history_limit: edits
                .history_limit
                .unwrap_or(DEFAULT_HISTORY_LIMIT)
                .max(1),
            duplicate_policy,
            persist_history: edits.persist_history,
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

#[must_use]
pub fn procoder_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".procoder"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    procoder_dir().map(|dir| dir.join("config.toml"))
}
