//! Configuration file management for coursegen.
//!
//! Provides a TOML-based config file at `~/.config/coursegen/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use coursegen_core::access::TokenConfig;
use coursegen_core::access::token::TOKEN_SECRET_ENV;
use coursegen_core::chain::PipelineKind;
use coursegen_core::llm::LlmConfig;
use coursegen_core::service::GeneratorSettings;
use coursegen_db::config::DbConfig;

/// Overrides `[pipeline] kind`.
pub const PIPELINE_ENV: &str = "COURSEGEN_PIPELINE";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub auth: AuthSection,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    DbConfig::DEFAULT_MAX_CONNECTIONS
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded token secret (64 hex chars = 32 bytes).
    pub token_secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub kind: PipelineKind,
    /// Wall-clock limit for one generation.
    pub timeout_secs: u64,
    /// Keep the joined stage outputs on the plan record.
    pub retain_transcript: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            kind: PipelineKind::default(),
            timeout_secs: GeneratorSettings::DEFAULT_TIMEOUT.as_secs(),
            retain_transcript: true,
        }
    }
}

impl PipelineSection {
    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            retain_transcript: self.retain_transcript,
            ..GeneratorSettings::with_timeout(Duration::from_secs(self.timeout_secs))
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the coursegen config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/coursegen` or
/// `~/.config/coursegen`, including on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("coursegen");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("coursegen")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
/// The file is readable by its owner only (0600 on Unix).
pub fn save_config(config: &ConfigFile) -> Result<PathBuf> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(path)
}

/// Generate a random token secret: 32 random bytes, hex-encoded (64 chars).
pub fn generate_token_secret() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct CoursegenConfig {
    pub db_config: DbConfig,
    pub token_config: TokenConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineSection,
}

impl CoursegenConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `COURSEGEN_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Pool size: `database.max_connections` > 10
    /// - Token secret: `COURSEGEN_TOKEN_SECRET` > `auth.token_secret` > error
    /// - Pipeline: `COURSEGEN_PIPELINE` > `pipeline.kind` > `staged`
    /// - LLM API key: `OPENAI_API_KEY` > `llm.api_key`, checked when a client is built
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DbConfig::ENV_VAR) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let max_connections = file_config
            .as_ref()
            .map_or(DbConfig::DEFAULT_MAX_CONNECTIONS, |cfg| cfg.database.max_connections);
        let db_config = DbConfig::new(db_url).with_max_connections(max_connections);

        let token_config = if let Ok(secret_hex) = std::env::var(TOKEN_SECRET_ENV) {
            TokenConfig::from_hex(&secret_hex)
                .with_context(|| format!("{TOKEN_SECRET_ENV} env var is not a valid secret"))?
        } else if let Some(ref cfg) = file_config {
            TokenConfig::from_hex(&cfg.auth.token_secret)
                .context("invalid token_secret in config file")?
        } else {
            bail!(
                "token secret not found; set {TOKEN_SECRET_ENV} or run `coursegen init` to create a config file"
            );
        };

        let (llm, mut pipeline) = match file_config {
            Some(cfg) => (cfg.llm, cfg.pipeline),
            None => (LlmConfig::default(), PipelineSection::default()),
        };
        if let Ok(kind) = std::env::var(PIPELINE_ENV) {
            pipeline.kind = kind
                .parse()
                .with_context(|| format!("{PIPELINE_ENV} env var is invalid"))?;
        }

        Ok(Self {
            db_config,
            token_config,
            llm,
            pipeline,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
