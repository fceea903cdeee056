//! Configuration: defaults, an optional TOML config file, and environment
//! variables for service credentials.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable holding the DeepL API key.
pub const DEEPL_KEY_ENV: &str = "AKIYA_DEEPL_API_KEY";
/// Environment variable holding the rendering-proxy API key.
pub const RENDER_KEY_ENV: &str = "AKIYA_RENDER_API_KEY";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename, relative to the data directory.
    pub database_filename: String,
    /// Directory for log files.
    pub logs_dir: PathBuf,
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Short timeout for cleanup liveness checks, in seconds.
    pub sweep_timeout: u64,
    /// Initial retry backoff in seconds.
    pub initial_backoff_secs: u64,
    /// Retry attempts per request.
    pub max_attempts: u32,
    /// Concurrent scopes during a crawl.
    pub crawl_workers: usize,
    /// Concurrent records during a backfill or cleanup.
    pub backfill_workers: usize,
    /// Rendering proxy endpoint for sites that build pages client-side.
    pub render_api_url: String,
    /// DeepL API key, from the environment.
    pub deepl_api_key: Option<String>,
    /// Rendering proxy API key, from the environment.
    pub render_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: home dir -> current dir.
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".akiyacrawl");

        Self {
            logs_dir: data_dir.join("logs"),
            data_dir,
            database_filename: "akiyacrawl.db".to_string(),
            user_agent: "akiyacrawl/0.3 (listing research)".to_string(),
            request_timeout: 60,
            sweep_timeout: 5,
            initial_backoff_secs: 30,
            max_attempts: 5,
            crawl_workers: 4,
            backfill_workers: 6,
            render_api_url: "https://api.zyte.com/v1/extract".to_string(),
            deepl_api_key: None,
            render_api_key: None,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            logs_dir: data_dir.join("logs"),
            data_dir,
            ..Default::default()
        }
    }

    /// Full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Root under which image files are stored.
    pub fn images_root(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.logs_dir)?;
        Ok(())
    }

    /// Pull credentials out of the environment. A `.env` file in the
    /// working directory is honored when present.
    pub fn load_env_credentials(&mut self) {
        let _ = dotenvy::dotenv();
        self.deepl_api_key = std::env::var(DEEPL_KEY_ENV).ok().filter(|k| !k.is_empty());
        self.render_api_key = std::env::var(RENDER_KEY_ENV).ok().filter(|k| !k.is_empty());
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target directory for data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// User agent string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Cleanup liveness-check timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_timeout: Option<u64>,
    /// Initial retry backoff in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_backoff_secs: Option<u64>,
    /// Retry attempts per request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Concurrent scopes during a crawl.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_workers: Option<usize>,
    /// Concurrent records during a backfill or cleanup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backfill_workers: Option<usize>,
    /// Rendering proxy endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_api_url: Option<String>,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// The config file's parent directory, when loaded from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(Path::to_path_buf))
    }

    /// Apply configuration to settings. `base_dir` resolves relative paths,
    /// typically the config file's directory.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref target) = self.target {
            let path = Path::new(target);
            settings.data_dir = if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            };
            settings.logs_dir = settings.data_dir.join("logs");
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(timeout) = self.sweep_timeout {
            settings.sweep_timeout = timeout.max(1);
        }
        if let Some(backoff) = self.initial_backoff_secs {
            settings.initial_backoff_secs = backoff;
        }
        if let Some(attempts) = self.max_attempts {
            settings.max_attempts = attempts.max(1);
        }
        if let Some(workers) = self.crawl_workers {
            settings.crawl_workers = workers.max(1);
        }
        if let Some(workers) = self.backfill_workers {
            settings.backfill_workers = workers.max(1);
        }
        if let Some(ref url) = self.render_api_url {
            settings.render_api_url = url.clone();
        }
    }
}

/// Load settings from an optional config path plus a data-dir override.
pub fn load_settings(config_path: Option<&Path>, data_dir: Option<PathBuf>) -> Settings {
    let config = match config_path {
        Some(path) => match Config::load_from_path(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("could not read config {}: {e}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    config.apply_to_settings(&mut settings, &base_dir);

    if let Some(data_dir) = data_dir {
        settings.data_dir = data_dir;
        settings.logs_dir = settings.data_dir.join("logs");
    }

    settings.load_env_credentials();
    settings
}
