use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults, so the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Genre lookup concurrency for batch classification. 0 = default (5).
    pub concurrency: usize,
    /// Genre provider API settings.
    pub providers: ProviderConfig,
    /// Gateway-artist detection thresholds.
    pub gateway: GatewayConfig,
}

/// Genre provider API configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Last.fm API key. Without one, Last.fm tag lookups are skipped.
    pub lastfm_api_key: Option<String>,
    /// MusicBrainz request budget in requests per second.
    pub musicbrainz_rps: f64,
    /// ListenBrainz Labs request budget in requests per second.
    pub listenbrainz_rps: f64,
    /// Last.fm request budget in requests per second.
    pub lastfm_rps: f64,
    /// Cache TTL in days before re-fetching genres for an artist.
    pub cache_ttl_days: i64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            lastfm_api_key: None,
            musicbrainz_rps: 1.0,
            listenbrainz_rps: 50.0,
            lastfm_rps: 5.0,
            cache_ttl_days: 30,
        }
    }
}

/// Gateway-artist detection thresholds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Minimum listens in the discovery period for an artist to qualify.
    pub min_first_period_listens: u64,
    /// Minimum percentage-point genre growth to count as a gateway.
    pub min_growth_points: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_first_period_listens: 10,
            min_growth_points: 5.0,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/trackrecord/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => {
                        match toml::from_str::<AppConfig>(&contents) {
                            Ok(config) => {
                                log::info!("Loaded config from {}", path.display());
                                config
                            }
                            Err(e) => {
                                log::warn!(
                                    "Failed to parse {}: {}. Using defaults.",
                                    path.display(),
                                    e
                                );
                                Self::default()
                            }
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "Failed to read {}: {}. Using defaults.",
                            path.display(),
                            e
                        );
                        Self::default()
                    }
                }
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve classification concurrency: 0 → default batch width of 5.
    pub fn resolve_concurrency(&self) -> usize {
        if self.concurrency > 0 {
            self.concurrency
        } else {
            5
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("trackrecord.db")
    } else {
        // Fallback: current directory
        PathBuf::from("trackrecord.db")
    }
}
