use std::path::Path;
use std::time::Duration;

use p86l_core::AssetFilter;
use p86l_core::pipeline::{
    DEFAULT_REPO_NAME, DEFAULT_REPO_OWNER, PipelineConfig, default_executable_name,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_hours: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default = "default_repo_owner")]
    pub repo_owner: String,

    #[serde(default = "default_repo_name")]
    pub repo_name: String,

    #[serde(default = "default_executable")]
    pub executable_name: String,

    #[serde(default = "default_asset_name_token")]
    pub asset_name_token: String,

    #[serde(default = "default_asset_extension")]
    pub asset_extension: String,

    #[serde(default = "default_asset_excluded_marker")]
    pub asset_excluded_marker: String,
}

fn default_cache_ttl() -> u64 {
    1
}

fn default_http_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_probe_interval() -> u64 {
    2
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_repo_owner() -> String {
    DEFAULT_REPO_OWNER.to_string()
}

fn default_repo_name() -> String {
    DEFAULT_REPO_NAME.to_string()
}

fn default_executable() -> String {
    default_executable_name().to_string()
}

fn default_asset_name_token() -> String {
    AssetFilter::default().name_token
}

fn default_asset_extension() -> String {
    AssetFilter::default().extension
}

fn default_asset_excluded_marker() -> String {
    AssetFilter::default().excluded_marker
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            cache_ttl_hours: default_cache_ttl(),
            http_timeout_secs: default_http_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            probe_interval_secs: default_probe_interval(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
            repo_owner: default_repo_owner(),
            repo_name: default_repo_name(),
            executable_name: default_executable(),
            asset_name_token: default_asset_name_token(),
            asset_extension: default_asset_extension(),
            asset_excluded_marker: default_asset_excluded_marker(),
        }
    }
}

impl AppSettings {
    /// Read settings, falling back to defaults when the file is missing or
    /// unreadable.
    pub fn load(settings_path: &Path) -> Self {
        if !settings_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(settings_path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                log::warn!(
                    "Ignoring invalid settings file {}: {error}",
                    settings_path.display()
                );
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, settings_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = settings_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(settings_path, content)?;
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            owner: self.repo_owner.clone(),
            repo: self.repo_name.clone(),
            executable_name: self.executable_name.clone(),
            asset_filter: AssetFilter {
                name_token: self.asset_name_token.clone(),
                extension: self.asset_extension.clone(),
                excluded_marker: self.asset_excluded_marker.clone(),
            },
            cache_ttl: Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600)),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            probe_interval: Duration::from_secs(self.probe_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::AppSettings;

    #[test]
    fn app_settings_defaults_match_expected_values() {
        let settings = AppSettings::default();

        assert_eq!(settings.cache_ttl_hours, 1);
        assert_eq!(settings.http_timeout_secs, 30);
        assert_eq!(settings.probe_timeout_secs, 5);
        assert_eq!(settings.probe_interval_secs, 2);
        assert!(!settings.debug_logging);
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);
        assert_eq!(settings.repo_owner, "Taliayaya");
        assert_eq!(settings.repo_name, "Project-86");
        assert_eq!(settings.asset_name_token, "Project86-v");
        assert_eq!(settings.asset_extension, ".zip");
        assert_eq!(settings.asset_excluded_marker, "dev");
    }

    #[test]
    fn partial_settings_keep_defaults_for_missing_fields() {
        let value = json!({ "cache_ttl_hours": 6, "debug_logging": true });

        let settings: AppSettings =
            serde_json::from_value(value).expect("settings JSON should deserialize");

        assert_eq!(settings.cache_ttl_hours, 6);
        assert!(settings.debug_logging);
        assert_eq!(settings.http_timeout_secs, 30);
        assert_eq!(settings.repo_name, "Project-86");
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{ definitely not json").expect("settings file should be written");

        assert_eq!(AppSettings::load(&path), AppSettings::default());
        assert_eq!(
            AppSettings::load(&temp.path().join("missing.json")),
            AppSettings::default()
        );
    }

    #[test]
    fn save_then_load_preserves_changes() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("config").join("settings.json");
        let settings = AppSettings {
            probe_interval_secs: 10,
            repo_owner: "someone-else".to_string(),
            ..AppSettings::default()
        };

        settings.save(&path).expect("settings should be saved");
        assert_eq!(AppSettings::load(&path), settings);
    }

    #[test]
    fn pipeline_config_converts_units() {
        let settings = AppSettings {
            cache_ttl_hours: 2,
            probe_timeout_secs: 3,
            asset_excluded_marker: "beta".to_string(),
            ..AppSettings::default()
        };

        let config = settings.pipeline_config();
        assert_eq!(config.cache_ttl, Duration::from_secs(7200));
        assert_eq!(config.probe_timeout, Duration::from_secs(3));
        assert_eq!(config.probe_interval, Duration::from_secs(2));
        assert_eq!(config.asset_filter.excluded_marker, "beta");
        assert_eq!(config.owner, "Taliayaya");
    }
}
