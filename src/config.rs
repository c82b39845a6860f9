use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{IntegrationError, Result};
use crate::models::Options;
use crate::provider::{DEFAULT_SYSTEM_PROMPT, ProviderKind, ProviderSettings};

/// Deployment configuration. Per-call values (API key, disclaimer settings)
/// arrive from the host as [`Options`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Falls back to the provider's default model when unset.
    pub model: Option<String>,
    pub location: String,
    /// Override for the API root, e.g. a proxy or a local mock.
    pub base_url: Option<String>,
    pub temperature: f32,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub max_concurrency: usize,
    pub answer_on_lookup: bool,
    /// Value the entity is relabelled to in lookup results.
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Gemini,
            model: None,
            location: "us-central1".to_string(),
            base_url: None,
            temperature: 0.2,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 120,
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            answer_on_lookup: false,
            display_name: "GoogleAI".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            http: HttpConfig::default(),
            lookup: LookupConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    /// ALWAYS returns a valid config - never fails
    pub fn load() -> Self {
        if dotenvy::dotenv().is_ok() {
            tracing::info!("Loaded .env from current directory");
        }

        let config_path =
            env::var("GOOGLE_AI_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from(&config_path, |key| env::var(key).ok())
    }

    /// [`Config::load`] with an explicit file and variable lookup.
    pub fn load_from(path: impl AsRef<Path>, var: impl Fn(&str) -> Option<String>) -> Self {
        let path = path.as_ref();
        let mut config = if path.exists() {
            match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::error!("{} - using defaults", e);
                    Self::default()
                }
            }
        } else {
            tracing::warn!("Config file not found at {} - using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(var);

        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            IntegrationError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        serde_yaml::from_str(&contents).map_err(|e| {
            IntegrationError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Apply environment variable overrides
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(kind) = var("GOOGLE_AI_PROVIDER") {
            match kind.parse() {
                Ok(kind) => self.provider.kind = kind,
                Err(e) => tracing::warn!("Ignoring GOOGLE_AI_PROVIDER: {}", e),
            }
        }
        if let Some(model) = var("GOOGLE_AI_MODEL") {
            self.provider.model = Some(model);
        }
        if let Some(location) = var("GOOGLE_AI_LOCATION") {
            self.provider.location = location;
        }
        if let Some(base_url) = var("GOOGLE_AI_BASE_URL") {
            self.provider.base_url = Some(base_url);
        }
        if let Some(temperature) = var("GOOGLE_AI_TEMPERATURE") {
            if let Ok(t) = temperature.parse() {
                self.provider.temperature = t;
            }
        }
        if let Some(timeout) = var("GOOGLE_AI_HTTP_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.http.timeout_seconds = secs;
            }
        }
        if let Some(concurrency) = var("GOOGLE_AI_LOOKUP_CONCURRENCY") {
            if let Ok(n) = concurrency.parse() {
                self.lookup.max_concurrency = n;
            }
        }
        if let Some(flag) = var("GOOGLE_AI_ANSWER_ON_LOOKUP") {
            if let Ok(b) = flag.parse() {
                self.lookup.answer_on_lookup = b;
            }
        }
        if let Some(level) = var("GOOGLE_AI_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(IntegrationError::Config(
                "provider.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if self.http.timeout_seconds == 0 {
            return Err(IntegrationError::Config(
                "http.timeout_seconds cannot be 0".to_string(),
            ));
        }
        if self.lookup.max_concurrency == 0 {
            return Err(IntegrationError::Config(
                "lookup.max_concurrency cannot be 0".to_string(),
            ));
        }
        if self.provider.location.trim().is_empty() {
            return Err(IntegrationError::Config(
                "provider.location cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    /// Lookup fan-out width, never zero.
    pub fn lookup_concurrency(&self) -> usize {
        self.lookup.max_concurrency.max(1)
    }

    /// Merge deployment settings with the host options for one call.
    pub fn provider_settings(&self, options: &Options) -> ProviderSettings {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        };

        ProviderSettings {
            model: non_empty(&options.model)
                .or_else(|| self.provider.model.clone())
                .unwrap_or_else(|| self.provider.kind.default_model().to_string()),
            api_key: non_empty(&options.api_key),
            project: non_empty(&options.project),
            location: non_empty(&options.location)
                .unwrap_or_else(|| self.provider.location.clone()),
            base_url: self.provider.base_url.clone(),
            system_prompt: self.provider.system_prompt.clone(),
            temperature: self.provider.temperature,
            gcloud_path: options.gcloud_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.provider.kind, ProviderKind::Gemini);
        assert_eq!(cfg.lookup.display_name, "GoogleAI");
        assert!(!cfg.lookup.answer_on_lookup);
    }

    #[test]
    fn test_from_file_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "provider:\n  kind: vertex\n  model: chat-bison@002\n  location: europe-west4\n  temperature: 0.1\n  system_prompt: Be terse.\nlookup:\n  max_concurrency: 2\n  answer_on_lookup: true\n  display_name: Vertex"
        )
        .unwrap();

        let cfg = Config::from_file(file.path()).unwrap();
        assert_eq!(cfg.provider.kind, ProviderKind::Vertex);
        assert_eq!(cfg.provider.model.as_deref(), Some("chat-bison@002"));
        assert_eq!(cfg.lookup.max_concurrency, 2);
        assert!(cfg.lookup.answer_on_lookup);
        assert_eq!(cfg.http.timeout_seconds, 120);
    }

    #[test]
    fn test_from_file_fills_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "provider:\n  kind: palm\nhttp:\n  timeout_seconds: 30").unwrap();

        let cfg = Config::from_file(file.path()).unwrap();
        assert_eq!(cfg.provider.kind, ProviderKind::Palm);
        assert_eq!(cfg.provider.location, "us-central1");
        assert_eq!(cfg.provider.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(cfg.http_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "provider: [not, a, map").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(IntegrationError::Config(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GOOGLE_AI_PROVIDER", "palm"),
            ("GOOGLE_AI_TEMPERATURE", "0.5"),
            ("GOOGLE_AI_LOOKUP_CONCURRENCY", "not-a-number"),
            ("GOOGLE_AI_ANSWER_ON_LOOKUP", "true"),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.provider.kind, ProviderKind::Palm);
        assert!((cfg.provider.temperature - 0.5).abs() < 1e-6);
        assert_eq!(cfg.lookup.max_concurrency, 4);
        assert!(cfg.lookup.answer_on_lookup);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut cfg = Config::default();
        cfg.lookup.max_concurrency = 0;
        assert!(cfg.validate().is_err());
        assert_eq!(cfg.lookup_concurrency(), 1);
    }

    #[test]
    fn test_provider_settings_merge() {
        let cfg = Config::default();
        let mut options = Options::default();
        let settings = cfg.provider_settings(&options);
        assert_eq!(settings.model, "gemini-pro");
        assert_eq!(settings.location, "us-central1");
        assert!(settings.api_key.is_none());

        options.model = Some("gemini-1.5-pro".to_string());
        options.api_key = Some("k".to_string());
        options.location = Some("  ".to_string());
        let settings = cfg.provider_settings(&options);
        assert_eq!(settings.model, "gemini-1.5-pro");
        assert_eq!(settings.api_key.as_deref(), Some("k"));
        assert_eq!(settings.location, "us-central1");
    }
}
