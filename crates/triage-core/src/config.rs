use crate::error::{Result, TriageError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// ValidationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    250
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl ValidationConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

// ---------------------------------------------------------------------------
// UserConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Capability tags the analyst holds; operations needing others are hidden.
    #[serde(default = "default_roles")]
    pub roles: BTreeSet<String>,
}

fn default_roles() -> BTreeSet<String> {
    ["automation_basic".to_string()].into_iter().collect()
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            roles: default_roles(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConsoleConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub user: UserConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            api: ApiConfig::default(),
            validation: ValidationConfig::default(),
            user: UserConfig::default(),
        }
    }
}

impl ConsoleConfig {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(TriageError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: ConsoleConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let base = self.api.base_url.trim();
        if base.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "api.base_url is empty".to_string(),
            });
        } else if !(base.starts_with("http://") || base.starts_with("https://")) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("api.base_url '{base}' must start with http:// or https://"),
            });
        }

        if self.api.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "api.timeout_secs is 0; requests will time out immediately".to_string(),
            });
        }

        if self.api.token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "api.token is set but empty".to_string(),
            });
        }

        if self.validation.debounce_ms > 5000 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "validation.debounce_ms is {} (> 5000); previews will feel unresponsive",
                    self.validation.debounce_ms
                ),
            });
        }

        if self.user.roles.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "user.roles is empty; only unrestricted operations will be offered"
                    .to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: ConsoleConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.api.base_url, "http://localhost:5000");
        assert_eq!(cfg.api.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.validation.debounce(), Duration::from_millis(250));
        assert!(cfg.user.roles.contains("automation_basic"));
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = ConsoleConfig::default();
        cfg.api.token = Some("secret".into());
        cfg.validation.debounce_ms = 400;
        cfg.save(dir.path()).unwrap();

        let loaded = ConsoleConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.api.token.as_deref(), Some("secret"));
        assert_eq!(loaded.validation.debounce_ms, 400);
    }

    #[test]
    fn load_without_file_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ConsoleConfig::load(dir.path()),
            Err(TriageError::NotInitialized)
        ));
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut cfg = ConsoleConfig::default();
        cfg.api.base_url = "  ".into();
        cfg.api.timeout_secs = 0;
        cfg.validation.debounce_ms = 10_000;

        let warnings = cfg.validate();
        let errors: Vec<_> = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("base_url"));
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn validate_rejects_non_http_base_url() {
        let mut cfg = ConsoleConfig::default();
        cfg.api.base_url = "localhost:5000".into();
        assert_eq!(cfg.validate()[0].level, WarnLevel::Error);
    }
}
