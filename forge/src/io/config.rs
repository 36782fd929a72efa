//! Configuration stored in `forge.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::transition::MAX_RETRIES_LIMIT;
use crate::io::codex::{CodexClient, CodexSettings};
use crate::io::completion::CompletionClient;
use crate::io::gemini::{DEFAULT_BASE_URL, GeminiClient, GeminiSettings};

pub const DEFAULT_CONFIG_PATH: &str = "forge.toml";

/// Checked when the configured key variable is unset.
pub const FALLBACK_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Forge configuration (TOML).
///
/// Every field has a default, so an empty or missing file is valid. Secrets
/// never live here; the API key is read from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForgeConfig {
    /// Design-system document checked by every stage.
    pub policy_path: PathBuf,

    /// Corrections allowed after the first validation.
    pub max_retries: u32,

    pub backend: Backend,
    pub gemini: GeminiConfig,
    pub codex: CodexConfig,
    pub sampling: SamplingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Gemini,
    Codex,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CodexConfig {
    /// Program and fixed arguments, e.g. `["codex", "exec"]`.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Defaults to `<tmp>/forge` when unset.
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Used by generation, correction and refinement.
    pub generation_temperature: f64,
    /// Used by the semantic validator.
    pub validation_temperature: f64,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            policy_path: PathBuf::from("design/design-system.json"),
            max_retries: 2,
            backend: Backend::Gemini,
            gemini: GeminiConfig::default(),
            codex: CodexConfig::default(),
            sampling: SamplingConfig::default(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
            scratch_dir: None,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            generation_temperature: 0.2,
            validation_temperature: 0.0,
        }
    }
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.policy_path.as_os_str().is_empty() {
            return Err(anyhow!("policy_path must not be empty"));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(anyhow!("max_retries must be <= {MAX_RETRIES_LIMIT}"));
        }
        for (name, value) in [
            ("generation_temperature", self.sampling.generation_temperature),
            ("validation_temperature", self.sampling.validation_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(anyhow!("sampling.{name} must be within 0.0..=2.0"));
            }
        }
        if self.gemini.model.trim().is_empty() {
            return Err(anyhow!("gemini.model must not be empty"));
        }
        if self.gemini.api_key_env.trim().is_empty() {
            return Err(anyhow!("gemini.api_key_env must not be empty"));
        }
        if self.gemini.timeout_secs == 0 {
            return Err(anyhow!("gemini.timeout_secs must be > 0"));
        }
        if self.codex.command.is_empty() || self.codex.command[0].trim().is_empty() {
            return Err(anyhow!("codex.command must be a non-empty array"));
        }
        if self.codex.timeout_secs == 0 {
            return Err(anyhow!("codex.timeout_secs must be > 0"));
        }
        if self.codex.output_limit_bytes == 0 {
            return Err(anyhow!("codex.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Build the configured backend, reading secrets from the process environment.
    pub fn build_client(&self) -> Result<Box<dyn CompletionClient>> {
        self.build_client_with(|name| std::env::var(name).ok())
    }

    /// Like [`ForgeConfig::build_client`] with an explicit environment lookup.
    pub fn build_client_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Box<dyn CompletionClient>> {
        debug!(backend = ?self.backend, "building completion client");
        match self.backend {
            Backend::Gemini => {
                let api_key = resolve_api_key(&self.gemini.api_key_env, env)?;
                let client = GeminiClient::new(GeminiSettings {
                    base_url: self.gemini.base_url.clone(),
                    model: self.gemini.model.clone(),
                    api_key,
                    timeout: Duration::from_secs(self.gemini.timeout_secs),
                })?;
                Ok(Box::new(client))
            }
            Backend::Codex => {
                let scratch_dir = self
                    .codex
                    .scratch_dir
                    .clone()
                    .unwrap_or_else(|| std::env::temp_dir().join("forge"));
                let client = CodexClient::new(CodexSettings {
                    command: self.codex.command.clone(),
                    timeout: Duration::from_secs(self.codex.timeout_secs),
                    output_limit_bytes: self.codex.output_limit_bytes,
                    scratch_dir,
                })?;
                Ok(Box::new(client))
            }
        }
    }
}

fn resolve_api_key(primary: &str, env: impl Fn(&str) -> Option<String>) -> Result<String> {
    [primary, FALLBACK_API_KEY_ENV]
        .into_iter()
        .filter_map(|name| env(name))
        .find(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("missing API key: set {primary} or {FALLBACK_API_KEY_ENV}"))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForgeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForgeConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = ForgeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForgeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ForgeConfig::default());
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.sampling.generation_temperature, 0.2);
        assert_eq!(cfg.sampling.validation_temperature, 0.0);
    }

    #[test]
    fn full_file_overrides_every_section() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("forge.toml");
        fs::write(
            &path,
            r#"policy_path = "ds.json"
max_retries = 1
backend = "codex"

[codex]
command = ["codex", "exec", "--full-auto"]
timeout_secs = 30
scratch_dir = "/tmp/forge-scratch"

[sampling]
generation_temperature = 0.7
validation_temperature = 0.1
"#,
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.policy_path, PathBuf::from("ds.json"));
        assert_eq!(cfg.max_retries, 1);
        assert_eq!(cfg.backend, Backend::Codex);
        assert_eq!(cfg.codex.command.len(), 3);
        assert_eq!(cfg.codex.timeout_secs, 30);
        assert_eq!(cfg.codex.output_limit_bytes, 100_000);
        assert_eq!(cfg.codex.scratch_dir, Some(PathBuf::from("/tmp/forge-scratch")));
        assert_eq!(cfg.sampling.generation_temperature, 0.7);
        assert_eq!(cfg.sampling.validation_temperature, 0.1);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("forge.toml");
        fs::write(&path, "max_retries = 4\n[gemini]\nmodel = \"gemini-2.5-pro\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_retries, 4);
        assert_eq!(cfg.gemini.model, "gemini-2.5-pro");
        assert_eq!(cfg.gemini.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(cfg.backend, Backend::Gemini);
    }

    #[test]
    fn retry_budget_above_limit_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("forge.toml");
        fs::write(&path, "max_retries = 9\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_retries"));
    }

    #[test]
    fn empty_codex_command_is_rejected() {
        let cfg = ForgeConfig {
            codex: CodexConfig {
                command: Vec::new(),
                ..CodexConfig::default()
            },
            ..ForgeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn api_key_falls_back_to_secondary_variable() {
        let key = resolve_api_key("GOOGLE_API_KEY", |name| {
            (name == FALLBACK_API_KEY_ENV).then(|| "secret".to_string())
        })
        .expect("key");
        assert_eq!(key, "secret");

        let err = resolve_api_key("GOOGLE_API_KEY", |_| None).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn gemini_backend_requires_a_key() {
        let cfg = ForgeConfig::default();
        assert!(cfg.build_client_with(|_| None).is_err());
        assert!(cfg.build_client_with(|_| Some("k".to_string())).is_ok());
    }
}
