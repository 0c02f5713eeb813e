//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (`<config dir>/allm/config.toml`)
//! 3. Project config (`./allm.toml`)
//! 4. Environment variables (`ALLM_` prefix, `__` between sections)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use tracing::{debug, info};

use super::types::Config;
use crate::types::{AllmError, Result};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        Self::extract(figment.merge(Self::env()))
    }

    /// Load configuration from a specific file (env vars still apply)
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(AllmError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Self::env());
        Self::extract(figment)
    }

    /// e.g. `ALLM_MODEL__TEMPERATURE` → `model.temperature`
    fn env() -> Env {
        Env::prefixed("ALLM_").split("__").lowercase(true)
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config: Config = figment
            .extract()
            .map_err(|e| AllmError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Global config directory (e.g. ~/.config/allm/)
    pub fn global_dir() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.config_dir().join("allm"))
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn project_config_path() -> PathBuf {
        PathBuf::from("allm.toml")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Render the effective configuration
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(config)?)
        } else {
            toml::to_string_pretty(config).map_err(|e| AllmError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write a starter config file, globally or in the current directory
    pub fn init(global: bool, force: bool) -> Result<PathBuf> {
        let path = if global {
            let dir = Self::global_dir().ok_or_else(|| {
                AllmError::Config("Cannot determine global config directory".to_string())
            })?;
            fs::create_dir_all(&dir)?;
            dir.join("config.toml")
        } else {
            Self::project_config_path()
        };

        Self::write_default(&path, force)?;
        Ok(path)
    }

    fn write_default(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            info!("Config exists: {}", path.display());
            return Ok(());
        }

        fs::write(path, Self::default_config())?;
        info!("Created config: {}", path.display());
        Ok(())
    }

    /// Default config content (TOML)
    fn default_config() -> String {
        r#"# allm Configuration
# Project settings in ./allm.toml override the global file.
# Environment variables override both, e.g. ALLM_MODEL__TEMPERATURE=0.2

version = "1.0"

[model]
# azure_openai | openai | azure_llama2 | azure_mistral | vertex_palm | vertex_gemini | vertex_gemma
kind = "openai"
request_timeout_secs = 60
max_concurrency = 1000
blocked_as_error = false
# Credentials: api_key, credentials_file, or the backend's env var
# (OPENAI_API_KEY, AZURE_OPENAI_API_KEY, AZURE_ML_API_KEY, VERTEX_ACCESS_TOKEN)

[long_text]
enabled = false
task = "summary"
aggregation = "simple_concatenation"
overlap_size = 50
text_key = "text"

[retry]
max_attempts = 8
min_delay_secs = 4
max_delay_secs = 10
factor = 2.0
jitter = true
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::long_text::AggregationStrategy;
    use crate::config::ModelKind;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.version, "1.0");
    }

    #[test]
    fn test_default_config_template_parses() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("allm.toml");
        ConfigLoader::write_default(&path, false).unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.model.kind, ModelKind::Openai);
        assert_eq!(config.retry.max_attempts, 8);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("allm.toml");
        fs::write(
            &path,
            r#"
[model]
kind = "vertex_gemini"
project = "my-project"
max_output_tokens = 1024

[long_text]
enabled = true
aggregation = "reduce_by_llm_prompting"
"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.model.kind, ModelKind::VertexGemini);
        assert_eq!(config.model.project.as_deref(), Some("my-project"));
        assert_eq!(config.model.budget().unwrap().max_output_tokens(), 1024);
        assert!(config.long_text.enabled);
        assert_eq!(
            config.long_text.aggregation,
            AggregationStrategy::ReduceByLlmPrompting
        );
        assert_eq!(config.long_text.overlap_size, 50);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("allm.toml");
        fs::write(&path, "[model]\nkind = \"claude\"\n").unwrap();
        assert!(ConfigLoader::load_from_file(&path).is_err());

        fs::write(&path, "[model]\nmax_output_tokens = 5000\n").unwrap();
        assert!(ConfigLoader::load_from_file(&path).is_err());
    }

    #[test]
    fn test_write_default_respects_force() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("allm.toml");
        fs::write(&path, "version = \"custom\"\n").unwrap();

        ConfigLoader::write_default(&path, false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "version = \"custom\"\n");

        ConfigLoader::write_default(&path, true).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("[long_text]"));
    }

    #[test]
    fn test_render_formats() {
        let config = Config::default();
        let toml = ConfigLoader::render(&config, false).unwrap();
        assert!(toml.contains("[model]"));
        let json = ConfigLoader::render(&config, true).unwrap();
        assert!(json.contains("\"long_text\""));
    }
}
