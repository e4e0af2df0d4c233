//! Configuration loader, typed engine settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_RAG__CHUNK_SIZE=800`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::ConfidencePolicy;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Load configuration relative to the current working directory.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load `config.toml`, the env-specific overlay and `APP_*` variables
    /// from `base_dir`.
    pub fn load_from(base_dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(base_dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base_dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base_dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base_dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, base_dir: base_dir.to_path_buf() };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The `[rag]` section layered over built-in defaults.
    pub fn rag_settings(&self) -> anyhow::Result<RagSettings> {
        let settings: RagSettings = Figment::from(Serialized::defaults(RagSettings::default()))
            .merge(self.figment.focus("rag"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read 'rag' settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        if matches!(env, "prod" | "production") {
            self.rag_settings()?;
        }
        Ok(())
    }
}

/// Tunables for the retrieval engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub db_dir: String,
    pub index_path: String,
    pub dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub search_top_k: usize,
    pub context_top_k: usize,
    pub max_context_length: usize,
    pub confidence: ConfidencePolicy,
    pub model_dir: Option<String>,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            db_dir: "data/docrag/lancedb".to_string(),
            index_path: "data/docrag/index.bin".to_string(),
            dimension: 384,
            chunk_size: 500,
            chunk_overlap: 100,
            search_top_k: 5,
            context_top_k: 3,
            max_context_length: 2000,
            confidence: ConfidencePolicy::Mean,
            model_dir: None,
        }
    }
}

impl RagSettings {
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::InvalidConfig("dimension must be positive".into()));
        }
        if self.context_top_k == 0 {
            return Err(Error::InvalidConfig("context_top_k must be positive".into()));
        }
        self.chunking().validate()
    }

    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig { chunk_size: self.chunk_size, overlap: self.chunk_overlap }
    }

    pub fn db_dir_in(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.db_dir)
    }

    pub fn index_path_in(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.index_path)
    }

    pub fn model_dir_in(&self, base: &Path) -> Option<PathBuf> {
        self.model_dir.as_ref().map(|dir| resolve_with_base(base, dir))
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
