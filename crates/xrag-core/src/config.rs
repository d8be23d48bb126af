//! Layered configuration and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! and `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_RERANKER__BATCH_SIZE=32`). `Config::settings` yields the typed tree.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Layer defaults, `config.toml`, `config.<env>.toml` and `APP_*` variables,
    /// reading the files from `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The typed settings tree, validated.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub reranker: RerankerSettings,
    pub indexer: IndexerSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.retrieval.validate()?;
        self.reranker.validate()?;
        self.indexer.validate()
    }
}

/// Which embedding provider and model serve a language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbeddingSpec {
    pub provider: String,
    pub model: String,
}

impl Default for EmbeddingSpec {
    fn default() -> Self {
        Self { provider: "local".into(), model: "bge-m3".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub persist_dir: String,
    pub collection_prefix: String,
    pub default_k: usize,
    pub min_per_collection_k: usize,
    pub hybrid_alpha: f32,
    pub source_boost: f32,
    pub default_embedding: EmbeddingSpec,
    pub lang_embedding_map: BTreeMap<String, EmbeddingSpec>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            persist_dir: "./.xrag_db".into(),
            collection_prefix: "xragg_collection".into(),
            default_k: 5,
            min_per_collection_k: 3,
            hybrid_alpha: 0.7,
            source_boost: 0.18,
            default_embedding: EmbeddingSpec::default(),
            lang_embedding_map: BTreeMap::new(),
        }
    }
}

impl RetrievalSettings {
    pub fn embedding_for(&self, language: &str) -> &EmbeddingSpec {
        self.lang_embedding_map.get(language).unwrap_or(&self.default_embedding)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.hybrid_alpha) {
            return Err(Error::InvalidConfig(format!(
                "retrieval.hybrid_alpha must be in [0, 1], got {}",
                self.hybrid_alpha
            )));
        }
        if !self.source_boost.is_finite() || self.source_boost < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "retrieval.source_boost must be >= 0, got {}",
                self.source_boost
            )));
        }
        if self.default_k == 0 {
            return Err(Error::InvalidConfig("retrieval.default_k must be > 0".into()));
        }
        if self.collection_prefix.contains("__") {
            return Err(Error::InvalidConfig("retrieval.collection_prefix must not contain '__'".into()));
        }
        Ok(())
    }
}

/// Scoring backend family for the reranker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Listwise,
    Pairwise,
    Embedding,
}

impl BackendKind {
    /// `self` followed by every less preferred backend, ending with `Embedding`.
    pub fn fallback_chain(self) -> &'static [BackendKind] {
        match self {
            Self::Listwise => &[Self::Listwise, Self::Pairwise, Self::Embedding],
            Self::Pairwise => &[Self::Pairwise, Self::Embedding],
            Self::Embedding => &[Self::Embedding],
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Listwise => "listwise",
            Self::Pairwise => "pairwise",
            Self::Embedding => "embedding",
        })
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "listwise" => Ok(Self::Listwise),
            "pairwise" | "cross" | "cross_encoder" => Ok(Self::Pairwise),
            "embedding" | "mono" => Ok(Self::Embedding),
            other => Err(Error::InvalidConfig(format!("unknown reranker backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub backend: BackendKind,
    /// Directory of the cross-encoder weights (`config.json`, `tokenizer.json`, weights).
    pub cross_encoder_model: String,
    /// Directory of the embedding model used by the embedding fallback.
    pub mono_encoder_model: String,
    pub listwise_model: String,
    pub listwise_url: String,
    /// Name of the environment variable holding the listwise API key.
    pub listwise_api_key_env: String,
    pub listwise_max_docs: usize,
    pub batch_size: usize,
    pub max_length: usize,
    pub top_k: usize,
    pub normalize_scores: bool,
    pub request_timeout_secs: u64,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Embedding,
            cross_encoder_model: "models/bge-reranker-v2-m3".into(),
            mono_encoder_model: "models/bge-m3".into(),
            listwise_model: "jina-reranker-v3".into(),
            listwise_url: "https://api.jina.ai/v1/rerank".into(),
            listwise_api_key_env: "JINA_API_KEY".into(),
            listwise_max_docs: 4,
            batch_size: 64,
            max_length: 512,
            top_k: 10,
            normalize_scores: false,
            request_timeout_secs: 30,
        }
    }
}

impl RerankerSettings {
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.listwise_max_docs == 0 {
            return Err(Error::InvalidConfig(
                "reranker.batch_size and reranker.listwise_max_docs must be > 0".into(),
            ));
        }
        if self.max_length < 8 {
            return Err(Error::InvalidConfig("reranker.max_length must be >= 8".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
    pub embedding_batch_size: usize,
    pub dedup_enabled: bool,
    /// Label of the external chunking strategy, recorded in collection names.
    pub chunking_method: String,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            embedding_batch_size: 64,
            dedup_enabled: true,
            chunking_method: "context_aware_chunking".into(),
        }
    }
}

impl IndexerSettings {
    fn validate(&self) -> Result<()> {
        if self.embedding_batch_size == 0 {
            return Err(Error::InvalidConfig("indexer.embedding_batch_size must be > 0".into()));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
