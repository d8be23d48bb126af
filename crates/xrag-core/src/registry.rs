//! Language -> embedder routing.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{EmbeddingSpec, RetrievalSettings};
use crate::error::{Error, Result};
use crate::traits::Embedder;

/// Which embedder serves each language, with an optional default for
/// languages that have no entry of their own.
#[derive(Clone, Default)]
pub struct EmbedderRegistry {
    by_language: HashMap<String, Arc<dyn Embedder>>,
    default: Option<Arc<dyn Embedder>>,
}

impl EmbedderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.default = Some(embedder);
        self
    }

    pub fn insert(&mut self, language: &str, embedder: Arc<dyn Embedder>) {
        self.by_language.insert(language.to_lowercase(), embedder);
    }

    /// Build from `settings`, calling `factory` once per distinct spec.
    pub fn from_settings<F>(settings: &RetrievalSettings, mut factory: F) -> Result<Self>
    where
        F: FnMut(&EmbeddingSpec) -> anyhow::Result<Arc<dyn Embedder>>,
    {
        let mut built: HashMap<EmbeddingSpec, Arc<dyn Embedder>> = HashMap::new();
        let mut resolve = |spec: &EmbeddingSpec| -> Result<Arc<dyn Embedder>> {
            if let Some(e) = built.get(spec) {
                return Ok(Arc::clone(e));
            }
            let embedder = factory(spec).map_err(|e| Error::embedding(&e))?;
            built.insert(spec.clone(), Arc::clone(&embedder));
            Ok(embedder)
        };

        let mut registry = Self::new().with_default(resolve(&settings.default_embedding)?);
        for (language, spec) in &settings.lang_embedding_map {
            let embedder = resolve(spec)?;
            registry.insert(language, embedder);
        }
        Ok(registry)
    }

    pub fn for_language(&self, language: &str) -> Result<Arc<dyn Embedder>> {
        self.by_language
            .get(&language.to_lowercase())
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| Error::Embedding(format!("no embedder configured for language '{language}'")))
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.by_language.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Embedder for Named {
        fn model_id(&self) -> &str { self.0 }
        fn dim(&self) -> usize { 1 }
        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    #[test]
    fn falls_back_to_default() {
        let mut reg = EmbedderRegistry::new().with_default(Arc::new(Named("multi")));
        reg.insert("DE", Arc::new(Named("german")));
        assert_eq!(reg.for_language("de").map(|e| e.model_id().to_string()).ok(), Some("german".into()));
        assert_eq!(reg.for_language("fr").map(|e| e.model_id().to_string()).ok(), Some("multi".into()));
    }

    #[test]
    fn missing_language_without_default_is_an_embedding_error() {
        let reg = EmbedderRegistry::new();
        assert!(matches!(reg.for_language("en"), Err(Error::Embedding(_))));
    }

    #[test]
    fn settings_share_embedders_per_spec() {
        let mut settings = RetrievalSettings::default();
        settings.lang_embedding_map.insert("en".into(), EmbeddingSpec::default());
        settings
            .lang_embedding_map
            .insert("ja".into(), EmbeddingSpec { provider: "local".into(), model: "ja-model".into() });
        let mut calls = 0;
        let reg = EmbedderRegistry::from_settings(&settings, |spec| {
            calls += 1;
            let name: &'static str = if spec.model == "ja-model" { "ja" } else { "default" };
            Ok(Arc::new(Named(name)) as Arc<dyn Embedder>)
        })
        .expect("registry");
        assert_eq!(calls, 2);
        assert_eq!(reg.for_language("ja").map(|e| e.model_id().to_string()).ok(), Some("ja".into()));
        assert_eq!(reg.languages().count(), 2);
    }

    #[test]
    fn factory_failure_is_an_embedding_error() {
        let settings = RetrievalSettings::default();
        let err = EmbedderRegistry::from_settings(&settings, |_| Err(anyhow::anyhow!("no weights")));
        assert!(matches!(err, Err(Error::Embedding(msg)) if msg.contains("no weights")));
    }
}
