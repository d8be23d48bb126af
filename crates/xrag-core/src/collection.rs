//! Collection naming: one collection per (language, source, model, chunking).
//!
//! Names look like `{prefix}__{lang}__{source}__{model}__{chunking}`.

use std::fmt;

const SEP: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionName {
    pub prefix: String,
    pub language: String,
    pub source: String,
    pub model: String,
    pub chunking: String,
}

impl CollectionName {
    /// Normalizes the parts: lower-cased language and source, spaces in the
    /// source and `/` in the model name become `_`.
    pub fn new(prefix: &str, language: &str, source: &str, model: &str, chunking: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            language: language.to_lowercase(),
            source: source.to_lowercase().replace(' ', "_"),
            model: model.replace('/', "_"),
            chunking: chunking.to_string(),
        }
    }

    /// Split a stored name back into its parts. `None` if it has fewer than five.
    ///
    /// The prefix may itself contain `_` but not `__`.
    pub fn parse(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.splitn(5, SEP).collect();
        match parts.as_slice() {
            [prefix, language, source, model, chunking] => Some(Self {
                prefix: (*prefix).to_string(),
                language: (*language).to_string(),
                source: (*source).to_string(),
                model: (*model).to_string(),
                chunking: (*chunking).to_string(),
            }),
            _ => None,
        }
    }

    /// Prefix shared by every collection of `language`.
    pub fn language_prefix(prefix: &str, language: &str) -> String {
        format!("{prefix}{SEP}{}", language.to_lowercase())
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEP}{}{SEP}{}{SEP}{}{SEP}{}",
            self.prefix, self.language, self.source, self.model, self.chunking
        )
    }
}

/// Names starting with `prefix`, compared case-insensitively.
pub fn collections_with_prefix<'a>(names: &'a [String], prefix: &str) -> Vec<&'a str> {
    let prefix = prefix.to_lowercase();
    names
        .iter()
        .filter(|n| n.to_lowercase().starts_with(&prefix))
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_normalized() {
        let n = CollectionName::new("xragg_collection", "EN", "CC News", "BAAI/bge-m3", "paragraph");
        assert_eq!(n.to_string(), "xragg_collection__en__cc_news__BAAI_bge-m3__paragraph");
    }

    #[test]
    fn parse_inverts_display() {
        let n = CollectionName::new("xragg_collection", "de", "wiki", "embed-multilingual-v3.0", "context_aware_chunking");
        assert_eq!(CollectionName::parse(&n.to_string()), Some(n));
        assert_eq!(CollectionName::parse("plain"), None);
    }

    #[test]
    fn prefix_listing_ignores_case() {
        let names = vec![
            "xragg_collection__en__wiki__m__c".to_string(),
            "XRAGG_COLLECTION__EN__news__m__c".to_string(),
            "xragg_collection__de__wiki__m__c".to_string(),
        ];
        let en = collections_with_prefix(&names, &CollectionName::language_prefix("xragg_collection", "en"));
        assert_eq!(en.len(), 2);
    }
}
