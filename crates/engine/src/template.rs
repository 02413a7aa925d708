//! Template resolution: language fallback plus `{{name}}` substitution.
//!
//! Lookup order for a requested language:
//! 1. the exact code (`en-us`)
//! 2. its base subtag (`en`)
//! 3. the configured default language
//!
//! Codes are compared lowercase. Rendering is pure: unknown placeholders stay
//! as written, and the same input always yields the same output.

use std::sync::Arc;

use courier_common::error::AppError;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::store::{StoreError, TemplateStore};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template '{code}' has no content for language '{language}'")]
    NotFound { code: String, language: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TemplateError> for AppError {
    fn from(err: TemplateError) -> Self {
        match err {
            err @ TemplateError::NotFound { .. } => AppError::NotFound(err.to_string()),
            TemplateError::Store(e) => e.into(),
        }
    }
}

pub struct TemplateResolver {
    store: Arc<dyn TemplateStore>,
    default_language: String,
}

impl TemplateResolver {
    pub fn new(store: Arc<dyn TemplateStore>, default_language: impl Into<String>) -> Self {
        Self {
            store,
            default_language: default_language.into(),
        }
    }

    /// Find the content for `code` in the best available language and fill it with `params`.
    pub async fn resolve(
        &self,
        code: &str,
        language: &str,
        params: &Value,
    ) -> Result<String, TemplateError> {
        let code = code.trim();
        for candidate in language_candidates(language, &self.default_language) {
            if let Some(content) = self.store.find_content(code, &candidate).await? {
                if candidate != normalize_language(language) {
                    tracing::debug!(
                        template_code = code,
                        requested = language,
                        resolved = %candidate,
                        "Template language fallback"
                    );
                }
                let empty = Map::new();
                let params = params.as_object().unwrap_or(&empty);
                return Ok(render(&content, params));
            }
        }
        Err(TemplateError::NotFound {
            code: code.to_string(),
            language: language.trim().to_string(),
        })
    }
}

pub fn normalize_language(language: &str) -> String {
    language.trim().replace('_', "-").to_ascii_lowercase()
}

/// Languages to try, most specific first, without duplicates.
pub fn language_candidates(language: &str, default_language: &str) -> Vec<String> {
    let exact = normalize_language(language);
    let mut candidates = Vec::with_capacity(3);
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    push(exact.clone());
    if let Some((base, _)) = exact.split_once('-') {
        push(base.to_string());
    }
    push(normalize_language(default_language));
    candidates
}

/// Replace each `{{name}}` whose trimmed name is a key of `params`.
pub fn render(content: &str, params: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            // Unterminated: keep the remainder literally.
            out.push_str(&rest[start..]);
            return out;
        };
        let name = after_open[..end].trim();
        match params.get(name) {
            Some(value) => out.push_str(&stringify(value)),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Locale-independent text for a parameter value.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
