//! Capability-keyed provider registry.
//!
//! Providers are registered under a name and looked up at runtime from
//! configuration. A missing or disabled provider is a typed error so the
//! pipeline can degrade (or a job can fail at startup) with a clear message.

use std::collections::HashMap;
use std::sync::Arc;

use crate::completion::CompletionProvider;
use crate::embedding::EmbeddingProvider;
use crate::error::ProviderError;

/// Registry of named embedding and completion providers with a default
/// selection per capability.
#[derive(Default)]
pub struct ProviderRegistry {
    embeddings: HashMap<String, Arc<dyn EmbeddingProvider>>,
    completions: HashMap<String, Arc<dyn CompletionProvider>>,
    default_embedding: Option<String>,
    default_completion: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an embedding provider under its own name. The first
    /// registered provider becomes the default.
    pub fn register_embedding(&mut self, provider: Arc<dyn EmbeddingProvider>) {
        let name = provider.provider_name().to_string();
        if self.default_embedding.is_none() {
            self.default_embedding = Some(name.clone());
        }
        self.embeddings.insert(name, provider);
    }

    /// Register a completion provider. The first registered becomes default.
    pub fn register_completion(&mut self, provider: Arc<dyn CompletionProvider>) {
        let name = provider.provider_name().to_string();
        if self.default_completion.is_none() {
            self.default_completion = Some(name.clone());
        }
        self.completions.insert(name, provider);
    }

    /// Override the default embedding provider by name.
    pub fn set_default_embedding(&mut self, name: &str) -> Result<(), ProviderError> {
        if !self.embeddings.contains_key(name) {
            return Err(ProviderError::Missing(name.to_string()));
        }
        self.default_embedding = Some(name.to_string());
        Ok(())
    }

    /// Look up an embedding provider by name, or the default when `None`.
    /// Disabled providers are reported as such rather than returned.
    pub fn embedding(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        let key = match name.or(self.default_embedding.as_deref()) {
            Some(k) => k,
            None => return Err(ProviderError::Missing("<default embedding>".to_string())),
        };

        let provider = self
            .embeddings
            .get(key)
            .ok_or_else(|| ProviderError::Missing(key.to_string()))?;

        if !provider.is_enabled() {
            return Err(ProviderError::Disabled(key.to_string()));
        }

        Ok(Arc::clone(provider))
    }

    /// Look up a completion provider by name, or the default when `None`.
    pub fn completion(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn CompletionProvider>, ProviderError> {
        let key = match name.or(self.default_completion.as_deref()) {
            Some(k) => k,
            None => return Err(ProviderError::Missing("<default completion>".to_string())),
        };

        let provider = self
            .completions
            .get(key)
            .ok_or_else(|| ProviderError::Missing(key.to_string()))?;

        if !provider.is_enabled() {
            return Err(ProviderError::Disabled(key.to_string()));
        }

        Ok(Arc::clone(provider))
    }

    /// Names of all registered embedding providers.
    pub fn embedding_names(&self) -> Vec<&str> {
        self.embeddings.keys().map(String::as_str).collect()
    }
}
