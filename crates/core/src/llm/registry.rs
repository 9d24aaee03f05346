use crate::config::Settings;
use crate::llm::deterministic::DeterministicAdapter;
use crate::llm::local::LocalAdapter;
use crate::llm::openai::OpenAiAdapter;
use crate::llm::{ProviderAdapter, ProviderKind};
use crate::scoring::ScoringEngine;
use std::sync::Arc;

/// Instantiates the configured adapter chain once, in configuration order.
pub fn build_adapters(settings: &Settings) -> anyhow::Result<Vec<Arc<dyn ProviderAdapter>>> {
    let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::with_capacity(settings.providers.len());
    for kind in &settings.providers {
        let adapter: Arc<dyn ProviderAdapter> = match kind {
            ProviderKind::OpenAi => Arc::new(OpenAiAdapter::from_settings(&settings.openai)?),
            ProviderKind::Local => Arc::new(LocalAdapter::from_settings(&settings.local)?),
            ProviderKind::Deterministic => {
                Arc::new(DeterministicAdapter::new(ScoringEngine::new(settings.weights)))
            }
        };
        tracing::info!(provider = adapter.name(), model = adapter.model(), "registered LLM provider");
        adapters.push(adapter);
    }
    Ok(adapters)
}
