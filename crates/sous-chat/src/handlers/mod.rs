//! Capability handler implementations.
//!
//! Cooking capabilities are answered by the completion service; video and
//! product capabilities call remote JSON services. `default_registry` wires
//! every handler the configuration allows.

pub mod cooking;
pub mod remote;

use std::sync::Arc;

use sous_core::CapabilityConfig;

use crate::capability::{Capability, CapabilityRegistry};
use crate::completion::CompletionService;
use crate::error::ChatError;

pub use cooking::CookingCapability;
pub use remote::RemoteCapability;

/// Capabilities answered by the completion service.
pub const COOKING_CAPABILITIES: [Capability; 7] = [
    Capability::Recipe,
    Capability::Ingredients,
    Capability::Tips,
    Capability::Substitute,
    Capability::Necessity,
    Capability::CategoryRecommend,
    Capability::IngredientsToDishes,
];

/// Registry with every cooking capability plus the remote ones whose
/// endpoints are configured.
pub fn default_registry(
    config: &CapabilityConfig,
    completion: Arc<dyn CompletionService>,
) -> Result<CapabilityRegistry, ChatError> {
    let mut registry = CapabilityRegistry::new();
    for capability in COOKING_CAPABILITIES {
        registry.register(Arc::new(CookingCapability::new(
            capability,
            completion.clone(),
            config.max_recipe_steps,
        )));
    }

    if let Some(endpoint) = &config.video_endpoint {
        registry.register(Arc::new(RemoteCapability::new(
            Capability::VideoRecipe,
            endpoint,
            config.timeout_secs,
        )?));
    }
    if let Some(endpoint) = &config.product_search_endpoint {
        registry.register(Arc::new(RemoteCapability::new(
            Capability::ProductSearch,
            endpoint,
            config.timeout_secs,
        )?));
    }

    tracing::info!(
        capabilities = ?registry.capabilities(),
        "Capability registry ready"
    );
    Ok(registry)
}
