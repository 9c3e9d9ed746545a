//! Capability contract and registry.
//!
//! A capability is one thing the assistant can do in answer to an utterance:
//! fetch a recipe, recommend dishes, search the product catalog and so on.
//! The set is closed; handlers are looked up by variant at invocation time.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sous_core::SourceTag;

use crate::error::ChatError;

// =============================================================================
// Capability
// =============================================================================

/// Every capability the router may select.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Full recipe for one dish.
    Recipe,
    /// Ingredient list for one dish.
    Ingredients,
    /// Cooking tips for one dish.
    Tips,
    /// Substitutes for an ingredient.
    Substitute,
    /// Whether an ingredient can be left out.
    Necessity,
    /// Dish suggestions for a cuisine style.
    CategoryRecommend,
    /// Dish suggestions for a set of ingredients.
    IngredientsToDishes,
    /// Recipe extracted from an external video link.
    VideoRecipe,
    /// Product catalog search by text and/or image.
    ProductSearch,
}

impl Capability {
    pub const ALL: [Capability; 9] = [
        Capability::Recipe,
        Capability::Ingredients,
        Capability::Tips,
        Capability::Substitute,
        Capability::Necessity,
        Capability::CategoryRecommend,
        Capability::IngredientsToDishes,
        Capability::VideoRecipe,
        Capability::ProductSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Recipe => "recipe",
            Capability::Ingredients => "ingredients",
            Capability::Tips => "tips",
            Capability::Substitute => "substitute",
            Capability::Necessity => "necessity",
            Capability::CategoryRecommend => "category_recommend",
            Capability::IngredientsToDishes => "ingredients_to_dishes",
            Capability::VideoRecipe => "video_recipe",
            Capability::ProductSearch => "product_search",
        }
    }

    /// Whether this capability consumes the attached image.
    pub fn accepts_side_channel(&self) -> bool {
        matches!(self, Capability::ProductSearch)
    }

    /// Source tag stamped on recipe objects this capability produces.
    pub fn source_tag(&self) -> SourceTag {
        match self {
            Capability::VideoRecipe => SourceTag::Video,
            Capability::ProductSearch => SourceTag::IngredientSearch,
            _ => SourceTag::Text,
        }
    }

    /// Whether this capability answers with a recipe object.
    pub fn yields_recipe(&self) -> bool {
        matches!(self, Capability::Recipe | Capability::VideoRecipe)
    }

    /// Whether this capability is about one specific dish.
    pub fn targets_dish(&self) -> bool {
        matches!(
            self,
            Capability::Recipe
                | Capability::Ingredients
                | Capability::Tips
                | Capability::Substitute
                | Capability::Necessity
        )
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ChatError;

    /// Accepts the snake_case names plus the upper-case intent labels the
    /// completion service tends to answer with.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        let cap = match key.as_str() {
            "recipe" => Capability::Recipe,
            "ingredients" => Capability::Ingredients,
            "tip" | "tips" => Capability::Tips,
            "substitute" => Capability::Substitute,
            "necessity" => Capability::Necessity,
            "category" | "category_recommend" => Capability::CategoryRecommend,
            "ingredients_to_dishes" => Capability::IngredientsToDishes,
            "video" | "video_recipe" => Capability::VideoRecipe,
            "shopping" | "product_search" => Capability::ProductSearch,
            _ => return Err(ChatError::UnknownCapability(s.trim().to_string())),
        };
        Ok(cap)
    }
}

// =============================================================================
// Request / Output
// =============================================================================

/// One planned capability invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub capability: Capability,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl CapabilityRequest {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            arguments: Map::new(),
        }
    }

    /// Builder-style argument setter.
    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.to_string(), value.into());
        self
    }

    /// Insert an argument only if the key is absent or blank.
    pub fn set_default_arg(&mut self, key: &str, value: impl Into<Value>) {
        let blank = match self.arguments.get(key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Array(a)) => a.is_empty(),
            Some(_) => false,
        };
        if blank {
            self.arguments.insert(key.to_string(), value.into());
        }
    }

    /// A non-empty string argument.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// A string-list argument; a single string is treated as a one-item list.
    pub fn arg_strings(&self, key: &str) -> Vec<String> {
        match self.arguments.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }
}

/// What a capability handed back.
#[derive(Clone, Debug, PartialEq)]
pub enum CapabilityOutput {
    /// Already-parsed JSON.
    Structured(Value),
    /// Raw completion text, possibly with a fenced JSON block.
    Text(String),
}

// =============================================================================
// Handler + Registry
// =============================================================================

/// Async handler behind one capability.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// The capability this handler answers.
    fn capability(&self) -> Capability;

    /// Run the capability. Upstream failures surface as
    /// `UpstreamTimeout` or `UpstreamHttp`.
    async fn invoke(&self, request: &CapabilityRequest) -> Result<CapabilityOutput, ChatError>;
}

/// Variant-to-handler table.
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    handlers: HashMap<Capability, Arc<dyn CapabilityHandler>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own capability, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn CapabilityHandler>) {
        let capability = handler.capability();
        if self.handlers.insert(capability, handler).is_some() {
            tracing::debug!(capability = %capability, "Replaced capability handler");
        }
    }

    pub fn get(&self, capability: Capability) -> Result<Arc<dyn CapabilityHandler>, ChatError> {
        self.handlers
            .get(&capability)
            .cloned()
            .ok_or(ChatError::UnregisteredCapability(capability))
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.handlers.contains_key(&capability)
    }

    /// Registered capabilities in declaration order.
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps: Vec<Capability> = self.handlers.keys().copied().collect();
        caps.sort();
        caps
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoHandler(Capability);

    #[async_trait]
    impl CapabilityHandler for EchoHandler {
        fn capability(&self) -> Capability {
            self.0
        }

        async fn invoke(
            &self,
            request: &CapabilityRequest,
        ) -> Result<CapabilityOutput, ChatError> {
            Ok(CapabilityOutput::Structured(Value::Object(
                request.arguments.clone(),
            )))
        }
    }

    // ---- Capability ----

    #[test]
    fn test_from_str_names_and_aliases() {
        assert_eq!("recipe".parse::<Capability>().unwrap(), Capability::Recipe);
        assert_eq!("TIP".parse::<Capability>().unwrap(), Capability::Tips);
        assert_eq!(
            " CATEGORY ".parse::<Capability>().unwrap(),
            Capability::CategoryRecommend
        );
        assert_eq!(
            "INGREDIENTS_TO_DISHES".parse::<Capability>().unwrap(),
            Capability::IngredientsToDishes
        );
    }

    #[test]
    fn test_from_str_unknown() {
        let err = "weather".parse::<Capability>().unwrap_err();
        assert!(matches!(err, ChatError::UnknownCapability(ref s) if s == "weather"));
    }

    #[test]
    fn test_display_roundtrips_through_from_str() {
        for cap in Capability::ALL {
            assert_eq!(cap.to_string().parse::<Capability>().unwrap(), cap);
        }
    }

    #[test]
    fn test_side_channel_and_source_tag() {
        assert!(Capability::ProductSearch.accepts_side_channel());
        assert!(!Capability::Recipe.accepts_side_channel());
        assert_eq!(Capability::VideoRecipe.source_tag(), SourceTag::Video);
        assert_eq!(
            Capability::ProductSearch.source_tag(),
            SourceTag::IngredientSearch
        );
        assert_eq!(Capability::Tips.source_tag(), SourceTag::Text);
        assert!(Capability::VideoRecipe.yields_recipe());
        assert!(!Capability::Tips.yields_recipe());
    }

    // ---- Request ----

    #[test]
    fn test_request_arguments() {
        let mut req = CapabilityRequest::new(Capability::Recipe)
            .with_arg("dish", "  김치찌개 ")
            .with_arg("ingredients", json!(["두부", "", "김치"]));
        assert_eq!(req.arg_str("dish"), Some("김치찌개"));
        assert_eq!(req.arg_strings("ingredients"), vec!["두부", "김치"]);
        assert_eq!(req.arg_str("missing"), None);

        req.set_default_arg("dish", "불고기");
        assert_eq!(req.arg_str("dish"), Some("김치찌개"));
        req.set_default_arg("style", "한식");
        assert_eq!(req.arg_str("style"), Some("한식"));
    }

    #[test]
    fn test_set_default_arg_replaces_blank() {
        let mut req = CapabilityRequest::new(Capability::Recipe).with_arg("dish", " ");
        req.set_default_arg("dish", "잡채");
        assert_eq!(req.arg_str("dish"), Some("잡채"));
    }

    #[test]
    fn test_request_deserializes_from_plan_json() {
        let req: CapabilityRequest = serde_json::from_value(json!({
            "capability": "product_search",
            "arguments": {"query": "두부"}
        }))
        .unwrap();
        assert_eq!(req.capability, Capability::ProductSearch);
        assert_eq!(req.arg_str("query"), Some("두부"));
    }

    // ---- Registry ----

    #[tokio::test]
    async fn test_registry_lookup_and_invoke() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(EchoHandler(Capability::Tips)));

        let handler = registry.get(Capability::Tips).unwrap();
        let req = CapabilityRequest::new(Capability::Tips).with_arg("dish", "잡채");
        let out = handler.invoke(&req).await.unwrap();
        assert_eq!(out, CapabilityOutput::Structured(json!({"dish": "잡채"})));
    }

    #[test]
    fn test_registry_unregistered() {
        let registry = CapabilityRegistry::new();
        let err = registry.get(Capability::VideoRecipe).err().unwrap();
        assert!(matches!(
            err,
            ChatError::UnregisteredCapability(Capability::VideoRecipe)
        ));
    }

    #[test]
    fn test_registry_capabilities_sorted() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(EchoHandler(Capability::ProductSearch)));
        registry.register(Arc::new(EchoHandler(Capability::Recipe)));
        registry.register(Arc::new(EchoHandler(Capability::Recipe)));
        assert_eq!(
            registry.capabilities(),
            vec![Capability::Recipe, Capability::ProductSearch]
        );
        assert!(registry.contains(Capability::Recipe));
    }
}
