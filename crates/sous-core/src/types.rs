use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Discriminator of a reply envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// Plain conversational answer; `recipes` is empty.
    #[default]
    Chat,
    /// Shopping results; every ingredient is product-shaped.
    Cart,
    /// One or more recipes; every ingredient is `{item, amount, unit}`.
    Recipe,
}

impl std::fmt::Display for ChatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChatType::Chat => "chat",
            ChatType::Cart => "cart",
            ChatType::Recipe => "recipe",
        };
        f.write_str(s)
    }
}

/// Where a recipe object came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Produced from a text conversation.
    #[default]
    Text,
    /// Extracted from a video transcript.
    Video,
    /// Product results for an ingredient search.
    IngredientSearch,
}

// =============================================================================
// Newtype Wrappers - Temporal
// =============================================================================

/// Unix timestamp in seconds since epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    /// Seconds elapsed from `self` until `later`, saturating at zero.
    pub fn secs_until(&self, later: Timestamp) -> u64 {
        u64::try_from(later.0 - self.0).unwrap_or(0)
    }
}

// =============================================================================
// Reply payload
// =============================================================================

/// A recipe ingredient line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub item: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub unit: String,
}

impl Ingredient {
    /// An ingredient known only by name.
    pub fn named(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            amount: String::new(),
            unit: String::new(),
        }
    }
}

/// A purchasable product returned by catalog search.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_name: String,
    /// Kept as raw JSON: catalogs report prices as numbers or formatted strings.
    #[serde(default)]
    pub price: serde_json::Value,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub product_address: String,
}

/// Ingredient list of a [`RecipeObject`].
///
/// A list is homogeneous by construction: either every entry is a recipe
/// ingredient or every entry is a product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ingredients {
    Items(Vec<Ingredient>),
    Products(Vec<Product>),
}

impl Default for Ingredients {
    fn default() -> Self {
        Ingredients::Items(Vec::new())
    }
}

impl Ingredients {
    pub fn len(&self) -> usize {
        match self {
            Ingredients::Items(items) => items.len(),
            Ingredients::Products(products) => products.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_products(&self) -> bool {
        matches!(self, Ingredients::Products(_))
    }
}

/// One normalized entry in `ReplyEnvelope::recipes`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeObject {
    pub source: SourceTag,
    pub food_name: String,
    pub ingredients: Ingredients,
    /// Ordered cooking steps. Empty for cart objects.
    #[serde(default)]
    pub recipe: Vec<String>,
}

/// The single reply produced for every processed utterance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    #[serde(rename = "chatType")]
    pub chat_type: ChatType,
    pub answer: String,
    #[serde(default)]
    pub recipes: Vec<RecipeObject>,
}

impl ReplyEnvelope {
    /// A conversational reply with no recipes.
    pub fn chat(answer: impl Into<String>) -> Self {
        Self {
            chat_type: ChatType::Chat,
            answer: answer.into(),
            recipes: Vec::new(),
        }
    }

    /// Whether every recipe object matches the envelope's chat type.
    ///
    /// `chat` carries no recipes, `recipe` carries only ingredient lists and
    /// `cart` carries only product lists.
    pub fn is_consistent(&self) -> bool {
        match self.chat_type {
            ChatType::Chat => self.recipes.is_empty(),
            ChatType::Recipe => self.recipes.iter().all(|r| !r.ingredients.is_products()),
            ChatType::Cart => self
                .recipes
                .iter()
                .all(|r| r.ingredients.is_products() || r.ingredients.is_empty()),
        }
    }
}

// =============================================================================
// Transport boundary
// =============================================================================

/// Inbound chat message as received from the transport layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Base64 image attached to the message, if any.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_type_serialization() {
        assert_eq!(serde_json::to_string(&ChatType::Cart).unwrap(), "\"cart\"");
        let parsed: ChatType = serde_json::from_str("\"recipe\"").unwrap();
        assert_eq!(parsed, ChatType::Recipe);
        assert_eq!(ChatType::default(), ChatType::Chat);
    }

    #[test]
    fn test_source_tag_serialization() {
        let json = serde_json::to_string(&SourceTag::IngredientSearch).unwrap();
        assert_eq!(json, "\"ingredient_search\"");
    }

    #[test]
    fn test_timestamp_secs_until_saturates() {
        let earlier = Timestamp(100);
        let later = Timestamp(160);
        assert_eq!(earlier.secs_until(later), 60);
        assert_eq!(later.secs_until(earlier), 0);
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = ReplyEnvelope {
            chat_type: ChatType::Recipe,
            answer: "네. 김치찌개의 레시피를 알려드릴게요.".to_string(),
            recipes: vec![RecipeObject {
                source: SourceTag::Text,
                food_name: "김치찌개".to_string(),
                ingredients: Ingredients::Items(vec![Ingredient {
                    item: "김치".to_string(),
                    amount: "200".to_string(),
                    unit: "g".to_string(),
                }]),
                recipe: vec!["김치를 볶는다".to_string()],
            }],
        };

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["chatType"], "recipe");
        assert_eq!(value["recipes"][0]["ingredients"][0]["item"], "김치");
        assert_eq!(value["recipes"][0]["source"], "text");
        assert!(value.get("chat_type").is_none());
    }

    #[test]
    fn test_ingredients_untagged_picks_products() {
        let value = json!([{
            "product_name": "유기농 두부",
            "price": 2500,
            "image_url": "https://img/1.png",
            "product_address": "https://shop/1"
        }]);
        let parsed: Ingredients = serde_json::from_value(value).unwrap();
        assert!(parsed.is_products());
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_ingredients_untagged_picks_items() {
        let value = json!([{ "item": "양파" }]);
        let parsed: Ingredients = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, Ingredients::Items(vec![Ingredient::named("양파")]));
    }

    #[test]
    fn test_envelope_consistency() {
        assert!(ReplyEnvelope::chat("안녕하세요").is_consistent());

        let cart_with_items = ReplyEnvelope {
            chat_type: ChatType::Cart,
            answer: String::new(),
            recipes: vec![RecipeObject {
                ingredients: Ingredients::Items(vec![Ingredient::named("소금")]),
                ..RecipeObject::default()
            }],
        };
        assert!(!cart_with_items.is_consistent());
    }

    #[test]
    fn test_chat_request_optional_fields() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"2번"}"#).unwrap();
        assert_eq!(req.message, "2번");
        assert!(req.image.is_none());
        assert!(req.session_id.is_none());
    }
}
