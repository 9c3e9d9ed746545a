//! Structured-data extraction from completion text.
//!
//! Completion output arrives either as bare JSON or as prose with a fenced
//! ```` ```json ```` block. [`extract_structured`] is the single entry point;
//! it is pure and never panics.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use sous_core::{Ingredient, Product};

use crate::error::ChatError;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("Invalid fence regex")
});

static OPEN_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*)$").expect("Invalid open fence regex")
});

/// Why a text could not be turned into JSON.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("completion text is empty")]
    Empty,
    #[error("completion JSON is truncated: {0}")]
    Truncated(String),
    #[error("completion is not valid JSON: {0}")]
    InvalidJson(String),
}

impl From<ParseError> for ChatError {
    fn from(err: ParseError) -> Self {
        ChatError::MalformedCompletion(err.to_string())
    }
}

/// Parse the first fenced block if there is one, otherwise the whole text.
///
/// An opening fence with no closing fence is parsed up to the end of the
/// text, which usually reports [`ParseError::Truncated`].
pub fn extract_structured(text: &str) -> Result<Value, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let body = if let Some(caps) = FENCED_BLOCK.captures(trimmed) {
        caps.get(1).map_or("", |m| m.as_str())
    } else if let Some(caps) = OPEN_FENCE.captures(trimmed) {
        caps.get(1).map_or("", |m| m.as_str())
    } else {
        trimmed
    };

    parse_body(body.trim())
}

fn parse_body(body: &str) -> Result<Value, ParseError> {
    if body.is_empty() {
        return Err(ParseError::Empty);
    }
    serde_json::from_str(body).map_err(|e| {
        if e.is_eof() {
            ParseError::Truncated(e.to_string())
        } else {
            ParseError::InvalidJson(e.to_string())
        }
    })
}

// =============================================================================
// Shape helpers
// =============================================================================

/// A scalar as display text. Strings are trimmed, numbers printed, anything
/// else is empty.
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Non-empty strings of a JSON array. A single string counts as one item.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| value_text(Some(v)))
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Recipe ingredients from either plain names or `{item, amount, unit}`
/// objects. Entries without a name are dropped.
pub fn normalize_ingredients(value: Option<&Value>) -> Vec<Ingredient> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|entry| match entry {
            Value::String(name) => {
                let name = name.trim();
                (!name.is_empty()).then(|| Ingredient::named(name))
            }
            Value::Object(fields) => {
                let item = value_text(fields.get("item").or_else(|| fields.get("name")));
                (!item.is_empty()).then(|| Ingredient {
                    item,
                    amount: value_text(fields.get("amount")),
                    unit: value_text(fields.get("unit")),
                })
            }
            _ => None,
        })
        .collect()
}

/// Whether an object carries catalog product fields.
pub fn is_product_shaped(value: &Value) -> bool {
    value.get("product_name").is_some()
        || (value.get("name").is_some() && value.get("price").is_some())
}

/// Products projected to exactly the catalog's four reply fields.
pub fn normalize_products(items: &[Value]) -> Vec<Product> {
    items
        .iter()
        .filter(|v| is_product_shaped(v))
        .map(|v| Product {
            product_name: value_text(v.get("product_name").or_else(|| v.get("name"))),
            price: v.get("price").cloned().unwrap_or(Value::Null),
            image_url: value_text(v.get("image_url")),
            product_address: value_text(v.get("product_address")),
        })
        .filter(|p| !p.product_name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_json_object() {
        let v = extract_structured(r#"{"title": "잡채", "steps": ["삶는다"]}"#).unwrap();
        assert_eq!(v, json!({"title": "잡채", "steps": ["삶는다"]}));
    }

    #[test]
    fn test_bare_json_array_with_whitespace() {
        let v = extract_structured("\n  [\"김밥\", \"라면\"]  \n").unwrap();
        assert_eq!(v, json!(["김밥", "라면"]));
    }

    #[test]
    fn test_fenced_with_leading_and_trailing_prose() {
        let text = "네, 레시피입니다.\n```json\n{\"title\": \"불고기\"}\n```\n맛있게 드세요!";
        let v = extract_structured(text).unwrap();
        assert_eq!(v["title"], "불고기");
    }

    #[test]
    fn test_fence_without_language_tag() {
        let text = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_structured(text).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_first_fence_wins() {
        let text = "```json\n{\"a\":1}\n```\n그리고\n```json\n{\"b\":2}\n```";
        assert_eq!(extract_structured(text).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_absent_fence_prose_is_invalid() {
        let err = extract_structured("김치찌개는 맛있는 한국 요리입니다.").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn test_unfenced_json_with_trailing_prose_is_invalid() {
        let err = extract_structured("{\"a\": 1} 이상입니다").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn test_truncated_bare_json() {
        let err = extract_structured(r#"{"title": "잡채", "steps": ["삶"#).unwrap_err();
        assert!(matches!(err, ParseError::Truncated(_)));
    }

    #[test]
    fn test_truncated_unclosed_fence() {
        let err = extract_structured("```json\n{\"title\": \"잡채\", \"steps\": [").unwrap_err();
        assert!(matches!(err, ParseError::Truncated(_)));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(extract_structured("").unwrap_err(), ParseError::Empty);
        assert_eq!(extract_structured("   \n ").unwrap_err(), ParseError::Empty);
        assert_eq!(extract_structured("```json\n```").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn test_parse_error_into_chat_error() {
        let err: ChatError = ParseError::Empty.into();
        assert!(matches!(err, ChatError::MalformedCompletion(_)));
    }

    // ---- shape helpers ----

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(Some(&json!(" 2 "))), "2");
        assert_eq!(value_text(Some(&json!(1.5))), "1.5");
        assert_eq!(value_text(Some(&json!(null))), "");
        assert_eq!(value_text(None), "");
    }

    #[test]
    fn test_string_list() {
        assert_eq!(string_list(Some(&json!(["a", " ", "b"]))), vec!["a", "b"]);
        assert_eq!(string_list(Some(&json!("단일"))), vec!["단일"]);
        assert!(string_list(Some(&json!({"a": 1}))).is_empty());
    }

    #[test]
    fn test_normalize_ingredients_upgrades_strings() {
        let v = json!(["마늘", {"item": "올리브유", "amount": 3, "unit": "큰술"}, {"name": "면"}, {}]);
        let items = normalize_ingredients(Some(&v));
        assert_eq!(
            items,
            vec![
                Ingredient::named("마늘"),
                Ingredient {
                    item: "올리브유".to_string(),
                    amount: "3".to_string(),
                    unit: "큰술".to_string(),
                },
                Ingredient::named("면"),
            ]
        );
    }

    #[test]
    fn test_normalize_products_projects_four_fields() {
        let items = vec![
            json!({"product_name": "계란", "price": 1000, "image_url": "i", "product_address": "a", "stock": 3}),
            json!({"title": "not a product"}),
        ];
        let products = normalize_products(&items);
        assert_eq!(products.len(), 1);
        let v = serde_json::to_value(&products[0]).unwrap();
        assert_eq!(v.as_object().unwrap().len(), 4);
        assert_eq!(v["price"], 1000);
    }
}
