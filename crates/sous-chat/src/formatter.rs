//! Reply formatting.
//!
//! Turns the outputs of one turn's capability invocations into a single
//! [`ReplyEnvelope`], plus the memory updates the orchestrator should apply.
//! Formatting is pure: the same outputs with the same avoid list always
//! produce the same envelope, and malformed output degrades to a chat reply
//! instead of an error.

use serde_json::Value;
use sous_core::{ChatType, Ingredient, Ingredients, RecipeObject, ReplyEnvelope, SourceTag};

use crate::capability::{Capability, CapabilityOutput};
use crate::dedup::RecommendationDeduper;
use crate::handlers::cooking::MISSING_INGREDIENTS;
use crate::structured::{
    extract_structured, is_product_shaped, normalize_ingredients, normalize_products, string_list,
    value_text,
};

/// Reply when no capability applies.
pub const CLARIFY_REPLY: &str =
    "요리 관련 질문을 해주세요. 레시피, 재료, 조리 팁 등 무엇이든 도와드릴 수 있어요!";

/// Reply when every capability failed.
pub const APOLOGY_REPLY: &str = "죄송합니다. 처리 중 오류가 발생했습니다. 다시 시도해주세요.";

const PICK_INVITE: &str = "\n원하는 요리의 레시피를 알려드릴까요? 번호나 요리명을 말씀해 주세요.";

const STYLED_PICK_INVITE: &str =
    "\n원하는 요리의 레시피를 알려드릴까요? 번호(예: 1번)나 요리명을 말씀해 주세요.";

const INGREDIENT_DISHES_HEADER: &str =
    "다음 재료들로 만들 수 있는 한식 요리를 추천드려요:\n\n\n🍳 [추천 요리]\n";

const INGREDIENT_DISHES_FOOTER: &str = "\n원하는 요리 형식이 있으신가요? (프랑스식, 이탈리아식, 미국식 등)\n또는 위 요리 중 어떤 것의 레시피를 알고 싶으시면 번호나 요리명을 말씀해주세요!";

// =============================================================================
// Inputs / outputs
// =============================================================================

/// One successful capability invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityResult {
    pub capability: Capability,
    pub output: CapabilityOutput,
}

impl CapabilityResult {
    pub fn new(capability: Capability, output: CapabilityOutput) -> Self {
        Self { capability, output }
    }
}

/// Per-turn inputs that are not capability outputs.
#[derive(Debug, Clone, Default)]
pub struct FormatContext<'a> {
    /// Names already shown in this conversation.
    pub avoid: &'a [String],
    /// How many dishes the user asked about.
    pub requested_items: usize,
    /// Line placed before the answer (multi-pick notice).
    pub prefix: Option<String>,
}

/// Memory changes implied by a formatted reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryUpdate {
    pub dish: Option<String>,
    pub ingredients: Vec<String>,
    /// A new suggestion list and the style it was generated for.
    pub suggestions: Option<(Vec<String>, Option<String>)>,
    pub clear_suggestions: bool,
    pub style: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatOutcome {
    pub envelope: ReplyEnvelope,
    pub memory: MemoryUpdate,
}

/// One output after classification.
#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Recipe(RecipeObject),
    Cart { object: RecipeObject, query: String },
    Chat(String),
}

// =============================================================================
// ResponseFormatter
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseFormatter {
    deduper: RecommendationDeduper,
}

impl ResponseFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the envelope for this turn's outputs, in invocation order.
    pub fn format(&self, results: &[CapabilityResult], ctx: &FormatContext<'_>) -> FormatOutcome {
        let mut update = MemoryUpdate::default();
        // Grows as lists are shown so two lists in one turn never overlap
        let mut avoid: Vec<String> = ctx.avoid.to_vec();

        let pieces: Vec<Piece> = results
            .iter()
            .map(|r| self.piece(r, &mut avoid, &mut update))
            .collect();

        let mut envelope = assemble(pieces, ctx.requested_items);
        if let Some(prefix) = ctx.prefix.as_deref().filter(|p| !p.is_empty()) {
            envelope.answer = format!("{}\n{}", prefix, envelope.answer);
        }

        tracing::debug!(
            chat_type = %envelope.chat_type,
            recipes = envelope.recipes.len(),
            "Formatted reply"
        );
        FormatOutcome {
            envelope,
            memory: update,
        }
    }

    fn piece(
        &self,
        result: &CapabilityResult,
        avoid: &mut Vec<String>,
        update: &mut MemoryUpdate,
    ) -> Piece {
        match &result.output {
            CapabilityOutput::Structured(value) => self
                .classify(result.capability, value, avoid, update)
                .unwrap_or_else(|| Piece::Chat(plain_text(value))),
            CapabilityOutput::Text(text) => match extract_structured(text) {
                Ok(value) => self
                    .classify(result.capability, &value, avoid, update)
                    .unwrap_or_else(|| Piece::Chat(text.clone())),
                Err(e) => {
                    tracing::debug!(capability = %result.capability, error = %e, "Output is prose");
                    Piece::Chat(text.clone())
                }
            },
        }
    }

    /// Classify a parsed output by its fields. `None` when nothing is
    /// recognizable.
    fn classify(
        &self,
        capability: Capability,
        value: &Value,
        avoid: &mut Vec<String>,
        update: &mut MemoryUpdate,
    ) -> Option<Piece> {
        if let Some(object) = recipe_object(capability.source_tag(), value) {
            update.dish = Some(object.food_name.clone());
            if let Ingredients::Items(items) = &object.ingredients {
                update.ingredients = ingredient_names(items);
            }
            return Some(Piece::Recipe(object));
        }

        if let Some(items) = product_items(value) {
            let products = normalize_products(items);
            if products.is_empty() {
                return Some(Piece::Chat("죄송합니다. 관련 상품을 찾을 수 없습니다.".to_string()));
            }
            let query = value_text(value.get("query"));
            let object = RecipeObject {
                source: SourceTag::IngredientSearch,
                food_name: query.clone(),
                ingredients: Ingredients::Products(products),
                recipe: Vec::new(),
            };
            return Some(Piece::Cart { object, query });
        }

        let fields = value.as_object()?;

        if let Some(Value::String(text)) = fields.get("clarify") {
            update.clear_suggestions = true;
            return Some(Piece::Chat(text.clone()));
        }
        if fields.contains_key("varieties") {
            return Some(self.varieties(value, avoid, update));
        }
        if fields.contains_key("dishes") {
            return Some(self.dish_list(capability, value, avoid, update));
        }
        if fields.contains_key("tips") {
            return Some(tips(value, update));
        }
        if fields.contains_key("substitutes") {
            return Some(substitutes(value, update));
        }
        if let Some(possible) = fields.get("possible").and_then(Value::as_bool) {
            return Some(necessity(possible, value, update));
        }
        if fields.contains_key("ingredients") {
            return Some(ingredient_list(value, update));
        }
        if let Some(Value::String(answer)) = fields.get("answer") {
            return Some(Piece::Chat(answer.clone()));
        }
        None
    }

    fn varieties(&self, value: &Value, avoid: &mut Vec<String>, update: &mut MemoryUpdate) -> Piece {
        let dish = value_text(value.get("dish"));
        let names = self
            .deduper
            .dedupe(&string_list(value.get("varieties")), avoid);
        if !dish.is_empty() {
            update.dish = Some(dish.clone());
        }
        if names.is_empty() {
            return Piece::Chat(format!("다른 원하시는 {} 종류가 있으시면 말씀해주세요!", dish));
        }

        let mut answer = format!("어떤 {} 레시피를 원하시나요?\n\n", dish);
        for (i, name) in names.iter().enumerate() {
            answer.push_str(&format!("{}. {}\n", i + 1, name));
        }
        answer.push_str(&format!("\n다른 원하시는 {} 종류가 있으시면 말씀해주세요!", dish));

        avoid.extend(names.iter().cloned());
        update.suggestions = Some((names, None));
        Piece::Chat(answer)
    }

    fn dish_list(
        &self,
        capability: Capability,
        value: &Value,
        avoid: &mut Vec<String>,
        update: &mut MemoryUpdate,
    ) -> Piece {
        let style = Some(value_text(value.get("style"))).filter(|s| !s.is_empty());
        let from_ingredients = capability == Capability::IngredientsToDishes;
        if from_ingredients {
            let ingredients = string_list(value.get("ingredients"));
            if !ingredients.is_empty() {
                update.ingredients = ingredients;
            }
        }

        let items = self
            .deduper
            .dedupe_by(dish_entries(value.get("dishes")), avoid, |entry| entry.0.as_str());

        if items.is_empty() {
            let answer = match (from_ingredients, &style) {
                (true, Some(style)) => {
                    format!("해당 재료로 만들 수 있는 {} 요리를 찾을 수 없습니다.", style)
                }
                (true, None) => "해당 재료로 만들 수 있는 요리를 찾을 수 없습니다.".to_string(),
                (false, _) => "죄송합니다. 추천 요리를 찾을 수 없습니다.".to_string(),
            };
            return Piece::Chat(answer);
        }

        let lines = numbered_dishes(&items);
        let answer = match (from_ingredients, &style) {
            (true, Some(style)) => format!("{} 스타일 추천 요리:\n\n{}{}", style, lines, STYLED_PICK_INVITE),
            (true, None) => format!("{}{}{}", INGREDIENT_DISHES_HEADER, lines, INGREDIENT_DISHES_FOOTER),
            (false, _) => format!("{}{}", lines, PICK_INVITE),
        };

        let names: Vec<String> = items.into_iter().map(|(name, _)| name).collect();
        avoid.extend(names.iter().cloned());
        if style.is_some() {
            update.style = style.clone();
        }
        update.suggestions = Some((names, style));
        Piece::Chat(answer)
    }
}

// =============================================================================
// Classification helpers
// =============================================================================

/// A recipe object when both ingredients and steps are present.
fn recipe_object(source: SourceTag, value: &Value) -> Option<RecipeObject> {
    let ingredients = normalize_ingredients(value.get("ingredients"));
    let steps = string_list(value.get("steps").or_else(|| value.get("recipe")));
    if ingredients.is_empty() || steps.is_empty() {
        return None;
    }
    let food_name = value_text(
        value
            .get("title")
            .or_else(|| value.get("food_name"))
            .or_else(|| value.get("dish")),
    );
    Some(RecipeObject {
        source,
        food_name,
        ingredients: Ingredients::Items(ingredients),
        recipe: steps,
    })
}

/// Product entries from `{"results": [...]}` or a bare product array.
fn product_items(value: &Value) -> Option<&[Value]> {
    match value {
        Value::Object(fields) => match fields.get("results") {
            Some(Value::Array(items)) => Some(items.as_slice()),
            _ => None,
        },
        Value::Array(items) if !items.is_empty() && items.iter().all(is_product_shaped) => {
            Some(items.as_slice())
        }
        _ => None,
    }
}

fn ingredient_names(items: &[Ingredient]) -> Vec<String> {
    items
        .iter()
        .map(|i| i.item.clone())
        .filter(|name| name != MISSING_INGREDIENTS)
        .collect()
}

fn dish_entries(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let entry = match item {
                Value::String(s) => (s.trim().to_string(), String::new()),
                Value::Object(_) => (
                    value_text(item.get("name")),
                    value_text(item.get("description")),
                ),
                _ => return None,
            };
            (!entry.0.is_empty()).then_some(entry)
        })
        .collect()
}

/// `N. name — description` lines, each newline-terminated.
fn numbered_dishes(items: &[(String, String)]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, (name, description))| {
            if description.is_empty() {
                format!("{}. {}\n", i + 1, name)
            } else {
                format!("{}. {} — {}\n", i + 1, name, description)
            }
        })
        .collect()
}

fn remember_dish_field(value: &Value, update: &mut MemoryUpdate) -> String {
    let dish = value_text(value.get("dish").or_else(|| value.get("title")));
    if !dish.is_empty() {
        update.dish = Some(dish.clone());
    }
    dish
}

fn tips(value: &Value, update: &mut MemoryUpdate) -> Piece {
    let dish = remember_dish_field(value, update);
    let tips = string_list(value.get("tips"));
    if tips.is_empty() {
        return Piece::Chat(format!("죄송합니다. {}의 조리 팁을 찾을 수 없습니다.", dish));
    }
    let mut answer = format!(
        "네, 알겠습니다! {}를 더 맛있게 만드는 조리 팁입니다.\n\n💡 [조리 팁]\n",
        dish
    );
    for (i, tip) in tips.iter().enumerate() {
        answer.push_str(&format!("{}. {}\n", i + 1, tip));
    }
    answer.push_str(&format!("\n{} 레시피나 재료도 궁금하시면 말씀해주세요!", dish));
    Piece::Chat(answer)
}

fn substitutes(value: &Value, update: &mut MemoryUpdate) -> Piece {
    remember_dish_field(value, update);
    let named = value_text(value.get("substituteName"));
    let candidates: Vec<&Value> = match value.get("substitutes") {
        Some(Value::Array(items)) => items.iter().filter(|v| v.is_object()).collect(),
        _ => Vec::new(),
    };
    let Some(first) = candidates.first() else {
        return Piece::Chat("대체할 수 있는 재료를 찾지 못했어요.".to_string());
    };

    if !named.is_empty() {
        let method = value_text(first.get("method_adjustment"));
        return Piece::Chat(method);
    }

    let lines: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let rest: Vec<String> = [
                value_text(c.get("name")),
                value_text(c.get("amount")),
                value_text(c.get("method_adjustment")),
            ]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
            format!("{}. {}", i + 1, rest.join(" — "))
        })
        .collect();
    Piece::Chat(lines.join("\n"))
}

fn necessity(possible: bool, value: &Value, update: &mut MemoryUpdate) -> Piece {
    remember_dish_field(value, update);
    let mut answer = format!("가능: {}", if possible { "예" } else { "아니오" });
    let flavor = value_text(value.get("flavor_change"));
    if !flavor.is_empty() {
        answer.push_str(&format!("\n맛 변화: {}", flavor));
    }
    Piece::Chat(answer)
}

fn ingredient_list(value: &Value, update: &mut MemoryUpdate) -> Piece {
    remember_dish_field(value, update);
    let items = normalize_ingredients(value.get("ingredients"));
    let names = ingredient_names(&items);
    if names.is_empty() {
        return Piece::Chat(MISSING_INGREDIENTS.to_string());
    }
    update.ingredients = names;
    let lines: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(i, ingredient)| {
            let detail = format!("{}{}", ingredient.amount, ingredient.unit);
            if detail.is_empty() {
                format!("{}. {}", i + 1, ingredient.item)
            } else {
                format!("{}. {} {}", i + 1, ingredient.item, detail)
            }
        })
        .collect();
    Piece::Chat(lines.join("\n"))
}

/// Display text for an unrecognized structured output.
fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Assembly
// =============================================================================

fn assemble(pieces: Vec<Piece>, requested_items: usize) -> ReplyEnvelope {
    let chat_type = if pieces.iter().any(|p| matches!(p, Piece::Recipe(_))) {
        ChatType::Recipe
    } else if pieces.iter().any(|p| matches!(p, Piece::Cart { .. })) {
        ChatType::Cart
    } else {
        ChatType::Chat
    };

    let mut recipes = Vec::new();
    let mut notes: Vec<String> = Vec::new();
    let mut dishes: Vec<String> = Vec::new();
    let mut cart_query = String::new();

    for piece in pieces {
        match piece {
            Piece::Recipe(object) => {
                dishes.push(object.food_name.clone());
                recipes.push(object);
            }
            Piece::Cart { object, query } if chat_type == ChatType::Cart => {
                if cart_query.is_empty() {
                    cart_query = query;
                }
                recipes.push(object);
            }
            Piece::Cart { object, query } => notes.push(cart_note(&query, object.ingredients.len())),
            Piece::Chat(text) => {
                if !text.trim().is_empty() {
                    notes.push(text);
                }
            }
        }
    }

    let headline = match chat_type {
        ChatType::Recipe => Some(recipe_headline(&dishes, requested_items)),
        ChatType::Cart => {
            let count = recipes.iter().map(|r: &RecipeObject| r.ingredients.len()).sum();
            Some(cart_note(&cart_query, count))
        }
        ChatType::Chat => None,
    };

    let answer = match headline {
        Some(headline) => std::iter::once(headline)
            .chain(notes)
            .collect::<Vec<_>>()
            .join("\n\n"),
        None if notes.is_empty() => APOLOGY_REPLY.to_string(),
        None => notes.join("\n\n"),
    };

    ReplyEnvelope {
        chat_type,
        answer,
        recipes,
    }
}

/// One sentence naming every resolved dish, offering the rest when fewer
/// dishes resolved than were asked for.
fn recipe_headline(dishes: &[String], requested_items: usize) -> String {
    let named: Vec<&str> = dishes
        .iter()
        .map(String::as_str)
        .filter(|d| !d.is_empty())
        .collect();
    let mut headline = if named.is_empty() {
        "네. 레시피를 알려드릴게요.".to_string()
    } else {
        format!("네. {}의 레시피를 알려드릴게요.", named.join(", "))
    };
    if requested_items > dishes.len() {
        headline.push_str(&format!(
            "\n요청하신 나머지 {}개 요리도 원하시면 말씀해 주세요. 이어서 안내드릴게요.",
            requested_items - dishes.len()
        ));
    }
    headline
}

fn cart_note(query: &str, count: usize) -> String {
    if query.is_empty() {
        format!("요청하신 상품 {}개를 찾았어요.", count)
    } else {
        format!("'{}' 관련 상품 {}개를 찾았어요.", query, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn structured(capability: Capability, value: Value) -> CapabilityResult {
        CapabilityResult::new(capability, CapabilityOutput::Structured(value))
    }

    fn text(capability: Capability, text: &str) -> CapabilityResult {
        CapabilityResult::new(capability, CapabilityOutput::Text(text.to_string()))
    }

    fn format_one(result: CapabilityResult) -> FormatOutcome {
        ResponseFormatter::new().format(
            &[result],
            &FormatContext {
                requested_items: 1,
                ..FormatContext::default()
            },
        )
    }

    // ---- classification ----

    #[test]
    fn test_recipe_output_is_recipe() {
        let out = format_one(structured(
            Capability::Recipe,
            json!({
                "food_name": "알리오올리오",
                "ingredients": [{"item": "스파게티", "amount": "200", "unit": "g"}, "마늘"],
                "recipe": ["1단계", "2단계"],
            }),
        ));
        let env = &out.envelope;
        assert_eq!(env.chat_type, ChatType::Recipe);
        assert_eq!(env.answer, "네. 알리오올리오의 레시피를 알려드릴게요.");
        assert_eq!(env.recipes[0].recipe, vec!["1단계", "2단계"]);
        assert_eq!(env.recipes[0].source, SourceTag::Text);
        assert!(env.is_consistent());
        assert_eq!(out.memory.dish.as_deref(), Some("알리오올리오"));
        assert_eq!(out.memory.ingredients, vec!["스파게티", "마늘"]);
    }

    #[test]
    fn test_product_output_is_cart_with_four_fields() {
        let out = format_one(structured(
            Capability::ProductSearch,
            json!({"results": [{
                "product_name": "계란",
                "price": 1000,
                "image_url": "https://img.test/egg.png",
                "product_address": "https://shop.test/egg",
                "score": 0.93,
                "vendor": "x",
            }]}),
        ));
        let env = &out.envelope;
        assert_eq!(env.chat_type, ChatType::Cart);
        let v = serde_json::to_value(&env.recipes[0].ingredients).unwrap();
        let keys: Vec<&String> = v[0].as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(v[0]["product_name"], "계란");
        assert!(env.is_consistent());
    }

    #[test]
    fn test_prose_is_chat_verbatim() {
        let prose = "  파스타는 소금물에 삶으세요.\n";
        let out = format_one(text(Capability::Tips, prose));
        assert_eq!(out.envelope.chat_type, ChatType::Chat);
        assert_eq!(out.envelope.answer, prose);
        assert!(out.envelope.recipes.is_empty());
    }

    #[test]
    fn test_fenced_text_is_parsed() {
        let fenced = "레시피입니다\n```json\n{\"title\": \"잡채\", \"ingredients\": [\"당면\"], \"steps\": [\"삶기\"]}\n```";
        let out = format_one(text(Capability::Recipe, fenced));
        assert_eq!(out.envelope.chat_type, ChatType::Recipe);
        assert_eq!(out.envelope.recipes[0].food_name, "잡채");
    }

    #[test]
    fn test_truncated_text_degrades_to_chat() {
        let truncated = "```json\n{\"title\": \"잡채\", \"steps\": [";
        let out = format_one(text(Capability::Recipe, truncated));
        assert_eq!(out.envelope.chat_type, ChatType::Chat);
        assert_eq!(out.envelope.answer, truncated);
    }

    #[test]
    fn test_recipe_missing_steps_is_not_recipe() {
        let out = format_one(structured(
            Capability::Ingredients,
            json!({"title": "된장찌개", "ingredients": [{"item": "두부", "amount": "1", "unit": "모"}, "된장"]}),
        ));
        assert_eq!(out.envelope.chat_type, ChatType::Chat);
        assert_eq!(out.envelope.answer, "1. 두부 1모\n2. 된장");
        assert_eq!(out.memory.ingredients, vec!["두부", "된장"]);
    }

    #[test]
    fn test_formatting_is_idempotent() {
        let result = structured(
            Capability::CategoryRecommend,
            json!({"style": "이탈리아식", "dishes": [{"name": "리조또", "description": "크리미"}, "카프레제"]}),
        );
        let formatter = ResponseFormatter::new();
        let avoid = vec!["라자냐".to_string()];
        let ctx = FormatContext {
            avoid: &avoid,
            requested_items: 1,
            prefix: None,
        };
        let first = formatter.format(std::slice::from_ref(&result), &ctx);
        let second = formatter.format(std::slice::from_ref(&result), &ctx);
        assert_eq!(
            serde_json::to_string(&first.envelope).unwrap(),
            serde_json::to_string(&second.envelope).unwrap()
        );
        assert_eq!(first, second);
    }

    // ---- suggestion lists ----

    #[test]
    fn test_category_list_is_deduped_and_cached() {
        let avoid = vec!["김치 찌개".to_string()];
        let out = ResponseFormatter::new().format(
            &[structured(
                Capability::CategoryRecommend,
                json!({"style": "한식", "dishes": ["김치찌개", "불고기", "불 고기", "잡채"]}),
            )],
            &FormatContext {
                avoid: &avoid,
                requested_items: 1,
                prefix: None,
            },
        );
        assert_eq!(
            out.envelope.answer,
            "1. 불고기\n2. 잡채\n\n원하는 요리의 레시피를 알려드릴까요? 번호나 요리명을 말씀해 주세요."
        );
        assert_eq!(
            out.memory.suggestions,
            Some((vec!["불고기".to_string(), "잡채".to_string()], Some("한식".to_string())))
        );
        assert_eq!(out.memory.style.as_deref(), Some("한식"));
    }

    #[test]
    fn test_ingredient_dishes_rendering() {
        let out = format_one(structured(
            Capability::IngredientsToDishes,
            json!({"ingredients": ["두부"], "dishes": [{"name": "두부조림", "description": "밥도둑"}]}),
        ));
        assert_eq!(
            out.envelope.answer,
            format!("{}1. 두부조림 — 밥도둑\n{}", INGREDIENT_DISHES_HEADER, INGREDIENT_DISHES_FOOTER)
        );
        assert_eq!(out.memory.ingredients, vec!["두부"]);
        assert_eq!(out.memory.style, None);
    }

    #[test]
    fn test_styled_dishes_rendering() {
        let out = format_one(structured(
            Capability::IngredientsToDishes,
            json!({"style": "프랑스식", "ingredients": ["두부"], "dishes": [{"name": "두부 그라탕", "description": ""}]}),
        ));
        assert!(out.envelope.answer.starts_with("프랑스식 스타일 추천 요리:\n\n1. 두부 그라탕\n"));
        assert!(out.envelope.answer.ends_with("번호(예: 1번)나 요리명을 말씀해 주세요."));
        assert_eq!(out.memory.style.as_deref(), Some("프랑스식"));
    }

    #[test]
    fn test_all_suggestions_already_shown() {
        let avoid = vec!["두부조림".to_string()];
        let out = ResponseFormatter::new().format(
            &[structured(
                Capability::IngredientsToDishes,
                json!({"ingredients": ["두부"], "dishes": ["두부 조림"]}),
            )],
            &FormatContext {
                avoid: &avoid,
                requested_items: 1,
                prefix: None,
            },
        );
        assert_eq!(out.envelope.answer, "해당 재료로 만들 수 있는 요리를 찾을 수 없습니다.");
        assert_eq!(out.memory.suggestions, None);
    }

    #[test]
    fn test_vague_dish_varieties() {
        let out = format_one(structured(
            Capability::Recipe,
            json!({"dish": "파스타", "varieties": ["봉골레", "까르보나라"]}),
        ));
        assert_eq!(
            out.envelope.answer,
            "어떤 파스타 레시피를 원하시나요?\n\n1. 봉골레\n2. 까르보나라\n\n다른 원하시는 파스타 종류가 있으시면 말씀해주세요!"
        );
        assert_eq!(
            out.memory.suggestions,
            Some((vec!["봉골레".to_string(), "까르보나라".to_string()], None))
        );
    }

    #[test]
    fn test_clarify_clears_suggestions() {
        let out = format_one(structured(
            Capability::CategoryRecommend,
            json!({"clarify": "어떤 스타일이 좋으세요?"}),
        ));
        assert_eq!(out.envelope.answer, "어떤 스타일이 좋으세요?");
        assert!(out.memory.clear_suggestions);
    }

    // ---- dish answers ----

    #[test]
    fn test_tips_rendering() {
        let out = format_one(structured(
            Capability::Tips,
            json!({"dish": "라면", "tips": ["물을 적게", "센 불"]}),
        ));
        assert_eq!(
            out.envelope.answer,
            "네, 알겠습니다! 라면를 더 맛있게 만드는 조리 팁입니다.\n\n💡 [조리 팁]\n1. 물을 적게\n2. 센 불\n\n라면 레시피나 재료도 궁금하시면 말씀해주세요!"
        );
        assert_eq!(out.memory.dish.as_deref(), Some("라면"));
    }

    #[test]
    fn test_substitute_rendering() {
        let listed = format_one(structured(
            Capability::Substitute,
            json!({"dish": "스테이크", "substituteName": "", "substitutes": [
                {"name": "올리브유", "amount": "1:1", "method_adjustment": "약불"},
                {"name": "마가린", "amount": "", "method_adjustment": ""}
            ]}),
        ));
        assert_eq!(listed.envelope.answer, "1. 올리브유 — 1:1 — 약불\n2. 마가린");

        let named = format_one(structured(
            Capability::Substitute,
            json!({"substituteName": "올리브유", "substitutes": [{"method_adjustment": "같은 양을 쓰세요"}]}),
        ));
        assert_eq!(named.envelope.answer, "같은 양을 쓰세요");
    }

    #[test]
    fn test_necessity_rendering() {
        let out = format_one(structured(
            Capability::Necessity,
            json!({"dish": "김치찌개", "possible": false, "flavor_change": "깊은 맛이 사라집니다"}),
        ));
        assert_eq!(out.envelope.answer, "가능: 아니오\n맛 변화: 깊은 맛이 사라집니다");
    }

    // ---- multiple outputs ----

    #[test]
    fn test_multiple_recipes_named_together_with_remainder() {
        let recipe = |name: &str| {
            structured(
                Capability::Recipe,
                json!({"title": name, "ingredients": ["재료"], "steps": ["조리"]}),
            )
        };
        let out = ResponseFormatter::new().format(
            &[recipe("잡채"), recipe("불고기")],
            &FormatContext {
                requested_items: 3,
                ..FormatContext::default()
            },
        );
        assert_eq!(out.envelope.recipes.len(), 2);
        assert!(out
            .envelope
            .answer
            .starts_with("네. 잡채, 불고기의 레시피를 알려드릴게요."));
        assert!(out.envelope.answer.contains("나머지 1개 요리"));
    }

    #[test]
    fn test_mixed_outputs_keep_envelope_homogeneous() {
        let out = ResponseFormatter::new().format(
            &[
                structured(
                    Capability::VideoRecipe,
                    json!({"food_name": "김치볶음밥", "ingredients": ["김치", "밥"], "steps": ["볶기"]}),
                ),
                structured(
                    Capability::ProductSearch,
                    json!({"query": "김치", "results": [{"product_name": "김치", "price": "5,000원"}]}),
                ),
                text(Capability::Tips, "불 조절이 중요해요."),
            ],
            &FormatContext {
                requested_items: 1,
                ..FormatContext::default()
            },
        );
        let env = &out.envelope;
        assert_eq!(env.chat_type, ChatType::Recipe);
        assert_eq!(env.recipes.len(), 1);
        assert_eq!(env.recipes[0].source, SourceTag::Video);
        assert!(env.is_consistent());
        assert!(env.answer.contains("'김치' 관련 상품 1개를 찾았어요."));
        assert!(env.answer.ends_with("불 조절이 중요해요."));
    }

    #[test]
    fn test_prefix_and_empty_results() {
        let out = ResponseFormatter::new().format(
            &[],
            &FormatContext {
                prefix: Some("먼저".to_string()),
                ..FormatContext::default()
            },
        );
        assert_eq!(out.envelope.answer, format!("먼저\n{}", APOLOGY_REPLY));
        assert_eq!(out.envelope.chat_type, ChatType::Chat);
    }

    #[test]
    fn test_empty_product_results_are_chat() {
        let out = format_one(structured(Capability::ProductSearch, json!({"query": "x", "results": []})));
        assert_eq!(out.envelope.chat_type, ChatType::Chat);
        assert!(out.envelope.recipes.is_empty());
    }
}
