//! Cooking capabilities answered by the completion service.
//!
//! Each handler builds a prompt for its capability, asks for JSON and
//! normalizes whatever comes back into a fixed shape the formatter knows:
//!
//! | capability              | shape                                              |
//! |-------------------------|----------------------------------------------------|
//! | recipe                  | `{title, ingredients, steps}` or `{dish, varieties}` |
//! | ingredients             | `{title, ingredients}`                             |
//! | tips                    | `{dish, tips}`                                     |
//! | substitute              | `{dish, ingredient, substituteName, substitutes}`  |
//! | necessity               | `{dish, ingredient, possible, flavor_change}`      |
//! | category_recommend      | `{style, dishes}` or `{clarify}`                   |
//! | ingredients_to_dishes   | `{ingredients, dishes, style?}` or `{clarify}`     |

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::capability::{Capability, CapabilityHandler, CapabilityOutput, CapabilityRequest};
use crate::completion::CompletionService;
use crate::error::ChatError;
use crate::structured::{extract_structured, normalize_ingredients, string_list, value_text};
use crate::vocabulary::{cuisine_by_key, infer_cuisine, is_vague_dish, CuisineProfile};

pub const MISSING_INGREDIENTS: &str = "재료 정보를 찾을 수 없습니다";
pub const MISSING_STEPS: &str = "조리법 정보를 찾을 수 없습니다";

/// Asked when a category request names no cuisine.
pub const CATEGORY_CLARIFY: &str = "혹시 특별히 끌리는 요리 스타일(한식, 중식, 이탈리아식 등)이 있으신가요? 말씀해주시면 거기에 맞춰 맛있는 메뉴를 추천해드릴게요!";

/// Asked when a style follow-up names no cuisine.
pub const STYLE_CLARIFY: &str =
    "원하시는 요리 스타일을 알려주세요. (예: 프랑스식, 이탈리아식, 미국식 등)";

const DEFAULT_TARGET: &str = "핵심 재료";

/// Prior suggestions quoted in a prompt.
const AVOID_LIMIT: usize = 10;

const CHEF_PERSONA: &str = "당신은 세계 각국의 요리법과 재료에 해박한 AI 셰프입니다. \
    한국에서 쉽게 구할 수 있는 재료를 우선하고, 누구나 따라 할 수 있는 실용적인 설명을 합니다.";

/// Completion-backed handler for one cooking capability.
pub struct CookingCapability {
    capability: Capability,
    completion: Arc<dyn CompletionService>,
    max_recipe_steps: usize,
}

impl CookingCapability {
    pub fn new(
        capability: Capability,
        completion: Arc<dyn CompletionService>,
        max_recipe_steps: usize,
    ) -> Self {
        Self {
            capability,
            completion,
            max_recipe_steps,
        }
    }

    /// Ask for JSON. Unparsable answers become `Value::Null` so each
    /// capability can fall back to its own placeholder; upstream failures
    /// propagate.
    async fn ask(&self, prompt: &str) -> Result<Value, ChatError> {
        let text = self.completion.complete_json(prompt).await?;
        match extract_structured(&text) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(capability = %self.capability, error = %e, "Unreadable completion");
                Ok(Value::Null)
            }
        }
    }

    // =========================================================================
    // Dish-targeted capabilities
    // =========================================================================

    async fn recipe(&self, request: &CapabilityRequest) -> Result<Value, ChatError> {
        let dish = required(request, "dish")?;
        if is_vague_dish(dish) {
            let value = self.ask(&vague_dish_prompt(dish)).await?;
            let varieties = match &value {
                Value::Array(_) => string_list(Some(&value)),
                _ => Vec::new(),
            };
            if !varieties.is_empty() {
                tracing::debug!(dish = %dish, count = varieties.len(), "Vague dish, offering varieties");
                return Ok(json!({ "dish": dish, "varieties": varieties }));
            }
            return Ok(normalize_recipe(&value, dish, self.max_recipe_steps));
        }
        let value = self.ask(&recipe_prompt(dish)).await?;
        Ok(normalize_recipe(&value, dish, self.max_recipe_steps))
    }

    async fn ingredients(&self, request: &CapabilityRequest) -> Result<Value, ChatError> {
        let dish = required(request, "dish")?;
        let value = self.ask(&ingredients_prompt(dish)).await?;
        let list = match &value {
            Value::Array(_) => Some(&value),
            Value::Object(_) => value.get("ingredients"),
            _ => None,
        };
        Ok(json!({ "title": dish, "ingredients": normalize_ingredients(list) }))
    }

    async fn tips(&self, request: &CapabilityRequest) -> Result<Value, ChatError> {
        let dish = required(request, "dish")?;
        let value = self.ask(&tips_prompt(dish)).await?;
        let tips = match &value {
            Value::Object(_) => string_list(value.get("tips")),
            _ => string_list(Some(&value)),
        };
        Ok(json!({ "dish": dish, "tips": tips }))
    }

    async fn substitute(&self, request: &CapabilityRequest) -> Result<Value, ChatError> {
        let dish = request.arg_str("dish").unwrap_or_default();
        let target = request.arg_str("ingredient").unwrap_or(DEFAULT_TARGET);
        let named = request.arg_str("substitute").unwrap_or_default();
        let message = request.arg_str("message").unwrap_or_default();

        let value = self
            .ask(&substitute_prompt(dish, target, named, message))
            .await?;
        let ingredient = Some(value_text(value.get("ingredient")))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| target.to_string());
        let substitute_name = Some(value_text(value.get("substituteName")))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| named.to_string());
        let substitutes: Vec<Value> = match value.get("substitutes") {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|v| v.is_object())
                .map(|v| {
                    json!({
                        "name": value_text(v.get("name")),
                        "amount": value_text(v.get("amount")),
                        "method_adjustment": value_text(
                            v.get("method_adjustment").or_else(|| v.get("method"))
                        ),
                    })
                })
                .collect(),
            _ => Vec::new(),
        };

        Ok(json!({
            "dish": dish,
            "ingredient": ingredient,
            "substituteName": substitute_name,
            "substitutes": substitutes,
        }))
    }

    async fn necessity(&self, request: &CapabilityRequest) -> Result<Value, ChatError> {
        let dish = request.arg_str("dish").unwrap_or_default();
        let target = request.arg_str("ingredient").unwrap_or(DEFAULT_TARGET);
        let value = self.ask(&necessity_prompt(dish, target)).await?;
        Ok(json!({
            "dish": dish,
            "ingredient": target,
            "possible": value.get("possible").and_then(Value::as_bool).unwrap_or(false),
            "flavor_change": value_text(value.get("flavor_change")),
        }))
    }

    // =========================================================================
    // Recommendations
    // =========================================================================

    async fn category(&self, request: &CapabilityRequest) -> Result<Value, ChatError> {
        let Some(profile) = requested_cuisine(request) else {
            tracing::info!("Category request names no cuisine, asking for one");
            return Ok(json!({ "clarify": CATEGORY_CLARIFY }));
        };
        let avoid = recent_avoid(request);
        let value = self.ask(&category_prompt(profile, &avoid)).await?;
        Ok(json!({ "style": profile.key, "dishes": dish_items(&value) }))
    }

    async fn ingredients_to_dishes(&self, request: &CapabilityRequest) -> Result<Value, ChatError> {
        let known = request.arg_strings("ingredients");
        let message = request.arg_str("message").unwrap_or_default();
        let require_style = request
            .arguments
            .get("require_style")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let profile = request.arg_str("style").and_then(|s| {
            cuisine_by_key(s).or_else(|| infer_cuisine(s))
        });

        match profile {
            Some(profile) if !known.is_empty() => {
                let avoid = recent_avoid(request);
                let value = self
                    .ask(&styled_dishes_prompt(profile, &known, message, &avoid))
                    .await?;
                Ok(json!({
                    "style": profile.key,
                    "ingredients": known,
                    "dishes": dish_items(value.get("dishes").unwrap_or(&value)),
                }))
            }
            None if require_style => {
                tracing::info!("Style follow-up names no cuisine, asking for one");
                Ok(json!({ "clarify": STYLE_CLARIFY, "ingredients": known }))
            }
            _ => {
                let value = self.ask(&dishes_prompt(message, &known)).await?;
                let Value::Object(_) = value else {
                    return Err(ChatError::MalformedCompletion(
                        "ingredient recommendation is not an object".to_string(),
                    ));
                };
                let mut ingredients = string_list(value.get("ingredients"));
                if ingredients.is_empty() {
                    ingredients = known;
                }
                Ok(json!({
                    "ingredients": ingredients,
                    "dishes": dish_items(value.get("dishes").unwrap_or(&Value::Null)),
                }))
            }
        }
    }
}

#[async_trait]
impl CapabilityHandler for CookingCapability {
    fn capability(&self) -> Capability {
        self.capability
    }

    async fn invoke(&self, request: &CapabilityRequest) -> Result<CapabilityOutput, ChatError> {
        tracing::debug!(capability = %self.capability, "Invoking cooking capability");
        let value = match self.capability {
            Capability::Recipe => self.recipe(request).await?,
            Capability::Ingredients => self.ingredients(request).await?,
            Capability::Tips => self.tips(request).await?,
            Capability::Substitute => self.substitute(request).await?,
            Capability::Necessity => self.necessity(request).await?,
            Capability::CategoryRecommend => self.category(request).await?,
            Capability::IngredientsToDishes => self.ingredients_to_dishes(request).await?,
            other => {
                return Err(ChatError::InvalidArguments(format!(
                    "{} is not a cooking capability",
                    other
                )))
            }
        };
        Ok(CapabilityOutput::Structured(value))
    }
}

// =============================================================================
// Normalization
// =============================================================================

fn required<'a>(request: &'a CapabilityRequest, key: &str) -> Result<&'a str, ChatError> {
    request
        .arg_str(key)
        .ok_or_else(|| ChatError::InvalidArguments(format!("missing argument: {}", key)))
}

/// `{title, ingredients, steps}` with placeholders for missing parts and at
/// most `max_steps` steps.
pub fn normalize_recipe(value: &Value, dish: &str, max_steps: usize) -> Value {
    let title = Some(value_text(value.get("title").or_else(|| value.get("food_name"))))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| dish.to_string());

    let mut ingredients = normalize_ingredients(value.get("ingredients"));
    if ingredients.is_empty() {
        ingredients.push(sous_core::Ingredient::named(MISSING_INGREDIENTS));
    }

    let mut steps = string_list(value.get("steps").or_else(|| value.get("recipe")));
    if steps.is_empty() {
        steps.push(MISSING_STEPS.to_string());
    }
    steps.truncate(max_steps);

    json!({ "title": title, "ingredients": ingredients, "steps": steps })
}

/// `{name, description}` items from plain names or objects.
fn dish_items(value: &Value) -> Vec<Value> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let (name, description) = match item {
                Value::String(s) => (s.trim().to_string(), String::new()),
                Value::Object(_) => (
                    value_text(item.get("name")),
                    value_text(item.get("description").or_else(|| item.get("note"))),
                ),
                _ => return None,
            };
            (!name.is_empty()).then(|| json!({ "name": name, "description": description }))
        })
        .collect()
}

fn requested_cuisine(request: &CapabilityRequest) -> Option<&'static CuisineProfile> {
    request
        .arg_str("style")
        .and_then(|s| cuisine_by_key(s).or_else(|| infer_cuisine(s)))
        .or_else(|| request.arg_str("message").and_then(infer_cuisine))
}

fn recent_avoid(request: &CapabilityRequest) -> Vec<String> {
    let avoid = request.arg_strings("avoid");
    let skip = avoid.len().saturating_sub(AVOID_LIMIT);
    avoid.into_iter().skip(skip).collect()
}

// =============================================================================
// Prompts
// =============================================================================

fn vague_dish_prompt(dish: &str) -> String {
    format!(
        "{CHEF_PERSONA}\n\n\
         '{dish}'는 여러 종류로 나뉘는 요리입니다.\n\
         - 하위 요리 3~5가지를 JSON 문자열 배열로 출력하세요. 예: [\"요리1\", \"요리2\", \"요리3\"]\n\
         - '{dish}'가 사실 구체적인 단일 요리라면 대신 레시피 객체를 출력하세요: \
         {{\"title\": \"{dish}\", \"ingredients\": [{{\"item\": \"재료명\", \"amount\": \"수량\", \"unit\": \"단위\"}}], \"steps\": [\"1단계\"]}}\n\
         JSON 이외의 텍스트는 출력하지 마세요."
    )
}

fn recipe_prompt(dish: &str) -> String {
    format!(
        "{CHEF_PERSONA}\n\n\
         '{dish}' 레시피를 JSON으로 작성하세요. '{dish}'가 요리명이 아니면 가장 가능성이 높은 요리 하나를 골라 작성하세요.\n\
         - 조리법은 15단계 이하, 핵심만 간결하게\n\
         - ingredients는 {{\"item\", \"amount\", \"unit\"}} 객체 배열. item은 재료명만, amount는 숫자만, 단위가 없으면 빈 문자열\n\
         - 팁이나 도입문은 넣지 마세요\n\
         {{\"title\": \"{dish}\", \"ingredients\": [{{\"item\": \"재료명\", \"amount\": \"1\", \"unit\": \"개\"}}], \"steps\": [\"1단계 설명\"]}}"
    )
}

fn ingredients_prompt(dish: &str) -> String {
    format!(
        "{CHEF_PERSONA}\n\n\
         '{dish}'에 필요한 재료와 양을 JSON 객체 배열로만 출력하세요.\n\
         각 원소: {{\"item\": \"재료명\", \"amount\": \"숫자\", \"unit\": \"단위\"}}. 모르면 빈 문자열을 쓰세요.\n\
         예: [{{\"item\": \"두부\", \"amount\": \"1/2\", \"unit\": \"모\"}}]"
    )
}

fn tips_prompt(dish: &str) -> String {
    format!(
        "{CHEF_PERSONA}\n\n\
         '{dish}'를 더 맛있게 만드는 구체적이고 실용적인 조리 팁 3개를 JSON 문자열 배열로 출력하세요.\n\
         예: [\"팁1\", \"팁2\", \"팁3\"]"
    )
}

fn substitute_prompt(dish: &str, target: &str, named: &str, message: &str) -> String {
    format!(
        "당신은 프로 요리사입니다.\n\
         사용자 원문: {message}\n\
         요리: '{dish}'\n\
         대체 대상 재료: '{target}'\n\n\
         - JSON만 출력하세요. 인사말, 설명, 추가 제안은 금지합니다.\n\
         - substituteName이 비어 있지 않으면 substitutes에 1개만 넣고 method_adjustment 한 줄만 채우세요.\n\
         - substituteName이 비어 있으면 substitutes에 정확히 3개를 넣고 name, amount, method_adjustment를 채우세요.\n\
         {{\"ingredient\": \"{target}\", \"substituteName\": \"{named}\", \"substitutes\": [{{\"name\": \"대체재\", \"amount\": \"1:1\", \"method_adjustment\": \"조리법 조정\"}}]}}"
    )
}

fn necessity_prompt(dish: &str, target: &str) -> String {
    format!(
        "당신은 프로 요리사입니다.\n\
         요리: '{dish}'\n\
         재료: '{target}'\n\
         '{target}'을(를) 빼고 만들어도 되는지 답하세요.\n\
         JSON으로만 출력하고 possible(불리언), flavor_change(한 줄)만 포함하세요.\n\
         예: {{\"possible\": true, \"flavor_change\": \"감칠맛이 약간 줄어듭니다\"}}"
    )
}

fn category_prompt(profile: &CuisineProfile, avoid: &[String]) -> String {
    let avoid = avoid.join(", ");
    if profile.key == "한식" {
        format!(
            "당신은 {chef} 셰프입니다.\n\
             집에서 15~40분 안에 만들 수 있는 한식 가정식 5개를 JSON 문자열 배열로만 출력하세요(요리명만).\n\
             예: [\"김치찌개\", \"된장찌개\", \"불고기\", \"비빔밥\", \"잡채\"]\n\
             다음 목록과 겹치지 않게 제안하세요: {avoid}",
            chef = profile.chef,
        )
    } else {
        format!(
            "당신은 {chef} 셰프입니다.\n\
             요청 카테고리: {key}\n\
             구하기 쉬운 재료로 집에서 15~40분 안에 만들 수 있는 {key} 요리 5개를 추천하세요.\n\
             모든 출력은 한국어로, 요리명은 한국어 표기를 우선하고 필요하면 괄호에 원어를 쓰세요.\n\
             다음 목록과 겹치지 않게 제안하세요: {avoid}\n\
             [{{\"name\": \"요리명\", \"description\": \"한 줄 설명\"}}]",
            chef = profile.chef,
            key = profile.key,
        )
    }
}

fn dishes_prompt(message: &str, known: &[String]) -> String {
    let known = if known.is_empty() {
        String::new()
    } else {
        format!("\n이미 알려준 재료: {}", known.join(", "))
    };
    format!(
        "당신은 한식 전문가입니다. 사용자가 가진 재료로 만들 수 있는 한식 요리를 추천하세요.\n\
         사용자 메시지: \"{message}\"{known}\n\n\
         1. 메시지에서 재료를 추출하세요. 재료가 불분명하면 빈 배열을 쓰세요.\n\
         2. 그 재료를 주재료로 쓰는 한식 3가지를 고르고 한 줄로 소개하세요.\n\
         JSON으로만 응답하세요:\n\
         {{\"ingredients\": [\"재료1\"], \"dishes\": [{{\"name\": \"요리명\", \"description\": \"한 줄 소개\"}}]}}"
    )
}

fn styled_dishes_prompt(
    profile: &CuisineProfile,
    known: &[String],
    message: &str,
    avoid: &[String],
) -> String {
    format!(
        "당신은 {key} 요리 전문가입니다({chef} 스타일).\n\
         기존 재료: {ingredients}\n\
         사용자 메시지: \"{message}\"\n\n\
         - 기존 재료를 주재료로 쓰는 {key} 요리 3가지를 추천하세요.\n\
         - 모든 출력은 한국어로 작성하세요.\n\
         - 다음 목록과 이름이 겹치거나 같은 계열인 요리는 제외하세요: {avoid}\n\
         JSON으로만 응답하세요:\n\
         {{\"style\": \"{key}\", \"dishes\": [{{\"name\": \"요리명\", \"description\": \"한 줄 소개\"}}]}}",
        key = profile.key,
        chef = profile.chef,
        ingredients = known.join(", "),
        avoid = avoid.join(", "),
    )
}
