//! Dish and ingredient extraction from utterances.
//!
//! [`PatternExtractor`] finds dish names with regexes ("김치찌개 레시피",
//! "된장찌개 만드는 법"); [`ModelExtractor`] asks the completion service and
//! falls back to the patterns. Ingredient helpers map a mentioned ingredient
//! onto the cached inventory by token overlap.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::completion::CompletionService;
use crate::structured::extract_structured;
use crate::vocabulary::PRONOUNS;

// =============================================================================
// Compiled regex sets
// =============================================================================

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("Invalid parenthesis regex"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static DISH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"([가-힣A-Za-z\s]{2,30})\s+(?:레시피|만드는\s*법|조리법|팁)",
        r"([가-힣A-Za-z\s]{2,30})\s+재료",
        r"([가-힣]+)\s+레시피",
        r"([가-힣]+)\s+만드는\s+법",
        r"([가-힣]+)\s+조리법",
        r"([가-힣]+)\s+팁",
        r"([가-힣]+)\s+재료",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid dish regex"))
    .collect()
});

static QUANTITY_WITH_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]+\s*[gGkKmMlL컵tspTB]+").expect("Invalid quantity regex")
});

static NUMERIC_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9.,/%]+").expect("Invalid numeric regex"));

static WORD_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[가-힣A-Za-z]+").expect("Invalid token regex"));

static TARGET_INGREDIENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"([가-힣A-Za-z]+)\s*대신",
        r"([가-힣A-Za-z]+)\s*없으면",
        r"([가-힣A-Za-z]+)\s*대체",
        r"([가-힣A-Za-z]+)\s*못\s*먹",
        r"([가-힣A-Za-z]+)\s*빼고",
        r"([가-힣A-Za-z]+)\s*말고",
        r"([가-힣A-Za-z]+)\s*빼도\s*돼",
        r"([가-힣A-Za-z]+)\s*생략\s*해도\s*돼",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid target ingredient regex"))
    .collect()
});

static EXPLICIT_SUBSTITUTE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[가-힣A-Za-z]+\s*(?:말고|대신|빼고)\s*([가-힣A-Za-z]+)",
        r"\?\s*([가-힣A-Za-z]+)\s*써도\s*돼",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid substitute regex"))
    .collect()
});

/// Names must be strictly between these character counts.
const MIN_NAME_CHARS: usize = 1;
const MAX_NAME_CHARS: usize = 30;

fn plausible_name(name: &str) -> bool {
    let n = name.chars().count();
    n > MIN_NAME_CHARS && n < MAX_NAME_CHARS
}

// =============================================================================
// DishExtractor
// =============================================================================

/// Finds the dish an utterance is about.
#[async_trait]
pub trait DishExtractor: Send + Sync {
    async fn extract_dish(&self, utterance: &str) -> Option<String>;
}

/// Regex-based dish extraction.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternExtractor;

impl PatternExtractor {
    /// Synchronous form of [`DishExtractor::extract_dish`].
    pub fn find_dish(&self, utterance: &str) -> Option<String> {
        let text = PARENTHESIZED.replace_all(utterance, "");
        let text = text.trim();
        DISH_PATTERNS.iter().find_map(|re| {
            let caps = re.captures(text)?;
            let name = WHITESPACE_RUN.replace_all(caps.get(1)?.as_str(), " ");
            let name = name.trim();
            plausible_name(name).then(|| name.to_string())
        })
    }
}

#[async_trait]
impl DishExtractor for PatternExtractor {
    async fn extract_dish(&self, utterance: &str) -> Option<String> {
        self.find_dish(utterance)
    }
}

/// Completion-backed extraction with a pattern fallback.
pub struct ModelExtractor {
    completion: Arc<dyn CompletionService>,
    fallback: PatternExtractor,
}

impl ModelExtractor {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion,
            fallback: PatternExtractor,
        }
    }

    fn prompt(utterance: &str) -> String {
        format!(
            "다음 메시지에서 사용자가 말하는 요리명 하나만 추출하세요.\n\
             요리명이 없으면 빈 문자열을 넣으세요.\n\
             메시지: \"{}\"\n\
             JSON 형식으로만 응답하세요: {{\"dish\": \"요리명\"}}",
            utterance
        )
    }
}

#[async_trait]
impl DishExtractor for ModelExtractor {
    async fn extract_dish(&self, utterance: &str) -> Option<String> {
        let from_model = match self.completion.complete_json(&Self::prompt(utterance)).await {
            Ok(text) => extract_structured(&text).ok().and_then(|v| {
                v.get("dish")
                    .and_then(|d| d.as_str())
                    .map(|d| d.trim().to_string())
                    .filter(|d| plausible_name(d))
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Dish extraction via completion failed");
                None
            }
        };
        from_model.or_else(|| self.fallback.find_dish(utterance))
    }
}

// =============================================================================
// Pronouns
// =============================================================================

/// Whether the utterance refers back to an earlier dish ("그거 레시피").
pub fn mentions_pronoun(utterance: &str) -> bool {
    PRONOUNS.iter().any(|p| utterance.contains(p))
}

// =============================================================================
// Ingredient helpers
// =============================================================================

/// Strip quantities, parenthesized notes and numeric noise from a name.
pub fn normalize_ingredient_name(text: &str) -> String {
    let name = PARENTHESIZED.replace_all(text, "");
    let name = QUANTITY_WITH_UNIT.replace_all(&name, "");
    let name = NUMERIC_NOISE.replace_all(&name, "");
    WHITESPACE_RUN.replace_all(&name, " ").trim().to_string()
}

/// Word tokens of at least two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    WORD_TOKEN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= 2)
        .collect()
}

/// Inventory entry sharing the most token characters with the utterance.
pub fn match_ingredient_from_inventory(utterance: &str, inventory: &[String]) -> Option<String> {
    let message_tokens: HashSet<String> = tokenize(utterance).into_iter().collect();
    if inventory.is_empty() || message_tokens.is_empty() {
        return None;
    }

    let mut best: (usize, Option<&String>) = (0, None);
    for ingredient in inventory {
        let base = normalize_ingredient_name(ingredient);
        if base.is_empty() {
            continue;
        }
        let base_tokens = tokenize(&base);
        if base_tokens.is_empty() {
            continue;
        }
        let matched: usize = base_tokens
            .iter()
            .filter(|t| message_tokens.contains(*t) || utterance.contains(t.as_str()))
            .map(|t| t.chars().count())
            .sum();
        let score = if matched > 0 {
            matched
        } else if utterance.contains(&base) {
            base.chars().count()
        } else {
            0
        };
        if score > best.0 {
            best = (score, Some(ingredient));
        }
    }
    best.1.cloned()
}

/// Inventory entry that best contains (or is contained by) `name`.
pub fn map_to_inventory(name: &str, inventory: &[String]) -> Option<String> {
    let wanted = normalize_ingredient_name(name);
    if wanted.is_empty() {
        return None;
    }
    let wanted_len = wanted.chars().count();

    let mut best: (usize, Option<&String>) = (0, None);
    for ingredient in inventory {
        let base = normalize_ingredient_name(ingredient);
        if base.is_empty() {
            continue;
        }
        let overlap = wanted_len.min(base.chars().count());
        let score = if base.contains(&wanted) || wanted.contains(&base) {
            overlap
        } else if ingredient.contains(&wanted) || name.contains(&base) {
            overlap / 2
        } else {
            0
        };
        if score > best.0 {
            best = (score, Some(ingredient));
        }
    }
    best.1.cloned()
}

/// The ingredient the user wants to replace or drop ("두부 대신", "파 빼도 돼").
pub fn extract_target_ingredient(utterance: &str, inventory: &[String]) -> Option<String> {
    if let Some(found) = match_ingredient_from_inventory(utterance, inventory) {
        return Some(found);
    }
    TARGET_INGREDIENT_PATTERNS.iter().find_map(|re| {
        let raw = re.captures(utterance)?.get(1)?.as_str().trim();
        if !plausible_name(raw) {
            return None;
        }
        Some(map_to_inventory(raw, inventory).unwrap_or_else(|| raw.to_string()))
    })
}

/// The replacement the user proposes ("버터 말고 올리브유").
pub fn extract_explicit_substitute(utterance: &str) -> Option<String> {
    EXPLICIT_SUBSTITUTE_PATTERNS.iter().find_map(|re| {
        let name = re.captures(utterance)?.get(1)?.as_str().trim();
        plausible_name(name).then(|| name.to_string())
    })
}

// =============================================================================
// Tests
// =============================================================================
