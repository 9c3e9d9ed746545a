//! Memory-driven follow-up resolution.
//!
//! Short replies such as "다른 거", "이탈리아식으로" or "그거 레시피" only make
//! sense against what earlier turns established. These are resolved here,
//! before the completion service is asked to route.

use serde_json::Value;
use sous_core::Timestamp;

use crate::capability::{Capability, CapabilityRequest};
use crate::extractor::mentions_pronoun;
use crate::memory::ConversationMemory;
use crate::router::{RouteOrigin, RoutePlan};
use crate::vocabulary::{
    contains_any, infer_cuisine, NON_STYLE_HINTS, OTHER_REQUEST_KEYWORDS, STYLE_KEYWORDS,
};

/// Capabilities after which a bare style mention re-styles the recommendation.
const STYLE_FOLLOWUP_AFTER: &[Capability] = &[
    Capability::IngredientsToDishes,
    Capability::Recipe,
    Capability::Ingredients,
];

/// Resolves follow-ups from conversation memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FollowUpResolver;

impl FollowUpResolver {
    /// A plan for a memory-driven follow-up, or `None` to fall through to
    /// the router.
    ///
    /// Checked in order:
    /// - "something else" with a remembered style and a valid ingredient cache
    /// - "something else" with a valid ingredient cache and no style
    /// - a bare style mention right after an ingredient or recipe answer
    /// - "something else" with only a remembered style
    pub fn resolve(
        &self,
        utterance: &str,
        memory: &ConversationMemory,
        now: Timestamp,
    ) -> Option<RoutePlan> {
        let wants_other = contains_any(utterance, OTHER_REQUEST_KEYWORDS);
        let style = memory.active_style_at(now);
        let ingredients = memory.valid_ingredients_at(now);

        match (wants_other, style, ingredients) {
            (true, Some(style), Some(ingredients)) => {
                tracing::debug!(style = %style, "Follow-up: other in same style");
                Some(Self::restyle(ingredients, Some(style)))
            }
            (true, None, Some(ingredients)) => {
                tracing::debug!("Follow-up: other from cached ingredients");
                Some(Self::restyle(ingredients, None))
            }
            (_, remembered, Some(ingredients)) if self.is_style_followup(utterance, memory) => {
                let style = infer_cuisine(utterance).map(|p| p.key).or(remembered);
                tracing::debug!(style = ?style, "Follow-up: style only");
                let mut plan = Self::restyle(ingredients, style);
                // Without a style the handler asks for one instead of guessing
                plan.requests[0].set_default_arg("require_style", true);
                Some(plan)
            }
            (true, Some(style), None) => {
                tracing::debug!(style = %style, "Follow-up: other in remembered style");
                Some(RoutePlan::single(
                    CapabilityRequest::new(Capability::CategoryRecommend).with_arg("style", style),
                    RouteOrigin::FollowUp,
                ))
            }
            _ => None,
        }
    }

    /// A style keyword with no other request hint, following an answer that
    /// was about ingredients or a recipe.
    pub fn is_style_followup(&self, utterance: &str, memory: &ConversationMemory) -> bool {
        contains_any(utterance, STYLE_KEYWORDS)
            && !contains_any(utterance, NON_STYLE_HINTS)
            && memory
                .last_capability()
                .is_some_and(|c| STYLE_FOLLOWUP_AFTER.contains(&c))
    }

    /// The dish a pronoun refers to, if the utterance uses one.
    pub fn resolve_pronoun<'a>(
        &self,
        utterance: &str,
        memory: &'a ConversationMemory,
    ) -> Option<&'a str> {
        if mentions_pronoun(utterance) {
            memory.last_dish()
        } else {
            None
        }
    }

    fn restyle(ingredients: &[String], style: Option<&str>) -> RoutePlan {
        let mut request = CapabilityRequest::new(Capability::IngredientsToDishes).with_arg(
            "ingredients",
            Value::from(ingredients.to_vec()),
        );
        if let Some(style) = style {
            request = request.with_arg("style", style);
        }
        RoutePlan::single(request, RouteOrigin::FollowUp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sous_core::MemoryConfig;

    const NOW: Timestamp = Timestamp(50_000);

    fn memory() -> ConversationMemory {
        let mut mem = ConversationMemory::new(MemoryConfig::default());
        mem.begin_turn();
        mem
    }

    fn with_ingredients(mem: &mut ConversationMemory) {
        mem.remember_ingredients_at(vec!["두부".to_string(), "애호박".to_string()], NOW);
    }

    #[test]
    fn test_other_in_same_style() {
        let mut mem = memory();
        with_ingredients(&mut mem);
        mem.remember_style_at("이탈리아식", NOW);
        let plan = FollowUpResolver.resolve("다른 거 없어?", &mem, NOW).unwrap();
        assert_eq!(plan.origin, RouteOrigin::FollowUp);
        let req = &plan.requests[0];
        assert_eq!(req.capability, Capability::IngredientsToDishes);
        assert_eq!(req.arg_str("style"), Some("이탈리아식"));
        assert_eq!(req.arg_strings("ingredients"), vec!["두부", "애호박"]);
    }

    #[test]
    fn test_other_without_style_reuses_ingredients() {
        let mut mem = memory();
        with_ingredients(&mut mem);
        let plan = FollowUpResolver.resolve("또 추천해줘", &mem, NOW).unwrap();
        let req = &plan.requests[0];
        assert_eq!(req.capability, Capability::IngredientsToDishes);
        assert_eq!(req.arg_str("style"), None);
    }

    #[test]
    fn test_style_only_followup() {
        let mut mem = memory();
        with_ingredients(&mut mem);
        mem.set_last_capability(Some(Capability::IngredientsToDishes));
        let plan = FollowUpResolver.resolve("프랑스식으로", &mem, NOW).unwrap();
        assert_eq!(plan.requests[0].arg_str("style"), Some("프랑스식"));
        assert_eq!(plan.requests[0].arguments["require_style"], true);
    }

    #[test]
    fn test_style_with_non_style_hint_falls_through() {
        let mut mem = memory();
        with_ingredients(&mut mem);
        mem.set_last_capability(Some(Capability::IngredientsToDishes));
        assert!(FollowUpResolver
            .resolve("프랑스식 레시피 알려줘", &mem, NOW)
            .is_none());
    }

    #[test]
    fn test_style_after_unrelated_answer_falls_through() {
        let mut mem = memory();
        with_ingredients(&mut mem);
        mem.set_last_capability(Some(Capability::Tips));
        assert!(FollowUpResolver.resolve("일식", &mem, NOW).is_none());
    }

    #[test]
    fn test_other_with_only_style_recommends_category() {
        let mut mem = memory();
        mem.remember_style_at("중식", NOW);
        let plan = FollowUpResolver.resolve("다른 메뉴", &mem, NOW).unwrap();
        let req = &plan.requests[0];
        assert_eq!(req.capability, Capability::CategoryRecommend);
        assert_eq!(req.arg_str("style"), Some("중식"));
    }

    #[test]
    fn test_expired_cache_and_style_fall_through() {
        let mut mem = memory();
        with_ingredients(&mut mem);
        mem.remember_style_at("중식", NOW);
        let later = Timestamp(NOW.0 + 301);
        assert!(FollowUpResolver.resolve("다른 거", &mem, later).is_none());
    }

    #[test]
    fn test_plain_utterance_falls_through() {
        let mut mem = memory();
        with_ingredients(&mut mem);
        assert!(FollowUpResolver.resolve("김치찌개 레시피", &mem, NOW).is_none());
    }

    #[test]
    fn test_resolve_pronoun() {
        let mut mem = memory();
        assert_eq!(FollowUpResolver.resolve_pronoun("그거 재료", &mem), None);
        mem.remember_dish("된장찌개");
        assert_eq!(
            FollowUpResolver.resolve_pronoun("그거 재료", &mem),
            Some("된장찌개")
        );
        assert_eq!(FollowUpResolver.resolve_pronoun("잡채 재료", &mem), None);
    }
}
