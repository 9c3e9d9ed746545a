//! Capability routing.
//!
//! Decides which capabilities answer an utterance. Unambiguous cases are
//! caught by pattern pre-filters (external video links); everything else is
//! delegated to the completion service, which answers with a JSON plan.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value};

use crate::capability::{Capability, CapabilityRequest};
use crate::completion::CompletionService;
use crate::error::ChatError;
use crate::structured::extract_structured;

static VIDEO_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:https?://)?(?:www\.|m\.)?(?:youtube\.com/(?:watch\?v=|embed/|shorts/|playlist\?list=)|youtu\.be/)[A-Za-z0-9_\-]+(?:[?&][A-Za-z0-9_\-]+=[A-Za-z0-9_\-%.]*)*",
    )
    .expect("Invalid video link regex")
});

/// Text sent to the completion service in place of an attached image.
pub const SIDE_CHANNEL_MARKER: &str = "[첨부 이미지 있음]";

/// Text sent to the completion service in place of a video link.
pub const VIDEO_LINK_MARKER: &str = "[영상 링크]";

/// Labels that mean "no capability applies".
const NO_CAPABILITY_LABELS: &[&str] = &["none", "other", "null", ""];

// =============================================================================
// RoutePlan
// =============================================================================

/// How a plan was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOrigin {
    /// A numeric pick from the last suggestion list.
    Selection,
    /// Resolved from conversation memory without a completion call.
    FollowUp,
    /// An external video link in the utterance.
    VideoLink,
    /// The completion service's selection.
    Completion,
}

/// Ordered capability requests for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePlan {
    pub requests: Vec<CapabilityRequest>,
    /// How many dishes the user asked about.
    pub requested_items: usize,
    pub origin: RouteOrigin,
}

impl RoutePlan {
    pub fn single(request: CapabilityRequest, origin: RouteOrigin) -> Self {
        Self {
            requests: vec![request],
            requested_items: 1,
            origin,
        }
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.requests.iter().map(|r| r.capability).collect()
    }
}

// =============================================================================
// IntentRouter
// =============================================================================

/// Completion-backed capability selector.
pub struct IntentRouter {
    completion: Arc<dyn CompletionService>,
}

impl IntentRouter {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Pick capabilities for `utterance`.
    ///
    /// `None` means nothing applies (or the completion service failed); the
    /// caller answers with a clarifying prompt. A video link always yields a
    /// `video_recipe` request; any other text in the same message is still
    /// routed so compound requests fan out. With a side channel the plan
    /// always contains a capability that consumes it.
    pub async fn route(&self, utterance: &str, has_side_channel: bool) -> Option<RoutePlan> {
        let video = find_video_link(utterance);
        let mut requests = Vec::new();
        let mut origin = RouteOrigin::Completion;

        let remainder = match &video {
            Some(url) => {
                tracing::info!(url = %url, "Video link pre-filter matched");
                requests.push(
                    CapabilityRequest::new(Capability::VideoRecipe).with_arg("url", url.as_str()),
                );
                origin = RouteOrigin::VideoLink;
                utterance.replacen(url.as_str(), VIDEO_LINK_MARKER, 1)
            }
            None => utterance.to_string(),
        };

        let has_other_text = !remainder.replace(VIDEO_LINK_MARKER, "").trim().is_empty();
        let mut requested_count = None;
        if video.is_none() || has_other_text || has_side_channel {
            let (selected, count) = self.select(&remainder, has_side_channel).await;
            requested_count = count;
            let before = requests.len();
            requests.extend(
                selected
                    .into_iter()
                    .filter(|r| video.is_none() || r.capability != Capability::VideoRecipe),
            );
            if video.is_some() && requests.len() > before {
                origin = RouteOrigin::Completion;
            }
        }

        if has_side_channel && !requests.iter().any(|r| r.capability.accepts_side_channel()) {
            tracing::debug!("Forcing product search for attached image");
            requests.push(
                CapabilityRequest::new(Capability::ProductSearch).with_arg("query", utterance),
            );
        }

        if requests.is_empty() {
            tracing::info!("{}", ChatError::NoCapabilitySelected);
            return None;
        }

        let video_count = usize::from(video.is_some());
        let requested_items = match requested_count {
            Some(n) => n + video_count,
            None => requests.iter().filter(|r| r.capability.yields_recipe()).count(),
        }
        .max(1);
        tracing::info!(
            capabilities = ?requests.iter().map(|r| r.capability).collect::<Vec<_>>(),
            requested_items,
            "Routed utterance"
        );
        Some(RoutePlan {
            requests,
            requested_items,
            origin,
        })
    }

    /// Ask the completion service for a plan. Failures yield an empty plan.
    async fn select(
        &self,
        utterance: &str,
        has_side_channel: bool,
    ) -> (Vec<CapabilityRequest>, Option<usize>) {
        let prompt = selection_prompt(utterance, has_side_channel);
        match self.completion.complete_json(&prompt).await {
            Ok(text) => parse_selection(&text).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Capability selection unreadable");
                (Vec::new(), None)
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Capability selection call failed");
                (Vec::new(), None)
            }
        }
    }
}

/// First external video link in the utterance.
pub fn find_video_link(utterance: &str) -> Option<String> {
    VIDEO_LINK.find(utterance).map(|m| m.as_str().to_string())
}

fn selection_prompt(utterance: &str, has_side_channel: bool) -> String {
    let attachment = if has_side_channel {
        format!("\n첨부: {}", SIDE_CHANNEL_MARKER)
    } else {
        String::new()
    };
    format!(
        "당신은 요리 어시스턴트의 라우터입니다. 사용자 메시지에 답할 기능을 고르세요.\n\
         \n\
         기능 목록:\n\
         - recipe: 특정 요리의 레시피 (arguments: dish)\n\
         - ingredients: 특정 요리의 재료 (arguments: dish)\n\
         - tips: 특정 요리의 조리 팁 (arguments: dish)\n\
         - substitute: 재료 대체 (arguments: dish, ingredient)\n\
         - necessity: 재료를 빼도 되는지 (arguments: dish, ingredient)\n\
         - category_recommend: 요리 스타일/카테고리 추천 (arguments: style)\n\
         - ingredients_to_dishes: 가진 재료로 요리 추천 (arguments: ingredients)\n\
         - product_search: 식재료 상품 검색 (arguments: query)\n\
         - none: 요리와 무관한 질문\n\
         \n\
         여러 요리를 물으면 요리마다 요청을 하나씩 만드세요.\n\
         {}는 이미 처리되므로 영상 외의 요청만 고르고, requested_count에서도 제외하세요.\n\
         \n\
         사용자 메시지: \"{}\"{}\n\
         \n\
         JSON으로만 응답하세요:\n\
         {{\"requests\": [{{\"capability\": \"recipe\", \"arguments\": {{\"dish\": \"요리명\"}}}}], \"requested_count\": 1}}",
        VIDEO_LINK_MARKER, utterance, attachment
    )
}

/// Parse a selection answer into requests plus the optional requested count.
///
/// Accepts `{"requests": [...]}`, a bare `{"capability": ...}` object, or an
/// `{"intent": "RECIPE"}` label. Unknown capability names are skipped.
fn parse_selection(text: &str) -> Result<(Vec<CapabilityRequest>, Option<usize>), ChatError> {
    let value = extract_structured(text)?;
    let requested_count = value
        .get("requested_count")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok());

    let entries: Vec<&Value> = match (&value, value.get("requests")) {
        (_, Some(Value::Array(items))) => items.iter().collect(),
        (Value::Array(items), None) => items.iter().collect(),
        (Value::Object(_), None) => vec![&value],
        _ => {
            return Err(ChatError::MalformedCompletion(
                "selection is neither an object nor a list".to_string(),
            ))
        }
    };

    let requests = entries.into_iter().filter_map(parse_request).collect();
    Ok((requests, requested_count))
}

fn parse_request(entry: &Value) -> Option<CapabilityRequest> {
    let label = entry
        .get("capability")
        .or_else(|| entry.get("intent"))
        .and_then(Value::as_str)?;
    if NO_CAPABILITY_LABELS.contains(&label.trim().to_lowercase().as_str()) {
        return None;
    }
    let capability = match label.parse::<Capability>() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping unknown capability in selection");
            return None;
        }
    };
    let arguments = entry
        .get("arguments")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new);
    Some(CapabilityRequest {
        capability,
        arguments,
    })
}

// =============================================================================
// Tests
// =============================================================================
