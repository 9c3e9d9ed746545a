//! Chat orchestrator: the per-turn state machine.
//!
//! Every utterance runs through the same sequence against its session's
//! memory:
//!
//! 1. SELECT: a numeric pick ("2번") against the open suggestion list jumps
//!    straight to a recipe for the chosen dish.
//! 2. ROUTE: start-over phrases clear caches, memory-driven follow-ups are
//!    resolved, everything else goes to the [`IntentRouter`].
//! 3. INJECT: the attached image is merged into capabilities that accept it.
//! 4. INVOKE: planned capabilities run concurrently, each under a timeout; a
//!    failed branch never aborts its siblings.
//! 5. FORMAT: the [`ResponseFormatter`] builds the envelope and the memory
//!    is updated from it.
//!
//! Sessions are keyed by the transport-supplied id. Turns on one session are
//! serialized by the session's own lock; different sessions never share
//! state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use futures::future::join_all;
use serde::Serialize;
use sous_core::{ChatConfig, ChatRequest, ReplyEnvelope, SousConfig, Timestamp};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::capability::{Capability, CapabilityRegistry, CapabilityRequest};
use crate::completion::{CompletionService, HttpCompletionClient};
use crate::error::ChatError;
use crate::extractor::{
    extract_explicit_substitute, extract_target_ingredient, DishExtractor, ModelExtractor,
};
use crate::followup::FollowUpResolver;
use crate::formatter::{
    CapabilityResult, FormatContext, MemoryUpdate, ResponseFormatter, APOLOGY_REPLY, CLARIFY_REPLY,
};
use crate::handlers::default_registry;
use crate::memory::{ConversationMemory, ConversationSession, SessionManager};
use crate::router::{IntentRouter, RouteOrigin, RoutePlan};
use crate::selection::{Selection, SelectionResolver};

type SharedSession = Arc<AsyncMutex<ConversationSession>>;

/// Summary of a session for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSessionSummary {
    pub id: Uuid,
    pub started_at: String,
    pub last_message_at: String,
    pub message_count: u32,
}

/// Central coordinator of the dialogue engine.
pub struct ChatOrchestrator {
    config: ChatConfig,
    session_manager: SessionManager,
    selection: SelectionResolver,
    follow_up: FollowUpResolver,
    router: IntentRouter,
    extractor: Arc<dyn DishExtractor>,
    registry: CapabilityRegistry,
    formatter: ResponseFormatter,
    capability_timeout: Duration,
    sessions: Mutex<HashMap<Uuid, SharedSession>>,
}

impl ChatOrchestrator {
    /// Assemble an orchestrator from explicit collaborators.
    pub fn new(
        config: &SousConfig,
        registry: CapabilityRegistry,
        completion: Arc<dyn CompletionService>,
        extractor: Arc<dyn DishExtractor>,
    ) -> Self {
        Self {
            config: config.chat.clone(),
            session_manager: SessionManager::new(
                config.chat.session_timeout_minutes,
                config.memory.clone(),
            ),
            selection: SelectionResolver,
            follow_up: FollowUpResolver,
            router: IntentRouter::new(completion),
            extractor,
            registry,
            formatter: ResponseFormatter::new(),
            capability_timeout: Duration::from_secs(config.capabilities.timeout_secs),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Wire the HTTP completion client, the default handlers and the
    /// completion-backed dish extractor.
    pub fn from_config(config: &SousConfig) -> Result<Self, ChatError> {
        let completion: Arc<dyn CompletionService> =
            Arc::new(HttpCompletionClient::from_config(&config.completion)?);
        let registry = default_registry(&config.capabilities, completion.clone())?;
        let extractor = Arc::new(ModelExtractor::new(completion.clone()));
        Ok(Self::new(config, registry, completion, extractor))
    }

    /// Override the per-capability timeout.
    pub fn with_capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = timeout;
        self
    }

    /// Handle an incoming chat message.
    ///
    /// Returns the reply and the session id (new or existing). Only request
    /// validation errors are returned; every other failure degrades to a chat
    /// reply.
    pub async fn handle_message(
        &self,
        request: ChatRequest,
    ) -> Result<(ReplyEnvelope, Uuid), ChatError> {
        self.validate(&request.message)?;

        let (sid, shared) = self.resolve_session(request.session_id)?;
        let mut session = shared.lock().await;

        session.pending_image = request.image.filter(|i| !i.trim().is_empty());
        let envelope = self.run_turn(&mut session, request.message.trim()).await;
        session.pending_image = None;
        self.session_manager.touch(&mut session);

        tracing::info!(
            session_id = %sid,
            chat_type = %envelope.chat_type,
            recipes = envelope.recipes.len(),
            "Reply ready"
        );
        Ok((envelope, sid))
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Snapshot of a session.
    pub async fn get_session(&self, session_id: Uuid) -> Option<ConversationSession> {
        let shared = self.sessions.lock().ok()?.get(&session_id).cloned()?;
        let session = shared.lock().await;
        Some(session.clone())
    }

    /// All live sessions as summaries.
    pub async fn list_sessions(&self) -> Vec<ChatSessionSummary> {
        let shared: Vec<SharedSession> = match self.sessions.lock() {
            Ok(s) => s.values().cloned().collect(),
            Err(_) => return vec![],
        };
        let mut summaries = Vec::with_capacity(shared.len());
        for session in shared {
            let s = session.lock().await;
            summaries.push(ChatSessionSummary {
                id: s.id,
                started_at: format_epoch(s.started_at.0),
                last_message_at: format_epoch(s.last_message_at.0),
                message_count: s.message_count,
            });
        }
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        summaries
    }

    pub fn delete_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| ChatError::SessionStore(format!("session lock poisoned: {}", e)))?;
        if sessions.remove(&session_id).is_some() {
            tracing::info!(session_id = %session_id, "Session deleted");
            Ok(())
        } else {
            Err(ChatError::SessionNotFound(session_id))
        }
    }

    fn validate(&self, message: &str) -> Result<(), ChatError> {
        if !self.config.enabled {
            return Err(ChatError::Disabled);
        }
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.chars().count() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }
        Ok(())
    }

    /// Reuse a live session or create a new one.
    fn resolve_session(&self, requested: Option<Uuid>) -> Result<(Uuid, SharedSession), ChatError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| ChatError::SessionStore(format!("session lock poisoned: {}", e)))?;

        if let Some(sid) = requested {
            if let Some(existing) = sessions.get(&sid) {
                // A session busy with another turn is live by definition
                let expired = existing
                    .try_lock()
                    .map(|s| self.session_manager.is_expired(&s))
                    .unwrap_or(false);
                if !expired {
                    return Ok((sid, existing.clone()));
                }
                tracing::info!(session_id = %sid, "Session expired");
                sessions.remove(&sid);
            }
        }

        self.prune_expired(&mut sessions);
        let session = self.session_manager.create_session();
        let sid = session.id;
        let shared = Arc::new(AsyncMutex::new(session));
        sessions.insert(sid, shared.clone());
        tracing::info!(session_id = %sid, "Session created");
        Ok((sid, shared))
    }

    /// Drop expired sessions. Sessions mid-turn are skipped.
    fn prune_expired(&self, sessions: &mut HashMap<Uuid, SharedSession>) {
        let before = sessions.len();
        sessions.retain(|_, shared| match shared.try_lock() {
            Ok(session) => !self.session_manager.is_expired(&session),
            Err(_) => true,
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::info!(pruned, remaining = sessions.len(), "Expired sessions dropped");
        }
    }

    // =========================================================================
    // Turn
    // =========================================================================

    async fn run_turn(&self, session: &mut ConversationSession, utterance: &str) -> ReplyEnvelope {
        let now = Timestamp::now();
        let turn = session.memory.begin_turn();
        tracing::debug!(session_id = %session.id, turn, "Turn started");

        // SELECT
        if let Some(selection) = self.selection.resolve(utterance, &mut session.memory, now) {
            let plan = selection_plan(&selection, utterance);
            let prefix = selection.is_multi().then(|| multi_pick_notice(&selection.remaining));
            return self.execute(session, plan, prefix, now).await;
        }

        // ROUTE
        if session.memory.invalidate_on_new_topic(utterance) {
            tracing::info!(session_id = %session.id, "Start-over phrase, caches cleared");
        }
        let has_image = session.pending_image.is_some();
        let follow_up = if has_image {
            None
        } else {
            self.follow_up.resolve(utterance, &session.memory, now)
        };
        let plan = match follow_up {
            Some(plan) => Some(plan),
            None => self.router.route(utterance, has_image).await,
        };
        let Some(mut plan) = plan else {
            session.memory.set_last_capability(None);
            return ReplyEnvelope::chat(CLARIFY_REPLY);
        };
        self.enrich(&mut plan, utterance, &session.memory, now).await;

        // INJECT
        inject_side_channel(&mut plan, session);

        self.execute(session, plan, None, now).await
    }

    /// INVOKE and FORMAT, then fold the reply back into memory.
    async fn execute(
        &self,
        session: &mut ConversationSession,
        plan: RoutePlan,
        prefix: Option<String>,
        now: Timestamp,
    ) -> ReplyEnvelope {
        tracing::info!(
            session_id = %session.id,
            origin = ?plan.origin,
            capabilities = ?plan.capabilities(),
            "Invoking capabilities"
        );
        let results = self.invoke_all(&plan).await;
        if results.is_empty() {
            tracing::warn!(session_id = %session.id, "Every capability branch failed");
            session.memory.set_last_capability(None);
            return ReplyEnvelope::chat(APOLOGY_REPLY);
        }

        let outcome = {
            let ctx = FormatContext {
                avoid: session.memory.shown_names(),
                requested_items: plan.requested_items,
                prefix,
            };
            self.formatter.format(&results, &ctx)
        };

        apply_memory_update(&mut session.memory, outcome.memory, now);
        session
            .memory
            .set_last_capability(results.first().map(|r| r.capability));
        outcome.envelope
    }

    async fn invoke_all(&self, plan: &RoutePlan) -> Vec<CapabilityResult> {
        let branches = plan.requests.iter().map(|request| self.invoke_one(request));
        join_all(branches).await.into_iter().flatten().collect()
    }

    async fn invoke_one(&self, request: &CapabilityRequest) -> Option<CapabilityResult> {
        let capability = request.capability;
        let handler = match self.registry.get(capability) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::warn!(capability = %capability, error = %e, "Capability skipped");
                return None;
            }
        };

        match tokio::time::timeout(self.capability_timeout, handler.invoke(request)).await {
            Ok(Ok(output)) => {
                tracing::debug!(capability = %capability, "Capability succeeded");
                Some(CapabilityResult::new(capability, output))
            }
            Ok(Err(e)) => {
                tracing::warn!(capability = %capability, error = %e, "Capability failed");
                None
            }
            Err(_) => {
                let e = ChatError::UpstreamTimeout(format!(
                    "{} exceeded {:?}",
                    capability, self.capability_timeout
                ));
                tracing::warn!(capability = %capability, error = %e, "Capability timed out");
                None
            }
        }
    }

    /// Fill arguments the router left out from the utterance and memory.
    async fn enrich(
        &self,
        plan: &mut RoutePlan,
        utterance: &str,
        memory: &ConversationMemory,
        now: Timestamp,
    ) {
        let avoid = memory.shown_names().to_vec();
        let inventory: Vec<String> = memory
            .valid_ingredients_at(now)
            .map(<[String]>::to_vec)
            .unwrap_or_default();

        for request in &mut plan.requests {
            request.set_default_arg("message", utterance);
            let capability = request.capability;

            if capability.targets_dish() && request.arg_str("dish").is_none() {
                if let Some(dish) = self.resolve_dish(utterance, memory).await {
                    request.set_default_arg("dish", dish);
                }
            }

            match capability {
                Capability::Substitute | Capability::Necessity => {
                    if let Some(target) = extract_target_ingredient(utterance, &inventory) {
                        request.set_default_arg("ingredient", target);
                    }
                    if capability == Capability::Substitute {
                        if let Some(named) = extract_explicit_substitute(utterance) {
                            request.set_default_arg("substitute", named);
                        }
                    }
                }
                Capability::CategoryRecommend | Capability::IngredientsToDishes => {
                    if !avoid.is_empty() {
                        request.set_default_arg("avoid", avoid.clone());
                    }
                }
                Capability::ProductSearch => request.set_default_arg("query", utterance),
                _ => {}
            }
        }
    }

    /// Pronoun first, then the extractor, then the last dish discussed.
    async fn resolve_dish(&self, utterance: &str, memory: &ConversationMemory) -> Option<String> {
        if let Some(dish) = self.follow_up.resolve_pronoun(utterance, memory) {
            return Some(dish.to_string());
        }
        if let Some(dish) = self.extractor.extract_dish(utterance).await {
            return Some(dish);
        }
        memory.last_dish().map(str::to_string)
    }
}

fn selection_plan(selection: &Selection, utterance: &str) -> RoutePlan {
    let request = CapabilityRequest::new(Capability::Recipe)
        .with_arg("dish", selection.chosen.as_str())
        .with_arg("message", utterance);
    RoutePlan::single(request, RouteOrigin::Selection)
}

fn multi_pick_notice(remaining: &[String]) -> String {
    format!(
        "여러 개를 선택하셨네요. 먼저 1개 레시피부터 안내드릴게요. 나머지 요리({})도 원하시면 요리명을 말씀해주세요.",
        remaining.join(", ")
    )
}

/// Hand the attached image to capabilities that accept it. The image is
/// taken either way; it never outlives its turn.
fn inject_side_channel(plan: &mut RoutePlan, session: &mut ConversationSession) {
    let Some(image) = session.pending_image.take() else {
        return;
    };
    let mut consumed = false;
    for request in plan
        .requests
        .iter_mut()
        .filter(|r| r.capability.accepts_side_channel())
    {
        request.set_default_arg("image", image.as_str());
        consumed = true;
    }
    if !consumed {
        tracing::debug!(session_id = %session.id, "Attached image not used by any capability");
    }
}

fn apply_memory_update(memory: &mut ConversationMemory, update: MemoryUpdate, now: Timestamp) {
    if update.clear_suggestions {
        memory.clear_suggestions();
    }
    if let Some((names, style)) = update.suggestions {
        memory.remember_suggestions_at(names, style, now);
    }
    if let Some(dish) = update.dish {
        memory.remember_dish(&dish);
    }
    if !update.ingredients.is_empty() {
        memory.remember_ingredients_at(update.ingredients, now);
    }
    if let Some(style) = update.style {
        memory.remember_style_at(&style, now);
    }
}

/// Format epoch seconds as RFC 3339.
fn format_epoch(epoch: i64) -> String {
    Local
        .timestamp_opt(epoch, 0)
        .single()
        .map(|dt: DateTime<Local>| dt.to_rfc3339())
        .unwrap_or_else(|| epoch.to_string())
}

// =============================================================================
// Tests
// =============================================================================
