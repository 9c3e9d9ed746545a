//! Per-session conversation memory.
//!
//! Holds what the previous turns established (last dish, ingredient list,
//! suggestion list, cuisine style) and decides when each piece is still
//! usable. Every cached entry is valid only while BOTH its wall-clock window
//! and its turn-distance window hold; start-over phrases clear the caches
//! regardless of either window.

use sous_core::{MemoryConfig, Timestamp};
use uuid::Uuid;

use crate::capability::Capability;
use crate::vocabulary::{contains_any, NEW_TOPIC_KEYWORDS};

/// Oldest shown names are forgotten past this many.
const SHOWN_NAMES_LIMIT: usize = 50;

// =============================================================================
// SuggestionList
// =============================================================================

/// A numbered list of dishes shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionList {
    /// Dish names in display order.
    pub items: Vec<String>,
    /// Turn on which the list was shown.
    pub created_turn: u64,
    pub created_at: Timestamp,
    /// Cuisine style the list was generated for, if any.
    pub style: Option<String>,
    /// Set once a numeric pick has been served from this list.
    pub consumed: bool,
}

impl SuggestionList {
    /// 1-based lookup.
    pub fn get(&self, pick: usize) -> Option<&str> {
        pick.checked_sub(1)
            .and_then(|i| self.items.get(i))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// ConversationMemory
// =============================================================================

/// Ephemeral state of one conversation.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    config: MemoryConfig,
    turn_index: u64,
    last_dish: Option<String>,
    last_ingredients: Vec<String>,
    ingredients_turn: u64,
    ingredients_at: Option<Timestamp>,
    last_suggestions: Option<SuggestionList>,
    shown_names: Vec<String>,
    last_style: Option<String>,
    style_at: Option<Timestamp>,
    last_capability: Option<Capability>,
}

impl ConversationMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            turn_index: 0,
            last_dish: None,
            last_ingredients: Vec::new(),
            ingredients_turn: 0,
            ingredients_at: None,
            last_suggestions: None,
            shown_names: Vec::new(),
            last_style: None,
            style_at: None,
            last_capability: None,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Start processing a new utterance. Returns the new turn index.
    pub fn begin_turn(&mut self) -> u64 {
        self.turn_index += 1;
        self.turn_index
    }

    pub fn turn_index(&self) -> u64 {
        self.turn_index
    }

    // ---- Dish ----

    pub fn remember_dish(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            self.last_dish = Some(name.to_string());
        }
    }

    pub fn last_dish(&self) -> Option<&str> {
        self.last_dish.as_deref()
    }

    // ---- Ingredients ----

    /// Cache an ingredient list for this turn. Empty lists are ignored.
    pub fn remember_ingredients(&mut self, list: Vec<String>) {
        self.remember_ingredients_at(list, Timestamp::now());
    }

    pub fn remember_ingredients_at(&mut self, list: Vec<String>, now: Timestamp) {
        let list: Vec<String> = list
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if list.is_empty() {
            return;
        }
        self.last_ingredients = list;
        self.ingredients_turn = self.turn_index;
        self.ingredients_at = Some(now);
    }

    /// The cached list, regardless of validity.
    pub fn last_ingredients(&self) -> &[String] {
        &self.last_ingredients
    }

    pub fn ingredient_cache_valid(&self) -> bool {
        self.ingredient_cache_valid_at(Timestamp::now())
    }

    /// Non-empty, within the TTL and within the ingredient turn window.
    pub fn ingredient_cache_valid_at(&self, now: Timestamp) -> bool {
        if self.last_ingredients.is_empty() {
            return false;
        }
        let Some(at) = self.ingredients_at else {
            return false;
        };
        let time_ok = at.secs_until(now) <= self.config.cache_ttl_secs;
        let turn_ok = self.turn_index.saturating_sub(self.ingredients_turn)
            <= self.config.ingredient_turn_window;
        time_ok && turn_ok
    }

    /// The cached list if it is still valid.
    pub fn valid_ingredients_at(&self, now: Timestamp) -> Option<&[String]> {
        self.ingredient_cache_valid_at(now)
            .then_some(self.last_ingredients.as_slice())
    }

    // ---- Suggestions ----

    /// Cache the list just shown. An empty list clears the cache.
    pub fn remember_suggestions(&mut self, list: Vec<String>, style: Option<String>) {
        self.remember_suggestions_at(list, style, Timestamp::now());
    }

    pub fn remember_suggestions_at(
        &mut self,
        list: Vec<String>,
        style: Option<String>,
        now: Timestamp,
    ) {
        if list.is_empty() {
            self.clear_suggestions();
            return;
        }
        for name in &list {
            if !self.shown_names.contains(name) {
                self.shown_names.push(name.clone());
            }
        }
        let overflow = self.shown_names.len().saturating_sub(SHOWN_NAMES_LIMIT);
        self.shown_names.drain(..overflow);
        self.last_suggestions = Some(SuggestionList {
            items: list,
            created_turn: self.turn_index,
            created_at: now,
            style,
            consumed: false,
        });
    }

    pub fn clear_suggestions(&mut self) {
        self.last_suggestions = None;
    }

    pub fn suggestions(&self) -> Option<&SuggestionList> {
        self.last_suggestions.as_ref()
    }

    /// Names in the current suggestion list, consumed or not.
    pub fn suggested_names(&self) -> &[String] {
        self.last_suggestions
            .as_ref()
            .map(|s| s.items.as_slice())
            .unwrap_or(&[])
    }

    /// Every name suggested in this conversation, oldest first. Survives
    /// start-over phrases and list consumption; used as the dedup avoid set.
    pub fn shown_names(&self) -> &[String] {
        &self.shown_names
    }

    pub fn suggestion_window_open(&self) -> bool {
        self.suggestion_window_open_at(Timestamp::now())
    }

    /// A numeric pick may bind to the cached list.
    pub fn suggestion_window_open_at(&self, now: Timestamp) -> bool {
        let Some(list) = &self.last_suggestions else {
            return false;
        };
        if list.consumed || list.is_empty() {
            return false;
        }
        let time_ok = list.created_at.secs_until(now) <= self.config.cache_ttl_secs;
        let turn_ok = self.turn_index.saturating_sub(list.created_turn)
            <= self.config.selection_turn_window;
        time_ok && turn_ok
    }

    /// Mark the list as served. Returns its items if it was not already consumed.
    pub fn consume_suggestions(&mut self) -> Option<Vec<String>> {
        let list = self.last_suggestions.as_mut()?;
        if list.consumed {
            return None;
        }
        list.consumed = true;
        Some(list.items.clone())
    }

    // ---- Style ----

    pub fn remember_style(&mut self, style: &str) {
        self.remember_style_at(style, Timestamp::now());
    }

    pub fn remember_style_at(&mut self, style: &str, now: Timestamp) {
        let style = style.trim();
        if style.is_empty() {
            return;
        }
        self.last_style = Some(style.to_string());
        self.style_at = Some(now);
    }

    pub fn active_style(&self) -> Option<&str> {
        self.active_style_at(Timestamp::now())
    }

    /// The remembered style while it is within the TTL.
    pub fn active_style_at(&self, now: Timestamp) -> Option<&str> {
        let at = self.style_at?;
        if at.secs_until(now) > self.config.cache_ttl_secs {
            return None;
        }
        self.last_style.as_deref()
    }

    // ---- Topic ----

    /// Clear ingredient and suggestion state on an explicit start-over
    /// phrase. Returns whether it fired.
    pub fn invalidate_on_new_topic(&mut self, utterance: &str) -> bool {
        if !contains_any(utterance, NEW_TOPIC_KEYWORDS) {
            return false;
        }
        self.last_ingredients.clear();
        self.ingredients_turn = 0;
        self.ingredients_at = None;
        self.last_suggestions = None;
        tracing::debug!(turn = self.turn_index, "Start-over phrase cleared memory caches");
        true
    }

    // ---- Capability ----

    pub fn set_last_capability(&mut self, capability: Option<Capability>) {
        self.last_capability = capability;
    }

    pub fn last_capability(&self) -> Option<Capability> {
        self.last_capability
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// A conversation keyed by a transport-supplied id.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub id: Uuid,
    pub started_at: Timestamp,
    pub last_message_at: Timestamp,
    pub message_count: u32,
    pub memory: ConversationMemory,
    /// Image attached to the message being processed. Taken during injection.
    pub pending_image: Option<String>,
}

/// Creates sessions and decides when they expire.
#[derive(Debug, Clone)]
pub struct SessionManager {
    pub session_timeout_minutes: u32,
    pub memory_config: MemoryConfig,
}

impl SessionManager {
    pub fn new(session_timeout_minutes: u32, memory_config: MemoryConfig) -> Self {
        Self {
            session_timeout_minutes,
            memory_config,
        }
    }

    /// Create a fresh session with empty memory.
    pub fn create_session(&self) -> ConversationSession {
        let now = Timestamp::now();
        ConversationSession {
            id: Uuid::new_v4(),
            started_at: now,
            last_message_at: now,
            message_count: 0,
            memory: ConversationMemory::new(self.memory_config.clone()),
            pending_image: None,
        }
    }

    pub fn is_expired(&self, session: &ConversationSession) -> bool {
        self.is_expired_at(session, Timestamp::now())
    }

    pub fn is_expired_at(&self, session: &ConversationSession, now: Timestamp) -> bool {
        let timeout_secs = u64::from(self.session_timeout_minutes) * 60;
        session.last_message_at.secs_until(now) > timeout_secs
    }

    /// Record that a message was processed.
    pub fn touch(&self, session: &mut ConversationSession) {
        session.last_message_at = Timestamp::now();
        session.message_count += 1;
    }
}

// =============================================================================
// Tests
// =============================================================================
