//! Dialogue engine for the Sous cooking assistant.
//!
//! Turns one utterance (plus an optional image) into a [`ReplyEnvelope`]:
//! conversation memory, numeric selection, intent routing, capability
//! invocation and reply formatting.
//!
//! [`ReplyEnvelope`]: sous_core::ReplyEnvelope

pub mod capability;
pub mod completion;
pub mod dedup;
pub mod error;
pub mod extractor;
pub mod followup;
pub mod formatter;
pub mod handlers;
pub mod memory;
pub mod mock;
pub mod orchestrator;
pub mod router;
pub mod selection;
pub mod structured;
pub mod vocabulary;

pub use capability::{
    Capability, CapabilityHandler, CapabilityOutput, CapabilityRegistry, CapabilityRequest,
};
pub use completion::{CompletionService, HttpCompletionClient};
pub use dedup::RecommendationDeduper;
pub use error::ChatError;
pub use extractor::{DishExtractor, ModelExtractor, PatternExtractor};
pub use followup::FollowUpResolver;
pub use formatter::{CapabilityResult, FormatContext, FormatOutcome, ResponseFormatter};
pub use handlers::{default_registry, CookingCapability, RemoteCapability};
pub use memory::{ConversationMemory, ConversationSession, SessionManager};
pub use orchestrator::{ChatOrchestrator, ChatSessionSummary};
pub use router::{IntentRouter, RouteOrigin, RoutePlan};
pub use selection::{Selection, SelectionResolver};
pub use structured::extract_structured;
