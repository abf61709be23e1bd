//! Guest-facing conversation runtime.
//!
//! Inbound text is guarded, deduplicated and parsed into a `ParsedMessage`;
//! the core state machine decides the transition and this crate carries out
//! its effects: replies, order placement, rating prompts and admin notices.

pub mod admin;
pub mod conversation;
pub mod guardrails;
pub mod menus;
pub mod pipeline;
pub mod runtime;
pub mod scheduler;
pub mod store;

pub use admin::{OrderStatusService, StatusUpdate};
pub use conversation::{IntentParser, PriorState};
pub use guardrails::{DropReason, GuardDecision, InboundGuard};
pub use menus::MenuSnapshots;
pub use pipeline::{OrderIdGenerator, OrderPipeline, PipelineError, PipelineSettings, PlacedOrder};
pub use runtime::{AgentRuntime, RuntimeSettings};
pub use scheduler::{PromptFire, RatingPromptScheduler};
pub use store::ConversationStore;
