pub mod audit;
pub mod config;
pub mod dedup;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod messages;
pub mod retry;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use dedup::MessageDeduplicator;
pub use domain::conversation::{Cart, ConversationKey, ConversationState, GuestConversation, GuestId};
pub use domain::menu::{ItemKey, MenuCatalog, MenuItem, MenuItemSpec};
pub use domain::order::{Order, OrderId, OrderStatus};
pub use domain::tenant::{Credentials, SessionStatus, Tenant, TenantId};
pub use errors::{DomainError, FailureKind};
pub use messages::OutboundMessage;
pub use retry::RetryPolicy;
