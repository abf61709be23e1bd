//! Messaging transport seam and per-tenant session ownership.

pub mod display;
pub mod events;
pub mod loopback;
pub mod outbound;
pub mod session;
pub mod transport;

pub use display::{LogPairingDisplay, PairingBoard, PairingDisplay};
pub use events::{
    ChatKind, CloseDisposition, CloseReason, EventContext, HandlerError, InboundHandler,
    InboundMessage, NoopInboundHandler, TransportEvent,
};
pub use loopback::{LoopbackController, LoopbackDelivery, LoopbackTransport};
pub use outbound::{OutboundSender, RecordingSender, SendPolicy, SentMessage};
pub use session::{SessionError, SessionLifecycleManager, SessionSettings};
pub use transport::{NoopTransport, Transport, TransportError, TransportHandle};
