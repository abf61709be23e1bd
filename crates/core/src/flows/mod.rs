pub mod engine;
pub mod replies;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, RoomServiceFlow};
pub use states::{
    CheckoutResult, ControlSignal, ConversationState, FlowAction, FlowContext, FlowEvent, Intent,
    ItemMention, ParsedMessage, RoomCapturePolicy, TransitionOutcome,
};
