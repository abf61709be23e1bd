use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use crate::domain::conversation::ConversationState;
use crate::domain::conversation::GuestConversation;
use crate::domain::menu::{ItemKey, MenuCatalog};
use crate::domain::order::OrderId;
use crate::domain::tenant::Tenant;
use crate::errors::FailureKind;
use crate::messages::OutboundMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Order,
    Menu,
    Greeting,
    Thanks,
    ProvideRoomOnly,
    Unknown,
}

/// Keyword-level replies that steer the dialogue regardless of intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    Reset,
    Checkout,
    Affirm,
    Decline,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMention {
    pub item: ItemKey,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub intent: Intent,
    pub room_number: Option<String>,
    pub items: Vec<ItemMention>,
    pub control: Option<ControlSignal>,
    /// Whole-message integer, if any; range checks belong to the flow.
    pub rating: Option<i64>,
}

impl ParsedMessage {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            room_number: None,
            items: Vec::new(),
            control: None,
            rating: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomCapturePolicy {
    /// Note the room and keep the guest building the cart.
    Acknowledge,
    /// Note the room and jump straight to the order summary.
    PromptConfirmation,
}

#[derive(Clone, Copy, Debug)]
pub struct FlowContext<'a> {
    pub tenant: &'a Tenant,
    pub catalog: &'a MenuCatalog,
    pub currency_symbol: &'a str,
    pub room_capture: RoomCapturePolicy,
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    Reset,
    Greeting,
    RoomProvided,
    ItemsAdded,
    MenuRequested,
    CheckoutRequested,
    Confirmed,
    Declined,
    RatingGiven,
    Thanks,
    Unrecognized,
    OrderPlaced,
    OrderFailed,
    RatingPromptDue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PlaceOrder,
    ScheduleRatingPrompt { order_id: OrderId },
    CancelRatingPrompt,
    ForwardRating { order_id: OrderId, rating: u8 },
    ResetConversation,
}

/// Outcome of a checkout attempt, fed back into the flow after the pipeline ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutResult {
    Placed { order_id: OrderId, guest_notified: bool, admin_notified: bool },
    Failed(FailureKind),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub from: ConversationState,
    pub to: ConversationState,
    pub event: FlowEvent,
    pub conversation: GuestConversation,
    pub replies: Vec<OutboundMessage>,
    pub actions: Vec<FlowAction>,
    pub failure: Option<FailureKind>,
}
