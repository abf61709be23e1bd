use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::menu::{ItemKey, MenuItem};
use crate::domain::order::OrderId;
use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuestId(pub String);

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite identity; a guest talking to two hotels has two conversations.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub tenant_id: TenantId,
    pub guest_id: GuestId,
}

impl ConversationKey {
    pub fn new(tenant_id: TenantId, guest_id: GuestId) -> Self {
        Self { tenant_id, guest_id }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.guest_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Initial,
    AwaitingRoom,
    MainMenu,
    Ordering,
    AwaitingConfirmation,
    AwaitingRating,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::AwaitingRoom => "awaiting_room",
            Self::MainMenu => "main_menu",
            Self::Ordering => "ordering",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::AwaitingRating => "awaiting_rating",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item: ItemKey,
    pub display_name: String,
    pub quantity: u32,
    pub unit_price: i64,
}

impl CartLine {
    pub fn subtotal(&self) -> i64 {
        self.unit_price.saturating_mul(i64::from(self.quantity))
    }
}

/// Ordered multiset of pending items. Repeated items merge into one line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn add(&mut self, item: &MenuItem, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.lines.iter_mut().find(|line| line.item == item.key) {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => self.lines.push(CartLine {
                item: item.key.clone(),
                display_name: item.display_name.clone(),
                quantity,
                unit_price: item.price,
            }),
        }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total(&self) -> i64 {
        self.lines.iter().map(CartLine::subtotal).sum()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestConversation {
    pub key: ConversationKey,
    pub state: ConversationState,
    pub room_number: Option<String>,
    pub cart: Cart,
    /// Order whose rating is still outstanding.
    pub awaiting_rating: Option<OrderId>,
    pub rating_prompted: bool,
    pub last_activity: DateTime<Utc>,
}

impl GuestConversation {
    pub fn new(key: ConversationKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            state: ConversationState::Initial,
            room_number: None,
            cart: Cart::default(),
            awaiting_rating: None,
            rating_prompted: false,
            last_activity: now,
        }
    }

    pub fn has_pending_cart(&self) -> bool {
        !self.cart.is_empty()
    }

    pub fn is_idle(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.last_activity) >= ttl
    }

    /// True while a rating prompt for `order_id` would still make sense.
    pub fn expects_rating_for(&self, order_id: &OrderId) -> bool {
        self.state == ConversationState::AwaitingRating
            && self.awaiting_rating.as_ref() == Some(order_id)
    }
}
