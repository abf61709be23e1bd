use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::{Cart, GuestId};
use crate::domain::menu::ItemKey;
use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Done,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Done => "done",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "done" => Some(Self::Done),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Status only moves forward; terminal states never change again.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Confirmed)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::Confirmed, OrderStatus::Done)
                | (OrderStatus::Confirmed, OrderStatus::Rejected)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item: ItemKey,
    pub display_name: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub subtotal: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub room_number: String,
    pub guest_id: GuestId,
    pub lines: Vec<OrderLine>,
    pub total: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn from_cart(
        id: OrderId,
        tenant_id: TenantId,
        guest_id: GuestId,
        room_number: impl Into<String>,
        cart: &Cart,
        created_at: DateTime<Utc>,
    ) -> Self {
        let lines = cart
            .lines()
            .iter()
            .map(|line| OrderLine {
                item: line.item.clone(),
                display_name: line.display_name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                subtotal: line.subtotal(),
            })
            .collect::<Vec<_>>();
        let total = lines.iter().map(|line| line.subtotal).sum();

        Self {
            id,
            tenant_id,
            room_number: room_number.into(),
            guest_id,
            lines,
            total,
            status: OrderStatus::Pending,
            created_at,
        }
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidOrderTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Order, OrderId, OrderStatus};
    use crate::domain::conversation::{Cart, GuestId};
    use crate::domain::menu::{ItemKey, MenuItem};
    use crate::domain::tenant::TenantId;
    use crate::errors::DomainError;

    fn order() -> Order {
        let mut cart = Cart::default();
        cart.add(
            &MenuItem {
                key: ItemKey("margherita pizza".to_string()),
                display_name: "Margherita Pizza".to_string(),
                category: "Mains".to_string(),
                price: 800,
            },
            2,
        );
        cart.add(
            &MenuItem {
                key: ItemKey("filter coffee".to_string()),
                display_name: "Filter Coffee".to_string(),
                category: "Drinks".to_string(),
                price: 150,
            },
            1,
        );
        Order::from_cart(
            OrderId("ORD-1".to_string()),
            TenantId("hotel-1".to_string()),
            GuestId("guest-1".to_string()),
            "105",
            &cart,
            Utc::now(),
        )
    }

    #[test]
    fn computes_line_subtotals_and_total_from_cart() {
        let order = order();
        assert_eq!(order.lines[0].subtotal, 1600);
        assert_eq!(order.lines[1].subtotal, 150);
        assert_eq!(order.total, 1750);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn allows_forward_status_transitions() {
        let mut order = order();
        order.transition_to(OrderStatus::Confirmed).expect("pending -> confirmed");
        order.transition_to(OrderStatus::Done).expect("confirmed -> done");
        assert_eq!(order.status, OrderStatus::Done);
    }

    #[test]
    fn blocks_backward_status_transitions() {
        let mut order = order();
        order.transition_to(OrderStatus::Rejected).expect("pending -> rejected");
        let error = order.transition_to(OrderStatus::Pending).expect_err("rejected is terminal");
        assert_eq!(
            error,
            DomainError::InvalidOrderTransition {
                from: OrderStatus::Rejected,
                to: OrderStatus::Pending
            }
        );
    }

    #[test]
    fn parses_status_labels() {
        assert_eq!(OrderStatus::parse(" Confirmed "), Some(OrderStatus::Confirmed));
        assert_eq!(OrderStatus::parse("shipped"), None);
    }
}
