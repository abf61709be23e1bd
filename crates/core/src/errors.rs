use thiserror::Error;

use crate::domain::order::OrderStatus;
use crate::flows::FlowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error("duplicate menu item `{0}`")]
    DuplicateMenuItem(String),
    #[error("invalid menu: {0}")]
    InvalidMenu(String),
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure taxonomy shared by every layer that reaches a guest or an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    ParseAmbiguous,
    IncompleteOrder,
    TransportTransient,
    TransportFatal,
    PersistenceFailure,
    NotificationFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseAmbiguous => "parse_ambiguous",
            Self::IncompleteOrder => "incomplete_order",
            Self::TransportTransient => "transport_transient",
            Self::TransportFatal => "transport_fatal",
            Self::PersistenceFailure => "persistence_failure",
            Self::NotificationFailure => "notification_failure",
        }
    }

    /// Plain-language text a guest may see. Session-level failures have none.
    pub fn guest_message(&self) -> Option<&'static str> {
        match self {
            Self::ParseAmbiguous => {
                Some("Sorry, I didn't quite get that. Type *menu* to see what we serve.")
            }
            Self::IncompleteOrder => {
                Some("I still need your room number and at least one item to place the order.")
            }
            Self::PersistenceFailure => Some(
                "Sorry, we couldn't place your order just now. Nothing was charged, please try again.",
            ),
            Self::NotificationFailure => Some(
                "Your order is saved, but we had trouble alerting the kitchen. We'll follow up shortly.",
            ),
            Self::TransportTransient | Self::TransportFatal => None,
        }
    }

    /// Operators must rescan a pairing code rather than wait it out.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Self::TransportFatal)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportTransient | Self::NotificationFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::FailureKind;

    #[test]
    fn persistence_failure_apologises_without_detail() {
        let text = FailureKind::PersistenceFailure.guest_message().expect("guest text");
        assert!(text.contains("couldn't place your order"));
    }

    #[test]
    fn only_fatal_transport_failures_require_reauthorization() {
        assert!(FailureKind::TransportFatal.requires_reauthorization());
        assert!(!FailureKind::TransportTransient.requires_reauthorization());
        assert!(FailureKind::TransportTransient.is_retryable());
    }

    #[test]
    fn transport_failures_have_no_guest_text() {
        assert_eq!(FailureKind::TransportTransient.guest_message(), None);
        assert_eq!(FailureKind::TransportFatal.guest_message(), None);
    }

    #[test]
    fn incomplete_order_maps_to_reprompt() {
        let text = FailureKind::IncompleteOrder.guest_message().expect("guest text");
        assert!(text.contains("room number"));
    }
}
