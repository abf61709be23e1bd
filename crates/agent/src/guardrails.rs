use roomservice_core::domain::tenant::Tenant;
use roomservice_transport::{ChatKind, InboundMessage};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    Empty,
    GroupChat,
    Broadcast,
    OwnMessage,
    TooLong,
}

impl DropReason {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Empty => "empty_text",
            Self::GroupChat => "group_chat",
            Self::Broadcast => "broadcast",
            Self::OwnMessage => "own_message",
            Self::TooLong => "text_too_long",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Accept { text: String },
    Drop { reason: DropReason },
}

/// Filters inbound traffic before it reaches a conversation: only direct,
/// non-empty text from someone other than the tenant's own account passes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundGuard {
    pub max_text_chars: usize,
}

impl Default for InboundGuard {
    fn default() -> Self {
        Self { max_text_chars: 2_000 }
    }
}

impl InboundGuard {
    pub fn evaluate(&self, tenant: &Tenant, message: &InboundMessage) -> GuardDecision {
        // Echoes of our own sends, including notices to the admin target.
        if message.from_self {
            tracing::trace!(tenant_id = %tenant.id, "dropping self-originated message");
            return GuardDecision::Drop { reason: DropReason::OwnMessage };
        }

        match message.kind {
            ChatKind::Group => return GuardDecision::Drop { reason: DropReason::GroupChat },
            ChatKind::Broadcast => return GuardDecision::Drop { reason: DropReason::Broadcast },
            ChatKind::Direct => {}
        }

        let text = message.text.trim();
        if text.is_empty() {
            return GuardDecision::Drop { reason: DropReason::Empty };
        }
        if text.chars().count() > self.max_text_chars {
            return GuardDecision::Drop { reason: DropReason::TooLong };
        }

        GuardDecision::Accept { text: text.to_owned() }
    }
}

#[cfg(test)]
mod tests {
    use roomservice_core::domain::tenant::Tenant;
    use roomservice_transport::{ChatKind, InboundMessage};

    use super::{DropReason, GuardDecision, InboundGuard};

    fn tenant() -> Tenant {
        Tenant::new("hotel-a", "Hotel Aurora", "919800000100")
    }

    #[test]
    fn direct_text_is_accepted_trimmed() {
        let decision = InboundGuard::default()
            .evaluate(&tenant(), &InboundMessage::direct("m-1", "919800000001", "  hi there \n"));
        assert_eq!(decision, GuardDecision::Accept { text: "hi there".to_owned() });
    }

    #[test]
    fn non_guest_traffic_is_dropped_with_reason_codes() {
        let guard = InboundGuard { max_text_chars: 10 };
        let cases = [
            (
                InboundMessage { kind: ChatKind::Group, ..InboundMessage::direct("m", "g", "hi") },
                DropReason::GroupChat,
            ),
            (
                InboundMessage {
                    kind: ChatKind::Broadcast,
                    ..InboundMessage::direct("m", "g", "hi")
                },
                DropReason::Broadcast,
            ),
            (
                InboundMessage { from_self: true, ..InboundMessage::direct("m", "g", "hi") },
                DropReason::OwnMessage,
            ),
            (InboundMessage::direct("m", "g", "   "), DropReason::Empty),
            (InboundMessage::direct("m", "g", "a much longer message"), DropReason::TooLong),
        ];

        for (message, expected) in cases {
            assert_eq!(
                guard.evaluate(&tenant(), &message),
                GuardDecision::Drop { reason: expected },
                "{}",
                expected.reason_code()
            );
        }
    }
}
