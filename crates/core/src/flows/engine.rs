use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::conversation::{ConversationKey, GuestConversation};
use crate::domain::order::OrderId;
use crate::errors::FailureKind;
use crate::flows::replies;
use crate::flows::states::{
    CheckoutResult, ControlSignal, ConversationState, FlowAction, FlowContext, FlowEvent, Intent,
    ItemMention, ParsedMessage, RoomCapturePolicy, TransitionOutcome,
};
use crate::messages::OutboundMessage;

pub trait FlowDefinition {
    fn on_message(
        &self,
        conversation: &GuestConversation,
        message: &ParsedMessage,
        context: &FlowContext<'_>,
    ) -> TransitionOutcome;

    fn on_checkout(
        &self,
        conversation: &GuestConversation,
        result: &CheckoutResult,
        context: &FlowContext<'_>,
    ) -> Result<TransitionOutcome, FlowTransitionError>;

    fn on_rating_prompt_due(
        &self,
        conversation: &GuestConversation,
        order_id: &OrderId,
    ) -> Option<TransitionOutcome>;
}

#[derive(Clone, Debug, Default)]
pub struct RoomServiceFlow;

impl FlowDefinition for RoomServiceFlow {
    fn on_message(
        &self,
        conversation: &GuestConversation,
        message: &ParsedMessage,
        context: &FlowContext<'_>,
    ) -> TransitionOutcome {
        transition_message(conversation, message, context)
    }

    fn on_checkout(
        &self,
        conversation: &GuestConversation,
        result: &CheckoutResult,
        context: &FlowContext<'_>,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_checkout(conversation, result, context)
    }

    fn on_rating_prompt_due(
        &self,
        conversation: &GuestConversation,
        order_id: &OrderId,
    ) -> Option<TransitionOutcome> {
        if !conversation.expects_rating_for(order_id) || conversation.rating_prompted {
            return None;
        }
        let mut step = Step::begin(conversation, FlowEvent::RatingPromptDue);
        step.conversation.rating_prompted = true;
        step.reply(replies::rating_prompt(order_id));
        Some(step.finish())
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn start(&self, key: ConversationKey, now: DateTime<Utc>) -> GuestConversation {
        GuestConversation::new(key, now)
    }

    pub fn apply(
        &self,
        conversation: &GuestConversation,
        message: &ParsedMessage,
        context: &FlowContext<'_>,
    ) -> TransitionOutcome {
        self.flow.on_message(conversation, message, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        conversation: &GuestConversation,
        message: &ParsedMessage,
        context: &FlowContext<'_>,
        sink: &S,
        audit: &AuditContext,
    ) -> TransitionOutcome
    where
        S: AuditSink + ?Sized,
    {
        let outcome = self.apply(conversation, message, context);
        let audit_outcome =
            if outcome.failure.is_some() { AuditOutcome::Rejected } else { AuditOutcome::Success };
        let mut event = audit
            .event("conversation.transition_applied", AuditCategory::Conversation, audit_outcome)
            .with_metadata("from", outcome.from.as_str())
            .with_metadata("to", outcome.to.as_str())
            .with_metadata("event", format!("{:?}", outcome.event))
            .with_metadata("intent", format!("{:?}", message.intent));
        if let Some(failure) = outcome.failure {
            event = event.with_metadata("failure", failure.as_str());
        }
        sink.emit(event);
        outcome
    }

    pub fn complete_checkout(
        &self,
        conversation: &GuestConversation,
        result: &CheckoutResult,
        context: &FlowContext<'_>,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.on_checkout(conversation, result, context)
    }

    /// Returns `None` when the prompt is stale: the guest moved on, rated
    /// already, or the prompt went out before.
    pub fn rating_prompt_due(
        &self,
        conversation: &GuestConversation,
        order_id: &OrderId,
    ) -> Option<TransitionOutcome> {
        self.flow.on_rating_prompt_due(conversation, order_id)
    }
}

impl Default for FlowEngine<RoomServiceFlow> {
    fn default() -> Self {
        Self::new(RoomServiceFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: ConversationState, event: FlowEvent },
}

struct Step {
    from: ConversationState,
    conversation: GuestConversation,
    event: FlowEvent,
    replies: Vec<OutboundMessage>,
    actions: Vec<FlowAction>,
    failure: Option<FailureKind>,
}

impl Step {
    fn begin(conversation: &GuestConversation, event: FlowEvent) -> Self {
        Self {
            from: conversation.state,
            conversation: conversation.clone(),
            event,
            replies: Vec::new(),
            actions: Vec::new(),
            failure: None,
        }
    }

    fn reply(&mut self, message: OutboundMessage) {
        self.replies.push(message);
    }

    fn go(&mut self, state: ConversationState) {
        self.conversation.state = state;
    }

    fn event(&mut self, event: FlowEvent) {
        self.event = event;
    }

    fn fail(&mut self, failure: FailureKind) {
        self.failure = Some(failure);
    }

    fn add_items(&mut self, items: &[ItemMention], context: &FlowContext<'_>) -> bool {
        let mut added = false;
        for mention in items {
            if let Some(item) = context.catalog.get(&mention.item) {
                if mention.quantity > 0 {
                    self.conversation.cart.add(item, mention.quantity);
                    added = true;
                }
            }
        }
        added
    }

    fn note_room(&mut self, room: &str) {
        self.conversation.room_number = Some(room.to_string());
        self.reply(replies::room_noted(room));
    }

    /// Moves to the order summary, detouring through room capture when needed.
    fn summarize(&mut self, context: &FlowContext<'_>) {
        if self.conversation.cart.is_empty() {
            self.reply(replies::empty_cart());
            return;
        }
        match self.conversation.room_number.clone() {
            Some(room) => {
                self.reply(replies::order_summary(
                    &self.conversation.cart,
                    &room,
                    context.currency_symbol,
                ));
                self.go(ConversationState::AwaitingConfirmation);
            }
            None => {
                self.reply(replies::ask_room());
                self.go(ConversationState::AwaitingRoom);
            }
        }
    }

    fn fallback(&mut self) {
        self.event(FlowEvent::Unrecognized);
        self.fail(FailureKind::ParseAmbiguous);
        self.reply(replies::fallback());
    }

    fn finish(self) -> TransitionOutcome {
        TransitionOutcome {
            from: self.from,
            to: self.conversation.state,
            event: self.event,
            conversation: self.conversation,
            replies: self.replies,
            actions: self.actions,
            failure: self.failure,
        }
    }
}

fn transition_message(
    conversation: &GuestConversation,
    message: &ParsedMessage,
    context: &FlowContext<'_>,
) -> TransitionOutcome {
    if message.control == Some(ControlSignal::Reset) {
        return reset(conversation, context);
    }

    let mut step = Step::begin(conversation, FlowEvent::Unrecognized);
    step.conversation.last_activity = context.now;

    match conversation.state {
        ConversationState::Initial => on_initial(&mut step, message, context),
        ConversationState::AwaitingRoom => on_awaiting_room(&mut step, message, context),
        ConversationState::MainMenu => on_main_menu(&mut step, message, context),
        ConversationState::Ordering => on_ordering(&mut step, message, context),
        ConversationState::AwaitingConfirmation => on_awaiting_confirmation(&mut step, message),
        ConversationState::AwaitingRating => on_awaiting_rating(&mut step, message),
    }

    step.finish()
}

fn reset(conversation: &GuestConversation, context: &FlowContext<'_>) -> TransitionOutcome {
    let mut step = Step::begin(conversation, FlowEvent::Reset);
    if conversation.awaiting_rating.is_some() {
        step.actions.push(FlowAction::CancelRatingPrompt);
    }
    step.conversation = GuestConversation::new(conversation.key.clone(), context.now);
    step.actions.push(FlowAction::ResetConversation);
    step.reply(replies::conversation_reset());
    step.finish()
}

fn on_initial(step: &mut Step, message: &ParsedMessage, context: &FlowContext<'_>) {
    step.reply(replies::welcome(context.tenant));
    step.event(FlowEvent::Greeting);

    if let Some(room) = &message.room_number {
        step.event(FlowEvent::RoomProvided);
        step.note_room(room);
    }
    if step.add_items(&message.items, context) {
        step.event(FlowEvent::ItemsAdded);
    }

    let room_known = step.conversation.room_number.is_some();
    if !room_known && !context.tenant.skip_room_capture {
        step.reply(replies::ask_room());
        step.go(ConversationState::AwaitingRoom);
    } else if step.conversation.has_pending_cart() {
        step.summarize(context);
    } else if message.intent == Intent::Menu {
        step.reply(replies::menu_listing(context.catalog, context.currency_symbol));
        step.go(ConversationState::Ordering);
    } else {
        step.reply(replies::main_menu());
        step.go(ConversationState::MainMenu);
    }
}

fn on_awaiting_room(step: &mut Step, message: &ParsedMessage, context: &FlowContext<'_>) {
    let Some(room) = &message.room_number else {
        if step.add_items(&message.items, context) {
            step.event(FlowEvent::ItemsAdded);
            step.reply(replies::cart_echo(&step.conversation.cart, context.currency_symbol));
            step.reply(replies::ask_room());
        } else if message.intent == Intent::Menu {
            step.event(FlowEvent::MenuRequested);
            step.reply(replies::menu_listing(context.catalog, context.currency_symbol));
            step.reply(replies::ask_room());
        } else {
            step.fail(FailureKind::IncompleteOrder);
            step.reply(replies::room_reprompt());
        }
        return;
    };

    step.event(FlowEvent::RoomProvided);
    step.note_room(room);
    let had_cart = step.conversation.has_pending_cart();
    let added = step.add_items(&message.items, context);

    if added {
        step.event(FlowEvent::ItemsAdded);
        step.summarize(context);
    } else if had_cart {
        apply_room_policy(step, context);
    } else if message.intent == Intent::Menu {
        step.reply(replies::menu_listing(context.catalog, context.currency_symbol));
        step.go(ConversationState::Ordering);
    } else {
        step.reply(replies::main_menu());
        step.go(ConversationState::MainMenu);
    }
}

/// A room arrived while items are already in the cart.
fn apply_room_policy(step: &mut Step, context: &FlowContext<'_>) {
    match context.room_capture {
        RoomCapturePolicy::Acknowledge => {
            step.reply(replies::cart_echo(&step.conversation.cart, context.currency_symbol));
            step.go(ConversationState::Ordering);
        }
        RoomCapturePolicy::PromptConfirmation => step.summarize(context),
    }
}

fn on_main_menu(step: &mut Step, message: &ParsedMessage, context: &FlowContext<'_>) {
    if let (Some(room), false) = (&message.room_number, message.items.is_empty()) {
        step.conversation.room_number = Some(room.clone());
    }

    if step.add_items(&message.items, context) {
        step.event(FlowEvent::ItemsAdded);
        step.summarize(context);
        return;
    }

    if message.control == Some(ControlSignal::Checkout) {
        step.event(FlowEvent::CheckoutRequested);
        if step.conversation.has_pending_cart() {
            step.summarize(context);
        } else {
            step.reply(replies::empty_cart());
        }
        return;
    }

    match message.intent {
        Intent::Menu | Intent::Order => {
            step.event(FlowEvent::MenuRequested);
            step.reply(replies::menu_listing(context.catalog, context.currency_symbol));
            step.go(ConversationState::Ordering);
        }
        Intent::Greeting => {
            step.event(FlowEvent::Greeting);
            step.reply(replies::main_menu());
        }
        Intent::Thanks => {
            step.event(FlowEvent::Thanks);
            step.reply(replies::you_are_welcome());
        }
        Intent::ProvideRoomOnly => match &message.room_number {
            Some(room) => {
                step.event(FlowEvent::RoomProvided);
                step.note_room(room);
                step.reply(replies::main_menu());
            }
            None => step.fallback(),
        },
        Intent::Unknown => step.fallback(),
    }
}

fn on_ordering(step: &mut Step, message: &ParsedMessage, context: &FlowContext<'_>) {
    if let (Some(room), false) = (&message.room_number, message.items.is_empty()) {
        step.conversation.room_number = Some(room.clone());
    }

    let added = step.add_items(&message.items, context);
    if added {
        step.event(FlowEvent::ItemsAdded);
    }

    match message.control {
        Some(ControlSignal::Checkout) => {
            step.event(FlowEvent::CheckoutRequested);
            step.summarize(context);
            return;
        }
        Some(ControlSignal::Decline) if !added => {
            step.event(FlowEvent::Declined);
            step.conversation.cart.clear();
            step.reply(replies::cart_cleared());
            step.go(ConversationState::MainMenu);
            return;
        }
        _ => {}
    }

    if added {
        step.reply(replies::cart_echo(&step.conversation.cart, context.currency_symbol));
        return;
    }

    match message.intent {
        Intent::Menu | Intent::Order => {
            step.event(FlowEvent::MenuRequested);
            step.reply(replies::menu_listing(context.catalog, context.currency_symbol));
        }
        Intent::ProvideRoomOnly => match &message.room_number {
            Some(room) => {
                step.event(FlowEvent::RoomProvided);
                step.note_room(room);
                if step.conversation.has_pending_cart() {
                    apply_room_policy(step, context);
                }
            }
            None => step.fallback(),
        },
        Intent::Greeting => {
            step.event(FlowEvent::Greeting);
            if step.conversation.has_pending_cart() {
                step.reply(replies::cart_echo(&step.conversation.cart, context.currency_symbol));
            } else {
                step.reply(replies::main_menu());
            }
        }
        Intent::Thanks => {
            step.event(FlowEvent::Thanks);
            step.reply(replies::you_are_welcome());
        }
        Intent::Unknown => step.fallback(),
    }
}

fn on_awaiting_confirmation(step: &mut Step, message: &ParsedMessage) {
    match message.control {
        Some(ControlSignal::Affirm) => {
            step.event(FlowEvent::Confirmed);
            if step.conversation.cart.is_empty() {
                step.fail(FailureKind::IncompleteOrder);
                step.reply(replies::empty_cart());
                step.go(ConversationState::MainMenu);
            } else if step.conversation.room_number.is_none() {
                step.fail(FailureKind::IncompleteOrder);
                step.reply(replies::ask_room());
                step.go(ConversationState::AwaitingRoom);
            } else {
                step.actions.push(FlowAction::PlaceOrder);
            }
        }
        Some(ControlSignal::Decline) => {
            step.event(FlowEvent::Declined);
            step.conversation.cart.clear();
            step.reply(replies::order_cancelled());
            step.go(ConversationState::MainMenu);
        }
        _ => {
            step.fail(FailureKind::ParseAmbiguous);
            step.reply(replies::confirmation_reprompt());
        }
    }
}

fn on_awaiting_rating(step: &mut Step, message: &ParsedMessage) {
    let rating = message.rating.filter(|value| (1..=5).contains(value));
    let Some(rating) = rating.and_then(|value| u8::try_from(value).ok()) else {
        step.fail(FailureKind::ParseAmbiguous);
        step.reply(replies::rating_reprompt());
        return;
    };

    step.event(FlowEvent::RatingGiven);
    if let Some(order_id) = step.conversation.awaiting_rating.take() {
        step.actions.push(FlowAction::CancelRatingPrompt);
        step.actions.push(FlowAction::ForwardRating { order_id, rating });
    }
    step.conversation.rating_prompted = false;
    step.reply(replies::rating_thanks(rating));
    step.go(ConversationState::MainMenu);
}

fn transition_checkout(
    conversation: &GuestConversation,
    result: &CheckoutResult,
    context: &FlowContext<'_>,
) -> Result<TransitionOutcome, FlowTransitionError> {
    let event = match result {
        CheckoutResult::Placed { .. } => FlowEvent::OrderPlaced,
        CheckoutResult::Failed(_) => FlowEvent::OrderFailed,
    };
    if conversation.state != ConversationState::AwaitingConfirmation {
        return Err(FlowTransitionError::InvalidTransition { state: conversation.state, event });
    }

    let mut step = Step::begin(conversation, event);
    step.conversation.last_activity = context.now;

    match result {
        CheckoutResult::Placed { order_id, guest_notified, admin_notified } => {
            step.conversation.cart.clear();
            step.conversation.awaiting_rating = Some(order_id.clone());
            step.conversation.rating_prompted = false;
            step.actions.push(FlowAction::ScheduleRatingPrompt { order_id: order_id.clone() });
            if !guest_notified || !admin_notified {
                step.fail(FailureKind::NotificationFailure);
                if let Some(text) = FailureKind::NotificationFailure.guest_message() {
                    step.reply(replies::apology(text));
                }
            }
            step.go(ConversationState::AwaitingRating);
        }
        CheckoutResult::Failed(FailureKind::IncompleteOrder) => {
            step.fail(FailureKind::IncompleteOrder);
            if let Some(text) = FailureKind::IncompleteOrder.guest_message() {
                step.reply(replies::apology(text));
            }
            if step.conversation.room_number.is_none() {
                step.go(ConversationState::AwaitingRoom);
            } else {
                step.go(ConversationState::MainMenu);
            }
        }
        CheckoutResult::Failed(kind) => {
            step.fail(*kind);
            step.conversation.cart.clear();
            let text = kind
                .guest_message()
                .or_else(|| FailureKind::PersistenceFailure.guest_message())
                .unwrap_or_default();
            step.reply(replies::apology(text));
            step.go(ConversationState::MainMenu);
        }
    }

    Ok(step.finish())
}
