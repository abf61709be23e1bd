//! Guest, admin and operator facing message text.

use crate::domain::conversation::Cart;
use crate::domain::menu::MenuCatalog;
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::tenant::Tenant;
use crate::messages::{format_price, OutboundMessage, PromptBuilder};

pub const CONFIRM_KEYWORDS: &str = "*yes* to confirm or *no* to cancel";

pub fn welcome(tenant: &Tenant) -> OutboundMessage {
    OutboundMessage::text(format!(
        "Welcome to {}! 🛎️ I can take your in-room dining order.",
        tenant.name
    ))
}

pub fn ask_room() -> OutboundMessage {
    OutboundMessage::text("Could you share your room number first? (for example: 105)")
}

pub fn room_reprompt() -> OutboundMessage {
    OutboundMessage::text(
        "I need a valid room number to continue. Please send just the number, like 105.",
    )
}

pub fn room_noted(room: &str) -> OutboundMessage {
    OutboundMessage::text(format!("Thanks! Room {room} noted."))
}

pub fn main_menu() -> OutboundMessage {
    PromptBuilder::new("What would you like to do?")
        .option("menu", "See the menu")
        .footer("Or just tell me what you'd like, e.g. \"2 masala dosa and a coffee\".")
        .build()
}

pub fn menu_listing(catalog: &MenuCatalog, symbol: &str) -> OutboundMessage {
    if catalog.is_empty() {
        return OutboundMessage::text(
            "Our menu isn't available right now. Please call the front desk to order.",
        );
    }

    let mut lines = vec!["📋 *Menu*".to_string()];
    for (category, items) in catalog.by_category() {
        lines.push(String::new());
        lines.push(format!("*{category}*"));
        for item in items {
            lines.push(format!("• {} - {}", item.display_name, format_price(symbol, item.price)));
        }
    }
    lines.push(String::new());
    lines.push("Tell me what you'd like, then say *done* to check out.".to_string());
    OutboundMessage::text(lines.join("\n"))
}

fn cart_lines(cart: &Cart, symbol: &str) -> Vec<String> {
    cart.lines()
        .iter()
        .map(|line| {
            format!(
                "• {} × {} - {}",
                line.quantity,
                line.display_name,
                format_price(symbol, line.subtotal())
            )
        })
        .collect()
}

pub fn cart_echo(cart: &Cart, symbol: &str) -> OutboundMessage {
    let mut lines = vec!["🛒 Your cart:".to_string()];
    lines.extend(cart_lines(cart, symbol));
    lines.push(format!("Total so far: {}", format_price(symbol, cart.total())));
    lines.push("Add more items or say *done* to check out.".to_string());
    OutboundMessage::text(lines.join("\n"))
}

pub fn order_summary(cart: &Cart, room: &str, symbol: &str) -> OutboundMessage {
    let mut lines = vec![format!("🧾 Order for room {room}:")];
    lines.extend(cart_lines(cart, symbol));
    lines.push(format!("Total: {}", format_price(symbol, cart.total())));

    PromptBuilder::new(lines.join("\n"))
        .option("order.confirm", "Yes, place it")
        .option("order.cancel", "No, cancel")
        .footer(format!("Reply {CONFIRM_KEYWORDS}."))
        .build()
}

pub fn confirmation_reprompt() -> OutboundMessage {
    OutboundMessage::text(format!("Please reply {CONFIRM_KEYWORDS} your order."))
}

pub fn empty_cart() -> OutboundMessage {
    OutboundMessage::text(
        "Your cart is empty. Tell me what you'd like, or type *menu* to see options.",
    )
}

pub fn order_cancelled() -> OutboundMessage {
    OutboundMessage::text("No problem, I've cancelled that order. Anything else?")
}

pub fn cart_cleared() -> OutboundMessage {
    OutboundMessage::text("Cart cleared. Type *menu* whenever you're ready to order.")
}

pub fn rating_prompt(order_id: &OrderId) -> OutboundMessage {
    PromptBuilder::new(format!("How was your order {order_id}? Please rate us from 1 to 5."))
        .option("rating.5", "5 ⭐ Excellent")
        .option("rating.3", "3 ⭐ Okay")
        .option("rating.1", "1 ⭐ Poor")
        .build()
}

pub fn rating_reprompt() -> OutboundMessage {
    OutboundMessage::text("Please reply with a number from 1 to 5 to rate your order.")
}

pub fn rating_thanks(rating: u8) -> OutboundMessage {
    OutboundMessage::text(format!("Thank you for rating us {rating}/5! 🙏"))
}

pub fn you_are_welcome() -> OutboundMessage {
    OutboundMessage::text("You're welcome! Let me know if you need anything else.")
}

pub fn fallback() -> OutboundMessage {
    OutboundMessage::text(
        "Sorry, I didn't quite get that. Type *menu* to see what we serve, or *reset* to start over.",
    )
}

pub fn conversation_reset() -> OutboundMessage {
    OutboundMessage::text("Starting fresh. Say *hi* whenever you're ready.")
}

pub fn apology(text: &str) -> OutboundMessage {
    OutboundMessage::text(text)
}

pub fn guest_order_confirmation(order: &Order, symbol: &str) -> OutboundMessage {
    let mut lines = vec![format!("✅ Order {} placed for room {}.", order.id, order.room_number)];
    for line in &order.lines {
        lines.push(format!(
            "• {} × {} - {}",
            line.quantity,
            line.display_name,
            format_price(symbol, line.subtotal)
        ));
    }
    lines.push(format!("Total: {}", format_price(symbol, order.total)));
    lines.push("We'll have it with you shortly.".to_string());
    OutboundMessage::text(lines.join("\n"))
}

pub fn admin_order_summary(tenant: &Tenant, order: &Order, symbol: &str) -> OutboundMessage {
    let mut lines = vec![
        format!("🔔 New order {} at {}", order.id, tenant.name),
        format!("Room: {}", order.room_number),
        format!("Guest: {}", order.guest_id),
    ];
    for line in &order.lines {
        lines.push(format!("• {} × {}", line.quantity, line.display_name));
    }
    lines.push(format!("Total: {}", format_price(symbol, order.total)));
    OutboundMessage::text(lines.join("\n"))
}

pub fn admin_rating_notice(order_id: &OrderId, room: Option<&str>, rating: u8) -> OutboundMessage {
    OutboundMessage::text(format!(
        "⭐ Order {order_id} (room {}) was rated {rating}/5.",
        room.unwrap_or("unknown")
    ))
}

pub fn guest_status_update(order_id: &OrderId, status: OrderStatus) -> OutboundMessage {
    let text = match status {
        OrderStatus::Pending => format!("Your order {order_id} is waiting for the kitchen."),
        OrderStatus::Confirmed => format!("👨‍🍳 Your order {order_id} is confirmed and being prepared."),
        OrderStatus::Done => format!("🍽️ Your order {order_id} is on its way. Enjoy!"),
        OrderStatus::Rejected => format!(
            "Sorry, we can't fulfil order {order_id} right now. Please contact the front desk."
        ),
    };
    OutboundMessage::text(text)
}
