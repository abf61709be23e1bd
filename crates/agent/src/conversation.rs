use roomservice_core::domain::conversation::GuestConversation;
use roomservice_core::domain::menu::{tokenize_normalized, ItemKey, MenuCatalog};
use roomservice_core::flows::{ControlSignal, ConversationState, Intent, ItemMention, ParsedMessage};

/// The slice of conversation state the parser is allowed to look at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriorState {
    pub state: ConversationState,
    pub pending_cart: bool,
}

impl PriorState {
    pub fn of(conversation: &GuestConversation) -> Self {
        Self { state: conversation.state, pending_cart: conversation.has_pending_cart() }
    }

    pub fn fresh() -> Self {
        Self { state: ConversationState::Initial, pending_cart: false }
    }
}

/// Deterministic keyword and catalog matcher. Identical input always yields
/// an identical parse; unparseable text is `Intent::Unknown`, never an error.
#[derive(Clone, Debug, Default)]
pub struct IntentParser;

impl IntentParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str, prior: PriorState, catalog: &MenuCatalog) -> ParsedMessage {
        let trimmed = text.trim();
        let normalized = normalize_text(trimmed);
        let tokens = tokenize_normalized(&normalized);

        if prior.pending_cart && is_room_token(trimmed) {
            return ParsedMessage {
                intent: Intent::ProvideRoomOnly,
                room_number: Some(trimmed.to_string()),
                items: Vec::new(),
                control: None,
                rating: None,
            };
        }

        let room_number = extract_room(&tokens);
        let items = extract_items(&tokens, catalog);
        let control = extract_control(&tokens, prior.state);
        let rating = extract_rating(&normalized);
        let intent = classify(&tokens, !items.is_empty(), room_number.is_some());

        ParsedMessage { intent, room_number, items, control, rating }
    }
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase().replace(['\'', '’'], "")
}

fn is_room_token(token: &str) -> bool {
    (3..=4).contains(&token.len()) && token.bytes().all(|byte| byte.is_ascii_digit())
}

fn extract_room(tokens: &[String]) -> Option<String> {
    tokens.iter().find_map(|token| {
        let candidate = ["room", "rm"]
            .iter()
            .find_map(|label| token.strip_prefix(label))
            .unwrap_or(token);
        is_room_token(candidate).then(|| candidate.to_string())
    })
}

fn quantity_of(token: &str) -> Option<u32> {
    let word = match token {
        "a" | "an" | "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        _ => None,
    };
    if word.is_some() {
        return word;
    }

    let digits = token.strip_suffix('x').unwrap_or(token);
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|quantity| *quantity > 0)
}

fn token_matches(token: &str, expected: &str, last: bool) -> bool {
    if token == expected {
        return true;
    }
    if !last {
        return false;
    }
    let plural_y = expected
        .strip_suffix('y')
        .is_some_and(|stem| token.strip_suffix("ies") == Some(stem));
    token.strip_suffix('s') == Some(expected)
        || token.strip_suffix("es") == Some(expected)
        || plural_y
}

fn phrase_at(tokens: &[String], start: usize, phrase: &[String]) -> bool {
    if start + phrase.len() > tokens.len() {
        return false;
    }
    phrase.iter().enumerate().all(|(offset, expected)| {
        token_matches(&tokens[start + offset], expected, offset + 1 == phrase.len())
    })
}

/// Scans phrases most-specific first; a span claimed by a longer phrase is
/// never matched again by one of its substrings.
fn extract_items(tokens: &[String], catalog: &MenuCatalog) -> Vec<ItemMention> {
    let mut consumed = vec![false; tokens.len()];
    let mut hits: Vec<(usize, ItemKey, u32)> = Vec::new();

    for phrase in catalog.phrases() {
        let width = phrase.tokens.len();
        if width == 0 {
            continue;
        }
        let mut start = 0;
        while start + width <= tokens.len() {
            let free = consumed[start..start + width].iter().all(|taken| !taken);
            if !free || !phrase_at(tokens, start, &phrase.tokens) {
                start += 1;
                continue;
            }

            consumed[start..start + width].iter_mut().for_each(|taken| *taken = true);
            let mut quantity = 1;
            let mut position = start;
            if start > 0 && !consumed[start - 1] {
                if let Some(parsed) = quantity_of(&tokens[start - 1]) {
                    quantity = parsed;
                    consumed[start - 1] = true;
                    position = start - 1;
                }
            }
            hits.push((position, phrase.item.clone(), quantity));
            start += width;
        }
    }

    hits.sort_by_key(|(position, _, _)| *position);
    let mut items: Vec<ItemMention> = Vec::new();
    for (_, item, quantity) in hits {
        match items.iter_mut().find(|mention| mention.item == item) {
            Some(mention) => mention.quantity = mention.quantity.saturating_add(quantity),
            None => items.push(ItemMention { item, quantity }),
        }
    }
    items
}

fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let wanted = phrase.split(' ').collect::<Vec<_>>();
    tokens.windows(wanted.len()).any(|window| {
        window.iter().zip(&wanted).all(|(token, expected)| token == expected)
    })
}

fn contains_any(tokens: &[String], phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| contains_phrase(tokens, phrase))
}

const RESET_KEYWORDS: &[&str] = &["reset", "restart", "start over"];
const CHECKOUT_KEYWORDS: &[&str] =
    &["done", "checkout", "check out", "thats all", "thats it", "place order", "finish"];
const AFFIRM_KEYWORDS: &[&str] =
    &["yes", "y", "yeah", "yep", "yup", "confirm", "ok", "okay", "sure", "haan"];
const DECLINE_KEYWORDS: &[&str] = &["no", "n", "nope", "nah", "cancel"];

const ORDER_KEYWORDS: &[&str] = &[
    "order",
    "get",
    "want",
    "need",
    "bring me",
    "send me",
    "id like",
    "i would like",
    "can i have",
];
const MENU_KEYWORDS: &[&str] =
    &["menu", "food", "dishes", "what do you have", "whats available", "what can i order"];
const GREETING_KEYWORDS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "hola",
    "namaste",
    "good morning",
    "good afternoon",
    "good evening",
    "start",
];
const THANKS_KEYWORDS: &[&str] = &["thanks", "thank you", "thx", "ty"];

fn extract_control(tokens: &[String], state: ConversationState) -> Option<ControlSignal> {
    if contains_any(tokens, RESET_KEYWORDS) {
        return Some(ControlSignal::Reset);
    }

    let checkout = contains_any(tokens, CHECKOUT_KEYWORDS);
    let affirm = contains_any(tokens, AFFIRM_KEYWORDS);
    let decline = contains_any(tokens, DECLINE_KEYWORDS);

    if state == ConversationState::AwaitingConfirmation {
        // Mixed yes/no never places an order.
        return match (affirm, decline) {
            (true, false) => Some(ControlSignal::Affirm),
            (false, true) => Some(ControlSignal::Decline),
            _ => None,
        };
    }

    if checkout {
        Some(ControlSignal::Checkout)
    } else if decline {
        Some(ControlSignal::Decline)
    } else if affirm {
        Some(ControlSignal::Affirm)
    } else {
        None
    }
}

/// Whole-message integers only, tolerating "4/5", "4 stars" and `rating.4`.
fn extract_rating(normalized: &str) -> Option<i64> {
    let mut candidate = normalized.trim();
    candidate = candidate.strip_prefix("rating.").unwrap_or(candidate);
    for suffix in ["/5", "stars", "star"] {
        candidate = candidate.strip_suffix(suffix).unwrap_or(candidate).trim();
    }
    if candidate.is_empty() || candidate.len() > 18 {
        return None;
    }
    candidate.parse::<i64>().ok()
}

fn classify(tokens: &[String], has_items: bool, has_room: bool) -> Intent {
    if has_items || contains_any(tokens, ORDER_KEYWORDS) {
        Intent::Order
    } else if contains_any(tokens, MENU_KEYWORDS) {
        Intent::Menu
    } else if contains_any(tokens, GREETING_KEYWORDS) {
        Intent::Greeting
    } else if contains_any(tokens, THANKS_KEYWORDS) {
        Intent::Thanks
    } else if has_room {
        Intent::ProvideRoomOnly
    } else {
        Intent::Unknown
    }
}

#[cfg(test)]
mod tests {
    use roomservice_core::domain::menu::{ItemKey, MenuCatalog, MenuItemSpec};
    use roomservice_core::flows::{ControlSignal, ConversationState, Intent, ItemMention};

    use super::{IntentParser, PriorState};

    fn catalog() -> MenuCatalog {
        MenuCatalog::from_items(vec![
            MenuItemSpec::new("Margherita Pizza", "Mains", 800),
            MenuItemSpec::new("Filter Coffee", "Drinks", 150),
            MenuItemSpec::new("Burger", "Mains", 300),
            MenuItemSpec::new("Chicken Burger", "Mains", 450),
            MenuItemSpec::new("Masala Dosa", "Mains", 220),
            MenuItemSpec::new("French Fries", "Sides", 180).alias("fries"),
        ])
        .expect("catalog")
    }

    fn mention(key: &str, quantity: u32) -> ItemMention {
        ItemMention { item: ItemKey(key.to_string()), quantity }
    }

    fn in_state(state: ConversationState, pending_cart: bool) -> PriorState {
        PriorState { state, pending_cart }
    }

    #[test]
    fn quantities_attach_to_items_and_plurals_match() {
        let parsed = IntentParser::new().parse(
            "2 pizzas and 1 coffee please",
            in_state(ConversationState::MainMenu, false),
            &catalog(),
        );

        assert_eq!(parsed.intent, Intent::Order);
        assert_eq!(parsed.items, vec![mention("margherita pizza", 2), mention("filter coffee", 1)]);
        assert_eq!(parsed.room_number, None);
    }

    #[test]
    fn mention_order_does_not_change_the_cart() {
        let parser = IntentParser::new();
        let forward =
            parser.parse("2 pizzas and one coffee", PriorState::fresh(), &catalog()).items;
        let backward =
            parser.parse("one coffee and 2 pizzas", PriorState::fresh(), &catalog()).items;

        let sorted = |mut items: Vec<ItemMention>| {
            items.sort_by(|left, right| left.item.cmp(&right.item));
            items
        };
        assert_eq!(sorted(forward), sorted(backward));
    }

    #[test]
    fn longest_catalog_phrase_wins() {
        let parsed = IntentParser::new().parse("chicken burger", PriorState::fresh(), &catalog());
        assert_eq!(parsed.items, vec![mention("chicken burger", 1)]);

        let both = IntentParser::new().parse(
            "a chicken burger and two burgers",
            PriorState::fresh(),
            &catalog(),
        );
        assert_eq!(both.items, vec![mention("chicken burger", 1), mention("burger", 2)]);
    }

    #[test]
    fn repeated_mentions_accumulate() {
        let parsed = IntentParser::new().parse(
            "one dosa, a coffee and another masala dosa",
            PriorState::fresh(),
            &catalog(),
        );
        assert_eq!(parsed.items, vec![mention("masala dosa", 2), mention("filter coffee", 1)]);
    }

    #[test]
    fn room_numbers_are_three_or_four_digits_with_optional_labels() {
        let parser = IntentParser::new();
        let catalog = catalog();

        assert_eq!(
            parser.parse("room 1204", PriorState::fresh(), &catalog).room_number.as_deref(),
            Some("1204")
        );
        assert_eq!(
            parser.parse("#305 fries", PriorState::fresh(), &catalog).room_number.as_deref(),
            Some("305")
        );
        assert_eq!(
            parser.parse("rm210", PriorState::fresh(), &catalog).room_number.as_deref(),
            Some("210")
        );
        assert_eq!(parser.parse("call 98450 12345", PriorState::fresh(), &catalog).room_number, None);
        assert_eq!(
            parser.parse("105", PriorState::fresh(), &catalog).intent,
            Intent::ProvideRoomOnly
        );
    }

    #[test]
    fn bare_number_after_a_cart_is_always_a_room() {
        let parsed = IntentParser::new().parse(
            " 105 ",
            in_state(ConversationState::Ordering, true),
            &catalog(),
        );

        assert_eq!(parsed.intent, Intent::ProvideRoomOnly);
        assert_eq!(parsed.room_number.as_deref(), Some("105"));
        assert!(parsed.items.is_empty());
        assert_eq!(parsed.rating, None);
    }

    #[test]
    fn text_without_digits_or_items_yields_no_room_and_no_items() {
        let parser = IntentParser::new();
        for text in [
            "hello there",
            "what do you have",
            "can i get a towel",
            "one two three four five",
            "",
            "   ",
            "¿qué tal? 🍕",
        ] {
            let parsed = parser.parse(text, PriorState::fresh(), &catalog());
            assert_eq!(parsed.room_number, None, "{text:?}");
            assert!(parsed.items.is_empty(), "{text:?}");
        }
    }

    #[test]
    fn intent_precedence_follows_keywords() {
        let parser = IntentParser::new();
        let catalog = catalog();
        let intent = |text: &str| parser.parse(text, PriorState::fresh(), &catalog).intent;

        assert_eq!(intent("hi, I want to order"), Intent::Order);
        assert_eq!(intent("hello, show me the menu"), Intent::Menu);
        assert_eq!(intent("Good evening!"), Intent::Greeting);
        assert_eq!(intent("thank you so much"), Intent::Thanks);
        assert_eq!(intent("the wifi is slow"), Intent::Unknown);
    }

    #[test]
    fn confirmation_state_prefers_yes_and_no_over_checkout() {
        let parser = IntentParser::new();
        let catalog = catalog();
        let confirming = in_state(ConversationState::AwaitingConfirmation, true);

        assert_eq!(parser.parse("Yes", confirming, &catalog).control, Some(ControlSignal::Affirm));
        assert_eq!(
            parser.parse("order.confirm", confirming, &catalog).control,
            Some(ControlSignal::Affirm)
        );
        assert_eq!(parser.parse("no", confirming, &catalog).control, Some(ControlSignal::Decline));
        assert_eq!(parser.parse("yes no", confirming, &catalog).control, None);
        assert_eq!(parser.parse("maybe later", confirming, &catalog).control, None);

        let ordering = in_state(ConversationState::Ordering, true);
        assert_eq!(
            parser.parse("no that's all", ordering, &catalog).control,
            Some(ControlSignal::Checkout)
        );
        assert_eq!(
            parser.parse("please reset", ordering, &catalog).control,
            Some(ControlSignal::Reset)
        );
    }

    #[test]
    fn ratings_are_whole_message_integers() {
        let parser = IntentParser::new();
        let catalog = catalog();
        let rating = |text: &str| {
            parser.parse(text, in_state(ConversationState::AwaitingRating, false), &catalog).rating
        };

        assert_eq!(rating("4"), Some(4));
        assert_eq!(rating(" 5/5 "), Some(5));
        assert_eq!(rating("3 stars"), Some(3));
        assert_eq!(rating("rating.5"), Some(5));
        assert_eq!(rating("9"), Some(9));
        assert_eq!(rating("great, 5"), None);
        assert_eq!(rating("five"), None);
    }

    #[test]
    fn parsing_is_deterministic() {
        let parser = IntentParser::new();
        let catalog = catalog();
        let prior = in_state(ConversationState::Ordering, true);
        let first = parser.parse("2 fries and a chicken burger to 305", prior, &catalog);
        let second = parser.parse("2 fries and a chicken burger to 305", prior, &catalog);
        assert_eq!(first, second);
        assert_eq!(first.items, vec![mention("french fries", 2), mention("chicken burger", 1)]);
        assert_eq!(first.room_number.as_deref(), Some("305"));
    }
}
