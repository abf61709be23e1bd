use serde::Serialize;

/// Quick-reply option rendered as a button or list row by the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PromptOption {
    pub id: String,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PromptTemplate {
    pub body: String,
    pub options: Vec<PromptOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text { text: String },
    Prompt(PromptTemplate),
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Plain rendering for transports without interactive prompts.
    pub fn fallback_text(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Prompt(prompt) => {
                let mut lines = vec![prompt.body.clone()];
                for option in &prompt.options {
                    lines.push(format!("• {}", option.label));
                }
                if let Some(footer) = &prompt.footer {
                    lines.push(footer.clone());
                }
                lines.join("\n")
            }
        }
    }
}

pub struct PromptBuilder {
    body: String,
    options: Vec<PromptOption>,
    footer: Option<String>,
}

impl PromptBuilder {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into(), options: Vec::new(), footer: None }
    }

    pub fn option(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.options.push(PromptOption { id: id.into(), label: label.into() });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn build(self) -> OutboundMessage {
        OutboundMessage::Prompt(PromptTemplate {
            body: self.body,
            options: self.options,
            footer: self.footer,
        })
    }
}

pub fn format_price(symbol: &str, amount: i64) -> String {
    if amount < 0 {
        format!("-{symbol}{}", amount.unsigned_abs())
    } else {
        format!("{symbol}{amount}")
    }
}

#[cfg(test)]
mod tests {
    use super::{format_price, OutboundMessage, PromptBuilder};

    #[test]
    fn prompt_fallback_lists_options_and_footer() {
        let message = PromptBuilder::new("Confirm your order?")
            .option("order.confirm", "Yes")
            .option("order.cancel", "No")
            .footer("Reply yes or no")
            .build();

        assert_eq!(message.fallback_text(), "Confirm your order?\n• Yes\n• No\nReply yes or no");
    }

    #[test]
    fn prompt_serializes_with_type_tag() {
        let message = PromptBuilder::new("Pick one").option("a", "A").build();
        let json = serde_json::to_value(&message).expect("serialize");

        assert_eq!(json["type"], "prompt");
        assert_eq!(json["options"][0]["id"], "a");
        assert!(json.get("footer").is_none());
    }

    #[test]
    fn text_message_fallback_is_identity() {
        assert_eq!(OutboundMessage::text("hello").fallback_text(), "hello");
    }

    #[test]
    fn formats_prices_with_symbol() {
        assert_eq!(format_price("₹", 1750), "₹1750");
        assert_eq!(format_price("$", -5), "-$5");
    }
}
