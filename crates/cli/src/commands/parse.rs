use std::path::Path;

use clap::ValueEnum;
use roomservice_agent::{IntentParser, PriorState};
use roomservice_core::domain::conversation::ConversationState;
use roomservice_core::domain::menu::MenuCatalog;
use roomservice_core::flows::ParsedMessage;
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StateArg {
    Initial,
    AwaitingRoom,
    MainMenu,
    Ordering,
    AwaitingConfirmation,
    AwaitingRating,
}

impl From<StateArg> for ConversationState {
    fn from(value: StateArg) -> Self {
        match value {
            StateArg::Initial => Self::Initial,
            StateArg::AwaitingRoom => Self::AwaitingRoom,
            StateArg::MainMenu => Self::MainMenu,
            StateArg::Ordering => Self::Ordering,
            StateArg::AwaitingConfirmation => Self::AwaitingConfirmation,
            StateArg::AwaitingRating => Self::AwaitingRating,
        }
    }
}

#[derive(Debug, Serialize)]
struct ParseReport<'a> {
    state: &'static str,
    text: &'a str,
    parsed: ParsedMessage,
}

pub fn run(menu_path: &Path, state: StateArg, pending_cart: bool, text: &str) -> CommandResult {
    let raw = match std::fs::read_to_string(menu_path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "parse",
                "menu_read",
                format!("could not read `{}`: {error}", menu_path.display()),
                2,
            );
        }
    };
    let catalog = match MenuCatalog::from_toml_str(&raw) {
        Ok(catalog) => catalog,
        Err(error) => {
            return CommandResult::failure("parse", "menu_invalid", error.to_string(), 3);
        }
    };

    let state = ConversationState::from(state);
    let parsed = IntentParser::new().parse(text, PriorState { state, pending_cart }, &catalog);
    let report = ParseReport { state: state.as_str(), text, parsed };

    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("parse", "serialization", error.to_string(), 4),
    }
}
