//! Menu catalog snapshots and the phrase index the intent parser scans with.
//!
//! A catalog is immutable once built. Reloads construct a fresh catalog and
//! swap it in whole, so a parse never observes a half-updated menu.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Normalized lookup key: lowercase, punctuation folded to spaces, trimmed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey(pub String);

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub key: ItemKey,
    pub display_name: String,
    pub category: String,
    /// Integer amount in the tenant's pricing unit.
    pub price: i64,
}

/// Raw menu entry as it appears in a menu file or the menu store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItemSpec {
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub price: i64,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl MenuItemSpec {
    pub fn new(name: impl Into<String>, category: impl Into<String>, price: i64) -> Self {
        Self { name: name.into(), category: category.into(), price, aliases: Vec::new() }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

fn default_category() -> String {
    "Menu".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct MenuFile {
    #[serde(default)]
    items: Vec<MenuItemSpec>,
}

/// Reads the `[[items]]` entries of a TOML menu file without validating them.
pub fn parse_menu_file(raw: &str) -> Result<Vec<MenuItemSpec>, DomainError> {
    toml::from_str::<MenuFile>(raw)
        .map(|file| file.items)
        .map_err(|error| DomainError::InvalidMenu(format!("menu file parse error: {error}")))
}

/// A searchable phrase that resolves to exactly one catalog item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogPhrase {
    pub tokens: Vec<String>,
    pub item: ItemKey,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MenuCatalog {
    items: Vec<MenuItem>,
    phrases: Vec<CatalogPhrase>,
}

impl MenuCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, DomainError> {
        Self::from_items(parse_menu_file(raw)?)
    }

    pub fn from_items(specs: Vec<MenuItemSpec>) -> Result<Self, DomainError> {
        let mut items = Vec::with_capacity(specs.len());
        let mut seen_keys = HashSet::new();
        let mut explicit: BTreeMap<Vec<String>, ItemKey> = BTreeMap::new();

        for spec in &specs {
            let key = normalize_item_name(&spec.name);
            if key.is_empty() {
                return Err(DomainError::InvalidMenu(format!(
                    "menu item `{}` has no searchable name",
                    spec.name
                )));
            }
            if spec.price < 0 {
                return Err(DomainError::InvalidMenu(format!(
                    "menu item `{}` has a negative price",
                    spec.name
                )));
            }
            if !seen_keys.insert(key.clone()) {
                return Err(DomainError::DuplicateMenuItem(key));
            }

            let item_key = ItemKey(key.clone());
            let mut names = vec![key];
            names.extend(spec.aliases.iter().map(|alias| normalize_item_name(alias)));
            for name in names.into_iter().filter(|name| !name.is_empty()) {
                let tokens = tokenize_normalized(&name);
                match explicit.get(&tokens) {
                    Some(owner) if owner != &item_key => {
                        return Err(DomainError::InvalidMenu(format!(
                            "menu phrase `{name}` is claimed by both `{owner}` and `{item_key}`"
                        )));
                    }
                    _ => {
                        explicit.insert(tokens, item_key.clone());
                    }
                }
            }

            items.push(MenuItem {
                key: item_key,
                display_name: spec.name.trim().to_string(),
                category: spec.category.trim().to_string(),
                price: spec.price,
            });
        }

        // Head nouns ("pizza" for "Margherita Pizza") are only searchable when a
        // single item would claim them and no explicit phrase already does.
        let mut derived: BTreeMap<Vec<String>, Vec<ItemKey>> = BTreeMap::new();
        for item in &items {
            let tokens = tokenize_normalized(&item.key.0);
            if tokens.len() < 2 {
                continue;
            }
            if let Some(head) = tokens.last() {
                derived.entry(vec![head.clone()]).or_default().push(item.key.clone());
            }
        }

        let mut phrases = explicit
            .into_iter()
            .map(|(tokens, item)| CatalogPhrase { tokens, item })
            .collect::<Vec<_>>();
        for (tokens, owners) in derived {
            let unclaimed = !phrases.iter().any(|phrase| phrase.tokens == tokens);
            if owners.len() == 1 && unclaimed {
                phrases.push(CatalogPhrase { tokens, item: owners[0].clone() });
            }
        }

        phrases.sort_by(|left, right| {
            right
                .tokens
                .len()
                .cmp(&left.tokens.len())
                .then_with(|| phrase_len(right).cmp(&phrase_len(left)))
                .then_with(|| left.tokens.cmp(&right.tokens))
        });

        Ok(Self { items, phrases })
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &ItemKey) -> Option<&MenuItem> {
        self.items.iter().find(|item| &item.key == key)
    }

    /// Phrases ordered most specific first: more tokens, then longer text.
    pub fn phrases(&self) -> &[CatalogPhrase] {
        &self.phrases
    }

    /// Items grouped by category in first-seen order.
    pub fn by_category(&self) -> Vec<(&str, Vec<&MenuItem>)> {
        let mut groups: Vec<(&str, Vec<&MenuItem>)> = Vec::new();
        for item in &self.items {
            match groups.iter_mut().find(|(category, _)| *category == item.category) {
                Some((_, members)) => members.push(item),
                None => groups.push((item.category.as_str(), vec![item])),
            }
        }
        groups
    }
}

fn phrase_len(phrase: &CatalogPhrase) -> usize {
    phrase.tokens.iter().map(String::len).sum()
}

pub fn normalize_item_name(name: &str) -> String {
    tokenize_normalized(&name.to_lowercase()).join(" ")
}

/// Splits already-lowercased text into alphanumeric tokens.
pub fn tokenize_normalized(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
