//! Physical items (copies) held by the library

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::id::ItemCode;

/// State of a physical item. Exactly one at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    #[default]
    Available,
    Loaned,
    Damaged,
    Lost,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Available => "available",
            ItemState::Loaned => "loaned",
            ItemState::Damaged => "damaged",
            ItemState::Lost => "lost",
        }
    }

    /// Returns true if the item can be lent right now
    pub fn is_lendable(&self) -> bool {
        matches!(self, ItemState::Available)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(ItemState::Available),
            "loaned" => Ok(ItemState::Loaned),
            "damaged" => Ok(ItemState::Damaged),
            "lost" => Ok(ItemState::Lost),
            other => Err(format!("Unknown item state: {}", other)),
        }
    }
}

/// Condition reported when an item comes back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    #[default]
    Available,
    Damaged,
    Lost,
}

impl ItemCondition {
    /// Parses a reported condition; blank input means the item is fine.
    /// Returns `None` for anything outside the allowed set.
    pub fn parse_reported(input: Option<&str>) -> Option<Self> {
        let raw = input.map(str::trim).unwrap_or("");
        if raw.is_empty() {
            return Some(ItemCondition::Available);
        }
        raw.parse().ok()
    }

    /// The item state this condition releases the item into
    pub fn item_state(&self) -> ItemState {
        match self {
            ItemCondition::Available => ItemState::Available,
            ItemCondition::Damaged => ItemState::Damaged,
            ItemCondition::Lost => ItemState::Lost,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.item_state().as_str()
    }
}

impl FromStr for ItemCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "available" => Ok(ItemCondition::Available),
            "damaged" => Ok(ItemCondition::Damaged),
            "lost" => Ok(ItemCondition::Lost),
            other => Err(format!("Unknown item condition: {}", other)),
        }
    }
}

impl fmt::Display for ItemCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lendable copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub code: ItemCode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub state: ItemState,

    /// Shelf or branch location
    #[serde(default)]
    pub location: String,
}

impl Item {
    /// Creates an available item at the given location
    pub fn new(code: ItemCode, location: impl Into<String>) -> Self {
        Self {
            code,
            title: None,
            state: ItemState::Available,
            location: location.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}
