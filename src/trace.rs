//! Debug trace categories
//!
//! Each category is a `log` target. The binary turns the active categories
//! from [`Settings`](crate::Settings) into an `env_logger` filter, so only the
//! selected categories are printed.

use serde::{Deserialize, Serialize};

/// Board snapshots before and after commands
pub const STATE: &str = "chain_reaction::state";
/// Collision resolution decisions
pub const MERGE: &str = "chain_reaction::merge";
/// Reaction application during replay
pub const APPLY: &str = "chain_reaction::apply";
/// Command admission and dispatch
pub const COMMAND: &str = "chain_reaction::command";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    State,
    Merge,
    Apply,
    Command,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::State,
        Category::Merge,
        Category::Apply,
        Category::Command,
    ];

    pub fn target(&self) -> &'static str {
        match self {
            Category::State => STATE,
            Category::Merge => MERGE,
            Category::Apply => APPLY,
            Category::Command => COMMAND,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::State => "state",
            Category::Merge => "merge",
            Category::Apply => "apply",
            Category::Command => "command",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "state" | "orbs" => Some(Category::State),
            "merge" => Some(Category::Merge),
            "apply" => Some(Category::Apply),
            "command" | "interaction" => Some(Category::Command),
            _ => None,
        }
    }
}

/// Build a logger that prints warnings from everywhere and debug output only
/// for the given categories.
pub fn logger_for(categories: &[Category]) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log::LevelFilter::Warn);
    builder.filter_module("chain_reaction", log::LevelFilter::Info);
    for category in categories {
        builder.filter_module(category.target(), log::LevelFilter::Trace);
    }
    // RUST_LOG still wins
    builder.parse_default_env();
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_str(category.as_str()), Some(category));
            assert!(category.target().starts_with("chain_reaction::"));
        }
        assert_eq!(Category::from_str("ORBS"), Some(Category::State));
        assert_eq!(Category::from_str("nope"), None);
    }
}
