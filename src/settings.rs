//! Game settings
//!
//! Loaded from a JSON file; missing fields fall back to defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::sim::notation::{HEAVY, THING};
use crate::sim::{EngineConfig, Placement, Reaction, ReactionKind, SimError, parse_layout};
use crate::trace::Category;

/// Built-in starting boards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LayoutPreset {
    #[default]
    Empty,
    Heavy,
    Thing,
}

impl LayoutPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutPreset::Empty => "Empty",
            LayoutPreset::Heavy => "Heavy",
            LayoutPreset::Thing => "Thing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "empty" | "blank" => Some(LayoutPreset::Empty),
            "heavy" => Some(LayoutPreset::Heavy),
            "thing" => Some(LayoutPreset::Thing),
            _ => None,
        }
    }

    /// Layout in board notation
    pub fn text(&self) -> &'static str {
        match self {
            LayoutPreset::Empty => "",
            LayoutPreset::Heavy => HEAVY,
            LayoutPreset::Thing => THING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Cells per side
    pub board_size: usize,
    /// Starting board
    pub layout: LayoutPreset,
    /// Board notation overriding `layout`
    pub custom_layout: Option<String>,

    // === Playback ===
    /// Pause between cascade rounds
    pub cascade_delay_ms: u32,
    /// Proton create/move animation
    pub proton_animation_ms: u32,
    /// Orb move animation
    pub orb_animation_ms: u32,

    // === Debug ===
    /// Trace categories printed at debug level
    pub trace: Vec<Category>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            board_size: DEFAULT_BOARD_SIZE,
            layout: LayoutPreset::Empty,
            custom_layout: None,

            cascade_delay_ms: CASCADE_DELAY_MS,
            proton_animation_ms: PROTON_ANIMATION_MS,
            orb_animation_ms: ORB_ANIMATION_MS,

            trace: Vec::new(),
        }
    }
}

impl Settings {
    /// Create settings starting from a preset board
    pub fn from_preset(preset: LayoutPreset) -> Self {
        Self {
            layout: preset,
            ..Self::default()
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            board_size: self.board_size,
            cascade_delay_ms: self.cascade_delay_ms,
        }
    }

    /// Starting board in notation
    pub fn layout_text(&self) -> &str {
        self.custom_layout
            .as_deref()
            .unwrap_or_else(|| self.layout.text())
    }

    pub fn placements(&self) -> Result<Vec<Placement>, SimError> {
        parse_layout(self.layout_text())
    }

    /// How long a renderer should animate a leaf
    pub fn animation_ms(&self, reaction: &Reaction) -> u32 {
        match reaction.kind {
            ReactionKind::CreateProton { .. } | ReactionKind::MoveProton { .. } => {
                self.proton_animation_ms
            }
            ReactionKind::MoveOrb { .. } => self.orb_animation_ms,
            ReactionKind::Sleep { duration_ms } => duration_ms,
            _ => 0,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load settings from `path`, falling back to defaults
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    return settings;
                }
                Err(e) => log::warn!("Ignoring {}: {}", path.display(), e),
            },
            Err(e) => log::info!("No settings at {} ({})", path.display(), e),
        }

        log::info!("Using default settings");
        Self::default()
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }
}
