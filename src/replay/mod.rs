//! Reaction-tree playback
//!
//! The engine hands out finished trees; this module walks them the way a
//! renderer would, so playback order and board consistency can be checked
//! without a live UI.

pub mod runner;
pub mod view;

pub use runner::Runner;
pub use view::{BoardView, ViewOrb, ViewProton};
