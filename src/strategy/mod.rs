//! Decision strategy: deterministic fallback, personality rules, and
//! position sizing.

pub mod fallback;
pub mod personality;
pub mod sizing;
