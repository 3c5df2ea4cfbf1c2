//! The trading engine: per-agent cycle, position lifecycle, the
//! process-wide scheduler, and the adaptive tuner.

pub mod lifecycle;
pub mod scheduler;
pub mod trader;
pub mod tuner;
