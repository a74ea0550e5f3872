//! Trading strategy implementation.
//!
//! Contains the core logic for:
//! - Volume spike detection against a historical baseline
//! - Flat/open position management with take-profit and stop-loss exits

mod position;
mod spike;

pub use position::{exit_signal, CycleOutcome, ExitReason, Position, PositionManager};
pub use spike::{baseline, is_spike, SpikeDetector, SpikeSignal};
