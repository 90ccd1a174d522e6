pub mod spin;
pub mod tables;
pub mod types;
pub mod vrf_engine;

pub use spin::{ChanceRewardEngine, SpinOutcome};
pub use tables::PrizeTable;
pub use types::*;
pub use vrf_engine::VrfDrawEngine;
