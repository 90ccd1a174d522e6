//! Withdrawal payouts: the payment rail seam and the batch processor

pub mod processor;
pub mod rail;

pub use processor::{
    BatchAbort, BatchOutcome, BatchReport, ItemOutcome, PayoutItemReport, PayoutProcessor,
    PayoutStatus, SkipReason,
};
pub use rail::{PaymentRail, PayoutError, SimulatedRail, TransferReceipt};
