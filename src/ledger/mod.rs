//! Ledger Store: users, withdrawal requests, daily stats and idempotency keys

pub mod fields;
pub mod models;
pub mod store;

pub use fields::{Field, FieldChange, FieldKind, FieldValue};
pub use models::{
    BanEntry, ConversionRate, DailyConversionStats, TokenAmount, User, WithdrawalRequest,
    WithdrawalStatus,
};
pub use store::{LedgerStore, LedgerTxn, RefKind, WithdrawalUpdate};
