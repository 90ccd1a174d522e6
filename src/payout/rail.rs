//! Payment rail abstraction
//!
//! The payout processor only needs two things from the chain side: the hot wallet
//! balance and a transfer call. [`SimulatedRail`] keeps an in-process hot wallet and
//! can be told to fail, stall or go offline.

use crate::ledger::TokenAmount;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transaction_hash: String,
}

/// On-chain transfer interface
#[async_trait]
pub trait PaymentRail: Send + Sync {
    fn name(&self) -> &str;

    async fn hot_wallet_balance(&self) -> Result<TokenAmount, PayoutError>;

    /// Send `amount` to `to`. An `Err` means the transfer did not happen.
    async fn transfer(&self, to: &str, amount: TokenAmount) -> Result<TransferReceipt, PayoutError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("Transfer rejected: {0}")]
    Rejected(String),

    #[error("Invalid destination address: {0}")]
    InvalidAddress(String),

    #[error("Insufficient hot wallet funds: available {available}, required {required}")]
    InsufficientFunds {
        available: TokenAmount,
        required: TokenAmount,
    },

    #[error("Payment rail unreachable: {0}")]
    Unreachable(String),

    /// The rail did not answer in time; the transfer may or may not have happened
    #[error("Transfer timed out after {0}s")]
    Timeout(u64),
}

impl PayoutError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PayoutError::Unreachable(_) | PayoutError::Timeout(_))
    }
}

/// `0x` followed by 40 hex digits
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// In-process hot wallet
pub struct SimulatedRail {
    balance: Mutex<TokenAmount>,
    latency: Duration,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    nonce: AtomicU64,
    transfers: Mutex<Vec<(String, TokenAmount, String)>>,
}

impl SimulatedRail {
    pub fn new(opening_balance: TokenAmount) -> Self {
        Self {
            balance: Mutex::new(opening_balance),
            latency: Duration::ZERO,
            failing: Mutex::new(HashSet::new()),
            offline: AtomicBool::new(false),
            nonce: AtomicU64::new(0),
            transfers: Mutex::new(Vec::new()),
        }
    }

    /// Delay every transfer by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make transfers to `wallet` fail
    pub fn fail_transfers_to(&self, wallet: &str) {
        lock(&self.failing).insert(wallet.to_lowercase());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_balance(&self, balance: TokenAmount) {
        *lock(&self.balance) = balance;
    }

    /// Completed transfers as `(to, amount, hash)`
    pub fn transfers(&self) -> Vec<(String, TokenAmount, String)> {
        lock(&self.transfers).clone()
    }

    fn transaction_hash(&self, to: &str, amount: TokenAmount) -> String {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let salt: u64 = rand::random();
        let mut hasher = Sha256::new();
        hasher.update(to.as_bytes());
        hasher.update(amount.micro().to_be_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.update(salt.to_be_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PaymentRail for SimulatedRail {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn hot_wallet_balance(&self) -> Result<TokenAmount, PayoutError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PayoutError::Unreachable("simulated rail offline".to_string()));
        }
        Ok(*lock(&self.balance))
    }

    async fn transfer(&self, to: &str, amount: TokenAmount) -> Result<TransferReceipt, PayoutError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(PayoutError::Unreachable("simulated rail offline".to_string()));
        }
        if amount.is_zero() {
            return Err(PayoutError::Rejected("Amount must be positive".to_string()));
        }
        if !is_valid_address(to) {
            return Err(PayoutError::InvalidAddress(to.to_string()));
        }
        if lock(&self.failing).contains(&to.to_lowercase()) {
            return Err(PayoutError::Rejected("execution reverted".to_string()));
        }

        let hash = self.transaction_hash(to, amount);
        {
            let mut balance = lock(&self.balance);
            if *balance < amount {
                return Err(PayoutError::InsufficientFunds {
                    available: *balance,
                    required: amount,
                });
            }
            *balance = balance.saturating_sub(amount);
        }
        lock(&self.transfers).push((to.to_string(), amount, hash.clone()));

        Ok(TransferReceipt {
            transaction_hash: hash,
        })
    }
}
