//! Anti-Cheat Sanitizer
//!
//! Turns an untrusted game-state payload into typed field changes. Rules run in a fixed
//! order: allow-list, balance gain cap, numeric coercion, lifetime repair, regression
//! guard, one-way flags. [`SyncService::apply_sync`] runs the sanitizer and the write
//! inside one storage transaction so the checks see the row they overwrite.

use crate::{
    config::SanitizerConfig,
    errors::{VoidError, VoidResult},
    ledger::{Field, FieldChange, FieldKind, FieldValue, LedgerStore, User},
    metrics::EconomyMetrics,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::Arc};

/// Something the sanitizer changed or removed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Adjustment {
    Dropped { field: String },
    BalanceClamped { proposed: u64, applied: u64 },
    CoercedToZero { field: String },
    LifetimeRepaired { from: u64, to: u64 },
    LifetimeHeld { proposed: u64, kept: u64 },
    OneWayFlagRestored { field: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SyncRejection {
    RegressionDetected { stored_total: u64, incoming_total: u64 },
}

impl SyncRejection {
    pub fn code(&self) -> &'static str {
        match self {
            SyncRejection::RegressionDetected { .. } => "regression_detected",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedSync {
    pub changes: Vec<(Field, FieldChange)>,
    pub adjustments: Vec<Adjustment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncVerdict {
    Apply(SanitizedSync),
    Rejected(SyncRejection),
}

#[derive(Debug, Clone)]
pub struct Sanitizer {
    config: SanitizerConfig,
}

impl Sanitizer {
    pub fn new(config: SanitizerConfig) -> Self {
        Self { config }
    }

    pub fn sanitize(&self, current: &User, payload: &Map<String, Value>) -> VoidResult<SyncVerdict> {
        let mut adjustments = Vec::new();
        let mut values: BTreeMap<Field, FieldValue> = BTreeMap::new();

        for (key, raw) in payload {
            let Some(field) = Field::from_name(key).filter(|f| f.client_writable()) else {
                adjustments.push(Adjustment::Dropped { field: key.clone() });
                continue;
            };

            let value = match field.kind() {
                FieldKind::Balance => Some(FieldValue::Number(self.balance_value(current, raw, &mut adjustments))),
                FieldKind::Lifetime | FieldKind::Numeric | FieldKind::Tier => {
                    Some(FieldValue::Number(self.coerce_number(field, as_number(raw), &mut adjustments)))
                }
                FieldKind::Flag | FieldKind::OneWayFlag => raw.as_bool().map(FieldValue::Flag),
                FieldKind::Text => match raw {
                    Value::Null => Some(FieldValue::Text(None)),
                    Value::String(s) => Some(FieldValue::Text(Some(s.clone()))),
                    _ => None,
                },
                FieldKind::List => as_string_list(raw).map(FieldValue::List),
                FieldKind::Timestamp => match raw {
                    Value::Null => Some(FieldValue::Timestamp(None)),
                    Value::String(s) => DateTime::parse_from_rfc3339(s)
                        .ok()
                        .map(|t| FieldValue::Timestamp(Some(t.with_timezone(&Utc)))),
                    _ => None,
                },
            };

            match value {
                Some(value) => {
                    values.insert(field, value);
                }
                None => adjustments.push(Adjustment::Dropped { field: key.clone() }),
            }
        }

        if values.is_empty() {
            return Err(VoidError::Validation("No data to update".to_string()));
        }

        if let Some(FieldValue::Number(incoming)) = values.get(&Field::TotalParticlesCollected).cloned() {
            let stored = current.total_collected;
            let incoming_particles = match values.get(&Field::Particles) {
                Some(FieldValue::Number(p)) => *p,
                _ => 0,
            };

            let mut total = incoming;
            if total < self.config.near_zero
                && stored > self.config.meaningful_progress
                && incoming_particles > 0
            {
                total = stored.max(incoming_particles);
                adjustments.push(Adjustment::LifetimeRepaired { from: incoming, to: total });
            }

            if stored > self.config.meaningful_progress && total < self.config.near_zero {
                return Ok(SyncVerdict::Rejected(SyncRejection::RegressionDetected {
                    stored_total: stored,
                    incoming_total: incoming,
                }));
            }

            if total < stored {
                adjustments.push(Adjustment::LifetimeHeld { proposed: total, kept: stored });
                total = stored;
            }
            values.insert(Field::TotalParticlesCollected, FieldValue::Number(total));
        }

        if current.premium_vip && values.get(&Field::PremiumVip) == Some(&FieldValue::Flag(false)) {
            values.insert(Field::PremiumVip, FieldValue::Flag(true));
            adjustments.push(Adjustment::OneWayFlagRestored {
                field: Field::PremiumVip.name().to_string(),
            });
        }

        Ok(SyncVerdict::Apply(SanitizedSync {
            changes: values
                .into_iter()
                .map(|(field, value)| (field, FieldChange::Replace(value)))
                .collect(),
            adjustments,
        }))
    }

    fn balance_value(&self, current: &User, raw: &Value, adjustments: &mut Vec<Adjustment>) -> u64 {
        let proposed = as_number(raw);
        let limit = current.balance.saturating_add(self.config.max_gain_per_sync);
        let clamped = match proposed {
            Some(p) if p.is_finite() && p > limit as f64 => {
                adjustments.push(Adjustment::BalanceClamped {
                    proposed: if p >= u64::MAX as f64 { u64::MAX } else { p as u64 },
                    applied: limit,
                });
                Some(limit as f64)
            }
            other => other,
        };
        self.coerce_number(Field::Particles, clamped, adjustments)
    }

    /// Non-numeric, NaN, negative or above-ceiling values become 0
    fn coerce_number(&self, field: Field, value: Option<f64>, adjustments: &mut Vec<Adjustment>) -> u64 {
        match value {
            Some(v) if v.is_finite() && v >= 0.0 && v <= self.config.numeric_ceiling as f64 => {
                (v as u64).min(self.config.numeric_ceiling)
            }
            _ => {
                adjustments.push(Adjustment::CoercedToZero {
                    field: field.name().to_string(),
                });
                0
            }
        }
    }
}

fn as_number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_string_list(raw: &Value) -> Option<Vec<String>> {
    raw.as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Saved { user: User, adjustments: Vec<Adjustment> },
    Rejected(SyncRejection),
}

/// Sanitize-then-apply for client syncs
pub struct SyncService {
    ledger: Arc<LedgerStore>,
    sanitizer: Sanitizer,
    metrics: Arc<EconomyMetrics>,
}

impl SyncService {
    pub fn new(ledger: Arc<LedgerStore>, sanitizer: Sanitizer, metrics: Arc<EconomyMetrics>) -> Self {
        Self {
            ledger,
            sanitizer,
            metrics,
        }
    }

    pub fn apply_sync(
        &self,
        subject: &str,
        payload: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> VoidResult<SyncOutcome> {
        let outcome = self.ledger.transaction("apply_sync", |txn| {
            let mut user = txn.lock_user(subject)?;
            user.missions.roll_over(now.date_naive());

            match self.sanitizer.sanitize(&user, payload)? {
                SyncVerdict::Rejected(rejection) => Ok(SyncOutcome::Rejected(rejection)),
                SyncVerdict::Apply(sanitized) => {
                    txn.apply_changes(&mut user, &sanitized.changes)?;
                    txn.put_user(&user, now)?;
                    user.updated_at = now;
                    Ok(SyncOutcome::Saved {
                        user,
                        adjustments: sanitized.adjustments,
                    })
                }
            }
        });

        match &outcome {
            Ok(SyncOutcome::Saved { adjustments, .. }) => {
                self.metrics.record_sync("saved");
                if adjustments.iter().any(|a| !matches!(a, Adjustment::Dropped { .. })) {
                    tracing::warn!(
                        subject = %crate::ledger::models::subject_prefix(subject),
                        adjustments = adjustments.len(),
                        "sync payload adjusted"
                    );
                }
            }
            Ok(SyncOutcome::Rejected(rejection)) => {
                self.metrics.record_sync(rejection.code());
                tracing::warn!(
                    subject = %crate::ledger::models::subject_prefix(subject),
                    reason = rejection.code(),
                    "sync rejected"
                );
            }
            Err(_) => self.metrics.record_sync("error"),
        }
        outcome
    }
}
