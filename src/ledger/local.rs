use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use super::BalanceLedger;
use crate::market::{from_cents, to_cents};

#[derive(Debug, Default)]
struct LocalBalance {
    cents: i64,
    total_debited_cents: i64,
    total_credited_cents: i64,
}

/// In-memory balance held in whole cents.
#[derive(Debug, Default)]
pub struct LocalLedger {
    inner: Mutex<LocalBalance>,
}

impl LocalLedger {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            inner: Mutex::new(LocalBalance {
                cents: to_cents(initial_balance.max(0.0)),
                ..LocalBalance::default()
            }),
        }
    }

    pub fn balance(&self) -> f64 {
        from_cents(self.inner.lock().cents)
    }

    pub fn try_debit(&self, amount: f64) -> Result<f64> {
        let cents = validate_amount(amount)?;
        let mut inner = self.inner.lock();
        if inner.cents < cents {
            return Err(anyhow!(
                "insufficient balance: have {:.2}, need {:.2}",
                from_cents(inner.cents),
                amount
            ));
        }
        inner.cents -= cents;
        inner.total_debited_cents += cents;
        Ok(from_cents(inner.cents))
    }

    pub fn try_credit(&self, amount: f64) -> Result<f64> {
        let cents = validate_amount(amount)?;
        let mut inner = self.inner.lock();
        inner.cents += cents;
        inner.total_credited_cents += cents;
        Ok(from_cents(inner.cents))
    }

    /// External top-up (faucet, wallet transfer).
    pub fn deposit(&self, amount: f64) -> Result<f64> {
        self.try_credit(amount)
    }

    /// External withdrawal.
    pub fn withdraw(&self, amount: f64) -> Result<f64> {
        self.try_debit(amount)
    }

    pub fn totals(&self) -> (f64, f64) {
        let inner = self.inner.lock();
        (
            from_cents(inner.total_debited_cents),
            from_cents(inner.total_credited_cents),
        )
    }
}

fn validate_amount(amount: f64) -> Result<i64> {
    if !(amount.is_finite() && amount >= 0.0) {
        return Err(anyhow!("invalid amount {}", amount));
    }
    Ok(to_cents(amount))
}

#[async_trait::async_trait]
impl BalanceLedger for LocalLedger {
    async fn debit(&self, amount: f64) -> Result<f64> {
        self.try_debit(amount)
    }

    async fn credit(&self, amount: f64) -> Result<f64> {
        self.try_credit(amount)
    }

    async fn balance_of(&self) -> Result<f64> {
        Ok(self.balance())
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}
