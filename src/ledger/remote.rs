use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use super::{BalanceLedger, LocalLedger};

/// Simulated settlement-network behaviour
#[derive(Debug, Clone)]
pub struct RemoteLedgerConfig {
    /// Base round-trip latency in ms (random jitter added on top)
    pub base_latency_ms: u64,
    /// Max additional random latency in ms
    pub latency_jitter_ms: u64,
    /// Probability a debit/credit is refused (0.0 to 1.0)
    pub reject_prob: f64,
}

impl Default for RemoteLedgerConfig {
    fn default() -> Self {
        Self {
            base_latency_ms: 80,
            latency_jitter_ms: 120,
            reject_prob: 0.02,
        }
    }
}

impl RemoteLedgerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("REMOTE_LEDGER_BASE_LATENCY_MS") {
            if let Ok(ms) = v.parse() {
                config.base_latency_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("REMOTE_LEDGER_LATENCY_JITTER_MS") {
            if let Ok(ms) = v.parse() {
                config.latency_jitter_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("REMOTE_LEDGER_REJECT_PROB") {
            if let Ok(prob) = v.parse() {
                config.reject_prob = prob;
            }
        }

        config
    }

    /// No latency, never rejects.
    pub fn instant() -> Self {
        Self {
            base_latency_ms: 0,
            latency_jitter_ms: 0,
            reject_prob: 0.0,
        }
    }
}

/// Ledger stub standing in for an off-process balance service.
///
/// The balance itself lives in a `LocalLedger`; every call first pays the
/// simulated round trip and may be refused before anything is applied.
#[derive(Debug)]
pub struct SimulatedRemoteLedger {
    pub config: RemoteLedgerConfig,
    book: LocalLedger,
    rng: Mutex<ChaCha8Rng>,
}

impl SimulatedRemoteLedger {
    pub fn new(initial_balance: f64, config: RemoteLedgerConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            config,
            book: LocalLedger::new(initial_balance),
            rng: Mutex::new(rng),
        }
    }

    /// Pay the simulated round trip; Err when the call is refused.
    async fn round_trip(&self, op: &'static str, amount: f64) -> Result<()> {
        let (latency_ms, refused) = {
            let mut rng = self.rng.lock();
            let jitter = if self.config.latency_jitter_ms > 0 {
                rng.gen_range(0..=self.config.latency_jitter_ms)
            } else {
                0
            };
            let refused = rng.gen::<f64>() < self.config.reject_prob;
            (self.config.base_latency_ms + jitter, refused)
        };

        if latency_ms > 0 {
            sleep(Duration::from_millis(latency_ms)).await;
        }
        if refused {
            warn!(op, amount, latency_ms, "remote ledger refused request (simulated)");
            return Err(anyhow!("{} refused by remote ledger (simulated)", op));
        }
        debug!(op, amount, latency_ms, "remote ledger ack");
        Ok(())
    }
}

#[async_trait::async_trait]
impl BalanceLedger for SimulatedRemoteLedger {
    async fn debit(&self, amount: f64) -> Result<f64> {
        self.round_trip("debit", amount).await?;
        self.book.try_debit(amount)
    }

    async fn credit(&self, amount: f64) -> Result<f64> {
        self.round_trip("credit", amount).await?;
        self.book.try_credit(amount)
    }

    async fn balance_of(&self) -> Result<f64> {
        Ok(self.book.balance())
    }

    fn kind(&self) -> &'static str {
        "simulated_remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refusal_applies_nothing() {
        let config = RemoteLedgerConfig {
            reject_prob: 1.0,
            ..RemoteLedgerConfig::instant()
        };
        let ledger = SimulatedRemoteLedger::new(10.0, config, Some(1));
        assert!(ledger.debit(3.0).await.is_err());
        assert!(ledger.credit(3.0).await.is_err());
        assert_eq!(ledger.balance_of().await.unwrap(), 10.0);
    }

    #[tokio::test]
    async fn test_instant_ledger_behaves_like_local() {
        let ledger = SimulatedRemoteLedger::new(10.0, RemoteLedgerConfig::instant(), Some(2));
        assert_eq!(ledger.debit(2.5).await.unwrap(), 7.5);
        assert_eq!(ledger.credit(1.0).await.unwrap(), 8.5);
        assert!(ledger.debit(100.0).await.is_err());
        assert_eq!(ledger.kind(), "simulated_remote");
    }
}
