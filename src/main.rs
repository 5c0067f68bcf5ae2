//! RoundMarket simulator
//!
//! Runs one market session end to end: a synthetic random-walk price feed,
//! the settlement clock, a demo bettor placing random bets on future rounds,
//! and a final report of history, stats and leaderboard.
//!
//! Usage:
//!   cargo run --bin roundmarket -- --market eth --rounds 30 --speed-ms 200
//!   cargo run --bin roundmarket -- --remote-ledger --series-db ./series.db --seed 7
//!   cargo run --bin roundmarket -- --hermes-replay ./hermes.jsonl

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use dotenv::dotenv;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roundmarket_backend::config::EngineConfig;
use roundmarket_backend::feed::{Market, PriceBoard};
use roundmarket_backend::leaderboard::SeriesStore;
use roundmarket_backend::ledger::{
    BalanceLedger, LocalLedger, RemoteLedgerConfig, SimulatedRemoteLedger,
};
use roundmarket_backend::market::BucketId;
use roundmarket_backend::session::{MarketSession, SessionEvent};

#[derive(Parser, Debug)]
#[command(name = "roundmarket")]
#[command(about = "Simulate a round-based prediction market")]
struct Args {
    /// Market to run (btc, eth, sol)
    #[arg(long, default_value = "btc")]
    market: Market,

    /// Settled rounds to run before reporting
    #[arg(long, default_value_t = 20)]
    rounds: u64,

    /// Wall-clock length of one countdown second, in ms
    #[arg(long, default_value_t = 1000)]
    speed_ms: u64,

    /// TOML config file
    #[arg(long, env = "ROUNDMARKET_CONFIG")]
    config: Option<PathBuf>,

    /// RNG seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Back the balance with the simulated remote ledger
    #[arg(long, default_value = "false")]
    remote_ledger: bool,

    /// SQLite file for leaderboard series persistence
    #[arg(long)]
    series_db: Option<String>,

    /// Countdown seconds between demo bets (0 disables the bettor)
    #[arg(long, default_value_t = 2)]
    bet_every: u64,

    /// Replay recorded Hermes latest-price bodies (one JSON per line)
    /// instead of the synthetic random walk
    #[arg(long)]
    hermes_replay: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let mut config = EngineConfig::load(args.config.as_deref())?;
    if args.seed.is_some() {
        config.rng_seed = args.seed;
    }
    let speed = Duration::from_millis(args.speed_ms.max(1));

    let ledger: Arc<dyn BalanceLedger> = if args.remote_ledger {
        Arc::new(SimulatedRemoteLedger::new(
            config.initial_balance,
            RemoteLedgerConfig::from_env(),
            config.rng_seed,
        ))
    } else {
        Arc::new(LocalLedger::new(config.initial_balance))
    };
    let store = args
        .series_db
        .as_deref()
        .map(SeriesStore::new)
        .transpose()
        .context("open series store")?;

    let prices = Arc::new(PriceBoard::new());
    let session = Arc::new(
        MarketSession::new(config.clone(), args.market, ledger.clone(), prices.clone(), store).await?,
    );
    let mut events = session.subscribe();

    info!(
        market = %args.market,
        rounds = args.rounds,
        speed_ms = args.speed_ms,
        ledger = ledger.kind(),
        "starting simulation"
    );

    let feed = match &args.hermes_replay {
        Some(path) => {
            let bodies = load_hermes_replay(path)?;
            info!(path = %path.display(), bodies = bodies.len(), "replaying hermes prices");
            tokio::spawn(run_hermes_replay(prices.clone(), bodies, speed))
        }
        None => tokio::spawn(run_price_feed(
            prices.clone(),
            args.market,
            speed,
            config.rng_seed,
        )),
    };
    let bettor = (args.bet_every > 0).then(|| {
        tokio::spawn(run_demo_bettor(
            session.clone(),
            speed * args.bet_every as u32,
            config.rng_seed.map(|s| s.wrapping_add(7)),
        ))
    });
    let clock = session.clone().spawn_clock(speed);

    let mut settled = 0u64;
    while settled < args.rounds {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::RoundSettled { event, balance, pnl, .. }) => {
                    settled += 1;
                    let outcome = match &event.user_outcome {
                        Some(o) if o.won => format!("WIN +{:.2}", o.payout - o.stake),
                        Some(o) => format!("LOSE -{:.2}", o.stake),
                        None => "-".to_string(),
                    };
                    info!(
                        round_id = event.round_id,
                        bucket = %event.winning_bucket,
                        price = event.settlement_price,
                        change_pct = event.change_pct,
                        outcome = %outcome,
                        balance,
                        pnl,
                        "settled {}/{}",
                        settled,
                        args.rounds
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event receiver lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    clock.abort();
    feed.abort();
    if let Some(b) = bettor {
        b.abort();
    }

    print_report(&session).await;
    Ok(())
}

/// Random walk around a per-market reference price, one tick per period.
async fn run_price_feed(prices: Arc<PriceBoard>, market: Market, period: Duration, seed: Option<u64>) {
    let mut rng = match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s.wrapping_add(3)),
        None => ChaCha8Rng::from_entropy(),
    };
    let mut price = reference_price(market);
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        // +-0.01% per tick straddles both classification thresholds
        let step: f64 = rng.gen_range(-1.0e-4..1.0e-4);
        price *= 1.0 + step;
        prices.record(market, price, Utc::now().timestamp_millis());
    }
}

fn load_hermes_replay(path: &Path) -> Result<Vec<serde_json::Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read hermes replay {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("parse line {}", i + 1))
        })
        .collect()
}

/// Feed one recorded body per period, looping over the recording.
async fn run_hermes_replay(prices: Arc<PriceBoard>, bodies: Vec<serde_json::Value>, period: Duration) {
    if bodies.is_empty() {
        warn!("hermes replay is empty; no prices will arrive");
        return;
    }
    let mut interval = tokio::time::interval(period);
    for body in bodies.iter().cycle() {
        interval.tick().await;
        let accepted = prices.ingest_hermes(body, Utc::now().timestamp_millis());
        if accepted == 0 {
            debug!("hermes body had no usable prices");
        }
    }
}

async fn run_demo_bettor(session: Arc<MarketSession>, period: Duration, seed: Option<u64>) {
    let mut rng = match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    };
    let n = session.config().visible_rounds;
    let first_open = session.config().current_index() + 1;
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        let index = rng.gen_range(first_open..n);
        let bucket = BucketId::ALL[rng.gen_range(0..BucketId::ALL.len())];
        let amount = [0.25, 0.5, 1.0][rng.gen_range(0..3)];
        match session.place_bet(index, bucket, amount).await {
            Ok(receipt) => debug!(
                round_id = receipt.round_id,
                bucket = %receipt.bucket,
                amount = receipt.amount,
                "demo bet placed"
            ),
            Err(reason) => debug!(index, reason = %reason, "demo bet rejected"),
        }
    }
}

fn reference_price(market: Market) -> f64 {
    match market {
        Market::BtcUsd => 64_000.0,
        Market::EthUsd => 3_100.0,
        Market::SolUsd => 145.0,
    }
}

async fn print_report(session: &MarketSession) {
    let snap = session.snapshot().await;

    println!();
    println!(
        "=== {} ({}) session {} ===",
        snap.market,
        snap.market.symbol(),
        snap.session_id
    );
    println!(
        "Balance: {:.2}  Pending: {:.2}  PnL: {:+.2}",
        snap.balance, snap.pending_stake, snap.pnl
    );
    if snap.owed_credit > 0.0 {
        println!("Owed by ledger: {:.2}", snap.owed_credit);
    }
    let win_rate = snap
        .stats
        .win_rate_pct()
        .map(|r| format!("{:.1}%", r))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "Bets settled: {}  Wins: {}  Win rate: {}  Staked: {:.2}  Winnings: {:.2}",
        snap.stats.completed, snap.stats.wins, win_rate, snap.stats.total_staked, snap.stats.total_winnings
    );
    println!(
        "Rounds settled: {}  Tie-breaks: {}  Stale price ticks: {}  Duplicate fires: {}",
        snap.settlement.rounds_settled,
        snap.settlement.tie_breaks,
        snap.settlement.stale_price_ticks,
        snap.settlement.duplicate_ticks_ignored
    );

    println!();
    println!("--- Recent bets ---");
    for row in snap.history.iter().rev().take(10) {
        println!(
            "#{:<6} {:<12} stake {:>6.2}  payout {:>6.2}  {:+.2}  @ {:.2} ({:+.4}%)",
            row.round_id,
            row.bucket_label,
            row.stake,
            row.payout,
            row.profit,
            row.settlement_price,
            row.change_pct
        );
    }
    if !snap.active_bets.is_empty() {
        println!();
        println!("--- Open bets ---");
        for bet in &snap.active_bets {
            println!(
                "#{:<6} {:<12} stake {:>6.2}  pool {:>7.2}  est {:>6.2}",
                bet.round_id, bet.label, bet.amount, bet.pool, bet.est_payout
            );
        }
    }

    println!();
    println!("--- Leaderboard ---");
    for entry in &snap.rankings {
        println!("{:>2}. {:<8} {:+.2}", entry.rank, entry.name, entry.value);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roundmarket_backend=info,roundmarket=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    let _ = dotenv();

    // also the crate-root .env when launched from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
