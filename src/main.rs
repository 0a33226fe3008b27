//! chipvault - Casino Wallet Ledger Service
//!
//! Run modes:
//!   cargo run -- api     - Start the REST API (callbacks + launch)
//!   cargo run -- demo    - Run a seeded launch/debit/credit/rollback walk-through

use std::env;
use std::sync::Arc;

use chipvault::api::AppState;
use chipvault::config::CasinoConfig;
use chipvault::ledger::LedgerService;
use chipvault::provider::{HttpProviderNotifier, NoopProviderNotifier};
use chipvault::session::SessionService;
use chipvault::storage::SqliteCasinoStore;
use chipvault::{api, logging};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "api" => run_api_server().await,
        "demo" => {
            if let Err(e) = run_demo().await {
                eprintln!("Demo failed: {} ({})", e, e.error_code());
                std::process::exit(1);
            }
        }
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("chipvault - Casino Wallet Ledger");
    println!();
    println!("Usage:");
    println!("  chipvault api     Start the REST API server");
    println!("  chipvault demo    Run a seeded round walk-through");
    println!();
    println!("Environment Variables:");
    println!("  CASINO_SECRET        Signs Casino -> Provider requests");
    println!("  PROVIDER_SECRET      Verifies Provider -> Casino callbacks");
    println!("  CASINO_DB_PATH       SQLite database path (default: data/casino.db)");
    println!("  CASINO_API_PORT      REST API port (default: 3000)");
    println!("  CASINO_LOG_LEVEL     Logging level (default: info)");
    println!("  CASINO_LOG_JSON      Set to 1 for JSON logs");
}

/// Start the REST API server
async fn run_api_server() {
    let config = match CasinoConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("Logging init failed: {}", e);
    }

    config.print_summary();
    if config.require_secrets().is_err() {
        eprintln!("WARNING: shared secrets missing; signed callbacks will answer 500");
    }

    let store = match SqliteCasinoStore::new(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Failed to open database {}: {}", config.db_path, e);
            std::process::exit(1);
        }
    };

    let notifier: Arc<dyn chipvault::provider::ProviderNotifier> = match &config.casino_secret {
        Some(secret) => {
            match HttpProviderNotifier::new(secret.clone(), config.provider_timeout_secs) {
                Ok(notifier) => Arc::new(notifier),
                Err(e) => {
                    eprintln!("Failed to build provider client: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            eprintln!("WARNING: CASINO_SECRET missing; provider launch calls disabled");
            Arc::new(NoopProviderNotifier)
        }
    };

    let state = AppState::new(store, notifier, config.provider_secret.clone());

    if let Err(e) = api::start_server(state, config.api_port).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Run a seeded walk-through against an in-memory store
async fn run_demo() -> chipvault::Result<()> {
    println!("=== chipvault demo ===");
    println!();

    let store = Arc::new(SqliteCasinoStore::in_memory()?);
    let user = store.create_user("demo_player", "demo@example.com")?;
    let provider = store.create_provider("acme-games", "http://provider.local", true)?;
    let game = store.create_game(provider.id, "Book of Crabs", "boc-1", true)?;

    let sessions = SessionService::new(store.clone());
    let ledger = LedgerService::new(store.clone());

    let outcome = sessions.launch(user.id, game.id, None)?;
    let token = outcome.session.token.clone();
    println!("Launched session {} for {}", outcome.session.id, user.username);

    // Fund the wallet with $100.00
    store.with_tx::<_, chipvault::CasinoError>(|tx| {
        Ok(SqliteCasinoStore::set_wallet_balance(tx, outcome.wallet.id, 10_000)?)
    })?;
    println!("Funded wallet: 10000 minor units");
    println!();

    let debit = ledger.debit(&token, "demo-bet-1", "round-1", 2_000)?;
    println!("Bet 2000   -> balance {}", debit.response.balance);

    let credit = ledger.credit(&token, "demo-win-1", "round-1", 3_000, Some("demo-bet-1"))?;
    println!("Win 3000   -> balance {}", credit.response.balance);

    let debit = ledger.debit(&token, "demo-bet-2", "round-2", 1_500)?;
    println!("Bet 1500   -> balance {}", debit.response.balance);

    let rollback = ledger.rollback(&token, "demo-rb-1", "demo-bet-2", Some("round voided"))?;
    println!(
        "Rollback   -> balance {} ({})",
        rollback.response.balance,
        rollback.response.message.as_deref().unwrap_or("")
    );

    let replay = ledger.debit(&token, "demo-bet-1", "round-1", 2_000)?;
    println!(
        "Replay bet -> balance {} (duplicate: {})",
        replay.response.balance, replay.duplicate
    );

    sessions.end(&token)?;
    println!();

    println!("Ledger for wallet {}:", outcome.wallet.id);
    for entry in store.transactions_for_wallet(outcome.wallet.id)? {
        println!(
            "  {:<12} {:>6} -> balance {:>6}  [{}]",
            entry.external_transaction_id, entry.amount, entry.balance_after, entry.kind
        );
    }

    println!();
    println!("=== demo complete ===");
    Ok(())
}
