//! Users, Wallets, Providers, and Games
//!
//! Reference records for the ledger. The ledger treats user and game ids
//! as opaque; only wallets carry money. Balances are integers in the
//! currency's minor unit (cents for USD).

use serde::{Deserialize, Serialize};

/// Default currency assigned when a launch request omits one
pub const DEFAULT_CURRENCY: &str = "USD";

/// Identity record. Immutable for the ledger's purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: i64,
}

/// The money-bearing record, unique per (user, currency).
///
/// Only `playable_balance` moves through callbacks. `redeemable_balance`
/// exists in the schema but is never touched by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub user_id: i64,
    pub currency: String,
    /// Balance available for bets, in minor units. Never negative.
    pub playable_balance: i64,
    /// Withdrawable balance, in minor units. Not moved by callbacks.
    pub redeemable_balance: i64,
    pub created_at: i64,
}

/// An external game-logic service the casino integrates with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameProvider {
    pub id: i64,
    pub name: String,
    /// Base URL of the provider's API, called at launch.
    pub api_url: String,
    pub enabled: bool,
    pub created_at: i64,
}

/// A launchable game belonging to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub provider_id: i64,
    pub name: String,
    /// The provider's own identifier for this game.
    pub external_game_id: String,
    pub active: bool,
    pub created_at: i64,
}
