//! Ledger Entries
//!
//! Append-only records of money movement attempts. The caller-supplied
//! `external_transaction_id` is unique across the entire ledger and is
//! the sole idempotency key: a duplicate submit replays the cached
//! response stored on first success.

use serde::{Deserialize, Serialize};

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// A bet: decreases the playable balance
    Debit,
    /// A payout: increases the playable balance (zero amount is legal)
    Credit,
    /// A reversal of a debit, a tombstone, or an idempotency marker
    Rollback,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
            Self::Rollback => "rollback",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(Self::Debit),
            "credit" => Ok(Self::Credit),
            "rollback" => Ok(Self::Rollback),
            _ => Err(format!("unknown transaction kind: {}", s)),
        }
    }
}

/// The exact response body returned on the first successful write,
/// stored with the entry and returned verbatim on duplicate submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub balance: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tombstone: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_rolled_back: Option<bool>,
}

impl CachedResponse {
    /// Response body for a successful debit or credit
    pub fn money_moved(transaction_id: &str, balance: i64, currency: &str) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id.to_string()),
            balance,
            currency: currency.to_string(),
            rolled_back: None,
            message: None,
            tombstone: None,
            already_rolled_back: None,
        }
    }

    /// Response body for a rollback outcome
    pub fn rollback(
        transaction_id: &str,
        rolled_back: bool,
        balance: i64,
        currency: &str,
        message: &str,
    ) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id.to_string()),
            balance,
            currency: currency.to_string(),
            rolled_back: Some(rolled_back),
            message: Some(message.to_string()),
            tombstone: None,
            already_rolled_back: None,
        }
    }

    /// Mark this response as a tombstone record
    pub fn with_tombstone(mut self) -> Self {
        self.tombstone = Some(true);
        self
    }

    /// Mark this response as an already-rolled-back marker
    pub fn with_already_rolled_back(mut self) -> Self {
        self.already_rolled_back = Some(true);
        self
    }

    /// Whether this cached response records a tombstone
    pub fn is_tombstone(&self) -> bool {
        self.tombstone == Some(true)
    }
}

/// One committed ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    /// Caller-supplied id, unique across the entire ledger.
    pub external_transaction_id: String,
    pub kind: TransactionKind,
    /// Non-negative, in minor units. Zero for tombstones and markers.
    pub amount: i64,
    pub wallet_id: i64,
    pub session_id: i64,
    /// Provider-chosen round grouping; opaque to the ledger.
    pub round_id: Option<String>,
    /// For credits: the bet paid out. For a reversal: the debit reversed.
    /// Null on tombstones and idempotency markers.
    pub related_external_transaction_id: Option<String>,
    /// Wallet balance immediately after this entry was applied.
    pub balance_after: i64,
    pub response_cache: CachedResponse,
    /// True on rollback entries, and set on a debit once it is reversed.
    pub is_rollback: bool,
    pub created_at: i64,
}

/// Fields of a ledger entry about to be inserted.
#[derive(Debug, Clone)]
pub struct NewTransaction<'a> {
    pub external_transaction_id: &'a str,
    pub kind: TransactionKind,
    pub amount: i64,
    pub wallet_id: i64,
    pub session_id: i64,
    pub round_id: Option<&'a str>,
    pub related_external_transaction_id: Option<&'a str>,
    pub balance_after: i64,
    pub response_cache: &'a CachedResponse,
    pub is_rollback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            TransactionKind::Debit,
            TransactionKind::Credit,
            TransactionKind::Rollback,
        ] {
            let parsed: TransactionKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("payout".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_cached_response_serialization_skips_unset_fields() {
        let response = CachedResponse::money_moved("t1", 9000, "USD");
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["transactionId"], "t1");
        assert_eq!(json["balance"], 9000);
        assert_eq!(json["currency"], "USD");
        assert!(json.get("rolledBack").is_none());
        assert!(json.get("tombstone").is_none());
    }

    #[test]
    fn test_rollback_response_fields() {
        let response =
            CachedResponse::rollback("r9", true, 10_000, "USD", "tombstone").with_tombstone();
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["rolledBack"], true);
        assert_eq!(json["message"], "tombstone");
        assert_eq!(json["tombstone"], true);
        assert!(response.is_tombstone());
    }
}
