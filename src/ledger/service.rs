//! Ledger Engine
//!
//! Applies debits, credits, and rollbacks to wallets with exactly-once
//! semantics at the balance level:
//!
//! - Every operation first looks for an existing entry under the
//!   caller's transaction id and replays its cached response.
//! - Fresh mutations run as (lock wallet, check policy, write balance,
//!   append entry) inside one store transaction.
//! - The pre-check is an optimization only; the unique index on the
//!   external transaction id is the correctness anchor. A losing insert
//!   re-reads the winning entry and replays its cached response.
//!
//! Rollback policy: only debits reverse, each at most once. A rollback
//! naming an unknown original records a zero-amount tombstone under the
//! unknown id, so a later debit reusing that id is rejected by the
//! unique index instead of moving money.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{LedgerError, LedgerReply};
use crate::storage::{SqliteCasinoStore, StorageError};
use crate::types::{
    CachedResponse, GameSession, NewTransaction, TransactionKind, Wallet,
};

/// Message recorded on the nominal reversal of a debit
const MSG_ROLLED_BACK: &str = "rolled back";
/// Message recorded on a tombstone for an unknown original
const MSG_TOMBSTONE: &str = "tombstone";
/// Message recorded when the original was already reversed
const MSG_ALREADY_ROLLED_BACK: &str = "already rolled back";
/// Message returned when the named original is itself a reversal
const MSG_ROLLBACK_OF_ROLLBACK: &str = "cannot rollback a rollback";

/// Outcome of the locked reversal step; the already-reversed case is
/// only discoverable once the wallet lock is held.
enum ReverseStep {
    Reversed(CachedResponse),
    AlreadyReversed,
}

/// The idempotent transaction ledger and rollback engine
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<SqliteCasinoStore>,
}

impl LedgerService {
    pub fn new(store: Arc<SqliteCasinoStore>) -> Self {
        Self { store }
    }

    /// Read a session's wallet without locking. Never mutates state.
    pub fn balance(&self, session_token: &str) -> Result<Wallet, LedgerError> {
        let session = self.resolve_session(session_token)?;
        self.wallet_of(&session)
    }

    /// Debit a bet from the session's wallet.
    pub fn debit(
        &self,
        session_token: &str,
        external_id: &str,
        round_id: &str,
        amount: i64,
    ) -> Result<LedgerReply, LedgerError> {
        if let Some(prior) = self.store.find_transaction(external_id)? {
            debug!(target: "chipvault::ledger", external_id, "debit replayed from ledger");
            return Ok(LedgerReply::replayed(prior.response_cache));
        }

        let session = self.resolve_session(session_token)?;

        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let result = self.store.with_tx::<CachedResponse, LedgerError>(|tx| {
            let wallet = SqliteCasinoStore::wallet_for_update(tx, session.wallet_id)?;
            if wallet.playable_balance < amount {
                return Err(LedgerError::InsufficientFunds {
                    balance: wallet.playable_balance,
                    requested: amount,
                });
            }

            let new_balance = wallet.playable_balance - amount;
            SqliteCasinoStore::set_wallet_balance(tx, wallet.id, new_balance)?;

            let response = CachedResponse::money_moved(external_id, new_balance, &wallet.currency);
            SqliteCasinoStore::insert_transaction(
                tx,
                &NewTransaction {
                    external_transaction_id: external_id,
                    kind: TransactionKind::Debit,
                    amount,
                    wallet_id: wallet.id,
                    session_id: session.id,
                    round_id: Some(round_id),
                    related_external_transaction_id: None,
                    balance_after: new_balance,
                    response_cache: &response,
                    is_rollback: false,
                },
            )?;
            Ok(response)
        });

        match result {
            Ok(response) => {
                info!(
                    target: "chipvault::ledger",
                    external_id,
                    session_id = session.id,
                    amount,
                    balance = response.balance,
                    "debit applied"
                );
                Ok(LedgerReply::fresh(response))
            }
            Err(LedgerError::Storage(StorageError::Duplicate(_))) => {
                self.replay_winner(external_id)
            }
            Err(e) => Err(e),
        }
    }

    /// Credit a payout to the session's wallet. Zero amounts are legal
    /// (a lost round's nominal payout) and still produce an entry.
    pub fn credit(
        &self,
        session_token: &str,
        external_id: &str,
        round_id: &str,
        amount: i64,
        related_external_id: Option<&str>,
    ) -> Result<LedgerReply, LedgerError> {
        if let Some(prior) = self.store.find_transaction(external_id)? {
            debug!(target: "chipvault::ledger", external_id, "credit replayed from ledger");
            return Ok(LedgerReply::replayed(prior.response_cache));
        }

        let session = self.resolve_session(session_token)?;

        if amount < 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let result = self.store.with_tx::<CachedResponse, LedgerError>(|tx| {
            let wallet = SqliteCasinoStore::wallet_for_update(tx, session.wallet_id)?;

            let new_balance = wallet.playable_balance + amount;
            SqliteCasinoStore::set_wallet_balance(tx, wallet.id, new_balance)?;

            let response = CachedResponse::money_moved(external_id, new_balance, &wallet.currency);
            SqliteCasinoStore::insert_transaction(
                tx,
                &NewTransaction {
                    external_transaction_id: external_id,
                    kind: TransactionKind::Credit,
                    amount,
                    wallet_id: wallet.id,
                    session_id: session.id,
                    round_id: Some(round_id),
                    related_external_transaction_id: related_external_id,
                    balance_after: new_balance,
                    response_cache: &response,
                    is_rollback: false,
                },
            )?;
            Ok(response)
        });

        match result {
            Ok(response) => {
                info!(
                    target: "chipvault::ledger",
                    external_id,
                    session_id = session.id,
                    amount,
                    balance = response.balance,
                    "credit applied"
                );
                Ok(LedgerReply::fresh(response))
            }
            Err(LedgerError::Storage(StorageError::Duplicate(_))) => {
                self.replay_winner(external_id)
            }
            Err(e) => Err(e),
        }
    }

    /// Roll back a bet. Decision order: self-idempotency, session,
    /// locate original, tombstone, rollback-of-rollback, already
    /// reversed, payout rejection, nominal reversal.
    pub fn rollback(
        &self,
        session_token: &str,
        external_id: &str,
        original_external_id: &str,
        reason: Option<&str>,
    ) -> Result<LedgerReply, LedgerError> {
        if let Some(prior) = self.store.find_transaction(external_id)? {
            debug!(target: "chipvault::ledger", external_id, "rollback replayed from ledger");
            return Ok(LedgerReply::replayed(prior.response_cache));
        }

        let session = self.resolve_session(session_token)?;

        let original = match self.store.find_transaction(original_external_id)? {
            Some(original) => original,
            None => return self.record_tombstone(&session, external_id, original_external_id),
        };

        if original.kind == TransactionKind::Rollback {
            // A tombstone occupies the unknown original's id, so a retry
            // of that rollback lands here: replay its cached response.
            if original.response_cache.is_tombstone() {
                return Ok(LedgerReply::replayed(original.response_cache));
            }

            let wallet = self.wallet_of(&session)?;
            let response = CachedResponse::rollback(
                external_id,
                false,
                wallet.playable_balance,
                &wallet.currency,
                MSG_ROLLBACK_OF_ROLLBACK,
            );
            // Nothing is recorded for this outcome.
            return Ok(LedgerReply::fresh(response));
        }

        if original.kind == TransactionKind::Credit {
            return Err(LedgerError::CannotRollbackPayout(
                original_external_id.to_string(),
            ));
        }

        if original.is_rollback || self.store.find_reversal(original_external_id)?.is_some() {
            return self.record_already_rolled_back(&session, external_id);
        }

        // Nominal path: reverse the debit. The original's reversal state
        // is re-checked under the wallet lock, since a concurrent
        // rollback with a different id may have won the race.
        let result = self.store.with_tx::<ReverseStep, LedgerError>(|tx| {
            let fresh = SqliteCasinoStore::transaction_by_external_id(tx, original_external_id)?
                .ok_or_else(|| StorageError::NotFound(original_external_id.to_string()))?;
            if fresh.is_rollback {
                return Ok(ReverseStep::AlreadyReversed);
            }

            let wallet = SqliteCasinoStore::wallet_for_update(tx, session.wallet_id)?;
            let new_balance = wallet.playable_balance + fresh.amount;
            SqliteCasinoStore::set_wallet_balance(tx, wallet.id, new_balance)?;
            SqliteCasinoStore::mark_rolled_back(tx, original_external_id)?;

            let response = CachedResponse::rollback(
                external_id,
                true,
                new_balance,
                &wallet.currency,
                MSG_ROLLED_BACK,
            );
            SqliteCasinoStore::insert_transaction(
                tx,
                &NewTransaction {
                    external_transaction_id: external_id,
                    kind: TransactionKind::Rollback,
                    amount: fresh.amount,
                    wallet_id: wallet.id,
                    session_id: session.id,
                    round_id: fresh.round_id.as_deref(),
                    related_external_transaction_id: Some(original_external_id),
                    balance_after: new_balance,
                    response_cache: &response,
                    is_rollback: true,
                },
            )?;
            Ok(ReverseStep::Reversed(response))
        });

        match result {
            Ok(ReverseStep::Reversed(response)) => {
                info!(
                    target: "chipvault::ledger",
                    external_id,
                    original = original_external_id,
                    reason = reason.unwrap_or(""),
                    balance = response.balance,
                    "bet rolled back"
                );
                Ok(LedgerReply::fresh(response))
            }
            Ok(ReverseStep::AlreadyReversed) => {
                self.record_already_rolled_back(&session, external_id)
            }
            Err(LedgerError::Storage(StorageError::Duplicate(_))) => {
                self.replay_winner(external_id)
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn resolve_session(&self, token: &str) -> Result<GameSession, LedgerError> {
        self.store
            .session_by_token(token)?
            .filter(GameSession::is_active)
            .ok_or(LedgerError::InvalidSession)
    }

    fn wallet_of(&self, session: &GameSession) -> Result<Wallet, LedgerError> {
        self.store
            .get_wallet(session.wallet_id)?
            .ok_or_else(|| {
                StorageError::NotFound(format!("wallet {}", session.wallet_id)).into()
            })
    }

    /// Record a zero-amount tombstone under the unknown original's id.
    /// No lock, no balance change.
    fn record_tombstone(
        &self,
        session: &GameSession,
        external_id: &str,
        original_external_id: &str,
    ) -> Result<LedgerReply, LedgerError> {
        let wallet = self.wallet_of(session)?;
        let response = CachedResponse::rollback(
            external_id,
            true,
            wallet.playable_balance,
            &wallet.currency,
            MSG_TOMBSTONE,
        )
        .with_tombstone();

        let entry = NewTransaction {
            external_transaction_id: original_external_id,
            kind: TransactionKind::Rollback,
            amount: 0,
            wallet_id: wallet.id,
            session_id: session.id,
            round_id: None,
            related_external_transaction_id: None,
            balance_after: wallet.playable_balance,
            response_cache: &response,
            is_rollback: true,
        };

        match self.store.append_transaction(&entry) {
            Ok(_) => {
                warn!(
                    target: "chipvault::ledger",
                    external_id,
                    original = original_external_id,
                    "rollback for unknown original, tombstone recorded"
                );
                Ok(LedgerReply::fresh(response))
            }
            Err(StorageError::Duplicate(_)) => self.replay_winner(original_external_id),
            Err(e) => Err(e.into()),
        }
    }

    /// Record a zero-amount idempotency marker for a repeat reversal
    /// under a new rollback id. No lock, no balance change.
    fn record_already_rolled_back(
        &self,
        session: &GameSession,
        external_id: &str,
    ) -> Result<LedgerReply, LedgerError> {
        let wallet = self.wallet_of(session)?;
        let response = CachedResponse::rollback(
            external_id,
            true,
            wallet.playable_balance,
            &wallet.currency,
            MSG_ALREADY_ROLLED_BACK,
        )
        .with_already_rolled_back();

        let entry = NewTransaction {
            external_transaction_id: external_id,
            kind: TransactionKind::Rollback,
            amount: 0,
            wallet_id: wallet.id,
            session_id: session.id,
            round_id: None,
            related_external_transaction_id: None,
            balance_after: wallet.playable_balance,
            response_cache: &response,
            is_rollback: true,
        };

        match self.store.append_transaction(&entry) {
            Ok(_) => Ok(LedgerReply::fresh(response)),
            Err(StorageError::Duplicate(_)) => self.replay_winner(external_id),
            Err(e) => Err(e.into()),
        }
    }

    /// A losing insert means another request already wrote this id:
    /// return the winner's cached response as a normal duplicate.
    fn replay_winner(&self, external_id: &str) -> Result<LedgerReply, LedgerError> {
        debug!(
            target: "chipvault::ledger",
            external_id,
            "insert lost the uniqueness race, replaying winner"
        );
        let winner = self
            .store
            .find_transaction(external_id)?
            .ok_or_else(|| StorageError::NotFound(external_id.to_string()))?;
        Ok(LedgerReply::replayed(winner.response_cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        store: Arc<SqliteCasinoStore>,
        ledger: LedgerService,
        token: String,
        wallet_id: i64,
    }

    /// A funded wallet behind an active session. Starting balance is
    /// $100.00 (10_000 minor units) unless overridden.
    fn fixture_with_balance(balance: i64) -> Fixture {
        let store = Arc::new(SqliteCasinoStore::in_memory().unwrap());
        let user = store.create_user("alice", "alice@example.com").unwrap();
        let provider = store
            .create_provider("acme-games", "http://provider.test", true)
            .unwrap();
        let game = store
            .create_game(provider.id, "Book of Crabs", "boc-1", true)
            .unwrap();
        let wallet = store.get_or_create_wallet(user.id, "USD").unwrap();
        let session = store
            .insert_session("feedfacefeedface", user.id, wallet.id, game.id)
            .unwrap();

        store
            .with_tx::<_, StorageError>(|tx| {
                SqliteCasinoStore::set_wallet_balance(tx, wallet.id, balance)
            })
            .unwrap();

        Fixture {
            ledger: LedgerService::new(store.clone()),
            store,
            token: session.token,
            wallet_id: wallet.id,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_balance(10_000)
    }

    impl Fixture {
        fn balance(&self) -> i64 {
            self.store
                .get_wallet(self.wallet_id)
                .unwrap()
                .unwrap()
                .playable_balance
        }

        fn entries(&self) -> Vec<crate::types::TransactionRecord> {
            self.store.transactions_for_wallet(self.wallet_id).unwrap()
        }
    }

    #[test]
    fn test_simple_win() {
        let f = fixture();

        let debit = f.ledger.debit(&f.token, "t1", "round-1", 1_000).unwrap();
        assert!(!debit.duplicate);
        assert_eq!(debit.response.balance, 9_000);

        let credit = f
            .ledger
            .credit(&f.token, "t2", "round-1", 2_500, Some("t1"))
            .unwrap();
        assert_eq!(credit.response.balance, 11_500);

        assert_eq!(f.balance(), 11_500);
        assert_eq!(f.entries().len(), 2);
    }

    #[test]
    fn test_multi_bet_partial_win() {
        let f = fixture();

        assert_eq!(f.ledger.debit(&f.token, "t1", "r", 500).unwrap().response.balance, 9_500);
        assert_eq!(f.ledger.debit(&f.token, "t2", "r", 1_000).unwrap().response.balance, 8_500);
        assert_eq!(f.ledger.debit(&f.token, "t3", "r", 500).unwrap().response.balance, 8_000);

        let c1 = f.ledger.credit(&f.token, "c1", "r", 1_500, Some("t1")).unwrap();
        assert_eq!(c1.response.balance, 9_500);

        // A zero-amount payout is a real ledger entry at the same balance
        let c2 = f.ledger.credit(&f.token, "c2", "r", 0, Some("t2")).unwrap();
        assert_eq!(c2.response.balance, 9_500);

        assert_eq!(f.balance(), 9_500);
        assert_eq!(f.entries().len(), 5);
    }

    #[test]
    fn test_bet_with_rollback() {
        let f = fixture();

        f.ledger.debit(&f.token, "t1", "r1", 2_000).unwrap();
        f.ledger.debit(&f.token, "t2", "r2", 1_000).unwrap();
        f.ledger.credit(&f.token, "c1", "r2", 3_000, Some("t2")).unwrap();
        assert_eq!(f.balance(), 10_000);

        let reply = f.ledger.rollback(&f.token, "r1x", "t1", None).unwrap();
        assert_eq!(reply.response.rolled_back, Some(true));
        assert_eq!(reply.response.balance, 12_000);

        assert_eq!(f.balance(), 12_000);
        let entries = f.entries();
        assert_eq!(entries.len(), 4);

        let original = f.store.find_transaction("t1").unwrap().unwrap();
        assert!(original.is_rollback);

        let reversal = f.store.find_reversal("t1").unwrap().unwrap();
        assert_eq!(reversal.amount, 2_000);
        assert_eq!(reversal.balance_after, 12_000);
    }

    #[test]
    fn test_duplicate_debit_replays_identical_response() {
        let f = fixture();

        let first = f.ledger.debit(&f.token, "tid", "r", 500).unwrap();
        let second = f.ledger.debit(&f.token, "tid", "r", 500).unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(first.response, second.response);
        assert_eq!(f.balance(), 9_500);
        assert_eq!(f.entries().len(), 1);
    }

    #[test]
    fn test_duplicate_ignores_kind_and_payload() {
        let f = fixture();

        let first = f.ledger.debit(&f.token, "tid", "r", 500).unwrap();
        // A credit re-using the same id replays the debit's response
        let replay = f
            .ledger
            .credit(&f.token, "tid", "r", 9_999, None)
            .unwrap();

        assert!(replay.duplicate);
        assert_eq!(replay.response, first.response);
        assert_eq!(f.balance(), 9_500);
    }

    #[test]
    fn test_duplicate_credit_including_zero_amount() {
        let f = fixture();

        let first = f.ledger.credit(&f.token, "c0", "r", 0, None).unwrap();
        let second = f.ledger.credit(&f.token, "c0", "r", 0, None).unwrap();

        assert!(second.duplicate);
        assert_eq!(first.response, second.response);
        assert_eq!(f.entries().len(), 1);
        assert_eq!(f.balance(), 10_000);
    }

    #[test]
    fn test_tombstone_for_unknown_original() {
        let f = fixture();

        let reply = f.ledger.rollback(&f.token, "r9", "ghost", None).unwrap();

        assert_eq!(reply.response.rolled_back, Some(true));
        assert_eq!(reply.response.message.as_deref(), Some("tombstone"));
        assert_eq!(reply.response.tombstone, Some(true));
        assert_eq!(f.balance(), 10_000);

        let entries = f.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, TransactionKind::Rollback);
        assert_eq!(entries[0].amount, 0);
        assert!(entries[0].response_cache.is_tombstone());
    }

    #[test]
    fn test_tombstone_is_fail_closed_for_late_debit() {
        let f = fixture();

        let tombstone = f.ledger.rollback(&f.token, "r9", "ghost", None).unwrap();

        // The tombstone occupies "ghost": the late-arriving debit cannot
        // move money, it replays the tombstone's cached response.
        let late = f.ledger.debit(&f.token, "ghost", "r", 1_000).unwrap();
        assert!(late.duplicate);
        assert_eq!(late.response, tombstone.response);
        assert_eq!(f.balance(), 10_000);
        assert_eq!(f.entries().len(), 1);
    }

    #[test]
    fn test_tombstone_rollback_retry_is_idempotent() {
        let f = fixture();

        let first = f.ledger.rollback(&f.token, "r9", "ghost", None).unwrap();
        let retry = f.ledger.rollback(&f.token, "r9", "ghost", None).unwrap();
        let rekeyed = f.ledger.rollback(&f.token, "r10", "ghost", None).unwrap();

        assert!(retry.duplicate);
        assert_eq!(first.response, retry.response);
        assert_eq!(first.response, rekeyed.response);
        assert_eq!(f.entries().len(), 1);
        assert_eq!(f.balance(), 10_000);
    }

    #[test]
    fn test_rollback_of_a_real_rollback_is_refused_without_recording() {
        let f = fixture();

        f.ledger.debit(&f.token, "t1", "r", 1_000).unwrap();
        f.ledger.rollback(&f.token, "rb1", "t1", None).unwrap();
        let entries_before = f.entries().len();

        let reply = f.ledger.rollback(&f.token, "rb2", "rb1", None).unwrap();

        assert_eq!(reply.response.rolled_back, Some(false));
        assert_eq!(
            reply.response.message.as_deref(),
            Some("cannot rollback a rollback")
        );
        assert_eq!(f.entries().len(), entries_before);
        assert_eq!(f.balance(), 10_000);
    }

    #[test]
    fn test_double_rollback_records_marker_without_balance_change() {
        let f = fixture();

        f.ledger.debit(&f.token, "t1", "r", 1_000).unwrap();
        f.ledger.rollback(&f.token, "rb1", "t1", None).unwrap();
        assert_eq!(f.balance(), 10_000);

        let second = f.ledger.rollback(&f.token, "rb2", "t1", None).unwrap();

        assert_eq!(second.response.rolled_back, Some(true));
        assert_eq!(second.response.already_rolled_back, Some(true));
        assert_eq!(
            second.response.message.as_deref(),
            Some("already rolled back")
        );
        assert_eq!(f.balance(), 10_000);

        // debit + reversal + marker
        let entries = f.entries();
        assert_eq!(entries.len(), 3);
        let marker = entries.last().unwrap();
        assert_eq!(marker.amount, 0);
        assert!(marker.related_external_transaction_id.is_none());
    }

    #[test]
    fn test_payout_rollback_rejected() {
        let f = fixture();

        f.ledger.debit(&f.token, "t1", "r", 1_000).unwrap();
        f.ledger.credit(&f.token, "t2", "r", 2_500, Some("t1")).unwrap();
        let entries_before = f.entries().len();

        let err = f.ledger.rollback(&f.token, "rbx", "t2", None).unwrap_err();

        assert!(matches!(err, LedgerError::CannotRollbackPayout(_)));
        assert_eq!(err.code(), "CANNOT_ROLLBACK_PAYOUT");
        assert_eq!(f.entries().len(), entries_before);
        assert_eq!(f.balance(), 11_500);
    }

    #[test]
    fn test_insufficient_funds_leaves_ledger_untouched() {
        let f = fixture_with_balance(500);

        let err = f.ledger.debit(&f.token, "t1", "r", 1_000).unwrap_err();

        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                balance: 500,
                requested: 1_000
            }
        ));
        assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(f.balance(), 500);
        assert!(f.entries().is_empty());

        // The id stays unused: the same debit succeeds once funded
        f.store
            .with_tx::<_, StorageError>(|tx| {
                SqliteCasinoStore::set_wallet_balance(tx, f.wallet_id, 1_000)
            })
            .unwrap();
        let reply = f.ledger.debit(&f.token, "t1", "r", 1_000).unwrap();
        assert!(!reply.duplicate);
        assert_eq!(reply.response.balance, 0);
    }

    #[test]
    fn test_invalid_amounts() {
        let f = fixture();

        assert!(matches!(
            f.ledger.debit(&f.token, "t1", "r", 0),
            Err(LedgerError::InvalidAmount(0))
        ));
        assert!(matches!(
            f.ledger.debit(&f.token, "t2", "r", -5),
            Err(LedgerError::InvalidAmount(-5))
        ));
        assert!(matches!(
            f.ledger.credit(&f.token, "t3", "r", -1, None),
            Err(LedgerError::InvalidAmount(-1))
        ));
        assert!(f.entries().is_empty());
    }

    #[test]
    fn test_inactive_or_unknown_session_rejected() {
        let f = fixture();

        assert!(matches!(
            f.ledger.debit("no-such-token", "t1", "r", 100),
            Err(LedgerError::InvalidSession)
        ));

        f.store.end_session(&f.token).unwrap();
        assert!(matches!(
            f.ledger.debit(&f.token, "t1", "r", 100),
            Err(LedgerError::InvalidSession)
        ));
        assert!(matches!(
            f.ledger.balance(&f.token),
            Err(LedgerError::InvalidSession)
        ));
    }

    #[test]
    fn test_duplicate_check_precedes_session_check() {
        let f = fixture();

        f.ledger.debit(&f.token, "t1", "r", 500).unwrap();
        f.store.end_session(&f.token).unwrap();

        // A duplicate submit after the session ended still replays
        let reply = f.ledger.debit(&f.token, "t1", "r", 500).unwrap();
        assert!(reply.duplicate);
        assert_eq!(reply.response.balance, 9_500);
    }

    #[test]
    fn test_balance_read_does_not_mutate() {
        let f = fixture();

        let wallet = f.ledger.balance(&f.token).unwrap();
        assert_eq!(wallet.playable_balance, 10_000);
        assert_eq!(wallet.currency, "USD");
        assert!(f.entries().is_empty());
    }

    #[test]
    fn test_balance_after_chain_is_consistent() {
        let f = fixture();

        f.ledger.debit(&f.token, "t1", "r1", 2_000).unwrap();
        f.ledger.debit(&f.token, "t2", "r2", 1_000).unwrap();
        f.ledger.credit(&f.token, "c1", "r2", 3_000, Some("t2")).unwrap();
        f.ledger.rollback(&f.token, "rbx", "t1", None).unwrap();
        f.ledger.rollback(&f.token, "rby", "ghost", None).unwrap();

        let mut running = 10_000;
        for entry in f.entries() {
            let signed = match entry.kind {
                TransactionKind::Debit => -entry.amount,
                TransactionKind::Credit => entry.amount,
                TransactionKind::Rollback => entry.amount,
            };
            running += signed;
            assert_eq!(
                entry.balance_after, running,
                "entry {} breaks the balance chain",
                entry.external_transaction_id
            );
        }
        assert_eq!(f.balance(), running);
    }

    #[test]
    fn test_losing_insert_replays_winner() {
        let f = fixture();

        // Seed a winner directly, bypassing the engine's pre-check path
        let cache = CachedResponse::money_moved("t1", 7_777, "USD");
        f.store
            .append_transaction(&NewTransaction {
                external_transaction_id: "t1",
                kind: TransactionKind::Debit,
                amount: 100,
                wallet_id: f.wallet_id,
                session_id: 1,
                round_id: None,
                related_external_transaction_id: None,
                balance_after: 7_777,
                response_cache: &cache,
                is_rollback: false,
            })
            .unwrap();

        let reply = f.ledger.debit(&f.token, "t1", "r", 100).unwrap();
        assert!(reply.duplicate);
        assert_eq!(reply.response.balance, 7_777);
    }
}
