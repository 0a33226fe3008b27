//! Session Registry
//!
//! A launch resolves the user, game, and provider, lazily creates the
//! wallet for (user, currency), and issues a fresh 256-bit session
//! token. Every money-moving callback resolves its token here first.

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tracing::info;

use crate::storage::{SqliteCasinoStore, StorageError};
use crate::types::{Game, GameProvider, GameSession, User, Wallet, DEFAULT_CURRENCY};

/// Session registry errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("game {0} not found or inactive")]
    GameNotFound(i64),

    #[error("provider {0} not found or disabled")]
    ProviderNotFound(i64),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Error code surfaced in API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::GameNotFound(_) => "GAME_NOT_FOUND",
            Self::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            Self::Storage(_) => "INTERNAL_ERROR",
        }
    }
}

/// Everything a launch resolves, returned to the caller and handed to
/// the outbound provider notification.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub session: GameSession,
    pub wallet: Wallet,
    pub user: User,
    pub game: Game,
    pub provider: GameProvider,
}

/// Session registry over the casino store
#[derive(Clone)]
pub struct SessionService {
    store: Arc<SqliteCasinoStore>,
}

impl SessionService {
    pub fn new(store: Arc<SqliteCasinoStore>) -> Self {
        Self { store }
    }

    /// Launch a game for a user: resolve the references, get-or-create
    /// the wallet, and insert a new active session with a fresh token.
    pub fn launch(
        &self,
        user_id: i64,
        game_id: i64,
        currency: Option<&str>,
    ) -> Result<LaunchOutcome, SessionError> {
        let user = self
            .store
            .get_user(user_id)?
            .ok_or(SessionError::UserNotFound(user_id))?;

        let game = self
            .store
            .get_game(game_id)?
            .filter(|g| g.active)
            .ok_or(SessionError::GameNotFound(game_id))?;

        let provider = self
            .store
            .get_provider(game.provider_id)?
            .filter(|p| p.enabled)
            .ok_or(SessionError::ProviderNotFound(game.provider_id))?;

        let currency = currency.unwrap_or(DEFAULT_CURRENCY);
        let wallet = self.store.get_or_create_wallet(user.id, currency)?;

        let token = generate_session_token();
        let session = self
            .store
            .insert_session(&token, user.id, wallet.id, game.id)?;

        info!(
            target: "chipvault::session",
            session_id = session.id,
            user_id = user.id,
            game_id = game.id,
            currency = currency,
            "session launched"
        );

        Ok(LaunchOutcome {
            session,
            wallet,
            user,
            game,
            provider,
        })
    }

    /// Resolve a token to its session if that session is still active
    pub fn resolve(&self, token: &str) -> Result<Option<GameSession>, SessionError> {
        Ok(self
            .store
            .session_by_token(token)?
            .filter(GameSession::is_active))
    }

    /// Record the provider's own session id. Failure here is non-fatal
    /// for the session: callers log and continue.
    pub fn attach_provider_session(
        &self,
        session_id: i64,
        provider_session_id: &str,
    ) -> Result<(), SessionError> {
        self.store
            .set_provider_session_id(session_id, provider_session_id)?;
        Ok(())
    }

    /// End a session. Returns false when the token is unknown.
    pub fn end(&self, token: &str) -> Result<bool, SessionError> {
        Ok(self.store.end_session(token)?)
    }
}

/// 32 bytes of CSPRNG entropy, hex-encoded to a 64-char opaque token
fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (SessionService, i64, i64) {
        let store = Arc::new(SqliteCasinoStore::in_memory().unwrap());
        let user = store.create_user("alice", "alice@example.com").unwrap();
        let provider = store
            .create_provider("acme-games", "http://provider.test", true)
            .unwrap();
        let game = store
            .create_game(provider.id, "Book of Crabs", "boc-1", true)
            .unwrap();
        (SessionService::new(store), user.id, game.id)
    }

    #[test]
    fn test_launch_creates_wallet_and_token() {
        let (service, user_id, game_id) = seeded();

        let outcome = service.launch(user_id, game_id, None).unwrap();

        assert_eq!(outcome.wallet.playable_balance, 0);
        assert_eq!(outcome.wallet.currency, "USD");
        assert_eq!(outcome.session.token.len(), 64);
        assert!(outcome.session.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(outcome.session.active);
        assert!(outcome.session.provider_session_id.is_none());
    }

    #[test]
    fn test_launch_reuses_wallet_per_currency() {
        let (service, user_id, game_id) = seeded();

        let first = service.launch(user_id, game_id, Some("USD")).unwrap();
        let second = service.launch(user_id, game_id, Some("USD")).unwrap();
        let other = service.launch(user_id, game_id, Some("EUR")).unwrap();

        assert_eq!(first.wallet.id, second.wallet.id);
        assert_ne!(first.session.token, second.session.token);
        assert_ne!(first.wallet.id, other.wallet.id);
    }

    #[test]
    fn test_launch_rejects_unknown_references() {
        let (service, user_id, game_id) = seeded();

        assert!(matches!(
            service.launch(999, game_id, None),
            Err(SessionError::UserNotFound(999))
        ));
        assert!(matches!(
            service.launch(user_id, 999, None),
            Err(SessionError::GameNotFound(999))
        ));
    }

    #[test]
    fn test_launch_rejects_inactive_game_and_disabled_provider() {
        let store = Arc::new(SqliteCasinoStore::in_memory().unwrap());
        let user = store.create_user("bob", "bob@example.com").unwrap();
        let live = store.create_provider("live", "http://p1.test", true).unwrap();
        let dead = store.create_provider("dead", "http://p2.test", false).unwrap();
        let inactive_game = store.create_game(live.id, "Old Slot", "old-1", false).unwrap();
        let orphan_game = store.create_game(dead.id, "Ghost Slot", "gho-1", true).unwrap();
        let service = SessionService::new(store);

        assert!(matches!(
            service.launch(user.id, inactive_game.id, None),
            Err(SessionError::GameNotFound(_))
        ));
        assert!(matches!(
            service.launch(user.id, orphan_game.id, None),
            Err(SessionError::ProviderNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_only_returns_active_sessions() {
        let (service, user_id, game_id) = seeded();
        let outcome = service.launch(user_id, game_id, None).unwrap();

        assert!(service.resolve(&outcome.session.token).unwrap().is_some());
        assert!(service.resolve("no-such-token").unwrap().is_none());

        assert!(service.end(&outcome.session.token).unwrap());
        assert!(service.resolve(&outcome.session.token).unwrap().is_none());
    }

    #[test]
    fn test_attach_provider_session() {
        let (service, user_id, game_id) = seeded();
        let outcome = service.launch(user_id, game_id, None).unwrap();

        service
            .attach_provider_session(outcome.session.id, "prov-77")
            .unwrap();

        let resolved = service.resolve(&outcome.session.token).unwrap().unwrap();
        assert_eq!(resolved.provider_session_id.as_deref(), Some("prov-77"));
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_ne!(a, b);
    }
}
