//! The authenticated session and its persisted record.

use tracing::warn;

use crate::store::{SessionStore, StoreError};
use crate::types::User;

/// Store key holding the raw bearer token.
pub const TOKEN_KEY: &str = "tma_token";

/// Store key holding the JSON-serialized user profile.
pub const USER_KEY: &str = "tma_user";

/// Token and profile of a signed-in user. Both are always present together.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

impl Session {
    /// Read the persisted record.
    ///
    /// Returns `None` when either key is missing, the store cannot be read,
    /// or the stored profile is not valid JSON. A half-written record never
    /// produces a session.
    pub fn load<S: SessionStore + ?Sized>(store: &S) -> Option<Session> {
        let (token, user) = match (store.get(TOKEN_KEY), store.get(USER_KEY)) {
            (Ok(Some(token)), Ok(Some(user))) => (token, user),
            (Ok(_), Ok(_)) => return None,
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to read persisted session");
                return None;
            }
        };
        if token.is_empty() {
            return None;
        }
        match serde_json::from_str::<User>(&user) {
            Ok(user) => Some(Session { token, user }),
            Err(e) => {
                warn!(error = %e, "Discarding persisted session with malformed user record");
                None
            }
        }
    }

    /// Write both keys, overwriting any previous record.
    ///
    /// The profile is written before the token. If the token write fails the
    /// profile is put back to what it was, so the store never pairs a token
    /// with another session's profile.
    pub fn save<S: SessionStore + ?Sized>(&self, store: &S) -> Result<(), StoreError> {
        let user = serde_json::to_string(&self.user).map_err(StoreError::Encode)?;
        let previous_user = store.get(USER_KEY).ok().flatten();

        store.set(USER_KEY, &user)?;
        if let Err(e) = store.set(TOKEN_KEY, &self.token) {
            let rollback = match previous_user {
                Some(previous) => store.set(USER_KEY, &previous),
                None => store.remove(USER_KEY),
            };
            if let Err(rollback_err) = rollback {
                warn!(error = %rollback_err, "Failed to restore previous user record, clearing session");
                let _ = Session::clear(store);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Remove both keys. Both removals are attempted; the first error wins.
    pub fn clear<S: SessionStore + ?Sized>(store: &S) -> Result<(), StoreError> {
        let token = store.remove(TOKEN_KEY);
        let user = store.remove(USER_KEY);
        token.and(user)
    }

    /// Value of the `Authorization` header for this session.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}
