//! Session/token manager.
//!
//! Holds the access/refresh token pair in memory and mirrors it to durable
//! storage. Memory is authoritative for reads; storage only has to survive a
//! restart.

use crate::storage::{KeyValueStore, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

pub struct TokenStore {
    tokens: RwLock<TokenPair>,
    storage: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    /// Loads both tokens from `storage`. Unreadable entries count as absent.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let access_token = read_key(storage.as_ref(), ACCESS_TOKEN_KEY);
        let refresh_token = read_key(storage.as_ref(), REFRESH_TOKEN_KEY);

        log::debug!(
            "Token store loaded (access: {}, refresh: {})",
            access_token.is_some(),
            refresh_token.is_some()
        );

        Self {
            tokens: RwLock::new(TokenPair {
                access_token,
                refresh_token,
            }),
            storage,
        }
    }

    pub fn get_access_token(&self) -> Option<String> {
        self.snapshot().access_token
    }

    pub fn get_refresh_token(&self) -> Option<String> {
        self.snapshot().refresh_token
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().access_token.is_some()
    }

    pub fn snapshot(&self) -> TokenPair {
        match self.tokens.read() {
            Ok(tokens) => tokens.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_access_token(&self, token: &str) -> Result<(), StorageError> {
        self.write(|tokens| tokens.access_token = Some(token.to_string()));
        self.storage.set(ACCESS_TOKEN_KEY, token)
    }

    pub fn set_refresh_token(&self, token: &str) -> Result<(), StorageError> {
        self.write(|tokens| tokens.refresh_token = Some(token.to_string()));
        self.storage.set(REFRESH_TOKEN_KEY, token)
    }

    /// Replaces both tokens, as done after login and refresh.
    pub fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<(), StorageError> {
        self.write(|tokens| {
            tokens.access_token = Some(access_token.to_string());
            tokens.refresh_token = Some(refresh_token.to_string());
        });
        self.storage.set(ACCESS_TOKEN_KEY, access_token)?;
        self.storage.set(REFRESH_TOKEN_KEY, refresh_token)
    }

    pub fn clear_tokens(&self) -> Result<(), StorageError> {
        self.write(|tokens| *tokens = TokenPair::default());
        let access = self.storage.remove(ACCESS_TOKEN_KEY);
        let refresh = self.storage.remove(REFRESH_TOKEN_KEY);
        access.and(refresh)
    }

    fn write(&self, f: impl FnOnce(&mut TokenPair)) {
        match self.tokens.write() {
            Ok(mut tokens) => f(&mut tokens),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

fn read_key(storage: &dyn KeyValueStore, key: &str) -> Option<String> {
    match storage.get(key) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Failed to load {} from storage: {}", key, e);
            None
        }
    }
}
