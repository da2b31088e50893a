// ABOUTME: Request-scoped session storage abstraction used by the OAuth flow and token stores
// ABOUTME: Defines the SessionStore trait, typed JSON helpers, and the in-memory session implementation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Session Storage
//!
//! The flow never touches ambient global state: every operation receives the
//! caller's session handle explicitly. A session is a string-keyed bag of JSON
//! values with an identifier that can be regenerated.
//!
//! ## Implementations
//!
//! - [`MemorySession`]: one session held in memory, used by the bundled server
//!   through [`SessionRegistry`] and directly in tests
//!
//! Host applications with their own session layer implement [`SessionStore`]
//! on top of it.

/// Pending and processed authorization flow records
pub mod flow_store;
/// Cookie-keyed collection of in-memory sessions
pub mod registry;

pub use flow_store::FlowStore;
pub use registry::SessionRegistry;

use crate::errors::AppResult;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Session storage for a single user agent
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current session identifier
    async fn id(&self) -> String;

    /// Raw value stored under `key`
    async fn get_value(&self, key: &str) -> Option<Value>;

    /// Store a raw value under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write
    async fn put_value(&self, key: &str, value: Value) -> AppResult<()>;

    /// Remove `key`
    async fn forget(&self, key: &str);

    /// All keys currently stored
    async fn keys(&self) -> Vec<String>;

    /// Flush pending writes to durable storage
    ///
    /// Must complete before a response that depends on the written values is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the session
    async fn save(&self) -> AppResult<()>;

    /// Issue a new session identifier, keeping the data
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot migrate the session
    async fn regenerate(&self) -> AppResult<String>;
}

/// Typed JSON access on top of [`SessionStore`]
#[async_trait]
pub trait SessionStoreExt: SessionStore {
    /// Deserialize the value under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value does not match `T`
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> AppResult<Option<T>> {
        match self.get_value(key).await {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> AppResult<()> {
        let value = serde_json::to_value(value)?;
        self.put_value(key, value).await
    }
}

impl<S: SessionStore + ?Sized> SessionStoreExt for S {}

/// Session held entirely in memory
#[derive(Debug)]
pub struct MemorySession {
    id: RwLock<String>,
    data: RwLock<HashMap<String, Value>>,
    saves: AtomicUsize,
}

impl MemorySession {
    /// Empty session with a fresh identifier
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Empty session with a known identifier
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: RwLock::new(id.into()),
            data: RwLock::new(HashMap::new()),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of times [`SessionStore::save`] has been called
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySession {
    async fn id(&self) -> String {
        self.id.read().await.clone()
    }

    async fn get_value(&self, key: &str) -> Option<Value> {
        self.data.read().await.get(key).cloned()
    }

    async fn put_value(&self, key: &str, value: Value) -> AppResult<()> {
        self.data.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn forget(&self, key: &str) {
        self.data.write().await.remove(key);
    }

    async fn keys(&self) -> Vec<String> {
        self.data.read().await.keys().cloned().collect()
    }

    async fn save(&self) -> AppResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn regenerate(&self) -> AppResult<String> {
        let next = Uuid::new_v4().to_string();
        self.id.write().await.clone_from(&next);
        Ok(next)
    }
}
