mod store;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub use store::{InMemoryStorage, StorageBackend};

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to serialize state entry '{name}': {source}")]
    Serialize {
        name: String,
        source: serde_json::Error,
    },
    #[error("failed to deserialize state entry '{name}': {source}")]
    Deserialize {
        name: String,
        source: serde_json::Error,
    },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("gave up writing state entry '{name}' after losing {attempts} version races")]
    Conflict { name: String, attempts: usize },
}

/// A stored key/value entry with an opaque version token.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

/// A versioned view of a named value in the state.
///
/// A variable obtained from [State::get] carries the version token of the
/// entry it was read from; [State::set] only succeeds when the stored entry
/// still has that token.
#[derive(Debug, Clone)]
pub struct Variable<T> {
    name: String,
    token: Uuid,
    value: T,
}

impl<T> Variable<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T> Deref for Variable<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Variable<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// An abstraction of state represented by versioned variables.
///
/// Setting a variable only succeeds if it has not changed since it was last
/// fetched; a failed set prompts the caller to re-read and retry.
#[derive(Clone)]
pub struct State {
    storage: Arc<dyn StorageBackend>,
}

impl State {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStorage::new()))
    }

    /// Read a variable, creating a default-valued one (with a fresh version
    /// token) if none exists yet.
    pub async fn get<T>(&self, name: &str) -> StateResult<Variable<T>>
    where
        T: Default + DeserializeOwned,
    {
        match self.storage.fetch(name).await? {
            Some(entry) => {
                let value =
                    serde_json::from_slice(&entry.value).map_err(|source| {
                        StateError::Deserialize {
                            name: name.to_string(),
                            source,
                        }
                    })?;
                Ok(Variable {
                    name: name.to_string(),
                    token: entry.uuid,
                    value,
                })
            }
            None => Ok(Variable {
                name: name.to_string(),
                token: Uuid::new_v4(),
                value: T::default(),
            }),
        }
    }

    /// Write a variable back.
    /// Returns the variable with its new version token on success, or
    /// [None] when the stored entry changed since the variable was read.
    pub async fn set<T>(&self, variable: Variable<T>) -> StateResult<Option<Variable<T>>>
    where
        T: Serialize,
    {
        let value = serde_json::to_vec(&variable.value).map_err(|source| StateError::Serialize {
            name: variable.name.clone(),
            source,
        })?;
        let entry = Entry {
            name: variable.name.clone(),
            uuid: Uuid::new_v4(),
            value,
        };
        let swapped = self.storage.swap(entry.clone(), variable.token).await?;
        if swapped {
            Ok(Some(Variable {
                name: variable.name,
                token: entry.uuid,
                value: variable.value,
            }))
        } else {
            Ok(None)
        }
    }

    /// Read, mutate, and write a variable until the write wins its version
    /// race. A losing writer re-reads (observing the winner's value) and
    /// applies the mutation again; after `attempts` lost races the conflict
    /// surfaces as an error for the caller to treat as fatal.
    pub async fn mutate<T, F>(
        &self,
        name: &str,
        attempts: usize,
        delay: Duration,
        mut mutation: F,
    ) -> StateResult<Variable<T>>
    where
        T: Default + Serialize + DeserializeOwned,
        F: FnMut(&mut T),
    {
        for attempt in 0..attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }
            let mut variable = self.get::<T>(name).await?;
            mutation(&mut variable);
            if let Some(variable) = self.set(variable).await? {
                return Ok(variable);
            }
            warn!("state entry '{name}' changed since it was read; re-reading");
        }
        Err(StateError::Conflict {
            name: name.to_string(),
            attempts: attempts.max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_returns_default_for_missing_variable() {
        let state = State::in_memory();
        let variable = state.get::<Vec<String>>("slaves").await.unwrap();
        assert!(variable.is_empty());
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let state = State::in_memory();
        let mut variable = state.get::<Vec<String>>("slaves").await.unwrap();
        variable.push("node1".to_string());
        let stored = state.set(variable).await.unwrap();
        assert!(stored.is_some());

        let variable = state.get::<Vec<String>>("slaves").await.unwrap();
        assert_eq!(variable.as_slice(), ["node1".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_set_has_exactly_one_winner() {
        let state = State::in_memory();
        let variable = state.get::<Vec<String>>("slaves").await.unwrap();
        let mut first = variable.clone();
        let mut second = variable;
        first.push("winner".to_string());
        second.push("loser".to_string());

        let first = state.set(first).await.unwrap();
        assert!(first.is_some());
        let second = state.set(second).await.unwrap();
        assert!(second.is_none());

        // On re-read, the loser observes the winner's write.
        let variable = state.get::<Vec<String>>("slaves").await.unwrap();
        assert_eq!(variable.as_slice(), ["winner".to_string()]);
    }

    #[tokio::test]
    async fn test_stale_token_after_interleaved_write() {
        let state = State::in_memory();
        let stale = state.get::<Vec<String>>("slaves").await.unwrap();

        let mut fresh = state.get::<Vec<String>>("slaves").await.unwrap();
        fresh.push("node1".to_string());
        // The two reads carry independent initial tokens, so only one of
        // the writers can create the entry.
        assert!(state.set(fresh).await.unwrap().is_some());
        assert!(state.set(stale).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_winner_can_keep_writing() {
        let state = State::in_memory();
        let mut variable = state.get::<Vec<String>>("slaves").await.unwrap();
        variable.push("node1".to_string());
        let mut variable = state.set(variable).await.unwrap().unwrap();
        variable.push("node2".to_string());
        let variable = state.set(variable).await.unwrap().unwrap();
        assert_eq!(variable.len(), 2);
    }

    /// A backend whose first `races` swaps are preempted by a competing
    /// writer, so the caller loses that many version races.
    struct ContestedStorage {
        inner: InMemoryStorage,
        races: std::sync::atomic::AtomicUsize,
    }

    impl ContestedStorage {
        fn new(races: usize) -> Self {
            Self {
                inner: InMemoryStorage::new(),
                races: std::sync::atomic::AtomicUsize::new(races),
            }
        }
    }

    #[async_trait::async_trait]
    impl StorageBackend for ContestedStorage {
        async fn fetch(&self, name: &str) -> StateResult<Option<Entry>> {
            self.inner.fetch(name).await
        }

        async fn swap(&self, entry: Entry, token: Uuid) -> StateResult<bool> {
            use std::sync::atomic::Ordering;
            if self.races.load(Ordering::SeqCst) > 0 {
                self.races.fetch_sub(1, Ordering::SeqCst);
                let competing = Entry {
                    name: entry.name.clone(),
                    uuid: Uuid::new_v4(),
                    value: b"[]".to_vec(),
                };
                self.inner.swap(competing, token).await?;
                return Ok(false);
            }
            self.inner.swap(entry, token).await
        }
    }

    #[tokio::test]
    async fn test_mutate_writes_on_the_first_attempt() {
        let state = State::in_memory();
        let variable = state
            .mutate::<Vec<String>, _>("slaves", 3, Duration::from_secs(1), |slaves| {
                slaves.push("node1".to_string())
            })
            .await
            .unwrap();
        assert_eq!(variable.as_slice(), ["node1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutate_retries_lost_races() {
        let state = State::new(Arc::new(ContestedStorage::new(2)));
        let variable = state
            .mutate::<Vec<String>, _>("slaves", 3, Duration::from_secs(1), |slaves| {
                slaves.push("node1".to_string())
            })
            .await
            .unwrap();
        assert_eq!(variable.as_slice(), ["node1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutate_gives_up_after_bounded_attempts() {
        let state = State::new(Arc::new(ContestedStorage::new(usize::MAX)));
        let result = state
            .mutate::<Vec<String>, _>("slaves", 3, Duration::from_secs(1), |slaves| {
                slaves.push("node1".to_string())
            })
            .await;
        assert!(matches!(
            result,
            Err(StateError::Conflict { attempts: 3, .. })
        ));
    }
}
