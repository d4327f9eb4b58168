use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use async_trait::async_trait;
use log::trace;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::player::{Player, PlayerId};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Could not load player {0}")]
    Load(PlayerId, #[source] BoxError),

    #[error("Could not save player {0}")]
    Save(PlayerId, #[source] BoxError),
}

/// Where player aggregates live between sessions.
///
/// `save` must replace the stored player atomically: either every change in
/// `player` is written or none is.
#[async_trait]
pub trait PlayerStore: Send + Sync + 'static {
    /// Loads a player, handing out a fresh one for ids the store has never seen.
    async fn load(&self, id: PlayerId) -> Result<Player, StoreError>;

    async fn save(&self, player: &Player) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    players: RwLock<HashMap<PlayerId, Player>>,
}

impl MemoryStore {
    pub fn with_players(players: impl IntoIterator<Item = Player>) -> Self {
        Self {
            players: RwLock::new(players.into_iter().map(|p| (p.id, p)).collect()),
        }
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn load(&self, id: PlayerId) -> Result<Player, StoreError> {
        let players = self.players.read().unwrap_or_else(PoisonError::into_inner);
        Ok(players.get(&id).cloned().unwrap_or_else(|| Player::new(id)))
    }

    async fn save(&self, player: &Player) -> Result<(), StoreError> {
        let mut players = self.players.write().unwrap_or_else(PoisonError::into_inner);
        players.insert(player.id, player.clone());
        Ok(())
    }
}

type LockTable = Mutex<HashMap<PlayerId, Arc<AsyncMutex<()>>>>;

/// Serializes every mutation of a player's persisted state.
///
/// Sessions, shops and trades must all go through [`Ledger::update`] so that
/// one mutator at a time touches a given player.
pub struct Ledger<S> {
    store: S,
    locks: LockTable,
}

/// Holds a player's lock. The table entry goes away with the last holder.
struct PlayerLock<'a> {
    id: PlayerId,
    table: &'a LockTable,
    lock: Option<Arc<AsyncMutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PlayerLock<'_> {
    async fn acquire(mut self) -> Self {
        if let Some(lock) = &self.lock {
            self.guard = Some(Arc::clone(lock).lock_owned().await);
        }
        self
    }
}

impl Drop for PlayerLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        let Some(lock) = self.lock.take() else {
            return;
        };
        // every holder lets go of its handle under the table lock
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let unused = table
            .get(&self.id)
            .map_or(false, |entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(entry) == 2);
        drop(lock);
        if unused {
            table.remove(&self.id);
        }
    }
}

impl<S: PlayerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn lock(&self, id: PlayerId) -> PlayerLock<'_> {
        let lock = {
            let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            table.entry(id).or_default().clone()
        };

        PlayerLock {
            id,
            table: &self.locks,
            lock: Some(lock),
            guard: None,
        }
        .acquire()
        .await
    }

    /// Reads a consistent copy of the player.
    pub async fn read(&self, id: PlayerId) -> Result<Player, StoreError> {
        let _lock = self.lock(id).await;
        self.store.load(id).await
    }

    /// Loads the player, runs `f` on a copy and saves the copy only if `f`
    /// succeeds. A failure anywhere leaves the stored player untouched.
    pub async fn update<T, E, F>(&self, id: PlayerId, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Player) -> Result<T, E> + Send,
        E: From<StoreError>,
    {
        let _lock = self.lock(id).await;

        let mut player = self.store.load(id).await?;
        let value = f(&mut player)?;
        self.store.save(&player).await?;
        trace!("Saved player {id}");

        Ok(value)
    }
}
