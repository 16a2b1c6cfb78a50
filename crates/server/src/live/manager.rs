//! Presence cache for a vanilla server.
//!
//! `PlayerProvider` keeps one [`PlayerRecord`] per known uuid and maintains
//! it from two sources:
//!
//! - **Full reload** of `usercache.json`: shortly after start, then on a long
//!   interval, and whenever the file changes. Refreshes the identity of known
//!   players and creates records for new ones by decoding their save file.
//! - **Incremental update** of one `<uuid>.dat` file when the directory
//!   watcher reports a change. Only replaces the snapshot of a known player.
//!
//! Records are never removed; an absent or stale player just stops being
//! active.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vanilla_presence_core::{read_user_cache, PlayerData, PlayerDataError, UserCacheError};

use super::feed::PresenceFeed;
use super::state::{PlayerHandle, PlayerRecord};
use super::watcher::DebouncedWatcher;
use crate::config::PresenceConfig;
use crate::error::PresenceError;
use crate::world::WorldRegistry;

/// Extension of the save file an incremental update decodes.
pub const PLAYER_DATA_EXTENSION: &str = "dat";

const UUID_PREFIX_LEN: usize = 36;

/// Group key for a file in the player data directory: the uuid spelled by
/// the first 36 characters of its name. `<uuid>.dat`, `<uuid>.dat_old` and
/// `<uuid>-<suffix>.dat` all map to the same player.
pub fn player_data_key(path: &Path) -> Option<Uuid> {
    let name = path.file_name()?.to_str()?;
    let prefix = name.get(..UUID_PREFIX_LEN)?;
    Uuid::parse_str(prefix).ok()
}

/// Shared state reachable from watcher callbacks and the reload task.
struct ProviderState {
    config: PresenceConfig,
    worlds: WorldRegistry,
    feed: Arc<PresenceFeed>,
    players: DashMap<Uuid, PlayerRecord>,
    closed: AtomicBool,
}

impl ProviderState {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn save_path(&self, uuid: Uuid) -> PathBuf {
        self.config
            .player_data_dir
            .join(format!("{uuid}.{PLAYER_DATA_EXTENSION}"))
    }

    fn reload_user_cache(&self) -> Result<usize, UserCacheError> {
        if self.is_closed() {
            return Ok(0);
        }
        let users = read_user_cache(&self.config.user_cache_file)?;
        let total = users.len();
        let mut joined = Vec::new();

        for user in users {
            if self.is_closed() {
                return Ok(0);
            }
            let uuid = user.uuid;

            if let Some(mut record) = self.players.get_mut(&uuid) {
                if let Err(e) = record.set_user(user) {
                    warn!(%uuid, error = %e, "Rejected user cache entry");
                }
                continue;
            }

            let path = self.save_path(uuid);
            let data = match PlayerData::read(&path) {
                Ok(data) => data,
                Err(e) => {
                    error!(%uuid, name = %user.name, error = %e, "Failed to load player data");
                    continue;
                }
            };
            let record = match PlayerRecord::new(user, data) {
                Ok(record) => record,
                Err(e) => {
                    warn!(%uuid, path = %path.display(), error = %e, "Player data belongs to another player");
                    continue;
                }
            };

            match self.players.entry(uuid) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                    joined.push(uuid);
                }
                // Another reload got there first; keep its snapshot.
                Entry::Occupied(mut slot) => {
                    let _ = slot.get_mut().set_user(record.user().clone());
                }
            }
        }

        for &uuid in &joined {
            self.feed.notify_join(uuid);
        }
        debug!(users = total, joined = joined.len(), players = self.players.len(), "Reloaded user cache");
        Ok(joined.len())
    }

    fn update_player_data(&self, uuid: Uuid) -> bool {
        if self.is_closed() {
            return false;
        }
        if !self.players.contains_key(&uuid) {
            warn!(%uuid, "Player data update for unknown player, ignoring");
            return false;
        }

        let path = self.save_path(uuid);
        let data = match PlayerData::read(&path) {
            Ok(data) => data,
            Err(PlayerDataError::NotFound { .. }) => {
                debug!(%uuid, path = %path.display(), "Player data vanished before update");
                return false;
            }
            Err(e) => {
                warn!(%uuid, error = %e, "Failed to update player data");
                return false;
            }
        };
        if data.uuid() != uuid {
            warn!(
                %uuid,
                found = %data.uuid(),
                path = %path.display(),
                "Player data uuid does not match its file name"
            );
            return false;
        }

        if self.is_closed() {
            return false;
        }
        match self.players.get_mut(&uuid) {
            Some(mut record) => match record.set_player_data(data) {
                Ok(()) => {
                    debug!(%uuid, "Updated player data");
                    true
                }
                Err(e) => {
                    warn!(%uuid, error = %e, "Rejected player data");
                    false
                }
            },
            None => false,
        }
    }

    fn active_players(&self, now: DateTime<Utc>) -> Vec<PlayerHandle> {
        self.players
            .iter()
            .filter(|record| record.is_active(now, self.config.max_age))
            .map(|record| record.handle(&self.worlds, now))
            .collect()
    }
}

/// Owns the player map, its two watchers, and the periodic reload task.
pub struct PlayerProvider {
    state: Arc<ProviderState>,
    cancel: CancellationToken,
    reload_task: Mutex<Option<JoinHandle<()>>>,
    user_cache_watcher: Mutex<Option<DebouncedWatcher<()>>>,
    player_data_watcher: Mutex<Option<DebouncedWatcher<Uuid>>>,
}

impl PlayerProvider {
    /// Validate the configured paths. Nothing runs until [`start`](Self::start).
    pub fn new(
        config: PresenceConfig,
        worlds: WorldRegistry,
        feed: Arc<PresenceFeed>,
    ) -> Result<Self, PresenceError> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(ProviderState {
                config,
                worlds,
                feed,
                players: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
            cancel: CancellationToken::new(),
            reload_task: Mutex::new(None),
            user_cache_watcher: Mutex::new(None),
            player_data_watcher: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.state.config
    }

    /// Start both watchers and the reload schedule. Must be called from
    /// within a tokio runtime; calling it again is a no-op.
    pub fn start(&self) -> Result<(), PresenceError> {
        let mut reload_task = self.reload_task.lock().unwrap_or_else(PoisonError::into_inner);
        if reload_task.is_some() || self.state.is_closed() {
            return Ok(());
        }
        let config = &self.state.config;

        let state = self.state.clone();
        let user_cache_watcher = DebouncedWatcher::observe_file(
            &config.user_cache_file,
            config.user_cache_debounce,
            move |_: &Path| {
                state.reload_user_cache()?;
                Ok(())
            },
        )?;

        let state = self.state.clone();
        let player_data_watcher = DebouncedWatcher::observe_directory(
            &config.player_data_dir,
            config.player_data_debounce,
            player_data_key,
            move |path: &Path| {
                if let Some(uuid) = player_data_key(path) {
                    state.update_player_data(uuid);
                }
                Ok(())
            },
        )?;

        *reload_task = Some(tokio::spawn(run_reload_schedule(
            self.state.clone(),
            self.cancel.clone(),
        )));
        *self
            .user_cache_watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(user_cache_watcher);
        *self
            .player_data_watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(player_data_watcher);

        info!(
            user_cache = %config.user_cache_file.display(),
            player_data = %config.player_data_dir.display(),
            "Player provider started"
        );
        Ok(())
    }

    /// Run a full reload now, on the calling thread. Returns how many new
    /// players were added.
    pub fn reload_user_cache(&self) -> Result<usize, UserCacheError> {
        self.state.reload_user_cache()
    }

    /// Re-read `<uuid>.dat` for a known player, on the calling thread.
    /// Returns whether the record's snapshot was replaced.
    pub fn update_player_data(&self, uuid: Uuid) -> bool {
        self.state.update_player_data(uuid)
    }

    /// Players active right now.
    pub fn active_players(&self) -> Vec<PlayerHandle> {
        self.state.active_players(Utc::now())
    }

    pub fn active_players_at(&self, now: DateTime<Utc>) -> Vec<PlayerHandle> {
        self.state.active_players(now)
    }

    pub fn player(&self, uuid: Uuid) -> Option<PlayerRecord> {
        self.state.players.get(&uuid).map(|record| record.clone())
    }

    /// Number of records, active or not.
    pub fn len(&self) -> usize {
        self.state.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.players.is_empty()
    }

    /// Stop the reload schedule and both watchers. In-flight reads finish but
    /// their results are discarded. Safe to call repeatedly.
    pub fn close(&self) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        if let Some(task) = self
            .reload_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        if let Some(watcher) = self
            .user_cache_watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watcher.close();
        }
        if let Some(watcher) = self
            .player_data_watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watcher.close();
        }
        debug!("Player provider closed");
    }
}

impl Drop for PlayerProvider {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_reload_schedule(state: Arc<ProviderState>, cancel: CancellationToken) {
    let initial_delay = state.config.initial_reload_delay;
    let reload_interval = state.config.reload_interval;

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(initial_delay) => {}
    }

    let mut interval = tokio::time::interval(reload_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        let state = state.clone();
        match tokio::task::spawn_blocking(move || state.reload_user_cache()).await {
            Ok(Ok(joined)) => debug!(joined, "Scheduled user cache reload finished"),
            Ok(Err(e)) => error!(error = %e, "Scheduled user cache reload failed"),
            Err(e) => error!("User cache reload panicked: {}", e),
        }
    }
}
