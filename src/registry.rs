// Entity registry and telegram routing

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::clock;
use crate::constants::IDLE_TIMEOUT_MS;
use crate::stream::EntityStream;
use crate::telegram;
use crate::telegram::EntityState;

/// Shared map of tracked entities plus the queue of ids discovered since
/// the render loop last looked.
///
/// Two tasks touch this: the relay receive path appends telegrams, the
/// render loop reads streams and runs the idle sweep. The map lock is
/// never held across a buffer lock acquisition in the other order.
pub struct Registry {
    own_id: String,
    entities: RwLock<HashMap<String, Arc<EntityStream>>>,
    pending: RwLock<Vec<String>>,
    rx_count: AtomicU64,
}

impl Registry {
    pub fn new(own_id: String) -> Self {
        Registry {
            own_id,
            entities: RwLock::new(HashMap::new()),
            pending: RwLock::new(Vec::new()),
            rx_count: AtomicU64::new(0),
        }
    }

    /// Route one incoming wire line to its entity stream, creating the
    /// stream on first sight.
    ///
    /// Malformed lines are logged and dropped without touching any state.
    /// Telegrams carrying our own id are ignored; the relay may echo the
    /// sender's traffic back.
    pub async fn route_line(&self, line: &str) {
        let (entity_id, state) = match telegram::parse(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Dropping malformed telegram: {}", e);
                return;
            }
        };

        if entity_id == self.own_id {
            return;
        }

        self.rx_count.fetch_add(1, Ordering::Relaxed);
        let now = clock::now_ms();
        let stream = self.get_or_create(&entity_id, &state, now).await;
        stream.append(state, now).await;
    }

    /// Look up a stream, creating it from the first telegram if needed.
    /// The clock offset is fixed here, from the creating telegram only.
    async fn get_or_create(
        &self,
        entity_id: &str,
        first: &EntityState,
        now_ms: i64,
    ) -> Arc<EntityStream> {
        if let Some(stream) = self.entities.read().await.get(entity_id) {
            return stream.clone();
        }

        let mut entities = self.entities.write().await;
        // Re-check under the write lock.
        if let Some(stream) = entities.get(entity_id) {
            return stream.clone();
        }

        let offset = now_ms - first.timestamp;
        let stream = Arc::new(EntityStream::new(entity_id.to_string(), offset, now_ms));
        entities.insert(entity_id.to_string(), stream.clone());
        self.pending.write().await.push(entity_id.to_string());
        info!("New entity {} (clock offset {} ms)", entity_id, offset);
        stream
    }

    /// Ids discovered since the last call. Each id is reported once.
    pub async fn drain_pending(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending.write().await)
    }

    pub async fn get(&self, entity_id: &str) -> Option<Arc<EntityStream>> {
        self.entities.read().await.get(entity_id).cloned()
    }

    /// Snapshot of all tracked streams.
    pub async fn streams(&self) -> Vec<Arc<EntityStream>> {
        self.entities.read().await.values().cloned().collect()
    }

    pub async fn entity_count(&self) -> usize {
        self.entities.read().await.len()
    }

    /// Telegrams routed to a stream so far (parse failures and own-id
    /// echoes excluded).
    pub fn telegrams_received(&self) -> u64 {
        self.rx_count.load(Ordering::Relaxed)
    }

    /// Evict entities with no telegram for IDLE_TIMEOUT_MS of local wall
    /// time. Returns the evicted ids so the caller can release
    /// render-side handles.
    pub async fn remove_idle(&self, now_ms: i64) -> Vec<String> {
        let mut entities = self.entities.write().await;
        let idle: Vec<String> = entities
            .iter()
            .filter(|(_, stream)| now_ms - stream.last_rx_ms() > IDLE_TIMEOUT_MS)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &idle {
            entities.remove(id);
            info!("Evicting idle entity {}", id);
        }
        idle
    }

    /// Write a JSON snapshot of tracked entities to `entities.json` in
    /// `work_dir`. Written to a temp file then renamed so readers never
    /// see a partial file.
    pub async fn write_state(&self, work_dir: &str) {
        let streams = self.streams().await;
        let mut entries = Vec::with_capacity(streams.len());
        for stream in streams {
            let (buffered, newest) = stream.buffer_stats().await;
            entries.push(EntityEntry {
                entity_id: stream.entity_id.clone(),
                clock_offset_ms: stream.clock_offset_ms,
                buffered,
                newest_timestamp_ms: newest,
                last_seen: format_utc_ms(stream.last_rx_ms()),
            });
        }
        entries.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

        let json = match serde_json::to_string_pretty(&entries) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize entity state: {}", e);
                return;
            }
        };

        let dir = Path::new(work_dir);
        let tmp = dir.join("entities.json.tmp");
        let path = dir.join("entities.json");
        if let Err(e) = std::fs::write(&tmp, json) {
            warn!("Failed to write {}: {}", tmp.display(), e);
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, &path) {
            warn!("Failed to rename {}: {}", tmp.display(), e);
        }
    }
}

/// One row of the entities.json status snapshot.
#[derive(Serialize)]
struct EntityEntry {
    entity_id: String,
    clock_offset_ms: i64,
    buffered: usize,
    newest_timestamp_ms: Option<i64>,
    last_seen: String,
}

fn format_utc_ms(epoch_ms: i64) -> String {
    if let Some(tm) = UNIX_EPOCH.checked_add(Duration::from_millis(epoch_ms.max(0) as u64)) {
        let datetime = chrono::DateTime::<chrono::Utc>::from(tm);
        return datetime.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string();
    }
    String::new()
}
