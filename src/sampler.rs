// Render loop: samples every tracked entity at a fixed cadence

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::warn;

use crate::bridge::{EntityProxy, LifecycleBridge};
use crate::clock;
use crate::constants::{IDLE_SWEEP_SECS, MTOF, SAMPLE_INTERVAL_MS, WRITE_STATE_SECS};
use crate::net::Transport;
use crate::ownship::OwnStateSource;
use crate::registry::Registry;
use crate::telegram;

/// Drives rendering at 20 Hz: every tick, newly discovered entities get a
/// proxy, every tracked entity gets one interpolated state pushed through
/// its proxy, and our own state goes out to the relay. Slower housekeeping
/// (status log, status file, idle sweep) shares the same task.
pub struct Sampler {
    registry: Arc<Registry>,
    transport: Transport,
    bridge: Box<dyn LifecycleBridge>,
    own_source: Box<dyn OwnStateSource>,
    own_id: String,
    proxies: HashMap<String, Box<dyn EntityProxy>>,
    work_dir: String,
    status_interval: i32,
    tx_count: u64,
}

impl Sampler {
    pub fn new(
        registry: Arc<Registry>,
        transport: Transport,
        bridge: Box<dyn LifecycleBridge>,
        own_source: Box<dyn OwnStateSource>,
        own_id: String,
        work_dir: String,
        status_interval: i32,
    ) -> Self {
        Sampler {
            registry,
            transport,
            bridge,
            own_source,
            own_id,
            proxies: HashMap::new(),
            work_dir,
            status_interval,
            tx_count: 0,
        }
    }

    /// Main loop. Runs until the process shuts down.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_millis(SAMPLE_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let status_secs = self.status_interval.max(1) as u64;
        let mut next_status = Instant::now() + Duration::from_secs(status_secs);
        let mut next_write_state = Instant::now() + Duration::from_secs(WRITE_STATE_SECS);
        let mut next_cleanup = Instant::now() + Duration::from_secs(IDLE_SWEEP_SECS);

        loop {
            ticker.tick().await;
            self.tick(clock::now_ms()).await;

            let t = Instant::now();
            if self.status_interval > 0 && t >= next_status {
                next_status = t + Duration::from_secs(status_secs);
                self.log_status().await;
            }
            if !self.work_dir.is_empty() && t >= next_write_state {
                next_write_state = t + Duration::from_secs(WRITE_STATE_SECS);
                self.registry.write_state(&self.work_dir).await;
            }
            if t >= next_cleanup {
                next_cleanup = t + Duration::from_secs(IDLE_SWEEP_SECS);
                self.cleanup(clock::now_ms()).await;
            }
        }
    }

    /// One render tick at local wall time `now_ms`: adopt newly
    /// discovered entities, push interpolated state to every proxy,
    /// report our own state to the relay.
    pub async fn tick(&mut self, now_ms: i64) {
        for entity_id in self.registry.drain_pending().await {
            // The stream can be gone already if the entity was evicted
            // before we got here.
            if self.registry.get(&entity_id).await.is_none() {
                continue;
            }
            if !self.proxies.contains_key(&entity_id) {
                let proxy = self.bridge.on_entity_discovered(&entity_id);
                self.proxies.insert(entity_id, proxy);
            }
        }

        for stream in self.registry.streams().await {
            let proxy = match self.proxies.get_mut(&stream.entity_id) {
                Some(proxy) => proxy,
                None => continue,
            };
            let render_time = clock::render_time_ms(now_ms, stream.clock_offset_ms);
            let mut state = stream.sample_at(render_time).await;
            // The render side works in feet; everything upstream is
            // metric.
            state.el *= MTOF;
            if let Err(e) = proxy.apply_state(&state) {
                warn!("Failed to update entity {}: {}", stream.entity_id, e);
            }
        }

        let own = self.own_source.current_state(now_ms);
        self.transport.send(telegram::format(&self.own_id, &own));
        self.tx_count += 1;
    }

    /// Evict entities idle past the timeout and drop their proxies.
    async fn cleanup(&mut self, now_ms: i64) {
        for entity_id in self.registry.remove_idle(now_ms).await {
            self.proxies.remove(&entity_id);
        }
    }

    async fn log_status(&self) {
        eprintln!(
            "Status: ({} entities {} proxies) (rx {} tx {} telegrams)",
            self.registry.entity_count().await,
            self.proxies.len(),
            self.registry.telegrams_received(),
            self.tx_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::IDLE_TIMEOUT_MS;
    use crate::telegram::EntityState;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        discovered: Vec<String>,
        applied: Vec<(String, EntityState)>,
        dropped: Vec<String>,
    }

    struct RecordingBridge {
        log: Arc<Mutex<Recording>>,
        fail_ids: Vec<String>,
    }

    struct RecordingProxy {
        entity_id: String,
        log: Arc<Mutex<Recording>>,
        fail: bool,
    }

    impl LifecycleBridge for RecordingBridge {
        fn on_entity_discovered(&mut self, entity_id: &str) -> Box<dyn EntityProxy> {
            self.log.lock().unwrap().discovered.push(entity_id.to_string());
            Box::new(RecordingProxy {
                entity_id: entity_id.to_string(),
                log: self.log.clone(),
                fail: self.fail_ids.iter().any(|id| id == entity_id),
            })
        }
    }

    impl EntityProxy for RecordingProxy {
        fn apply_state(&mut self, state: &EntityState) -> std::io::Result<()> {
            if self.fail {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "render failure",
                ));
            }
            self.log
                .lock()
                .unwrap()
                .applied
                .push((self.entity_id.clone(), *state));
            Ok(())
        }
    }

    impl Drop for RecordingProxy {
        fn drop(&mut self) {
            self.log.lock().unwrap().dropped.push(self.entity_id.clone());
        }
    }

    struct StillSource;

    impl OwnStateSource for StillSource {
        fn current_state(&mut self, now_ms: i64) -> EntityState {
            EntityState {
                timestamp: now_ms,
                lat: 1.0,
                ..Default::default()
            }
        }
    }

    fn make_sampler(
        log: Arc<Mutex<Recording>>,
        fail_ids: Vec<String>,
    ) -> (Sampler, Arc<Registry>, tokio::sync::mpsc::Receiver<String>) {
        let registry = Arc::new(Registry::new("OWN1".to_string()));
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let sampler = Sampler::new(
            registry.clone(),
            Transport::new(tx),
            Box::new(RecordingBridge { log, fail_ids }),
            Box::new(StillSource),
            "OWN1".to_string(),
            String::new(),
            -1,
        );
        (sampler, registry, rx)
    }

    fn telegram_line(ts: i64, id: &str, lat: f64, el: f64) -> String {
        format!("{},{},{:.6},0.000000,{:.2},0.00,0.00,0.00", ts, id, lat, el)
    }

    #[tokio::test]
    async fn test_proxy_created_once() {
        let log = Arc::new(Mutex::new(Recording::default()));
        let (mut sampler, registry, _rx) = make_sampler(log.clone(), vec![]);

        registry.route_line(&telegram_line(1000, "AAA", 10.0, 0.0)).await;
        sampler.tick(clock::now_ms()).await;
        registry.route_line(&telegram_line(1100, "AAA", 10.1, 0.0)).await;
        sampler.tick(clock::now_ms()).await;

        assert_eq!(log.lock().unwrap().discovered, vec!["AAA".to_string()]);
    }

    #[tokio::test]
    async fn test_tick_applies_interpolated_state_in_feet() {
        let log = Arc::new(Mutex::new(Recording::default()));
        let (mut sampler, registry, _rx) = make_sampler(log.clone(), vec![]);

        registry.route_line(&telegram_line(1000, "AAA", 10.0, 100.0)).await;
        registry.route_line(&telegram_line(1100, "AAA", 20.0, 100.0)).await;

        // Choose the tick time so the render point lands halfway between
        // the two samples: render = now - offset - 100 = 1050.
        let offset = registry.get("AAA").await.unwrap().clock_offset_ms;
        sampler.tick(offset + 1150).await;

        let log = log.lock().unwrap();
        assert_eq!(log.applied.len(), 1);
        let (ref id, state) = log.applied[0];
        assert_eq!(id, "AAA");
        assert!((state.lat - 15.0).abs() < 1e-9);
        // 100 m in feet.
        assert!((state.el - 328.0839895).abs() < 1e-6);
        assert_eq!(state.timestamp, 1050);
    }

    #[tokio::test]
    async fn test_failing_proxy_does_not_block_others() {
        let log = Arc::new(Mutex::new(Recording::default()));
        let (mut sampler, registry, _rx) =
            make_sampler(log.clone(), vec!["BAD".to_string()]);

        registry.route_line(&telegram_line(1000, "BAD", 1.0, 0.0)).await;
        registry.route_line(&telegram_line(1000, "GOOD", 2.0, 0.0)).await;
        sampler.tick(clock::now_ms()).await;

        let log = log.lock().unwrap();
        let applied_ids: Vec<&str> = log.applied.iter().map(|(id, _)| id.as_str()).collect();
        assert!(applied_ids.contains(&"GOOD"));
        assert!(!applied_ids.contains(&"BAD"));
    }

    #[tokio::test]
    async fn test_own_telegram_sent_each_tick() {
        let log = Arc::new(Mutex::new(Recording::default()));
        let (mut sampler, _registry, mut rx) = make_sampler(log, vec![]);

        sampler.tick(5_000).await;
        sampler.tick(5_050).await;

        let first = rx.try_recv().unwrap();
        let (id, state) = telegram::parse(&first).unwrap();
        assert_eq!(id, "OWN1");
        assert_eq!(state.timestamp, 5_000);
        assert_eq!(state.lat, 1.0);

        let second = rx.try_recv().unwrap();
        let (_, state) = telegram::parse(&second).unwrap();
        assert_eq!(state.timestamp, 5_050);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cleanup_drops_evicted_proxies() {
        let log = Arc::new(Mutex::new(Recording::default()));
        let (mut sampler, registry, _rx) = make_sampler(log.clone(), vec![]);

        registry.route_line(&telegram_line(1000, "AAA", 1.0, 0.0)).await;
        let now = clock::now_ms();
        sampler.tick(now).await;
        assert_eq!(sampler.proxies.len(), 1);

        sampler.cleanup(now + IDLE_TIMEOUT_MS + 1_000).await;
        assert!(sampler.proxies.is_empty());
        assert_eq!(log.lock().unwrap().dropped, vec!["AAA".to_string()]);

        // Nothing left to update on the next tick.
        let before = log.lock().unwrap().applied.len();
        sampler.tick(now + IDLE_TIMEOUT_MS + 2_000).await;
        assert_eq!(log.lock().unwrap().applied.len(), before);
    }
}
