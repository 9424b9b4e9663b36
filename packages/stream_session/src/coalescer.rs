use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::manager::SessionManager;

/// Debounces bursty command streams (a color slider mid-drag) into one send
/// per key per window.
///
/// Last write wins: within a window, a newer payload for the same key
/// replaces the older one, which is guaranteed lost by design. Distinct keys
/// are independent entries drained together when the shared timer expires.
pub struct CommandCoalescer {
    manager: SessionManager,
    window: Duration,
    inner: Arc<Mutex<Pending>>,
}

#[derive(Default)]
struct Pending {
    commands: HashMap<String, Value>,
    timer: Option<JoinHandle<()>>,
}

impl CommandCoalescer {
    pub fn new(manager: SessionManager) -> Self {
        let window = manager.policy().debounce_window;
        Self {
            manager,
            window,
            inner: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// Store `payload` under `key`, replacing any pending payload for that
    /// key, and arm the shared debounce timer if it is not already running.
    pub async fn enqueue(&self, key: impl Into<String>, payload: Value) {
        let mut inner = self.inner.lock().await;
        inner.commands.insert(key.into(), payload);
        if inner.timer.is_none() {
            let manager = self.manager.clone();
            let shared = self.inner.clone();
            let window = self.window;
            inner.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(window).await;
                drain(&manager, &shared, false).await;
            }));
        }
    }

    /// Drain and send everything pending right now, bypassing the timer.
    /// Used on teardown so the last in-flight edit is not lost.
    pub async fn flush(&self) {
        drain(&self.manager, &self.inner, true).await;
    }
}

/// Atomically take the whole pending set, then send each entry. Clear after
/// read, never before: enqueues racing the drain land in the next window.
async fn drain(manager: &SessionManager, shared: &Arc<Mutex<Pending>>, cancel_timer: bool) {
    let batch: Vec<(String, Value)> = {
        let mut inner = shared.lock().await;
        let timer = inner.timer.take();
        if cancel_timer {
            if let Some(timer) = timer {
                timer.abort();
            }
        }
        inner.commands.drain().collect()
    };
    for (key, payload) in batch {
        if !manager.send_command(payload).await {
            debug!(key, "dropped coalesced command, session not connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionPolicy;
    use crate::loopback::{LoopbackConfig, LoopbackControl, LoopbackEngine};
    use serde_json::json;

    async fn connected_coalescer() -> (CommandCoalescer, Arc<LoopbackControl>) {
        let engine = Arc::new(LoopbackEngine::new(LoopbackConfig::default()));
        let control = engine.control();
        let manager = SessionManager::new(engine, ConnectionPolicy::default()).unwrap();
        manager.initialize("coalescer-test").await.unwrap();
        (CommandCoalescer::new(manager), control)
    }

    fn non_keepalive(sent: Vec<Value>) -> Vec<Value> {
        sent.into_iter()
            .filter(|v| v.get("action") != Some(&json!("keepalive")))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn last_write_wins_within_one_window() {
        let (coalescer, control) = connected_coalescer().await;

        coalescer.enqueue("hull", json!({ "hull": "A" })).await;
        coalescer.enqueue("hull", json!({ "hull": "B" })).await;
        coalescer.enqueue("mast", json!({ "mast": "C" })).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let sent = non_keepalive(control.sent());
        assert_eq!(sent.len(), 2, "one send per distinct key");
        assert!(sent.contains(&json!({ "hull": "B" })), "newest hull payload");
        assert!(!sent.contains(&json!({ "hull": "A" })), "older payload lost by design");
        assert!(sent.contains(&json!({ "mast": "C" })));
    }

    #[tokio::test(start_paused = true)]
    async fn separate_windows_send_separately() {
        let (coalescer, control) = connected_coalescer().await;

        coalescer.enqueue("hull", json!({ "hull": "A" })).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        coalescer.enqueue("hull", json!({ "hull": "B" })).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let sent = non_keepalive(control.sent());
        assert_eq!(sent.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_sends_immediately_and_disarms_the_timer() {
        let (coalescer, control) = connected_coalescer().await;

        coalescer.enqueue("hull", json!({ "hull": "A" })).await;
        coalescer.flush().await;
        assert_eq!(non_keepalive(control.sent()).len(), 1, "no debounce wait");

        // The timer that was armed by the enqueue must not fire again.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(non_keepalive(control.sent()).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_on_empty_set_is_a_noop() {
        let (coalescer, control) = connected_coalescer().await;
        coalescer.flush().await;
        assert!(non_keepalive(control.sent()).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_drain_drops_without_error() {
        let engine = Arc::new(LoopbackEngine::new(LoopbackConfig::default()));
        let control = engine.control();
        let manager = SessionManager::new(engine, ConnectionPolicy::default()).unwrap();
        let coalescer = CommandCoalescer::new(manager);

        coalescer.enqueue("hull", json!({ "hull": "A" })).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(control.sent().is_empty(), "nothing reaches a closed session");
    }
}
