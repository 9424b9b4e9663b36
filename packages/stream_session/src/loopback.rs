//! In-process stand-in for the remote rendering engine.
//!
//! Opens instantly, reports the media stream playing after a configurable
//! startup delay, and echoes every interaction back as a response. The
//! shared [`LoopbackControl`] can freeze the "remote side" (stream stops
//! playing and echoes stop arriving) to simulate a session that silently
//! died, which is exactly what the manager's staleness detection exists for.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::engine::{
    EngineHandle, EngineResponse, MediaSurface, StreamEngine, SurfaceFit, SurfaceId,
};

const RESPONSE_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct LoopbackConfig {
    /// Time until the media stream reports playing after open.
    pub startup_delay: Duration,
    /// Latency before an interaction is echoed back.
    pub echo_delay: Duration,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_millis(250),
            echo_delay: Duration::from_millis(25),
        }
    }
}

/// Knobs and counters shared across every handle the engine opens.
#[derive(Debug, Default)]
pub struct LoopbackControl {
    opens: AtomicUsize,
    teardowns: AtomicUsize,
    frozen: AtomicBool,
    fail_sends: AtomicBool,
    fail_opens: AtomicBool,
    next_surface: AtomicU64,
    sent: std::sync::Mutex<Vec<Value>>,
}

impl LoopbackControl {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    /// Every payload accepted by `send_interaction`, in arrival order.
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Simulate the remote session silently dying: the stream stops playing
    /// and interactions are accepted but never echoed.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn unfreeze(&self) {
        self.frozen.store(false, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    fn record(&self, payload: &Value) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(payload.clone());
        }
    }
}

pub struct LoopbackEngine {
    config: LoopbackConfig,
    control: Arc<LoopbackControl>,
}

impl LoopbackEngine {
    pub fn new(config: LoopbackConfig) -> Self {
        Self {
            config,
            control: Arc::new(LoopbackControl::default()),
        }
    }

    pub fn control(&self) -> Arc<LoopbackControl> {
        self.control.clone()
    }
}

#[async_trait]
impl StreamEngine for LoopbackEngine {
    async fn open(&self, session_id: &str) -> Result<Arc<dyn EngineHandle>> {
        self.control.opens.fetch_add(1, Ordering::SeqCst);
        if self.control.fail_opens.load(Ordering::SeqCst) {
            bail!("loopback engine refused to open session {session_id}");
        }

        let surface_id = SurfaceId(self.control.next_surface.fetch_add(1, Ordering::SeqCst));
        let (responses, _) = broadcast::channel(RESPONSE_CAPACITY);
        let handle = Arc::new(LoopbackHandle {
            surface_id,
            open: AtomicBool::new(true),
            playing: Arc::new(AtomicBool::new(false)),
            responses,
            config: self.config.clone(),
            control: self.control.clone(),
        });

        debug!(session = session_id, %surface_id, "loopback session opened");

        let playing = handle.playing.clone();
        let startup_delay = self.config.startup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(startup_delay).await;
            playing.store(true, Ordering::SeqCst);
        });

        Ok(handle)
    }
}

struct LoopbackHandle {
    surface_id: SurfaceId,
    open: AtomicBool,
    playing: Arc<AtomicBool>,
    responses: broadcast::Sender<EngineResponse>,
    config: LoopbackConfig,
    control: Arc<LoopbackControl>,
}

impl EngineHandle for LoopbackHandle {
    fn send_interaction(&self, payload: Value) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            bail!("session already torn down");
        }
        if self.control.fail_sends.load(Ordering::SeqCst) {
            bail!("interaction rejected");
        }
        self.control.record(&payload);
        if self.control.frozen.load(Ordering::SeqCst) {
            // Accepted into the void: the dead session never answers.
            return Ok(());
        }
        let responses = self.responses.clone();
        let echo_delay = self.config.echo_delay;
        tokio::spawn(async move {
            tokio::time::sleep(echo_delay).await;
            let _ = responses.send(EngineResponse {
                data: payload.to_string(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
        });
        Ok(())
    }

    fn responses(&self) -> broadcast::Receiver<EngineResponse> {
        self.responses.subscribe()
    }

    fn is_playing(&self) -> bool {
        self.open.load(Ordering::SeqCst)
            && !self.control.frozen.load(Ordering::SeqCst)
            && self.playing.load(Ordering::SeqCst)
    }

    fn surface(&self) -> Option<MediaSurface> {
        if !self.open.load(Ordering::SeqCst) {
            return None;
        }
        Some(MediaSurface {
            id: self.surface_id,
            fit: SurfaceFit::Contain,
        })
    }

    fn teardown(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.playing.store(false, Ordering::SeqCst);
            self.control.teardowns.fetch_add(1, Ordering::SeqCst);
            debug!(surface = %self.surface_id, "loopback session torn down");
        }
        Ok(())
    }
}
