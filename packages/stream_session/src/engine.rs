use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

/// Opaque identifier for a video surface exposed by an engine handle.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// How a surface is scaled inside its host container.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SurfaceFit {
    /// Fill the container, preserving aspect ratio by cropping overflow.
    Cover,
    /// Letterbox inside the container.
    Contain,
}

/// The engine's video surface, as handed to a [`SurfaceHost`](crate::SurfaceHost).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MediaSurface {
    pub id: SurfaceId,
    pub fit: SurfaceFit,
}

impl MediaSurface {
    pub fn with_fit(self, fit: SurfaceFit) -> Self {
        Self { fit, ..self }
    }
}

/// Response event delivered by the remote session.
///
/// The manager only uses arrival to refresh its activity clock; the content
/// is opaque to this crate.
#[derive(Clone, Debug)]
pub struct EngineResponse {
    pub data: String,
    pub timestamp: i64,
}

/// Handle to one live remote session.
///
/// Dyn-safe by design: `send_interaction` enqueues without blocking and the
/// inbound side is a broadcast channel, so the manager and any number of
/// observers can share one handle behind an `Arc`.
pub trait EngineHandle: Send + Sync {
    /// Hand an interaction payload to the remote session, unmodified.
    fn send_interaction(&self, payload: Value) -> Result<()>;

    /// Subscribe to response strings from the session.
    fn responses(&self) -> broadcast::Receiver<EngineResponse>;

    /// Play state of the underlying media stream. This is the only reliable
    /// liveness signal the collaborator exposes, so it is polled.
    fn is_playing(&self) -> bool;

    /// Current video surface, if the session still holds one.
    fn surface(&self) -> Option<MediaSurface>;

    /// Pause, detach and unload the media resource.
    fn teardown(&self) -> Result<()>;
}

/// Factory for engine sessions. The manager owns at most one open handle at
/// a time; swapping engines (real vs. loopback) is a constructor argument.
#[async_trait]
pub trait StreamEngine: Send + Sync {
    async fn open(&self, session_id: &str) -> Result<Arc<dyn EngineHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_fit_replaces_fit_only() {
        let surface = MediaSurface {
            id: SurfaceId(7),
            fit: SurfaceFit::Contain,
        };
        let covered = surface.with_fit(SurfaceFit::Cover);
        assert_eq!(covered.id, SurfaceId(7));
        assert_eq!(covered.fit, SurfaceFit::Cover);
    }

    #[test]
    fn surface_id_display() {
        assert_eq!(SurfaceId(3).to_string(), "surface-3");
    }
}
