//! Persistent remote-stream session lifecycle.
//!
//! One [`SessionManager`] owns the single connection to a remote rendering
//! session: it opens the session, watches the media stream for liveness,
//! transparently reconnects when the session silently dies, and broadcasts
//! every state change to any number of subscribers. The session outlives the
//! views that display it; [`ViewBinder`] re-projects the video surface onto
//! whatever container is currently mounted, and [`CommandCoalescer`]
//! debounces bursty interactions (color drags) into one send per key.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stream_session::{
//!     CommandCoalescer, ConnectionPolicy, LoopbackConfig, LoopbackEngine, SessionManager,
//!     paint_command,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = Arc::new(LoopbackEngine::new(LoopbackConfig::default()));
//!     let manager = SessionManager::new(engine, ConnectionPolicy::default()).unwrap();
//!
//!     // Watch state transitions
//!     let mut rx = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(change) = rx.recv().await {
//!             println!("session is now {}", change.state);
//!         }
//!     });
//!
//!     manager.initialize("showroom-42").await.unwrap();
//!
//!     // Coalesce a burst of paint edits into one send per part
//!     let coalescer = CommandCoalescer::new(manager.clone());
//!     for color in ["pearl", "sapphire", "midnight"] {
//!         let (key, payload) = paint_command("hull", color);
//!         coalescer.enqueue(key, payload).await;
//!     }
//!     coalescer.flush().await;
//!
//!     manager.disconnect().await;
//! }
//! ```

mod binding;
mod coalescer;
mod config;
mod engine;
mod error;
pub mod loopback;
mod manager;
mod parts;
mod state;

pub use binding::{SurfaceHost, ViewBinder};
pub use coalescer::CommandCoalescer;
pub use config::ConnectionPolicy;
pub use engine::{EngineHandle, EngineResponse, MediaSurface, StreamEngine, SurfaceFit, SurfaceId};
pub use error::SessionError;
pub use loopback::{LoopbackConfig, LoopbackControl, LoopbackEngine};
pub use manager::SessionManager;
pub use parts::{paint_command, wire_name};
pub use state::{ConnectionState, StateChange};
