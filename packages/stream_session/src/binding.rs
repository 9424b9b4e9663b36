use tracing::debug;

use crate::engine::{MediaSurface, SurfaceFit, SurfaceId};
use crate::manager::SessionManager;

/// Container that can host the session's video surface. Implemented by
/// whatever view layer is currently mounted.
pub trait SurfaceHost {
    /// Remove every child currently attached.
    fn clear(&mut self);
    fn attach(&mut self, surface: MediaSurface);
    /// Detach by id; returns whether the surface was present.
    fn detach(&mut self, id: SurfaceId) -> bool;
}

/// Projects the manager's current surface onto whatever host asks for it.
///
/// Holds no state of its own, which is what lets the connection outlive any
/// single page: views bind on mount, unbind on unmount, and the session
/// never notices.
pub struct ViewBinder {
    manager: SessionManager,
}

impl ViewBinder {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }

    /// Clear the host and attach the current surface, cover-fit. Returns
    /// `false` (a no-op, not an error) when no handle exists yet; the caller
    /// is expected to re-bind once it observes `Connected`.
    pub async fn bind(&self, host: &mut dyn SurfaceHost) -> bool {
        let Some(surface) = self.manager.current_surface().await else {
            debug!("no surface to bind yet, rebind on the connected notification");
            return false;
        };
        host.clear();
        host.attach(surface.with_fit(SurfaceFit::Cover));
        true
    }

    /// Detach the surface from the host if still attached. Purely cosmetic;
    /// the session itself is never touched.
    pub async fn unbind(&self, host: &mut dyn SurfaceHost) {
        if let Some(surface) = self.manager.current_surface().await {
            host.detach(surface.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionPolicy;
    use crate::loopback::{LoopbackConfig, LoopbackEngine};
    use std::sync::Arc;

    #[derive(Default)]
    struct TestHost {
        children: Vec<MediaSurface>,
        clears: usize,
    }

    impl SurfaceHost for TestHost {
        fn clear(&mut self) {
            self.clears += 1;
            self.children.clear();
        }

        fn attach(&mut self, surface: MediaSurface) {
            self.children.push(surface);
        }

        fn detach(&mut self, id: SurfaceId) -> bool {
            let before = self.children.len();
            self.children.retain(|s| s.id != id);
            self.children.len() != before
        }
    }

    async fn connected_binder() -> (ViewBinder, SessionManager, Arc<crate::loopback::LoopbackControl>)
    {
        let engine = Arc::new(LoopbackEngine::new(LoopbackConfig::default()));
        let control = engine.control();
        let manager = SessionManager::new(engine, ConnectionPolicy::default()).unwrap();
        manager.initialize("binding-test").await.unwrap();
        (ViewBinder::new(manager.clone()), manager, control)
    }

    #[tokio::test(start_paused = true)]
    async fn bind_attaches_the_surface_cover_fit() {
        let (binder, _manager, _control) = connected_binder().await;
        let mut host = TestHost::default();

        assert!(binder.bind(&mut host).await);
        assert_eq!(host.children.len(), 1);
        assert_eq!(host.children[0].fit, SurfaceFit::Cover);
        assert_eq!(host.clears, 1, "prior children cleared first");
    }

    #[tokio::test(start_paused = true)]
    async fn rebinding_replaces_rather_than_stacks() {
        let (binder, _manager, _control) = connected_binder().await;
        let mut host = TestHost::default();

        binder.bind(&mut host).await;
        binder.bind(&mut host).await;
        assert_eq!(host.children.len(), 1);
        assert_eq!(host.clears, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn bind_without_a_handle_is_a_noop() {
        let engine = Arc::new(LoopbackEngine::new(LoopbackConfig::default()));
        let manager = SessionManager::new(engine, ConnectionPolicy::default()).unwrap();
        let binder = ViewBinder::new(manager);
        let mut host = TestHost::default();

        assert!(!binder.bind(&mut host).await);
        assert!(host.children.is_empty());
        assert_eq!(host.clears, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unbind_detaches_without_tearing_down() {
        let (binder, _manager, control) = connected_binder().await;
        let mut host = TestHost::default();

        binder.bind(&mut host).await;
        binder.unbind(&mut host).await;
        assert!(host.children.is_empty());
        assert_eq!(control.teardowns(), 0, "detachment is purely cosmetic");
    }

    #[tokio::test(start_paused = true)]
    async fn unbind_twice_is_harmless() {
        let (binder, _manager, _control) = connected_binder().await;
        let mut host = TestHost::default();

        binder.bind(&mut host).await;
        binder.unbind(&mut host).await;
        binder.unbind(&mut host).await;
        assert!(host.children.is_empty());
    }
}
