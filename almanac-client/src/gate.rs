use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Connectivity and authentication flags shared by the dispatcher and the
/// reconciler. Both must be set for any remote traffic to happen.
#[derive(Debug, Clone, Default)]
pub struct SyncGate {
    online: Arc<AtomicBool>,
    authenticated: Arc<AtomicBool>,
}

impl SyncGate {
    pub fn new(online: bool, authenticated: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
            authenticated: Arc::new(AtomicBool::new(authenticated)),
        }
    }

    /// Gate that never opens; every drain and reconcile is a no-op.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Returns the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::AcqRel)
    }

    /// Returns the previous value.
    pub fn set_authenticated(&self, authenticated: bool) -> bool {
        self.authenticated.swap(authenticated, Ordering::AcqRel)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.is_online() && self.is_authenticated()
    }
}
