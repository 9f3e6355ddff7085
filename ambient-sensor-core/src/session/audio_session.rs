use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::error::SensorError;
use crate::traits::session_host::{AudioSessionHost, PermissionCallback};

struct SessionInner {
    category_ready: bool,
    holder: Option<Uuid>,
    notification_category: bool,
}

/// Process-wide audio session guard.
///
/// Create one per process and share it (`Arc<AudioSession>`) with every
/// engine. The session category is activated at most once, on the first
/// successful capture start, and stays active until [`AudioSession::teardown`].
/// Only one engine may hold the session for capture at a time, and the
/// notification category is registered at most once per session.
pub struct AudioSession {
    host: Arc<dyn AudioSessionHost>,
    inner: Mutex<SessionInner>,
}

impl AudioSession {
    pub fn new(host: Arc<dyn AudioSessionHost>) -> Self {
        Self {
            host,
            inner: Mutex::new(SessionInner {
                category_ready: false,
                holder: None,
                notification_category: false,
            }),
        }
    }

    pub fn request_record_permission(&self, on_result: PermissionCallback) {
        self.host.request_record_permission(on_result);
    }

    /// Claim the session for `owner`. Re-claiming by the current holder succeeds.
    pub fn acquire(&self, owner: Uuid) -> Result<(), SensorError> {
        let mut inner = self.inner.lock();
        match inner.holder {
            Some(current) if current != owner => Err(SensorError::SessionBusy),
            _ => {
                inner.holder = Some(owner);
                Ok(())
            }
        }
    }

    /// Give up the session if `owner` holds it.
    pub fn release(&self, owner: Uuid) {
        let mut inner = self.inner.lock();
        if inner.holder == Some(owner) {
            inner.holder = None;
        }
    }

    /// Activate the session category unless it is already active.
    ///
    /// Returns `true` if this call performed the activation.
    pub fn ensure_active(&self) -> Result<bool, SensorError> {
        let mut inner = self.inner.lock();
        if inner.category_ready {
            return Ok(false);
        }
        self.host.activate_session().map_err(|e| match e {
            SensorError::SessionActivationFailure(_) => e,
            other => SensorError::SessionActivationFailure(other.to_string()),
        })?;
        inner.category_ready = true;
        log::info!("Audio session category activated");
        Ok(true)
    }

    pub fn is_category_ready(&self) -> bool {
        self.inner.lock().category_ready
    }

    pub fn holder(&self) -> Option<Uuid> {
        self.inner.lock().holder
    }

    /// Returns `true` exactly once: the caller that gets it registers the
    /// notification category.
    pub fn claim_notification_category(&self) -> bool {
        let mut inner = self.inner.lock();
        !std::mem::replace(&mut inner.notification_category, true)
    }

    /// Full shutdown on behalf of `owner`: deactivate the category so the
    /// next start re-activates it.
    ///
    /// Does nothing while another engine holds the session.
    pub fn teardown(&self, owner: Uuid) -> Result<(), SensorError> {
        let mut inner = self.inner.lock();
        match inner.holder {
            Some(current) if current != owner => {
                log::debug!("Session held by {}, keeping it active", current);
                return Ok(());
            }
            _ => inner.holder = None,
        }
        if !inner.category_ready {
            return Ok(());
        }
        inner.category_ready = false;
        self.host.deactivate_session()
    }
}
