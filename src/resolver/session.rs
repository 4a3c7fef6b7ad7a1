//! State carried from one frame to the next

use crate::feature::params::HdrParams;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Tone mapping luminance of the last frame that ran HDR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdrLuminance {
    pub max_content_level: u16,
    pub max_display: u16,
}

impl HdrLuminance {
    pub fn of(params: &HdrParams) -> Self {
        Self {
            max_content_level: params.max_content_level_lum,
            max_display: params.max_display_lum,
        }
    }
}

/// Per-stream state: read while resolving, written only when a pass is committed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    last_hdr: Option<HdrLuminance>,
    frames: u64,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames fully resolved so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_hdr(&self) -> Option<HdrLuminance> {
        self.last_hdr
    }

    /// Must the 3D LUT be regenerated for `params`?
    pub fn hdr_changed(&self, params: &HdrParams) -> bool {
        self.last_hdr != Some(HdrLuminance::of(params))
    }

    pub fn commit_hdr(&mut self, params: &HdrParams) {
        let luminance = HdrLuminance::of(params);
        if self.last_hdr != Some(luminance) {
            tracing::debug!(
                "HDR luminance committed: content {} nits, display {} nits",
                luminance.max_content_level,
                luminance.max_display
            );
        }
        self.last_hdr = Some(luminance);
    }

    pub(crate) fn end_frame(&mut self) {
        self.frames += 1;
    }
}

/// Session shared by several frame producers
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<Mutex<SessionContext>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionContext> {
        self.inner.lock()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SessionContext {
        self.inner.lock().clone()
    }
}

impl From<SessionContext> for SharedSession {
    fn from(session: SessionContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Format, HdrMetadata, Surface, TransferFunction};

    fn hdr(content: u16) -> HdrParams {
        let input = Surface::new(Format::P010, 64, 64).with_transfer(
            TransferFunction::Pq,
            HdrMetadata {
                max_content_level: content,
                max_display_luminance: 1000,
            },
        );
        HdrParams::from_surfaces(&input, &Surface::new(Format::Argb8, 64, 64)).unwrap()
    }

    #[test]
    fn test_hdr_change_detection() {
        let mut session = SessionContext::new();
        assert!(session.hdr_changed(&hdr(1000)));
        session.commit_hdr(&hdr(1000));
        assert!(!session.hdr_changed(&hdr(1000)));
        assert!(session.hdr_changed(&hdr(4000)));
    }

    #[test]
    fn test_shared_session() {
        let shared = SharedSession::new();
        let other = shared.clone();
        other.lock().commit_hdr(&hdr(600));
        other.lock().end_frame();
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.frames(), 1);
        assert_eq!(snapshot.last_hdr().map(|l| l.max_content_level), Some(600));
    }
}
