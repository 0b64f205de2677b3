//! Next-frame callback queue.
//!
//! The host calls back once per display frame. Each state of the session
//! re-requests its own callback for the following frame, so at most one
//! chain is live. A request returns a handle that can cancel it before it
//! runs.

use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

/// Which per-frame step to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCallback {
    /// Edit-mode redraw and decorative timers.
    Idle,
    Enter,
    Play,
    Leave,
}

#[derive(Debug, Default)]
pub struct FrameScheduler {
    next_id: u64,
    pending: Vec<(FrameHandle, FrameCallback)>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `callback` for the next frame.
    pub fn request(&mut self, callback: FrameCallback) -> FrameHandle {
        self.next_id += 1;
        let handle = FrameHandle(self.next_id);
        self.pending.push((handle, callback));
        trace!("Requested {:?} as {:?}", callback, handle);
        handle
    }

    /// Drop a queued callback. Returns false if it already ran or was
    /// never queued.
    pub fn cancel(&mut self, handle: FrameHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(h, _)| *h != handle);
        before != self.pending.len()
    }

    /// Everything queued for this frame, in request order. Callbacks requested
    /// while these run land in the next frame.
    pub fn take_due(&mut self) -> Vec<FrameCallback> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(_, cb)| cb)
            .collect()
    }

    pub fn is_pending(&self, callback: FrameCallback) -> bool {
        self.pending.iter().any(|(_, cb)| *cb == callback)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_and_take() {
        let mut s = FrameScheduler::new();
        s.request(FrameCallback::Idle);
        s.request(FrameCallback::Enter);
        assert_eq!(s.take_due(), vec![FrameCallback::Idle, FrameCallback::Enter]);
        assert_eq!(s.pending_len(), 0);
    }

    #[test]
    fn test_cancel_removes_only_that_request() {
        let mut s = FrameScheduler::new();
        let a = s.request(FrameCallback::Play);
        s.request(FrameCallback::Leave);
        assert!(s.cancel(a));
        assert!(!s.cancel(a));
        assert_eq!(s.take_due(), vec![FrameCallback::Leave]);
    }

    #[test]
    fn test_handles_are_unique() {
        let mut s = FrameScheduler::new();
        let a = s.request(FrameCallback::Idle);
        s.take_due();
        let b = s.request(FrameCallback::Idle);
        assert_ne!(a, b);
        assert!(!s.cancel(a));
        assert!(s.is_pending(FrameCallback::Idle));
    }
}
