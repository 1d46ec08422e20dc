use std::sync::Arc;

use super::context::ThreadContext;
use crate::runtime::{Frame, FrameId, Locals, Namespace};

/// Reference to a frame of a traced thread, acquired for inspection.
///
/// While a handle is alive, the owning thread cannot complete its exit.
/// Writes made through the handle are buffered, and only reach the live frame
/// at its next statement boundary.
pub struct FrameHandle<F: Frame> {
    context: Arc<ThreadContext<F>>,
    frame: F,
    index: usize,
}

impl<F: Frame> FrameHandle<F> {
    /// Acquires the frame at `index` (innermost first) of a context.
    pub(crate) fn acquire(context: Arc<ThreadContext<F>>, index: usize) -> crate::Result<Self> {
        context.acquire()?;

        let Some(frame) = context.frame_at(index) else {
            context.release();
            return Err(crate::Error::InvalidFrame(index));
        };

        Ok(Self {
            context,
            frame,
            index,
        })
    }

    /// ID of the thread owning the frame.
    pub fn thread_id(&self) -> u64 {
        self.context.thread_id()
    }

    /// Index of the frame in its stack, innermost first.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Identity of the frame.
    pub fn frame_id(&self) -> FrameId {
        self.frame.id()
    }

    /// File the frame's code was compiled from.
    pub fn filename(&self) -> &str {
        self.frame.filename()
    }

    /// Leaf name of the scope the frame runs.
    pub fn scope_name(&self) -> &str {
        self.frame.scope_name()
    }

    /// Line about to be executed.
    pub fn line(&self) -> u32 {
        self.frame.line()
    }

    /// Returns the frame's local variables, including pending writes.
    pub fn locals(&self) -> Locals<F::Value> {
        self.context
            .shadow(self.frame.id())
            .unwrap_or_else(|| self.frame.locals())
    }

    /// Returns a local variable, including pending writes.
    pub fn get_local(&self, name: &str) -> Option<F::Value> {
        match self.context.shadow(self.frame.id()) {
            Some(shadow) => shadow.get(name).cloned(),
            None => self.frame.get(name),
        }
    }

    /// Buffers a write to a local variable.
    pub fn set_local(&self, name: &str, value: F::Value) {
        tracing::debug!(tid = self.thread_id(), frame = self.frame.id(), name, "local written");

        self.context.shadow_write(&self.frame, name, value);
    }

    /// Returns whether writes are pending for this frame.
    pub fn has_pending_writes(&self) -> bool {
        self.context.shadow(self.frame.id()).is_some()
    }
}

impl<F: Frame> Drop for FrameHandle<F> {
    fn drop(&mut self) {
        self.context.release();
    }
}
