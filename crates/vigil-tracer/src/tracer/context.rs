use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::runtime::{ExceptionInfo, Frame, FrameId, Instrumentation, Locals, TraceEvent};

/// Location of a frame of a traced thread's stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackEntry {
    /// Identity of the frame.
    pub frame_id: FrameId,

    /// File the frame's code was compiled from.
    pub filename: String,

    /// Leaf name of the scope the frame runs.
    pub scope_name: String,

    /// Line about to be executed.
    pub line: u32,

    /// Instrumentation variant installed on the frame.
    pub instrumentation: Instrumentation,
}

pub(crate) struct StackSlot<F> {
    pub(crate) frame: F,
    pub(crate) instrumentation: Instrumentation,
}

/// Trace context of a debuggee thread.
///
/// It lives from the thread's first instrumentation callback until its
/// outermost frame unwinds.
pub(crate) struct ThreadContext<F: Frame> {
    thread_id: u64,

    /// Live frames, outermost first.
    stack: Mutex<Vec<StackSlot<F>>>,
    current_event: Mutex<Option<TraceEvent>>,

    shadows: Mutex<HashMap<FrameId, Locals<F::Value>>>,
    has_shadow: AtomicBool,

    pub(crate) broken: AtomicBool,
    pub(crate) unhandled_exception: AtomicBool,
    last_exception: Mutex<Option<ExceptionInfo>>,

    refs: Mutex<RefState>,
    released: Condvar,
}

#[derive(Default)]
struct RefState {
    count: usize,
    done: bool,
}

impl<F: Frame> ThreadContext<F> {
    pub(crate) fn new(thread_id: u64) -> Self {
        Self {
            thread_id,
            stack: Mutex::default(),
            current_event: Mutex::default(),
            shadows: Mutex::default(),
            has_shadow: AtomicBool::new(false),
            broken: AtomicBool::new(false),
            unhandled_exception: AtomicBool::new(false),
            last_exception: Mutex::default(),
            refs: Mutex::default(),
            released: Condvar::new(),
        }
    }

    pub(crate) const fn thread_id(&self) -> u64 {
        self.thread_id
    }

    pub(crate) fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    pub(crate) fn set_current_event(&self, event: &TraceEvent) {
        *self.current_event.lock() = Some(event.clone());
    }

    pub(crate) fn current_event(&self) -> Option<TraceEvent> {
        self.current_event.lock().clone()
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    /// Returns the instrumentation of the given frame, if it is on the stack.
    pub(crate) fn instrumentation_of(&self, frame_id: FrameId) -> Option<Instrumentation> {
        self.stack
            .lock()
            .iter()
            .rev()
            .find(|slot| slot.frame.id() == frame_id)
            .map(|slot| slot.instrumentation)
    }

    pub(crate) fn push(&self, frame: F, instrumentation: Instrumentation) {
        self.stack.lock().push(StackSlot {
            frame,
            instrumentation,
        });
    }

    /// Pops the given frame and every frame above it.
    ///
    /// Returns whether the stack is now empty.
    pub(crate) fn pop(&self, frame_id: FrameId) -> bool {
        let mut stack = self.stack.lock();

        if let Some(pos) = stack.iter().rposition(|slot| slot.frame.id() == frame_id) {
            for slot in stack.drain(pos..) {
                self.drop_shadow(slot.frame.id());
            }
        }

        stack.is_empty()
    }

    /// Returns the innermost frame.
    pub(crate) fn top(&self) -> Option<F> {
        self.stack.lock().last().map(|slot| slot.frame.clone())
    }

    /// Returns the frame at the given index, innermost first.
    pub(crate) fn frame_at(&self, index: usize) -> Option<F> {
        self.stack
            .lock()
            .iter()
            .rev()
            .nth(index)
            .map(|slot| slot.frame.clone())
    }

    pub(crate) fn stack(&self) -> Vec<StackEntry> {
        self.stack
            .lock()
            .iter()
            .rev()
            .map(|slot| StackEntry {
                frame_id: slot.frame.id(),
                filename: slot.frame.filename().to_owned(),
                scope_name: slot.frame.scope_name().to_owned(),
                line: slot.frame.line(),
                instrumentation: slot.instrumentation,
            })
            .collect()
    }

    /// Recomputes the instrumentation of every live frame, and installs the
    /// variants that changed.
    pub(crate) fn reinstall(
        &self,
        mut select: impl FnMut(&F, bool) -> Instrumentation,
        mut install: impl FnMut(&F, Instrumentation),
    ) {
        let mut stack = self.stack.lock();

        for (i, slot) in stack.iter_mut().enumerate() {
            let instrumentation = select(&slot.frame, i == 0);

            if instrumentation != slot.instrumentation {
                slot.instrumentation = instrumentation;
                install(&slot.frame, instrumentation);
            }
        }
    }

    pub(crate) fn set_last_exception(&self, exception: ExceptionInfo) {
        *self.last_exception.lock() = Some(exception);
    }

    pub(crate) fn last_exception(&self) -> Option<ExceptionInfo> {
        self.last_exception.lock().clone()
    }

    /// Returns the shadow copy of a frame's locals, if any.
    pub(crate) fn shadow(&self, frame_id: FrameId) -> Option<Locals<F::Value>> {
        if !self.has_shadow.load(Ordering::Acquire) {
            return None;
        }

        self.shadows.lock().get(&frame_id).cloned()
    }

    /// Buffers a write to a frame's local variable.
    pub(crate) fn shadow_write(&self, frame: &F, name: &str, value: F::Value) {
        let mut shadows = self.shadows.lock();

        shadows
            .entry(frame.id())
            .or_insert_with(|| frame.locals())
            .insert(name.to_owned(), value);

        self.has_shadow.store(true, Ordering::Release);
    }

    /// Flushes the shadow copy of a frame's locals into the live frame.
    pub(crate) fn commit_shadow(&self, frame: &F) {
        if !self.has_shadow.load(Ordering::Acquire) {
            return;
        }

        let locals = {
            let mut shadows = self.shadows.lock();
            let locals = shadows.remove(&frame.id());
            self.has_shadow.store(!shadows.is_empty(), Ordering::Release);
            locals
        };

        if let Some(locals) = locals {
            tracing::trace!(tid = self.thread_id, frame = frame.id(), "committing locals");

            if let Err(e) = frame.commit_locals(&locals) {
                tracing::warn!(tid = self.thread_id, error = %e, "failed to commit locals");
            }
        }
    }

    fn drop_shadow(&self, frame_id: FrameId) {
        if !self.has_shadow.load(Ordering::Acquire) {
            return;
        }

        let mut shadows = self.shadows.lock();
        shadows.remove(&frame_id);
        self.has_shadow.store(!shadows.is_empty(), Ordering::Release);
    }

    /// Takes an external reference on this context.
    pub(crate) fn acquire(&self) -> crate::Result<()> {
        let mut refs = self.refs.lock();

        if refs.done {
            return Err(crate::Error::ThreadDone(self.thread_id));
        }

        refs.count += 1;
        Ok(())
    }

    /// Releases an external reference on this context.
    pub(crate) fn release(&self) {
        let mut refs = self.refs.lock();

        refs.count = refs.count.saturating_sub(1);
        if refs.count == 0 {
            self.released.notify_all();
        }
    }

    /// Marks the context done, then blocks until every external reference
    /// has been released.
    pub(crate) fn teardown(&self, poll_interval: Duration) {
        let mut refs = self.refs.lock();
        refs.done = true;

        while refs.count > 0 {
            tracing::debug!(tid = self.thread_id, refs = refs.count, "waiting for frame handles");
            self.released.wait_for(&mut refs, poll_interval);
        }
    }
}
