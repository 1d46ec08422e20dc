mod builder;
mod context;
mod handle;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use vigil_symbol::ScopeResolver;

pub use self::builder::Builder;
pub use self::context::StackEntry;
use self::context::ThreadContext;
pub use self::handle::FrameHandle;
use crate::breakpoint::{Breakpoint, BreakpointId, BreakpointRegistry, Predicate};
use crate::config::EngineConfig;
use crate::runtime::{Evaluator, ExceptionInfo, Frame, FrameId, Instrumentation, Namespace};
use crate::runtime::{Runtime, TraceEvent};
use crate::state::{BreakpointAction, Callback, DebuggerState, Event, EventDispatcher};
use crate::state::{EventQueue, StateCoordinator, Subscription};

/// ID of a debuggee thread, as reported by the host runtime.
pub type ThreadId = u64;

type Expr<R> = <<R as Runtime>::Evaluator as Evaluator>::Expr;

/// Break targets and arbitration state, shared by every thread.
struct BreakControl {
    /// Whether a break round is open (until the next resume).
    round_open: bool,

    /// Thread the operator is focused on.
    current: Option<ThreadId>,

    step_thread: Option<ThreadId>,
    next_frame: Option<FrameId>,
    return_frame: Option<FrameId>,

    trap_exceptions: bool,
}

impl BreakControl {
    fn clear_targets(&mut self) {
        self.step_thread = None;
        self.next_frame = None;
        self.return_frame = None;
    }

    const fn targets(&self) -> Targets {
        Targets {
            step_thread: self.step_thread,
            next_frame: self.next_frame,
            return_frame: self.return_frame,
            trap_exceptions: self.trap_exceptions,
        }
    }
}

#[derive(Clone, Copy)]
struct Targets {
    step_thread: Option<ThreadId>,
    next_frame: Option<FrameId>,
    return_frame: Option<FrameId>,
    trap_exceptions: bool,
}

/// Breakpoint coordination engine.
///
/// The host runtime reports every statement boundary of its instrumented
/// frames to [dispatch](Self::dispatch), on the debuggee thread itself. The
/// operator drives the engine through the other functions, from any thread.
pub struct TraceEngine<R: Runtime> {
    runtime: R,
    config: EngineConfig,

    registry: BreakpointRegistry,
    dispatcher: Arc<EventDispatcher>,
    coordinator: StateCoordinator,
    queue: Arc<EventQueue>,

    threads: RwLock<IndexMap<ThreadId, Arc<ThreadContext<R::Frame>>>>,
    exited: Mutex<HashSet<ThreadId>>,

    control: Mutex<BreakControl>,

    /// Set while a break round is requested or open.
    break_requested: AtomicBool,

    /// Compiled predicates by source (`None` if compilation failed).
    predicates: Mutex<HashMap<String, Option<Arc<Expr<R>>>>>,
}

impl<R: Runtime> TraceEngine<R> {
    fn new(
        runtime: R,
        resolver: ScopeResolver,
        config: EngineConfig,
        listeners: Vec<(Callback, Subscription)>,
    ) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new());
        let queue = Arc::new(EventQueue::new(config.event_queue_size));

        let feed = queue.clone();
        dispatcher.register(
            Arc::new(move |event| feed.push(event.clone())),
            Subscription::all(),
            false,
        );

        for (callback, subscription) in listeners {
            dispatcher.register(callback, subscription, false);
        }

        Self {
            coordinator: StateCoordinator::new(dispatcher.clone(), config.poll_interval()),
            registry: BreakpointRegistry::new(Arc::new(resolver)),
            control: Mutex::new(BreakControl {
                round_open: false,
                current: None,
                step_thread: None,
                next_frame: None,
                return_frame: None,
                trap_exceptions: config.trap_exceptions,
            }),
            runtime,
            config,
            dispatcher,
            queue,
            threads: RwLock::default(),
            exited: Mutex::default(),
            break_requested: AtomicBool::new(false),
            predicates: Mutex::default(),
        }
    }

    /// Returns the host runtime.
    pub const fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Returns the engine configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the breakpoint registry.
    ///
    /// Mutations made directly on the registry are neither broadcast nor
    /// reflected in the installed instrumentation until the next
    /// breakpoint operation of the engine.
    pub const fn registry(&self) -> &BreakpointRegistry {
        &self.registry
    }

    /// Returns the event dispatcher of the engine.
    pub const fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Returns the state coordinator of the engine.
    pub const fn coordinator(&self) -> &StateCoordinator {
        &self.coordinator
    }

    /// Returns the current debugger state.
    pub fn state(&self) -> DebuggerState {
        self.coordinator.state()
    }

    /// Instrumentation callback of the host runtime.
    ///
    /// Returns the instrumentation variant now installed on `frame`. This
    /// blocks the calling thread while it is broken. Nothing can unwind out
    /// of this function.
    pub fn dispatch(
        &self,
        thread_id: ThreadId,
        frame: &R::Frame,
        event: TraceEvent,
    ) -> Instrumentation {
        let res = panic::catch_unwind(AssertUnwindSafe(|| self.trace(thread_id, frame, event)));

        res.unwrap_or_else(|_| {
            tracing::warn!(tid = thread_id, "instrumentation callback panicked");
            Instrumentation::Watch
        })
    }

    fn trace(&self, thread_id: ThreadId, frame: &R::Frame, event: TraceEvent) -> Instrumentation {
        let ctx = self.context(thread_id);

        ctx.commit_shadow(frame);
        ctx.set_current_event(&event);

        tracing::trace!(tid = thread_id, event = event.label(), line = frame.line(), "callback");

        match &event {
            TraceEvent::EnterScope => {
                let outermost = ctx.depth() == 0;
                let instrumentation =
                    self.select_instrumentation(&ctx, frame, outermost, &self.targets());

                ctx.push(frame.clone(), instrumentation);
                self.runtime.install(frame, instrumentation);

                if instrumentation == Instrumentation::Watch {
                    self.check_and_break(&ctx, frame, &event);
                }
            }

            TraceEvent::Statement => {
                if self.ensure_on_stack(&ctx, frame) == Instrumentation::Idle
                    && !self.break_requested.load(Ordering::Acquire)
                {
                    return Instrumentation::Idle;
                }

                self.check_and_break(&ctx, frame, &event);
            }

            TraceEvent::LeaveScope => {
                if self.ensure_on_stack(&ctx, frame) == Instrumentation::Watch
                    || self.break_requested.load(Ordering::Acquire)
                {
                    self.check_and_break(&ctx, frame, &event);
                    self.propagate_step(&ctx, frame);
                }

                if ctx.pop(frame.id()) {
                    self.exit_thread(&ctx);
                }

                return Instrumentation::Idle;
            }

            TraceEvent::Exception(exception) => {
                self.ensure_on_stack(&ctx, frame);
                ctx.set_last_exception(exception.clone());

                if exception.unhandled && self.control.lock().trap_exceptions {
                    tracing::debug!(tid = thread_id, exception = %exception.description, "unhandled exception");
                    ctx.unhandled_exception.store(true, Ordering::Release);
                }

                self.check_and_break(&ctx, frame, &event);
            }
        }

        ctx.instrumentation_of(frame.id())
            .unwrap_or(Instrumentation::Idle)
    }

    /// Returns the context of a thread, creating it on its first callback.
    fn context(&self, thread_id: ThreadId) -> Arc<ThreadContext<R::Frame>> {
        if let Some(ctx) = self.threads.read().get(&thread_id) {
            return ctx.clone();
        }

        self.threads
            .write()
            .entry(thread_id)
            .or_insert_with(|| {
                self.exited.lock().remove(&thread_id);
                tracing::info!(tid = thread_id, "thread attached");

                Arc::new(ThreadContext::new(thread_id))
            })
            .clone()
    }

    /// Returns the instrumentation of a frame, pushing it on the stack if
    /// it was never entered.
    fn ensure_on_stack(&self, ctx: &ThreadContext<R::Frame>, frame: &R::Frame) -> Instrumentation {
        if let Some(instrumentation) = ctx.instrumentation_of(frame.id()) {
            return instrumentation;
        }

        let outermost = ctx.depth() == 0;
        let instrumentation = self.select_instrumentation(ctx, frame, outermost, &self.targets());

        ctx.push(frame.clone(), instrumentation);
        self.runtime.install(frame, instrumentation);

        instrumentation
    }

    fn exit_thread(&self, ctx: &ThreadContext<R::Frame>) {
        let thread_id = ctx.thread_id();

        ctx.teardown(self.config.poll_interval());

        self.exited.lock().insert(thread_id);
        self.threads.write().shift_remove(&thread_id);

        tracing::info!(tid = thread_id, "thread exited");

        self.dispatcher.fire(&Event::ThreadExited { thread_id });
    }

    fn targets(&self) -> Targets {
        self.control.lock().targets()
    }

    fn select_instrumentation(
        &self,
        ctx: &ThreadContext<R::Frame>,
        frame: &R::Frame,
        outermost: bool,
        targets: &Targets,
    ) -> Instrumentation {
        let state = self.coordinator.state();

        let watch = if state.is_detached() {
            false
        } else {
            state.is_broken()
                || self.break_requested.load(Ordering::Acquire)
                || self.registry.has_function_breakpoint(frame.scope_name())
                || targets.step_thread == Some(ctx.thread_id())
                || targets.next_frame == Some(frame.id())
                || targets.return_frame == Some(frame.id())
                || (targets.trap_exceptions
                    && (outermost || self.config.is_trap_scope(frame.scope_name())))
        };

        if watch {
            Instrumentation::Watch
        } else {
            Instrumentation::Idle
        }
    }

    /// Re-evaluates the instrumentation of every live frame of every thread.
    fn set_all_tracers(&self) {
        let targets = self.targets();
        let threads = self.threads.read().values().cloned().collect::<Vec<_>>();

        for ctx in threads {
            self.reinstall(&ctx, &targets);
        }
    }

    fn reinstall(&self, ctx: &ThreadContext<R::Frame>, targets: &Targets) {
        ctx.reinstall(
            |frame, outermost| self.select_instrumentation(ctx, frame, outermost, targets),
            |frame, instrumentation| self.runtime.install(frame, instrumentation),
        );
    }

    fn is_break(
        &self,
        ctx: &ThreadContext<R::Frame>,
        frame: &R::Frame,
        event: &TraceEvent,
        targets: &Targets,
    ) -> bool {
        self.break_requested.load(Ordering::Acquire)
            || ctx.unhandled_exception.load(Ordering::Acquire)
            || targets.step_thread == Some(ctx.thread_id())
            || targets.next_frame == Some(frame.id())
            || (targets.return_frame == Some(frame.id()) && *event == TraceEvent::LeaveScope)
    }

    fn breakpoint_hit(&self, frame: &R::Frame) -> bool {
        let active = self.registry.get_active_break_points_by_file(frame.filename());

        let Some(bp) = active.get(&frame.line()) else {
            return false;
        };

        let hit = bp
            .predicate
            .as_ref()
            .is_none_or(|predicate| self.eval_predicate(predicate, frame));

        if hit {
            tracing::debug!(bp = %bp.id, file = frame.filename(), line = frame.line(), "breakpoint hit");
        }

        hit
    }

    /// Evaluates a predicate in a frame's namespace.
    ///
    /// Compilation and evaluation errors count as `false`.
    fn eval_predicate(&self, predicate: &Predicate, frame: &R::Frame) -> bool {
        let evaluator = self.runtime.evaluator();

        let expr = self
            .predicates
            .lock()
            .entry(predicate.source().to_owned())
            .or_insert_with(|| match evaluator.compile(predicate.source()) {
                Ok(expr) => Some(Arc::new(expr)),
                Err(e) => {
                    tracing::warn!(predicate = predicate.source(), error = %e, "failed to compile predicate");
                    None
                }
            })
            .clone();

        let Some(expr) = expr else {
            return false;
        };

        let namespace: &dyn Namespace<Value = <R::Frame as Namespace>::Value> = frame;

        evaluator.eval(&expr, namespace).unwrap_or_else(|e| {
            tracing::warn!(predicate = predicate.source(), error = %e, "failed to evaluate predicate");
            false
        })
    }

    fn check_and_break(&self, ctx: &ThreadContext<R::Frame>, frame: &R::Frame, event: &TraceEvent) {
        if self.coordinator.state().is_detached() {
            return;
        }

        let targets = self.targets();

        if self.is_break(ctx, frame, event, &targets)
            || (*event == TraceEvent::Statement && self.breakpoint_hit(frame))
        {
            self.enter_break(ctx, frame);
        }
    }

    /// Parks the calling thread until the next resume.
    ///
    /// The first thread to break in a round becomes the current thread.
    fn enter_break(&self, ctx: &ThreadContext<R::Frame>, frame: &R::Frame) {
        let thread_id = ctx.thread_id();
        ctx.broken.store(true, Ordering::Release);

        let (current, waiter) = {
            let mut control = self.control.lock();

            let current = !control.round_open;
            if current {
                control.round_open = true;
                control.current = Some(thread_id);
                control.clear_targets();

                self.break_requested.store(true, Ordering::Release);
                self.coordinator.transition(DebuggerState::Broken);
            }

            (current, self.coordinator.waiter())
        };

        if self
            .registry
            .consume_temp_breakpoint(thread_id, frame.filename(), frame.line())
        {
            tracing::debug!(tid = thread_id, "temporary breakpoint consumed");
        }

        if current {
            self.coordinator.announce(DebuggerState::Broken);
        }

        if ctx.unhandled_exception.load(Ordering::Acquire) {
            if let Some(exception) = ctx.last_exception() {
                self.dispatcher
                    .fire(&Event::ExceptionTrapped { thread_id, exception });
            }
        }

        self.set_all_tracers();

        if current {
            tracing::debug!(tid = thread_id, file = frame.filename(), line = frame.line(), "became current");

            self.dispatcher.fire(&Event::StackSynced {
                thread_id,
                stack: ctx.stack(),
            });
        } else {
            tracing::debug!(tid = thread_id, file = frame.filename(), line = frame.line(), "parked");

            self.dispatcher.fire(&Event::ThreadBroke { thread_id });
        }

        waiter.wait(&[DebuggerState::Running]);

        ctx.broken.store(false, Ordering::Release);
        ctx.unhandled_exception.store(false, Ordering::Release);

        tracing::debug!(tid = thread_id, "resumed");

        self.reinstall(ctx, &self.targets());
    }

    /// Hands a step over to the caller of a `next`/`return` target frame
    /// leaving its scope.
    fn propagate_step(&self, ctx: &ThreadContext<R::Frame>, frame: &R::Frame) {
        let targets = {
            let mut control = self.control.lock();

            let id = Some(frame.id());
            if control.next_frame != id && control.return_frame != id {
                return;
            }

            control.clear_targets();
            control.step_thread = Some(ctx.thread_id());
            control.targets()
        };

        tracing::trace!(tid = ctx.thread_id(), "step propagated to caller");

        self.reinstall(ctx, &targets);
    }

    fn require_broken(&self) -> crate::Result<()> {
        if self.coordinator.state().is_broken() {
            Ok(())
        } else {
            Err(crate::Error::DebuggerNotBroken)
        }
    }

    fn thread(&self, thread_id: ThreadId) -> crate::Result<Arc<ThreadContext<R::Frame>>> {
        if let Some(ctx) = self.threads.read().get(&thread_id) {
            return Ok(ctx.clone());
        }

        if self.exited.lock().contains(&thread_id) {
            Err(crate::Error::ThreadDone(thread_id))
        } else {
            Err(crate::Error::ThreadNotFound(thread_id))
        }
    }

    fn current_context(&self) -> crate::Result<Arc<ThreadContext<R::Frame>>> {
        let current = self.control.lock().current;

        match current {
            Some(thread_id) => self.thread(thread_id),
            None if self.threads.read().is_empty() => Err(crate::Error::NoThreads),
            None => Err(crate::Error::DebuggerNotBroken),
        }
    }

    fn context_or_current(
        &self,
        thread_id: Option<ThreadId>,
    ) -> crate::Result<Arc<ThreadContext<R::Frame>>> {
        match thread_id {
            Some(thread_id) => self.thread(thread_id),
            None => self.current_context(),
        }
    }

    /// Resumes every parked thread, after updating the break targets.
    fn resume(&self, configure: impl FnOnce(&mut BreakControl)) {
        {
            let mut control = self.control.lock();

            configure(&mut control);

            control.round_open = false;
            control.current = None;
            self.break_requested.store(false, Ordering::Release);

            self.coordinator.transition(DebuggerState::Running);
        }

        self.coordinator.announce(DebuggerState::Running);
        self.set_all_tracers();
    }

    fn breakpoints_changed(&self, action: BreakpointAction, breakpoints: &[Breakpoint]) {
        self.set_all_tracers();

        if !breakpoints.is_empty() {
            self.dispatcher.fire(&Event::BreakpointChanged {
                action,
                breakpoints: breakpoints.to_vec(),
            });
        }
    }

    /// Sets (or modifies) a breakpoint.
    ///
    /// If `scope` is empty, `line` is an absolute line of the file.
    /// Otherwise it is a line offset within the named scope.
    #[tracing::instrument(name = "SetBreakpoint", skip_all, fields(file = filename, line = line))]
    pub fn set_breakpoint(
        &self,
        filename: &str,
        scope: &str,
        line: u32,
        enabled: bool,
        predicate: &str,
    ) -> crate::Result<Breakpoint> {
        let bp = self
            .registry
            .set_breakpoint(filename, scope, line, enabled, predicate)?;

        self.breakpoints_changed(BreakpointAction::Set, std::slice::from_ref(&bp));

        Ok(bp)
    }

    /// Sets the temporary breakpoint.
    ///
    /// A hard temporary breakpoint is owned by the current thread, and
    /// requires the debugger to be broken.
    #[tracing::instrument(name = "SetTempBreakpoint", skip_all, fields(file = filename, line = line, hard = hard))]
    pub fn set_temp_breakpoint(
        &self,
        filename: &str,
        scope: &str,
        line: u32,
        hard: bool,
    ) -> crate::Result<Breakpoint> {
        let owner = if hard {
            self.require_broken()?;
            Some(self.current_context()?.thread_id())
        } else {
            None
        };

        let bp = self
            .registry
            .set_temp_breakpoint(filename, scope, line, owner)?;

        self.set_all_tracers();

        Ok(bp)
    }

    /// Enables the given breakpoints (or all of them).
    #[tracing::instrument(name = "EnableBreakpoints", skip_all)]
    pub fn enable_breakpoints(&self, ids: &[BreakpointId], all: bool) -> Vec<Breakpoint> {
        let changed = self.registry.enable_breakpoints(ids, all);
        self.breakpoints_changed(BreakpointAction::Enable, &changed);

        changed
    }

    /// Disables the given breakpoints (or all of them).
    #[tracing::instrument(name = "DisableBreakpoints", skip_all)]
    pub fn disable_breakpoints(&self, ids: &[BreakpointId], all: bool) -> Vec<Breakpoint> {
        let changed = self.registry.disable_breakpoints(ids, all);
        self.breakpoints_changed(BreakpointAction::Disable, &changed);

        changed
    }

    /// Deletes the given breakpoints (or all of them).
    #[tracing::instrument(name = "DeleteBreakpoints", skip_all)]
    pub fn delete_breakpoints(&self, ids: &[BreakpointId], all: bool) -> Vec<Breakpoint> {
        let deleted = self.registry.delete_breakpoints(ids, all);
        self.breakpoints_changed(BreakpointAction::Remove, &deleted);

        deleted
    }

    /// Returns a copy of every breakpoint, by ID.
    pub fn get_breakpoints(&self) -> BTreeMap<BreakpointId, Breakpoint> {
        self.registry.get_breakpoints()
    }

    /// Requests every thread to break at its next statement.
    #[tracing::instrument(name = "RequestBreak", skip_all)]
    pub fn request_break(&self) {
        if self.coordinator.state().is_detached() {
            return;
        }

        tracing::info!("break requested");

        self.break_requested.store(true, Ordering::Release);
        self.set_all_tracers();
    }

    /// Resumes every parked thread.
    #[tracing::instrument(name = "Go", skip_all)]
    pub fn request_go(&self) -> crate::Result<()> {
        self.require_broken()?;
        self.resume(|_| ());

        Ok(())
    }

    /// Resumes every parked thread, and breaks the current thread at its
    /// next event.
    #[tracing::instrument(name = "Step", skip_all)]
    pub fn request_step(&self) -> crate::Result<()> {
        self.require_broken()?;
        let thread_id = self.current_context()?.thread_id();

        self.resume(|control| control.step_thread = Some(thread_id));

        Ok(())
    }

    /// Resumes every parked thread, and breaks the current thread at the
    /// next event of its innermost frame.
    #[tracing::instrument(name = "Next", skip_all)]
    pub fn request_next(&self) -> crate::Result<()> {
        self.require_broken()?;
        let frame_id = self.current_top_frame()?;

        self.resume(|control| control.next_frame = Some(frame_id));

        Ok(())
    }

    /// Resumes every parked thread, and breaks the current thread when its
    /// innermost frame leaves its scope.
    #[tracing::instrument(name = "Return", skip_all)]
    pub fn request_return(&self) -> crate::Result<()> {
        self.require_broken()?;
        let frame_id = self.current_top_frame()?;

        self.resume(|control| control.return_frame = Some(frame_id));

        Ok(())
    }

    fn current_top_frame(&self) -> crate::Result<FrameId> {
        self.current_context()?
            .top()
            .map(|frame| frame.id())
            .ok_or(crate::Error::InvalidFrame(0))
    }

    /// Resumes every parked thread until the current thread reaches the
    /// given location.
    #[tracing::instrument(name = "GoBreakpoint", skip_all, fields(file = filename, line = line))]
    pub fn request_go_breakpoint(
        &self,
        filename: &str,
        scope: &str,
        line: u32,
    ) -> crate::Result<Breakpoint> {
        let bp = self.set_temp_breakpoint(filename, scope, line, true)?;
        self.resume(|_| ());

        Ok(bp)
    }

    /// Moves the next line to execute of the current thread's innermost
    /// frame.
    ///
    /// The line must be a breakable line of the frame's scope.
    #[tracing::instrument(name = "Jump", skip_all, fields(line = line))]
    pub fn request_jump(&self, line: u32) -> crate::Result<()> {
        self.require_broken()?;

        let ctx = self.current_context()?;
        let frame = ctx.top().ok_or(crate::Error::InvalidFrame(0))?;

        let unit = self.registry.resolver().unit(frame.filename())?;

        let scope = match unit
            .scopes()
            .iter()
            .rev()
            .find(|s| s.leaf_name() == frame.scope_name() && s.contains(frame.line()))
        {
            Some(scope) => scope,
            None => unit.find_scope_by_lineno(frame.line())?.0,
        };

        if !scope.valid_lines().contains(&line) {
            return Err(crate::Error::BadArgument(format!(
                "line {line} is not a breakable line of {}",
                scope.fqn()
            )));
        }

        frame
            .set_line(line)
            .map_err(|e| crate::Error::Runtime(Box::new(e)))?;

        tracing::info!(tid = ctx.thread_id(), line, "jumped");

        self.dispatcher.fire(&Event::StackSynced {
            thread_id: ctx.thread_id(),
            stack: ctx.stack(),
        });

        Ok(())
    }

    /// Moves the operator focus to a parked thread.
    #[tracing::instrument(name = "SetThread", skip_all, fields(tid = thread_id))]
    pub fn set_thread(&self, thread_id: ThreadId) -> crate::Result<()> {
        self.require_broken()?;

        if self.threads.read().is_empty() {
            return Err(crate::Error::NoThreads);
        }

        let ctx = self.thread(thread_id)?;
        if !ctx.is_broken() {
            return Err(crate::Error::ThreadNotFound(thread_id));
        }

        self.control.lock().current = Some(thread_id);

        tracing::debug!("focus changed");

        self.dispatcher.fire(&Event::FocusChanged { thread_id });
        self.dispatcher.fire(&Event::StackSynced {
            thread_id,
            stack: ctx.stack(),
        });

        Ok(())
    }

    /// Returns the thread the operator is focused on.
    pub fn current_thread(&self) -> Option<ThreadId> {
        self.control.lock().current
    }

    /// Returns the IDs of the parked threads.
    pub fn broken_threads(&self) -> Vec<ThreadId> {
        self.threads
            .read()
            .values()
            .filter(|ctx| ctx.is_broken())
            .map(|ctx| ctx.thread_id())
            .collect()
    }

    /// Returns the IDs of the traced threads.
    pub fn thread_ids(&self) -> Vec<ThreadId> {
        self.threads.read().keys().copied().collect()
    }

    /// Returns the stack (innermost frame first) of the given thread, or of
    /// the current thread.
    pub fn get_stack(&self, thread_id: Option<ThreadId>) -> crate::Result<Vec<StackEntry>> {
        Ok(self.context_or_current(thread_id)?.stack())
    }

    /// Returns the last event reported for the given thread, or for the
    /// current thread.
    pub fn current_event(&self, thread_id: Option<ThreadId>) -> crate::Result<Option<TraceEvent>> {
        Ok(self.context_or_current(thread_id)?.current_event())
    }

    /// Acquires a handle to the frame at `index` (innermost first) of the
    /// given thread, or of the current thread.
    pub fn frame_handle(
        &self,
        thread_id: Option<ThreadId>,
        index: usize,
    ) -> crate::Result<FrameHandle<R::Frame>> {
        FrameHandle::acquire(self.context_or_current(thread_id)?, index)
    }

    /// Returns the last exception seen by the given thread, or by the
    /// current thread.
    pub fn get_exception(&self, thread_id: Option<ThreadId>) -> crate::Result<ExceptionInfo> {
        self.context_or_current(thread_id)?
            .last_exception()
            .ok_or(crate::Error::NoExceptionFound)
    }

    /// Switches between the [Broken](DebuggerState::Broken) and
    /// [Analyze](DebuggerState::Analyze) states.
    ///
    /// Parked threads stay parked.
    #[tracing::instrument(name = "SetAnalyze", skip_all, fields(enabled = enabled))]
    pub fn set_analyze(&self, enabled: bool) -> crate::Result<()> {
        self.require_broken()?;

        let state = if enabled {
            DebuggerState::Analyze
        } else {
            DebuggerState::Broken
        };

        if self.coordinator.state() != state {
            self.coordinator.set_state(state);
        }

        Ok(())
    }

    /// Enables or disables breaking on unhandled exceptions.
    #[tracing::instrument(name = "SetTrapExceptions", skip_all, fields(enabled = enabled))]
    pub fn set_trap_exceptions(&self, enabled: bool) {
        self.control.lock().trap_exceptions = enabled;

        self.set_all_tracers();
        self.dispatcher
            .fire(&Event::TrapExceptionsChanged { enabled });
    }

    /// Returns whether unhandled exceptions break.
    pub fn trap_exceptions(&self) -> bool {
        self.control.lock().trap_exceptions
    }

    /// Detaches from the debuggee.
    ///
    /// Every breakpoint is deleted and every parked thread is resumed. A
    /// detached engine never breaks.
    #[tracing::instrument(name = "Detach", skip_all)]
    pub fn detach(&self) {
        self.coordinator.set_state(DebuggerState::Detaching);

        let deleted = self.registry.delete_breakpoints(&[], true);
        if !deleted.is_empty() {
            self.dispatcher.fire(&Event::BreakpointChanged {
                action: BreakpointAction::Remove,
                breakpoints: deleted,
            });
        }

        self.resume(BreakControl::clear_targets);
        self.coordinator.set_state(DebuggerState::Detached);
        self.set_all_tracers();

        tracing::info!("detached");
    }

    /// Attaches back to the debuggee after a [detach](Self::detach).
    #[tracing::instrument(name = "Attach", skip_all)]
    pub fn attach(&self) {
        if !self.coordinator.state().is_detached() {
            return;
        }

        self.coordinator.set_state(DebuggerState::Attaching);
        self.coordinator.set_state(DebuggerState::Running);
        self.set_all_tracers();

        tracing::info!("attached");
    }

    /// Returns the events fired after `last_index`, waiting up to `timeout`
    /// for one.
    ///
    /// The returned index is the one to pass on the next call.
    pub fn wait_for_event(&self, timeout: Duration, last_index: u64) -> (u64, Vec<Event>) {
        self.queue.wait_for_event(timeout, last_index)
    }
}
