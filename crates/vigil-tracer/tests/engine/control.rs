use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};

use test_log::test;
use vigil_tracer::EngineConfig;
use vigil_tracer::breakpoint::BreakpointId;
use vigil_tracer::handler::EventHandler;
use vigil_tracer::runtime::{Instrumentation, TraceEvent};
use vigil_tracer::state::{BreakpointAction, DebuggerState, Event, EventKind, Subscription};
use vigil_tracer::tracer::{Builder, StackEntry};

use crate::common::{Debuggee, EventFeed, MockFrame, MockRuntime};
use crate::common::{compiler, config, engine, engine_with, spawn};

#[test]
fn breakpoint_changes_reinstall_instrumentation() {
    let engine = engine_with(EngineConfig {
        trap_exceptions: false,
        ..config()
    });
    let mut feed = EventFeed::new(&engine);

    let t = Debuggee::new(&engine, 1);
    let module = MockFrame::new("<module>", 1);
    let foo = MockFrame::new("foo", 3);

    assert_eq!(t.enter(&module), Instrumentation::Idle);
    assert_eq!(t.enter(&foo), Instrumentation::Idle);
    assert_eq!(foo.installed(), Some(Instrumentation::Idle));

    let bp = engine.set_breakpoint("main.vg", "foo", 2, false, "").unwrap();
    assert_eq!(bp.line, 5);
    assert_eq!(foo.installed(), Some(Instrumentation::Watch));
    assert_eq!(module.installed(), Some(Instrumentation::Idle));

    // a disabled breakpoint never breaks
    assert_eq!(t.statement(&foo, 5), Instrumentation::Watch);

    let enabled = engine.enable_breakpoints(&[bp.id, BreakpointId(9)], false);
    assert_eq!(enabled.len(), 1);

    let deleted = engine.delete_breakpoints(&[], true);
    assert_eq!(deleted.len(), 1);
    assert_eq!(foo.installed(), Some(Instrumentation::Idle));
    assert!(engine.get_breakpoints().is_empty());

    t.leave(&foo);
    t.leave(&module);

    let actions = feed
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            Event::BreakpointChanged {
                action,
                breakpoints,
            } => Some((action, breakpoints.len())),
            _ => None,
        })
        .collect::<Vec<_>>();

    assert_eq!(
        actions,
        [
            (BreakpointAction::Set, 1),
            (BreakpointAction::Enable, 1),
            (BreakpointAction::Remove, 1),
        ]
    );
}

#[test]
fn detach_releases_threads() {
    let engine = engine();
    engine.set_breakpoint("main.vg", "", 4, true, "").unwrap();

    let mut feed = EventFeed::new(&engine);
    let (gate, wait) = mpsc::channel::<()>();

    let handle = spawn(&engine, 1, move |t| {
        let foo = MockFrame::new("foo", 3);

        t.enter(&foo);
        t.statement(&foo, 4);
        wait.recv().unwrap();
        t.statement(&foo, 4);
        t.leave(&foo)
    });

    feed.next_break();
    let mut states = Vec::new();

    engine.detach();
    assert_eq!(engine.state(), DebuggerState::Detached);
    assert!(engine.get_breakpoints().is_empty());

    // a detached engine ignores break requests
    engine.request_break();
    gate.send(()).unwrap();
    assert_eq!(handle.join().unwrap(), Instrumentation::Idle);

    for event in feed.drain() {
        if let Event::StateChanged { state } = event {
            states.push(state);
        }
    }

    assert_eq!(
        states,
        [
            DebuggerState::Detaching,
            DebuggerState::Running,
            DebuggerState::Detached,
        ]
    );

    engine.attach();
    assert_eq!(engine.state(), DebuggerState::Running);
}

#[derive(Default)]
struct Counters {
    states: AtomicUsize,
    exits: AtomicUsize,
    focus: AtomicUsize,
}

struct CountingHandler(Arc<Counters>);

#[derive(Debug, thiserror::Error)]
#[error("handler failure")]
struct HandlerError;

impl EventHandler for CountingHandler {
    type Error = HandlerError;

    fn state_changed(&self, _state: DebuggerState) -> Result<(), Self::Error> {
        self.0.states.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stack_synced(&self, _thread_id: u64, _stack: &[StackEntry]) -> Result<(), Self::Error> {
        Err(HandlerError)
    }

    fn thread_exited(&self, _thread_id: u64) -> Result<(), Self::Error> {
        self.0.exits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn event_handlers_and_listeners() {
    let counters = Arc::new(Counters::default());

    let focus = counters.clone();
    let engine = Arc::new(
        Builder::new()
            .with_runtime(MockRuntime::default())
            .with_compiler(compiler())
            .with_config(config())
            .with_event_handler(CountingHandler(counters.clone()))
            .with_listener(
                Arc::new(move |_| {
                    focus.focus.fetch_add(1, Ordering::SeqCst);
                }),
                Subscription::to([EventKind::FocusChanged]),
            )
            .build(),
    );
    engine.set_breakpoint("main.vg", "", 8, true, "").unwrap();

    let mut feed = EventFeed::new(&engine);

    let handle = spawn(&engine, 3, |t| {
        let bar = MockFrame::new("bar", 7);

        t.enter(&bar);
        t.statement(&bar, 8);
        t.leave(&bar);
    });

    let (tid, _) = feed.next_break();
    engine.set_thread(tid).unwrap();
    engine.request_go().unwrap();
    handle.join().unwrap();

    // broken, then running
    assert_eq!(counters.states.load(Ordering::SeqCst), 2);
    assert_eq!(counters.exits.load(Ordering::SeqCst), 1);
    assert_eq!(counters.focus.load(Ordering::SeqCst), 1);
}

#[test]
fn callback_panics_do_not_unwind() {
    let engine = engine();
    let frame = MockFrame::panicking("foo");

    let instrumentation = engine.dispatch(1, &frame, TraceEvent::Statement);
    assert_eq!(instrumentation, Instrumentation::Watch);
    assert_eq!(engine.state(), DebuggerState::Running);
}
