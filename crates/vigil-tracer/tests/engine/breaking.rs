use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, mpsc};

use test_log::test;
use vigil_symbol::compiler::{DebugMetadata, LineTable, ScopeMetadata, StaticCompiler};
use vigil_tracer::EngineConfig;
use vigil_tracer::runtime::Instrumentation;
use vigil_tracer::state::{DebuggerState, Event};
use vigil_tracer::tracer::Builder;

use crate::common::{EventFeed, MockFrame, MockRuntime, config, engine, engine_with, spawn};
use crate::common::wait_until;

#[test]
fn concurrent_breakers_elect_one_current() {
    const THREADS: u64 = 4;

    let engine = engine();
    engine.set_breakpoint("main.vg", "foo", 2, true, "").unwrap();

    let mut feed = EventFeed::new(&engine);
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles = (1..=THREADS)
        .map(|tid| {
            let barrier = barrier.clone();
            spawn(&engine, tid, move |t| {
                let foo = MockFrame::new("foo", 3);
                t.enter(&foo);
                barrier.wait();
                t.statement(&foo, 5);
                t.leave(&foo);
            })
        })
        .collect::<Vec<_>>();

    let mut parked = Vec::new();
    let mut synced = Vec::new();

    while parked.len() < THREADS as usize - 1 || synced.is_empty() {
        match feed.next() {
            Event::ThreadBroke { thread_id } => parked.push(thread_id),
            Event::StackSynced { thread_id, .. } => synced.push(thread_id),
            _ => (),
        }
    }

    let current = engine.current_thread().expect("current thread");
    assert_eq!(synced, [current]);
    assert!(!parked.contains(&current));
    assert_eq!(engine.state(), DebuggerState::Broken);

    wait_until("every thread to park", || {
        engine.coordinator().waiters() == THREADS as usize
    });

    for tid in parked {
        engine.set_thread(tid).unwrap();

        assert_eq!(engine.current_thread(), Some(tid));
        assert_eq!(engine.get_stack(None).unwrap()[0].line, 5);
    }

    assert!(matches!(
        engine.set_thread(42),
        Err(vigil_tracer::Error::ThreadNotFound(42))
    ));
    assert_eq!(engine.broken_threads().len(), THREADS as usize);

    engine.request_go().unwrap();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.state(), DebuggerState::Running);
    assert!(engine.thread_ids().is_empty());
    assert_eq!(engine.coordinator().waiters(), 0);
}

#[test]
fn soft_temp_breakpoint_is_cleared_by_any_break() {
    let engine = engine();
    engine.set_breakpoint("main.vg", "", 8, true, "").unwrap();
    engine.set_temp_breakpoint("main.vg", "", 6, false).unwrap();

    assert!(engine.registry().temp_breakpoint().is_some());

    let mut feed = EventFeed::new(&engine);

    let handle = spawn(&engine, 2, |t| {
        let bar = MockFrame::new("bar", 7);
        t.enter(&bar);
        t.statement(&bar, 8);
        t.leave(&bar);
    });

    let (tid, stack) = feed.next_break();
    assert_eq!(tid, 2);
    assert_eq!(stack[0].line, 8);
    assert!(engine.registry().temp_breakpoint().is_none());

    engine.request_go().unwrap();
    handle.join().unwrap();
}

#[test]
fn hard_temp_breakpoint_survives_other_threads() {
    let engine = engine();
    engine.set_breakpoint("main.vg", "", 4, true, "").unwrap();
    engine.set_breakpoint("main.vg", "", 8, true, "").unwrap();

    let mut feed = EventFeed::new(&engine);
    let (gate_a, wait_a) = mpsc::channel::<()>();
    let (gate_b, wait_b) = mpsc::channel::<()>();

    let thread_a = spawn(&engine, 1, move |t| {
        let foo = MockFrame::new("foo", 3);
        t.enter(&foo);
        t.statement(&foo, 4);
        wait_a.recv().unwrap();
        t.statement(&foo, 5);
        t.statement(&foo, 6);
        t.leave(&foo);
    });

    let (tid, _) = feed.next_break();
    assert_eq!(tid, 1);

    engine.request_go_breakpoint("main.vg", "", 6).unwrap();

    let temp = engine.registry().temp_breakpoint().expect("temporary breakpoint");
    assert_eq!(temp.owner, Some(1));
    assert_eq!(temp.breakpoint.line, 6);

    let thread_b = spawn(&engine, 2, move |t| {
        wait_b.recv().unwrap();
        let bar = MockFrame::new("bar", 7);
        t.enter(&bar);
        t.statement(&bar, 8);
        t.leave(&bar);
    });

    gate_b.send(()).unwrap();

    let (tid, stack) = feed.next_break();
    assert_eq!(tid, 2);
    assert_eq!(stack[0].line, 8);
    assert!(engine.registry().temp_breakpoint().is_some());

    engine.request_go().unwrap();
    thread_b.join().unwrap();

    gate_a.send(()).unwrap();

    let (tid, stack) = feed.next_break();
    assert_eq!(tid, 1);
    assert_eq!(stack[0].line, 6);
    assert!(engine.registry().temp_breakpoint().is_none());

    engine.request_go().unwrap();
    thread_a.join().unwrap();
}

#[test]
fn predicates_gate_breakpoints() {
    let engine = engine();
    engine.set_breakpoint("main.vg", "", 4, true, "x == 2").unwrap();
    engine.set_breakpoint("main.vg", "", 5, true, "boom").unwrap();
    engine.set_breakpoint("main.vg", "", 6, true, "not a predicate").unwrap();

    let mut feed = EventFeed::new(&engine);

    let handle = spawn(&engine, 1, |t| {
        let foo = MockFrame::new("foo", 3).with_local("x", 1);
        t.enter(&foo);
        t.statement(&foo, 4);
        t.statement(&foo, 5);
        t.statement(&foo, 6);
        foo.set("x", 2);
        t.statement(&foo, 4);
        t.leave(&foo);
    });

    let (tid, stack) = feed.next_break();
    assert_eq!(tid, 1);
    assert_eq!(stack[0].line, 4);

    let frame = engine.frame_handle(None, 0).unwrap();
    assert_eq!(frame.get_local("x"), Some(2));
    drop(frame);

    engine.request_go().unwrap();
    handle.join().unwrap();

    // only a single break round happened
    let rounds = feed
        .drain()
        .into_iter()
        .filter(|e| matches!(e, Event::StackSynced { .. }))
        .count();
    assert_eq!(rounds, 0);
}

#[test]
fn requested_break_overrides_idle_frames() {
    let engine = engine_with(EngineConfig {
        trap_exceptions: false,
        ..config()
    });

    let mut feed = EventFeed::new(&engine);
    let stop = Arc::new(AtomicBool::new(false));

    let stopped = stop.clone();
    let handle = spawn(&engine, 1, move |t| {
        let module = MockFrame::new("<module>", 1);
        let entered = t.enter(&module);

        while !stopped.load(Ordering::SeqCst) {
            t.statement(&module, 2);
        }

        t.leave(&module);
        entered
    });

    wait_until("thread to attach", || engine.thread_ids() == [1]);
    engine.request_break();

    let (tid, stack) = feed.next_break();
    assert_eq!(tid, 1);
    assert_eq!(stack[0].line, 2);
    assert_eq!(stack[0].instrumentation, Instrumentation::Watch);

    stop.store(true, Ordering::SeqCst);
    engine.request_go().unwrap();

    assert_eq!(handle.join().unwrap(), Instrumentation::Idle);
}

#[test]
fn unhandled_exception_breaks() {
    let engine = engine();
    let mut feed = EventFeed::new(&engine);

    let handle = spawn(&engine, 1, |t| {
        let module = MockFrame::new("<module>", 1);
        let foo = MockFrame::new("foo", 3);

        t.enter(&module);
        t.enter(&foo);
        t.statement(&foo, 4);
        t.raise(&foo, "ValueError: caught", false);
        t.raise(&foo, "KeyError: missing", true);
        t.leave(&foo);
        t.leave(&module);
    });

    let trapped = feed.next_matching(|e| matches!(e, Event::ExceptionTrapped { .. }));
    let Event::ExceptionTrapped {
        thread_id,
        exception,
    } = trapped
    else {
        unreachable!()
    };
    assert_eq!(thread_id, 1);
    assert_eq!(exception.description, "KeyError: missing");

    let (tid, _) = feed.next_break();
    assert_eq!(tid, 1);
    assert_eq!(engine.get_exception(None).unwrap(), exception);

    engine.set_analyze(true).unwrap();
    assert_eq!(engine.state(), DebuggerState::Analyze);
    assert_eq!(engine.broken_threads(), [1]);

    engine.set_analyze(false).unwrap();
    assert_eq!(engine.state(), DebuggerState::Broken);

    engine.request_go().unwrap();
    handle.join().unwrap();
}

#[test]
fn untrapped_exception_does_not_break() {
    let engine = engine();
    let mut feed = EventFeed::new(&engine);

    engine.set_trap_exceptions(false);
    assert!(!engine.trap_exceptions());

    let handle = spawn(&engine, 1, |t| {
        let foo = MockFrame::new("foo", 3);

        let entered = t.enter(&foo);
        t.raise(&foo, "KeyError: missing", true);
        t.leave(&foo);
        entered
    });

    assert_eq!(handle.join().unwrap(), Instrumentation::Idle);

    let events = feed.drain();
    assert_eq!(
        events.first(),
        Some(&Event::TrapExceptionsChanged { enabled: false })
    );
    assert!(!events.iter().any(|e| matches!(e, Event::StackSynced { .. })));
    assert!(events.contains(&Event::ThreadExited { thread_id: 1 }));

    assert!(matches!(
        engine.get_exception(Some(1)),
        Err(vigil_tracer::Error::ThreadDone(1))
    ));
}

#[test]
fn module_breakpoint_with_short_scope_name() {
    // the module scope is spelled `?` in the metadata, `<module>` by frames
    let compiler = StaticCompiler::new().with_unit(
        "main.vg",
        DebugMetadata {
            scopes: vec![
                ScopeMetadata::new("?", 1, LineTable::new([(2, 9)])),
                ScopeMetadata::new("foo", 3, LineTable::new([(2, 1)])),
            ],
        },
    );

    let engine = Arc::new(
        Builder::new()
            .with_runtime(MockRuntime::default())
            .with_compiler(compiler)
            .with_config(EngineConfig {
                trap_exceptions: false,
                ..config()
            })
            .build(),
    );
    engine.set_breakpoint("main.vg", "", 10, true, "").unwrap();

    let mut feed = EventFeed::new(&engine);

    let handle = spawn(&engine, 1, |t| {
        let module = MockFrame::new("<module>", 1);

        let entered = t.enter(&module);
        t.statement(&module, 10);
        t.leave(&module);
        entered
    });

    let (tid, stack) = feed.next_break();
    assert_eq!(tid, 1);
    assert_eq!((stack[0].scope_name.as_str(), stack[0].line), ("<module>", 10));
    assert_eq!(engine.state(), DebuggerState::Broken);

    engine.request_go().unwrap();
    assert_eq!(handle.join().unwrap(), Instrumentation::Watch);
}
