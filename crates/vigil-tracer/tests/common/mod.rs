mod runtime;

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use vigil_symbol::compiler::{DebugMetadata, LineTable, ScopeMetadata, StaticCompiler};
use vigil_tracer::EngineConfig;
use vigil_tracer::runtime::{ExceptionInfo, Instrumentation, TraceEvent};
use vigil_tracer::state::Event;
use vigil_tracer::tracer::{Builder, StackEntry, TraceEngine};

pub use self::runtime::{MockFrame, MockRuntime};

pub type Engine = Arc<TraceEngine<MockRuntime>>;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Debug metadata of `main.vg`:
///
/// ```text
/// <module>: [1, 2, 3, 10, 11]
/// foo:      [3, 4, 5, 6]
/// bar:      [7, 8]
/// ```
pub fn compiler() -> StaticCompiler {
    StaticCompiler::new().with_unit(
        "main.vg",
        DebugMetadata {
            scopes: vec![
                ScopeMetadata::new(
                    "<module>",
                    1,
                    LineTable::new([(2, 1), (2, 1), (2, 7), (2, 1)]),
                ),
                ScopeMetadata::new("foo", 3, LineTable::new([(2, 1), (2, 1), (2, 1)])),
                ScopeMetadata::new("bar", 7, LineTable::new([(2, 1)])),
            ],
        },
    )
}

pub fn config() -> EngineConfig {
    EngineConfig {
        poll_interval_ms: 5,
        ..EngineConfig::default()
    }
}

pub fn engine() -> Engine {
    engine_with(config())
}

pub fn engine_with(config: EngineConfig) -> Engine {
    Arc::new(
        Builder::new()
            .with_runtime(MockRuntime::default())
            .with_compiler(compiler())
            .with_config(config)
            .build(),
    )
}

/// Debuggee thread, reporting its events to the engine.
pub struct Debuggee {
    engine: Engine,
    thread_id: u64,
}

impl Debuggee {
    pub fn new(engine: &Engine, thread_id: u64) -> Self {
        Self {
            engine: engine.clone(),
            thread_id,
        }
    }

    pub fn enter(&self, frame: &MockFrame) -> Instrumentation {
        self.engine
            .dispatch(self.thread_id, frame, TraceEvent::EnterScope)
    }

    pub fn statement(&self, frame: &MockFrame, line: u32) -> Instrumentation {
        frame.goto(line);
        self.engine
            .dispatch(self.thread_id, frame, TraceEvent::Statement)
    }

    pub fn leave(&self, frame: &MockFrame) -> Instrumentation {
        self.engine
            .dispatch(self.thread_id, frame, TraceEvent::LeaveScope)
    }

    pub fn raise(&self, frame: &MockFrame, description: &str, unhandled: bool) -> Instrumentation {
        self.engine.dispatch(
            self.thread_id,
            frame,
            TraceEvent::Exception(ExceptionInfo {
                description: description.to_owned(),
                unhandled,
            }),
        )
    }
}

/// Runs a debuggee thread.
pub fn spawn<T, F>(engine: &Engine, thread_id: u64, script: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: FnOnce(Debuggee) -> T + Send + 'static,
{
    let debuggee = Debuggee::new(engine, thread_id);
    std::thread::spawn(move || script(debuggee))
}

/// Polls `cond` until it holds.
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;

    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Operator-side reader of the engine event feed.
pub struct EventFeed {
    engine: Engine,
    last_index: u64,
    pending: VecDeque<Event>,
}

impl EventFeed {
    /// Reads the events fired from now on.
    pub fn new(engine: &Engine) -> Self {
        let (last_index, _) = engine.wait_for_event(Duration::ZERO, u64::MAX);

        Self {
            engine: engine.clone(),
            last_index,
            pending: VecDeque::new(),
        }
    }

    pub fn next(&mut self) -> Event {
        let deadline = Instant::now() + TIMEOUT;

        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }

            assert!(Instant::now() < deadline, "timed out waiting for an event");

            let (last_index, events) = self
                .engine
                .wait_for_event(Duration::from_millis(100), self.last_index);

            self.last_index = last_index;
            self.pending.extend(events);
        }
    }

    /// Skips events until one matches.
    pub fn next_matching(&mut self, mut pred: impl FnMut(&Event) -> bool) -> Event {
        loop {
            let event = self.next();
            if pred(&event) {
                return event;
            }
        }
    }

    /// Waits for the next thread to become current.
    pub fn next_break(&mut self) -> (u64, Vec<StackEntry>) {
        match self.next_matching(|e| matches!(e, Event::StackSynced { .. })) {
            Event::StackSynced { thread_id, stack } => (thread_id, stack),
            _ => unreachable!(),
        }
    }

    /// Returns the events already fired, without waiting.
    pub fn drain(&mut self) -> Vec<Event> {
        let (last_index, events) = self.engine.wait_for_event(Duration::ZERO, self.last_index);

        self.last_index = last_index;
        self.pending.extend(events);
        self.pending.drain(..).collect()
    }
}
