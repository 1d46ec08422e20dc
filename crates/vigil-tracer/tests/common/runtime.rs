use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use vigil_tracer::runtime::{EvalError, Evaluator, Frame, FrameId, Instrumentation, Locals};
use vigil_tracer::runtime::{Namespace, Runtime};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, thiserror::Error)]
#[error("frame {0} refused the operation")]
pub struct MockError(pub FrameId);

/// Activation record of the mock runtime.
#[derive(Clone, Debug)]
pub struct MockFrame(Arc<FrameState>);

#[derive(Debug)]
struct FrameState {
    id: FrameId,
    filename: String,
    scope: String,
    line: AtomicU32,
    locals: Mutex<Locals<i64>>,
    installed: Mutex<Option<Instrumentation>>,
    panics: bool,
}

impl MockFrame {
    pub fn new(scope: &str, line: u32) -> Self {
        Self::build(scope, line, false)
    }

    /// Frame whose line lookups panic.
    pub fn panicking(scope: &str) -> Self {
        Self::build(scope, 0, true)
    }

    fn build(scope: &str, line: u32, panics: bool) -> Self {
        Self(Arc::new(FrameState {
            id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
            filename: "main.vg".to_owned(),
            scope: scope.to_owned(),
            line: AtomicU32::new(line),
            locals: Mutex::default(),
            installed: Mutex::default(),
            panics,
        }))
    }

    pub fn with_local(self, name: &str, value: i64) -> Self {
        self.set(name, value);
        self
    }

    /// Writes a local directly, like the debuggee's own code would.
    pub fn set(&self, name: &str, value: i64) {
        self.0.locals.lock().insert(name.to_owned(), value);
    }

    pub fn goto(&self, line: u32) {
        self.0.line.store(line, Ordering::SeqCst);
    }

    pub fn installed(&self) -> Option<Instrumentation> {
        *self.0.installed.lock()
    }
}

impl Namespace for MockFrame {
    type Value = i64;

    fn get(&self, name: &str) -> Option<i64> {
        self.0.locals.lock().get(name).copied()
    }

    fn names(&self) -> Vec<String> {
        self.0.locals.lock().keys().cloned().collect()
    }
}

impl Frame for MockFrame {
    type Error = MockError;

    fn id(&self) -> FrameId {
        self.0.id
    }

    fn filename(&self) -> &str {
        &self.0.filename
    }

    fn scope_name(&self) -> &str {
        &self.0.scope
    }

    fn line(&self) -> u32 {
        if self.0.panics {
            panic!("line of frame {} is unavailable", self.0.id);
        }

        self.0.line.load(Ordering::SeqCst)
    }

    fn locals(&self) -> Locals<i64> {
        self.0.locals.lock().clone()
    }

    fn commit_locals(&self, locals: &Locals<i64>) -> Result<(), MockError> {
        *self.0.locals.lock() = locals.clone();
        Ok(())
    }

    fn set_line(&self, line: u32) -> Result<(), MockError> {
        if line == 0 {
            return Err(MockError(self.0.id));
        }

        self.goto(line);
        Ok(())
    }
}

/// Compiled predicate of the mock evaluator.
pub enum MockExpr {
    /// `<name> == <integer>`
    Equals(String, i64),

    /// `boom`, which fails at evaluation.
    Boom,
}

/// Evaluator of `<name> == <integer>` predicates.
#[derive(Default)]
pub struct MockEvaluator;

impl Evaluator for MockEvaluator {
    type Expr = MockExpr;
    type Value = i64;

    fn compile(&self, source: &str) -> Result<MockExpr, EvalError> {
        if source == "boom" {
            return Ok(MockExpr::Boom);
        }

        let (name, value) = source
            .split_once("==")
            .ok_or_else(|| EvalError(format!("invalid syntax: {source}")))?;

        let value = value
            .trim()
            .parse()
            .map_err(|_| EvalError(format!("invalid literal: {value}")))?;

        Ok(MockExpr::Equals(name.trim().to_owned(), value))
    }

    fn eval(
        &self,
        expr: &MockExpr,
        namespace: &dyn Namespace<Value = i64>,
    ) -> Result<bool, EvalError> {
        match expr {
            MockExpr::Equals(name, value) => namespace
                .get(name)
                .map(|v| v == *value)
                .ok_or_else(|| EvalError(format!("name {name} is not defined"))),
            MockExpr::Boom => Err(EvalError("boom".to_owned())),
        }
    }
}

/// Host runtime recording the instrumentation installed on its frames.
#[derive(Default)]
pub struct MockRuntime {
    evaluator: MockEvaluator,
}

impl Runtime for MockRuntime {
    type Frame = MockFrame;
    type Evaluator = MockEvaluator;

    fn install(&self, frame: &MockFrame, instrumentation: Instrumentation) {
        *frame.0.installed.lock() = Some(instrumentation);
    }

    fn evaluator(&self) -> &MockEvaluator {
        &self.evaluator
    }
}
