//! This crate coordinates breakpoints and break rounds across the threads
//! of a debuggee running inside a host runtime.
//!
//! The host runtime reports every statement boundary of its instrumented
//! frames to the [TraceEngine](self::tracer::TraceEngine), synchronously on
//! the debuggee thread. The engine decides, per frame, which instrumentation
//! variant the runtime should install, and parks threads that should break
//! until the operator resumes them.
//!
//! Three collaborator traits connect the engine to the host:
//! - [Runtime](self::runtime::Runtime), installing instrumentation on frames.
//! - [Frame](self::runtime::Frame), exposing an activation record.
//! - [Evaluator](self::runtime::Evaluator), evaluating breakpoint predicates.
//!
//! Debug metadata is provided by a [Compiler](vigil_symbol::compiler::Compiler),
//! used to resolve breakpoint requests to breakable lines.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vigil_symbol::compiler::StaticCompiler;
//! use vigil_tracer::handler::EventHandler;
//! use vigil_tracer::runtime::Runtime;
//! use vigil_tracer::state::DebuggerState;
//! use vigil_tracer::tracer::{Builder, TraceEngine};
//!
//! fn start<R: Runtime>(runtime: R) -> Arc<TraceEngine<R>> {
//!     let engine = Builder::new()
//!         .with_runtime(runtime)
//!         .with_compiler(StaticCompiler::new())
//!         .with_event_handler(Announcer)
//!         .build();
//!
//!     // break two lines below the first line of `main`
//!     engine.set_breakpoint("main.vg", "main", 2, true, "").unwrap();
//!
//!     Arc::new(engine)
//! }
//!
//! struct Announcer;
//!
//! impl EventHandler for Announcer {
//!     type Error = std::convert::Infallible;
//!
//!     fn state_changed(&self, state: DebuggerState) -> Result<(), Self::Error> {
//!         tracing::info!(%state, "debugger state changed");
//!         Ok(())
//!     }
//! }
//! ```

/// Module containing the breakpoint registry.
pub mod breakpoint;

mod config;
mod error;

/// Module containing traits for handling engine events.
pub mod handler;

/// Module containing traits implemented by the host runtime.
pub mod runtime;

/// Module containing the debugger state machine and event bus.
pub mod state;

/// Module implementing the trace engine.
pub mod tracer;

pub use self::config::{EngineConfig, TrapScope};
pub use self::error::{Error, Result};
