use std::sync::Arc;

use vigil_symbol::ScopeResolver;
use vigil_symbol::compiler::Compiler;

use super::TraceEngine;
use crate::config::EngineConfig;
use crate::handler::{self, EventHandler};
use crate::runtime::Runtime;
use crate::state::{Callback, Subscription};

/// Builder for [TraceEngine].
///
/// It is created by calling [Builder::new], and allows to specify the host
/// runtime being debugged, the compiler providing its debug metadata and
/// the handlers of engine events.
pub struct Builder<S> {
    state: S,
}

impl Builder<NeedsRuntime> {
    /// Creates a trace engine builder.
    pub const fn new() -> Self {
        Self {
            state: NeedsRuntime,
        }
    }
}

impl Default for Builder<NeedsRuntime> {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder<NeedsRuntime> {
    /// Specifies the host runtime to instrument.
    pub fn with_runtime<R: Runtime>(self, runtime: R) -> Builder<NeedsCompiler<R>> {
        Builder {
            state: NeedsCompiler { runtime },
        }
    }
}

impl<R: Runtime> Builder<NeedsCompiler<R>> {
    /// Specifies the compiler providing the debug metadata of the
    /// debuggee's files.
    pub fn with_compiler<C: Compiler + 'static>(self, compiler: C) -> Builder<Ready<R>> {
        Builder {
            state: Ready {
                runtime: self.state.runtime,
                resolver: ScopeResolver::new(compiler),
                config: EngineConfig::default(),
                listeners: Vec::new(),
            },
        }
    }
}

impl<R: Runtime> Builder<Ready<R>> {
    /// Specifies the engine configuration.
    ///
    /// [EngineConfig::default] is used otherwise.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.state.config = config;
        self
    }

    /// Adds a handler of engine events.
    pub fn with_event_handler<H: EventHandler>(mut self, handler: H) -> Self {
        let callback: Callback = Arc::new(move |event| handler::forward(&handler, event));

        self.state.listeners.push((callback, Subscription::all()));
        self
    }

    /// Adds a raw listener of engine events.
    pub fn with_listener(mut self, callback: Callback, subscription: Subscription) -> Self {
        self.state.listeners.push((callback, subscription));
        self
    }

    /// Builds the trace engine.
    pub fn build(self) -> TraceEngine<R> {
        let Ready {
            runtime,
            resolver,
            config,
            listeners,
        } = self.state;

        TraceEngine::new(runtime, resolver, config, listeners)
    }
}

pub struct NeedsRuntime;

pub struct NeedsCompiler<R> {
    runtime: R,
}

pub struct Ready<R> {
    runtime: R,
    resolver: ScopeResolver,
    config: EngineConfig,
    listeners: Vec<(Callback, Subscription)>,
}
