use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::compiler::{Compiler, DebugMetadata};
use crate::scope::{CompiledUnit, Scope};

/// Resolves source locations to breakable locations, caching the compiled
/// unit of every file ever queried.
pub struct ScopeResolver {
    compiler: Box<dyn DynCompiler>,
    units: RwLock<HashMap<String, Arc<CompiledUnit>>>,
}

impl ScopeResolver {
    /// Creates a resolver fetching debug metadata from the given compiler.
    pub fn new<C: Compiler + 'static>(compiler: C) -> Self {
        Self {
            compiler: Box::new(compiler),
            units: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the compiled unit of the given file, building it on first use.
    pub fn unit(&self, filename: &str) -> crate::Result<Arc<CompiledUnit>> {
        if let Some(unit) = self.units.read().get(filename) {
            return Ok(unit.clone());
        }

        let span = tracing::debug_span!("BuildUnit", file = filename);
        let _guard = span.enter();

        let metadata = self.compiler.compile_dyn(filename)?;
        let unit = Arc::new(CompiledUnit::build(filename, &metadata)?);

        tracing::debug!(scopes = unit.scopes().len(), "built");

        // another thread may have raced us, keep the first unit
        let unit = self
            .units
            .write()
            .entry(filename.to_owned())
            .or_insert(unit)
            .clone();

        Ok(unit)
    }

    /// Drops the cached unit of the given file, so that it gets rebuilt on
    /// next use (e.g., when its source changed).
    pub fn invalidate(&self, filename: &str) {
        if self.units.write().remove(filename).is_some() {
            tracing::debug!(file = filename, "unit invalidated");
        }
    }

    /// Resolves a line of the given file to a breakable location.
    pub fn find_scope_by_lineno(&self, filename: &str, lineno: u32) -> crate::Result<Resolved> {
        let unit = self.unit(filename)?;

        let (scope, line) = unit.find_scope_by_lineno(lineno)?;
        let scope_index = index_of(&unit, scope);

        Ok(Resolved {
            unit,
            scope_index,
            line,
        })
    }

    /// Resolves a line offset within the named scope of the given file to a
    /// breakable location.
    pub fn find_scope_by_name(
        &self,
        filename: &str,
        fqn: &str,
        offset: u32,
    ) -> crate::Result<Resolved> {
        let unit = self.unit(filename)?;

        let (scope, line) = unit.find_scope_by_name(fqn, offset)?;
        let scope_index = index_of(&unit, scope);

        Ok(Resolved {
            unit,
            scope_index,
            line,
        })
    }

    /// Resolves a breakpoint request.
    ///
    /// If `scope` is empty, `line` is an absolute line of the file. Otherwise
    /// it is an offset from the first line of the named scope.
    pub fn resolve(&self, filename: &str, scope: &str, line: u32) -> crate::Result<Resolved> {
        if scope.is_empty() {
            self.find_scope_by_lineno(filename, line)
        } else {
            self.find_scope_by_name(filename, scope, line)
        }
    }
}

fn index_of(unit: &CompiledUnit, scope: &Scope) -> usize {
    unit.scopes()
        .iter()
        .position(|s| std::ptr::eq(s, scope))
        .unwrap_or_default()
}

/// Breakable location resolved by a [ScopeResolver].
#[derive(Clone, Debug)]
pub struct Resolved {
    unit: Arc<CompiledUnit>,
    scope_index: usize,
    line: u32,
}

impl Resolved {
    /// Compiled unit owning the location.
    pub fn unit(&self) -> &CompiledUnit {
        &self.unit
    }

    /// Scope owning the location.
    pub fn scope(&self) -> &Scope {
        &self.unit.scopes()[self.scope_index]
    }

    /// Breakable line, always a valid line of [scope](Self::scope).
    pub const fn line(&self) -> u32 {
        self.line
    }
}

trait DynCompiler: Send + Sync {
    fn compile_dyn(&self, filename: &str) -> crate::Result<DebugMetadata>;
}

impl<C: Compiler> DynCompiler for C {
    fn compile_dyn(&self, filename: &str) -> crate::Result<DebugMetadata> {
        self.compile(filename).map_err(|e| crate::Error::Compile {
            filename: filename.to_owned(),
            source: Box::new(e),
        })
    }
}
