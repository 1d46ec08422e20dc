use std::collections::HashMap;

use parking_lot::RwLock;

/// Trait implemented by the collaborator turning source files into debug
/// metadata.
///
/// Implementors are free to read the source from disk, from an in-memory
/// store, or to ask a remote host runtime for it.
pub trait Compiler: Send + Sync {
    /// Error returned by this trait.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Compiles the given file and returns its debug metadata.
    fn compile(&self, filename: &str) -> Result<DebugMetadata, Self::Error>;
}

/// Debug metadata of a whole file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebugMetadata {
    /// Scopes defined by the file, parents before their children.
    pub scopes: Vec<ScopeMetadata>,
}

/// Debug metadata of a single scope (module, function or method).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeMetadata {
    /// Fully qualified name of the scope (e.g., `Foo.bar`).
    pub name: String,

    /// First source line of the scope.
    pub first_line: u32,

    /// Raw line table of the scope.
    pub line_table: LineTable,
}

impl ScopeMetadata {
    /// Creates the metadata of a scope.
    pub fn new(name: impl Into<String>, first_line: u32, line_table: LineTable) -> Self {
        Self {
            name: name.into(),
            first_line,
            line_table,
        }
    }
}

/// Delta-encoded line table, mapping bytecode offsets to source lines.
///
/// Each `(byte_delta, line_delta)` pair advances from the previous entry,
/// starting at the first line of the owning scope.
///
/// The trailing line delta is applied once after the last pair. Compilers
/// whose tables end on a pair that must be applied again build them with
/// [LineTable::repeating_last]. [LineTable::new] leaves it at 0, for tables
/// whose last pair already reaches the last line of the scope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineTable {
    /// The `(byte_delta, line_delta)` pairs.
    pub deltas: Vec<(u32, u32)>,

    /// Trailing line delta, applied once after all the pairs.
    pub trailing_line_delta: u32,
}

impl LineTable {
    /// Creates a line table from its pairs, without trailing delta.
    pub fn new(deltas: impl Into<Vec<(u32, u32)>>) -> Self {
        Self {
            deltas: deltas.into(),
            trailing_line_delta: 0,
        }
    }

    /// Creates a line table whose trailing delta repeats the line delta of
    /// its last pair.
    pub fn repeating_last(deltas: impl Into<Vec<(u32, u32)>>) -> Self {
        let deltas = deltas.into();
        let trailing_line_delta = deltas.last().map_or(0, |&(_, line_delta)| line_delta);

        Self {
            deltas,
            trailing_line_delta,
        }
    }

    /// Sets the trailing line delta.
    pub const fn with_trailing_line_delta(mut self, delta: u32) -> Self {
        self.trailing_line_delta = delta;
        self
    }
}

/// Compiler serving metadata registered ahead of time.
///
/// This is handy when the host runtime ships its debug metadata to the
/// debugger instead of letting it compile sources.
#[derive(Default)]
pub struct StaticCompiler {
    units: RwLock<HashMap<String, DebugMetadata>>,
}

impl StaticCompiler {
    /// Creates an empty compiler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the metadata of a file.
    pub fn insert(&self, filename: impl Into<String>, metadata: DebugMetadata) {
        self.units.write().insert(filename.into(), metadata);
    }

    /// Registers the metadata of a file, builder style.
    pub fn with_unit(self, filename: impl Into<String>, metadata: DebugMetadata) -> Self {
        self.insert(filename, metadata);
        self
    }
}

/// Error returned by [StaticCompiler] for unknown files.
#[derive(thiserror::Error, Debug)]
#[error("no metadata registered for {0}")]
pub struct UnknownFile(pub String);

impl Compiler for StaticCompiler {
    type Error = UnknownFile;

    fn compile(&self, filename: &str) -> Result<DebugMetadata, Self::Error> {
        self.units
            .read()
            .get(filename)
            .cloned()
            .ok_or_else(|| UnknownFile(filename.to_owned()))
    }
}
