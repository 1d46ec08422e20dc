mod registry;

use std::fmt;

use vigil_symbol::Resolved;

pub use self::registry::{BreakpointRegistry, TempBreakpoint};

/// ID of a breakpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BreakpointId(pub u32);

impl BreakpointId {
    /// ID reserved for the temporary breakpoint.
    pub const TEMPORARY: Self = Self(u32::MAX);
}

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::TEMPORARY {
            f.write_str("temp")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Breakpoint, resolved to a breakable line of its scope.
///
/// Values of this type handed out by the [BreakpointRegistry] are detached
/// copies: mutating them has no effect on the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Breakpoint {
    /// ID of the breakpoint.
    pub id: BreakpointId,

    /// File the breakpoint is set in.
    pub filename: String,

    /// Fully qualified name of the owning scope.
    pub scope_fqn: String,

    /// First line of the owning scope.
    pub scope_first_line: u32,

    /// Offset of [line](Self::line) from the first line of the scope.
    pub line_offset: u32,

    /// Breakable line of the breakpoint.
    pub line: u32,

    /// Whether the breakpoint is enabled.
    pub enabled: bool,

    /// Optional condition of the breakpoint.
    pub predicate: Option<Predicate>,

    /// Whether this is the temporary breakpoint.
    pub temporary: bool,

    /// Function names this breakpoint is indexed under.
    function_names: Vec<String>,
}

impl Breakpoint {
    fn new(id: BreakpointId, filename: &str, resolved: &Resolved, enabled: bool) -> Self {
        let scope = resolved.scope();
        let line = resolved.line();

        let mut function_names = vec![scope.leaf_name().to_owned()];

        // the statement defining a function runs in its enclosing scope
        if line == scope.first_line() {
            if let Some(enclosing) = scope.enclosing_leaf_name() {
                function_names.push(enclosing.to_owned());
            }
        }

        Self {
            id,
            filename: filename.to_owned(),
            scope_fqn: scope.fqn().to_owned(),
            scope_first_line: scope.first_line(),
            line_offset: line.saturating_sub(scope.first_line()),
            line,
            enabled,
            predicate: None,
            temporary: false,
            function_names,
        }
    }

    /// Names of the functions whose frames may hit this breakpoint.
    pub fn function_names(&self) -> &[String] {
        &self.function_names
    }
}

/// Deferred breakpoint condition.
///
/// The source is compiled by the [Evaluator](crate::runtime::Evaluator) the
/// first time the breakpoint is hit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Predicate {
    source: String,
}

impl Predicate {
    /// Creates a predicate from its source, or `None` if the source is blank.
    pub fn new(source: &str) -> Option<Self> {
        let source = source.trim();

        (!source.is_empty()).then(|| Self {
            source: source.to_owned(),
        })
    }

    /// Source of the predicate.
    pub fn source(&self) -> &str {
        &self.source
    }
}
