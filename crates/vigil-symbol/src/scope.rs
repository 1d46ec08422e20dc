use crate::compiler::{DebugMetadata, LineTable};

/// Short spelling of the whole-module scope name.
pub const MODULE_SCOPE: &str = "?";

/// Spelling of the whole-module scope name reported by host runtimes.
pub const MODULE_SCOPE2: &str = "<module>";

/// Returns whether the given fully qualified name designates the module scope.
pub fn is_module_scope(name: &str) -> bool {
    name == MODULE_SCOPE || name == MODULE_SCOPE2
}

/// Lexical scope with its breakable lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    fqn: String,
    first_line: u32,
    last_line: u32,
    valid_lines: Vec<u32>,
}

impl Scope {
    /// Builds a scope out of its name and raw line table.
    pub fn new(fqn: impl Into<String>, first_line: u32, line_table: &LineTable) -> Self {
        let valid_lines = calc_valid_lines(first_line, line_table);
        let last_line = valid_lines.last().copied().unwrap_or(first_line);

        Self {
            fqn: fqn.into(),
            first_line,
            last_line,
            valid_lines,
        }
    }

    /// Fully qualified name of the scope.
    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    /// Last component of the fully qualified name.
    ///
    /// This is the name a host runtime reports for frames running this scope,
    /// so both spellings of the module scope give [MODULE_SCOPE2].
    pub fn leaf_name(&self) -> &str {
        if self.is_module() {
            return MODULE_SCOPE2;
        }

        self.fqn.rsplit('.').next().unwrap_or(&self.fqn)
    }

    /// Leaf name of the lexically enclosing scope.
    ///
    /// Returns `None` for the module scope itself.
    pub fn enclosing_leaf_name(&self) -> Option<&str> {
        if self.is_module() {
            return None;
        }

        match self.fqn.rsplit_once('.') {
            Some((parent, _)) => parent.rsplit('.').next(),
            None => Some(MODULE_SCOPE2),
        }
    }

    /// Whether this is the whole-module scope.
    pub fn is_module(&self) -> bool {
        is_module_scope(&self.fqn)
    }

    /// First line of the scope.
    pub const fn first_line(&self) -> u32 {
        self.first_line
    }

    /// Last breakable line of the scope.
    pub const fn last_line(&self) -> u32 {
        self.last_line
    }

    /// Breakable lines, strictly ascending.
    pub fn valid_lines(&self) -> &[u32] {
        &self.valid_lines
    }

    /// Returns whether the scope range contains the given line.
    pub const fn contains(&self, line: u32) -> bool {
        self.first_line <= line && line <= self.last_line
    }

    /// Returns the greatest valid line lower or equal to `line`.
    ///
    /// When `line` precedes every valid line, the first valid line is
    /// returned.
    pub fn calc_scope_line(&self, line: u32) -> u32 {
        self.valid_lines
            .iter()
            .rev()
            .find(|&&l| l <= line)
            .or_else(|| self.valid_lines.first())
            .copied()
            .unwrap_or(self.first_line)
    }
}

/// Computes the breakable lines of a scope from its delta-encoded line table.
///
/// The result starts with `first_line`, and is strictly ascending.
pub fn calc_valid_lines(first_line: u32, line_table: &LineTable) -> Vec<u32> {
    let mut line = first_line;
    let mut valid_lines = vec![line];

    for &(byte_delta, line_delta) in &line_table.deltas {
        line = line.saturating_add(line_delta);

        // several operations mapped to the same line
        if byte_delta == 0 {
            continue;
        }

        if valid_lines.last() != Some(&line) {
            valid_lines.push(line);
        }
    }

    line = line.saturating_add(line_table.trailing_line_delta);

    if valid_lines.last() != Some(&line) {
        valid_lines.push(line);
    }

    valid_lines
}

/// Debug information of a single file.
#[derive(Clone, Debug)]
pub struct CompiledUnit {
    filename: String,
    first_line: u32,
    last_line: u32,
    scopes: Vec<Scope>,
}

impl CompiledUnit {
    /// Builds the unit of `filename` from its debug metadata.
    pub fn build(filename: impl Into<String>, metadata: &DebugMetadata) -> crate::Result<Self> {
        let filename = filename.into();

        let scopes = metadata
            .scopes
            .iter()
            .map(|s| Scope::new(s.name.clone(), s.first_line, &s.line_table))
            .collect::<Vec<_>>();

        let (Some(first_line), Some(last_line)) = (
            scopes.iter().map(Scope::first_line).min(),
            scopes.iter().map(Scope::last_line).max(),
        ) else {
            return Err(crate::Error::EmptyUnit(filename));
        };

        Ok(Self {
            filename,
            first_line,
            last_line,
            scopes,
        })
    }

    /// Name of the file.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// First line covered by a scope of the file.
    pub const fn first_line(&self) -> u32 {
        self.first_line
    }

    /// Last line covered by a scope of the file.
    pub const fn last_line(&self) -> u32 {
        self.last_line
    }

    /// Scopes of the file, in metadata order.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Finds the scope and breakable line matching the given line.
    ///
    /// The line is first clamped into the file range. A line falling past the
    /// end of a nested scope may be routed to that scope instead of its
    /// enclosing one.
    pub fn find_scope_by_lineno(&self, lineno: u32) -> crate::Result<(&Scope, u32)> {
        let lineno = lineno.clamp(self.first_line, self.last_line);

        let mut exact: Option<&Scope> = None;
        let mut before: Option<&Scope> = None;

        for scope in &self.scopes {
            if scope.contains(lineno) {
                exact = Some(scope);
            } else if scope.last_line < lineno
                && before.is_none_or(|b| scope.last_line > b.last_line)
            {
                before = Some(scope);
            }
        }

        let Some(exact) = exact else {
            return Err(crate::Error::InvalidScope(format!(
                "{}:{lineno}",
                self.filename
            )));
        };

        let line = exact.calc_scope_line(lineno);

        if let Some(before) = before.filter(|b| line <= b.last_line) {
            return Ok((before, before.calc_scope_line(lineno)));
        }

        Ok((exact, line))
    }

    /// Finds the scope with the given fully qualified name, and the breakable
    /// line at `offset` lines from its first line.
    pub fn find_scope_by_name(&self, fqn: &str, offset: u32) -> crate::Result<(&Scope, u32)> {
        let candidates: &[&str] = if is_module_scope(fqn) {
            &[MODULE_SCOPE, MODULE_SCOPE2]
        } else {
            &[fqn]
        };

        let scope = candidates
            .iter()
            .find_map(|name| self.scopes.iter().find(|s| s.fqn == *name))
            .ok_or_else(|| crate::Error::InvalidScope(fqn.to_owned()))?;

        let line = scope.calc_scope_line(scope.first_line.saturating_add(offset));

        Ok((scope, line))
    }
}
