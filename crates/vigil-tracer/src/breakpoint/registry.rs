use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use vigil_symbol::ScopeResolver;

use super::{Breakpoint, BreakpointId, Predicate};

/// Active breakpoints of a file, by line.
pub type ActiveBreakpoints = Arc<BTreeMap<u32, Breakpoint>>;

/// Owner of every breakpoint, with the lookup indices used while tracing.
///
/// All indices are updated under a single lock, so that a lookup made after
/// a mutating call has returned (from any thread) observes the mutation.
pub struct BreakpointRegistry {
    resolver: Arc<ScopeResolver>,
    indices: RwLock<Indices>,
    no_breakpoints: ActiveBreakpoints,
}

/// The temporary breakpoint (see [BreakpointRegistry::set_temp_breakpoint]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TempBreakpoint {
    /// The breakpoint itself.
    pub breakpoint: Breakpoint,

    /// Thread owning a hard temporary breakpoint.
    ///
    /// `None` for a soft temporary breakpoint.
    pub owner: Option<u64>,
}

#[derive(Default)]
struct Indices {
    by_id: BTreeMap<BreakpointId, Breakpoint>,
    by_file_and_line: HashMap<String, BTreeMap<u32, BreakpointId>>,
    by_function: HashMap<String, HashSet<BreakpointId>>,
    active_by_file: HashMap<String, ActiveBreakpoints>,
    temp: Option<TempBreakpoint>,
}

impl BreakpointRegistry {
    /// Creates an empty registry resolving locations with `resolver`.
    pub fn new(resolver: Arc<ScopeResolver>) -> Self {
        Self {
            resolver,
            indices: RwLock::default(),
            no_breakpoints: ActiveBreakpoints::default(),
        }
    }

    /// Returns the resolver used by this registry.
    pub fn resolver(&self) -> &Arc<ScopeResolver> {
        &self.resolver
    }

    /// Sets (or modifies) a breakpoint.
    ///
    /// If `scope` is empty, `line` is an absolute line of the file.
    /// Otherwise it is a line offset within the named scope.
    ///
    /// A breakpoint already occupying the resolved location keeps its ID.
    pub fn set_breakpoint(
        &self,
        filename: &str,
        scope: &str,
        line: u32,
        enabled: bool,
        predicate: &str,
    ) -> crate::Result<Breakpoint> {
        let resolved = self.resolver.resolve(filename, scope, line)?;

        let mut indices = self.indices.write();

        let id = match indices.id_at(filename, resolved.line()) {
            Some(id) => {
                indices.remove(id);
                id
            }
            None => indices.next_id(),
        };

        let mut bp = Breakpoint::new(id, filename, &resolved, enabled);
        bp.predicate = Predicate::new(predicate);

        indices.insert(bp.clone());
        indices.recompute_active(filename);

        tracing::info!(bp = %id, file = filename, line = bp.line, "breakpoint set");

        Ok(bp)
    }

    /// Sets the temporary breakpoint, clearing the previous one.
    ///
    /// A soft temporary breakpoint (`hard_owner` is `None`) is cleared the
    /// next time any thread breaks. A hard one is cleared only when its owner
    /// thread breaks on it.
    pub fn set_temp_breakpoint(
        &self,
        filename: &str,
        scope: &str,
        line: u32,
        hard_owner: Option<u64>,
    ) -> crate::Result<Breakpoint> {
        let resolved = self.resolver.resolve(filename, scope, line)?;

        let mut bp = Breakpoint::new(BreakpointId::TEMPORARY, filename, &resolved, true);
        bp.temporary = true;

        let mut indices = self.indices.write();

        indices.clear_temp();
        indices.temp = Some(TempBreakpoint {
            breakpoint: bp.clone(),
            owner: hard_owner,
        });
        indices.recompute_active(filename);

        tracing::debug!(file = filename, line = bp.line, hard = hard_owner.is_some(), "temporary breakpoint set");

        Ok(bp)
    }

    /// Clears the temporary breakpoint, if any.
    pub fn del_temp_breakpoint(&self) -> Option<Breakpoint> {
        self.indices.write().clear_temp()
    }

    /// Clears the temporary breakpoint on behalf of a thread breaking at the
    /// given location.
    ///
    /// Returns whether the temporary breakpoint was cleared.
    pub fn consume_temp_breakpoint(&self, thread_id: u64, filename: &str, line: u32) -> bool {
        let mut indices = self.indices.write();

        let consume = match &indices.temp {
            None => false,
            Some(TempBreakpoint { owner: None, .. }) => true,
            Some(TempBreakpoint {
                breakpoint,
                owner: Some(owner),
            }) => {
                *owner == thread_id && breakpoint.filename == filename && breakpoint.line == line
            }
        };

        if consume {
            indices.clear_temp();
        }

        consume
    }

    /// Returns the temporary breakpoint, if any.
    pub fn temp_breakpoint(&self) -> Option<TempBreakpoint> {
        self.indices.read().temp.clone()
    }

    /// Enables the given breakpoints (or all of them).
    ///
    /// Unknown IDs are skipped. The enabled breakpoints are returned.
    pub fn enable_breakpoints(&self, ids: &[BreakpointId], all: bool) -> Vec<Breakpoint> {
        self.set_enabled(ids, all, true)
    }

    /// Disables the given breakpoints (or all of them).
    ///
    /// Unknown IDs are skipped. The disabled breakpoints are returned.
    pub fn disable_breakpoints(&self, ids: &[BreakpointId], all: bool) -> Vec<Breakpoint> {
        self.set_enabled(ids, all, false)
    }

    fn set_enabled(&self, ids: &[BreakpointId], all: bool, enabled: bool) -> Vec<Breakpoint> {
        let mut indices = self.indices.write();

        let ids = indices.select(ids, all);
        let mut touched_files = HashSet::new();
        let mut changed = Vec::with_capacity(ids.len());

        for id in ids {
            if let Some(bp) = indices.by_id.get_mut(&id) {
                bp.enabled = enabled;
                touched_files.insert(bp.filename.clone());
                changed.push(bp.clone());
            }
        }

        for filename in touched_files {
            indices.recompute_active(&filename);
        }

        tracing::info!(count = changed.len(), enabled, "breakpoints toggled");

        changed
    }

    /// Deletes the given breakpoints (or all of them).
    ///
    /// Deleting all breakpoints clears the temporary breakpoint as well.
    /// Unknown IDs are skipped. The deleted breakpoints are returned.
    pub fn delete_breakpoints(&self, ids: &[BreakpointId], all: bool) -> Vec<Breakpoint> {
        let mut indices = self.indices.write();

        let ids = indices.select(ids, all);
        let mut touched_files = HashSet::new();
        let mut deleted = Vec::with_capacity(ids.len());

        for id in ids {
            if let Some(bp) = indices.remove(id) {
                touched_files.insert(bp.filename.clone());
                deleted.push(bp);
            }
        }

        if all {
            indices.clear_temp();
        }

        for filename in touched_files {
            indices.recompute_active(&filename);
        }

        tracing::info!(count = deleted.len(), "breakpoints deleted");

        deleted
    }

    /// Returns a copy of every breakpoint, by ID.
    pub fn get_breakpoints(&self) -> BTreeMap<BreakpointId, Breakpoint> {
        self.indices.read().by_id.clone()
    }

    /// Returns a copy of the breakpoint set at the given location, if any.
    pub fn breakpoint_at(&self, filename: &str, line: u32) -> Option<Breakpoint> {
        let indices = self.indices.read();

        indices
            .id_at(filename, line)
            .and_then(|id| indices.by_id.get(&id))
            .cloned()
    }

    /// Returns the enabled breakpoints of a file (including the temporary
    /// breakpoint), by line.
    pub fn get_active_break_points_by_file(&self, filename: &str) -> ActiveBreakpoints {
        self.indices
            .read()
            .active_by_file
            .get(filename)
            .cloned()
            .unwrap_or_else(|| self.no_breakpoints.clone())
    }

    /// Returns whether a frame running a function with the given leaf name
    /// may hit some breakpoint.
    pub fn has_function_breakpoint(&self, function_name: &str) -> bool {
        let indices = self.indices.read();

        let in_temp = indices.temp.as_ref().is_some_and(|t| {
            t.breakpoint
                .function_names()
                .iter()
                .any(|name| name == function_name)
        });

        in_temp
            || indices
                .by_function
                .get(function_name)
                .is_some_and(|ids| !ids.is_empty())
    }

    /// Returns whether the registry holds no breakpoint at all.
    pub fn is_empty(&self) -> bool {
        let indices = self.indices.read();

        indices.by_id.is_empty()
            && indices.by_file_and_line.is_empty()
            && indices.by_function.is_empty()
            && indices.active_by_file.is_empty()
            && indices.temp.is_none()
    }
}

impl Indices {
    fn id_at(&self, filename: &str, line: u32) -> Option<BreakpointId> {
        self.by_file_and_line
            .get(filename)
            .and_then(|lines| lines.get(&line))
            .copied()
    }

    /// Returns the smallest ID not currently in use.
    fn next_id(&self) -> BreakpointId {
        let mut next = 0;

        for id in self.by_id.keys() {
            if id.0 != next {
                break;
            }
            next += 1;
        }

        BreakpointId(next)
    }

    fn select(&self, ids: &[BreakpointId], all: bool) -> Vec<BreakpointId> {
        if all {
            self.by_id.keys().copied().collect()
        } else {
            ids.to_vec()
        }
    }

    fn insert(&mut self, bp: Breakpoint) {
        self.by_file_and_line
            .entry(bp.filename.clone())
            .or_default()
            .insert(bp.line, bp.id);

        for name in bp.function_names() {
            self.by_function
                .entry(name.clone())
                .or_default()
                .insert(bp.id);
        }

        self.by_id.insert(bp.id, bp);
    }

    fn remove(&mut self, id: BreakpointId) -> Option<Breakpoint> {
        let bp = self.by_id.remove(&id)?;

        if let Some(lines) = self.by_file_and_line.get_mut(&bp.filename) {
            lines.remove(&bp.line);
            if lines.is_empty() {
                self.by_file_and_line.remove(&bp.filename);
            }
        }

        for name in bp.function_names() {
            if let Some(ids) = self.by_function.get_mut(name) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_function.remove(name);
                }
            }
        }

        Some(bp)
    }

    fn clear_temp(&mut self) -> Option<Breakpoint> {
        let temp = self.temp.take()?;
        self.recompute_active(&temp.breakpoint.filename);

        Some(temp.breakpoint)
    }

    fn recompute_active(&mut self, filename: &str) {
        let mut active = BTreeMap::new();

        if let Some(lines) = self.by_file_and_line.get(filename) {
            active.extend(
                lines
                    .iter()
                    .filter_map(|(line, id)| self.by_id.get(id).map(|bp| (*line, bp)))
                    .filter(|(_, bp)| bp.enabled)
                    .map(|(line, bp)| (line, bp.clone())),
            );
        }

        if let Some(temp) = self
            .temp
            .as_ref()
            .filter(|t| t.breakpoint.filename == filename)
        {
            active.insert(temp.breakpoint.line, temp.breakpoint.clone());
        }

        if active.is_empty() {
            self.active_by_file.remove(filename);
        } else {
            self.active_by_file
                .insert(filename.to_owned(), Arc::new(active));
        }
    }
}
