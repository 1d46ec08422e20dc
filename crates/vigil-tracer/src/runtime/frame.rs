use indexmap::IndexMap;

/// Identity of an activation record.
///
/// Two frames are the same frame if and only if their IDs are equal, no
/// matter their source location.
pub type FrameId = u64;

/// Local variables of a frame, in definition order.
pub type Locals<V> = IndexMap<String, V>;

/// Trait providing name lookups over a variable namespace.
pub trait Namespace {
    /// Type of the variables' values.
    type Value: Clone + std::fmt::Debug + Send + Sync + 'static;

    /// Returns the value bound to the given name, if any.
    fn get(&self, name: &str) -> Option<Self::Value>;

    /// Returns the names bound in this namespace.
    fn names(&self) -> Vec<String>;
}

/// Trait providing functions for working with an activation record of the
/// debuggee.
///
/// Implementors are expected to be cheap handles (e.g., reference counted
/// pointers) over the host runtime frame.
pub trait Frame: Namespace + Clone + Send + Sync + 'static {
    /// Error returned by this trait.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the identity of the frame.
    fn id(&self) -> FrameId;

    /// Returns the file the frame's code was compiled from.
    fn filename(&self) -> &str;

    /// Returns the leaf name of the scope the frame runs.
    ///
    /// Frames running the whole-module scope report `<module>`.
    fn scope_name(&self) -> &str;

    /// Returns the line about to be executed.
    fn line(&self) -> u32;

    /// Returns a copy of the frame's local variables.
    fn locals(&self) -> Locals<Self::Value>;

    /// Writes back the given local variables into the live frame.
    fn commit_locals(&self, locals: &Locals<Self::Value>) -> Result<(), Self::Error>;

    /// Moves the frame's next line to execute.
    fn set_line(&self, line: u32) -> Result<(), Self::Error>;
}
