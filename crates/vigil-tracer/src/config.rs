use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

/// Configuration of the trace engine.
#[derive(Clone, Debug, PartialEq, Eq, knus::Decode)]
pub struct EngineConfig {
    /// Maximum duration (in milliseconds) of every internal blocking wait.
    #[knus(child, default = 100, unwrap(argument))]
    pub poll_interval_ms: u64,

    /// Capacity of the operator event feed.
    #[knus(child, default = 1000, unwrap(argument))]
    pub event_queue_size: usize,

    /// Whether unhandled exceptions break.
    #[knus(child, default = true, unwrap(argument))]
    pub trap_exceptions: bool,

    /// Additional exception-trap boundary scopes.
    #[knus(children(name = "trap"))]
    pub trap_scopes: Vec<TrapScope>,
}

/// Scope whose frames are exception-trap boundaries.
#[derive(Clone, Debug, PartialEq, Eq, knus::Decode)]
pub struct TrapScope {
    /// Leaf name of the scope.
    #[knus(argument)]
    pub name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            event_queue_size: 1000,
            trap_exceptions: true,
            trap_scopes: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parses a KDL document.
    ///
    /// `name` only appears in diagnostics.
    pub fn parse(name: &str, text: &str) -> crate::Result<Self> {
        Ok(knus::parse(name, text)?)
    }

    /// Reads and parses a KDL file.
    pub fn from_path(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("<file>");

        Self::parse(name, &content)
    }

    /// Reads the configuration from a `.kdl` file if `config` names one,
    /// or parses `config` as an inline KDL document otherwise.
    pub fn from_content_or_path(config: &str) -> crate::Result<Self> {
        let path = Path::new(config);

        if path.extension().and_then(OsStr::to_str) == Some("kdl") {
            Self::from_path(path)
        } else {
            Self::parse("<content>", config)
        }
    }

    /// Returns the internal wait timeout.
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns whether frames of the given scope are exception-trap
    /// boundaries.
    pub fn is_trap_scope(&self, scope_name: &str) -> bool {
        self.trap_scopes.iter().any(|s| s.name == scope_name)
    }
}
