//! This crate turns compiled debug metadata into queryable scopes, and
//! resolves breakpoint requests to exact breakable locations.
//!
//! Debug metadata is supplied by a [Compiler](self::compiler::Compiler)
//! collaborator. Every file is compiled once into a [CompiledUnit],
//! cached by the [ScopeResolver] for its whole lifetime (unless
//! [invalidated](ScopeResolver::invalidate)).
//!
//! # Example
//!
//! ```
//! use vigil_symbol::compiler::{DebugMetadata, LineTable, ScopeMetadata, StaticCompiler};
//! use vigil_symbol::ScopeResolver;
//!
//! let metadata = DebugMetadata {
//!     scopes: vec![
//!         ScopeMetadata::new("<module>", 1, LineTable::new([(2, 1), (6, 4)])),
//!         ScopeMetadata::new("foo", 3, LineTable::new([(4, 1)])),
//!     ],
//! };
//!
//! let resolver = ScopeResolver::new(StaticCompiler::new().with_unit("main.vg", metadata));
//!
//! // a blank line right after `foo` resolves to the last line of `foo`
//! let resolved = resolver.resolve("main.vg", "", 5).unwrap();
//! assert_eq!(resolved.scope().fqn(), "foo");
//! assert_eq!(resolved.line(), 4);
//! ```

/// Module containing the compiler collaborator interface.
pub mod compiler;

mod error;
mod resolver;
mod scope;

pub use self::error::{Error, Result};
pub use self::resolver::{Resolved, ScopeResolver};
pub use self::scope::{CompiledUnit, Scope, calc_valid_lines, is_module_scope};
pub use self::scope::{MODULE_SCOPE, MODULE_SCOPE2};
