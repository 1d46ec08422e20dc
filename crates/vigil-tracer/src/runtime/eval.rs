use super::frame::Namespace;

/// Error returned by an [Evaluator].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EvalError(pub String);

/// Trait implemented by the collaborator evaluating breakpoint predicates.
pub trait Evaluator: Send + Sync + 'static {
    /// Compiled form of a predicate.
    type Expr: Send + Sync + 'static;

    /// Type of the values the predicates are evaluated against.
    type Value;

    /// Compiles the source of a predicate.
    fn compile(&self, source: &str) -> Result<Self::Expr, EvalError>;

    /// Evaluates a compiled predicate within the given namespace.
    fn eval(
        &self,
        expr: &Self::Expr,
        namespace: &dyn Namespace<Value = Self::Value>,
    ) -> Result<bool, EvalError>;
}
