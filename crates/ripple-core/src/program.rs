//! Cell programs and the values they produce.
//!
//! A program is supplied ready-made: either a literal, or a callable over the
//! cell's dependency values in declaration order. What the callable returns
//! is classified once, as a [`Produced`]:
//!
//! ```text
//! Produced
//!   ├── Immediate(value)   settles at once
//!   ├── Deferred(future)   Pending now, settles when the future resolves
//!   └── Generator(items)   drained step by step, each item settles the cell
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

/// A value that settles later, successfully or with a reason.
pub type Deferred = BoxFuture<'static, Result<Value, String>>;

/// A stepping source of values. `None` means the generator is finished;
/// an `Err` item is a failed step.
pub type Generator = Box<dyn Iterator<Item = Result<Yield, String>> + Send>;

/// Signature of a callable program.
pub type ProgramFn = dyn Fn(&[Value]) -> Result<Produced, String> + Send + Sync;

/// The executable part of a cell.
#[derive(Clone)]
pub enum Program {
    /// A literal value.
    Constant(Value),
    /// A callable over the dependency values, positionally.
    Function(Arc<ProgramFn>),
}

impl Program {
    pub fn constant(value: impl Into<Value>) -> Self {
        Program::Constant(value.into())
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Produced, String> + Send + Sync + 'static,
    {
        Program::Function(Arc::new(f))
    }

    /// A callable that always fails with `reason`.
    ///
    /// Useful to a program supplier whose cell source did not compile: the
    /// cell still takes part in the graph and reports the failure as its result.
    pub fn failing(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Program::function(move |_| Err(reason.clone()))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Program::Function(_))
    }
}

impl Default for Program {
    fn default() -> Self {
        Program::Constant(Value::Null)
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Program::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Program::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// What a callable program returned.
pub enum Produced {
    Immediate(Value),
    Deferred(Deferred),
    Generator(Generator),
}

impl Produced {
    /// Nothing was returned; settles as `Done(null)`.
    pub fn undefined() -> Self {
        Produced::Immediate(Value::Null)
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Produced::Immediate(value.into())
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Produced::Deferred(future.boxed())
    }

    /// A generator whose steps never fail.
    pub fn generator<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Yield>,
        I::IntoIter: Send + 'static,
    {
        Produced::Generator(Box::new(
            items
                .into_iter()
                .map(|item| Ok::<Yield, String>(item.into())),
        ))
    }

    /// A generator whose steps may fail.
    pub fn fallible_generator<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Result<Yield, String>>,
        I::IntoIter: Send + 'static,
    {
        Produced::Generator(Box::new(items.into_iter()))
    }
}

impl From<Value> for Produced {
    fn from(value: Value) -> Self {
        Produced::Immediate(value)
    }
}

impl std::fmt::Debug for Produced {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Produced::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Produced::Deferred(_) => f.write_str("Deferred(..)"),
            Produced::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

/// One item pulled from a generator.
pub enum Yield {
    /// Skipped without settling the cell.
    Undefined,
    /// Accepted after the runtime's generator throttle.
    Value(Value),
    /// Awaited, then accepted.
    Deferred(Deferred),
}

impl Yield {
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Yield::Deferred(future.boxed())
    }
}

impl From<Value> for Yield {
    fn from(value: Value) -> Self {
        Yield::Value(value)
    }
}

impl From<Option<Value>> for Yield {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Yield::Undefined, Yield::Value)
    }
}

impl std::fmt::Debug for Yield {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Yield::Undefined => f.write_str("Undefined"),
            Yield::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Yield::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_program_is_null_literal() {
        let program = Program::default();
        assert!(!program.is_callable());
        assert!(matches!(program, Program::Constant(Value::Null)));
    }

    #[test]
    fn test_function_program() {
        let program = Program::function(|args| Ok(Produced::value(args.len())));
        let Program::Function(f) = &program else {
            panic!("expected a callable program");
        };
        let produced = f(&[json!(1), json!(2)]).unwrap();
        assert!(matches!(produced, Produced::Immediate(v) if v == json!(2)));
    }

    #[test]
    fn test_failing_program() {
        let Program::Function(f) = Program::failing("SyntaxError: unexpected token") else {
            panic!("expected a callable program");
        };
        assert_eq!(f(&[]).unwrap_err(), "SyntaxError: unexpected token");
    }

    #[test]
    fn test_generator_items() {
        let Produced::Generator(mut items) =
            Produced::generator(vec![Some(json!(1)), None, Some(json!(3))])
        else {
            panic!("expected a generator");
        };
        assert!(matches!(items.next(), Some(Ok(Yield::Value(v))) if v == json!(1)));
        assert!(matches!(items.next(), Some(Ok(Yield::Undefined))));
        assert!(matches!(items.next(), Some(Ok(Yield::Value(v))) if v == json!(3)));
        assert!(items.next().is_none());
    }

    #[test]
    fn test_debug_hides_callables() {
        assert_eq!(format!("{:?}", Program::failing("x")), "Function(..)");
        assert_eq!(format!("{:?}", Produced::undefined()), "Immediate(Null)");
    }
}
