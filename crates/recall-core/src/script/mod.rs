//! The session script language.
//!
//! A small, dynamically typed, Python-flavoured language: indentation
//! blocks, `None`/bool/int/float/str/list/dict values, `if`/`for`/`while`,
//! list comprehensions, f-strings and a fixed set of builtins. There are no
//! functions, imports, or file, process or network access.
//!
//! Values are copied on assignment. The only in-place mutation is through
//! subscript assignment, `del x[k]`, and mutating methods (`append`,
//! `update`, ...) applied to a bound name or a subscript of one.

mod ast;
mod builtins;
mod interp;
mod lexer;
mod parser;

use crate::eval::{EvalError, Evaluation, Evaluator};
use crate::namespace::Namespace;

use interp::Interpreter;

/// The default [`Evaluator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptEvaluator;

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Check that `source` parses, without running it.
    pub fn check(source: &str) -> Result<(), EvalError> {
        parser::parse(source).map(|_| ())
    }
}

impl Evaluator for ScriptEvaluator {
    fn evaluate(&mut self, source: &str, namespace: &mut Namespace) -> Evaluation {
        let program = match parser::parse(source) {
            Ok(program) => program,
            Err(error) => {
                return Evaluation {
                    stdout: String::new(),
                    error: Some(error),
                };
            }
        };

        let mut interp = Interpreter::new(namespace);
        let result = interp.run(&program);
        Evaluation {
            stdout: interp.into_output(),
            error: result.err(),
        }
    }
}
