use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use tracing::trace;

use crate::ast::{BinaryOperator, Literal, Node};
use crate::config::EvalLimits;
use crate::error::EvalError;
use crate::parser::parse_with_depth;
use crate::report::ReportData;
use crate::validate::{call_typed_function, ArgValidator, TypedFunction};
use crate::value::Value;

// ── Environment ─────────────────────────────────────────────────────

/// The functions an expression may call by name, plus the data snapshot
/// they were built over.
#[derive(Debug, Clone, Default)]
pub struct EvalEnv {
    functions: HashMap<String, TypedFunction>,
    data: Option<Arc<ReportData>>,
    limits: EvalLimits,
}

impl EvalEnv {
    pub fn new() -> Self {
        EvalEnv::default()
    }

    pub fn with_function(mut self, name: impl Into<String>, function: TypedFunction) -> Self {
        self.functions.insert(name.into(), function);
        self
    }

    pub fn with_data(mut self, data: Arc<ReportData>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_limits(mut self, limits: EvalLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn function(&self, name: &str) -> Option<&TypedFunction> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, &TypedFunction)> {
        self.functions.iter().map(|(name, f)| (name.as_str(), f))
    }

    pub fn data(&self) -> Option<&ReportData> {
        self.data.as_deref()
    }

    pub fn limits(&self) -> &EvalLimits {
        &self.limits
    }
}

// ── Binary operators ────────────────────────────────────────────────

static BINARY_OPS: LazyLock<Vec<(BinaryOperator, TypedFunction)>> = LazyLock::new(|| {
    use BinaryOperator::*;

    fn arithmetic(f: fn(f64, f64) -> f64) -> TypedFunction {
        TypedFunction::new(vec![ArgValidator::number(), ArgValidator::number()], move |args| {
            Ok(Value::Number(f(args.number(0)?, args.number(1)?)))
        })
    }
    fn comparison(f: fn(f64, f64) -> bool) -> TypedFunction {
        TypedFunction::new(vec![ArgValidator::number(), ArgValidator::number()], move |args| {
            Ok(Value::Bool(f(args.number(0)?, args.number(1)?)))
        })
    }
    fn equality(negate: bool) -> TypedFunction {
        TypedFunction::new(vec![ArgValidator::any(), ArgValidator::any()], move |args| {
            let equal = args.value(0)?.loose_eq(args.value(1)?);
            Ok(Value::Bool(equal != negate))
        })
    }

    vec![
        (Add, arithmetic(|x, y| x + y)),
        (Sub, arithmetic(|x, y| x - y)),
        (Mul, arithmetic(|x, y| x * y)),
        (Div, arithmetic(|x, y| x / y)),
        (Exp, arithmetic(f64::powf)),
        (Lt, comparison(|x, y| x < y)),
        (Le, comparison(|x, y| x <= y)),
        (Eq, equality(false)),
        (Ne, equality(true)),
        (Ge, comparison(|x, y| x >= y)),
        (Gt, comparison(|x, y| x > y)),
    ]
});

fn binary_operation(operator: BinaryOperator) -> Option<&'static TypedFunction> {
    BINARY_OPS
        .iter()
        .find(|(op, _)| *op == operator)
        .map(|(_, f)| f)
}

// ── Evaluation ──────────────────────────────────────────────────────

/// Parse and evaluate `source` against `env`, within the environment's
/// limits.
pub fn safe_eval(env: &EvalEnv, source: &str) -> Result<Value, EvalError> {
    let limits = env.limits();
    if source.len() > limits.max_source_len {
        return Err(EvalError::SourceTooLong(limits.max_source_len));
    }
    let ast = parse_with_depth(source, limits.max_depth)?;
    trace!(source, "evaluating expression");
    safe_eval_ast(env, &ast)
}

/// Evaluate an already parsed expression.
pub fn safe_eval_ast(env: &EvalEnv, ast: &Node) -> Result<Value, EvalError> {
    let mut evaluator = Evaluator {
        env,
        steps: 0,
        max_steps: env.limits().max_steps,
    };
    evaluator.eval(ast)
}

struct Evaluator<'a> {
    env: &'a EvalEnv,
    steps: usize,
    max_steps: usize,
}

impl<'a> Evaluator<'a> {
    fn eval(&mut self, node: &Node) -> Result<Value, EvalError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(EvalError::BudgetExceeded(self.max_steps));
        }

        match node {
            Node::Binary {
                operator,
                left,
                right,
            } => {
                let op = binary_operation(*operator)
                    .ok_or(EvalError::NotWhitelisted(operator.as_str()))?;
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                call_typed_function(operator.as_str(), op, &[left, right])
            }

            Node::Call { callee, arguments } => {
                let Node::Identifier(name) = callee.as_ref() else {
                    return Err(EvalError::IndirectCall(callee.type_name()));
                };
                let env = self.env;
                let function = env
                    .function(name)
                    .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
                let args = arguments
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                call_typed_function(name, function, &args)
            }

            Node::Literal(literal) => match literal {
                Literal::String(s) => Ok(Value::String(s.clone())),
                Literal::Number(n) => Ok(Value::Number(*n)),
                Literal::Boolean(_) | Literal::Null => {
                    Err(EvalError::UnsupportedLiteral(literal.type_name()))
                }
            },

            Node::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }

            Node::TemplateLiteral {
                quasis,
                expressions,
            } => {
                let mut result = quasis.first().cloned().unwrap_or_default();
                for (i, expression) in expressions.iter().enumerate() {
                    let value = self.eval(expression)?;
                    result.push_str(&value.to_string());
                    if let Some(quasi) = quasis.get(i + 1) {
                        result.push_str(quasi);
                    }
                }
                Ok(Value::String(result))
            }

            Node::Identifier(_)
            | Node::This
            | Node::Array(_)
            | Node::Object(_)
            | Node::Member { .. }
            | Node::New { .. }
            | Node::Unary { .. }
            | Node::Update { .. }
            | Node::Logical { .. }
            | Node::Assignment { .. }
            | Node::Sequence(_) => Err(EvalError::UnsupportedSyntax(node.type_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn eval(source: &str) -> Result<Value, EvalError> {
        safe_eval(&EvalEnv::new(), source)
    }

    #[test]
    fn test_comparisons_yield_booleans() {
        assert_eq!(eval("1 < 2"), Ok(Value::Bool(true)));
        assert_eq!(eval("2 <= 1"), Ok(Value::Bool(false)));
        assert_eq!(eval("'1' == 1"), Ok(Value::Bool(true)));
        assert_eq!(eval("'a' != 'a'"), Ok(Value::Bool(false)));
        assert_eq!(eval("2 ** 10"), Ok(Value::Number(1024.0)));
    }

    #[test]
    fn test_boolean_results_are_not_numbers() {
        let err = eval("(1 < 2) + 1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: argument 1 to + is ill-typed: not a number"
        );
    }

    #[test]
    fn test_conditional_only_evaluates_taken_branch() {
        assert_eq!(eval("1 ? 'yes' : nope()"), Ok(Value::from("yes")));
        assert_eq!(eval("0 ? nope() : 'no'"), Ok(Value::from("no")));
        assert_eq!(eval("'' ? 1 : 2"), Ok(Value::from(2.0)));
        assert_eq!(eval("1 > 2 ? 1 : 2"), Ok(Value::from(2.0)));
        assert_eq!(eval("1 ? nope() : 2").unwrap_err().kind(), ErrorKind::Reference);
    }

    #[test]
    fn test_template_literal() {
        assert_eq!(eval("`a${1 + 1}b${'c'}`"), Ok(Value::from("a2bc")));
        assert_eq!(eval("`plain`"), Ok(Value::from("plain")));
    }

    #[test]
    fn test_operator_validation_precedes_call_arguments() {
        // An indirect callee is refused before its arguments run.
        let err = eval("(1)(nope())").unwrap_err();
        assert!(matches!(err, EvalError::IndirectCall("Literal")));
    }

    #[test]
    fn test_rejected_syntax_names_the_construct() {
        for (source, tag) in [
            ("a", "Identifier"),
            ("-1", "UnaryExpression"),
            ("1, 2", "SequenceExpression"),
            ("1 && 2", "LogicalExpression"),
            ("new Foo()", "NewExpression"),
            ("this", "ThisExpression"),
        ] {
            assert_eq!(
                eval(source).unwrap_err().to_string(),
                format!("SyntaxError: unsupported syntax: {}", tag),
                "source: {}",
                source
            );
        }
    }

    #[test]
    fn test_step_budget() {
        let env = EvalEnv::new().with_limits(EvalLimits {
            max_steps: 5,
            ..EvalLimits::default()
        });
        assert!(safe_eval(&env, "1 + 1").is_ok());
        let err = safe_eval(&env, "1 + 1 + 1 + 1").unwrap_err();
        assert_eq!(err, EvalError::BudgetExceeded(5));
    }

    #[test]
    fn test_source_length_limit() {
        let env = EvalEnv::new().with_limits(EvalLimits {
            max_source_len: 4,
            ..EvalLimits::default()
        });
        assert!(safe_eval(&env, "1+1").is_ok());
        assert_eq!(
            safe_eval(&env, "1 + 1"),
            Err(EvalError::SourceTooLong(4))
        );
    }

    #[test]
    fn test_nesting_limit() {
        let env = EvalEnv::new().with_limits(EvalLimits {
            max_depth: 8,
            ..EvalLimits::default()
        });
        let source = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(safe_eval(&env, &source).unwrap_err().kind(), ErrorKind::Syntax);
        assert_eq!(eval(&source), Ok(Value::from(1.0)));
    }
}
