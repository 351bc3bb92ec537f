use std::fmt;
use std::sync::Arc;

use crate::error::EvalError;
use crate::value::Value;

// ── Argument validators ─────────────────────────────────────────────

type Check = dyn Fn(Option<&Value>) -> Result<(), String> + Send + Sync;

/// A predicate over a single argument.
///
/// `None` stands for an argument the caller did not supply. A failing
/// check returns a short reason such as `not a number`, which ends up
/// verbatim in the `ill-typed` diagnostic.
#[derive(Clone)]
pub struct ArgValidator {
    check: Arc<Check>,
    optional: bool,
}

impl ArgValidator {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(Option<&Value>) -> Result<(), String> + Send + Sync + 'static,
    {
        ArgValidator {
            check: Arc::new(check),
            optional: false,
        }
    }

    pub fn number() -> Self {
        ArgValidator::new(|arg| match arg {
            Some(Value::Number(_)) => Ok(()),
            _ => Err("not a number".to_string()),
        })
    }

    pub fn string() -> Self {
        ArgValidator::new(|arg| match arg {
            Some(Value::String(_)) => Ok(()),
            _ => Err("not a string".to_string()),
        })
    }

    /// Accepts anything, including a missing argument. Still counts
    /// towards the required arity.
    pub fn any() -> Self {
        ArgValidator::new(|_| Ok(()))
    }

    /// Accepts a missing argument, otherwise delegates to `inner`.
    pub fn optional(inner: ArgValidator) -> Self {
        let check = inner.check;
        ArgValidator {
            check: Arc::new(move |arg| match arg {
                None => Ok(()),
                Some(_) => check(arg),
            }),
            optional: true,
        }
    }

    /// Succeeds if any alternative does; otherwise reports all of their
    /// reasons.
    pub fn one_of(alternatives: Vec<ArgValidator>) -> Self {
        ArgValidator::new(move |arg| {
            let mut reasons = Vec::with_capacity(alternatives.len());
            for alternative in &alternatives {
                match alternative.validate(arg) {
                    Ok(()) => return Ok(()),
                    Err(reason) => reasons.push(reason),
                }
            }
            Err(format!("not one of ({})", reasons.join(",")))
        })
    }

    pub fn validate(&self, arg: Option<&Value>) -> Result<(), String> {
        (self.check)(arg)
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

impl fmt::Debug for ArgValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgValidator")
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

// ── Typed functions ─────────────────────────────────────────────────

/// Positional arguments as seen by a function body: exactly one slot per
/// declared validator, `None` where the caller supplied nothing.
#[derive(Debug)]
pub struct Args<'a> {
    slots: Vec<Option<&'a Value>>,
}

impl<'a> Args<'a> {
    fn new(values: &'a [Value], arity: usize) -> Self {
        let slots = (0..arity).map(|i| values.get(i)).collect();
        Args { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a Value> {
        self.slots.get(index).copied().flatten()
    }

    pub fn value(&self, index: usize) -> Result<&'a Value, EvalError> {
        self.get(index)
            .ok_or_else(|| EvalError::runtime(format!("argument {} is missing", index + 1)))
    }

    pub fn number(&self, index: usize) -> Result<f64, EvalError> {
        self.value(index)?
            .as_number()
            .ok_or_else(|| EvalError::runtime(format!("argument {} is not a number", index + 1)))
    }

    pub fn string(&self, index: usize) -> Result<&'a str, EvalError> {
        self.value(index)?
            .as_str()
            .ok_or_else(|| EvalError::runtime(format!("argument {} is not a string", index + 1)))
    }

    /// The supplied values from `start` on, skipping missing slots.
    pub fn present_from(&self, start: usize) -> impl Iterator<Item = &'a Value> + '_ {
        self.slots.iter().skip(start).filter_map(|slot| *slot)
    }
}

type Implementation = dyn Fn(&Args<'_>) -> Result<Value, EvalError> + Send + Sync;

/// A function with a declared, validated signature.
///
/// Used alike for binary operators, environment functions and template
/// helpers, so every caller shares one validation and error path.
#[derive(Clone)]
pub struct TypedFunction {
    validators: Vec<ArgValidator>,
    implementation: Arc<Implementation>,
}

impl TypedFunction {
    pub fn new<F>(validators: Vec<ArgValidator>, implementation: F) -> Self
    where
        F: Fn(&Args<'_>) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        TypedFunction {
            validators,
            implementation: Arc::new(implementation),
        }
    }

    pub fn validators(&self) -> &[ArgValidator] {
        &self.validators
    }

    /// Number of non-optional validators, wherever they sit in the list.
    pub fn required_arity(&self) -> usize {
        self.validators.iter().filter(|v| !v.is_optional()).count()
    }
}

impl fmt::Debug for TypedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedFunction")
            .field("validators", &self.validators)
            .finish_non_exhaustive()
    }
}

/// Check `args` against the signature of `function` and invoke it.
///
/// Too few arguments is an arity error; each declared position is then
/// validated in order and the first failure is reported with its 1-based
/// position. Arguments beyond the declared ones are dropped.
pub fn call_typed_function(
    name: &str,
    function: &TypedFunction,
    args: &[Value],
) -> Result<Value, EvalError> {
    let required = function.required_arity();
    if args.len() < required {
        let has_optional = function.validators.iter().any(ArgValidator::is_optional);
        let expected = if has_optional {
            format!("at least {}", required)
        } else {
            required.to_string()
        };
        return Err(EvalError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }

    for (i, validator) in function.validators.iter().enumerate() {
        validator
            .validate(args.get(i))
            .map_err(|reason| EvalError::IllTyped {
                name: name.to_string(),
                position: i + 1,
                reason,
            })?;
    }

    let args = Args::new(args, function.validators.len());
    (function.implementation)(&args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat() -> TypedFunction {
        TypedFunction::new(
            vec![
                ArgValidator::string(),
                ArgValidator::optional(ArgValidator::number()),
            ],
            |args| {
                let tail: Vec<String> = args.present_from(1).map(ToString::to_string).collect();
                Ok(Value::from(format!("{}{}", args.string(0)?, tail.concat())))
            },
        )
    }

    #[test]
    fn test_string_and_number_validators() {
        assert!(ArgValidator::string().validate(Some(&Value::from("foo"))).is_ok());
        assert_eq!(
            ArgValidator::string().validate(Some(&Value::from(1.0))),
            Err("not a string".to_string())
        );
        assert!(ArgValidator::number().validate(Some(&Value::from(1.0))).is_ok());
        assert!(ArgValidator::number().validate(Some(&Value::from("foo"))).is_err());
        assert!(ArgValidator::number().validate(Some(&Value::from(true))).is_err());
        assert!(ArgValidator::number().validate(None).is_err());
    }

    #[test]
    fn test_optional_validator() {
        let v = ArgValidator::optional(ArgValidator::string());
        assert!(v.is_optional());
        assert!(v.validate(None).is_ok());
        assert!(v.validate(Some(&Value::from("foo"))).is_ok());
        assert!(v.validate(Some(&Value::from(1.0))).is_err());
    }

    #[test]
    fn test_one_of_lists_every_reason() {
        let v = ArgValidator::one_of(vec![ArgValidator::string(), ArgValidator::number()]);
        assert!(v.validate(Some(&Value::from("s"))).is_ok());
        assert!(v.validate(Some(&Value::from(1.0))).is_ok());
        assert_eq!(
            v.validate(Some(&Value::from(false))),
            Err("not one of (not a string,not a number)".to_string())
        );
    }

    #[test]
    fn test_call_reports_arity() {
        let err = call_typed_function("concat", &concat(), &[]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: concat expects at least 1 args, got 0");
    }

    #[test]
    fn test_call_reports_position() {
        let err = call_typed_function(
            "concat",
            &concat(),
            &[Value::from("a"), Value::from("b")],
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: argument 2 to concat is ill-typed: not a number"
        );
    }

    #[test]
    fn test_call_drops_extra_arguments() {
        let result = call_typed_function(
            "concat",
            &concat(),
            &[Value::from("a"), Value::from(1.0), Value::from("ignored")],
        );
        assert_eq!(result, Ok(Value::from("a1")));
        assert_eq!(
            call_typed_function("concat", &concat(), &[Value::from("a")]),
            Ok(Value::from("a"))
        );
    }

    #[test]
    fn test_required_after_optional_is_counted_loosely() {
        // Arity counts non-optional validators regardless of position, so
        // one argument passes the arity check; the trailing required
        // validator then rejects the missing second slot.
        let f = TypedFunction::new(
            vec![
                ArgValidator::optional(ArgValidator::string()),
                ArgValidator::number(),
            ],
            |_| Ok(Value::from(0.0)),
        );
        assert_eq!(f.required_arity(), 1);
        let err = call_typed_function("f", &f, &[Value::from("x")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: argument 2 to f is ill-typed: not a number"
        );
        assert!(call_typed_function("f", &f, &[Value::from("x"), Value::from(2.0)]).is_ok());
    }
}
