//! The functions available to report expressions and helpers.

use std::sync::Arc;

use crate::error::EvalError;
use crate::interpreter::EvalEnv;
use crate::report::{ReportData, SeriesStats};
use crate::time_range::TimeRange;
use crate::validate::{ArgValidator, TypedFunction};
use crate::value::{to_fixed, Value, MAX_FIXED_DIGITS};

/// Build the function registry for one data snapshot and time range.
///
/// Every function reads from the `Arc`s it was built with; a new snapshot
/// means a new environment.
pub fn make_eval_env(data: Arc<ReportData>, time_range: Arc<TimeRange>) -> EvalEnv {
    let mut env = EvalEnv::new()
        .with_data(data.clone())
        .with_function("thresholdStyles", threshold_styles())
        .with_function("threshold", threshold())
        .with_function("style", style())
        .with_function("toFixed", fixed())
        .with_function("toKMGT", kmgt());

    for stat in SeriesStats::NAMES {
        env = env.with_function(stat, stat_getter(data.clone(), stat));
    }

    let from = time_range.clone();
    let to = time_range;
    env.with_function(
        "startDate",
        TypedFunction::new(vec![ArgValidator::string()], move |args| {
            Ok(Value::from(from.format_from(args.string(0)?)))
        }),
    )
    .with_function(
        "endDate",
        TypedFunction::new(vec![ArgValidator::string()], move |args| {
            Ok(Value::from(to.format_to(args.string(0)?)))
        }),
    )
    .with_function("join", join())
}

/// `value < low ? below : value < high ? between : above`
fn classify<'a>(
    value: f64,
    below: &'a str,
    low: f64,
    between: &'a str,
    high: f64,
    above: &'a str,
) -> &'a str {
    if value < low {
        below
    } else if value < high {
        between
    } else {
        above
    }
}

fn checked_fixed(x: f64, digits: f64) -> Result<String, EvalError> {
    let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
    if !(0.0..=MAX_FIXED_DIGITS as f64).contains(&digits) {
        return Err(EvalError::runtime(format!(
            "toFixed() digits argument must be between 0 and {}",
            MAX_FIXED_DIGITS
        )));
    }
    Ok(to_fixed(x, digits as usize))
}

fn threshold_styles() -> TypedFunction {
    use ArgValidator as V;
    TypedFunction::new(
        vec![
            V::number(),
            V::number(),
            V::string(),
            V::number(),
            V::string(),
            V::number(),
            V::string(),
        ],
        |args| {
            let value = args.number(0)?;
            let class = classify(
                value,
                args.string(2)?,
                args.number(3)?,
                args.string(4)?,
                args.number(5)?,
                args.string(6)?,
            );
            let text = checked_fixed(value, args.number(1)?)?;
            Ok(Value::from(format!(r#"<span class="{}">{}</span>"#, class, text)))
        },
    )
}

fn threshold() -> TypedFunction {
    use ArgValidator as V;
    TypedFunction::new(
        vec![
            V::number(),
            V::string(),
            V::number(),
            V::string(),
            V::number(),
            V::string(),
        ],
        |args| {
            let class = classify(
                args.number(0)?,
                args.string(1)?,
                args.number(2)?,
                args.string(3)?,
                args.number(4)?,
                args.string(5)?,
            );
            Ok(Value::from(class))
        },
    )
}

fn style() -> TypedFunction {
    TypedFunction::new(vec![ArgValidator::string(), ArgValidator::any()], |args| {
        Ok(Value::from(format!(
            r#"<span class="{}">{}</span>"#,
            args.string(0)?,
            args.value(1)?
        )))
    })
}

fn fixed() -> TypedFunction {
    TypedFunction::new(vec![ArgValidator::number(), ArgValidator::number()], |args| {
        checked_fixed(args.number(0)?, args.number(1)?).map(Value::from)
    })
}

const SCALES: [(i32, &str); 4] = [(12, "T"), (9, "G"), (6, "M"), (3, "K")];

fn kmgt() -> TypedFunction {
    TypedFunction::new(vec![ArgValidator::number(), ArgValidator::number()], |args| {
        let x = args.number(0)?;
        let precision = args.number(1)?;
        for (exponent, suffix) in SCALES {
            let scale = 10f64.powi(exponent);
            if x > scale {
                let scaled = checked_fixed(x / scale, precision)?;
                return Ok(Value::from(format!("{}{}", scaled, suffix)));
            }
        }
        checked_fixed(x, precision).map(Value::from)
    })
}

/// Reads one statistic of a series. The alias is checked against the
/// snapshot while validating, so an unknown series is a type error.
fn stat_getter(data: Arc<ReportData>, stat: &'static str) -> TypedFunction {
    let lookup = data.clone();
    let known_series = ArgValidator::new(move |arg| {
        let alias = arg.map_or_else(|| "undefined".to_string(), ToString::to_string);
        if lookup.series.contains_key(&alias) {
            Ok(())
        } else {
            Err(format!("no series named {}", alias))
        }
    });

    TypedFunction::new(vec![known_series], move |args| {
        let alias = args.value(0)?.to_string();
        data.series
            .get(&alias)
            .and_then(|series| series.stats.get(stat))
            .map(Value::Number)
            .ok_or_else(|| EvalError::runtime(format!("series {} has no {} value", alias, stat)))
    })
}

fn join() -> TypedFunction {
    use ArgValidator as V;
    let item = || V::one_of(vec![V::string(), V::number()]);
    TypedFunction::new(
        vec![
            V::string(),
            item(),
            V::optional(item()),
            V::optional(item()),
            V::optional(item()),
            V::optional(item()),
            V::optional(item()),
        ],
        |args| {
            let delimiter = args.string(0)?;
            let parts: Vec<String> = args.present_from(1).map(ToString::to_string).collect();
            Ok(Value::from(parts.join(delimiter)))
        },
    )
}
