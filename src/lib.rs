//! Sandboxed rendering of report templates.
//!
//! A report is handlebars-style template text whose output is markdown.
//! Both layers can embed expressions (`{{eval ...}}` and `$[...]`) in a
//! small whitelisted expression language: string and number literals,
//! arithmetic and comparison operators, conditionals, template literals
//! and calls of named, type-checked functions that read from a read-only
//! data snapshot.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod error;
pub mod helpers;
pub mod interpreter;
pub mod json;
pub mod markdown;
pub mod parser;
pub mod renderer;
pub mod report;
pub mod rules;
pub mod template;
pub mod time_range;
pub mod validate;
pub mod value;

pub use builtins::make_eval_env;
pub use config::{EvalLimits, RendererOptions};
pub use error::{ErrorKind, EvalError, ParseError, RenderError};
pub use interpreter::{safe_eval, safe_eval_ast, EvalEnv};
pub use renderer::{render, MarkdownRenderer, EXAMPLE_CONTENT, EXAMPLE_USER_DATA};
pub use report::{ReportData, SeriesStats, TimeSeries, VariableData, VariableOption};
pub use template::{CompileCache, CompiledTemplate, TemplateCache};
pub use time_range::TimeRange;
pub use validate::{call_typed_function, ArgValidator, Args, TypedFunction};
pub use value::Value;

#[cfg(test)]
mod tests;
