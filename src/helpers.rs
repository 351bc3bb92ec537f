//! Template helpers over the expression environment.
//!
//! Every helper writes its result unescaped (it is markup by contract) and
//! turns its own failures into an escaped red error span, so one broken
//! helper never aborts the rest of the document.

use std::fmt::Display;
use std::sync::Arc;

use handlebars::{
    html_escape, BlockContext, BlockParams, Context, Handlebars, Helper, HelperDef, HelperResult,
    JsonRender, Output, RenderContext, Renderable,
};
use serde_json::Value as Json;
use tracing::debug;

use crate::error::EvalError;
use crate::interpreter::{safe_eval, EvalEnv};
use crate::json::{from_value, order_by, to_value, SortDirection, SortKey};
use crate::validate::{call_typed_function, TypedFunction};
use crate::value::Value;

const ORDER_BY_INLINE: &str = "`orderBy` can only be used as a block helper like: \
     {{#orderBy collection \"prop\" \"asc\"}}{{/orderBy}}";

/// The markup shown in place of a failed expression or helper.
pub fn error_span(err: &dyn Display) -> String {
    format!(
        r#"<span style="color:red">{}</span>"#,
        html_escape(&err.to_string())
    )
}

/// Register `eval`, `orderBy` and one helper per environment function.
pub fn register_helpers(registry: &mut Handlebars<'static>, env: &Arc<EvalEnv>) {
    registry.register_helper("eval", Box::new(EvalHelper { env: env.clone() }));
    for (name, function) in env.functions() {
        registry.register_helper(
            name,
            Box::new(FunctionHelper {
                name: name.to_string(),
                function: function.clone(),
            }),
        );
    }
    registry.register_helper("orderBy", Box::new(OrderByHelper));
}

fn write_error(out: &mut dyn Output, helper: &str, err: &dyn Display) -> HelperResult {
    debug!(helper, error = %err, "helper failed");
    out.write(&error_span(err))?;
    Ok(())
}

/// Render the helper's block with `value` as both `this` and the first
/// block parameter (`as |x|`).
fn render_block<'reg: 'rc, 'rc>(
    h: &Helper<'rc>,
    r: &'reg Handlebars<'reg>,
    ctx: &'rc Context,
    rc: &mut RenderContext<'reg, 'rc>,
    value: Json,
) -> Result<String, handlebars::RenderError> {
    let Some(template) = h.template() else {
        return Ok(String::new());
    };
    let mut block = BlockContext::new();
    if let Some(name) = h.block_param() {
        let mut params = BlockParams::new();
        params.add_value(name, value.clone())?;
        block.set_block_params(params);
    }
    block.set_base_value(value);
    rc.push_block(block);
    let rendered = template.renders(r, ctx, rc);
    rc.pop_block();
    rendered
}

// ── eval ────────────────────────────────────────────────────────────

/// `{{eval "1 + " x}}` concatenates its parameters into the source;
/// `{{#eval}}1 + {{x}}{{/eval}}` uses the rendered block instead.
struct EvalHelper {
    env: Arc<EvalEnv>,
}

impl HelperDef for EvalHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let source = match h.template() {
            Some(template) => match template.renders(r, ctx, rc) {
                Ok(source) => source,
                Err(err) => return write_error(out, "eval", &err),
            },
            None => h.params().iter().map(|p| p.value().render()).collect(),
        };
        match safe_eval(&self.env, &source) {
            Ok(value) => {
                out.write(&value.to_string())?;
                Ok(())
            }
            Err(err) => write_error(out, "eval", &err),
        }
    }
}

// ── Environment functions ───────────────────────────────────────────

/// Inline, writes the function's result. As a block, renders the block
/// with the result as its context, so results compose:
/// `{{#max "A" as |m|}}{{toFixed m 2}}{{/max}}`.
struct FunctionHelper {
    name: String,
    function: TypedFunction,
}

impl FunctionHelper {
    fn evaluate(&self, h: &Helper<'_>) -> Result<Value, EvalError> {
        let args = h
            .params()
            .iter()
            .enumerate()
            .map(|(i, param)| {
                to_value(param.value()).map_err(|reason| EvalError::IllTyped {
                    name: self.name.clone(),
                    position: i + 1,
                    reason,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        call_typed_function(&self.name, &self.function, &args)
    }
}

impl HelperDef for FunctionHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = match self.evaluate(h) {
            Ok(value) => value,
            Err(err) => return write_error(out, &self.name, &err),
        };
        if h.template().is_none() {
            out.write(&value.to_string())?;
            return Ok(());
        }
        match render_block(h, r, ctx, rc, from_value(&value)) {
            Ok(rendered) => {
                out.write(&rendered)?;
                Ok(())
            }
            Err(err) => write_error(out, &self.name, &err),
        }
    }
}

// ── orderBy ─────────────────────────────────────────────────────────

/// `{{#orderBy collection "path" "desc" "other.path" as |sorted|}}`
///
/// Orders the values of an array or object without touching the
/// original. Path and direction tokens come in pairs; a missing direction
/// means ascending.
struct OrderByHelper;

fn sort_keys(params: &[Json]) -> Vec<SortKey> {
    params
        .chunks(2)
        .map(|pair| SortKey {
            path: pair[0].render(),
            direction: SortDirection::from_token(pair.get(1).and_then(Json::as_str)),
        })
        .collect()
}

impl HelperDef for OrderByHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        if h.template().is_none() {
            return write_error(out, "orderBy", &EvalError::runtime(ORDER_BY_INLINE));
        }
        let params: Vec<Json> = h.params().iter().map(|p| p.value().clone()).collect();
        let Some((collection, rest)) = params.split_first() else {
            return write_error(out, "orderBy", &EvalError::runtime("orderBy needs a collection"));
        };
        let ordered = order_by(collection, &sort_keys(rest));
        match render_block(h, r, ctx, rc, ordered) {
            Ok(rendered) => {
                out.write(&rendered)?;
                Ok(())
            }
            Err(err) => write_error(out, "orderBy", &err),
        }
    }
}
