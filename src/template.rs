//! Template compilation and the single-slot compilation cache.

use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use handlebars::Handlebars;
use regex::{Captures, Regex};
use tracing::{debug, trace};

use crate::builtins::make_eval_env;
use crate::config::EvalLimits;
use crate::error::RenderError;
use crate::helpers::register_helpers;
use crate::interpreter::EvalEnv;
use crate::report::ReportData;
use crate::time_range::TimeRange;

const TEMPLATE_NAME: &str = "report";

// Any mustache whose opener carries extra braces or `&`: `{{{x}}}`,
// `{{{{x}}}}`, `{{~{x}~}}`, `{{&x}}`, `{{~&x}}`.
static RAW_MUSTACHE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(~?)\s*[{&]+([^}]*?)\}*(~?)\}\}").expect("raw mustache pattern is valid")
});

/// Rewrite every unescaped interpolation to the escaped `{{x}}` form.
/// Repeats until nothing matches, so nested braces cannot reassemble a
/// raw form.
pub fn sanitize(content: &str) -> Cow<'_, str> {
    let mut sanitized = Cow::Borrowed(content);
    while RAW_MUSTACHE.is_match(&sanitized) {
        let next = RAW_MUSTACHE
            .replace_all(&sanitized, |caps: &Captures<'_>| {
                format!("{{{{{}{}{}}}}}", &caps[1], &caps[2], &caps[3])
            })
            .into_owned();
        sanitized = Cow::Owned(next);
    }
    sanitized
}

// ── Compiled templates ──────────────────────────────────────────────

/// A template compiled together with helpers bound to one environment.
pub struct CompiledTemplate {
    registry: Handlebars<'static>,
    env: Arc<EvalEnv>,
}

impl CompiledTemplate {
    /// Sanitize `content`, bind every helper to `env` and compile.
    pub fn compile(content: &str, env: Arc<EvalEnv>) -> Result<Self, RenderError> {
        let mut registry = Handlebars::new();
        register_helpers(&mut registry, &env);
        registry
            .register_template_string(TEMPLATE_NAME, sanitize(content).as_ref())
            .map_err(|err| RenderError::Compile(Box::new(err)))?;
        Ok(CompiledTemplate { registry, env })
    }

    /// Run the template with the whole snapshot as its context.
    pub fn render(&self, data: &ReportData) -> Result<String, RenderError> {
        self.registry
            .render(TEMPLATE_NAME, data)
            .map_err(|err| RenderError::Render(Box::new(err)))
    }

    /// The environment the helpers were bound to.
    pub fn env(&self) -> &EvalEnv {
        &self.env
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate").finish_non_exhaustive()
    }
}

// ── Cache ───────────────────────────────────────────────────────────

/// Turns template text plus its inputs into a compiled template.
pub trait CompileCache: Send + Sync {
    fn compile(
        &self,
        content: &str,
        data: &ReportData,
        time_range: &TimeRange,
        limits: &EvalLimits,
    ) -> Result<Arc<CompiledTemplate>, RenderError>;
}

struct CacheEntry {
    template: Arc<CompiledTemplate>,
    last_content: String,
    last_data: ReportData,
    last_time_range: TimeRange,
    last_limits: EvalLimits,
}

impl CacheEntry {
    fn matches(
        &self,
        content: &str,
        data: &ReportData,
        time_range: &TimeRange,
        limits: &EvalLimits,
    ) -> bool {
        self.last_content == content
            && self.last_data == *data
            && self.last_time_range == *time_range
            && self.last_limits == *limits
    }
}

/// Remembers the most recently compiled template and reuses it while
/// content, data and time range stay structurally equal. Any difference
/// recompiles and replaces the entry wholesale.
#[derive(Default)]
pub struct TemplateCache {
    slot: Mutex<Option<CacheEntry>>,
}

static GLOBAL_CACHE: LazyLock<Arc<TemplateCache>> =
    LazyLock::new(|| Arc::new(TemplateCache::new()));

impl TemplateCache {
    pub fn new() -> Self {
        TemplateCache::default()
    }

    /// The process-wide cache used by [`crate::render`].
    pub fn global() -> Arc<TemplateCache> {
        GLOBAL_CACHE.clone()
    }

    /// Drop the cached entry.
    pub fn reset(&self) {
        *self.lock() = None;
    }

    /// Install `template` as the entry for the given inputs, as if it had
    /// been compiled from them.
    pub fn prime(
        &self,
        content: &str,
        data: &ReportData,
        time_range: &TimeRange,
        limits: &EvalLimits,
        template: CompiledTemplate,
    ) {
        *self.lock() = Some(CacheEntry {
            template: Arc::new(template),
            last_content: content.to_string(),
            last_data: data.clone(),
            last_time_range: time_range.clone(),
            last_limits: limits.clone(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CacheEntry>> {
        // Writers replace the slot in one assignment; a poisoned slot is whole.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CompileCache for TemplateCache {
    fn compile(
        &self,
        content: &str,
        data: &ReportData,
        time_range: &TimeRange,
        limits: &EvalLimits,
    ) -> Result<Arc<CompiledTemplate>, RenderError> {
        let mut slot = self.lock();
        if let Some(entry) = slot.as_ref() {
            if entry.matches(content, data, time_range, limits) {
                trace!("template cache hit");
                return Ok(entry.template.clone());
            }
        }

        debug!(content_len = content.len(), "template cache miss, recompiling");
        let env = make_eval_env(Arc::new(data.clone()), Arc::new(time_range.clone()))
            .with_limits(limits.clone());
        let template = Arc::new(CompiledTemplate::compile(content, Arc::new(env))?);
        *slot = Some(CacheEntry {
            template: template.clone(),
            last_content: content.to_string(),
            last_data: data.clone(),
            last_time_range: time_range.clone(),
            last_limits: limits.clone(),
        });
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_downgrades_triple_stash() {
        assert_eq!(sanitize("{{{myVar}}}"), "{{myVar}}");
        assert_eq!(sanitize("a {{{ x.y }}} b {{z}}"), "a {{ x.y }} b {{z}}");
        assert_eq!(sanitize("{{#each s}}{{/each}}"), "{{#each s}}{{/each}}");
    }

    #[test]
    fn test_sanitize_downgrades_every_raw_form() {
        assert_eq!(sanitize("{{{{myVar}}}}"), "{{myVar}}");
        assert_eq!(sanitize("{{{{{myVar}}}}}"), "{{myVar}}");
        assert_eq!(sanitize("{{&myVar}}"), "{{myVar}}");
        assert_eq!(sanitize("{{~&myVar~}}"), "{{~myVar~}}");
        assert_eq!(sanitize("{{~{myVar}~}}"), "{{~myVar~}}");
        assert_eq!(sanitize("{{{~myVar~}}}"), "{{~myVar~}}");
        assert_eq!(sanitize("a {{x}} b"), "a {{x}} b");
    }

    #[test]
    fn test_compile_error() {
        let result = CompiledTemplate::compile("{{#each items}}", Arc::new(EvalEnv::new()));
        assert!(matches!(result, Err(RenderError::Compile(_))));
    }
}
