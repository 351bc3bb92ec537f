use std::sync::{Arc, LazyLock};

use tracing::warn;

use crate::builtins::make_eval_env;
use crate::config::RendererOptions;
use crate::error::RenderError;
use crate::markdown::Markdown;
use crate::report::ReportData;
use crate::template::{CompileCache, TemplateCache};
use crate::time_range::TimeRange;

/// Renders report templates: the template stage first, then markdown with
/// the data rules.
pub struct MarkdownRenderer {
    options: RendererOptions,
    markdown: Markdown,
    cache: Arc<dyn CompileCache>,
}

impl MarkdownRenderer {
    /// A renderer with its own compilation cache.
    pub fn new(options: RendererOptions) -> Self {
        MarkdownRenderer::with_cache(options, Arc::new(TemplateCache::new()))
    }

    pub fn with_cache(options: RendererOptions, cache: Arc<dyn CompileCache>) -> Self {
        MarkdownRenderer {
            markdown: Markdown::new(&options),
            options,
            cache,
        }
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// Render, reporting template compile and render failures.
    pub fn try_render(
        &self,
        content: &str,
        data: &ReportData,
        time_range: &TimeRange,
    ) -> Result<String, RenderError> {
        let template = self
            .cache
            .compile(content, data, time_range, &self.options.limits)?;
        let text = template.render(data)?;
        Ok(self.markdown.render(&text, Some(template.env())))
    }

    /// Render, falling back to the raw content (skipping the template
    /// stage) when the template itself is broken.
    pub fn render(&self, content: &str, data: &ReportData, time_range: &TimeRange) -> String {
        match self.try_render(content, data, time_range) {
            Ok(html) => html,
            Err(err) => {
                warn!(error = %err, "template failed, rendering raw content");
                let env = make_eval_env(Arc::new(data.clone()), Arc::new(time_range.clone()))
                    .with_limits(self.options.limits.clone());
                self.markdown.render(content, Some(&env))
            }
        }
    }

    /// Render before any data has arrived: markdown only, with loading
    /// placeholders for data spans.
    pub fn render_pending(&self, content: &str) -> String {
        self.markdown.render(content, None)
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        MarkdownRenderer::new(RendererOptions::default())
    }
}

static DEFAULT_RENDERER: LazyLock<MarkdownRenderer> = LazyLock::new(|| {
    MarkdownRenderer::with_cache(RendererOptions::default(), TemplateCache::global())
});

/// Render with default options and the process-wide template cache.
pub fn render(content: &str, data: &ReportData, time_range: &TimeRange) -> String {
    DEFAULT_RENDERER.render(content, data, time_range)
}

/// A starter report covering markdown tables, `$[...]` spans and the
/// template helpers.
pub const EXAMPLE_CONTENT: &str = r#"# Report Panel

Panels are parsed as Markdown and support two types of variable interpolation:

- Inline evaluation with the following syntax: '$[<safe js code here>]' .
- Handlebars with several helpers for evaluating values.

## Sample Markdown (with inline $[] eval syntax)

| Series | Max | Min |
  ------ | --- | ---
  A-series | $[thresholdStyles(max("A-series"), 2, 'red', 50, 'gray', 80, 'green')] |  $[thresholdStyles(min("A-series"), 2, 'red', 50, 'gray', 80, 'green')]


## Sample HTML

<table>
  <thead>
    <tr>
      <th>Series</th>
      <th>Max</th>
      <th>Min</th>
      <th>Diff</th>
    </tr>
  </thead>
  <tbody>
    {{#each series}}
      <tr>
        <td>{{@key}}</td>
        <td>
          {{#eval}}
            thresholdStyles(min("{{@key}}"), 2, 'red', 50, 'gray', 80, 'green')
          {{/eval}}
        </td>
        <td>
          {{#max @key as |maxValue|}}
            {{thresholdStyles maxValue 2 'red' 50 'gray' 80 'green'}}
          {{/max}}
        </td>
        <td>
          {{#eval}}
            toFixed(max("{{@key}}") - min("{{@key}}"), 2)
          {{/eval}}
        </td>
      </tr>
    {{/each}}
  </tbody>
</table>


## Using custom user data

{{#each userData.metricsToList}}
- [{{name}}]({{link}}) -- currently {{#eval}} current("{{name}}") {{/eval}}
{{/each}}
"#;

/// `userData` matching [`EXAMPLE_CONTENT`].
pub const EXAMPLE_USER_DATA: &str = r#"{
  "metricsToList": [
    {"name": "A-series", "link": "http://example.com/A-series"},
    {"name": "B-series", "link": "http://example.com/B-series"},
    {"name": "C-series", "link": "http://example.com/C-series"}
  ]
}"#;
