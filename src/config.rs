use pulldown_cmark::Options;
use serde::Deserialize;

use crate::parser::DEFAULT_MAX_DEPTH;

/// Resource bounds applied to every expression evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvalLimits {
    /// Longest accepted expression source, in bytes.
    pub max_source_len: usize,
    /// Deepest accepted syntax nesting.
    pub max_depth: usize,
    /// Most syntax nodes visited by one evaluation.
    pub max_steps: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        EvalLimits {
            max_source_len: 10_000,
            max_depth: DEFAULT_MAX_DEPTH,
            max_steps: 10_000,
        }
    }
}

/// Renderer settings, loadable from JSON such as
/// `{"typographer": false, "limits": {"maxSteps": 500}}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RendererOptions {
    /// Pass raw HTML in the markdown through; otherwise it is escaped.
    pub html: bool,
    /// Smart quotes and dashes.
    pub typographer: bool,
    /// Turn bare URLs and email addresses in text into links.
    pub linkify: bool,
    pub tables: bool,
    pub strikethrough: bool,
    pub footnotes: bool,
    /// Close void elements (`<img ... />`).
    pub xhtml_out: bool,
    pub limits: EvalLimits,
}

impl Default for RendererOptions {
    fn default() -> Self {
        RendererOptions {
            html: true,
            typographer: true,
            linkify: true,
            tables: true,
            strikethrough: true,
            footnotes: true,
            xhtml_out: false,
            limits: EvalLimits::default(),
        }
    }
}

impl RendererOptions {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub(crate) fn markdown_options(&self) -> Options {
        let mut options = Options::empty();
        options.set(Options::ENABLE_SMART_PUNCTUATION, self.typographer);
        options.set(Options::ENABLE_TABLES, self.tables);
        options.set(Options::ENABLE_STRIKETHROUGH, self.strikethrough);
        options.set(Options::ENABLE_FOOTNOTES, self.footnotes);
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_options_keep_defaults() {
        let options =
            RendererOptions::from_json(r#"{"typographer": false, "limits": {"maxSteps": 5}}"#)
                .unwrap();
        assert!(!options.typographer);
        assert!(options.html);
        assert!(options.linkify);
        assert_eq!(options.limits.max_steps, 5);
        assert_eq!(options.limits.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_markdown_options() {
        let options = RendererOptions {
            strikethrough: false,
            ..RendererOptions::default()
        };
        let flags = options.markdown_options();
        assert!(flags.contains(Options::ENABLE_TABLES));
        assert!(!flags.contains(Options::ENABLE_STRIKETHROUGH));
    }
}
