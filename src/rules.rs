//! The two inline extensions of the markdown stage: `$[expr]` data spans
//! and `{height=H, width=W}` image annotations.

use std::ops::Range;
use std::sync::LazyLock;

use handlebars::html_escape;
use regex::Regex;

use crate::helpers::error_span;
use crate::interpreter::{safe_eval, EvalEnv};

// ── Data rule ───────────────────────────────────────────────────────

static DATA_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\[([^\]]+)\]").expect("data span pattern is valid"));

/// Shown in place of every data span until data has arrived.
pub const LOADING: &str = "(Loading...)";

/// What a `$[expr]` span is replaced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Substitution {
    /// Raw markup: the evaluated value, or an error span.
    Html(String),
    /// Plain text, escaped on output.
    Text(String),
}

/// A `$[...]` occurrence in the markdown source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSpan {
    /// Byte range of the whole `$[...]`.
    pub range: Range<usize>,
    pub expression: String,
}

/// Find the data spans of `source` that do not start inside one of the
/// `excluded` ranges (code and raw HTML blocks). Escaped `\$[` and spans
/// crossing a blank line are left alone.
pub fn find_data_spans(source: &str, excluded: &[Range<usize>]) -> Vec<DataSpan> {
    DATA_SPAN
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let expression = caps.get(1)?.as_str();
            let start = whole.start();
            if excluded.iter().any(|r| r.contains(&start))
                || source[..start].ends_with('\\')
                || expression.contains("\n\n")
            {
                return None;
            }
            Some(DataSpan {
                range: whole.range(),
                expression: expression.to_string(),
            })
        })
        .collect()
}

/// Evaluate one data span. Without an environment (no data yet) the span
/// becomes a loading placeholder.
pub fn substitute(env: Option<&EvalEnv>, expression: &str) -> Substitution {
    match env {
        Some(env) => match safe_eval(env, expression) {
            Ok(value) => Substitution::Html(value.to_string()),
            Err(err) => Substitution::Html(error_span(&err)),
        },
        None => Substitution::Text(LOADING.to_string()),
    }
}

// ── Image size rule ─────────────────────────────────────────────────

static IMAGE_SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{[^}]*?height=([0-9]+)\s*,\s*width=([0-9]+)[^}]*\}")
        .expect("image size pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSize {
    pub height: String,
    pub width: String,
}

/// Match a size annotation at the very start of the text that follows an
/// image. Returns the size and the annotation's length in bytes.
pub fn take_image_size(text: &str) -> Option<(ImageSize, usize)> {
    let caps = IMAGE_SIZE.captures(text)?;
    let size = ImageSize {
        height: caps.get(1)?.as_str().to_string(),
        width: caps.get(2)?.as_str().to_string(),
    };
    Some((size, caps.get(0)?.end()))
}

/// An image as rendered by the markdown stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub src: String,
    pub alt: String,
    pub title: String,
    pub size: Option<ImageSize>,
}

impl Image {
    pub fn to_html(&self, xhtml_out: bool) -> String {
        let mut html = format!(
            r#"<img src="{}" alt="{}""#,
            html_escape(&self.src),
            html_escape(&self.alt)
        );
        if !self.title.is_empty() {
            html.push_str(&format!(r#" title="{}""#, html_escape(&self.title)));
        }
        if let Some(size) = &self.size {
            html.push_str(&format!(
                r#" height="{}" width="{}""#,
                html_escape(&size.height),
                html_escape(&size.width)
            ));
        }
        html.push_str(if xhtml_out { " />" } else { ">" });
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_data_spans() {
        let spans = find_data_spans("a $[1] b $[max(\"x\")]", &[]);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].range, 2..6);
        assert_eq!(spans[1].expression, "max(\"x\")");
        assert!(find_data_spans("$[]", &[]).is_empty());
        assert!(find_data_spans(r"\$[1]", &[]).is_empty());
        assert!(find_data_spans("`$[1]`", &[0..7]).is_empty());
    }

    #[test]
    fn test_substitute_without_data() {
        assert_eq!(substitute(None, "1"), Substitution::Text(LOADING.to_string()));
        assert_eq!(
            substitute(Some(&EvalEnv::new()), "1 + 1"),
            Substitution::Html("2".to_string())
        );
    }

    #[test]
    fn test_take_image_size() {
        let (size, len) = take_image_size("{height=100, width=200} rest").unwrap();
        assert_eq!(size.height, "100");
        assert_eq!(size.width, "200");
        assert_eq!(len, 23);
        assert!(take_image_size("{width=1, height=2}").is_none());
        assert!(take_image_size(" {height=1,width=2}").is_none());
        assert!(take_image_size("{}").is_none());
    }

    #[test]
    fn test_image_html() {
        let image = Image {
            src: "a.png".to_string(),
            alt: "A \"quoted\" alt".to_string(),
            title: String::new(),
            size: Some(ImageSize {
                height: "10".to_string(),
                width: "20".to_string(),
            }),
        };
        assert_eq!(
            image.to_html(false),
            r#"<img src="a.png" alt="A &quot;quoted&quot; alt" height="10" width="20">"#
        );
        assert!(image.to_html(true).ends_with(" />"));
    }
}
