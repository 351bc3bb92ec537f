use std::ops::Range;

use linkify::{LinkFinder, LinkKind};
use pulldown_cmark::html::push_html;
use pulldown_cmark::{CowStr, Event, LinkType, Options, Parser, Tag, TagEnd};
use tracing::trace;

use crate::config::RendererOptions;
use crate::interpreter::EvalEnv;
use crate::rules::{find_data_spans, substitute, take_image_size, DataSpan, Image, Substitution};

// Data spans are swapped for these markers before parsing so that the
// expression text never goes through markdown inline parsing.
const PLACEHOLDER_OPEN: char = '\u{E000}';
const PLACEHOLDER_CLOSE: char = '\u{E001}';

/// The markdown stage: CommonMark plus the data and image-size rules.
#[derive(Debug, Clone)]
pub struct Markdown {
    options: Options,
    html: bool,
    linkify: bool,
    xhtml_out: bool,
}

impl Markdown {
    pub fn new(options: &RendererOptions) -> Self {
        Markdown {
            options: options.markdown_options(),
            html: options.html,
            linkify: options.linkify,
            xhtml_out: options.xhtml_out,
        }
    }

    /// Render `source` to HTML, evaluating data spans against `env`, or
    /// showing loading placeholders when there is no environment yet.
    pub fn render(&self, source: &str, env: Option<&EvalEnv>) -> String {
        let spans = find_data_spans(source, &self.excluded_ranges(source));
        trace!(spans = spans.len(), "rendering markdown");
        let substitutions: Vec<Substitution> = spans
            .iter()
            .map(|span| substitute(env, &span.expression))
            .collect();
        let prepared = with_placeholders(source, &spans);

        let events = Parser::new_ext(&prepared, self.options).map(|event| self.filter_html(event));
        let events = self.rewrite(merge_text(events), &substitutions);

        let mut html = String::with_capacity(source.len() * 3 / 2);
        push_html(&mut html, events.into_iter());
        html
    }

    /// Code spans, code blocks and HTML blocks, where data spans are not
    /// recognised.
    fn excluded_ranges(&self, source: &str) -> Vec<Range<usize>> {
        Parser::new_ext(source, self.options)
            .into_offset_iter()
            .filter_map(|(event, range)| match event {
                Event::Start(Tag::CodeBlock(_)) | Event::Start(Tag::HtmlBlock) | Event::Code(_) => {
                    Some(range)
                }
                _ => None,
            })
            .collect()
    }

    fn filter_html<'a>(&self, event: Event<'a>) -> Event<'a> {
        match event {
            Event::Html(html) | Event::InlineHtml(html) if !self.html => Event::Text(html),
            other => other,
        }
    }

    fn rewrite<'a>(&self, events: Vec<Event<'a>>, subs: &[Substitution]) -> Vec<Event<'a>> {
        let finder = self.linkify.then(LinkFinder::new);
        // Text already inside a link or code is never linkified.
        let mut links = 0usize;
        let mut html_links = 0usize;
        let mut code_blocks = 0usize;

        let mut out = Vec::with_capacity(events.len());
        let mut iter = events.into_iter().peekable();

        while let Some(event) = iter.next() {
            let linker = finder
                .as_ref()
                .filter(|_| links == 0 && html_links == 0 && code_blocks == 0);
            match event {
                Event::Start(Tag::Image {
                    dest_url, title, ..
                }) => {
                    let mut image = Image {
                        src: flatten(&dest_url, subs),
                        alt: collect_alt(&mut iter, subs),
                        title: flatten(&title, subs),
                        size: None,
                    };
                    let annotated = match iter.peek() {
                        Some(Event::Text(text)) => take_image_size(text)
                            .map(|(size, len)| (size, text[len..].to_string())),
                        _ => None,
                    };
                    match annotated {
                        Some((size, rest)) => {
                            iter.next();
                            image.size = Some(size);
                            out.push(Event::InlineHtml(image.to_html(self.xhtml_out).into()));
                            push_text(&mut out, &rest, subs, linker);
                        }
                        None => out.push(Event::InlineHtml(image.to_html(self.xhtml_out).into())),
                    }
                }
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    links += 1;
                    out.push(Event::Start(Tag::Link {
                        link_type,
                        dest_url: flatten(&dest_url, subs).into(),
                        title: flatten(&title, subs).into(),
                        id,
                    }))
                }
                Event::End(TagEnd::Link) => {
                    links = links.saturating_sub(1);
                    out.push(Event::End(TagEnd::Link));
                }
                Event::Start(Tag::CodeBlock(kind)) => {
                    code_blocks += 1;
                    out.push(Event::Start(Tag::CodeBlock(kind)));
                }
                Event::End(TagEnd::CodeBlock) => {
                    code_blocks = code_blocks.saturating_sub(1);
                    out.push(Event::End(TagEnd::CodeBlock));
                }
                Event::Text(text) => push_text(&mut out, &text, subs, linker),
                Event::Html(html) => out.push(Event::Html(flatten(&html, subs).into())),
                Event::InlineHtml(html) => {
                    let html = flatten(&html, subs);
                    match anchor_tag(&html) {
                        Some(true) => html_links += 1,
                        Some(false) => html_links = html_links.saturating_sub(1),
                        None => {}
                    }
                    out.push(Event::InlineHtml(html.into()));
                }
                other => out.push(other),
            }
        }
        out
    }
}

/// `Some(true)` for an opening `<a ...>` tag, `Some(false)` for `</a>`.
fn anchor_tag(html: &str) -> Option<bool> {
    let lower = html.trim_start().to_ascii_lowercase();
    if lower.starts_with("</a>") || lower.starts_with("</a ") {
        Some(false)
    } else if lower.starts_with("<a>") || lower.starts_with("<a ") {
        Some(true)
    } else {
        None
    }
}

fn with_placeholders(source: &str, spans: &[DataSpan]) -> String {
    let mut prepared = String::with_capacity(source.len());
    let mut copied = 0;
    for (i, span) in spans.iter().enumerate() {
        prepared.push_str(&source[copied..span.range.start]);
        prepared.push(PLACEHOLDER_OPEN);
        prepared.push_str(&i.to_string());
        prepared.push(PLACEHOLDER_CLOSE);
        copied = span.range.end;
    }
    prepared.push_str(&source[copied..]);
    prepared
}

/// Join runs of text events; the parser splits text at characters that
/// might have started other syntax.
fn merge_text<'a>(events: impl Iterator<Item = Event<'a>>) -> Vec<Event<'a>> {
    let mut merged: Vec<Event<'a>> = Vec::new();
    for event in events {
        if let Event::Text(text) = &event {
            if let Some(Event::Text(previous)) = merged.last_mut() {
                let mut joined = previous.to_string();
                joined.push_str(text);
                *previous = CowStr::from(joined);
                continue;
            }
        }
        merged.push(event);
    }
    merged
}

/// Alt text of an image whose start tag was just consumed, up to and
/// including its end tag.
fn collect_alt<'a>(events: impl Iterator<Item = Event<'a>>, subs: &[Substitution]) -> String {
    let mut alt = String::new();
    let mut depth = 1;
    for event in events {
        match event {
            Event::Start(Tag::Image { .. }) => depth += 1,
            Event::End(TagEnd::Image) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Text(text) | Event::Code(text) => alt.push_str(&flatten(&text, subs)),
            Event::SoftBreak | Event::HardBreak => alt.push(' '),
            _ => {}
        }
    }
    alt
}

enum Piece<'t> {
    Literal(&'t str),
    Substitution(usize),
}

fn split_placeholders(text: &str, count: usize) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
        let after = &rest[start + PLACEHOLDER_OPEN.len_utf8()..];
        let Some(end) = after.find(PLACEHOLDER_CLOSE) else {
            break;
        };
        match after[..end].parse::<usize>() {
            Ok(index) if index < count => {
                if start > 0 {
                    pieces.push(Piece::Literal(&rest[..start]));
                }
                pieces.push(Piece::Substitution(index));
                rest = &after[end + PLACEHOLDER_CLOSE.len_utf8()..];
            }
            _ => {
                let keep = start + PLACEHOLDER_OPEN.len_utf8();
                pieces.push(Piece::Literal(&rest[..keep]));
                rest = &rest[keep..];
            }
        }
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    pieces
}

/// Text with substitutions spliced in as raw strings, for places that
/// are already markup or attributes.
fn flatten(text: &str, subs: &[Substitution]) -> String {
    if !text.contains(PLACEHOLDER_OPEN) {
        return text.to_string();
    }
    split_placeholders(text, subs.len())
        .into_iter()
        .map(|piece| match piece {
            Piece::Literal(s) => s,
            Piece::Substitution(i) => match &subs[i] {
                Substitution::Html(s) | Substitution::Text(s) => s.as_str(),
            },
        })
        .collect()
}

/// Emit a text event with any substitutions as their own events. With a
/// `linker`, bare URLs and email addresses in the literal parts become
/// links.
fn push_text<'a>(
    out: &mut Vec<Event<'a>>,
    text: &str,
    subs: &[Substitution],
    linker: Option<&LinkFinder>,
) {
    for piece in split_placeholders(text, subs.len()) {
        match piece {
            Piece::Literal(s) => match linker {
                Some(finder) => push_linked(out, s, finder),
                None => out.push(Event::Text(CowStr::from(s.to_string()))),
            },
            Piece::Substitution(i) => match &subs[i] {
                Substitution::Html(html) => out.push(Event::InlineHtml(html.clone().into())),
                Substitution::Text(text) => out.push(Event::Text(text.clone().into())),
            },
        }
    }
}

fn push_linked<'a>(out: &mut Vec<Event<'a>>, text: &str, finder: &LinkFinder) {
    for span in finder.spans(text) {
        let s = span.as_str();
        // The HTML writer adds `mailto:` to email links itself.
        let link_type = match span.kind() {
            Some(LinkKind::Email) => LinkType::Email,
            Some(_) => LinkType::Autolink,
            None => {
                out.push(Event::Text(CowStr::from(s.to_string())));
                continue;
            }
        };
        out.push(Event::Start(Tag::Link {
            link_type,
            dest_url: CowStr::from(s.to_string()),
            title: CowStr::Borrowed(""),
            id: CowStr::Borrowed(""),
        }));
        out.push(Event::Text(CowStr::from(s.to_string())));
        out.push(Event::End(TagEnd::Link));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markdown() -> Markdown {
        Markdown::new(&RendererOptions::default())
    }

    #[test]
    fn test_data_spans_in_paragraphs_and_code() {
        let env = EvalEnv::new();
        assert_eq!(markdown().render("$[1 + 1]", Some(&env)), "<p>2</p>\n");
        assert_eq!(
            markdown().render("`$[1]` and $[2]", Some(&env)),
            "<p><code>$[1]</code> and 2</p>\n"
        );
        let fenced = markdown().render("```\n$[1]\n```\n", Some(&env));
        assert_eq!(fenced, "<pre><code>$[1]\n</code></pre>\n");
    }

    #[test]
    fn test_expression_text_skips_inline_markdown() {
        // `*` would otherwise open emphasis.
        let env = EvalEnv::new();
        assert_eq!(markdown().render("*a* $[2 * 3 * 4]", Some(&env)), "<p><em>a</em> 24</p>\n");
    }

    #[test]
    fn test_loading_placeholder() {
        assert_eq!(markdown().render("Value: $[max('A')]", None), "<p>Value: (Loading...)</p>\n");
    }

    #[test]
    fn test_image_size_annotation() {
        let html = markdown().render("![logo](a.png \"Logo\"){height=10, width=20} after", None);
        assert_eq!(
            html,
            "<p><img src=\"a.png\" alt=\"logo\" title=\"Logo\" height=\"10\" width=\"20\"> after</p>\n"
        );
        let plain = markdown().render("![logo](a.png)", None);
        assert_eq!(plain, "<p><img src=\"a.png\" alt=\"logo\"></p>\n");
    }

    #[test]
    fn test_raw_html_can_be_disabled() {
        let options = RendererOptions {
            html: false,
            ..RendererOptions::default()
        };
        let html = Markdown::new(&options).render("a <b>bold</b> $['<i>x</i>']", Some(&EvalEnv::new()));
        assert_eq!(html, "<p>a &lt;b&gt;bold&lt;/b&gt; <i>x</i></p>\n");
    }

    #[test]
    fn test_bare_urls_and_emails_become_links() {
        let html = markdown().render(
            "Docs at https://example.com/a?b=1 or mail ops@example.com.",
            None,
        );
        assert_eq!(
            html,
            "<p>Docs at <a href=\"https://example.com/a?b=1\">https://example.com/a?b=1</a> \
             or mail <a href=\"mailto:ops@example.com\">ops@example.com</a>.</p>\n"
        );
    }

    #[test]
    fn test_linkify_leaves_links_and_code_alone() {
        let md = markdown();
        assert_eq!(
            md.render("[https://a.example](https://b.example)", None),
            "<p><a href=\"https://b.example\">https://a.example</a></p>\n"
        );
        assert_eq!(
            md.render("`https://a.example`", None),
            "<p><code>https://a.example</code></p>\n"
        );
        assert_eq!(
            md.render("```\nhttps://a.example\n```\n", None),
            "<pre><code>https://a.example\n</code></pre>\n"
        );
        assert_eq!(
            md.render("<a href=\"x\">https://a.example</a>", None),
            "<p><a href=\"x\">https://a.example</a></p>\n"
        );
    }

    #[test]
    fn test_linkify_can_be_disabled() {
        let options = RendererOptions {
            linkify: false,
            ..RendererOptions::default()
        };
        let html = Markdown::new(&options).render("see https://example.com", None);
        assert_eq!(html, "<p>see https://example.com</p>\n");
    }

    #[test]
    fn test_split_placeholders_ignores_foreign_markers() {
        let text = format!("a{}9{}b", PLACEHOLDER_OPEN, PLACEHOLDER_CLOSE);
        assert_eq!(flatten(&text, &[]), text);
    }
}
