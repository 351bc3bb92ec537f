use std::sync::Arc;

use crate::builtins::make_eval_env;
use crate::config::RendererOptions;
use crate::error::{ErrorKind, RenderError};
use crate::interpreter::{safe_eval, EvalEnv};
use crate::renderer::{MarkdownRenderer, EXAMPLE_CONTENT, EXAMPLE_USER_DATA};
use crate::report::ReportData;
use crate::template::{CompileCache, CompiledTemplate, TemplateCache};
use crate::time_range::TimeRange;

// ── Shared fixture runners ──────────────────────────────────────────

/// Embed fixture files at compile time.
const EVAL_FIXTURES: &str = include_str!("../test-data/fixtures/eval.json");

fn error_kind(name: &str) -> ErrorKind {
    match name {
        "Syntax" => ErrorKind::Syntax,
        "Reference" => ErrorKind::Reference,
        "Type" => ErrorKind::Type,
        "Runtime" => ErrorKind::Runtime,
        other => panic!("unknown error kind in fixture: {}", other),
    }
}

fn time_range() -> TimeRange {
    TimeRange::parse_rfc3339("2021-03-22T12:30:00Z", "2021-03-22T18:30:00Z").unwrap()
}

fn fixture_env() -> EvalEnv {
    make_eval_env(Arc::new(ReportData::default()), Arc::new(time_range()))
}

#[test]
fn test_fixture_eval() {
    let fixtures: Vec<serde_json::Value> = serde_json::from_str(EVAL_FIXTURES).unwrap();
    let env = fixture_env();

    for fixture in &fixtures {
        let name = fixture["name"].as_str().unwrap();
        let input = fixture["input"].as_str().unwrap();
        let result = safe_eval(&env, input);

        if let Some(kind) = fixture.get("error").and_then(|v| v.as_str()) {
            let err = match result {
                Ok(value) => panic!("Fixture '{}': expected an error, got {:?}", name, value),
                Err(err) => err,
            };
            assert_eq!(err.kind(), error_kind(kind), "Fixture '{}': {}", name, err);
            if let Some(message) = fixture.get("message").and_then(|v| v.as_str()) {
                assert!(
                    err.to_string().contains(message),
                    "Fixture '{}': {:?} does not mention {:?}",
                    name,
                    err.to_string(),
                    message
                );
            }
        } else {
            let expected = fixture["expected"].as_str().unwrap();
            match result {
                Ok(value) => assert_eq!(value.to_string(), expected, "Fixture '{}'", name),
                Err(err) => panic!("Fixture '{}': unexpected error: {}", name, err),
            }
        }
    }
}

// ── Renderer ────────────────────────────────────────────────────────

fn wrapped(s: &str) -> String {
    format!("<p>{}</p>\n", s)
}

fn err_wrapped(s: &str) -> String {
    wrapped(&format!(r#"<span style="color:red">{}</span>"#, s))
}

fn renderer() -> MarkdownRenderer {
    MarkdownRenderer::new(RendererOptions::default())
}

fn data(json: &str) -> ReportData {
    ReportData::from_json(json).unwrap()
}

#[test]
fn test_data_spans_render_values_as_markup() {
    let mr = renderer();
    let empty = ReportData::default();
    assert_eq!(mr.render("$[1]", &empty, &time_range()), wrapped("1"));
    assert_eq!(mr.render(r#"$["1"]"#, &empty, &time_range()), wrapped("1"));
    assert_eq!(
        mr.render(r#"$["<span>hi</span>"]"#, &empty, &time_range()),
        wrapped("<span>hi</span>")
    );
}

#[test]
fn test_data_span_errors() {
    let mr = renderer();
    let empty = ReportData::default();
    let html = mr.render("$[some invalid syntax]", &empty, &time_range());
    assert!(html.starts_with(r#"<p><span style="color:red">"#), "{}", html);
    assert!(html.contains("Unexpected identifier"), "{}", html);

    assert_eq!(
        mr.render(r#"$[max("<>")]"#, &empty, &time_range()),
        err_wrapped("TypeError: argument 1 to max is ill-typed: no series named &lt;&gt;")
    );
}

#[test]
fn test_variables_are_always_escaped() {
    let mr = renderer();
    let data = data(r#"{"myVar": "<script>alert(\"haha!\")</script>"}"#);
    let templates = [
        "{{myVar}}",
        "{{{myVar}}}",
        "{{{{myVar}}}}",
        "{{&myVar}}",
        "{{~&myVar}}",
        "{{~{myVar}~}}",
        "{{{~myVar~}}}",
        "{{{ myVar }}}",
    ];
    for template in templates {
        let html = mr.render(template, &data, &time_range());
        assert!(!html.contains("<script>"), "{}: {}", template, html);
        assert!(html.contains("&lt;script&gt;"), "{}: {}", template, html);
    }
}

#[test]
fn test_eval_helper() {
    let mr = renderer();
    let empty = ReportData::default();
    assert_eq!(mr.render(r#"{{eval "1+1"}}"#, &empty, &time_range()), wrapped("2"));
    assert_eq!(
        mr.render("{{#eval}} 1 + 1 {{/eval}}", &empty, &time_range()),
        wrapped("2")
    );
    let html = mr.render(r#"{{eval "1 ^ 1"}}"#, &empty, &time_range());
    assert!(html.contains("is not whitelisted"), "{}", html);
}

#[test]
fn test_function_helpers_inline_and_block() {
    let mr = renderer();
    let empty = ReportData::default();
    assert_eq!(
        mr.render(r#"{{join ", " "foo" "bar" 1 2}}"#, &empty, &time_range()),
        wrapped("foo, bar, 1, 2")
    );
    assert_eq!(
        mr.render(
            r#"{{#join "-" "foo" "bar" as |str|}}{{str}}{{/join}}"#,
            &empty,
            &time_range()
        ),
        wrapped("foo-bar")
    );
    assert_eq!(
        mr.render(r#"{{toFixed 3.14159 2}}"#, &empty, &time_range()),
        wrapped("3.14")
    );
}

#[test]
fn test_function_helpers_read_the_snapshot() {
    let mr = renderer();
    let data = data(r#"{"series": {"A": {"stats": {"max": 1234.5}}}}"#);
    assert_eq!(
        mr.render(
            r#"{{#max "A" as |m|}}{{toFixed m 1}}{{/max}}"#,
            &data,
            &time_range()
        ),
        wrapped("1234.5")
    );
    assert_eq!(
        mr.render(r#"{{startDate "YYYY-MM-DD HH:mm"}}"#, &data, &time_range()),
        wrapped("2021-03-22 12:30")
    );
}

#[test]
fn test_order_by_is_block_only() {
    let html = renderer().render("{{orderBy series}}", &ReportData::default(), &time_range());
    assert!(
        html.contains("`orderBy` can only be used as a block helper"),
        "{}",
        html
    );
}

#[test]
fn test_order_by() {
    let mr = renderer();
    let data = data(
        r#"{"series": {
            "a": {"name": "a4", "val": 4},
            "b": {"name": "b2", "val": 2},
            "c": {"name": "a3", "val": 3}
        }}"#,
    );
    let cases = [
        (
            r#"{{#orderBy series "val"}}{{#each this}}{{name}} {{/each}}{{/orderBy}}"#,
            "b2 a3 a4",
        ),
        (
            r#"{{#orderBy series "val" "desc"}}{{#each this}}{{name}} {{/each}}{{/orderBy}}"#,
            "a4 a3 b2",
        ),
        (
            r#"{{#orderBy series "val" "desc" as |sorted|}}{{#each sorted}}{{name}} {{/each}}{{/orderBy}}"#,
            "a4 a3 b2",
        ),
        (
            r#"{{#orderBy series "name" "asc" "val" "asc"}}{{#each this}}{{name}} {{/each}}{{/orderBy}}"#,
            "a3 a4 b2",
        ),
    ];
    for (template, expected) in cases {
        let html = mr.render(template, &data, &time_range());
        assert!(html.contains(expected), "{}: {}", template, html);
    }

    // The snapshot itself is left in its original order.
    let html = mr.render(
        "{{#each series}}{{name}} {{/each}}",
        &data,
        &time_range(),
    );
    assert!(html.contains("a4 b2 a3"), "{}", html);
}

#[test]
fn test_objects_iterate_in_host_order() {
    let mr = renderer();
    let data = data(
        r#"{"series": {
            "zeta": {"name": "z", "val": 1},
            "alpha": {"name": "a", "val": 1},
            "mid": {"name": "m", "val": 0}
        }}"#,
    );
    let html = mr.render("{{#each series}}{{@key}} {{/each}}", &data, &time_range());
    assert!(html.contains("zeta alpha mid"), "{}", html);

    // Ties keep their incoming order.
    let html = mr.render(
        r#"{{#orderBy series "val"}}{{#each this}}{{name}} {{/each}}{{/orderBy}}"#,
        &data,
        &time_range(),
    );
    assert!(html.contains("m z a"), "{}", html);
}

// ── Cache ───────────────────────────────────────────────────────────

#[test]
fn test_template_comes_from_the_cache_when_inputs_match() {
    let options = RendererOptions::default();
    let data = ReportData::default();
    let range = time_range();

    let cache = Arc::new(TemplateCache::new());
    let sentinel = CompiledTemplate::compile("from the cache", Arc::new(EvalEnv::new())).unwrap();
    cache.prime("same", &data, &range, &options.limits, sentinel);

    let mr = MarkdownRenderer::with_cache(options, cache.clone());
    assert_eq!(mr.render("same", &data, &range), wrapped("from the cache"));
    // Different content misses and replaces the entry.
    assert_eq!(mr.render("other", &data, &range), wrapped("other"));
    assert_eq!(mr.render("same", &data, &range), wrapped("same"));
}

#[test]
fn test_cache_reuses_and_invalidates() {
    let cache = TemplateCache::new();
    let limits = RendererOptions::default().limits;
    let range = time_range();
    let first = data(r#"{"series": {"A": {"stats": {"max": 1}}}}"#);
    let second = data(r#"{"series": {"A": {"stats": {"max": 2}}}}"#);

    let a = cache.compile("$[max('A')]", &first, &range, &limits).unwrap();
    let b = cache.compile("$[max('A')]", &first.clone(), &range, &limits).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let c = cache.compile("$[max('A')]", &second, &range, &limits).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));

    let later = TimeRange::parse_rfc3339("2021-03-22T12:30:00Z", "2021-03-22T19:30:00Z").unwrap();
    let d = cache.compile("$[max('A')]", &second, &later, &limits).unwrap();
    assert!(!Arc::ptr_eq(&c, &d));

    cache.reset();
    assert!(cache.is_empty());
}

#[test]
fn test_fresh_data_reaches_data_spans() {
    let mr = renderer();
    let first = data(r#"{"series": {"A": {"stats": {"max": 1}}}}"#);
    let second = data(r#"{"series": {"A": {"stats": {"max": 2}}}}"#);
    assert_eq!(mr.render("$[max('A')]", &first, &time_range()), wrapped("1"));
    assert_eq!(mr.render("$[max('A')]", &second, &time_range()), wrapped("2"));
}

// ── Failure paths ───────────────────────────────────────────────────

#[test]
fn test_broken_template_falls_back_to_raw_content() {
    let mr = renderer();
    let data = data(r#"{"series": {"A": {"stats": {"max": 7}}}}"#);
    let content = "{{#each series}}\n\n$[max('A')]";

    let err = mr.try_render(content, &data, &time_range()).unwrap_err();
    assert!(matches!(err, RenderError::Compile(_)));

    let html = mr.render(content, &data, &time_range());
    assert!(html.contains("<p>7</p>"), "{}", html);
}

#[test]
fn test_render_pending_shows_loading() {
    let html = renderer().render_pending("# Title\n\nMax: $[max('A')]");
    assert_eq!(html, "<h1>Title</h1>\n<p>Max: (Loading...)</p>\n");
}

#[test]
fn test_expression_limits_apply_to_data_spans() {
    let mut options = RendererOptions::default();
    options.limits.max_source_len = 8;
    let mr = MarkdownRenderer::new(options);
    let html = mr.render("$[1 + 2 + 3 + 4]", &ReportData::default(), &time_range());
    assert!(html.contains("longer than 8 bytes"), "{}", html);
}

// ── Starter report ──────────────────────────────────────────────────

#[test]
fn test_example_content_renders() {
    let user_data: serde_json::Value = serde_json::from_str(EXAMPLE_USER_DATA).unwrap();
    let stats = |max: f64, min: f64| {
        serde_json::json!({"stats": {
            "max": max, "min": min, "avg": (max + min) / 2.0,
            "val": max, "first": min, "current": max
        }})
    };
    let snapshot = serde_json::json!({
        "series": {
            "A-series": stats(90.0, 10.0),
            "B-series": stats(60.0, 40.0),
            "C-series": stats(30.0, 1.0),
        },
        "userData": user_data,
    });
    let data: ReportData = serde_json::from_value(snapshot).unwrap();

    let html = renderer().render(EXAMPLE_CONTENT, &data, &time_range());
    assert!(html.contains("<table>"), "{}", html);
    assert!(html.contains(r#"<span class="green">90.00</span>"#), "{}", html);
    assert!(html.contains(r#"<span class="red">10.00</span>"#), "{}", html);
    assert!(html.contains("<h2>Sample Markdown"), "{}", html);
    // Only the illustrative `$[<safe js code here>]` in the intro fails.
    assert_eq!(html.matches("color:red").count(), 1, "{}", html);
}
