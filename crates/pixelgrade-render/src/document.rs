//! Self-contained page documents for rendering.
//!
//! Each code triple becomes one HTML document: a box-model reset, the CSS
//! inlined in `<head>`, the HTML as the body, and the JS wrapped so that an
//! exception is recorded on `window` instead of aborting the page.

use pixelgrade_core::model::CodeTriple;

/// Global the wrapped script stores an uncaught error message in.
pub const SCRIPT_ERROR_GLOBAL: &str = "__pixelgradeScriptError";

const RESET_CSS: &str = "*, *::before, *::after { box-sizing: border-box; }
html, body { margin: 0; padding: 0; }
body { background: #fff; }";

/// Build the document rendered for `code`.
pub fn build_document(code: &CodeTriple) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<style>
{RESET_CSS}
</style>
<style>
{css}
</style>
<script>
window.{SCRIPT_ERROR_GLOBAL} = null;
window.addEventListener("error", function (e) {{
  if (window.{SCRIPT_ERROR_GLOBAL} === null) {{
    window.{SCRIPT_ERROR_GLOBAL} = String(e.message);
  }}
}});
</script>
</head>
<body>
{html}
<script>
try {{
{js}
}} catch (e) {{
  window.{SCRIPT_ERROR_GLOBAL} = String(e && e.message ? e.message : e);
}}
</script>
</body>
</html>
"#,
        css = escape_closing_tag(&code.css, "style"),
        html = code.html,
        js = escape_closing_tag(&code.js, "script"),
    )
}

/// Keep embedded source from closing its own element early.
fn escape_closing_tag(source: &str, tag: &str) -> String {
    let needle = format!("</{tag}");
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(pos) = find_ignore_case(rest, &needle) {
        out.push_str(&rest[..pos]);
        out.push_str("<\\/");
        out.push_str(&rest[pos + 2..pos + needle.len()]);
        rest = &rest[pos + needle.len()..];
    }
    out.push_str(rest);
    out
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_contains_every_part() {
        let code = CodeTriple::new(
            r#"<h1 class="title">Hi</h1>"#,
            ".title { color: red; }",
            "document.title = 'x';",
        );
        let doc = build_document(&code);
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("box-sizing: border-box"));
        assert!(doc.contains(".title { color: red; }"));
        assert!(doc.contains(r#"<body>
<h1 class="title">Hi</h1>"#));
        assert!(doc.contains("try {\ndocument.title = 'x';\n} catch (e)"));
        assert!(doc.contains(SCRIPT_ERROR_GLOBAL));
    }

    #[test]
    fn css_comes_after_reset() {
        let doc = build_document(&CodeTriple::new("", "body { margin: 8px; }", ""));
        let reset = doc.find("box-sizing").unwrap();
        let user = doc.find("margin: 8px").unwrap();
        assert!(reset < user);
    }

    #[test]
    fn embedded_closing_tags_are_escaped() {
        let code = CodeTriple::new("", "", r#"var s = "</script><b>";"#);
        let doc = build_document(&code);
        assert!(doc.contains(r#"var s = "<\/script><b>";"#));
        assert_eq!(doc.matches("</script>").count(), 2);

        assert_eq!(escape_closing_tag("a</STYLE>b", "style"), "a<\\/STYLE>b");
        assert_eq!(escape_closing_tag("plain", "style"), "plain");
    }
}
