//! Markdown → standalone HTML document.
//!
//! Used by the local renderer and available to callers who want an HTML
//! export. The template loads MathJax so `$…$` formulas typeset when the
//! page is opened in a browser.

use pulldown_cmark::{html, Options, Parser};

/// Stylesheet shared by the local template and the remote fallback engine,
/// so tables and headings look the same whichever path produced the PDF.
pub const DEFAULT_STYLESHEET: &str = "\
body { font-family: Roboto, sans-serif; margin: 20px; }
table { border-collapse: collapse; width: 100%; margin: 10px 0; }
th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
th { background-color: #f2f2f2; }
code { background-color: #f5f5f5; padding: 2px 4px; border-radius: 4px; }
pre { background-color: #f5f5f5; padding: 10px; border-radius: 4px; }
";

const MATHJAX_CONFIG: &str = r#"<script type="text/x-mathjax-config">
MathJax.Hub.Config({
  tex2jax: {inlineMath: [['$','$'], ['\\(','\\)']], processEscapes: true}
});
</script>
<script type="text/javascript" src="https://cdnjs.cloudflare.com/ajax/libs/mathjax/2.7.7/MathJax.js?config=TeX-AMS-MML_HTMLorMML"></script>"#;

/// Parser options: GFM tables and strikethrough. Fenced code is core CommonMark.
pub(crate) fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
}

/// Convert markdown to an HTML fragment.
pub fn markdown_to_html_fragment(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, markdown_options());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Convert markdown to a complete HTML document styled with `stylesheet`.
pub fn markdown_to_html(markdown: &str, stylesheet: &str) -> String {
    let body = markdown_to_html_fragment(markdown);
    format!(
        "<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n{stylesheet}</style>\n{MATHJAX_CONFIG}\n</head>\n<body>\n{body}</body>\n</html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_render_as_html_tables() {
        let html = markdown_to_html_fragment("| Term | Definition |\n| --- | --- |\n| Atom | Unit |\n");
        assert!(html.contains("<table>"), "got: {html}");
        assert!(html.contains("<th>Term</th>"), "got: {html}");
        assert!(html.contains("<td>Atom</td>"), "got: {html}");
    }

    #[test]
    fn fenced_code_keeps_language() {
        let html = markdown_to_html_fragment("```python\nprint(1)\n```\n");
        assert!(html.contains("<pre><code class=\"language-python\">"), "got: {html}");
    }

    #[test]
    fn document_embeds_stylesheet_and_mathjax() {
        let doc = markdown_to_html("# Hi", "h1 { color: red; }");
        assert!(doc.contains("<h1>Hi</h1>"));
        assert!(doc.contains("h1 { color: red; }"));
        assert!(doc.contains("MathJax.js"));
        assert!(doc.starts_with("<html>"));
    }
}
