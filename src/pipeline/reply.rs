//! Reply bodies.
//!
//! Pure functions of the sorted result list. One result renders inline;
//! several render as a list (`* ` lines in text, `<ol>` in HTML).

use std::fmt::Write as _;

use crate::pipeline::types::ProcessingResult;

/// Plain-text body sent when the message carried no attachments.
pub const NO_ATTACHMENTS_TEXT: &str = "olvidaste los adjuntos!";

/// HTML body sent when the message carried no attachments.
pub const NO_ATTACHMENTS_HTML: &str = "<p>olvidaste los <b>adjuntos</b>!</p>";

const HTML_HEAD: &str = concat!(
    "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" ",
    "\"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">\n",
    "<html>\n",
    "    <head>\n",
    "        <meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\" />\n",
    "        <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\"/>\n",
    "    </head>\n",
    "    <body>\n",
);

const HTML_TAIL: &str = "\n    </body>\n</html>";

/// Rendered reply bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyBody {
    pub text: String,
    pub html: String,
}

impl ReplyBody {
    /// Fixed apology for messages without attachments.
    pub fn no_attachments() -> Self {
        Self {
            text: NO_ATTACHMENTS_TEXT.to_string(),
            html: NO_ATTACHMENTS_HTML.to_string(),
        }
    }
}

/// Render both bodies from results already sorted by name.
pub fn compose(results: &[ProcessingResult]) -> ReplyBody {
    ReplyBody {
        text: render_text(results),
        html: render_html(results),
    }
}

pub fn render_text(results: &[ProcessingResult]) -> String {
    if let [single] = results {
        return text_line(single);
    }
    let mut out = String::new();
    for result in results {
        let _ = writeln!(out, "* {}", text_line(result));
    }
    out
}

pub fn render_html(results: &[ProcessingResult]) -> String {
    let mut out = String::from(HTML_HEAD);
    if let [single] = results {
        let _ = write!(out, "<p>{}</p>", html_line(single));
    } else {
        out.push_str("<ol>\n");
        for result in results {
            let _ = writeln!(out, "<li>{}</li>", html_line(result));
        }
        out.push_str("</ol>");
    }
    out.push_str(HTML_TAIL);
    out
}

fn text_line(result: &ProcessingResult) -> String {
    match &result.outcome {
        Ok(urls) => format!(
            "{} quedó en {}. El QR está en {}.",
            result.attachment_name, urls.attachment_url, urls.qr_image_url
        ),
        Err(e) => format!(
            "No pude generar el código QR de {}: {e}",
            result.attachment_name
        ),
    }
}

fn html_line(result: &ProcessingResult) -> String {
    let name = escape_html(&result.attachment_name);
    match &result.outcome {
        Ok(urls) => format!(
            "<a href=\"{}\">{name}</a>: <a href=\"{}\">código QR</a>.",
            escape_html(&urls.attachment_url),
            escape_html(&urls.qr_image_url),
        ),
        Err(e) => format!(
            "No pude generar el código QR de {name}: {}",
            escape_html(&e.to_string())
        ),
    }
}

/// Escape text for HTML element content and quoted attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RenderError, UnitError};
    use crate::pipeline::types::PublishedUrls;

    fn ok(name: &str, key: &str) -> ProcessingResult {
        ProcessingResult::published(
            name,
            PublishedUrls {
                attachment_url: format!("http://qr.mydomain.com/{key}"),
                qr_image_url: format!("http://qr.mydomain.com/{key}.qr.png"),
            },
        )
    }

    fn failed(name: &str) -> ProcessingResult {
        ProcessingResult::failed(
            name,
            UnitError::Render(RenderError::Task("disk full".into())),
        )
    }

    #[test]
    fn single_result_is_inline() {
        let body = compose(&[ok(
            "historia-social-el-circo.pdf",
            "historia-social-el-circo.pdf",
        )]);
        assert_eq!(
            body.text,
            "historia-social-el-circo.pdf quedó en http://qr.mydomain.com/historia-social-el-circo.pdf. \
             El QR está en http://qr.mydomain.com/historia-social-el-circo.pdf.qr.png."
        );
        let expected_html = format!(
            "{HTML_HEAD}<p><a href=\"http://qr.mydomain.com/historia-social-el-circo.pdf\">historia-social-el-circo.pdf</a>: \
             <a href=\"http://qr.mydomain.com/historia-social-el-circo.pdf.qr.png\">código QR</a>.</p>{HTML_TAIL}"
        );
        assert_eq!(body.html, expected_html);
    }

    #[test]
    fn multiple_results_render_as_lists() {
        let body = compose(&[
            ok("a text file", "a-text-file"),
            ok("toos-leen.jpeg", "toos-leen.jpeg"),
        ]);
        assert_eq!(
            body.text,
            "* a text file quedó en http://qr.mydomain.com/a-text-file. El QR está en http://qr.mydomain.com/a-text-file.qr.png.\n\
             * toos-leen.jpeg quedó en http://qr.mydomain.com/toos-leen.jpeg. El QR está en http://qr.mydomain.com/toos-leen.jpeg.qr.png.\n"
        );
        assert!(body.html.contains("<ol>\n<li><a href=\"http://qr.mydomain.com/a-text-file\">a text file</a>"));
        assert!(body.html.ends_with("</li>\n</ol>\n    </body>\n</html>"));
        assert_eq!(body.html.matches("<li>").count(), 2);
    }

    #[test]
    fn failures_show_error_text_without_links() {
        let body = compose(&[failed("broken.pdf"), ok("fine.pdf", "fine.pdf")]);
        assert!(body.text.starts_with("* No pude generar el código QR de broken.pdf: "));
        assert!(body.text.contains("disk full"));
        assert!(body.html.contains("<li>No pude generar el código QR de broken.pdf: "));
        assert!(!body.html.contains("broken.pdf.qr.png"));
    }

    #[test]
    fn html_is_a_complete_document() {
        let html = render_html(&[ok("x", "x")]);
        assert!(html.starts_with("<!DOCTYPE html"));
        assert!(html.contains("<meta http-equiv=\"Content-Type\""));
        assert!(html.contains("name=\"viewport\""));
        assert!(html.contains("<body>"));
        assert!(html.ends_with("</html>"));
    }

    #[test]
    fn html_escapes_names() {
        let html = render_html(&[failed("<script>&.pdf")]);
        assert!(html.contains("&lt;script&gt;&amp;.pdf"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn no_attachment_bodies_are_fixed() {
        let body = ReplyBody::no_attachments();
        assert_eq!(body.text, "olvidaste los adjuntos!");
        assert_eq!(body.html, "<p>olvidaste los <b>adjuntos</b>!</p>");
    }
}
