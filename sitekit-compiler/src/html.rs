//! HTML text helpers: escaping, comments, URL vetting and the page shell.

/// Escape text content.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape a value for use inside a double-quoted attribute.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// An HTML comment whose body cannot terminate early.
pub fn comment(body: &str) -> String {
    let mut safe = body.replace('>', "&gt;");
    while safe.contains("--") {
        safe = safe.replace("--", "- -");
    }
    format!("<!-- {safe} -->")
}

/// Schemes a published page may link to.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Returns the trimmed URL when it is relative or uses an allowed scheme.
pub fn safe_url(url: &str) -> Option<&str> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    if url.chars().any(|c| c.is_control()) {
        return None;
    }
    match url.find(':') {
        // a colon after the first path/query/fragment delimiter is not a scheme
        Some(colon) if !url[..colon].contains(['/', '?', '#']) => {
            let scheme = url[..colon].to_ascii_lowercase();
            ALLOWED_SCHEMES.contains(&scheme.as_str()).then_some(url)
        }
        _ => Some(url),
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Full document around a rendered page body. Assets are referenced
/// relative to the page directory.
pub fn page_shell(title: &str, body: &str, with_script: bool) -> String {
    let mut html = String::with_capacity(body.len() + 512);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_text(title)));
    html.push_str("<link rel=\"stylesheet\" href=\"styles.css\">\n");
    html.push_str("</head>\n<body>\n");
    html.push_str(body);
    html.push('\n');
    if with_script {
        html.push_str("<script src=\"app.js\" defer></script>\n");
    }
    html.push_str("</body>\n</html>\n");
    html
}
