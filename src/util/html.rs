/// HTML escaping utilities
pub struct HtmlEscape;

impl HtmlEscape {
    /// Escape text placed between tags
    pub fn escape_content(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
    }

    /// Escape attribute values; both quote styles are escaped
    pub fn escape_attribute(text: &str) -> String {
        Self::escape_content(text)
            .replace('"', "&quot;")
            .replace('\'', "&#39;")
    }
}
