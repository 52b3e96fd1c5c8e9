use serde::{Deserialize, Serialize};

/// Site-wide design tokens applied by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Theme {
    pub primary_color: String,
    pub secondary_color: String,
    pub background_color: String,
    pub text_color: String,
    pub font_family: String,
    pub heading_font_family: String,
    /// CSS length, e.g. `8px`.
    pub border_radius: String,
    /// Content column width, e.g. `1200px`.
    pub max_width: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_color: "#2563eb".to_string(),
            secondary_color: "#7c3aed".to_string(),
            background_color: "#ffffff".to_string(),
            text_color: "#111827".to_string(),
            font_family: "system-ui, sans-serif".to_string(),
            heading_font_family: "system-ui, sans-serif".to_string(),
            border_radius: "8px".to_string(),
            max_width: "1200px".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_theme_fills_defaults() {
        let theme: Theme = serde_json::from_str(r##"{"primaryColor":"#ff0000"}"##).unwrap();
        assert_eq!(theme.primary_color, "#ff0000");
        assert_eq!(theme.max_width, Theme::default().max_width);
    }
}
