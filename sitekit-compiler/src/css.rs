//! Stylesheet generation.
//!
//! Each block's `style` map becomes one rule on its `.sk-b-<id>` class.
//! Property names arrive camelCase from the editor and are emitted in
//! kebab-case; bare numbers get `px` unless the property is unitless.
//! Values that could break out of a declaration are dropped.

use serde_json::Value;
use sitekit_core::{Block, BlockId, Theme};

/// Properties whose numeric values carry no unit.
const UNITLESS: &[&str] = &[
    "flex",
    "flex-grow",
    "flex-shrink",
    "font-weight",
    "line-height",
    "opacity",
    "order",
    "z-index",
    "zoom",
    "grid-row",
    "grid-column",
    "column-count",
    "aspect-ratio",
];

/// Substrings that never belong in a published declaration.
const FORBIDDEN: &[&str] = &["expression(", "javascript:", "@import", "</"];

/// Prefix for per-block classes. No kind or helper class starts with it.
pub const BLOCK_CLASS_PREFIX: &str = "sk-b-";

/// Class name for a block. ASCII letters, digits and `-` pass through;
/// every other byte becomes `_` plus two hex digits, so distinct ids never
/// share a class.
pub fn class_name(id: &BlockId) -> String {
    let mut out = String::with_capacity(BLOCK_CLASS_PREFIX.len() + id.as_str().len());
    out.push_str(BLOCK_CLASS_PREFIX);
    for byte in id.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("_{byte:02x}"));
        }
    }
    out
}

/// `backgroundColor` -> `background-color`. Vendor prefixes (`WebkitX`)
/// gain their leading dash.
pub fn kebab_case(property: &str) -> String {
    let mut out = String::with_capacity(property.len() + 4);
    for ch in property.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn is_valid_property(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !name.trim_start_matches('-').is_empty()
}

/// Render one declaration value, or `None` if it must be dropped.
pub fn format_value(property: &str, value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => {
            if UNITLESS.contains(&property) || n.as_f64() == Some(0.0) {
                Some(n.to_string())
            } else {
                Some(format!("{n}px"))
            }
        }
        Value::String(s) => sanitize_value(s).map(str::to_string),
        _ => None,
    }
}

/// Trimmed value if it is safe inside a declaration.
pub fn sanitize_value(raw: &str) -> Option<&str> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if value
        .chars()
        .any(|c| matches!(c, ';' | '{' | '}' | '<' | '>' | '\\') || c.is_control())
    {
        return None;
    }
    let lower = value.to_ascii_lowercase();
    if FORBIDDEN.iter().any(|f| lower.contains(f)) {
        return None;
    }
    Some(value)
}

/// Outcome of translating one block's style map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockRule {
    /// `None` when no declaration survived.
    pub rule: Option<String>,
    /// camelCase names of declarations that were dropped.
    pub dropped: Vec<String>,
}

/// Translate `block.style` into a rule on the block's class.
pub fn block_rule(block: &Block) -> BlockRule {
    let mut declarations = Vec::with_capacity(block.style.len());
    let mut dropped = Vec::new();

    for (key, value) in &block.style {
        let property = kebab_case(key);
        if !is_valid_property(&property) {
            dropped.push(key.clone());
            continue;
        }
        match format_value(&property, value) {
            Some(v) => declarations.push(format!("  {property}: {v};")),
            None => dropped.push(key.clone()),
        }
    }

    let rule = if declarations.is_empty() {
        None
    } else {
        Some(format!(
            ".{} {{\n{}\n}}\n",
            class_name(&block.id),
            declarations.join("\n")
        ))
    };
    BlockRule { rule, dropped }
}

/// `:root` custom properties from the theme. Unsafe theme values fall back
/// to the default theme's value.
pub fn theme_variables(theme: &Theme) -> String {
    let fallback = Theme::default();
    let vars = [
        ("--sk-primary", &theme.primary_color, &fallback.primary_color),
        ("--sk-secondary", &theme.secondary_color, &fallback.secondary_color),
        ("--sk-background", &theme.background_color, &fallback.background_color),
        ("--sk-text", &theme.text_color, &fallback.text_color),
        ("--sk-font", &theme.font_family, &fallback.font_family),
        ("--sk-heading-font", &theme.heading_font_family, &fallback.heading_font_family),
        ("--sk-radius", &theme.border_radius, &fallback.border_radius),
        ("--sk-max-width", &theme.max_width, &fallback.max_width),
    ];

    let mut out = String::from(":root {\n");
    for (name, value, default) in vars {
        let value = sanitize_value(value).unwrap_or(default);
        out.push_str(&format!("  {name}: {value};\n"));
    }
    out.push_str("}\n");
    out
}

/// Rules shared by every page, written against the theme variables.
pub const BASE_RULES: &str = "\
*, *::before, *::after { box-sizing: border-box; }
body { margin: 0; font-family: var(--sk-font); color: var(--sk-text); background: var(--sk-background); }
h1, h2, h3, h4, h5, h6 { font-family: var(--sk-heading-font); }
.sk-container { max-width: var(--sk-max-width); margin: 0 auto; padding: 24px; }
.sk-columns { display: flex; flex-wrap: wrap; gap: 24px; }
.sk-column { flex: 1 1 0; min-width: 0; }
.sk-image { max-width: 100%; height: auto; }
.sk-button { display: inline-block; padding: 12px 20px; border: 0; border-radius: var(--sk-radius); background: var(--sk-primary); color: #fff; text-decoration: none; cursor: pointer; }
.sk-navigation { display: flex; align-items: center; justify-content: space-between; padding: 16px 24px; }
.sk-nav-links { display: flex; gap: 16px; list-style: none; margin: 0; padding: 0; }
.sk-nav-toggle { display: none; background: none; border: 0; font-size: 24px; }
.sk-map { min-height: 300px; }
.sk-map iframe { width: 100%; height: 300px; border: 0; }
.sk-video { width: 100%; }
.sk-spacer { height: 32px; }
.sk-footer { padding: 32px 24px; background: var(--sk-secondary); color: #fff; }
@media (max-width: 768px) {
  .sk-nav-toggle { display: block; }
  .sk-nav-links { display: none; flex-direction: column; }
  .sk-navigation.sk-open .sk-nav-links { display: flex; }
}
";

/// Theme variables, base rules, then the per-block rules in document order.
pub fn stylesheet(theme: &Theme, block_rules: &[String]) -> String {
    let mut css = theme_variables(theme);
    css.push('\n');
    css.push_str(BASE_RULES);
    for rule in block_rules {
        css.push('\n');
        css.push_str(rule);
    }
    css
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("backgroundColor"), "background-color");
        assert_eq!(kebab_case("padding"), "padding");
        assert_eq!(kebab_case("WebkitLineClamp"), "-webkit-line-clamp");
        assert_eq!(kebab_case("border-radius"), "border-radius");
    }

    #[test]
    fn test_format_value_units() {
        assert_eq!(format_value("padding", &json!(24)), Some("24px".into()));
        assert_eq!(format_value("margin-top", &json!(1.5)), Some("1.5px".into()));
        assert_eq!(format_value("margin", &json!(0)), Some("0".into()));
        assert_eq!(format_value("opacity", &json!(0.5)), Some("0.5".into()));
        assert_eq!(format_value("z-index", &json!(10)), Some("10".into()));
        assert_eq!(format_value("color", &json!("  #fff ")), Some("#fff".into()));
        assert_eq!(format_value("color", &json!(true)), None);
        assert_eq!(format_value("color", &json!(null)), None);
    }

    #[test]
    fn test_unsafe_values_dropped() {
        assert_eq!(sanitize_value("red; background: url(x)"), None);
        assert_eq!(sanitize_value("red} body {display:none"), None);
        assert_eq!(sanitize_value("expression(alert(1))"), None);
        assert_eq!(sanitize_value("url(javascript:alert(1))"), None);
        assert_eq!(sanitize_value("</style><script>"), None);
        assert_eq!(sanitize_value("rgba(0, 0, 0, 0.5)"), Some("rgba(0, 0, 0, 0.5)"));
    }

    #[test]
    fn test_class_name_escapes() {
        assert_eq!(class_name(&BlockId::from("hero-1")), "sk-b-hero-1");
        assert_eq!(class_name(&BlockId::from("a b.c")), "sk-b-a_20b_2ec");
        assert_eq!(class_name(&BlockId::from("é")), "sk-b-_c3_a9");
    }

    #[test]
    fn test_class_name_is_injective() {
        let ids = ["a.b", "a_b", "a_2eb", "a-b", "ab"];
        let classes: std::collections::BTreeSet<String> =
            ids.iter().map(|id| class_name(&BlockId::from(*id))).collect();
        assert_eq!(classes.len(), ids.len());
    }

    #[test]
    fn test_class_name_never_matches_kind_classes() {
        for kind in crate::registry::BlockKind::ALL {
            let id = BlockId::from(kind.tag());
            assert_ne!(class_name(&id), format!("sk-{}", kind.tag()));
            assert!(!BASE_RULES.contains(&format!(".{} ", class_name(&id))));
        }
    }

    #[test]
    fn test_block_rule() {
        let block = Block::with_id("hero-1", "container")
            .style("backgroundColor", "#000")
            .style("paddingTop", 40)
            .style("color", "red; x: y")
            .style("bad name", "1px");
        let out = block_rule(&block);
        assert_eq!(
            out.rule.as_deref(),
            Some(".sk-b-hero-1 {\n  background-color: #000;\n  padding-top: 40px;\n}\n")
        );
        assert_eq!(out.dropped, vec!["bad name".to_string(), "color".to_string()]);
    }

    #[test]
    fn test_block_rule_empty_style() {
        let out = block_rule(&Block::with_id("x", "text"));
        assert_eq!(out, BlockRule::default());
    }

    #[test]
    fn test_theme_variables_fallback() {
        let theme = Theme {
            primary_color: "#ff0000".into(),
            text_color: "red;}".into(),
            ..Theme::default()
        };
        let vars = theme_variables(&theme);
        assert!(vars.contains("--sk-primary: #ff0000;"));
        assert!(vars.contains(&format!("--sk-text: {};", Theme::default().text_color)));
    }
}
