//! Built-in renderers, one per [`BlockKind`].
//!
//! Every element carries `sk-<kind>` for the shared rules and the block's
//! own class for its style rule. Text goes through [`escape_text`], every
//! attribute through [`escape_attr`], every link through [`safe_url`].

use serde_json::Value;
use sitekit_core::Block;

use crate::css::class_name;
use crate::html::{escape_attr, escape_text, percent_encode, safe_url};
use crate::registry::{BlockKind, RenderError, RenderFn};

pub(crate) fn builtin(kind: BlockKind) -> RenderFn {
    match kind {
        BlockKind::Container => container,
        BlockKind::Columns => columns,
        BlockKind::Column => column,
        BlockKind::Heading => heading,
        BlockKind::Text => text,
        BlockKind::Image => image,
        BlockKind::Button => button,
        BlockKind::Navigation => navigation,
        BlockKind::Map => map,
        BlockKind::Form => form,
        BlockKind::Video => video,
        BlockKind::Divider => divider,
        BlockKind::Spacer => spacer,
        BlockKind::Footer => footer,
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────

/// Common attributes: kind class, block class and the block id.
fn attrs(kind: BlockKind, block: &Block) -> String {
    format!(
        " class=\"sk-{kind} {}\" data-block-id=\"{}\"",
        class_name(&block.id),
        escape_attr(block.id.as_str())
    )
}

fn wrap(tag: &str, attrs: &str, inner: &str) -> String {
    if inner.is_empty() {
        format!("<{tag}{attrs}></{tag}>")
    } else {
        format!("<{tag}{attrs}>\n{inner}\n</{tag}>")
    }
}

/// String prop, with numbers and booleans rendered as text.
fn prop_text(block: &Block, key: &str) -> Option<String> {
    match block.props.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_text(block: &Block, key: &'static str) -> Result<String, RenderError> {
    match prop_text(block, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(RenderError::MissingProp(key)),
    }
}

fn url_prop(block: &Block, key: &'static str) -> Result<Option<String>, RenderError> {
    match prop_text(block, key) {
        None => Ok(None),
        Some(raw) => safe_url(&raw)
            .map(|u| Some(u.to_string()))
            .ok_or_else(|| RenderError::InvalidProp {
                prop: key,
                reason: format!("unsupported URL {raw:?}"),
            }),
    }
}

fn required_url(block: &Block, key: &'static str) -> Result<String, RenderError> {
    url_prop(block, key)?.ok_or(RenderError::MissingProp(key))
}

fn number_prop(block: &Block, key: &'static str) -> Result<Option<f64>, RenderError> {
    match block.props.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| RenderError::InvalidProp {
            prop: key,
            reason: format!("expected a number, got {s:?}"),
        }),
        Some(other) => Err(RenderError::InvalidProp {
            prop: key,
            reason: format!("expected a number, got {other}"),
        }),
    }
}

// ─── Layout ───────────────────────────────────────────────────────────

fn container(block: &Block, children: &str) -> Result<String, RenderError> {
    Ok(wrap("section", &attrs(BlockKind::Container, block), children))
}

fn columns(block: &Block, children: &str) -> Result<String, RenderError> {
    Ok(wrap("div", &attrs(BlockKind::Columns, block), children))
}

fn column(block: &Block, children: &str) -> Result<String, RenderError> {
    Ok(wrap("div", &attrs(BlockKind::Column, block), children))
}

fn footer(block: &Block, children: &str) -> Result<String, RenderError> {
    let mut inner = children.to_string();
    if let Some(text) = prop_text(block, "text").filter(|t| !t.trim().is_empty()) {
        if !inner.is_empty() {
            inner.push('\n');
        }
        inner.push_str(&format!("<p>{}</p>", escape_text(&text)));
    }
    Ok(wrap("footer", &attrs(BlockKind::Footer, block), &inner))
}

// ─── Content ──────────────────────────────────────────────────────────

fn heading(block: &Block, _children: &str) -> Result<String, RenderError> {
    let level = match number_prop(block, "level")? {
        None => 2,
        Some(l) if l.fract() == 0.0 && (1.0..=6.0).contains(&l) => l as u8,
        Some(l) => {
            return Err(RenderError::InvalidProp {
                prop: "level",
                reason: format!("heading level {l} is outside 1-6"),
            })
        }
    };
    let text = prop_text(block, "text").unwrap_or_default();
    Ok(format!(
        "<h{level}{}>{}</h{level}>",
        attrs(BlockKind::Heading, block),
        escape_text(&text)
    ))
}

fn text(block: &Block, _children: &str) -> Result<String, RenderError> {
    let text = prop_text(block, "text").unwrap_or_default();
    let body = text
        .lines()
        .map(escape_text)
        .collect::<Vec<_>>()
        .join("<br>");
    Ok(format!("<p{}>{body}</p>", attrs(BlockKind::Text, block)))
}

fn image(block: &Block, _children: &str) -> Result<String, RenderError> {
    let src = required_url(block, "src")?;
    let alt = prop_text(block, "alt").unwrap_or_default();
    let mut extra = String::new();
    for key in ["width", "height"] {
        if let Some(v) = number_prop(block, key)? {
            extra.push_str(&format!(" {key}=\"{}\"", v.round() as i64));
        }
    }
    Ok(format!(
        "<img{} src=\"{}\" alt=\"{}\"{extra} loading=\"lazy\">",
        attrs(BlockKind::Image, block),
        escape_attr(&src),
        escape_attr(&alt)
    ))
}

fn button(block: &Block, _children: &str) -> Result<String, RenderError> {
    let label = prop_text(block, "label")
        .or_else(|| prop_text(block, "text"))
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| "Button".to_string());
    let a = attrs(BlockKind::Button, block);
    Ok(match url_prop(block, "href")? {
        Some(href) => format!("<a{a} href=\"{}\">{}</a>", escape_attr(&href), escape_text(&label)),
        None => format!("<button{a} type=\"button\">{}</button>", escape_text(&label)),
    })
}

fn divider(block: &Block, _children: &str) -> Result<String, RenderError> {
    Ok(format!("<hr{}>", attrs(BlockKind::Divider, block)))
}

fn spacer(block: &Block, _children: &str) -> Result<String, RenderError> {
    Ok(format!("<div{} aria-hidden=\"true\"></div>", attrs(BlockKind::Spacer, block)))
}

fn video(block: &Block, _children: &str) -> Result<String, RenderError> {
    let src = required_url(block, "src")?;
    let poster = url_prop(block, "poster")?
        .map(|p| format!(" poster=\"{}\"", escape_attr(&p)))
        .unwrap_or_default();
    Ok(format!(
        "<video{} src=\"{}\"{poster} controls preload=\"metadata\"></video>",
        attrs(BlockKind::Video, block),
        escape_attr(&src)
    ))
}

// ─── Interactive ──────────────────────────────────────────────────────

fn navigation(block: &Block, _children: &str) -> Result<String, RenderError> {
    let invalid = |reason: String| RenderError::InvalidProp {
        prop: "links",
        reason,
    };
    let links = match block.props.get("links") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => return Err(invalid("expected an array".into())),
    };

    let mut items = Vec::with_capacity(links.len());
    for (i, link) in links.iter().enumerate() {
        let label = link.get("label").and_then(Value::as_str);
        let href = link.get("href").and_then(Value::as_str);
        let (label, href) = match (label, href) {
            (Some(l), Some(h)) => (l, h),
            _ => return Err(invalid(format!("entry {i} needs a label and an href"))),
        };
        let href = safe_url(href).ok_or_else(|| invalid(format!("entry {i} has an unsupported URL")))?;
        items.push(format!(
            "<li><a href=\"{}\">{}</a></li>",
            escape_attr(href),
            escape_text(label)
        ));
    }

    let mut inner = String::new();
    if let Some(brand) = prop_text(block, "brand").filter(|b| !b.trim().is_empty()) {
        inner.push_str(&format!("<a class=\"sk-brand\" href=\"/\">{}</a>\n", escape_text(&brand)));
    }
    inner.push_str(
        "<button class=\"sk-nav-toggle\" type=\"button\" aria-label=\"Menu\" aria-expanded=\"false\">&#9776;</button>\n",
    );
    inner.push_str(&format!("<ul class=\"sk-nav-links\">{}</ul>", items.concat()));
    Ok(wrap("nav", &attrs(BlockKind::Navigation, block), &inner))
}

fn map(block: &Block, _children: &str) -> Result<String, RenderError> {
    let query = match prop_text(block, "address").filter(|a| !a.trim().is_empty()) {
        Some(address) => address,
        None => match (number_prop(block, "lat")?, number_prop(block, "lng")?) {
            (Some(lat), Some(lng)) => format!("{lat},{lng}"),
            _ => return Err(RenderError::MissingProp("address")),
        },
    };
    let mut src = format!("https://maps.google.com/maps?q={}&output=embed", percent_encode(&query));
    if let Some(zoom) = number_prop(block, "zoom")? {
        src.push_str(&format!("&z={}", zoom.clamp(1.0, 21.0).round() as u8));
    }
    Ok(format!(
        "<div{} data-map-src=\"{}\" data-map-title=\"{}\"></div>",
        attrs(BlockKind::Map, block),
        escape_attr(&src),
        escape_attr(&format!("Map of {query}"))
    ))
}

/// Input types a referenced form may declare.
const FIELD_TYPES: &[&str] = &["text", "email", "tel", "number", "url", "textarea"];

/// The form itself lives in the forms service; the block carries its id and
/// optionally the resolved field list.
fn form(block: &Block, _children: &str) -> Result<String, RenderError> {
    let form_id = required_text(block, "formId")?;
    let invalid = |reason: String| RenderError::InvalidProp {
        prop: "fields",
        reason,
    };
    let fields = match block.props.get("fields") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => return Err(invalid("expected an array".into())),
    };

    let mut inner = Vec::with_capacity(fields.len() + 2);
    for (i, field) in fields.iter().enumerate() {
        let name = field
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| invalid(format!("entry {i} needs a name")))?;
        let label = field.get("label").and_then(Value::as_str).unwrap_or(name);
        let kind = field.get("type").and_then(Value::as_str).unwrap_or("text");
        if !FIELD_TYPES.contains(&kind) {
            return Err(invalid(format!("entry {i} has unsupported type {kind:?}")));
        }
        let required = if field.get("required").and_then(Value::as_bool).unwrap_or(false) {
            " required"
        } else {
            ""
        };
        let control = if kind == "textarea" {
            format!("<textarea name=\"{}\"{required}></textarea>", escape_attr(name))
        } else {
            format!("<input type=\"{kind}\" name=\"{}\"{required}>", escape_attr(name))
        };
        inner.push(format!("<label>{}{control}</label>", escape_text(label)));
    }

    let submit = prop_text(block, "submitLabel")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Send".to_string());
    inner.push(format!("<button class=\"sk-button\" type=\"submit\">{}</button>", escape_text(&submit)));
    inner.push("<p class=\"sk-form-status\" aria-live=\"polite\"></p>".to_string());

    let form_attrs = format!(
        "{} action=\"/api/forms/{}/submit\" method=\"post\" data-form-id=\"{}\"",
        attrs(BlockKind::Form, block),
        percent_encode(&form_id),
        escape_attr(&form_id)
    );
    Ok(wrap("form", &form_attrs, &inner.join("\n")))
}
