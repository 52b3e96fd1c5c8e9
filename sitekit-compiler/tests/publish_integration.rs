//! Compile and publish realistic documents to a filesystem store.

use std::fs;
use std::sync::Arc;

use serde_json::json;
use sitekit_compiler::{compile, FsObjectStore, Publisher};
use sitekit_core::{LayoutDocument, Theme};
use tempfile::TempDir;

/// A two-page site as the editor saves it.
fn shop_layout() -> LayoutDocument {
    serde_json::from_value(json!({
        "pages": [
            {
                "id": "home",
                "slug": "",
                "title": "Acme Shop",
                "blocks": [
                    {
                        "id": "nav-1",
                        "type": "navigation",
                        "props": {
                            "brand": "Acme",
                            "links": [
                                {"label": "Home", "href": "/"},
                                {"label": "Contact", "href": "/contact/"}
                            ]
                        }
                    },
                    {
                        "id": "hero-1",
                        "type": "container",
                        "style": {"backgroundColor": "#0f172a", "paddingTop": 96},
                        "children": [
                            {"id": "hero-title", "type": "heading", "props": {"text": "Spring sale", "level": 1}},
                            {"id": "hero-cta", "type": "button", "props": {"label": "Shop now", "href": "/shop"}}
                        ]
                    },
                    {"id": "legacy-1", "type": "carousel", "props": {"slides": []}}
                ]
            },
            {
                "id": "contact",
                "slug": "contact",
                "title": "Contact",
                "blocks": [
                    {
                        "id": "cols-1",
                        "type": "columns",
                        "children": [
                            {
                                "id": "col-a",
                                "type": "column",
                                "children": [
                                    {"id": "form-1", "type": "form", "props": {
                                        "formId": "contact-us",
                                        "fields": [{"name": "email", "type": "email", "required": true}]
                                    }}
                                ]
                            },
                            {
                                "id": "col-b",
                                "type": "column",
                                "children": [
                                    {"id": "map-1", "type": "map", "props": {"address": "1 Main St"}}
                                ]
                            }
                        ]
                    }
                ]
            }
        ]
    }))
    .unwrap()
}

#[test]
fn test_publish_to_filesystem() {
    let dir = TempDir::new().unwrap();
    let publisher = Publisher::new(Arc::new(FsObjectStore::new(dir.path())));
    let report = publisher
        .publish("acme", "shop", &shop_layout(), &Theme::default())
        .unwrap();

    assert_eq!(report.pages.len(), 2);
    assert_eq!(report.pages[0].prefix, "acme/shop/");
    assert_eq!(report.pages[1].prefix, "acme/shop/contact/");
    // the unknown carousel is the only casualty
    assert_eq!(report.pages[0].diagnostics, 1);
    assert_eq!(report.pages[1].diagnostics, 0);

    let home = fs::read_to_string(dir.path().join("acme/shop/index.html")).unwrap();
    assert!(home.contains("<title>Acme Shop</title>"));
    assert!(home.contains(">Spring sale</h1>"));
    assert!(home.contains("<!-- sitekit: block legacy-1 (carousel) skipped"));

    let home_css = fs::read_to_string(dir.path().join("acme/shop/styles.css")).unwrap();
    assert!(home_css.contains(".sk-b-hero-1 {\n  background-color: #0f172a;\n  padding-top: 96px;\n}"));

    let home_js = fs::read_to_string(dir.path().join("acme/shop/app.js")).unwrap();
    assert!(home_js.contains("sk-nav-toggle"));
    assert!(!home_js.contains("FormData"));

    let contact_js = fs::read_to_string(dir.path().join("acme/shop/contact/app.js")).unwrap();
    assert!(contact_js.contains("FormData"));
    assert!(contact_js.contains("IntersectionObserver"));
}

#[test]
fn test_republish_overwrites_identically() {
    let dir = TempDir::new().unwrap();
    let publisher = Publisher::new(Arc::new(FsObjectStore::new(dir.path())));
    let layout = shop_layout();

    publisher.publish("acme", "shop", &layout, &Theme::default()).unwrap();
    let before = fs::read(dir.path().join("acme/shop/contact/index.html")).unwrap();
    publisher.publish("acme", "shop", &layout, &Theme::default()).unwrap();
    let after = fs::read(dir.path().join("acme/shop/contact/index.html")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_document_json_round_trip_compiles_the_same() {
    let layout = shop_layout();
    let reloaded: LayoutDocument =
        serde_json::from_str(&serde_json::to_string(&layout).unwrap()).unwrap();
    let theme = Theme::default();
    assert_eq!(
        compile(&layout, &theme, Some("contact")).unwrap(),
        compile(&reloaded, &theme, Some("contact")).unwrap()
    );
}
