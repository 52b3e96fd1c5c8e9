//! Layout document + theme -> static page assets.
//!
//! ```text
//! LayoutDocument ──► Page ──► blocks (document order)
//!                              │  BlockKind::from_tag ── unknown ──► placeholder + diagnostic
//!                              ▼
//!                        RendererRegistry ── Err ──► placeholder + diagnostic
//!                              │
//!             ┌────────────────┼──────────────────┐
//!             ▼                ▼                  ▼
//!        index.html       styles.css           app.js
//!      (page shell)  (theme + .sk-b-<id>)  (behaviours, once each)
//! ```
//!
//! Compilation is pure: no I/O, no clock, no randomness. The same inputs
//! always give byte-identical output, so re-publishing is safe.

use serde::Serialize;
use sitekit_core::{Block, BlockId, LayoutDocument, Page, Theme};
use thiserror::Error;

use crate::css;
use crate::html;
use crate::registry::{BlockKind, RenderError, RendererRegistry};
use crate::scripts::{self, Behaviour};

/// Nesting beyond this depth is treated as malformed.
pub const MAX_DEPTH: usize = 32;

/// Page-level failures. Block-level problems never surface here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Layout document has no pages")]
    EmptyDocument,
    #[error("Page not found: {0}")]
    PageNotFound(String),
}

/// Something the compiler skipped or dropped while building a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub block_id: BlockId,
    /// Type tag as written in the document.
    pub block_type: String,
    pub message: String,
}

/// Assets for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledPage {
    pub page_id: String,
    pub slug: String,
    pub title: String,
    pub html: String,
    pub css: String,
    pub js: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledPage {
    /// No block was skipped or trimmed.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Compiler with a configurable registry and depth limit.
#[derive(Debug, Clone)]
pub struct Compiler {
    registry: RendererRegistry,
    max_depth: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(RendererRegistry::standard())
    }
}

impl Compiler {
    pub fn new(registry: RendererRegistry) -> Self {
        Self {
            registry,
            max_depth: MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn registry(&self) -> &RendererRegistry {
        &self.registry
    }

    /// Compile `target_page_id`, or the first page when `None`.
    pub fn compile(
        &self,
        layout: &LayoutDocument,
        theme: &Theme,
        target_page_id: Option<&str>,
    ) -> Result<CompiledPage, CompileError> {
        let page = match target_page_id {
            Some(id) => layout
                .page(id)
                .ok_or_else(|| CompileError::PageNotFound(id.to_string()))?,
            None => layout.first_page().ok_or(CompileError::EmptyDocument)?,
        };
        Ok(self.compile_page(page, theme))
    }

    /// Compile every page in document order.
    pub fn compile_site(
        &self,
        layout: &LayoutDocument,
        theme: &Theme,
    ) -> Result<Vec<CompiledPage>, CompileError> {
        if layout.pages.is_empty() {
            return Err(CompileError::EmptyDocument);
        }
        Ok(layout
            .pages
            .iter()
            .map(|page| self.compile_page(page, theme))
            .collect())
    }

    pub fn compile_page(&self, page: &Page, theme: &Theme) -> CompiledPage {
        let mut walk = PageWalk {
            registry: &self.registry,
            max_depth: self.max_depth,
            page_id: &page.id,
            rules: Vec::new(),
            behaviours: Vec::new(),
            diagnostics: Vec::new(),
        };

        let blocks: Vec<String> = page.blocks.iter().map(|b| walk.render(b, 1)).collect();
        let body = format!(
            "<main class=\"sk-page\" data-page-id=\"{}\">\n{}\n</main>",
            html::escape_attr(&page.id),
            blocks.join("\n")
        );

        let js = scripts::bundle(walk.behaviours.iter().copied());
        let title = if page.title.trim().is_empty() {
            page.id.clone()
        } else {
            page.title.clone()
        };

        if !walk.diagnostics.is_empty() {
            log::info!(
                "Compiled page {} with {} diagnostic(s)",
                page.id,
                walk.diagnostics.len()
            );
        }

        CompiledPage {
            page_id: page.id.clone(),
            slug: page.slug.clone(),
            html: html::page_shell(&title, &body, !js.is_empty()),
            css: css::stylesheet(theme, &walk.rules),
            js,
            title,
            diagnostics: walk.diagnostics,
        }
    }
}

/// Compile with the standard registry.
pub fn compile(
    layout: &LayoutDocument,
    theme: &Theme,
    target_page_id: Option<&str>,
) -> Result<CompiledPage, CompileError> {
    Compiler::default().compile(layout, theme, target_page_id)
}

/// Compile every page with the standard registry.
pub fn compile_site(
    layout: &LayoutDocument,
    theme: &Theme,
) -> Result<Vec<CompiledPage>, CompileError> {
    Compiler::default().compile_site(layout, theme)
}

// ─── Tree walk ────────────────────────────────────────────────────────

struct PageWalk<'a> {
    registry: &'a RendererRegistry,
    max_depth: usize,
    page_id: &'a str,
    /// Per-block CSS rules in document order (parents before children).
    rules: Vec<String>,
    behaviours: Vec<Behaviour>,
    diagnostics: Vec<Diagnostic>,
}

impl PageWalk<'_> {
    fn render(&mut self, block: &Block, depth: usize) -> String {
        if depth > self.max_depth {
            return self.skip(block, RenderError::TooDeep(self.max_depth));
        }
        let kind = match BlockKind::from_tag(&block.kind) {
            Some(kind) => kind,
            None => return self.skip(block, RenderError::UnknownKind(block.kind.clone())),
        };

        // children's rules and scripts are dropped again if this block fails
        let rules_mark = self.rules.len();
        let behaviours_mark = self.behaviours.len();

        let children = if kind.accepts_children() {
            block
                .children
                .iter()
                .map(|child| self.render(child, depth + 1))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            if !block.children.is_empty() {
                self.note(
                    block,
                    format!(
                        "{} child block(s) ignored: '{kind}' blocks cannot contain children",
                        block.children.len()
                    ),
                );
            }
            String::new()
        };

        match self.registry.render(kind, block, &children) {
            Ok(markup) => {
                let style = css::block_rule(block);
                if !style.dropped.is_empty() {
                    self.note(
                        block,
                        format!("dropped style declaration(s): {}", style.dropped.join(", ")),
                    );
                }
                if let Some(rule) = style.rule {
                    self.rules.insert(rules_mark, rule);
                }
                if let Some(behaviour) = kind.behaviour() {
                    self.behaviours.push(behaviour);
                }
                markup
            }
            Err(e) => {
                self.rules.truncate(rules_mark);
                self.behaviours.truncate(behaviours_mark);
                self.skip(block, e)
            }
        }
    }

    /// Placeholder for a block that could not be rendered.
    fn skip(&mut self, block: &Block, error: RenderError) -> String {
        log::warn!(
            "Skipping block {} ({}) on page {}: {error}",
            block.id,
            block.kind,
            self.page_id
        );
        let placeholder = html::comment(&format!(
            "sitekit: block {} ({}) skipped: {error}",
            block.id, block.kind
        ));
        self.diagnostics.push(Diagnostic {
            block_id: block.id.clone(),
            block_type: block.kind.clone(),
            message: error.to_string(),
        });
        placeholder
    }

    fn note(&mut self, block: &Block, message: String) {
        log::debug!("Block {} on page {}: {message}", block.id, self.page_id);
        self.diagnostics.push(Diagnostic {
            block_id: block.id.clone(),
            block_type: block.kind.clone(),
            message,
        });
    }
}
