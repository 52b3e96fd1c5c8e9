//! Block type registry.
//!
//! The set of block kinds the compiler understands is closed: a type tag
//! either parses into a [`BlockKind`] or takes the fallback branch. The
//! registry maps each kind to a plain render function, so a deployment
//! can swap one kind's markup without touching the tree walk.

use std::collections::BTreeMap;
use std::fmt;

use sitekit_core::Block;
use thiserror::Error;

use crate::blocks;
use crate::scripts::Behaviour;

/// Every block type the compiler can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockKind {
    Container,
    Columns,
    Column,
    Heading,
    Text,
    Image,
    Button,
    Navigation,
    Map,
    Form,
    Video,
    Divider,
    Spacer,
    Footer,
}

impl BlockKind {
    pub const ALL: [BlockKind; 14] = [
        BlockKind::Container,
        BlockKind::Columns,
        BlockKind::Column,
        BlockKind::Heading,
        BlockKind::Text,
        BlockKind::Image,
        BlockKind::Button,
        BlockKind::Navigation,
        BlockKind::Map,
        BlockKind::Form,
        BlockKind::Video,
        BlockKind::Divider,
        BlockKind::Spacer,
        BlockKind::Footer,
    ];

    /// Parse a document type tag. Tags are matched case-insensitively.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.tag().eq_ignore_ascii_case(tag))
    }

    pub fn tag(self) -> &'static str {
        match self {
            BlockKind::Container => "container",
            BlockKind::Columns => "columns",
            BlockKind::Column => "column",
            BlockKind::Heading => "heading",
            BlockKind::Text => "text",
            BlockKind::Image => "image",
            BlockKind::Button => "button",
            BlockKind::Navigation => "navigation",
            BlockKind::Map => "map",
            BlockKind::Form => "form",
            BlockKind::Video => "video",
            BlockKind::Divider => "divider",
            BlockKind::Spacer => "spacer",
            BlockKind::Footer => "footer",
        }
    }

    /// Kinds whose children are rendered inside them.
    pub fn accepts_children(self) -> bool {
        matches!(
            self,
            BlockKind::Container | BlockKind::Columns | BlockKind::Column | BlockKind::Footer
        )
    }

    /// Script the page needs when a block of this kind is present.
    pub fn behaviour(self) -> Option<Behaviour> {
        match self {
            BlockKind::Navigation => Some(Behaviour::NavigationToggle),
            BlockKind::Form => Some(Behaviour::FormSubmit),
            BlockKind::Map => Some(Behaviour::MapLazyLoad),
            _ => None,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Why a block could not be rendered. Never fatal to the page.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Unknown block type '{0}'")]
    UnknownKind(String),
    #[error("No renderer registered for '{0}'")]
    Unregistered(BlockKind),
    #[error("Block has an empty id")]
    MissingId,
    #[error("Missing required prop '{0}'")]
    MissingProp(&'static str),
    #[error("Invalid prop '{prop}': {reason}")]
    InvalidProp { prop: &'static str, reason: String },
    #[error("Nested deeper than {0} levels")]
    TooDeep(usize),
}

/// Renders one block given its already-rendered children.
pub type RenderFn = fn(&Block, &str) -> Result<String, RenderError>;

/// Block kind -> renderer.
#[derive(Clone)]
pub struct RendererRegistry {
    renderers: BTreeMap<BlockKind, RenderFn>,
}

impl RendererRegistry {
    /// Registry with no renderers; every block takes the fallback.
    pub fn empty() -> Self {
        Self {
            renderers: BTreeMap::new(),
        }
    }

    /// Registry with the built-in renderer for every kind.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for kind in BlockKind::ALL {
            registry.register(kind, blocks::builtin(kind));
        }
        registry
    }

    /// Install `render` for `kind`, returning the renderer it replaced.
    pub fn register(&mut self, kind: BlockKind, render: RenderFn) -> Option<RenderFn> {
        self.renderers.insert(kind, render)
    }

    pub fn unregister(&mut self, kind: BlockKind) -> Option<RenderFn> {
        self.renderers.remove(&kind)
    }

    pub fn get(&self, kind: BlockKind) -> Option<RenderFn> {
        self.renderers.get(&kind).copied()
    }

    pub fn kinds(&self) -> impl Iterator<Item = BlockKind> + '_ {
        self.renderers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.renderers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renderers.is_empty()
    }

    /// Render `block` as `kind` with the given children markup.
    pub fn render(
        &self,
        kind: BlockKind,
        block: &Block,
        children: &str,
    ) -> Result<String, RenderError> {
        if block.id.as_str().trim().is_empty() {
            return Err(RenderError::MissingId);
        }
        let render = self.get(kind).ok_or(RenderError::Unregistered(kind))?;
        render(block, children)
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("kinds", &self.renderers.keys().collect::<Vec<_>>())
            .finish()
    }
}
