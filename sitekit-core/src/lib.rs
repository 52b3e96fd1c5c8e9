//! # sitekit-core — shared data model for the site builder
//!
//! The layout document (pages → blocks), room addressing, caller identity
//! and site theme. Everything here is plain data plus tree edits; the
//! collaboration layer and the static-site compiler both build on it.
//!
//! ```text
//! LayoutDocument
//!   └── Page (id, slug, title)
//!         └── Block (id, type, props, style)
//!               └── Block …            containers → columns → components
//! ```

pub mod document;
pub mod identity;
pub mod room;
pub mod theme;

use thiserror::Error;

pub use document::{Block, BlockId, LayoutDocument, Page, PropMap, StyleMap};
pub use identity::{Identity, Role};
pub use room::{RoomId, RoomIdError};
pub use theme::Theme;

/// Errors raised by layout document edits.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("Block not found: {0}")]
    BlockNotFound(BlockId),
    #[error("Page not found: {0}")]
    PageNotFound(String),
    #[error("Duplicate block id: {0}")]
    DuplicateBlockId(BlockId),
    #[error("Block id must not be empty")]
    EmptyBlockId,
    #[error("Cannot move block {0} into its own subtree")]
    InvalidMove(BlockId),
}
