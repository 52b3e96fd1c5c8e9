//! Layout document tree.
//!
//! A document is an ordered list of pages; each page holds an ordered tree
//! of blocks. Block ids are unique across the whole document and are never
//! regenerated by an edit. Only [`BlockId::generate`] mints new ones, and
//! only for blocks that did not exist before.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::CoreError;

/// Component properties (text, href, level, …). Ordered for deterministic output.
pub type PropMap = BTreeMap<String, Value>;

/// Style declarations keyed by camelCase CSS property name.
pub type StyleMap = BTreeMap<String, Value>;

/// Stable block identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh id for a newly created block, e.g. `heading-1f3a9c2b`.
    pub fn generate(kind: &str) -> Self {
        let prefix: String = kind
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect::<String>()
            .to_ascii_lowercase();
        let prefix = if prefix.is_empty() { "block".to_string() } else { prefix };
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{prefix}-{}", &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BlockId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A node in the page tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    /// Type tag (`heading`, `columns`, `map`, …). Kept as a string so that
    /// documents written by newer editors still load.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub props: PropMap,
    #[serde(default)]
    pub style: StyleMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
}

impl Block {
    /// New block with a freshly generated id.
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self::with_id(BlockId::generate(&kind), kind)
    }

    pub fn with_id(id: impl Into<BlockId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            props: PropMap::new(),
            style: StyleMap::new(),
            children: Vec::new(),
        }
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn style(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.style.insert(key.into(), value.into());
        self
    }

    pub fn child(mut self, block: Block) -> Self {
        self.children.push(block);
        self
    }

    /// Whether `id` names this block or any descendant.
    pub fn contains(&self, id: &BlockId) -> bool {
        self.id == *id || self.children.iter().any(|c| c.contains(id))
    }

    /// Number of blocks in this subtree, including self.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Block::subtree_len).sum::<usize>()
    }

    fn collect_ids<'a>(&'a self, out: &mut Vec<&'a BlockId>) {
        out.push(&self.id);
        for child in &self.children {
            child.collect_ids(out);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    /// URL slug; empty for the site root.
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Page {
    pub fn new(id: impl Into<String>, slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slug: slug.into(),
            title: title.into(),
            blocks: Vec::new(),
        }
    }

    pub fn block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }
}

/// The full page-structure tree shared by a collaboration room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDocument {
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl LayoutDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    pub fn page(&self, page_id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == page_id)
    }

    pub fn first_page(&self) -> Option<&Page> {
        self.pages.first()
    }

    pub fn find_block(&self, id: &BlockId) -> Option<&Block> {
        self.pages.iter().find_map(|p| find_in(&p.blocks, id))
    }

    pub fn find_block_mut(&mut self, id: &BlockId) -> Option<&mut Block> {
        self.pages.iter_mut().find_map(|p| find_in_mut(&mut p.blocks, id))
    }

    pub fn contains_block(&self, id: &BlockId) -> bool {
        self.find_block(id).is_some()
    }

    /// Total number of blocks across all pages.
    pub fn block_count(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| p.blocks.iter())
            .map(Block::subtree_len)
            .sum()
    }

    /// Merge `patch` into a block's props. A `null` value removes the key.
    pub fn update_block_props(&mut self, id: &BlockId, patch: PropMap) -> Result<(), CoreError> {
        let block = self
            .find_block_mut(id)
            .ok_or_else(|| CoreError::BlockNotFound(id.clone()))?;
        merge_into(&mut block.props, patch);
        Ok(())
    }

    /// Merge `patch` into a block's style map. A `null` value removes the key.
    pub fn update_block_style(&mut self, id: &BlockId, patch: StyleMap) -> Result<(), CoreError> {
        let block = self
            .find_block_mut(id)
            .ok_or_else(|| CoreError::BlockNotFound(id.clone()))?;
        merge_into(&mut block.style, patch);
        Ok(())
    }

    /// Insert `block` under `parent` (or at page top level) at `index`,
    /// clamped to the sibling count.
    pub fn insert_block(
        &mut self,
        page_id: &str,
        parent: Option<&BlockId>,
        index: usize,
        block: Block,
    ) -> Result<(), CoreError> {
        let mut incoming = Vec::new();
        block.collect_ids(&mut incoming);
        let mut seen = HashSet::new();
        for id in incoming {
            if id.as_str().is_empty() {
                return Err(CoreError::EmptyBlockId);
            }
            if !seen.insert(id) || self.contains_block(id) {
                return Err(CoreError::DuplicateBlockId(id.clone()));
            }
        }

        let siblings = self.siblings_mut(page_id, parent)?;
        let index = index.min(siblings.len());
        siblings.insert(index, block);
        Ok(())
    }

    /// Detach a block (with its subtree) from wherever it lives.
    pub fn remove_block(&mut self, id: &BlockId) -> Result<Block, CoreError> {
        self.pages
            .iter_mut()
            .find_map(|p| remove_from(&mut p.blocks, id))
            .ok_or_else(|| CoreError::BlockNotFound(id.clone()))
    }

    /// Re-parent a block, keeping its id and subtree intact.
    pub fn move_block(
        &mut self,
        id: &BlockId,
        page_id: &str,
        new_parent: Option<&BlockId>,
        index: usize,
    ) -> Result<(), CoreError> {
        let moving = self
            .find_block(id)
            .ok_or_else(|| CoreError::BlockNotFound(id.clone()))?;
        if let Some(parent) = new_parent {
            if moving.contains(parent) {
                return Err(CoreError::InvalidMove(id.clone()));
            }
        }
        // Resolve the destination before detaching so a bad target leaves
        // the document untouched.
        self.siblings_mut(page_id, new_parent)?;

        let block = self.remove_block(id)?;
        let siblings = self.siblings_mut(page_id, new_parent)?;
        let index = index.min(siblings.len());
        siblings.insert(index, block);
        Ok(())
    }

    /// Ids must be non-empty and unique across the document.
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut ids = Vec::new();
        for page in &self.pages {
            for block in &page.blocks {
                block.collect_ids(&mut ids);
            }
        }
        let mut seen = HashSet::with_capacity(ids.len());
        for id in ids {
            if id.as_str().is_empty() {
                return Err(CoreError::EmptyBlockId);
            }
            if !seen.insert(id) {
                return Err(CoreError::DuplicateBlockId(id.clone()));
            }
        }
        Ok(())
    }

    fn siblings_mut(
        &mut self,
        page_id: &str,
        parent: Option<&BlockId>,
    ) -> Result<&mut Vec<Block>, CoreError> {
        let page = self
            .pages
            .iter_mut()
            .find(|p| p.id == page_id)
            .ok_or_else(|| CoreError::PageNotFound(page_id.to_string()))?;
        match parent {
            None => Ok(&mut page.blocks),
            Some(parent_id) => find_in_mut(&mut page.blocks, parent_id)
                .map(|b| &mut b.children)
                .ok_or_else(|| CoreError::BlockNotFound(parent_id.clone())),
        }
    }
}

fn merge_into(target: &mut BTreeMap<String, Value>, patch: BTreeMap<String, Value>) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

fn find_in<'a>(blocks: &'a [Block], id: &BlockId) -> Option<&'a Block> {
    blocks.iter().find_map(|b| {
        if b.id == *id {
            Some(b)
        } else {
            find_in(&b.children, id)
        }
    })
}

fn find_in_mut<'a>(blocks: &'a mut [Block], id: &BlockId) -> Option<&'a mut Block> {
    for block in blocks.iter_mut() {
        if block.id == *id {
            return Some(block);
        }
        if let Some(found) = find_in_mut(&mut block.children, id) {
            return Some(found);
        }
    }
    None
}

fn remove_from(blocks: &mut Vec<Block>, id: &BlockId) -> Option<Block> {
    if let Some(pos) = blocks.iter().position(|b| b.id == *id) {
        return Some(blocks.remove(pos));
    }
    blocks.iter_mut().find_map(|b| remove_from(&mut b.children, id))
}
