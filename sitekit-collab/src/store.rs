use sitekit_core::{BlockId, LayoutDocument};

/// Client-side editor state for one page session.
///
/// Only `layout` is shared with the room. Selection and hover are local UI
/// state: a remote snapshot replaces the layout and leaves them alone.
#[derive(Debug, Clone, Default)]
pub struct EditorStore {
    layout: LayoutDocument,
    /// Bumped on every layout change, local or remote.
    revision: u64,
    selection: Option<BlockId>,
    hover: Option<BlockId>,
}

impl EditorStore {
    pub fn new(layout: LayoutDocument) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn layout(&self) -> &LayoutDocument {
        &self.layout
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Apply a local edit. The revision is bumped only if `edit` succeeds.
    pub fn edit<T, E>(
        &mut self,
        edit: impl FnOnce(&mut LayoutDocument) -> Result<T, E>,
    ) -> Result<T, E> {
        let out = edit(&mut self.layout)?;
        self.revision += 1;
        Ok(out)
    }

    /// Swap the whole layout (remote snapshot or local replace).
    pub fn replace_layout(&mut self, layout: LayoutDocument) {
        self.layout = layout;
        self.revision += 1;
    }

    pub fn selection(&self) -> Option<&BlockId> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, block: Option<BlockId>) {
        self.selection = block;
    }

    pub fn hover(&self) -> Option<&BlockId> {
        self.hover.as_ref()
    }

    pub fn set_hover(&mut self, block: Option<BlockId>) {
        self.hover = block;
    }
}
