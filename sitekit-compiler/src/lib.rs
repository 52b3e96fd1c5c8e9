//! # sitekit-compiler — layout documents to static sites
//!
//! Turns the JSON page tree edited in the collaboration core into a
//! standalone `index.html`, `styles.css` and `app.js` per page, and writes
//! them to static object storage.
//!
//! A single bad block never stops a publish: unknown types, missing props
//! and over-deep nesting become an HTML comment plus a [`Diagnostic`].
//!
//! ```ignore
//! let page = sitekit_compiler::compile(&layout, &theme, None)?;
//! Publisher::new(store).publish("acme", "shop", &layout, &theme)?;
//! ```

mod blocks;
pub mod compile;
pub mod css;
pub mod html;
pub mod publish;
pub mod registry;
pub mod scripts;

pub use compile::{compile, compile_site, CompileError, CompiledPage, Compiler, Diagnostic, MAX_DEPTH};
pub use publish::{
    FsObjectStore, MemoryObjectStore, ObjectStore, ObjectStoreError, PublishError, PublishReport,
    PublishedPage, Publisher,
};
pub use registry::{BlockKind, RenderError, RenderFn, RendererRegistry};
pub use scripts::Behaviour;
