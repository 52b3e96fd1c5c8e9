//! Writing compiled sites to static object storage.
//!
//! ```text
//! <tenant>/<site>/index.html            home page (first page, or empty slug)
//! <tenant>/<site>/styles.css
//! <tenant>/<site>/app.js
//! <tenant>/<site>/<slug>/index.html     every other page
//! ...
//! ```
//!
//! The whole site is compiled and every path is checked before the first
//! write, so a bad page never leaves a half-published site behind.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use sitekit_core::{LayoutDocument, Theme};
use thiserror::Error;

use crate::compile::{CompileError, CompiledPage, Compiler};

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid object path: {0:?}")]
    InvalidPath(String),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Object store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Store(#[from] ObjectStoreError),
    #[error("Invalid {field}: {value:?}")]
    InvalidSegment { field: &'static str, value: String },
    #[error("Pages {first} and {second} both publish to {prefix:?}")]
    PathConflict {
        first: String,
        second: String,
        prefix: String,
    },
}

/// Static asset storage keyed by `/`-separated relative paths.
pub trait ObjectStore: Send + Sync {
    fn put(&self, path: &str, content: &[u8]) -> Result<(), ObjectStoreError>;

    fn get(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

/// Relative, non-empty, no `.`/`..` or empty segments, no backslashes.
pub(crate) fn check_path(path: &str) -> Result<(), ObjectStoreError> {
    let ok = !path.is_empty()
        && !path.contains('\\')
        && !path.contains('\0')
        && path
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if ok {
        Ok(())
    } else {
        Err(ObjectStoreError::InvalidPath(path.to_string()))
    }
}

// ─── Memory ───────────────────────────────────────────────────────────

/// In-memory object store for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.objects
            .read()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, path: &str, content: &[u8]) -> Result<(), ObjectStoreError> {
        check_path(path)?;
        self.objects
            .write()
            .map_err(|e| ObjectStoreError::Unavailable(e.to_string()))?
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError> {
        check_path(path)?;
        self.objects
            .read()
            .map_err(|e| ObjectStoreError::Unavailable(e.to_string()))?
            .get(path)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(path.to_string()))
    }
}

// ─── Filesystem ───────────────────────────────────────────────────────

/// Object store rooted at a local directory (e.g. a bucket sync folder).
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ObjectStoreError> {
        check_path(path)?;
        let relative = Path::new(path);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(ObjectStoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, path: &str, content: &[u8]) -> Result<(), ObjectStoreError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        // write-then-rename so readers never see a truncated file
        let tmp = target.with_extension("sitekit-tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &target)?;
        log::debug!("Wrote {} ({} bytes)", target.display(), content.len());
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let target = self.resolve(path)?;
        match fs::read(&target) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ─── Publisher ────────────────────────────────────────────────────────

/// One page as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPage {
    pub page_id: String,
    /// Directory prefix ending in `/`.
    pub prefix: String,
    pub diagnostics: usize,
    /// Slug of a home page that was published at the site root instead.
    pub ignored_slug: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub pages: Vec<PublishedPage>,
    pub objects_written: usize,
    pub bytes_written: usize,
}

/// Compiles a site and writes its pages under `<tenant>/<site>/`.
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    compiler: Compiler,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_compiler(store, Compiler::default())
    }

    pub fn with_compiler(store: Arc<dyn ObjectStore>, compiler: Compiler) -> Self {
        Self { store, compiler }
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    /// Compile every page of `layout` and write its assets.
    pub fn publish(
        &self,
        tenant: &str,
        site: &str,
        layout: &LayoutDocument,
        theme: &Theme,
    ) -> Result<PublishReport, PublishError> {
        let tenant = segment("tenant", tenant)?;
        let site = segment("site", site)?;
        let pages = self.compiler.compile_site(layout, theme)?;

        let mut planned: Vec<(String, &CompiledPage, Option<String>)> = Vec::with_capacity(pages.len());
        let mut seen: HashMap<String, &str> = HashMap::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            let is_home = i == 0;
            let prefix = page_prefix(tenant, site, &page.slug, is_home)?;
            if let Some(first) = seen.insert(prefix.clone(), &page.page_id) {
                return Err(PublishError::PathConflict {
                    first: first.to_string(),
                    second: page.page_id.clone(),
                    prefix,
                });
            }
            let slug = page.slug.trim().trim_matches('/');
            let ignored_slug = (is_home && !slug.is_empty()).then(|| {
                log::warn!(
                    "Home page {} of {}/{} has slug {:?}; publishing it at the site root",
                    page.page_id,
                    tenant,
                    site,
                    slug
                );
                slug.to_string()
            });
            planned.push((prefix, page, ignored_slug));
        }

        let mut report = PublishReport::default();
        for (prefix, page, ignored_slug) in planned {
            for (name, content) in [
                ("index.html", &page.html),
                ("styles.css", &page.css),
                ("app.js", &page.js),
            ] {
                self.store.put(&format!("{prefix}{name}"), content.as_bytes())?;
                report.objects_written += 1;
                report.bytes_written += content.len();
            }
            if !page.is_clean() {
                log::warn!(
                    "Published {}/{} page {} with {} skipped or trimmed block(s)",
                    tenant,
                    site,
                    page.page_id,
                    page.diagnostics.len()
                );
            }
            report.pages.push(PublishedPage {
                page_id: page.page_id.clone(),
                prefix,
                diagnostics: page.diagnostics.len(),
                ignored_slug,
            });
        }

        log::info!(
            "Published {}/{}: {} page(s), {} bytes",
            tenant,
            site,
            report.pages.len(),
            report.bytes_written
        );
        Ok(report)
    }
}

fn segment<'a>(field: &'static str, value: &'a str) -> Result<&'a str, PublishError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || check_path(trimmed).is_err() || trimmed.contains('/') {
        return Err(PublishError::InvalidSegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(trimmed)
}

/// Directory a page publishes to. The home page, and any page with an
/// empty slug, sits at the site root.
pub fn page_prefix(
    tenant: &str,
    site: &str,
    slug: &str,
    is_home: bool,
) -> Result<String, PublishError> {
    let slug = slug.trim().trim_matches('/');
    if is_home || slug.is_empty() {
        return Ok(format!("{tenant}/{site}/"));
    }
    if check_path(slug).is_err() {
        return Err(PublishError::InvalidSegment {
            field: "slug",
            value: slug.to_string(),
        });
    }
    Ok(format!("{tenant}/{site}/{slug}/"))
}
