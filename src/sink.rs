//! Where retrieved pages go.
//!
//! The pagination loop only ever talks to the [`DocumentSink`] trait: it
//! hands over each unique page in document order and asks for one
//! `finalize` at the end. That keeps storage policy (directory layout,
//! container format, cleanup) out of the protocol code and lets tests run
//! the loop against an in-memory sink.
//!
//! [`ImageDirSink`] is the shipped implementation: pages land as numbered
//! PNGs in a per-subject directory and `finalize` assembles them — cover
//! page first when one was provided — into a single multi-page TIFF,
//! deleting the intermediates.

use crate::error::{PortalError, Result};
use crate::output::{DocumentHandle, ImageArtifact, PageArtifact};
use async_trait::async_trait;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tiff::encoder::{colortype, TiffEncoder};
use tracing::{debug, info, warn};

/// Receives pages from a pagination run and assembles the output document.
///
/// `accept` is called once per unique page, in sequence order. `finalize`
/// is called once, after the run reaches its terminal state; a run that
/// aborts early never calls it, leaving whatever was accepted in place for
/// manual recovery.
#[async_trait]
pub trait DocumentSink: Send {
    /// Store one retrieved page.
    async fn accept(&mut self, page: &PageArtifact) -> Result<()>;

    /// Provide a rendered summary image to prepend as a cover page.
    /// Implementations that have no use for a cover may ignore it.
    fn accept_cover(&mut self, image: ImageArtifact) {
        let _ = image;
    }

    /// Assemble everything accepted so far into one output document.
    async fn finalize(&mut self, resource_code: &str) -> Result<DocumentHandle>;
}

/// Renders a tabular record (header row + value row) into an image suitable
/// for use as a cover page.
///
/// No implementation ships with this crate — rasterizing text needs a font
/// stack nothing else here wants. Callers that have one plug it in; the
/// download flow treats it as optional throughout.
pub trait TableRenderer: Send + Sync {
    fn render(&self, header: &[String], values: &[String]) -> Result<ImageArtifact>;
}

/// Sink that spools pages to a directory and finalizes into a multi-page
/// TIFF.
#[derive(Debug)]
pub struct ImageDirSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
    cover: Option<ImageArtifact>,
}

impl ImageDirSink {
    /// Pages and the final document will be written under `dir` (created on
    /// first use).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
            cover: None,
        }
    }

    /// The directory this sink writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_err(path: &Path, source: std::io::Error) -> PortalError {
        PortalError::OutputWrite {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl DocumentSink for ImageDirSink {
    async fn accept(&mut self, page: &PageArtifact) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Self::write_err(&self.dir, e))?;
        let path = self.dir.join(format!("page_{:02}.png", page.seq));
        tokio::fs::write(&path, &page.bytes)
            .await
            .map_err(|e| Self::write_err(&path, e))?;
        debug!(path = %path.display(), bytes = page.bytes.len(), "page stored");
        self.written.push(path);
        Ok(())
    }

    fn accept_cover(&mut self, image: ImageArtifact) {
        self.cover = Some(image);
    }

    async fn finalize(&mut self, resource_code: &str) -> Result<DocumentHandle> {
        let out_path = self.dir.join(format!("{resource_code}.tiff"));
        let tmp_path = self.dir.join(format!("{resource_code}.tiff.tmp"));

        let pages = std::mem::take(&mut self.written);
        let cover = self.cover.take();
        let tmp = tmp_path.clone();
        // The TIFF encoder is synchronous and the re-encode is CPU-bound;
        // keep it off the async executor.
        let page_count = tokio::task::spawn_blocking(move || -> Result<u32> {
            assemble_tiff(&pages, cover.as_ref(), &tmp)
        })
        .await
        .map_err(|e| Self::write_err(&tmp_path, std::io::Error::other(e)))??;

        // Write-then-rename so a crash never leaves a half-written document
        // under the final name.
        tokio::fs::rename(&tmp_path, &out_path)
            .await
            .map_err(|e| Self::write_err(&out_path, e))?;

        // The intermediates served their purpose; failure to delete one is
        // worth a warning, not an error.
        for page in glob_pages(&self.dir).await {
            if let Err(e) = tokio::fs::remove_file(&page).await {
                warn!(path = %page.display(), error = %e, "could not remove intermediate page");
            }
        }

        info!(path = %out_path.display(), pages = page_count, "document assembled");
        Ok(DocumentHandle {
            path: out_path,
            pages: page_count,
        })
    }
}

/// All `page_NN.png` intermediates currently in `dir`.
async fn glob_pages(dir: &Path) -> Vec<PathBuf> {
    let mut pages = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return pages;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("page_") && name.ends_with(".png") {
            pages.push(entry.path());
        }
    }
    pages.sort();
    pages
}

/// Decode each page image and write it as one TIFF frame, cover first.
fn assemble_tiff(
    pages: &[PathBuf],
    cover: Option<&ImageArtifact>,
    out: &Path,
) -> Result<u32> {
    let file = std::fs::File::create(out)
        .map_err(|e| ImageDirSink::write_err(out, e))?;
    let mut encoder = TiffEncoder::new(std::io::BufWriter::new(file))
        .map_err(|e| ImageDirSink::write_err(out, std::io::Error::other(e)))?;

    let mut count = 0u32;
    if let Some(cover) = cover {
        write_frame(&mut encoder, &cover.bytes, 0, out)?;
        count += 1;
    }
    for (i, page) in pages.iter().enumerate() {
        let bytes = std::fs::read(page).map_err(|e| ImageDirSink::write_err(page, e))?;
        write_frame(&mut encoder, &bytes, (i + 1) as u32, out)?;
        count += 1;
    }
    Ok(count)
}

fn write_frame<W: Write + Seek>(
    encoder: &mut TiffEncoder<W>,
    bytes: &[u8],
    page: u32,
    out: &Path,
) -> Result<()> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| PortalError::BadPageImage {
            page,
            detail: e.to_string(),
        })?
        .to_rgb8();
    let (w, h) = img.dimensions();
    encoder
        .write_image::<colortype::RGB8>(w, h, img.as_raw())
        .map_err(|e| ImageDirSink::write_err(out, std::io::Error::other(e)))
}
