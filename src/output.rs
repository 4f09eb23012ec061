//! Result types produced by a download run.

use crate::error::PortalError;
use crate::portal::paginate::StopReason;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One retrieved page: its position, raw bytes, and content digest.
///
/// Sequence numbers are 1-based and strictly increasing with no gaps; the
/// protocol has no random access, so retrieval order *is* document order.
#[derive(Debug, Clone)]
pub struct PageArtifact {
    /// 1-based position within the document.
    pub seq: u32,
    /// Raw image bytes as served by the portal (PNG or JPEG).
    pub bytes: Vec<u8>,
    /// SHA-256 digest of `bytes`, as used for duplicate detection.
    pub hash: [u8; 32],
}

impl PageArtifact {
    /// Digest rendered as lowercase hex, for logs and file naming.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

/// An encoded raster image produced outside the pagination loop
/// (currently only the rendered marks summary used as a cover page).
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    /// PNG-encoded image bytes.
    pub bytes: Vec<u8>,
}

/// The per-question marks breakdown the portal renders next to the script.
///
/// Purely additive: many subjects have no marks panel, and its absence never
/// affects page retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarksRecord {
    /// Column labels, e.g. `Q.Num`, `1`, `2`, ...
    pub header: Vec<String>,
    /// One value per column, aligned with `header`.
    pub values: Vec<String>,
}

impl MarksRecord {
    /// Render as two CSV lines (header, values). Fields containing commas,
    /// quotes or newlines are quoted per RFC 4180.
    pub fn to_csv(&self) -> String {
        fn csv_line(cells: &[String]) -> String {
            cells
                .iter()
                .map(|c| {
                    if c.contains([',', '"', '\n']) {
                        format!("\"{}\"", c.replace('"', "\"\""))
                    } else {
                        c.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(",")
        }
        format!("{}\n{}\n", csv_line(&self.header), csv_line(&self.values))
    }
}

/// The assembled output document a sink produced in `finalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentHandle {
    /// Where the document was written.
    pub path: PathBuf,
    /// Pages in the document, including a cover page if one was prepended.
    pub pages: u32,
}

/// Summary of one subject's download run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectDownload {
    /// Subject code, e.g. `KAS103`.
    pub subject_code: String,
    /// Display name from the portal listing.
    pub subject_name: String,
    /// Unique pages retrieved (the repeated terminal page is excluded).
    pub pages: u32,
    /// Why pagination stopped.
    pub stop: StopReason,
    /// Marks breakdown, when the portal rendered one.
    pub marks: Option<MarksRecord>,
    /// The assembled document, when the sink produced one.
    pub document: Option<DocumentHandle>,
    /// Wall-clock duration of the whole run in milliseconds.
    pub duration_ms: u64,
}

impl SubjectDownload {
    /// Treat an empty run as an error.
    ///
    /// A zero-page run is a legitimate outcome of the protocol (the very
    /// first response may carry no page image), so the library reports it as
    /// data; callers that consider it a failure convert here.
    pub fn into_result(self) -> Result<SubjectDownload, PortalError> {
        if self.pages == 0 {
            Err(PortalError::EmptyDocument {
                resource: self.subject_code,
                stop_reason: self.stop.to_string(),
            })
        } else {
            Ok(self)
        }
    }
}
