//! The page-retrieval loop.
//!
//! The portal exposes one script page at a time and gives no page count and
//! no explicit last-page signal. Termination is inferred, in priority order:
//!
//! 1. **Duplicate content** — past the last page the portal serves the
//!    previous page again; a repeated content hash is the end-of-document
//!    signal. (If a document ever legitimately contained two byte-identical
//!    pages this would truncate it early — accepted limitation of the
//!    protocol, not worked around.)
//! 2. **Missing next control** — the response stops rendering the next-page
//!    button.
//! 3. **Page ceiling** — a hard cap so a misbehaving portal cannot loop the
//!    run forever.
//!
//! A fixed delay is enforced between successive fetches. That is a pacing
//! contract with the portal, so a run's latency floor is `pages × delay` by
//! construction.

use crate::config::PortalConfig;
use crate::error::{PortalError, Result};
use crate::output::PageArtifact;
use crate::portal::client::PortalTransport;
use crate::portal::{extract, forms};
use crate::session::SessionState;
use crate::sink::DocumentSink;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};
use url::Url;

/// Why a pagination run stopped. Every variant is a normal outcome; fatal
/// conditions surface as errors instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The portal served content already retrieved this run — the
    /// end-of-document signal.
    DuplicatePage,
    /// The response no longer renders a next-page control.
    NoNextControl,
    /// The configured page ceiling was reached.
    CeilingReached,
    /// The response carried no page image. On the first page this means an
    /// empty document; mid-run it aborts with the pages so far preserved.
    MissingImage,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::DuplicatePage => "duplicate page content (end of document)",
            StopReason::NoNextControl => "no next-page control in the response",
            StopReason::CeilingReached => "page ceiling reached",
            StopReason::MissingImage => "no page image in the response",
        };
        f.write_str(s)
    }
}

/// Outcome of one pagination run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRun {
    /// Unique pages handed to the sink.
    pub pages: u32,
    pub stop: StopReason,
}

/// Content hashes already retrieved in this run.
///
/// One guard per run, owned by the run: duplicate detection across runs
/// would be wrong (the same subject re-downloaded must not terminate on
/// page one).
#[derive(Debug, Default)]
pub struct DedupGuard {
    seen: HashSet<[u8; 32]>,
}

impl DedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// SHA-256 digest of page content.
    pub fn digest(bytes: &[u8]) -> [u8; 32] {
        Sha256::digest(bytes).into()
    }

    /// Record a hash. Returns `false` when it was already present — the
    /// duplicate-page signal.
    pub fn insert(&mut self, hash: [u8; 32]) -> bool {
        self.seen.insert(hash)
    }

    pub fn contains(&self, hash: &[u8; 32]) -> bool {
        self.seen.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Drives the fetch → hash → advance loop for one subject.
pub struct PaginationEngine<'a> {
    transport: &'a dyn PortalTransport,
    config: &'a PortalConfig,
    course_value: &'a str,
    content_root: Url,
}

impl<'a> PaginationEngine<'a> {
    pub fn new(
        transport: &'a dyn PortalTransport,
        config: &'a PortalConfig,
        course_value: &'a str,
    ) -> Result<Self> {
        let content_root = Url::parse(&config.content_root()).map_err(|e| {
            PortalError::InvalidConfig(format!("content root is not a valid URL: {e}"))
        })?;
        Ok(Self {
            transport,
            config,
            course_value,
            content_root,
        })
    }

    /// Retrieve every page reachable from `initial_response`, handing each
    /// unique page to `sink` in document order.
    ///
    /// `initial_state` is the hidden-field state the subject-selection
    /// exchange produced; the loop keeps merging each response's state onto
    /// it so fields a delta payload omits persist.
    ///
    /// Returns the count of unique pages and the stop reason. A zero-page
    /// run is a valid outcome, not an error; transport failures and
    /// mid-run session expiry abort with `Err` (pages already accepted stay
    /// with the sink).
    pub async fn run(
        &self,
        initial_response: String,
        initial_state: SessionState,
        sink: &mut dyn DocumentSink,
    ) -> Result<PageRun> {
        let mut guard = DedupGuard::new();
        let mut state = initial_state;
        let mut body = initial_response;
        let mut pages: u32 = 0;

        let stop = loop {
            // Locate this page's image
            let Some(locator) = extract::extract_image_locator(&body, &self.content_root)?
            else {
                if pages == 0 {
                    warn!("first response carried no page image; empty document");
                }
                break StopReason::MissingImage;
            };

            // Fetch and evaluate
            let bytes = self.transport.fetch_binary(&locator).await?;
            let hash = DedupGuard::digest(&bytes);
            if !guard.insert(hash) {
                debug!(page = pages + 1, "repeated content hash");
                break StopReason::DuplicatePage;
            }

            pages += 1;
            let artifact = PageArtifact { seq: pages, bytes, hash };
            info!(
                page = pages,
                bytes = artifact.bytes.len(),
                hash = artifact.hash_hex().as_str(),
                "page retrieved"
            );
            sink.accept(&artifact).await?;

            // Advance
            if !extract::has_next_affordance(&body) {
                break StopReason::NoNextControl;
            }
            if pages >= self.config.page_ceiling {
                break StopReason::CeilingReached;
            }

            tokio::time::sleep(self.config.inter_page_delay()).await;

            state.merge(extract::extract_form_state(&body));
            let form = forms::next_page_form(&state, self.course_value);
            body = self.transport.postback(&form).await?;
            if extract::delta_redirect(&body).is_some() {
                return Err(PortalError::AuthFailure { stage: "pagination" });
            }
        };

        info!(pages, %stop, "pagination finished");
        Ok(PageRun { pages, stop })
    }
}
