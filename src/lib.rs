//! # examscript
//!
//! Download scanned answer scripts from the AKTU exam portal and assemble
//! them into a single document.
//!
//! ## Why this crate?
//!
//! The portal is a legacy ASP.NET WebForms application: no REST endpoints,
//! no JSON — just server-rendered forms whose hidden state tokens are
//! regenerated on every exchange and must be echoed back exactly, and
//! partial-page AJAX updates in a pipe-delimited delta encoding. Fetching
//! the images is the easy part; this crate's job is emulating that
//! sequential postback protocol correctly, including detecting the end of
//! the document (the portal's only end signal is serving the last page
//! twice).
//!
//! ## Pipeline Overview
//!
//! ```text
//! login
//!  │
//!  ├─ 1. Auth      credential postback + fixed redirect chain
//!  ├─ 2. Course    dropdown selection (partial postback)
//!  ├─ 3. Subject   grid-row image-button "click" (partial postback)
//!  ├─ 4. Marks     optional per-question breakdown table
//!  ├─ 5. Pages     locate image → fetch → hash → next postback … until
//!  │               a repeated hash / missing control / page ceiling
//!  └─ 6. Assemble  accepted pages (cover first) → one multi-page TIFF
//! ```
//!
//! Every arrow depends on hidden-field state extracted from the previous
//! response, so the whole flow is sequential by construction. A fixed delay
//! between page fetches is part of the contract with the portal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use examscript::{
//!     auth, download, select, Credentials, ImageDirSink, PortalClient, PortalConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PortalClient::new(PortalConfig::default())?;
//!     auth::login(&client, &Credentials::new("2100290100001", "password")).await?;
//!
//!     let courses = select::list_courses(&client).await?;
//!     let course = select::find_handle(&courses, "BTECH")?;
//!
//!     let mut sink = ImageDirSink::new("out/KAS103");
//!     let result = download::download_one(&client, course, "KAS103", &mut sink, None).await?;
//!     println!("{} pages → {:?}", result.pages, result.document);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `examscript` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! examscript = { version = "0.2", default-features = false }
//! ```
//!
//! ## A word on reliability
//!
//! The field contract ([`portal::forms`]) is pinned to one portal build.
//! When the portal is redeployed with a different control tree, requests
//! start failing as [`PortalError::ProtocolMismatch`] — that is the crate
//! telling you its constants need re-capturing, not a transient error.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod download;
pub mod error;
pub mod output;
pub mod portal;
pub mod session;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PortalConfig, PortalConfigBuilder};
pub use error::{PortalError, Result};
pub use output::{DocumentHandle, ImageArtifact, MarksRecord, PageArtifact, SubjectDownload};
pub use portal::auth;
pub use portal::client::{PortalClient, PortalTransport};
pub use portal::paginate::{DedupGuard, PageRun, PaginationEngine, StopReason};
pub use portal::select::{self, ResourceHandle};
pub use session::{Credentials, SessionState};
pub use sink::{DocumentSink, ImageDirSink, TableRenderer};
