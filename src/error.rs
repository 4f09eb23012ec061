//! Error types for the examscript library.
//!
//! The portal never reports failure in-band: a rejected postback simply comes
//! back as a response that lacks the markers the next step needs. The error
//! taxonomy therefore distinguishes *where the contract broke* rather than
//! *what the server said*:
//!
//! * [`PortalError::ProtocolMismatch`] — an expected hidden field or marker
//!   is absent. This is the portal-version-drift signal: the pinned field
//!   contract no longer matches what the server renders.
//! * [`PortalError::AuthFailure`] — the login exchange was accepted locally
//!   but a later stage shows an unauthenticated page. Login itself has no
//!   success signal, so this only surfaces downstream (see
//!   [`crate::portal::auth`]).
//! * Transport variants (`Http`, `Network`, `Timeout`) — the exchange itself
//!   failed. No automatic retry: the server associates one live hidden-state
//!   set per session, and blindly re-POSTing after a failure desynchronizes
//!   it. A caller that wants to retry must restart the whole selection chain.
//!
//! A run that retrieves zero pages is *not* an error here — it is an empty
//! [`crate::SubjectDownload`]. Callers that want to treat it as one use
//! [`crate::SubjectDownload::into_result`], which maps it to
//! [`PortalError::EmptyDocument`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the examscript library.
#[derive(Debug, Error)]
pub enum PortalError {
    // ── Protocol errors ───────────────────────────────────────────────────
    /// An expected hidden field or page marker was absent from a response.
    ///
    /// The field/marker contract is pinned to one portal version; this error
    /// means the portal has drifted (or returned an error page in disguise).
    #[error(
        "Expected marker '{marker}' missing from the {stage} response.\n\
         The portal layout may have changed; this build targets a fixed field contract."
    )]
    ProtocolMismatch { stage: &'static str, marker: String },

    /// A later stage rendered the login form again: the session is not
    /// authenticated, even though the login exchange itself went through.
    #[error(
        "Not authenticated at the {stage} stage (the portal re-rendered its login form).\n\
         Check the roll number and password; the portal gives no explicit login error."
    )]
    AuthFailure { stage: &'static str },

    /// The requested course or subject code is not in the portal's listing.
    #[error("Resource '{code}' not found; available: {available:?}")]
    ResourceNotFound { code: String, available: Vec<String> },

    // ── Transport errors ──────────────────────────────────────────────────
    /// The server answered with a non-success HTTP status.
    #[error("HTTP {status} from '{url}'")]
    Http { url: String, status: u16 },

    /// The exchange failed below HTTP (DNS, TLS, connection reset, ...).
    #[error("Request to '{url}' failed: {reason}\nCheck your internet connection.")]
    Network { url: String, reason: String },

    /// The exchange exceeded the configured timeout.
    #[error("Request to '{url}' timed out after {secs}s\nIncrease the HTTP timeout in PortalConfig.")]
    Timeout { url: String, secs: u64 },

    // ── Result errors ─────────────────────────────────────────────────────
    /// Pagination finished without retrieving a single page.
    ///
    /// Produced only by [`crate::SubjectDownload::into_result`]; the run
    /// itself reports this as an empty result, not a failure.
    #[error("No pages retrieved for '{resource}' (stopped: {stop_reason})")]
    EmptyDocument {
        resource: String,
        stop_reason: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The sink could not store a page or assemble the output document.
    #[error("Failed to write '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A retrieved page could not be decoded or re-encoded during assembly.
    #[error("Page {page} could not be assembled: {detail}")]
    BadPageImage { page: u32, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PortalError {
    /// Classify a `reqwest` error for the exchange against `url`.
    pub(crate) fn from_reqwest(url: &str, timeout_secs: u64, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PortalError::Timeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PortalError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PortalError>;
