//! Configuration for a portal session.
//!
//! All behaviour is controlled through [`PortalConfig`], built via its
//! [`PortalConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share a config across an entire download run, serialise it for logging,
//! and diff two runs to understand why their outputs differ.
//!
//! The defaults encode the one portal deployment this crate targets. They are
//! compiled in rather than read from a file: the field contract (see
//! [`crate::portal::forms`]) is pinned to a specific portal version anyway,
//! so a config file would only offer knobs that cannot safely be turned.

use crate::error::PortalError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one portal download run.
///
/// Built via [`PortalConfig::builder()`] or [`PortalConfig::default()`].
///
/// # Example
/// ```rust
/// use examscript::PortalConfig;
///
/// let config = PortalConfig::builder()
///     .page_ceiling(20)
///     .inter_page_delay_ms(500)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Portal origin, e.g. `https://aktuexams.in`. No trailing slash.
    pub base_url: String,

    /// Deployment path under the origin, e.g. `/AKTUSUMMER`. Leading slash,
    /// no trailing slash. The portal republishes under a new prefix every
    /// exam season; this is the only value that routinely changes.
    pub path_prefix: String,

    /// Hard upper bound on pages fetched per subject. Default: 36.
    ///
    /// The portal signals end-of-document only by repeating the last page,
    /// so a run that never sees a repeat (e.g. the server keeps serving a
    /// rotating banner image) would loop forever without this cap. 36 covers
    /// the largest answer booklet the portal issues.
    pub page_ceiling: u32,

    /// Pause between successive page fetches in milliseconds. Default: 300.
    ///
    /// This is a pacing contract with the portal, not an optimisation knob:
    /// the latency floor of a run is `pages × delay` by design. Lowering it
    /// risks the portal throttling or dropping the session.
    pub inter_page_delay_ms: u64,

    /// Per-exchange HTTP timeout in seconds. Default: 30.
    pub http_timeout_secs: u64,

    /// `User-Agent` sent on every request. The portal serves a degraded page
    /// to unrecognized agents, so this defaults to a desktop Firefox string.
    pub user_agent: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://aktuexams.in".to_string(),
            path_prefix: "/AKTUSUMMER".to_string(),
            page_ceiling: 36,
            inter_page_delay_ms: 300,
            http_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:144.0) \
                         Gecko/20100101 Firefox/144.0"
                .to_string(),
        }
    }
}

impl PortalConfig {
    /// Create a new builder for `PortalConfig`.
    pub fn builder() -> PortalConfigBuilder {
        PortalConfigBuilder {
            config: Self::default(),
        }
    }

    /// The login page (`frmIntelliHomePage.aspx`).
    pub fn login_url(&self) -> String {
        format!("{}{}/frmIntelliHomePage.aspx", self.base_url, self.path_prefix)
    }

    /// First hop of the fixed post-login redirect chain.
    pub fn post_login_url(&self) -> String {
        format!(
            "{}{}/LoginScreens/Default.aspx",
            self.base_url, self.path_prefix
        )
    }

    /// Second hop of the fixed post-login redirect chain; landing here
    /// establishes the authenticated master-page state.
    pub fn landing_url(&self) -> String {
        format!(
            "{}{}/LoginScreens/frmMasterpageRedirect.aspx",
            self.base_url, self.path_prefix
        )
    }

    /// The answer-script service page every selection and pagination
    /// postback targets.
    pub fn service_url(&self) -> String {
        format!(
            "{}{}/StudentServices/FrmAnswerScriptInitialPageView.aspx",
            self.base_url, self.path_prefix
        )
    }

    /// Root against which relative page-image paths are resolved.
    pub fn content_root(&self) -> String {
        format!("{}{}/StudentServices/", self.base_url, self.path_prefix)
    }

    /// Inter-page delay as a [`Duration`].
    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }
}

/// Builder for [`PortalConfig`].
#[derive(Debug)]
pub struct PortalConfigBuilder {
    config: PortalConfig,
}

impl PortalConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.path_prefix = prefix.into();
        self
    }

    pub fn page_ceiling(mut self, n: u32) -> Self {
        self.config.page_ceiling = n.max(1);
        self
    }

    pub fn inter_page_delay_ms(mut self, ms: u64) -> Self {
        self.config.inter_page_delay_ms = ms;
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.config.http_timeout_secs = secs.max(1);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PortalConfig, PortalError> {
        let c = &self.config;
        if !c.base_url.starts_with("http://") && !c.base_url.starts_with("https://") {
            return Err(PortalError::InvalidConfig(format!(
                "base_url must be an absolute http(s) origin, got '{}'",
                c.base_url
            )));
        }
        if c.base_url.ends_with('/') {
            return Err(PortalError::InvalidConfig(
                "base_url must not end with '/'".into(),
            ));
        }
        if !c.path_prefix.starts_with('/') || c.path_prefix.ends_with('/') {
            return Err(PortalError::InvalidConfig(format!(
                "path_prefix must start with '/' and not end with one, got '{}'",
                c.path_prefix
            )));
        }
        if c.page_ceiling == 0 {
            return Err(PortalError::InvalidConfig("page_ceiling must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
