//! The authenticated HTTP exchange layer.
//!
//! [`PortalClient`] owns the one thing every stage shares: the cookie-backed
//! connection context the portal identifies the session by. It exists for
//! exactly one run and is dropped with it; nothing is persisted.
//!
//! The portal distinguishes two exchange shapes, each with a fixed header
//! contract:
//!
//! * **Full page** GET/POST — the browser-identifying header set only.
//! * **Partial postback** POST — additionally the MS-AJAX marker headers
//!   (`X-MicrosoftAjax: Delta=true`, XHR marker, UTF-8 form content type),
//!   which switch the server into delta-encoded responses.
//!
//! Every exchange strictly depends on hidden state extracted from the
//! previous response, so concurrent mutating postbacks through one client
//! would desynchronize the server-side session. Callers must serialize them;
//! the library's own flow is entirely sequential.

use crate::config::PortalConfig;
use crate::error::{PortalError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER};
use tracing::debug;
use url::Url;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANG: &str = "en-US,en;q=0.5";

/// The exchange seam the pagination loop runs against.
///
/// [`PortalClient`] is the production implementation; tests drive the loop
/// with a scripted stand-in instead of a live portal.
#[async_trait]
pub trait PortalTransport: Send + Sync {
    /// Issue a partial postback against the service page and return the raw
    /// response body (a delta payload on success).
    async fn postback(&self, form: &[(String, String)]) -> Result<String>;

    /// Fetch binary page content from a resolved locator.
    async fn fetch_binary(&self, url: &Url) -> Result<Vec<u8>>;
}

/// One authenticated portal session: shared cookie jar, fixed header set,
/// and the exchange primitives every stage is built from.
#[derive(Debug, Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    config: PortalConfig,
}

impl PortalClient {
    /// Build a client for `config`. The cookie store is enabled because the
    /// portal's session id only ever travels as a cookie.
    pub fn new(config: PortalConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANG));

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| PortalError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// The configuration this session runs under.
    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Full-page GET, optionally carrying a `Referer`.
    pub async fn get_page(&self, url: &str, referer: Option<&str>) -> Result<String> {
        debug!(url, "GET");
        let mut req = self.http.get(url);
        if let Some(r) = referer {
            req = req.header(REFERER, r);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| PortalError::from_reqwest(url, self.config.http_timeout_secs, e))?;
        self.ensure_success(url, resp.status())?;
        resp.text()
            .await
            .map_err(|e| PortalError::from_reqwest(url, self.config.http_timeout_secs, e))
    }

    /// Full-page form POST (the login exchange). Returns the body even
    /// though the portal's answer carries no success signal; callers decide
    /// what, if anything, it means.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
        referer: &str,
    ) -> Result<String> {
        debug!(url, fields = form.len(), "POST form");
        let resp = self
            .http
            .post(url)
            .header(REFERER, referer)
            .form(form)
            .send()
            .await
            .map_err(|e| PortalError::from_reqwest(url, self.config.http_timeout_secs, e))?;
        self.ensure_success(url, resp.status())?;
        resp.text()
            .await
            .map_err(|e| PortalError::from_reqwest(url, self.config.http_timeout_secs, e))
    }

    /// Partial postback against the service page, with the MS-AJAX header
    /// contract applied.
    pub async fn postback_service(&self, form: &[(String, String)]) -> Result<String> {
        let url = self.config.service_url();
        debug!(url, fields = form.len(), "AJAX postback");
        // Encoded by hand rather than via `.form()`: the portal insists on
        // the charset parameter in the content type, which `.form()` would
        // overwrite with the bare media type.
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        let resp = self
            .http
            .post(&url)
            .header(REFERER, &url)
            .header("X-MicrosoftAjax", "Delta=true")
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ACCEPT, "*/*")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| PortalError::from_reqwest(&url, self.config.http_timeout_secs, e))?;
        self.ensure_success(&url, resp.status())?;
        resp.text()
            .await
            .map_err(|e| PortalError::from_reqwest(&url, self.config.http_timeout_secs, e))
    }

    fn ensure_success(&self, url: &str, status: reqwest::StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(PortalError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl PortalTransport for PortalClient {
    async fn postback(&self, form: &[(String, String)]) -> Result<String> {
        self.postback_service(form).await
    }

    async fn fetch_binary(&self, url: &Url) -> Result<Vec<u8>> {
        debug!(%url, "GET binary");
        let resp = self
            .http
            .get(url.clone())
            .header(REFERER, self.config.service_url())
            .send()
            .await
            .map_err(|e| {
                PortalError::from_reqwest(url.as_str(), self.config.http_timeout_secs, e)
            })?;
        self.ensure_success(url.as_str(), resp.status())?;
        let bytes = resp.bytes().await.map_err(|e| {
            PortalError::from_reqwest(url.as_str(), self.config.http_timeout_secs, e)
        })?;
        Ok(bytes.to_vec())
    }
}
