//! Integration tests for the pagination loop.
//!
//! These drive `PaginationEngine` end to end against a scripted transport
//! and an in-memory sink — no network, no portal. Each scenario encodes one
//! termination contract of the protocol: duplicate-content stop, missing
//! next control, page ceiling, missing page image, and mid-run transport
//! failure.

use async_trait::async_trait;
use examscript::{
    DocumentHandle, DocumentSink, PageArtifact, PaginationEngine, PortalConfig, PortalError,
    PortalTransport, SessionState, StopReason,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Initialize tracing for tests that need log output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("examscript=debug")),
        )
        .with_test_writer()
        .try_init();
}

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Serves a scripted sequence of postback responses and a fixed set of page
/// images, recording every form body it receives.
#[derive(Default)]
struct MockTransport {
    responses: Mutex<VecDeque<String>>,
    images: Mutex<HashMap<String, Vec<u8>>>,
    forms_seen: Mutex<Vec<Vec<(String, String)>>>,
}

impl MockTransport {
    fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    /// Register the image served for `Scripts/<name>`.
    fn serve_image(&self, name: &str, bytes: &[u8]) {
        self.images
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
    }

    fn forms(&self) -> Vec<Vec<(String, String)>> {
        self.forms_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortalTransport for MockTransport {
    async fn postback(&self, form: &[(String, String)]) -> examscript::Result<String> {
        self.forms_seen.lock().unwrap().push(form.to_vec());
        self.responses.lock().unwrap().pop_front().ok_or_else(|| {
            PortalError::Http {
                url: "mock://postback".into(),
                status: 500,
            }
        })
    }

    async fn fetch_binary(&self, url: &Url) -> examscript::Result<Vec<u8>> {
        let name = url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or_default()
            .to_string();
        self.images
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .ok_or_else(|| PortalError::Http {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Collects accepted pages in memory.
#[derive(Default)]
struct MemorySink {
    pages: Vec<PageArtifact>,
    finalized: Option<String>,
}

#[async_trait]
impl DocumentSink for MemorySink {
    async fn accept(&mut self, page: &PageArtifact) -> examscript::Result<()> {
        self.pages.push(page.clone());
        Ok(())
    }

    async fn finalize(&mut self, resource_code: &str) -> examscript::Result<DocumentHandle> {
        self.finalized = Some(resource_code.to_string());
        Ok(DocumentHandle {
            path: resource_code.into(),
            pages: self.pages.len() as u32,
        })
    }
}

// ── Fixture builders ─────────────────────────────────────────────────────────

fn delta(records: &[(&str, &str, &str)]) -> String {
    records
        .iter()
        .map(|(kind, id, content)| {
            format!("{}|{}|{}|{}|", content.chars().count(), kind, id, content)
        })
        .collect()
}

/// A delta response rendering the page image for `page_name` and,
/// optionally, the next-page control.
fn page_response(page_name: &str, has_next: bool) -> String {
    let next = if has_next {
        r#"<input type="image" name="ctl00$Ajaxmastercontentplaceholder$Next"
           id="ctl00_Ajaxmastercontentplaceholder_Next" src="next.gif" />"#
    } else {
        ""
    };
    let panel = format!(
        r#"<div><img id="ctl00_Ajaxmastercontentplaceholder_IMGAS"
           src="Scripts/{page_name}" />{next}</div>"#
    );
    delta(&[
        ("updatePanel", "pnl", panel.as_str()),
        ("hiddenField", "__VIEWSTATE", "vs-next"),
    ])
}

/// A delta response with panels but no page image.
fn imageless_response() -> String {
    delta(&[("updatePanel", "pnl", "<div><p>Nothing on display.</p></div>")])
}

fn config() -> PortalConfig {
    // Zero delay keeps the suite fast; the pacing contract itself is a
    // config constant, not loop logic.
    PortalConfig::builder()
        .inter_page_delay_ms(0)
        .build()
        .unwrap()
}

fn config_with_ceiling(n: u32) -> PortalConfig {
    PortalConfig::builder()
        .inter_page_delay_ms(0)
        .page_ceiling(n)
        .build()
        .unwrap()
}

/// Serve `n` distinct page images named `page1.png` … `pageN.png`.
fn serve_distinct_pages(transport: &MockTransport, n: usize) {
    for i in 1..=n {
        transport.serve_image(&format!("page{i}.png"), format!("content-{i}").as_bytes());
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

/// N distinct pages followed by a repeat of page N: exactly N pages, stopped
/// on the duplicate.
#[tokio::test]
async fn repeat_of_last_page_terminates_with_n_pages() {
    init_tracing();
    let n = 4;
    let mut responses: Vec<String> = (2..=n).map(|i| page_response(&format!("page{i}.png"), true)).collect();
    // The portal answers the postback past the last page by serving page N again
    responses.push(page_response(&format!("page{n}.png"), true));
    let transport = MockTransport::new(responses);
    serve_distinct_pages(&transport, n);

    let cfg = config();
    let engine = PaginationEngine::new(&transport, &cfg, "BTECH2024").unwrap();
    let mut sink = MemorySink::default();
    let run = engine
        .run(page_response("page1.png", true), SessionState::new(), &mut sink)
        .await
        .unwrap();

    assert_eq!(run.pages, n as u32);
    assert_eq!(run.stop, StopReason::DuplicatePage);
    assert_eq!(sink.pages.len(), n);
    // Sequence numbers are 1-based, gapless, in retrieval order
    let seqs: Vec<u32> = sink.pages.iter().map(|p| p.seq).collect();
    assert_eq!(seqs, (1..=n as u32).collect::<Vec<_>>());
}

/// Ten distinct pages behind a ceiling of five: exactly five pages, and the
/// stop reason is the ceiling, not a duplicate.
#[tokio::test]
async fn ceiling_stops_before_duplicate_detection() {
    let responses: Vec<String> = (2..=10)
        .map(|i| page_response(&format!("page{i}.png"), true))
        .collect();
    let transport = MockTransport::new(responses);
    serve_distinct_pages(&transport, 10);

    let cfg = config_with_ceiling(5);
    let engine = PaginationEngine::new(&transport, &cfg, "BTECH2024").unwrap();
    let mut sink = MemorySink::default();
    let run = engine
        .run(page_response("page1.png", true), SessionState::new(), &mut sink)
        .await
        .unwrap();

    assert_eq!(run.pages, 5);
    assert_eq!(run.stop, StopReason::CeilingReached);
    assert_ne!(run.stop, StopReason::DuplicatePage);
}

/// A response without the next-page control ends the run after its page.
#[tokio::test]
async fn missing_next_control_terminates() {
    let transport = MockTransport::new(vec![]);
    serve_distinct_pages(&transport, 1);

    let cfg = config();
    let engine = PaginationEngine::new(&transport, &cfg, "BTECH2024").unwrap();
    let mut sink = MemorySink::default();
    let run = engine
        .run(page_response("page1.png", false), SessionState::new(), &mut sink)
        .await
        .unwrap();

    assert_eq!(run.pages, 1);
    assert_eq!(run.stop, StopReason::NoNextControl);
}

/// No page image in the very first response: an empty result, not an error.
#[tokio::test]
async fn imageless_first_response_yields_zero_pages() {
    let transport = MockTransport::new(vec![]);
    let cfg = config();
    let engine = PaginationEngine::new(&transport, &cfg, "BTECH2024").unwrap();
    let mut sink = MemorySink::default();
    let run = engine
        .run(imageless_response(), SessionState::new(), &mut sink)
        .await
        .unwrap();

    assert_eq!(run.pages, 0);
    assert_eq!(run.stop, StopReason::MissingImage);
    assert!(sink.pages.is_empty());
}

/// Image missing mid-run: the run ends but pages already accepted stay with
/// the sink.
#[tokio::test]
async fn imageless_followup_preserves_pages_so_far() {
    let transport = MockTransport::new(vec![imageless_response()]);
    serve_distinct_pages(&transport, 1);

    let cfg = config();
    let engine = PaginationEngine::new(&transport, &cfg, "BTECH2024").unwrap();
    let mut sink = MemorySink::default();
    let run = engine
        .run(page_response("page1.png", true), SessionState::new(), &mut sink)
        .await
        .unwrap();

    assert_eq!(run.pages, 1);
    assert_eq!(run.stop, StopReason::MissingImage);
    assert_eq!(sink.pages.len(), 1);
}

/// A failed exchange aborts the run with an error; accepted pages stay with
/// the sink.
#[tokio::test]
async fn transport_failure_aborts_with_pages_preserved() {
    init_tracing();
    // No scripted responses: the first next-page postback fails
    let transport = MockTransport::new(vec![]);
    serve_distinct_pages(&transport, 1);

    let cfg = config();
    let engine = PaginationEngine::new(&transport, &cfg, "BTECH2024").unwrap();
    let mut sink = MemorySink::default();
    let err = engine
        .run(page_response("page1.png", true), SessionState::new(), &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, PortalError::Http { status: 500, .. }), "{err}");
    assert_eq!(sink.pages.len(), 1);
}

/// A session-expiry redirect in a pagination response surfaces as an auth
/// failure.
#[tokio::test]
async fn redirect_mid_run_is_auth_failure() {
    let redirect = delta(&[("pageRedirect", "", "/AKTUSUMMER/frmIntelliHomePage.aspx")]);
    let transport = MockTransport::new(vec![redirect]);
    serve_distinct_pages(&transport, 1);

    let cfg = config();
    let engine = PaginationEngine::new(&transport, &cfg, "BTECH2024").unwrap();
    let mut sink = MemorySink::default();
    let err = engine
        .run(page_response("page1.png", true), SessionState::new(), &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, PortalError::AuthFailure { .. }), "{err}");
}

/// The next-page postback carries the running state forward: fields the
/// delta responses never mention persist, updated tokens win, and stale
/// image-button coordinates are stripped.
#[tokio::test]
async fn next_postback_threads_state_correctly() {
    let transport = MockTransport::new(vec![page_response("page2.png", false)]);
    serve_distinct_pages(&transport, 2);

    let mut initial = SessionState::new();
    initial.set("__PREVIOUSPAGE", "pp-token");
    initial.set("__VIEWSTATE", "vs-initial");
    initial.set("someButton.x", "3");
    initial.set("someButton.y", "9");

    let cfg = config();
    let engine = PaginationEngine::new(&transport, &cfg, "BTECH2024").unwrap();
    let mut sink = MemorySink::default();
    let run = engine
        .run(page_response("page1.png", true), initial, &mut sink)
        .await
        .unwrap();
    assert_eq!(run.pages, 2);

    let forms = transport.forms();
    assert_eq!(forms.len(), 1);
    let form = &forms[0];
    let get = |name: &str| form.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str());

    // Field absent from every delta payload: prior value persists
    assert_eq!(get("__PREVIOUSPAGE"), Some("pp-token"));
    // Field the page-1 response updated: new token wins
    assert_eq!(get("__VIEWSTATE"), Some("vs-next"));
    // The advance is routed through the next-page event target
    assert_eq!(
        get("__EVENTTARGET"),
        Some("ctl00$Ajaxmastercontentplaceholder$Next")
    );
    assert_eq!(get("__ASYNCPOST"), Some("true"));
    assert_eq!(
        get("ctl00$Ajaxmastercontentplaceholder$ddlexamname"),
        Some("BTECH2024")
    );
    // Stale coordinates must not re-trigger their button
    assert_eq!(get("someButton.x"), None);
    assert_eq!(get("someButton.y"), None);
}

/// Identical content under two different names is still a duplicate: the
/// guard keys on content, not locator.
#[tokio::test]
async fn duplicate_detection_is_content_based_not_name_based() {
    let transport = MockTransport::new(vec![page_response("copy.png", true)]);
    transport.serve_image("page1.png", b"same-bytes");
    transport.serve_image("copy.png", b"same-bytes");

    let cfg = config();
    let engine = PaginationEngine::new(&transport, &cfg, "BTECH2024").unwrap();
    let mut sink = MemorySink::default();
    let run = engine
        .run(page_response("page1.png", true), SessionState::new(), &mut sink)
        .await
        .unwrap();

    assert_eq!(run.pages, 1);
    assert_eq!(run.stop, StopReason::DuplicatePage);
}
