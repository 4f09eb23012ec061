//! Response parsing: hidden fields, page-image locators, and the marks table.
//!
//! The portal answers in two encodings. Full page loads are ordinary HTML.
//! Partial postbacks return the MS-AJAX delta format — a flat sequence of
//! `length|kind|id|content|` records carrying only the fragments and hidden
//! fields that changed. Everything in this module accepts either encoding
//! behind one signature; callers never branch on the wire format.
//!
//! Extraction is structured, not pattern-matched: delta payloads go through
//! a length-aware tokenizer and markup goes through a real HTML parse, so a
//! missing field is an explicit `None`/empty outcome the caller can turn
//! into `ProtocolMismatch`, never a silently empty string.

use crate::output::MarksRecord;
use crate::portal::forms;
use crate::session::SessionState;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

static HIDDEN_INPUT_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[type="hidden"]"#).unwrap());
static PAGE_IMAGE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(&format!("img#{}", forms::PAGE_IMAGE_ID)).unwrap());
static MARKS_TABLE_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(&format!("table#{}", forms::MARKS_PANEL_ID)).unwrap());
static ROW_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").unwrap());

// ── Delta payload tokenizer ──────────────────────────────────────────────

/// One `length|kind|id|content|` record from a delta payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaNode<'a> {
    /// Record kind, e.g. `updatePanel`, `hiddenField`, `pageRedirect`.
    pub kind: &'a str,
    /// Control id the record applies to (empty for some kinds).
    pub id: &'a str,
    /// Raw content; HTML for `updatePanel`, an opaque token for
    /// `hiddenField`.
    pub content: &'a str,
}

/// Does this response use the delta encoding?
///
/// Delta payloads always open with an ASCII record length; markup opens
/// with `<`, a doctype, or whitespace.
pub fn is_delta_payload(text: &str) -> bool {
    match text.split_once('|') {
        Some((len, _)) => !len.is_empty() && len.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Tokenize a delta payload into its records.
///
/// The declared length counts characters of `content`; a record whose
/// declared length overruns the payload means the stream is corrupt, and
/// `None` is returned rather than a guess.
pub fn parse_delta(text: &str) -> Option<Vec<DeltaNode<'_>>> {
    let mut nodes = Vec::new();
    let mut rest = text;
    while !rest.trim().is_empty() {
        let (len_str, r) = rest.split_once('|')?;
        let len: usize = len_str.trim().parse().ok()?;
        let (kind, r) = r.split_once('|')?;
        let (id, r) = r.split_once('|')?;

        // Take exactly `len` characters of content.
        let mut byte_end = r.len();
        let mut chars_seen = 0usize;
        for (i, _) in r.char_indices() {
            if chars_seen == len {
                byte_end = i;
                break;
            }
            chars_seen += 1;
        }
        if chars_seen < len && byte_end == r.len() {
            return None;
        }
        let content = &r[..byte_end];
        nodes.push(DeltaNode { kind, id, content });

        let after = &r[byte_end..];
        rest = after.strip_prefix('|').unwrap_or(after);
    }
    Some(nodes)
}

/// The redirect target from a `pageRedirect` record, if the payload carries
/// one. The portal answers with this instead of panel updates when the
/// server-side session has expired.
pub fn delta_redirect(text: &str) -> Option<String> {
    if !is_delta_payload(text) {
        return None;
    }
    parse_delta(text)?
        .into_iter()
        .find(|n| n.kind == "pageRedirect")
        .map(|n| n.content.to_string())
}

// ── Unified field extraction ─────────────────────────────────────────────

/// Extract the hidden-field set from a response in either encoding.
///
/// The result covers only what this response *carried*; merging it onto the
/// session's prior state (fields absent here persist) is the caller's job
/// via [`SessionState::merge`].
pub fn extract_fields(text: &str) -> SessionState {
    if is_delta_payload(text) {
        match parse_delta(text) {
            Some(nodes) => nodes
                .into_iter()
                .filter(|n| n.kind == "hiddenField")
                .map(|n| (n.id.to_string(), n.content.to_string()))
                .collect(),
            None => {
                warn!("malformed delta payload; no fields extracted");
                SessionState::new()
            }
        }
    } else {
        hidden_inputs(&Html::parse_document(text))
    }
}

/// The complete round-trippable field set of a response, for building the
/// next postback body.
///
/// For markup this equals [`extract_fields`]. For a delta payload it is the
/// hidden inputs rendered *inside* the updated panels (the portal parks
/// per-row tokens there, e.g. the subject grid's opaque ids) overlaid with
/// the payload's own `hiddenField` records.
pub fn extract_form_state(text: &str) -> SessionState {
    if is_delta_payload(text) {
        let mut state = SessionState::new();
        for scope in document_scopes(text) {
            state.merge(hidden_inputs(&scope));
        }
        state.merge(extract_fields(text));
        state
    } else {
        extract_fields(text)
    }
}

/// Hidden `<input>` name/value pairs from parsed markup.
fn hidden_inputs(html: &Html) -> SessionState {
    html.select(&HIDDEN_INPUT_SEL)
        .filter_map(|input| {
            let name = input.attr("name").filter(|n| !n.is_empty())?;
            Some((
                name.to_string(),
                input.attr("value").unwrap_or_default().to_string(),
            ))
        })
        .collect()
}

/// Every markup scope in the response: the whole document for an HTML
/// response, or each `updatePanel` fragment for a delta payload.
pub fn document_scopes(text: &str) -> Vec<Html> {
    if is_delta_payload(text) {
        parse_delta(text)
            .map(|nodes| {
                nodes
                    .into_iter()
                    .filter(|n| n.kind == "updatePanel")
                    .map(|n| Html::parse_fragment(n.content))
                    .collect()
            })
            .unwrap_or_default()
    } else {
        vec![Html::parse_document(text)]
    }
}

// ── Page image locator ───────────────────────────────────────────────────

/// Find the answer-script page image in a response and resolve its URL.
///
/// `Ok(None)` means the response genuinely carries no page image (a distinct
/// outcome from any transport failure); the pagination loop treats that as
/// the end of usable content. Relative sources are resolved against
/// `content_root` after dropping the portal's habitual leading `../`.
pub fn extract_image_locator(
    text: &str,
    content_root: &Url,
) -> crate::error::Result<Option<Url>> {
    for scope in document_scopes(text) {
        let Some(img) = scope.select(&PAGE_IMAGE_SEL).next() else {
            continue;
        };
        let Some(src) = img.attr("src").filter(|s| !s.is_empty()) else {
            continue;
        };
        let src = src.strip_prefix("../").unwrap_or(src);
        let url = content_root.join(src).map_err(|_| {
            crate::error::PortalError::ProtocolMismatch {
                stage: "page image",
                marker: format!("unresolvable image source '{src}'"),
            }
        })?;
        return Ok(Some(url));
    }
    Ok(None)
}

/// Does the response still render the next-page control?
///
/// A raw substring check on the marker id, deliberately: it must behave
/// identically on markup and delta payloads, and the id string occurs in
/// neither unless the control was rendered.
pub fn has_next_affordance(text: &str) -> bool {
    text.contains(forms::NEXT_MARKER_ID)
}

// ── Marks table ──────────────────────────────────────────────────────────

/// Pull the per-question marks breakdown out of a response, if the portal
/// rendered one. Rows are recognized by their tag cells (`Q.Num` for the
/// header, `Main Valuation` for the value row); a panel missing either row
/// yields `None`.
pub fn extract_marks(text: &str) -> Option<MarksRecord> {
    for scope in document_scopes(text) {
        let Some(table) = scope.select(&MARKS_TABLE_SEL).next() else {
            continue;
        };
        let mut header: Option<Vec<String>> = None;
        let mut values: Option<Vec<String>> = None;
        for row in table.select(&ROW_SEL) {
            let cells: Vec<String> = row
                .select(&CELL_SEL)
                .map(|c| c.text().collect::<String>().trim().to_string())
                .collect();
            if cells.is_empty() {
                continue;
            }
            if cells.iter().any(|c| c.contains("Q.Num")) {
                header = Some(cells);
            } else if cells.iter().any(|c| c.contains("Main Valuation")) {
                values = Some(cells);
            }
        }
        if let (Some(header), Some(values)) = (header, values) {
            return Some(MarksRecord { header, values });
        }
    }
    None
}
