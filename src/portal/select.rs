//! Course and subject listing/selection.
//!
//! Selection is a dependent chain: the course list comes from the service
//! page, choosing a course is a partial postback that renders the subject
//! grid, and choosing a subject is a second partial postback triggered
//! through that row's own image button. Every step re-scrapes the hidden
//! state from the latest response before posting — carrying stale tokens
//! forward is the classic way to get silently rejected.
//!
//! This is also where authentication is actually verified: an
//! unauthenticated session gets the login form re-rendered in place of the
//! listing, which surfaces here as [`PortalError::AuthFailure`] (see
//! [`crate::portal::auth`]).

use crate::error::{PortalError, Result};
use crate::portal::client::PortalClient;
use crate::portal::{extract, forms};
use crate::session::SessionState;
use once_cell::sync::Lazy;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

static DROPDOWN_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(&format!("select#{}", forms::EXAM_DROPDOWN_ID)).unwrap());
static OPTION_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("option").unwrap());
static GRID_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(&format!("table#{}", forms::SUBJECT_GRID_ID)).unwrap());
static GRID_ROW_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("tr.rowstyle").unwrap());
static CELL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());
static SPAN_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("span").unwrap());
static ASID_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[type="hidden"]"#).unwrap());
static TRIGGER_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"input[type="image"]"#).unwrap());
static LOGIN_MARKER_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(&format!(r#"input[name="{}"]"#, forms::USER_FIELD)).unwrap());

/// One selectable entry from a portal listing — a course from the exam
/// dropdown or a subject row from the grid.
///
/// A handle is consumed by exactly one selection postback; after that the
/// portal re-renders the listing and the old trigger names are stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// Display code, e.g. `BTECH` or `KAS103`.
    pub code: String,
    /// Display name from the listing.
    pub name: String,
    /// Portal-internal id: the dropdown option value for a course, the
    /// row's opaque script id for a subject.
    pub id: String,
    /// The row's image-button name, present only for grid entries; firing
    /// a selection means "clicking" this control.
    pub trigger: Option<String>,
}

/// Is the login form rendered in this response? If so the session is not
/// authenticated, whatever the login exchange claimed.
fn shows_login_form(text: &str) -> bool {
    extract::document_scopes(text)
        .iter()
        .any(|scope| scope.select(&LOGIN_MARKER_SEL).next().is_some())
}

fn listing_error(text: &str, stage: &'static str, marker: &str) -> PortalError {
    if shows_login_form(text) {
        PortalError::AuthFailure { stage }
    } else {
        PortalError::ProtocolMismatch {
            stage,
            marker: marker.to_string(),
        }
    }
}

// ── Parsing ──────────────────────────────────────────────────────────────

/// Extract the course handles from a service-page response.
///
/// Placeholder options (empty value or empty text) are skipped.
pub fn parse_courses(text: &str) -> Result<Vec<ResourceHandle>> {
    for scope in extract::document_scopes(text) {
        let Some(dropdown) = scope.select(&DROPDOWN_SEL).next() else {
            continue;
        };
        let courses: Vec<ResourceHandle> = dropdown
            .select(&OPTION_SEL)
            .filter_map(|opt| {
                let value = opt.attr("value").filter(|v| !v.is_empty())?;
                let text = opt.text().collect::<String>().trim().to_string();
                if text.is_empty() {
                    return None;
                }
                Some(ResourceHandle {
                    code: text.clone(),
                    name: text,
                    id: value.to_string(),
                    trigger: None,
                })
            })
            .collect();
        return Ok(courses);
    }
    Err(listing_error(text, "course listing", forms::EXAM_DROPDOWN_ID))
}

/// Extract the subject handles from a course-selection response.
///
/// Rows missing any of their expected sub-elements (code span, name span,
/// opaque id, trigger button) are skipped with a warning, not fatal: the
/// grid routinely carries pager/footer rows that are not subjects.
pub fn parse_subjects(text: &str) -> Result<Vec<ResourceHandle>> {
    for scope in extract::document_scopes(text) {
        let Some(grid) = scope.select(&GRID_SEL).next() else {
            continue;
        };
        let mut subjects = Vec::new();
        for row in grid.select(&GRID_ROW_SEL) {
            let cells: Vec<_> = row.select(&CELL_SEL).collect();
            if cells.len() < 3 {
                continue;
            }
            let code = cells[0]
                .select(&SPAN_SEL)
                .next()
                .map(|s| s.text().collect::<String>().trim().to_string());
            let name = cells[1]
                .select(&SPAN_SEL)
                .next()
                .map(|s| s.text().collect::<String>().trim().to_string());
            let asid = cells[2]
                .select(&ASID_SEL)
                .next()
                .and_then(|i| i.attr("value"))
                .map(str::to_string);
            let trigger = cells[2]
                .select(&TRIGGER_SEL)
                .next()
                .and_then(|i| i.attr("name"))
                .map(str::to_string);
            match (code, name, asid, trigger) {
                (Some(code), Some(name), Some(asid), Some(trigger))
                    if !code.is_empty() && !asid.is_empty() =>
                {
                    subjects.push(ResourceHandle {
                        code,
                        name,
                        id: asid,
                        trigger: Some(trigger),
                    });
                }
                _ => {
                    warn!("skipping malformed subject row");
                }
            }
        }
        return Ok(subjects);
    }
    Err(listing_error(text, "subject listing", forms::SUBJECT_GRID_ID))
}

/// Find a handle by display code (case-insensitive).
pub fn find_handle<'a>(handles: &'a [ResourceHandle], code: &str) -> Result<&'a ResourceHandle> {
    handles
        .iter()
        .find(|h| h.code.eq_ignore_ascii_case(code))
        .ok_or_else(|| PortalError::ResourceNotFound {
            code: code.to_string(),
            available: handles.iter().map(|h| h.code.clone()).collect(),
        })
}

// ── Exchanges ────────────────────────────────────────────────────────────

/// GET the service page fresh. Every selection chain starts here so its
/// hidden state is current.
pub async fn load_service_page(client: &PortalClient) -> Result<String> {
    let config = client.config();
    client
        .get_page(&config.service_url(), Some(&config.landing_url()))
        .await
}

/// List the courses the portal offers this account.
pub async fn list_courses(client: &PortalClient) -> Result<Vec<ResourceHandle>> {
    let body = load_service_page(client).await?;
    let courses = parse_courses(&body)?;
    info!(count = courses.len(), "listed courses");
    Ok(courses)
}

/// Select a course and return the raw response (a delta payload rendering
/// the subject grid).
///
/// Re-loads the service page first: selection must post the page's *current*
/// hidden state, and any previous selection invalidated it.
pub async fn select_course(client: &PortalClient, course: &ResourceHandle) -> Result<String> {
    let body = load_service_page(client).await?;
    let state = extract::extract_form_state(&body);
    let form = forms::course_form(&state, &course.id);
    let resp = client.postback_service(&form).await?;
    if extract::delta_redirect(&resp).is_some() {
        return Err(PortalError::AuthFailure {
            stage: "course selection",
        });
    }
    debug!(course = course.code.as_str(), "course selected");
    Ok(resp)
}

/// List the subjects rendered by a course-selection response.
pub fn list_subjects(course_response: &str) -> Result<Vec<ResourceHandle>> {
    let subjects = parse_subjects(course_response)?;
    info!(count = subjects.len(), "listed subjects");
    Ok(subjects)
}

/// Select a subject out of a course-selection response and return the raw
/// response (the first script page) plus the session state it carried.
///
/// The postback body starts from everything round-trippable in the course
/// response — including the per-row opaque ids parked inside the grid — and
/// "clicks" the subject row's image button.
pub async fn select_subject(
    client: &PortalClient,
    course: &ResourceHandle,
    subject: &ResourceHandle,
    course_response: &str,
) -> Result<(String, SessionState)> {
    let trigger = subject.trigger.as_deref().ok_or_else(|| {
        PortalError::ProtocolMismatch {
            stage: "subject selection",
            marker: format!("handle '{}' has no trigger control", subject.code),
        }
    })?;
    info!(
        subject = subject.code.as_str(),
        name = subject.name.as_str(),
        "selecting subject"
    );

    let state = extract::extract_form_state(course_response);
    let form = forms::subject_form(&state, &course.id, trigger);
    let resp = client.postback_service(&form).await?;
    if extract::delta_redirect(&resp).is_some() {
        return Err(PortalError::AuthFailure {
            stage: "subject selection",
        });
    }
    let next_state = state.merged_with(extract::extract_form_state(&resp));
    Ok((resp, next_state))
}
