//! Protocol constants and postback body construction.
//!
//! Everything in this module is a fixed contract with one specific portal
//! build. The control names, the AjaxControlToolkit version blob, and the
//! image-button coordinates are all echoed verbatim from what that build
//! serves; none of them carry meaning on our side. When the portal is
//! redeployed with different control trees these constants go stale, which
//! surfaces as `ProtocolMismatch` at the extraction layer — never patch
//! around that here without re-capturing the new contract.

use crate::session::{Credentials, SessionState};

// ── WebForms framework fields ────────────────────────────────────────────

pub const EVENT_TARGET: &str = "__EVENTTARGET";
pub const EVENT_ARGUMENT: &str = "__EVENTARGUMENT";
pub const VIEWSTATE: &str = "__VIEWSTATE";
pub const VIEWSTATE_GENERATOR: &str = "__VIEWSTATEGENERATOR";
pub const PREVIOUS_PAGE: &str = "__PREVIOUSPAGE";
pub const EVENT_VALIDATION: &str = "__EVENTVALIDATION";
pub const ASYNC_POST: &str = "__ASYNCPOST";

/// State fields the login page must render; any one missing means the page
/// is not the login form this build understands.
pub const LOGIN_STATE_FIELDS: [&str; 4] =
    [VIEWSTATE, VIEWSTATE_GENERATOR, PREVIOUS_PAGE, EVENT_VALIDATION];

// ── Login form controls ──────────────────────────────────────────────────

pub const USER_FIELD: &str = "txtUserID";
pub const PASSWORD_FIELD: &str = "txtPasswrd";
pub const CONFIRM_STATUS_FIELD: &str = "hdnCnfStatus";
const LOGIN_BUTTON: &str = "IbtnEnter";

/// The toolkit script-manager hidden field and its version blob. The server
/// validates this against the toolkit build it shipped with; a mismatch is
/// rejected silently.
const TOOLKIT_FIELD: &str = "ToolkitScriptManager1_HiddenField";
const TOOLKIT_MARKER: &str = ";AjaxControlToolkit, Version=3.5.60623.0, Culture=neutral, \
PublicKeyToken=28f01b0e84b6d53e:en-US:834c499a-b613-438c-a778-d32ab4976134:de1feab2:f2c8e708:\
720a52bf:f9cec9bc:589eaa30:a67c2700:8613aea7:3202a5a2:ab09e3fe:87104b7c:be6fb298";

// ── Service-page controls ────────────────────────────────────────────────

pub const EVAL_LEVEL_FIELD: &str = "ctl00$Ajaxmastercontentplaceholder$DdlEvalLevel";
pub const EVAL_LEVEL_MAIN: &str = "Main Valuation";
pub const EXAM_DROPDOWN_FIELD: &str = "ctl00$Ajaxmastercontentplaceholder$ddlexamname";
pub const EXAM_DROPDOWN_ID: &str = "ctl00_Ajaxmastercontentplaceholder_ddlexamname";
pub const SUBJECT_GRID_ID: &str = "ctl00_Ajaxmastercontentplaceholder_GVASIDDetails";
pub const PAGE_IMAGE_ID: &str = "ctl00_Ajaxmastercontentplaceholder_IMGAS";
pub const MARKS_PANEL_ID: &str = "ctl00_Ajaxmastercontentplaceholder_WebPanel1";
pub const NEXT_TRIGGER: &str = "ctl00$Ajaxmastercontentplaceholder$Next";
/// Client-side id of the next-page control; its presence in a response is
/// the "there is a next page" affordance.
pub const NEXT_MARKER_ID: &str = "ctl00_Ajaxmastercontentplaceholder_Next";
const SCRIPT_MANAGER: &str = "ctl00$AjaxMstrScrpMngr";
const UPDATE_PANEL: &str = "ctl00$Ajaxmastercontentplaceholder$UpdatepnlPrintStatus";
const GOTO_FIELD: &str = "ctl00$Ajaxmastercontentplaceholder$TxtGoTo";
const GOTO_FIELD_ALT: &str = "ctl00$Ajaxmastercontentplaceholder$TxtGoTo0";

/// Set `name` to `value`, overriding an existing pair or appending one.
fn set(params: &mut Vec<(String, String)>, name: &str, value: &str) {
    if let Some(existing) = params.iter_mut().find(|(n, _)| n == name) {
        existing.1 = value.to_string();
    } else {
        params.push((name.to_string(), value.to_string()));
    }
}

/// Image buttons submit click coordinates as `<name>.x` / `<name>.y`. The
/// values are meaningless placeholders; the server only checks presence.
fn set_click(params: &mut Vec<(String, String)>, button: &str, x: &str, y: &str) {
    set(params, &format!("{button}.x"), x);
    set(params, &format!("{button}.y"), y);
}

/// Build the login postback body.
///
/// Carries exactly the fields the portal's login handler validates: the four
/// state tokens from the login page, the toolkit version blob, the
/// credential fields, and the login image-button click. The caller is
/// responsible for having verified that all [`LOGIN_STATE_FIELDS`] are
/// present in `state` (see [`crate::portal::auth`]).
pub fn login_form(state: &SessionState, creds: &Credentials) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(12);
    set(&mut params, TOOLKIT_FIELD, TOOLKIT_MARKER);
    set(&mut params, EVENT_TARGET, "");
    set(&mut params, EVENT_ARGUMENT, "");
    for field in LOGIN_STATE_FIELDS {
        set(&mut params, field, state.get(field).unwrap_or_default());
    }
    set(&mut params, USER_FIELD, &creds.roll_no);
    set(&mut params, PASSWORD_FIELD, &creds.password);
    set_click(&mut params, LOGIN_BUTTON, "34", "7");
    set(&mut params, CONFIRM_STATUS_FIELD, "");
    params
}

/// Build the course-selection partial postback body.
///
/// Posts the full hidden-field state plus the dropdown change event routed
/// through the script manager.
pub fn course_form(state: &SessionState, course_value: &str) -> Vec<(String, String)> {
    let mut params = state.to_form();
    set(&mut params, EVAL_LEVEL_FIELD, EVAL_LEVEL_MAIN);
    set(&mut params, EXAM_DROPDOWN_FIELD, course_value);
    set(&mut params, GOTO_FIELD, "");
    set(&mut params, GOTO_FIELD_ALT, "");
    set(
        &mut params,
        SCRIPT_MANAGER,
        &format!("{UPDATE_PANEL}|{EXAM_DROPDOWN_FIELD}"),
    );
    set(&mut params, ASYNC_POST, "true");
    params
}

/// Build the subject-selection partial postback body.
///
/// `trigger` is the per-row image-button name from the subject grid; its
/// click coordinates are constant placeholders.
pub fn subject_form(
    state: &SessionState,
    course_value: &str,
    trigger: &str,
) -> Vec<(String, String)> {
    let mut params = state.to_form();
    set(&mut params, EVAL_LEVEL_FIELD, EVAL_LEVEL_MAIN);
    set(&mut params, EXAM_DROPDOWN_FIELD, course_value);
    set(&mut params, SCRIPT_MANAGER, &format!("{UPDATE_PANEL}|{trigger}"));
    set(&mut params, EVENT_TARGET, "");
    set(&mut params, EVENT_ARGUMENT, "");
    set(&mut params, ASYNC_POST, "true");
    set_click(&mut params, trigger, "0", "0");
    params
}

/// Build the next-page partial postback body.
///
/// Unlike subject selection this routes through `__EVENTTARGET`, and any
/// image-button coordinate pairs still in the carried state must be
/// stripped: re-submitting a stale `.x`/`.y` pair re-triggers that button
/// on the server.
pub fn next_page_form(state: &SessionState, course_value: &str) -> Vec<(String, String)> {
    let mut params = state.to_form();
    params.retain(|(n, _)| !n.ends_with(".x") && !n.ends_with(".y"));
    set(&mut params, EVAL_LEVEL_FIELD, EVAL_LEVEL_MAIN);
    set(&mut params, EXAM_DROPDOWN_FIELD, course_value);
    set(
        &mut params,
        SCRIPT_MANAGER,
        &format!("{UPDATE_PANEL}|{NEXT_TRIGGER}"),
    );
    set(&mut params, EVENT_TARGET, NEXT_TRIGGER);
    set(&mut params, EVENT_ARGUMENT, "");
    set(&mut params, ASYNC_POST, "true");
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn login_state() -> SessionState {
        let mut s = SessionState::new();
        s.set(VIEWSTATE, "dDwtMTQ4OTY");
        s.set(VIEWSTATE_GENERATOR, "CA0B0334");
        s.set(PREVIOUS_PAGE, "prevPageToken");
        s.set(EVENT_VALIDATION, "/wEWAgL+1");
        s
    }

    #[test]
    fn login_form_echoes_state_tokens_verbatim() {
        let creds = Credentials::new("2100290100001", "pw");
        let params = login_form(&login_state(), &creds);
        assert_eq!(value_of(&params, VIEWSTATE), Some("dDwtMTQ4OTY"));
        assert_eq!(value_of(&params, VIEWSTATE_GENERATOR), Some("CA0B0334"));
        assert_eq!(value_of(&params, PREVIOUS_PAGE), Some("prevPageToken"));
        assert_eq!(value_of(&params, EVENT_VALIDATION), Some("/wEWAgL+1"));
    }

    #[test]
    fn login_form_carries_credentials_and_click() {
        let creds = Credentials::new("2100290100001", "pw");
        let params = login_form(&login_state(), &creds);
        assert_eq!(value_of(&params, USER_FIELD), Some("2100290100001"));
        assert_eq!(value_of(&params, PASSWORD_FIELD), Some("pw"));
        assert_eq!(value_of(&params, "IbtnEnter.x"), Some("34"));
        assert_eq!(value_of(&params, "IbtnEnter.y"), Some("7"));
        assert!(value_of(&params, TOOLKIT_FIELD)
            .unwrap()
            .contains("AjaxControlToolkit"));
    }

    #[test]
    fn course_form_routes_through_script_manager() {
        let mut s = SessionState::new();
        s.set(VIEWSTATE, "vs");
        let params = course_form(&s, "BTECH2024");
        assert_eq!(value_of(&params, EXAM_DROPDOWN_FIELD), Some("BTECH2024"));
        assert_eq!(value_of(&params, ASYNC_POST), Some("true"));
        assert!(value_of(&params, SCRIPT_MANAGER)
            .unwrap()
            .ends_with(EXAM_DROPDOWN_FIELD));
        // Carried state rides along untouched
        assert_eq!(value_of(&params, VIEWSTATE), Some("vs"));
    }

    #[test]
    fn subject_form_simulates_image_button_click() {
        let s = SessionState::new();
        let trigger = "ctl00$Ajaxmastercontentplaceholder$GVASIDDetails$ctl02$ImgBtnView";
        let params = subject_form(&s, "BTECH2024", trigger);
        assert_eq!(value_of(&params, &format!("{trigger}.x")), Some("0"));
        assert_eq!(value_of(&params, &format!("{trigger}.y")), Some("0"));
        assert_eq!(value_of(&params, EVENT_TARGET), Some(""));
        assert!(value_of(&params, SCRIPT_MANAGER).unwrap().ends_with(trigger));
    }

    #[test]
    fn next_page_form_strips_stale_coordinates() {
        let mut s = SessionState::new();
        s.set(VIEWSTATE, "vs");
        s.set("someButton.x", "0");
        s.set("someButton.y", "0");
        let params = next_page_form(&s, "BTECH2024");
        assert!(value_of(&params, "someButton.x").is_none());
        assert!(value_of(&params, "someButton.y").is_none());
        assert_eq!(value_of(&params, EVENT_TARGET), Some(NEXT_TRIGGER));
        assert_eq!(value_of(&params, VIEWSTATE), Some("vs"));
    }
}
