//! The portal protocol: everything that talks the WebForms postback dialect.
//!
//! Each submodule owns one stage of the conversation. Keeping stages
//! separate makes each independently testable against canned responses and
//! keeps the fragile parts (the pinned field contract in [`forms`]) in one
//! place.
//!
//! ## Data Flow
//!
//! ```text
//! auth ──▶ select ──▶ select ──▶ paginate ──▶ paginate ──▶ …
//! (login)  (course)   (subject)  (page 1)     (page 2)
//!    └── every arrow carries the hidden-field state extracted
//!        from the previous response (see `extract`)
//! ```
//!
//! 1. [`forms`]    — protocol-constant field names and postback body
//!    construction; the version-pinned contract with the portal
//! 2. [`extract`]  — pull hidden fields, listings, locators and the marks
//!    table out of full-HTML and delta-encoded responses
//! 3. [`client`]   — the authenticated HTTP exchange layer (cookies, fixed
//!    header sets, AJAX marker headers)
//! 4. [`auth`]     — the login exchange and post-login redirect chain
//! 5. [`select`]   — course and subject listing/selection postbacks
//! 6. [`paginate`] — the page-retrieval loop with duplicate-hash termination

pub mod auth;
pub mod client;
pub mod extract;
pub mod forms;
pub mod paginate;
pub mod select;
