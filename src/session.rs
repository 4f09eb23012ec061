//! Session-scoped value types: the opaque hidden-field state and credentials.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The opaque server-issued hidden-field state a WebForms portal requires
/// echoed back on every postback.
///
/// The field set is open-ended: beyond the well-known `__VIEWSTATE` /
/// `__EVENTVALIDATION` pair the server can mint new hidden fields at any
/// point, and every one of them must be round-tripped verbatim. The map is
/// ordered so that generated form bodies are deterministic (stable logs,
/// stable test fixtures).
///
/// # Update semantics
///
/// Partial-postback responses carry only the fields that changed. Updating is
/// therefore **merge with override**, never wholesale replacement: a field
/// absent from the latest response keeps its previous value. See
/// [`SessionState::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    fields: BTreeMap<String, String>,
}

impl SessionState {
    /// An empty state, as at session start.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields currently held.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Store or replace one field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Look up a field value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Overlay `newer` onto this state: fields present in `newer` win,
    /// fields absent from it persist unchanged.
    pub fn merge(&mut self, newer: SessionState) {
        self.fields.extend(newer.fields);
    }

    /// Copy of this state with `newer` overlaid (see [`merge`](Self::merge)).
    pub fn merged_with(&self, newer: SessionState) -> SessionState {
        let mut out = self.clone();
        out.merge(newer);
        out
    }

    /// Iterate `(name, value)` pairs in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the state as form pairs, the base of every outgoing postback.
    pub fn to_form(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl FromIterator<(String, String)> for SessionState {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Login credentials: the student roll number and portal password.
///
/// `Debug` redacts the password so credentials can appear in `debug!` logs
/// without leaking the secret.
#[derive(Clone)]
pub struct Credentials {
    pub roll_no: String,
    pub password: String,
}

impl Credentials {
    pub fn new(roll_no: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            roll_no: roll_no.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("roll_no", &self.roll_no)
            .field("password", &"<redacted>")
            .finish()
    }
}
