//! Student contact scraped from a request page.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::config::Selectors;

/// A space followed by a single capital and a period, e.g. `" A."`.
static MIDDLE_INITIAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"( [A-Z]\.)").expect("valid middle initial regex"));

/// `", FL"` and everything after it on the line.
static REGION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(, [A-Z]{2})(.*)").expect("valid region regex"));

/// Raw text read from the page, before any cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContactSnapshot {
    pub heading: Option<String>,
    pub info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentContact {
    pub name: String,
    pub city: String,
}

/// Script that reads the contact block. Returns `{heading, info}` with `null`
/// for a missing element.
pub fn contact_script(selectors: &Selectors) -> String {
    format!(
        "const text = (sel) => {{ const el = document.querySelector(sel); \
         return el ? el.innerText : null; }}; \
         return {{ heading: text({name}), info: text({info}) }};",
        name = js_string(&selectors.contact_name),
        info = js_string(&selectors.contact_info),
    )
}

/// Clean a snapshot into a contact. `None` when the name heading is missing.
pub fn extract_contact(snapshot: &ContactSnapshot) -> Option<StudentContact> {
    let heading = snapshot.heading.as_deref()?;
    Some(StudentContact {
        name: clean_name(heading),
        city: clean_city(snapshot.info.as_deref().unwrap_or_default()),
    })
}

/// Drop the first middle-initial token: `"Jane A. Smith"` becomes
/// `"Jane Smith"`.
pub fn clean_name(raw: &str) -> String {
    MIDDLE_INITIAL_RE.replacen(raw, 1, "").trim().to_string()
}

/// Cut at the first two-letter region code: `"Miami, FL area"` becomes
/// `"Miami"`.
pub fn clean_city(raw: &str) -> String {
    REGION_RE.replacen(raw, 1, "").trim().to_string()
}

/// Quote a value as a JavaScript string literal.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".into())
}
