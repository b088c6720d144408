//! Scanning the pending-requests queue page.

use reqwest::Url;
use serde_json::Value;
use tracing::warn;

use super::contact::js_string;
use crate::config::Selectors;
use crate::error::BrowserError;

/// Script returning the detail-link `href` of every request box on the page.
pub fn request_links_script(selectors: &Selectors) -> String {
    format!(
        "return Array.from(document.querySelectorAll({boxes})) \
         .map((box) => {{ const head = box.querySelector({head}); \
         return head ? head.getAttribute('href') : null; }}) \
         .filter((href) => href);",
        boxes = js_string(&selectors.request_box),
        head = js_string(&selectors.request_head),
    )
}

/// Decode the script result and make every link absolute against `base_url`.
/// Links that cannot be resolved are dropped; duplicates keep their first
/// position.
pub fn resolve_links(base_url: &str, value: Value) -> Result<Vec<String>, BrowserError> {
    let hrefs: Vec<String> = serde_json::from_value(value).map_err(|e| BrowserError::Script {
        reason: format!("request links: {e}"),
    })?;

    let base = Url::parse(base_url).map_err(|e| BrowserError::Script {
        reason: format!("base URL {base_url}: {e}"),
    })?;

    let mut links = Vec::with_capacity(hrefs.len());
    for href in hrefs {
        match base.join(href.trim()) {
            Ok(url) => {
                let url = url.to_string();
                if !links.contains(&url) {
                    links.push(url);
                }
            }
            Err(e) => warn!(href = %href, "Skipping unresolvable request link: {e}"),
        }
    }
    Ok(links)
}
