//! Page-level browser actions built on a CDP session
//!
//! Every wait polls the live DOM with an explicit deadline; running out of
//! time is an [`E2eError::Timeout`], never a silent retry.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cdp::{CdpError, PageSession};
use crate::error::{E2eError, E2eResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Element state a wait can target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    /// Present in the DOM and rendered with a non-empty box
    #[default]
    Visible,
    /// Absent, or present but not rendered
    Hidden,
    /// Present in the DOM
    Attached,
}

impl WaitState {
    fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

/// JSON-encode a string for splicing into a script
pub(crate) fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Browser page under test
pub struct Page {
    session: PageSession,
}

impl Page {
    pub fn new(session: PageSession) -> Self {
        Self { session }
    }

    /// Underlying CDP session
    pub fn session(&self) -> &PageSession {
        &self.session
    }

    /// Evaluate an expression and deserialize its JSON value
    pub async fn evaluate<T: DeserializeOwned>(&self, expression: &str) -> E2eResult<T> {
        let value = self.session.evaluate(expression).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Navigate and wait until the new document is parsed
    pub async fn goto(&self, url: &str, timeout: Duration) -> E2eResult<()> {
        self.session.navigate(url).await?;

        let probe = format!(
            "location.href === {} && document.readyState !== 'loading'",
            js_string(url)
        );
        let deadline = Instant::now() + timeout;
        loop {
            match self.session.evaluate(&probe).await {
                Ok(Value::Bool(true)) => break,
                Ok(_) => {}
                // The old execution context goes away mid-navigation.
                Err(CdpError::JavaScript(_)) | Err(CdpError::Protocol { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                return Err(E2eError::Timeout(format!("navigation to {}", url)));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        debug!("Loaded {}", url);
        Ok(())
    }

    /// Re-evaluate `expression` until it yields a non-null value
    async fn poll<T: DeserializeOwned>(
        &self,
        expression: &str,
        timeout: Duration,
        what: impl FnOnce() -> String,
    ) -> E2eResult<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let value = self.session.evaluate(expression).await?;
            if !value.is_null() {
                return Ok(serde_json::from_value(value)?);
            }
            if Instant::now() >= deadline {
                return Err(E2eError::Timeout(what()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait until `selector` reaches `state`
    pub async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> E2eResult<()> {
        let expression = format!(
            r#"((sel, want) => {{
  const el = document.querySelector(sel);
  let state = "detached";
  if (el) {{
    const rect = el.getBoundingClientRect();
    const shown = getComputedStyle(el).visibility !== "hidden" && rect.width > 0 && rect.height > 0;
    state = shown ? "visible" : "hidden";
  }}
  const ok = want === "attached" ? state !== "detached"
    : want === "hidden" ? state !== "visible"
    : state === "visible";
  return ok ? true : null;
}})({}, {})"#,
            js_string(selector),
            js_string(state.as_str())
        );

        let _: bool = self
            .poll(&expression, timeout, || {
                format!("{} to be {} ({} ms)", selector, state.as_str(), timeout.as_millis())
            })
            .await?;
        Ok(())
    }

    /// Whether `selector` matches anything right now
    pub async fn is_present(&self, selector: &str) -> E2eResult<bool> {
        self.evaluate(&format!(
            "document.querySelector({}) !== null",
            js_string(selector)
        ))
        .await
    }

    /// Text content of the first match, trimmed
    pub async fn text_of(&self, selector: &str) -> E2eResult<Option<String>> {
        self.evaluate(&format!(
            "(() => {{ const el = document.querySelector({}); return el ? (el.textContent || '').trim() : null; }})()",
            js_string(selector)
        ))
        .await
    }

    /// Click the centre of the first visible match of `selector`
    pub async fn click(&self, selector: &str, timeout: Duration) -> E2eResult<()> {
        let expression = format!(
            r#"((sel) => {{
  const el = document.querySelector(sel);
  if (!el) return null;
  el.scrollIntoView({{ block: "center", inline: "center" }});
  const r = el.getBoundingClientRect();
  if (r.width === 0 || r.height === 0 || getComputedStyle(el).visibility === "hidden") return null;
  return {{ x: r.left + r.width / 2, y: r.top + r.height / 2 }};
}})({})"#,
            js_string(selector)
        );

        let point: Point = self
            .poll(&expression, timeout, || format!("{} to be clickable", selector))
            .await?;
        debug!("Click {}", selector);
        self.session.click(point.x, point.y).await?;
        Ok(())
    }

    /// Click a visible `<button>` by its label.
    ///
    /// An exact (whitespace-collapsed) label match wins over a substring
    /// match, so the "1" key is never confused with "10". `scope` restricts
    /// the search to the first element matching that selector.
    pub async fn click_button(
        &self,
        label: &str,
        scope: Option<&str>,
        timeout: Duration,
    ) -> E2eResult<()> {
        let scope_js = scope.map(js_string).unwrap_or_else(|| "null".to_string());
        let expression = format!(
            r#"((label, scope) => {{
  const root = scope ? document.querySelector(scope) : document;
  if (!root) return null;
  const norm = (s) => (s || "").replace(/\s+/g, " ").trim();
  const shown = (el) => {{
    const r = el.getBoundingClientRect();
    return r.width > 0 && r.height > 0 && getComputedStyle(el).visibility !== "hidden";
  }};
  const buttons = Array.from(root.querySelectorAll("button")).filter(shown);
  const hit = buttons.find((b) => norm(b.textContent) === label)
    || buttons.find((b) => norm(b.textContent).includes(label));
  if (!hit) return null;
  hit.scrollIntoView({{ block: "center", inline: "center" }});
  const r = hit.getBoundingClientRect();
  return {{ x: r.left + r.width / 2, y: r.top + r.height / 2 }};
}})({}, {})"#,
            js_string(label),
            scope_js
        );

        let point: Point = self
            .poll(&expression, timeout, || match scope {
                Some(scope) => format!("button \"{}\" in {}", label, scope),
                None => format!("button \"{}\"", label),
            })
            .await?;
        debug!("Click button \"{}\"", label);
        self.session.click(point.x, point.y).await?;
        Ok(())
    }

    /// Replace the value of an input with `value`, typed as text input
    pub async fn fill(&self, selector: &str, value: &str, timeout: Duration) -> E2eResult<()> {
        self.wait_for(selector, WaitState::Visible, timeout).await?;

        let focused: bool = self
            .evaluate(&format!(
                r#"((sel) => {{
  const el = document.querySelector(sel);
  if (!el) return false;
  el.focus();
  el.value = "";
  el.dispatchEvent(new Event("input", {{ bubbles: true }}));
  return document.activeElement === el;
}})({})"#,
                js_string(selector)
            ))
            .await?;
        if !focused {
            return Err(E2eError::AssertionFailed(format!(
                "{} could not be focused for input",
                selector
            )));
        }

        self.session.insert_text(value).await?;
        Ok(())
    }

    /// Read a `localStorage` entry
    pub async fn local_storage_item(&self, key: &str) -> E2eResult<Option<String>> {
        self.evaluate(&format!("localStorage.getItem({})", js_string(key)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("#pinDlg"), r##""#pinDlg""##);
        assert_eq!(js_string(r#"a"b\c"#), r#""a\"b\\c""#);
        assert_eq!(js_string("Închide"), "\"Închide\"");
    }

    #[test]
    fn test_wait_state_names() {
        assert_eq!(WaitState::default(), WaitState::Visible);
        assert_eq!(WaitState::Hidden.as_str(), "hidden");
        assert_eq!(
            serde_json::to_value(WaitState::Attached).unwrap(),
            serde_json::json!("attached")
        );
    }
}
