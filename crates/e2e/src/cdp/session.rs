//! Page session: commands scoped to one attached target.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use super::client::Transport;
use super::error::CdpError;
use super::protocol::{MouseButton, MouseEventType};

/// A session attached to a single page.
pub struct PageSession {
    target_id: String,
    session_id: String,
    transport: Arc<Transport>,
}

impl PageSession {
    pub(crate) fn new(target_id: String, session_id: String, transport: Arc<Transport>) -> Self {
        Self {
            target_id,
            session_id,
            transport,
        }
    }

    /// Get target ID.
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Get session ID.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Send a CDP command to this page session.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        self.transport
            .call(method, params, Some(&self.session_id))
            .await
    }

    /// Enable the domains whose events the harness listens to.
    pub(crate) async fn enable_domains(&self) -> Result<(), CdpError> {
        self.call("Page.enable", None).await?;
        self.call("Runtime.enable", None).await?;
        self.call("Network.enable", None).await?;
        self.call("Log.enable", None).await?;

        debug!("Enabled CDP domains for session {}", self.session_id);
        Ok(())
    }

    /// Navigate to URL.
    pub async fn navigate(&self, url: &str) -> Result<(), CdpError> {
        let result = self
            .call("Page.navigate", Some(json!({"url": url})))
            .await?;

        if let Some(error) = result.get("errorText").and_then(Value::as_str) {
            return Err(CdpError::NavigationFailed(format!("{}: {}", url, error)));
        }

        debug!("Navigated to {}", url);
        Ok(())
    }

    /// Evaluate a JavaScript expression and return its value by JSON.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            return Err(CdpError::JavaScript(exception_text(exception)));
        }

        Ok(result["result"]["value"].clone())
    }

    /// Compile a classic script without running it.
    ///
    /// Returns `Some(message)` when the source does not parse.
    pub async fn compile_script(
        &self,
        source: &str,
        source_url: &str,
    ) -> Result<Option<String>, CdpError> {
        let result = self
            .call(
                "Runtime.compileScript",
                Some(json!({
                    "expression": source,
                    "sourceURL": source_url,
                    "persistScript": false,
                })),
            )
            .await?;

        Ok(result.get("exceptionDetails").map(|details| {
            format!(
                "{} ({}:{}:{})",
                exception_text(details),
                source_url,
                details["lineNumber"].as_i64().unwrap_or(0) + 1,
                details["columnNumber"].as_i64().unwrap_or(0) + 1,
            )
        }))
    }

    /// Left click at viewport coordinates.
    pub async fn click(&self, x: f64, y: f64) -> Result<(), CdpError> {
        self.mouse_event(MouseEventType::MouseMoved, MouseButton::None, x, y, 0)
            .await?;
        self.mouse_event(MouseEventType::MousePressed, MouseButton::Left, x, y, 1)
            .await?;
        self.mouse_event(MouseEventType::MouseReleased, MouseButton::Left, x, y, 1)
            .await?;

        debug!("Clicked at ({}, {})", x, y);
        Ok(())
    }

    async fn mouse_event(
        &self,
        kind: MouseEventType,
        button: MouseButton,
        x: f64,
        y: f64,
        click_count: u32,
    ) -> Result<(), CdpError> {
        self.call(
            "Input.dispatchMouseEvent",
            Some(json!({
                "type": kind,
                "x": x,
                "y": y,
                "button": button,
                "clickCount": click_count,
            })),
        )
        .await?;
        Ok(())
    }

    /// Insert text into the focused element.
    pub async fn insert_text(&self, text: &str) -> Result<(), CdpError> {
        self.call("Input.insertText", Some(json!({"text": text})))
            .await?;
        Ok(())
    }
}

/// Most useful message out of a CDP `exceptionDetails` object.
pub(crate) fn exception_text(details: &Value) -> String {
    details["exception"]["description"]
        .as_str()
        .or_else(|| details["text"].as_str())
        .unwrap_or("Unknown error")
        .to_string()
}
