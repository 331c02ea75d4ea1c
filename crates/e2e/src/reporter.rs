//! Collecting page-side failures
//!
//! The CDP receive loop queues every protocol event on a channel. The
//! [`FailureReporter`] owns the receiving end and turns the interesting
//! events into [`PageSignal`]s whenever the runner reaches a checkpoint.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use crate::cdp::{exception_text, CdpEvent};
use crate::error::{E2eError, E2eResult};

/// Request path whose failures are never reported
const IGNORED_PATH: &str = "/favicon.ico";

/// A failure observed in the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSignal {
    /// Uncaught exception
    PageError(String),
    /// `console.error` or an error-level browser log entry
    ConsoleError(String),
    /// Request that failed outright or answered with status >= 400
    RequestFailed { url: String, reason: String },
}

impl fmt::Display for PageSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageSignal::PageError(msg) => write!(f, "[pageerror] {}", msg),
            PageSignal::ConsoleError(msg) => write!(f, "[console.error] {}", msg),
            PageSignal::RequestFailed { url, reason } => {
                write!(f, "[requestfailed] {} {}", url, reason)
            }
        }
    }
}

/// Drains CDP events for one page session into page signals
pub struct FailureReporter {
    events: UnboundedReceiver<CdpEvent>,
    session_id: Option<String>,
    /// requestId -> URL, for `Network.loadingFailed` which carries no URL
    requests: HashMap<String, String>,
}

impl FailureReporter {
    /// Watch `events`. When `session_id` is set, events from other sessions
    /// are dropped.
    pub fn new(events: UnboundedReceiver<CdpEvent>, session_id: Option<String>) -> Self {
        Self {
            events,
            session_id,
            requests: HashMap::new(),
        }
    }

    /// Take every signal queued so far
    pub fn drain(&mut self) -> Vec<PageSignal> {
        let mut signals = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let (Some(wanted), Some(actual)) = (&self.session_id, &event.session_id) {
                if wanted != actual {
                    continue;
                }
            }
            if let Some(signal) = self.classify(&event) {
                warn!("{}", signal);
                signals.push(signal);
            }
        }
        signals
    }

    /// Checkpoint: fail when anything was reported since the last one
    pub fn check(&mut self) -> E2eResult<()> {
        let signals = self.drain();
        if signals.is_empty() {
            Ok(())
        } else {
            Err(E2eError::PageSignals(signals))
        }
    }

    fn classify(&mut self, event: &CdpEvent) -> Option<PageSignal> {
        let params = &event.params;
        match event.method.as_str() {
            "Runtime.exceptionThrown" => Some(PageSignal::PageError(exception_text(
                &params["exceptionDetails"],
            ))),
            "Runtime.consoleAPICalled" if params["type"] == "error" => {
                Some(PageSignal::ConsoleError(console_message(&params["args"])))
            }
            "Log.entryAdded" => {
                let entry = &params["entry"];
                // Network entries duplicate the response events below.
                if entry["level"] != "error" || entry["source"] == "network" {
                    return None;
                }
                let text = entry["text"].as_str().unwrap_or_default().to_string();
                Some(PageSignal::ConsoleError(text))
            }
            "Network.requestWillBeSent" => {
                if let (Some(id), Some(url)) = (
                    params["requestId"].as_str(),
                    params["request"]["url"].as_str(),
                ) {
                    self.requests.insert(id.to_string(), url.to_string());
                }
                None
            }
            "Network.responseReceived" => {
                let response = &params["response"];
                let status = response["status"].as_u64().unwrap_or(0);
                let url = response["url"].as_str().unwrap_or_default();
                if status < 400 || is_ignored(url) {
                    return None;
                }
                Some(PageSignal::RequestFailed {
                    url: url.to_string(),
                    reason: format!("HTTP {}", status),
                })
            }
            "Network.loadingFailed" => {
                let url = params["requestId"]
                    .as_str()
                    .and_then(|id| self.requests.remove(id))
                    .unwrap_or_default();
                if is_ignored(&url) {
                    debug!("Ignoring failed request {}", url);
                    return None;
                }
                let reason = params["errorText"].as_str().unwrap_or("failed").to_string();
                Some(PageSignal::RequestFailed { url, reason })
            }
            "Network.loadingFinished" => {
                if let Some(id) = params["requestId"].as_str() {
                    self.requests.remove(id);
                }
                None
            }
            _ => None,
        }
    }
}

fn is_ignored(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.ends_with(IGNORED_PATH)
}

/// Render console arguments the way the console would print them
fn console_message(args: &Value) -> String {
    let Some(args) = args.as_array() else {
        return String::new();
    };
    args.iter()
        .map(|arg| match &arg["value"] {
            Value::String(s) => s.clone(),
            Value::Null => arg["description"]
                .as_str()
                .or_else(|| arg["type"].as_str())
                .unwrap_or_default()
                .to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Outcome of one smoke run
#[derive(Debug, Default, Clone)]
pub struct RunResult {
    pub failures: Vec<String>,
}

impl RunResult {
    pub fn push(&mut self, failure: impl Into<String>) {
        self.failures.push(failure.into());
    }

    /// Record an error, expanding page signals into one line each
    pub fn record(&mut self, err: E2eError) {
        match err {
            E2eError::PageSignals(signals) => self.extend_signals(signals),
            other => self.push(other.to_string()),
        }
    }

    pub fn extend_signals(&mut self, signals: Vec<PageSignal>) {
        self.failures
            .extend(signals.into_iter().map(|s| s.to_string()));
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Human-readable verdict
    pub fn report(&self) -> String {
        if self.is_success() {
            return "SMOKE TEST OK".to_string();
        }
        let mut out = String::from("SMOKE TEST FAILED");
        for failure in &self.failures {
            out.push_str("\n - ");
            out.push_str(failure);
        }
        out
    }
}
