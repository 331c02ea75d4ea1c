//! Error types for the smoke harness

use thiserror::Error;

use crate::cdp::CdpError;
use crate::inference::InferenceError;
use crate::reporter::PageSignal;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server not ready after {0} attempts")]
    ServerNotReady(usize),

    #[error("No Chromium binary found. Set CHROME_PATH or pass --browser")]
    BrowserNotFound,

    #[error("Browser failed to start: {0}")]
    BrowserLaunch(String),

    #[error("Browser protocol error: {0}")]
    Cdp(#[from] CdpError),

    #[error("{0}")]
    Interpretation(#[from] InferenceError),

    #[error("Problem contains NaN/undefined: \"{0}\"")]
    MalformedProblem(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("\"Next\" did not change the exercise (after {0} attempts)")]
    DidNotAdvance(usize),

    #[error("Page reported {} error(s)", .0.len())]
    PageSignals(Vec<PageSignal>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
