//! PlusMinus smoke test harness
//!
//! Drives the PlusMinus page in headless Chromium the way a child (and then
//! a parent) would, and fails loudly on anything that looks broken:
//! - Serves the checkout in-process over loopback HTTP
//! - Compiles every inline script before loading the page
//! - Reads each problem from the DOM and works out the expected answer
//! - Answers through the on-screen keypad, advances, and walks the PIN gate
//! - Collects page exceptions, console errors and failed requests
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SmokeRunner                           │
//! │    ├── locate_module()       -> "plusminus"                 │
//! │    ├── PageServer::start()   -> http://127.0.0.1:<port>     │
//! │    ├── BrowserHandle::launch -> ws://.../devtools/browser   │
//! │    ├── CdpClient::connect    -> (client, event channel)     │
//! │    ├── inline_js::check_pages                               │
//! │    └── Scenario                                             │
//! │          ├── answer_current_problem  (snapshot → infer)     │
//! │          ├── ensure_next_changes_exercise                   │
//! │          └── exercise_pin_gate                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  FailureReporter  <- event channel, drained at checkpoints  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod cdp;
pub mod config;
pub mod error;
pub mod inference;
pub mod inline_js;
pub mod page;
pub mod reporter;
pub mod runner;
pub mod scenario;
pub mod server;
pub mod snapshot;

pub use config::SmokeConfig;
pub use error::{E2eError, E2eResult};
pub use inference::{infer, AnswerAction, Comparison, InferenceError};
pub use reporter::{PageSignal, RunResult};
pub use runner::SmokeRunner;
pub use snapshot::ProblemSnapshot;
