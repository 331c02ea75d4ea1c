//! Smoke test configuration
//!
//! Everything the runner needs to know about the page under test lives here:
//! the DOM selectors it drives, button labels, PINs and per-wait timeouts.
//! All fields have defaults, so an absent or partial YAML file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

/// Name of the optional config file looked up in the served root
pub const DEFAULT_CONFIG_FILE: &str = "smoke.yaml";

/// Complete smoke test configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    /// Candidate page directories below the root; the first one holding an
    /// `index.html` is tested
    pub module_dirs: Vec<String>,

    /// HTML files (relative to the root) whose inline scripts must compile.
    /// The discovered module page is always checked as well.
    pub inline_script_pages: Vec<String>,

    pub selectors: SelectorMap,
    pub labels: ButtonLabels,
    pub pins: PinConfig,
    pub timeouts: Timeouts,

    /// Extra answer-and-advance rounds when "next" shows the same problem
    pub max_advance_retries: usize,

    pub browser: BrowserConfig,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            module_dirs: vec!["plusminus".to_string(), "PlusMinus".to_string()],
            inline_script_pages: vec!["index.html".to_string()],
            selectors: SelectorMap::default(),
            labels: ButtonLabels::default(),
            pins: PinConfig::default(),
            timeouts: Timeouts::default(),
            max_advance_retries: 5,
            browser: BrowserConfig::default(),
        }
    }
}

/// DOM contract of the page under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorMap {
    /// Element holding the rendered equation
    pub container: String,
    /// Problem area that must exist before anything else
    pub problem: String,
    /// On-screen keypad
    pub keypad: String,
    /// `id` of the answer placeholder inside the equation
    pub answer_box_id: String,
    /// Unit markers drawn for counting problems
    pub unit_marker: String,
    pub skill_label: String,
    pub feedback: String,
    pub next_button: String,
    pub pin_dialog: String,
    pub pin_input: String,
    pub pin_confirm: String,
    pub pin_message: String,
    pub parent_dialog: String,
    /// localStorage key the page persists progress under
    pub storage_key: String,
}

impl SelectorMap {
    /// CSS selector for the answer placeholder
    pub fn answer_box(&self) -> String {
        format!("#{}", self.answer_box_id)
    }

    /// Selector matching `dialog` only while it is open
    pub fn open(dialog: &str) -> String {
        format!("{}[open]", dialog)
    }
}

impl Default for SelectorMap {
    fn default() -> Self {
        Self {
            container: ".big-eq".to_string(),
            problem: "#uiProblem".to_string(),
            keypad: "#uiKbd".to_string(),
            answer_box_id: "ansBox".to_string(),
            unit_marker: ".viz-area .d-pt".to_string(),
            skill_label: "#uiSkillName".to_string(),
            feedback: "#uiFeedback".to_string(),
            next_button: "#btnNext".to_string(),
            pin_dialog: "#pinDlg".to_string(),
            pin_input: "#pinInput".to_string(),
            pin_confirm: "#pinOk".to_string(),
            pin_message: "#pinMsg".to_string(),
            parent_dialog: "#parentDlg".to_string(),
            storage_key: "plusminus_state_v1".to_string(),
        }
    }
}

/// Visible texts of buttons located by label
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonLabels {
    pub confirm: String,
    pub dashboard: String,
    pub close: String,
}

impl Default for ButtonLabels {
    fn default() -> Self {
        Self {
            confirm: "OK".to_string(),
            dashboard: "Dashboard".to_string(),
            close: "Închide".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub wrong: String,
    pub correct: String,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            wrong: "0000".to_string(),
            correct: "2580".to_string(),
        }
    }
}

/// Per-wait timeouts in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub server_ready_ms: u64,
    pub browser_start_ms: u64,
    pub element_ms: u64,
    pub action_ms: u64,
    pub feedback_ms: u64,
    pub next_problem_ms: u64,
    pub pin_dialog_ms: u64,
    pub pin_message_ms: u64,
    pub parent_dialog_ms: u64,
}

impl Timeouts {
    pub fn server_ready(&self) -> Duration {
        Duration::from_millis(self.server_ready_ms)
    }

    pub fn browser_start(&self) -> Duration {
        Duration::from_millis(self.browser_start_ms)
    }

    pub fn element(&self) -> Duration {
        Duration::from_millis(self.element_ms)
    }

    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn feedback(&self) -> Duration {
        Duration::from_millis(self.feedback_ms)
    }

    pub fn next_problem(&self) -> Duration {
        Duration::from_millis(self.next_problem_ms)
    }

    pub fn pin_dialog(&self) -> Duration {
        Duration::from_millis(self.pin_dialog_ms)
    }

    pub fn pin_message(&self) -> Duration {
        Duration::from_millis(self.pin_message_ms)
    }

    pub fn parent_dialog(&self) -> Duration {
        Duration::from_millis(self.parent_dialog_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            server_ready_ms: 5_000,
            browser_start_ms: 20_000,
            element_ms: 10_000,
            action_ms: 5_000,
            feedback_ms: 5_000,
            next_problem_ms: 15_000,
            pin_dialog_ms: 3_000,
            pin_message_ms: 2_000,
            parent_dialog_ms: 10_000,
        }
    }
}

/// Chromium launch options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Explicit binary; searched on PATH when unset
    pub binary: Option<PathBuf>,
    pub headless: bool,
    /// Additional command-line switches
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary: None,
            headless: true,
            args: Vec::new(),
        }
    }
}

impl SmokeConfig {
    /// Parse a config from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_yaml(&content)
        } else {
            Ok(Self::default())
        }
    }
}
