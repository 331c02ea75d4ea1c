//! Reading the displayed problem out of the DOM
//!
//! A [`ProblemSnapshot`] is taken fresh for every problem and never changes
//! afterwards. The browser side only collects raw texts; the equality and
//! answer-placeholder positions are worked out here so the rules that consume
//! them can be tested without a browser.

use serde::Deserialize;

use crate::config::SelectorMap;
use crate::error::{E2eError, E2eResult};
use crate::page::{js_string, Page};

/// Text rendered between operands and result
pub const EQUALS: &str = "=";

/// Markers that betray a broken generator
const MALFORMED_MARKERS: [&str; 2] = ["NaN", "undefined"];

/// One direct child of the equation container
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EquationToken {
    pub id: String,
    pub tag: String,
    pub text: String,
}

impl EquationToken {
    pub fn new(id: &str, tag: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            tag: tag.to_string(),
            text: text.to_string(),
        }
    }

    fn is_equals(&self) -> bool {
        self.tag.eq_ignore_ascii_case("span") && self.text == EQUALS
    }
}

/// What the browser hands back before normalization
#[derive(Debug, Clone, Deserialize)]
pub struct RawProblem {
    pub tokens: Vec<EquationToken>,
    pub spans: Vec<String>,
    pub units: usize,
    pub text: String,
}

/// Normalized view of the problem currently on screen
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemSnapshot {
    /// Direct children of the equation container, in order
    pub tokens: Vec<EquationToken>,
    /// Trimmed text of every `span` below the container
    pub spans: Vec<String>,
    /// Unit markers drawn next to the equation
    pub units: usize,
    /// Position of the `=` token among `tokens`
    pub equals_index: Option<usize>,
    /// Position of the answer placeholder among `tokens`
    pub answer_index: Option<usize>,
    /// Container text with whitespace runs collapsed
    pub text: String,
}

impl ProblemSnapshot {
    /// Normalize raw DOM data. `answer_box_id` names the placeholder.
    pub fn from_raw(raw: RawProblem, answer_box_id: &str) -> Self {
        let equals_index = raw.tokens.iter().position(EquationToken::is_equals);
        let answer_index = raw.tokens.iter().position(|t| t.id == answer_box_id);
        Self {
            tokens: raw.tokens,
            spans: raw.spans,
            units: raw.units,
            equals_index,
            answer_index,
            text: collapse_whitespace(&raw.text),
        }
    }

    /// Fail on text a healthy generator never produces
    pub fn ensure_well_formed(&self) -> E2eResult<()> {
        if MALFORMED_MARKERS.iter().any(|m| self.text.contains(m)) {
            return Err(E2eError::MalformedProblem(self.text.clone()));
        }
        Ok(())
    }
}

/// Cheap identity of the displayed problem: skill label plus equation text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemSignature(String);

impl ProblemSignature {
    pub fn new(skill: &str, equation: &str) -> Self {
        Self(format!(
            "{} :: {}",
            skill.trim(),
            collapse_whitespace(equation)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProblemSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Snapshot the problem on screen.
///
/// `None` when the equation container is missing; callers treat that as a
/// failed precondition.
pub async fn read_snapshot(
    page: &Page,
    selectors: &SelectorMap,
) -> E2eResult<Option<ProblemSnapshot>> {
    let expression = format!(
        r#"((container, unit) => {{
  const eq = document.querySelector(container);
  if (!eq) return null;
  const tokens = Array.from(eq.children).map((el) => ({{
    id: el.id || "",
    tag: el.tagName,
    text: (el.textContent || "").trim(),
  }}));
  const spans = Array.from(eq.querySelectorAll("span")).map((s) => (s.textContent || "").trim());
  const units = document.querySelectorAll(unit).length;
  return {{ tokens, spans, units, text: eq.textContent || "" }};
}})({}, {})"#,
        js_string(&selectors.container),
        js_string(&selectors.unit_marker)
    );

    let raw: Option<RawProblem> = page.evaluate(&expression).await?;
    Ok(raw.map(|raw| ProblemSnapshot::from_raw(raw, &selectors.answer_box_id)))
}

/// Read the signature of the problem on screen
pub async fn read_signature(page: &Page, selectors: &SelectorMap) -> E2eResult<ProblemSignature> {
    let skill = page.text_of(&selectors.skill_label).await?.unwrap_or_default();
    let equation = page.text_of(&selectors.container).await?.unwrap_or_default();
    Ok(ProblemSignature::new(&skill, &equation))
}
