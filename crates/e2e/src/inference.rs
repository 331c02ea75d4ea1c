//! Working out the expected answer from a problem snapshot
//!
//! Classification tries a fixed, ordered list of rules and the first match
//! wins. Snapshots can satisfy more than one rule nominally (a two-span
//! equation looks like a truncated operation too), so the order is part of
//! the contract: counting, comparison, missing addend, binary operation.

use std::fmt;

use thiserror::Error;

use crate::snapshot::{ProblemSnapshot, EQUALS};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Invalid comparison: {0}")]
    InvalidComparison(String),

    #[error("Invalid missing addend: {0}")]
    InvalidMissingAddend(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unknown operator \"{op}\" in: {text}")]
    UnknownOperator { op: String, text: String },

    #[error("Cannot interpret problem: {0}")]
    Unrecognized(String),
}

/// Binary operators the page renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
}

impl Operator {
    /// `+`, ASCII hyphen-minus, or the U+2212 minus sign
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Operator::Plus),
            "-" | "\u{2212}" => Some(Operator::Minus),
            _ => None,
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Operator::Plus => lhs + rhs,
            Operator::Minus => lhs - rhs,
        }
    }
}

/// Outcome of a comparison problem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
}

impl Comparison {
    pub fn between(left: f64, right: f64) -> Self {
        if left == right {
            Comparison::Equal
        } else if left > right {
            Comparison::Greater
        } else {
            Comparison::Less
        }
    }

    /// Label of the button that answers it
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Less => "<",
            Comparison::Equal => "=",
            Comparison::Greater => ">",
        }
    }
}

/// Recognized problem families
#[derive(Debug, Clone, PartialEq)]
pub enum ProblemShape {
    /// Only the answer box is shown; count the unit markers
    Counting { units: usize },
    /// `a ? b`, pick `<`, `=` or `>`
    Comparison { left: f64, right: f64 },
    /// `a + ? = b`
    MissingAddend { known: f64, total: f64 },
    /// `a op b = ?`
    Binary { lhs: f64, op: Operator, rhs: f64 },
}

impl ProblemShape {
    pub fn answer(&self) -> AnswerAction {
        match *self {
            ProblemShape::Counting { units } => AnswerAction::Number(units as f64),
            ProblemShape::Comparison { left, right } => {
                AnswerAction::Compare(Comparison::between(left, right))
            }
            ProblemShape::MissingAddend { known, total } => AnswerAction::Number(total - known),
            ProblemShape::Binary { lhs, op, rhs } => AnswerAction::Number(op.apply(lhs, rhs)),
        }
    }
}

/// What the runner has to do to answer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnswerAction {
    /// Key in the digits, then confirm
    Number(f64),
    /// Click the comparison button
    Compare(Comparison),
}

impl AnswerAction {
    /// Characters to press on the keypad for a numeric answer
    pub fn keys(&self) -> Option<String> {
        match self {
            AnswerAction::Number(n) => Some(format_number(*n)),
            AnswerAction::Compare(_) => None,
        }
    }
}

impl fmt::Display for AnswerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerAction::Number(n) => write!(f, "num {}", format_number(*n)),
            AnswerAction::Compare(c) => write!(f, "cmp {}", c.symbol()),
        }
    }
}

/// Integral values print without a fractional part
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Parse a rendered operand; only finite numbers count
fn parse_operand(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}

type Rule = fn(&ProblemSnapshot) -> Option<Result<ProblemShape, InferenceError>>;

/// Classification rules, highest precedence first
const RULES: [(&str, Rule); 4] = [
    ("counting", counting),
    ("comparison", comparison),
    ("missing-addend", missing_addend),
    ("binary", binary),
];

fn counting(s: &ProblemSnapshot) -> Option<Result<ProblemShape, InferenceError>> {
    (s.tokens.len() == 1 && s.answer_index == Some(0) && s.units > 0)
        .then(|| Ok(ProblemShape::Counting { units: s.units }))
}

fn comparison(s: &ProblemSnapshot) -> Option<Result<ProblemShape, InferenceError>> {
    if s.spans.len() != 2 || s.spans.iter().any(|t| t == EQUALS) {
        return None;
    }
    Some(
        match (parse_operand(&s.spans[0]), parse_operand(&s.spans[1])) {
            (Some(left), Some(right)) => Ok(ProblemShape::Comparison { left, right }),
            _ => Err(InferenceError::InvalidComparison(s.text.clone())),
        },
    )
}

fn missing_addend(s: &ProblemSnapshot) -> Option<Result<ProblemShape, InferenceError>> {
    match (s.answer_index, s.equals_index) {
        (Some(answer), Some(equals)) if answer < equals => {}
        _ => return None,
    }
    let known = s.spans.first().and_then(|t| parse_operand(t));
    let total = s.spans.last().and_then(|t| parse_operand(t));
    Some(match (known, total) {
        (Some(known), Some(total)) => Ok(ProblemShape::MissingAddend { known, total }),
        _ => Err(InferenceError::InvalidMissingAddend(s.text.clone())),
    })
}

fn binary(s: &ProblemSnapshot) -> Option<Result<ProblemShape, InferenceError>> {
    if s.spans.len() < 3 {
        return None;
    }
    let (Some(lhs), Some(rhs)) = (parse_operand(&s.spans[0]), parse_operand(&s.spans[2])) else {
        return Some(Err(InferenceError::InvalidOperation(s.text.clone())));
    };
    Some(match Operator::parse(&s.spans[1]) {
        Some(op) => Ok(ProblemShape::Binary { lhs, op, rhs }),
        None => Err(InferenceError::UnknownOperator {
            op: s.spans[1].clone(),
            text: s.text.clone(),
        }),
    })
}

/// Classify a snapshot into its problem family
pub fn classify(snapshot: &ProblemSnapshot) -> Result<ProblemShape, InferenceError> {
    for (name, rule) in RULES {
        if let Some(result) = rule(snapshot) {
            tracing::trace!("Problem \"{}\" matched rule {}", snapshot.text, name);
            return result;
        }
    }
    Err(InferenceError::Unrecognized(snapshot.text.clone()))
}

/// Expected answer for the problem in `snapshot`
pub fn infer(snapshot: &ProblemSnapshot) -> Result<AnswerAction, InferenceError> {
    classify(snapshot).map(|shape| shape.answer())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::EquationToken;
    use test_case::test_case;

    fn spans(items: &[&str]) -> ProblemSnapshot {
        ProblemSnapshot {
            tokens: Vec::new(),
            spans: items.iter().map(|s| s.to_string()).collect(),
            units: 0,
            equals_index: None,
            answer_index: None,
            text: items.join(" "),
        }
    }

    #[test_case("5", "3", ">")]
    #[test_case("3", "5", "<")]
    #[test_case("4", "4", "=")]
    #[test_case("10", "9", ">" ; "numeric not lexicographic")]
    fn test_comparison(a: &str, b: &str, expected: &str) {
        assert_eq!(
            infer(&spans(&[a, b])).unwrap(),
            AnswerAction::Compare(match expected {
                "<" => Comparison::Less,
                "=" => Comparison::Equal,
                _ => Comparison::Greater,
            })
        );
    }

    #[test]
    fn test_comparison_rejects_non_numbers() {
        assert!(matches!(
            infer(&spans(&["3", "x"])),
            Err(InferenceError::InvalidComparison(_))
        ));
        assert!(matches!(
            infer(&spans(&["Infinity", "2"])),
            Err(InferenceError::InvalidComparison(_))
        ));
    }

    #[test]
    fn test_two_spans_with_equals_is_not_comparison() {
        assert!(matches!(
            classify(&spans(&["3", "="])),
            Err(InferenceError::Unrecognized(_))
        ));
    }

    #[test]
    fn test_counting_needs_units() {
        let mut snapshot = spans(&[]);
        snapshot.tokens = vec![EquationToken::new("ansBox", "DIV", "")];
        snapshot.answer_index = Some(0);
        assert!(matches!(
            classify(&snapshot),
            Err(InferenceError::Unrecognized(_))
        ));

        snapshot.units = 7;
        assert_eq!(classify(&snapshot).unwrap(), ProblemShape::Counting { units: 7 });
        assert_eq!(infer(&snapshot).unwrap().keys().as_deref(), Some("7"));
    }

    #[test]
    fn test_missing_addend_uses_first_and_last_span() {
        let mut snapshot = spans(&["4", "+", "=", "10"]);
        snapshot.answer_index = Some(2);
        snapshot.equals_index = Some(3);
        assert_eq!(infer(&snapshot).unwrap(), AnswerAction::Number(6.0));
    }

    #[test]
    fn test_placeholder_after_equals_is_binary() {
        let mut snapshot = spans(&["4", "+", "5", "="]);
        snapshot.equals_index = Some(3);
        snapshot.answer_index = Some(4);
        assert_eq!(infer(&snapshot).unwrap(), AnswerAction::Number(9.0));
    }

    #[test_case("+", 12.0)]
    #[test_case("-", 4.0)]
    #[test_case("\u{2212}", 4.0 ; "unicode minus")]
    fn test_binary_operators(op: &str, expected: f64) {
        assert_eq!(
            infer(&spans(&["8", op, "4", "="])).unwrap(),
            AnswerAction::Number(expected)
        );
    }

    #[test]
    fn test_binary_errors() {
        assert_eq!(
            infer(&spans(&["8", "×", "4", "="])),
            Err(InferenceError::UnknownOperator {
                op: "×".to_string(),
                text: "8 × 4 =".to_string(),
            })
        );
        assert!(matches!(
            infer(&spans(&["8", "+", "", "="])),
            Err(InferenceError::InvalidOperation(_))
        ));
        // Operands are checked before the operator.
        assert!(matches!(
            infer(&spans(&["a", "×", "4"])),
            Err(InferenceError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_unrecognized_keeps_text() {
        let err = infer(&spans(&["7"])).unwrap_err();
        assert_eq!(err, InferenceError::Unrecognized("7".to_string()));
        assert_eq!(err.to_string(), "Cannot interpret problem: 7");
    }

    #[test_case(7.0, "7")]
    #[test_case(-3.0, "-3")]
    #[test_case(0.0, "0")]
    #[test_case(2.5, "2.5")]
    fn test_keys(value: f64, expected: &str) {
        assert_eq!(AnswerAction::Number(value).keys().as_deref(), Some(expected));
    }

    #[test]
    fn test_compare_has_no_keys() {
        let action = AnswerAction::Compare(Comparison::Less);
        assert_eq!(action.keys(), None);
        assert_eq!(action.to_string(), "cmp <");
    }
}
