//! Two-operand arithmetic for calculation sub-requests.
//!
//! Operands are the first two numeric tokens in the text. The operator is
//! inferred from keywords and symbols: multiplication markers win over
//! addition markers, and multiplication is the default when neither appears.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unsigned integer or decimal literal.
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("NUMBER_RE regex should compile"));

/// `x` used as a times sign between digits, e.g. `3x4` or `3 x 4`.
static LETTER_TIMES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d\s*[xX]\s*\d").expect("LETTER_TIMES_RE regex should compile"));

const MULTIPLY_MARKERS: &[&str] = &[
    "*", "×", "times", "multiply", "multiplied", "product", "乘",
];

const ADD_MARKERS: &[&str] = &["+", "plus", "add", "sum", "加"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    #[error("expected two numeric operands, found {found}")]
    InsufficientOperands { found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Add,
    Multiply,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Multiply => "×",
        }
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => add(a, b),
            Self::Multiply => multiply(a, b),
        }
    }
}

pub fn add(a: f64, b: f64) -> f64 {
    a + b
}

pub fn multiply(a: f64, b: f64) -> f64 {
    a * b
}

/// A fully evaluated calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    pub lhs: f64,
    pub rhs: f64,
    pub operator: Operator,
    pub result: f64,
}

impl fmt::Display for Calculation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} = {}",
            format_number(self.lhs),
            self.operator.symbol(),
            format_number(self.rhs),
            format_number(self.result)
        )
    }
}

/// All numeric tokens in order of appearance.
pub fn extract_numbers(text: &str) -> Vec<f64> {
    NUMBER_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}

/// Infer the operator; multiplication takes precedence.
pub fn infer_operator(text: &str) -> Operator {
    let lower = text.to_lowercase();
    if MULTIPLY_MARKERS.iter().any(|m| lower.contains(m)) || LETTER_TIMES_RE.is_match(&lower) {
        return Operator::Multiply;
    }
    if ADD_MARKERS.iter().any(|m| lower.contains(m)) {
        return Operator::Add;
    }
    Operator::Multiply
}

/// Evaluate the first two operands of `text`.
pub fn evaluate(text: &str) -> Result<Calculation, CalcError> {
    let numbers = extract_numbers(text);
    if numbers.len() < 2 {
        return Err(CalcError::InsufficientOperands {
            found: numbers.len(),
        });
    }
    let (lhs, rhs) = (numbers[0], numbers[1]);
    let operator = infer_operator(text);
    Ok(Calculation {
        lhs,
        rhs,
        operator,
        result: operator.apply(lhs, rhs),
    })
}

/// Integral values print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let s = format!("{:.6}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
