//! Actionable hints for query engine errors.
//!
//! Engine errors are matched against an ordered table of patterns. The first
//! rule that matches restates the problem, explains what usually causes it,
//! and shows an example of the fix, with names (columns, tables, types)
//! taken from the error itself. Errors that match no rule are passed through
//! untouched.
//!
//! ```
//! use dataql_hint::enhance;
//!
//! let enhanced = enhance("Catalog Error: Table with name sales does not exist!");
//! assert!(enhanced.hint().is_some());
//!
//! let untouched = enhance("something nobody anticipated");
//! assert_eq!(untouched.to_string(), "something nobody anticipated");
//! ```

mod consts;
mod rules;

use derive_more::Display;
use std::fmt::{Display as FmtDisplay, Formatter, Result as FmtResult};

/// Which rule produced a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum HintKind {
    #[display("strftime_argument_order")]
    StrftimeArgumentOrder,
    #[display("strftime_mismatch")]
    StrftimeMismatch,
    #[display("date_part_on_text")]
    DatePartOnText,
    #[display("unknown_column")]
    UnknownColumn,
    #[display("unknown_table")]
    UnknownTable,
    #[display("ambiguous_column")]
    AmbiguousColumn,
    #[display("group_by")]
    GroupBy,
    #[display("conversion_failure")]
    ConversionFailure,
    #[display("comparison_mismatch")]
    ComparisonMismatch,
    #[display("no_matching_function")]
    NoMatchingFunction,
    #[display("syntax")]
    Syntax,
    #[display("division_by_zero")]
    DivisionByZero,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryHint {
    pub kind: HintKind,
    /// The problem, restated in plain words.
    pub message: String,
    /// What usually causes it and how to fix it.
    pub hint: String,
    /// A query showing the fix.
    pub example: String,
}

impl QueryHint {
    pub(crate) fn new(
        kind: HintKind,
        message: impl Into<String>,
        hint: impl Into<String>,
        example: impl Into<String>,
    ) -> Self {
        Self { kind, message: message.into(), hint: hint.into(), example: example.into() }
    }
}

/// An engine error together with the hint for it, if any rule matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enhanced {
    original: String,
    hint: Option<QueryHint>,
}

impl Enhanced {
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn hint(&self) -> Option<&QueryHint> {
        self.hint.as_ref()
    }

    pub fn into_original(self) -> String {
        self.original
    }
}

impl FmtDisplay for Enhanced {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let Some(hint) = &self.hint else {
            return f.write_str(&self.original);
        };
        writeln!(f, "{}", hint.message)?;
        writeln!(f)?;
        writeln!(f, "Hint: {}", hint.hint)?;
        writeln!(f)?;
        writeln!(f, "Example:")?;
        for line in hint.example.lines() {
            writeln!(f, "    {line}")?;
        }
        writeln!(f)?;
        write!(f, "Original error: {}", self.original)
    }
}

/// Find the first rule matching `error`.
pub fn classify(error: &str) -> Option<QueryHint> {
    let hint = rules::RULES.iter().find_map(|rule| rule.apply(error))?;
    tracing::debug!(kind = %hint.kind, "matched engine error");
    Some(hint)
}

/// Attach a hint to `error` when one applies.
pub fn enhance(error: impl Into<String>) -> Enhanced {
    let original = error.into();
    let hint = classify(&original);
    Enhanced { original, hint }
}
