use crate::consts::*;
use crate::{HintKind, QueryHint};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// One entry of the rule table: a pattern and the template filled from its captures.
pub(crate) struct Rule {
    regex: &'static LazyLock<Regex>,
    build: fn(&Captures<'_>) -> QueryHint,
}

impl Rule {
    pub(crate) fn apply(&self, error: &str) -> Option<QueryHint> {
        let captures = self.regex.captures(error)?;
        Some((self.build)(&captures))
    }
}

/// Evaluated top to bottom; the first match wins, so specific rules must come
/// before the more general rules that would also match their errors.
pub(crate) static RULES: [Rule; 12] = [
    Rule { regex: &STRFTIME_ORDER_REGEX, build: strftime_order },
    Rule { regex: &STRFTIME_REGEX, build: strftime },
    Rule { regex: &DATE_PART_REGEX, build: date_part },
    Rule { regex: &UNKNOWN_COLUMN_REGEX, build: unknown_column },
    Rule { regex: &UNKNOWN_TABLE_REGEX, build: unknown_table },
    Rule { regex: &AMBIGUOUS_COLUMN_REGEX, build: ambiguous_column },
    Rule { regex: &GROUP_BY_REGEX, build: group_by },
    Rule { regex: &CONVERSION_REGEX, build: conversion },
    Rule { regex: &COMPARISON_REGEX, build: comparison },
    Rule { regex: &NO_FUNCTION_REGEX, build: no_function },
    Rule { regex: &SYNTAX_REGEX, build: syntax },
    Rule { regex: &DIVISION_BY_ZERO_REGEX, build: division_by_zero },
];

fn group<'a>(captures: &'a Captures<'_>, index: usize) -> &'a str {
    captures.get(index).map_or("", |m| m.as_str())
}

fn strftime_order(_: &Captures<'_>) -> QueryHint {
    QueryHint::new(
        HintKind::StrftimeArgumentOrder,
        "strftime was called with its arguments in the wrong order, or with a date stored as text",
        "strftime expects the date first and the format second: strftime(date, format). \
         Columns read from CSV or JSON are often text, so cast them to a date before formatting.",
        "SELECT strftime(CAST(... AS DATE), '%Y-%m-%d') FROM data",
    )
}

fn strftime(captures: &Captures<'_>) -> QueryHint {
    QueryHint::new(
        HintKind::StrftimeMismatch,
        format!("strftime does not accept arguments of type ({})", group(captures, 1)),
        "strftime(date, format) needs a DATE or TIMESTAMP and a format string. \
         Cast the first argument if it is stored as text or a number.",
        "SELECT strftime(CAST(created_at AS TIMESTAMP), '%Y-%m-%d %H:%M') FROM data",
    )
}

fn date_part(captures: &Captures<'_>) -> QueryHint {
    let function = group(captures, 1);
    QueryHint::new(
        HintKind::DatePartOnText,
        format!("{function} cannot extract date parts from text ({})", group(captures, 2)),
        "The column holds text, not a date. Cast it to DATE or TIMESTAMP first.",
        format!("SELECT {function}(CAST(created_at AS DATE)) FROM data"),
    )
}

fn unknown_column(captures: &Captures<'_>) -> QueryHint {
    let column = group(captures, 1);
    QueryHint::new(
        HintKind::UnknownColumn,
        format!("column \"{column}\" does not exist"),
        "Check the spelling and case of the column name. Column names with spaces or \
         capital letters must be double-quoted. Use DESCRIBE to list the available columns.",
        "DESCRIBE data",
    )
}

fn unknown_table(captures: &Captures<'_>) -> QueryHint {
    let table = group(captures, 1);
    QueryHint::new(
        HintKind::UnknownTable,
        format!("table \"{table}\" does not exist"),
        "Tables are named after their source files without the extension. \
         Use SHOW TABLES to list the tables that were imported.",
        "SHOW TABLES",
    )
}

fn ambiguous_column(captures: &Captures<'_>) -> QueryHint {
    let column = group(captures, 1);
    QueryHint::new(
        HintKind::AmbiguousColumn,
        format!("column \"{column}\" exists in more than one table"),
        "Qualify the column with its table name or alias.",
        format!("SELECT a.{column} FROM first_table a JOIN second_table b ON a.{column} = b.{column}"),
    )
}

fn group_by(captures: &Captures<'_>) -> QueryHint {
    let column = group(captures, 1);
    QueryHint::new(
        HintKind::GroupBy,
        format!("column \"{column}\" is neither grouped nor aggregated"),
        "Every selected column must either be listed in GROUP BY or wrapped in an aggregate \
         such as COUNT, SUM or ANY_VALUE.",
        format!("SELECT {column}, COUNT(*) FROM data GROUP BY {column}"),
    )
}

fn conversion(captures: &Captures<'_>) -> QueryHint {
    let value = group(captures, 1);
    let target = group(captures, 2);
    QueryHint::new(
        HintKind::ConversionFailure,
        format!("the value '{value}' cannot be converted to {target}"),
        "The column contains values that are not valid for the target type. \
         TRY_CAST returns NULL instead of failing.",
        format!("SELECT TRY_CAST(column_name AS {target}) FROM data"),
    )
}

fn comparison(captures: &Captures<'_>) -> QueryHint {
    let left = group(captures, 1);
    let right = group(captures, 2);
    QueryHint::new(
        HintKind::ComparisonMismatch,
        format!("cannot compare {left} with {right}"),
        "Both sides of a comparison must have compatible types. Cast one side explicitly.",
        format!("SELECT * FROM data WHERE CAST(column_name AS {right}) = value"),
    )
}

fn no_function(captures: &Captures<'_>) -> QueryHint {
    let function = group(captures, 1);
    QueryHint::new(
        HintKind::NoMatchingFunction,
        format!("{function} cannot be called with arguments ({})", group(captures, 2)),
        "The function exists but not for these argument types. \
         Cast the arguments to the types the function expects.",
        format!("SELECT {function}(CAST(column_name AS DOUBLE)) FROM data"),
    )
}

fn syntax(captures: &Captures<'_>) -> QueryHint {
    let message = match captures.get(1) {
        Some(token) => format!("syntax error near \"{}\"", token.as_str()),
        None => "the query ended unexpectedly".to_string(),
    };
    QueryHint::new(
        HintKind::Syntax,
        message,
        "Look for a missing comma, an unbalanced parenthesis, or a reserved word used as an \
         identifier. Quote identifiers that are reserved words.",
        "SELECT \"order\", \"group\" FROM data",
    )
}

fn division_by_zero(_: &Captures<'_>) -> QueryHint {
    QueryHint::new(
        HintKind::DivisionByZero,
        "division by zero",
        "Guard the divisor with NULLIF so that a zero produces NULL instead of an error.",
        "SELECT total / NULLIF(count, 0) FROM data",
    )
}
