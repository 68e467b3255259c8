use regex::Regex;
use std::sync::LazyLock;

// Engine error messages quote identifiers with either double quotes or nothing.
const IDENT: &str = r#""?([^"\s!]+)"?"#;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

regex!(STRFTIME_ORDER_REGEX, r#"(?i)function call "strftime\((VARCHAR|STRING_LITERAL),\s*(STRING_LITERAL|VARCHAR)\)""#);
regex!(STRFTIME_REGEX, r#"(?i)function call "strftime\(([^)]*)\)""#);
regex!(
    DATE_PART_REGEX,
    r#"(?i)function call "(date_part|datepart|extract|year|month|day|hour|minute|second|week|quarter)\(([^)]*VARCHAR[^)]*)\)""#
);
regex!(
    UNKNOWN_COLUMN_REGEX,
    format!(r#"(?i)(?:Referenced column|column with name) {IDENT} (?:not found|does not exist)"#).as_str()
);
regex!(UNKNOWN_TABLE_REGEX, format!(r"(?i)Table with name {IDENT} does not exist").as_str());
regex!(AMBIGUOUS_COLUMN_REGEX, format!(r"(?i)Ambiguous reference to column name {IDENT}").as_str());
regex!(
    GROUP_BY_REGEX,
    format!(r"(?i)column {IDENT} must appear in the GROUP BY clause or (?:must )?be (?:part of|used in) an aggregate function").as_str()
);
regex!(CONVERSION_REGEX, r"(?i)Could not convert string '([^']*)' to '?([A-Z0-9_]+)'?");
regex!(COMPARISON_REGEX, r"(?i)Cannot compare values of type ([A-Z0-9_\[\]]+) and type ([A-Z0-9_\[\]]+)");
regex!(NO_FUNCTION_REGEX, r"(?i)No function matches the given name and argument types '([A-Za-z0-9_]+)\(([^)]*)\)'");
regex!(SYNTAX_REGEX, r#"(?i)syntax error at (?:or near "([^"]*)"|end of input)"#);
regex!(DIVISION_BY_ZERO_REGEX, r"(?i)division by zero");
