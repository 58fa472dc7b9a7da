//! SQL-safe identifiers for tables and columns

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static NON_ALPHANUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("Hardcode regex pattern"));

/// Sheet names spreadsheet applications hand out by default.
static DEFAULT_SHEET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*sheet\s*\d*\s*$").expect("Hardcode regex pattern"));

/// Keywords that cannot serve as bare identifiers.
const RESERVED_WORDS: [&str; 62] = [
    "all", "and", "any", "array", "as", "asc", "between", "both", "by", "case", "cast", "check", "collate",
    "column", "constraint", "create", "cross", "default", "delete", "desc", "distinct", "do", "drop", "else",
    "end", "except", "false", "fetch", "for", "foreign", "from", "full", "group", "having", "in", "inner",
    "insert", "intersect", "into", "is", "join", "left", "like", "limit", "not", "null", "offset", "on", "or",
    "order", "outer", "primary", "references", "right", "select", "table", "then", "to", "true", "union",
    "update", "where",
];

/// Returns true if `name` is a keyword that needs a prefix to be used as an identifier.
pub(crate) fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Returns true for names like `Sheet`, `Sheet1` or `sheet 2`.
pub(crate) fn is_default_sheet_name(name: &str) -> bool {
    DEFAULT_SHEET_NAME.is_match(name)
}

/// Lower-cases `label`, collapses non-alphanumeric runs to `_` and trims `_`.
///
/// Names starting with a digit or colliding with a keyword get `prefix`;
/// an empty result becomes `fallback`.
pub(crate) fn normalize_identifier(label: &str, prefix: &str, fallback: &str) -> String {
    let lower = label.to_lowercase();
    let collapsed = NON_ALPHANUMERIC.replace_all(&lower, "_");
    let name = collapsed.trim_matches('_');
    if name.is_empty() {
        fallback.to_owned()
    } else if name.starts_with(|c: char| c.is_ascii_digit()) || is_reserved(name) {
        format!("{prefix}{name}")
    } else {
        name.to_owned()
    }
}

/// Appends `_2`, `_3`, … to `base` until `taken` no longer claims it.
pub(crate) fn unique_name<F>(base: &str, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    if !taken(base) {
        return base.to_owned();
    }
    (2usize..)
        .map(|suffix| format!("{base}_{suffix}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_owned())
}

/// Disambiguates repeated names in encounter order.
///
/// The first occurrence keeps its name, later ones get `_1`, `_2`, … skipping
/// any suffix another column already uses.
pub(crate) fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(names.len());
    let originals: HashSet<String> = names.iter().cloned().collect();
    let mut result = Vec::with_capacity(names.len());
    for name in names {
        if used.insert(name.clone()) {
            result.push(name);
            continue;
        }
        let candidate = (1usize..)
            .map(|suffix| format!("{name}_{suffix}"))
            .find(|candidate| !used.contains(candidate) && !originals.contains(candidate))
            .unwrap_or_else(|| name.clone());
        used.insert(candidate.clone());
        result.push(candidate);
    }
    result
}
