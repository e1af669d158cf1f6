//! Name normalization shared by the schema matcher, the reconciler and the
//! feature matcher.
//!
//! Every comparison of user-entered names goes through [`casefold_key`], so a
//! term that the reconciler considers known is also the term the feature
//! matcher resolves to.

/// Trim and case-fold a term for equality comparison.
pub fn casefold_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Collapse runs of separator characters into single spaces, dropping
/// leading and trailing separators.
fn collapse_separators(value: &str, is_separator: impl Fn(char) -> bool) -> String {
    value
        .split(|c: char| is_separator(c))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a column header: whitespace and underscores are equivalent
/// separators, case is ignored.
pub fn normalize_column_name(name: &str) -> String {
    casefold_key(&collapse_separators(name, |c| c.is_whitespace() || c == '_'))
}

/// Strip `prefix` from the start of `identifier`, ignoring ASCII case.
pub fn strip_prefix_ignore_case<'a>(identifier: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return identifier;
    }
    match identifier.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &identifier[prefix.len()..],
        _ => identifier,
    }
}

/// Normalize a model feature identifier (or a symptom name) for the
/// feature index: strip the prefix, turn `_ - . /` into spaces, collapse
/// whitespace and case-fold.
pub fn normalize_feature(identifier: &str, prefix: &str) -> String {
    let stripped = strip_prefix_ignore_case(identifier.trim(), prefix);
    let collapsed = collapse_separators(stripped, |c| {
        c.is_whitespace() || matches!(c, '_' | '-' | '.' | '/')
    });
    casefold_key(&collapsed)
}
