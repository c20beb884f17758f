//! Statement formatter: pretty-prints SQL for human logs (§4.2 point 3).
//!
//! Keywords are upper-cased, everything else is left as written (bare
//! identifier casing is the caller's concern, since this formatter doesn't
//! attempt to parse the statement, only to tokenize and re-indent it), and
//! each clause-leading keyword starts its own line.

const KEYWORDS: &[&str] = &[
    "select", "from", "where", "and", "or", "join", "inner", "left", "right",
    "outer", "on", "group", "by", "order", "having", "insert", "into",
    "values", "update", "set", "delete", "create", "table", "as", "union",
    "all", "distinct", "limit", "offset", "with", "case", "when", "then",
    "else", "end", "not", "in", "is", "null", "between", "truncate", "drop",
    "index", "compress",
];

const CLAUSE_LEADERS: &[&str] = &[
    "select", "from", "where", "group", "order", "having", "insert", "values",
    "update", "set", "union", "with",
];

/// Pretty-print a single SQL statement.
pub fn format(sql: &str) -> String {
    let mut out = String::new();
    for (i, raw_line) in split_clauses(sql).into_iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&reindent(&raw_line));
    }
    out
}

fn split_clauses(sql: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    for word in sql.split_whitespace() {
        let lower = word.to_ascii_lowercase();
        if CLAUSE_LEADERS.contains(&lower.as_str()) && !current.trim().is_empty() {
            clauses.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.trim().is_empty() {
        clauses.push(current);
    }
    clauses
}

fn reindent(clause: &str) -> String {
    clause
        .split_whitespace()
        .map(uppercase_keyword)
        .collect::<Vec<_>>()
        .join(" ")
}

fn uppercase_keyword(word: &str) -> String {
    let bare = word.trim_matches(|c: char| !c.is_alphanumeric());
    if KEYWORDS.contains(&bare.to_ascii_lowercase().as_str()) {
        word.to_ascii_uppercase()
    } else {
        word.to_string()
    }
}

/// Join several formatted statements for a single human-readable log entry,
/// separated by a ruler, matching `db.formatter.document(...)` in the
/// original.
pub fn document<I, S>(statements: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let ruler = "-".repeat(60);
    statements
        .into_iter()
        .map(|s| format(s.as_ref()))
        .collect::<Vec<_>>()
        .join(&format!("\n{ruler}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercases_keywords_and_splits_clauses() {
        let sql = "select a, b from my_table where a > 1 and b < 2";
        let formatted = format(sql);
        assert!(formatted.contains("SELECT a, b"));
        assert!(formatted.contains("FROM my_table"));
        assert!(formatted.contains("WHERE a > 1 AND b < 2"));
    }

    #[test]
    fn document_joins_with_ruler() {
        let joined = document(["select 1", "select 2"]);
        assert_eq!(joined.matches('-').count(), 60);
    }
}
