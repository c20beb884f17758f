//! Case classification (§4.6): the fixed set of result-type labels a case
//! entry can be tagged with, plus the per-control case mapping read from
//! `case_config`.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const NORMAL: &str = "normal";
pub const INFO: &str = "info";
pub const ERROR: &str = "error";
pub const WARNING: &str = "warning";
pub const INCIDENT: &str = "incident";
pub const DISCREPANCY: &str = "discrepancy";
pub const SUCCESS: &str = "success";
pub const LOSS: &str = "loss";
pub const DUPLICATE: &str = "duplicate";

const KNOWN_TYPES: &[&str] = &[
    NORMAL, INFO, ERROR, WARNING, INCIDENT, DISCREPANCY, SUCCESS, LOSS, DUPLICATE,
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaseEntry {
    pub case_id: i64,
    pub case_value: String,
    #[serde(default)]
    pub case_type: Option<String>,
    #[serde(default)]
    pub case_description: Option<String>,
}

/// Parse the `case_config` JSON column into a lookup by `case_id`,
/// dropping any `case_type` outside the known set of labels.
pub fn parse(raw: &str) -> Result<HashMap<i64, CaseEntry>, serde_json::Error> {
    let entries: Vec<CaseEntry> = serde_json::from_str(raw)?;
    Ok(entries
        .into_iter()
        .map(|mut entry| {
            if let Some(case_type) = &entry.case_type {
                if !KNOWN_TYPES.contains(&case_type.as_str()) {
                    entry.case_type = None;
                }
            }
            (entry.case_id, entry)
        })
        .collect())
}

fn token_pattern() -> Regex {
    Regex::new(r"(?i)\b(THEN|ELSE)\s+(-?\d+)\b").expect("static regex")
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Rewrite `case_definition`'s `THEN N` / `ELSE N` literals, replacing each
/// case id `N` with whatever `pick` returns for the matching `CaseEntry` (or
/// `NULL` if `N` isn't in `config`).
fn substitute(case_definition: &str, config: &HashMap<i64, CaseEntry>, pick: impl Fn(&CaseEntry) -> Option<String>) -> String {
    token_pattern()
        .replace_all(case_definition, |caps: &regex::Captures| {
            let keyword = &caps[1];
            let id: i64 = caps[2].parse().unwrap_or_default();
            let value = config.get(&id).and_then(&pick).unwrap_or_else(|| "NULL".to_string());
            format!("{keyword} {value}")
        })
        .into_owned()
}

/// Build the three literal `rapo_result_key`/`rapo_result_value`/
/// `rapo_result_type` select columns (§4.6). With no `case_definition`
/// configured, they project as typed nulls so downstream SQL referencing
/// them (e.g. `analyze_error_sql`'s cases fallback) still has something to
/// select against.
pub fn result_columns(case_definition: Option<&str>, config: &HashMap<i64, CaseEntry>) -> (String, String, String) {
    match case_definition.filter(|d| !d.trim().is_empty()) {
        Some(def) => {
            let value_expr = substitute(def, config, |c| Some(quote(&c.case_value)));
            let type_expr = substitute(def, config, |c| c.case_type.as_deref().map(quote));
            (
                format!("({def}) AS rapo_result_key", def = def),
                format!("({value_expr}) AS rapo_result_value"),
                format!("({type_expr}) AS rapo_result_type"),
            )
        }
        None => (
            "CAST(NULL AS BIGINT) AS rapo_result_key".to_string(),
            "CAST(NULL AS VARCHAR) AS rapo_result_value".to_string(),
            "CAST(NULL AS VARCHAR) AS rapo_result_type".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_drops_unknown_case_types() {
        let raw = r#"[{"case_id":1,"case_value":"ok","case_type":"bogus"}]"#;
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed[&1].case_type, None);
    }

    #[test]
    fn parse_keeps_full_nine_type_vocabulary() {
        let raw = r#"[
            {"case_id":1,"case_value":"a","case_type":"success"},
            {"case_id":2,"case_value":"b","case_type":"loss"},
            {"case_id":3,"case_value":"c","case_type":"duplicate"}
        ]"#;
        let parsed = parse(raw).unwrap();
        assert_eq!(parsed[&1].case_type.as_deref(), Some(SUCCESS));
        assert_eq!(parsed[&2].case_type.as_deref(), Some(LOSS));
        assert_eq!(parsed[&3].case_type.as_deref(), Some(DUPLICATE));
    }

    #[test]
    fn result_columns_substitutes_case_ids() {
        let mut config = HashMap::new();
        config.insert(
            1,
            CaseEntry {
                case_id: 1,
                case_value: "balance mismatch".to_string(),
                case_type: Some(DISCREPANCY.to_string()),
                case_description: None,
            },
        );
        let def = "CASE WHEN amount <> 0 THEN 1 ELSE 0 END";
        let (key, value, kind) = result_columns(Some(def), &config);
        assert!(key.contains("THEN 1"));
        assert!(value.contains("'balance mismatch'"));
        assert!(value.contains("ELSE NULL"));
        assert!(kind.contains("'discrepancy'"));
    }

    #[test]
    fn result_columns_default_to_typed_nulls() {
        let (key, value, kind) = result_columns(None, &HashMap::new());
        assert!(key.contains("NULL"));
        assert!(value.contains("NULL"));
        assert!(kind.contains("NULL"));
    }
}
