//! Control parser (§4.5): turns a `ControlConfig` row into concrete names,
//! SQL fragments and column lists the executor acts on.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;

use rapo_db::formatter;

use crate::config::{ControlConfig, Variables};
use crate::error::{ControlError, Result};
use crate::fields;

#[derive(Debug, Clone, Deserialize)]
pub struct OutputColumn {
    pub column: Option<String>,
    pub column_a: Option<String>,
    pub column_b: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutputColumnsDocument {
    #[serde(default)]
    columns: Vec<OutputColumnValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OutputColumnValue {
    Name(String),
    Full(OutputColumn),
}

/// Output column configuration stored under `output_table*` is either a
/// bare column name or `{column, column_a, column_b}`; normalize to the
/// latter shape, lower-casing every name.
pub fn parse_output_columns(config: Option<&str>) -> Option<Vec<OutputColumn>> {
    let raw = config?;
    let doc: OutputColumnsDocument = serde_json::from_str(raw).ok()?;
    if doc.columns.is_empty() {
        return None;
    }
    let columns = doc
        .columns
        .into_iter()
        .map(|value| match value {
            OutputColumnValue::Name(name) => OutputColumn {
                column: Some(name.to_lowercase()),
                column_a: None,
                column_b: None,
            },
            OutputColumnValue::Full(mut col) => {
                col.column = col.column.map(|c| c.to_lowercase());
                col.column_a = col.column_a.map(|c| c.to_lowercase());
                col.column_b = col.column_b.map(|c| c.to_lowercase());
                col
            }
        })
        .collect();
    Some(columns)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleColumns {
    pub column_a: String,
    pub column_b: String,
}

pub fn parse_rule_config(raw: Option<&str>) -> Result<Vec<RuleColumns>> {
    let raw = raw.unwrap_or("[]");
    let mut entries: Vec<RuleColumns> = serde_json::from_str(raw).map_err(|source| {
        ControlError::MalformedJson {
            control: String::new(),
            field: "rule_config",
            source,
        }
    })?;
    for entry in &mut entries {
        entry.column_a = entry.column_a.to_lowercase();
        entry.column_b = entry.column_b.to_lowercase();
    }
    Ok(entries)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorFilterEntry {
    #[serde(default = "default_connexion")]
    pub connexion: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub column_a: Option<String>,
    #[serde(default)]
    pub column_b: Option<String>,
    #[serde(default = "default_relation")]
    pub relation: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub is_column: bool,
}

fn default_connexion() -> String {
    "AND".to_string()
}

fn default_relation() -> String {
    "<>".to_string()
}

/// Error configuration shape shared by ANL (`error_config` as a filter
/// list) and REC (`error_config` as a column-pair list); both read the
/// same `rule_config`-like JSON document.
pub fn parse_error_filter_config(raw: Option<&str>) -> Result<Vec<ErrorFilterEntry>> {
    let raw = raw.unwrap_or("[]");
    serde_json::from_str(raw).map_err(|source| ControlError::MalformedJson {
        control: String::new(),
        field: "error_config",
        source,
    })
}

/// Build the SQL `WHERE`-clause body selecting discrepancies for an ANL
/// control, from either a JSON filter list or a raw SQL passthrough.
pub fn analyze_error_sql(raw_config: Option<&str>, has_cases: bool) -> Result<String> {
    match raw_config {
        Some(raw) if looks_like_json(raw) => {
            let entries = parse_error_filter_config(Some(raw))?;
            let mut clauses = Vec::with_capacity(entries.len());
            for (i, entry) in entries.iter().enumerate() {
                let mut piece = String::new();
                if i > 0 {
                    piece.push_str(&entry.connexion);
                    piece.push(' ');
                }
                let column = entry.column.as_deref().unwrap_or("");
                piece.push_str(column);
                piece.push(' ');
                piece.push_str(&entry.relation);
                piece.push(' ');
                match &entry.value {
                    Some(value) if entry.is_column => {
                        piece.push_str(value.as_str().unwrap_or_default());
                    }
                    Some(value) => piece.push_str(&sql_literal(value)),
                    None => piece.push_str("NULL"),
                }
                clauses.push(piece);
            }
            Ok(clauses.join("\n"))
        }
        Some(raw) if !raw.trim().is_empty() => Ok(raw.to_string()),
        _ if has_cases => Ok(format!(
            "{} IN ('{}', '{}', '{}', '{}') OR {} IS NULL",
            fields::RESULT_TYPE,
            crate::case::INFO,
            crate::case::ERROR,
            crate::case::WARNING,
            crate::case::INCIDENT,
            fields::RESULT_TYPE,
        )),
        _ => Ok(String::new()),
    }
}

fn looks_like_json(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.starts_with('[') || trimmed.starts_with('{')
}

fn sql_literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}

/// Parse a `REC` control's `rule_config`, falling back to
/// `source_key_field_a`/`_b` as the correlation key when the rule itself
/// doesn't name one.
pub fn parse_reconciliation_rule(
    raw: Option<&str>,
    default_key_a: Option<&str>,
    default_key_b: Option<&str>,
) -> Result<crate::reconciliation::ReconciliationRuleConfig> {
    let mut rule = crate::reconciliation::parse(raw)?;
    if rule.keys.is_empty() {
        if let (Some(a), Some(b)) = (default_key_a, default_key_b) {
            rule.keys.push(crate::reconciliation::CorrelationKey {
                column_a: a.to_lowercase(),
                column_b: b.to_lowercase(),
            });
        }
    }
    Ok(rule)
}

pub fn source_name(template: Option<&str>, variables: &Variables) -> Option<String> {
    let template = template?;
    if template.trim().is_empty() {
        return None;
    }
    Some(variables.substitute(template).to_lowercase())
}

/// Build a plain `SELECT ... FROM <table> [WHERE ...] [AND date BETWEEN]`
/// statement against a single source. `result_columns`, when given, are
/// appended to the select list verbatim (§4.6's `rapo_result_*` triple).
pub fn select_source(
    table: &str,
    select_list: &str,
    filter: Option<&str>,
    date_field: Option<&str>,
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
    result_columns: Option<&(String, String, String)>,
) -> String {
    let select_list = match result_columns {
        Some((key, value, kind)) => format!("{select_list}, {key}, {value}, {kind}"),
        None => select_list.to_string(),
    };
    let mut sql = format!("SELECT {select_list} FROM {table}");
    let mut clauses = Vec::new();
    if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
        clauses.push(filter.to_string());
    }
    if let (Some(field), Some(from), Some(to)) = (date_field, date_from, date_to) {
        clauses.push(format!(
            "{field} BETWEEN '{}' AND '{}'",
            from.format("%Y-%m-%d %H:%M:%S"),
            to.format("%Y-%m-%d %H:%M:%S"),
        ));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    formatter::format(&sql)
}

pub fn output_table_name(control_name: &str) -> String {
    format!("rapo_rest_{}", control_name.to_lowercase())
}

pub fn temp_names(control_type: &str, _subtype: Option<&str>, process_id: i64) -> Vec<String> {
    let fd = format!("rapo_temp_fd_{process_id}");
    let fda = format!("rapo_temp_fda_{process_id}");
    let fdb = format!("rapo_temp_fdb_{process_id}");
    let err = format!("rapo_temp_err_{process_id}");
    let md = format!("rapo_temp_md_{process_id}");
    let nmd = format!("rapo_temp_nmd_{process_id}");
    match control_type {
        "ANL" => vec![fd, err],
        "REP" => vec![fd],
        "CMP" => vec![fda, fdb, md, nmd],
        "REC" => {
            let mut names = vec![
                fda,
                fdb,
                format!("rapo_temp_comb_{process_id}"),
                format!("rapo_temp_dup_a_{process_id}"),
                format!("rapo_temp_dup_b_{process_id}"),
                format!("rapo_temp_nf_a_{process_id}"),
                format!("rapo_temp_nf_b_{process_id}"),
                format!("rapo_temp_res_a_{process_id}"),
                format!("rapo_temp_res_b_{process_id}"),
                format!("rapo_temp_err_a_{process_id}"),
                format!("rapo_temp_err_b_{process_id}"),
            ];
            names.sort();
            names
        }
        _ => vec![],
    }
}

pub fn has_output(control_type: &str, _subtype: Option<&str>) -> bool {
    matches!(control_type, "ANL" | "REP" | "CMP" | "REC")
}

pub fn statement(raw: Option<&str>, variables: &Variables) -> Option<String> {
    let raw = raw.filter(|s| !s.trim().is_empty())?;
    Some(formatter::format(&variables.substitute(raw)))
}

/// Find process IDs whose output rows are past `days_retention` and
/// should be purged, per output table.
pub async fn outdated_results(
    pool: &PgPool,
    control_id: i64,
    days_retention: i32,
    output_tables: &[String],
) -> Result<Vec<(String, Vec<i64>)>> {
    let mut outdated = Vec::new();
    for table in output_tables {
        let sql = format!(
            "SELECT process_id FROM rapo_log \
             WHERE control_id = $1 \
               AND added < CURRENT_DATE - $2::int \
               AND process_id IN (SELECT rapo_process_id FROM {table}) \
             ORDER BY process_id"
        );
        let rows: Vec<(i64,)> = sqlx::query_as(&sql)
            .bind(control_id)
            .bind(days_retention)
            .fetch_all(pool)
            .await?;
        let ids: Vec<i64> = rows.into_iter().map(|(id,)| id).collect();
        if !ids.is_empty() {
            outdated.push((table.clone(), ids));
        }
    }
    Ok(outdated)
}

pub fn variables_for(config: &ControlConfig, process_id: i64, date_from: DateTime<Utc>, date_to: DateTime<Utc>) -> Variables {
    let control_date = if date_from.date_naive() == date_to.date_naive() {
        Some(date_from.date_naive())
    } else {
        None
    };
    Variables {
        control_name: config.control_name.clone(),
        control_date,
        control_date_from: date_from,
        control_date_to: date_to,
        process_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn sample_config(control_type: &str) -> ControlConfig {
        ControlConfig {
            control_id: 1,
            control_name: "daily_revenue_check".to_string(),
            control_group: None,
            control_type: control_type.to_string(),
            control_subtype: None,
            control_engine: "DB".to_string(),
            status: "Y".to_string(),
            schedule: None,
            period_back: 1,
            period_number: 1,
            period_type: "D".to_string(),
            days_back: 0,
            days_retention: 30,
            timeout: None,
            source_name: None,
            source_filter: None,
            source_date_field: None,
            source_name_a: None,
            source_filter_a: None,
            source_date_field_a: None,
            source_name_b: None,
            source_filter_b: None,
            source_date_field_b: None,
            source_key_field_a: None,
            source_key_field_b: None,
            parallelism: None,
            need_a: "N".to_string(),
            need_b: "N".to_string(),
            with_deletion: "N".to_string(),
            with_drop: "N".to_string(),
            need_hook: "N".to_string(),
            need_prerun_hook: "N".to_string(),
            need_postrun_hook: "N".to_string(),
            prerequisite_sql: None,
            preparation_sql: None,
            completion_sql: None,
            case_config: None,
            case_definition: None,
            result_config: None,
            error_config: None,
            rule_config: None,
            output_table: None,
            output_table_a: None,
            output_table_b: None,
            iteration_config: None,
            created_date: at(2026, 1, 1),
            updated_date: at(2026, 1, 1),
        }
    }

    #[test]
    fn parse_output_columns_normalizes_bare_names_and_lowercases() {
        let raw = r#"{"columns": ["ACCOUNT_ID", {"column_a": "AMT_A", "column_b": "AMT_B"}]}"#;
        let columns = parse_output_columns(Some(raw)).expect("columns present");
        assert_eq!(columns[0].column.as_deref(), Some("account_id"));
        assert_eq!(columns[1].column_a.as_deref(), Some("amt_a"));
        assert_eq!(columns[1].column_b.as_deref(), Some("amt_b"));
    }

    #[test]
    fn parse_output_columns_is_none_for_empty_list() {
        assert!(parse_output_columns(Some(r#"{"columns": []}"#)).is_none());
        assert!(parse_output_columns(None).is_none());
    }

    #[test]
    fn parse_rule_config_lowercases_columns() {
        let rules = parse_rule_config(Some(r#"[{"column_a": "ID", "column_b": "ID_REF"}]"#)).unwrap();
        assert_eq!(rules[0].column_a, "id");
        assert_eq!(rules[0].column_b, "id_ref");
    }

    #[test]
    fn parse_rule_config_defaults_to_empty() {
        assert!(parse_rule_config(None).unwrap().is_empty());
    }

    #[test]
    fn analyze_error_sql_builds_filter_chain_from_json() {
        let raw = r#"[{"column": "amount", "relation": "<", "value": 0}, {"column": "status", "connexion": "OR", "relation": "=", "value": "bad"}]"#;
        let sql = analyze_error_sql(Some(raw), false).unwrap();
        assert_eq!(sql, "amount < 0\nOR status = 'bad'");
    }

    #[test]
    fn analyze_error_sql_passes_through_raw_sql() {
        let sql = analyze_error_sql(Some("amount < 0"), false).unwrap();
        assert_eq!(sql, "amount < 0");
    }

    #[test]
    fn analyze_error_sql_falls_back_to_case_vocabulary() {
        let sql = analyze_error_sql(None, true).unwrap();
        assert!(sql.contains(fields::RESULT_TYPE));
        assert!(sql.contains(crate::case::ERROR));
    }

    #[test]
    fn analyze_error_sql_is_empty_without_cases_or_config() {
        assert_eq!(analyze_error_sql(None, false).unwrap(), "");
    }

    #[test]
    fn source_name_substitutes_and_lowercases() {
        let config = sample_config("ANL");
        let vars = variables_for(&config, 42, at(2026, 7, 26), at(2026, 7, 26));
        let name = source_name(Some("SALES_{control_date}"), &vars).unwrap();
        assert_eq!(name, "sales_2026-07-26");
    }

    #[test]
    fn source_name_is_none_for_blank_template() {
        let config = sample_config("ANL");
        let vars = variables_for(&config, 1, at(2026, 1, 1), at(2026, 1, 1));
        assert!(source_name(Some("   "), &vars).is_none());
        assert!(source_name(None, &vars).is_none());
    }

    #[test]
    fn select_source_builds_filter_and_date_window() {
        let sql = select_source(
            "sales",
            "*",
            Some("region = 'EU'"),
            Some("sale_date"),
            Some(at(2026, 7, 1)),
            Some(at(2026, 7, 31)),
            None,
        );
        assert!(sql.contains("FROM sales"));
        assert!(sql.contains("region = 'EU'"));
        assert!(sql.contains("sale_date BETWEEN"));
    }

    #[test]
    fn output_table_name_is_prefixed_and_lowercased() {
        assert_eq!(output_table_name("Daily_Revenue"), "rapo_rest_daily_revenue");
    }

    #[test]
    fn temp_names_differ_by_control_type() {
        assert_eq!(temp_names("ANL", None, 7).len(), 2);
        assert_eq!(temp_names("REP", None, 7).len(), 1);
        assert_eq!(temp_names("CMP", None, 7).len(), 4);
        assert_eq!(temp_names("REC", None, 7).len(), 11);
    }

    #[test]
    fn temp_names_is_empty_for_unknown_type() {
        assert!(temp_names("XYZ", None, 7).is_empty());
    }

    #[test]
    fn has_output_is_true_for_every_known_control_type() {
        for control_type in ["ANL", "REP", "CMP", "REC"] {
            assert!(has_output(control_type, None));
        }
        assert!(!has_output("XYZ", None));
    }

    #[test]
    fn statement_substitutes_variables_and_formats() {
        let config = sample_config("ANL");
        let vars = variables_for(&config, 9, at(2026, 7, 26), at(2026, 7, 26));
        let sql = statement(Some("DELETE FROM foo WHERE process_id = {process_id}"), &vars).unwrap();
        assert!(sql.contains("9"));
    }

    #[test]
    fn statement_is_none_for_blank_input() {
        let config = sample_config("ANL");
        let vars = variables_for(&config, 1, at(2026, 1, 1), at(2026, 1, 1));
        assert!(statement(Some("  "), &vars).is_none());
        assert!(statement(None, &vars).is_none());
    }

    #[test]
    fn variables_for_sets_control_date_only_when_single_day() {
        let config = sample_config("ANL");
        let same_day = variables_for(&config, 1, at(2026, 7, 26), at(2026, 7, 26));
        assert!(same_day.control_date.is_some());

        let range = variables_for(&config, 1, at(2026, 7, 1), at(2026, 7, 31));
        assert!(range.control_date.is_none());
    }
}
