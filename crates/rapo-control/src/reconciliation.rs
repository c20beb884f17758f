//! `REC` rule configuration (§3, §4.4): correlation keys, discrepancy
//! fields and the duplicate/time-window switches that drive the
//! combination -> duplicate-detection -> reconsolidation pipeline.
//!
//! Distinct from `CMP`'s `rule_config` (a bare list of `{column_a,
//! column_b}` pairs used for an exact-match join, [`crate::parser::parse_rule_config`]) —
//! `REC`'s rule config is a single JSON object describing a correlation
//! key, per-field discrepancy rules, and reconciliation switches. No
//! concrete worked example of this shape survives in the historical
//! sources available to this codebase; the schema below is read directly
//! off the component description rather than transliterated from a prior
//! implementation (see DESIGN.md).

use serde::Deserialize;

use crate::error::{ControlError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct CorrelationKey {
    pub column_a: String,
    pub column_b: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscrepancyField {
    pub field_a: String,
    pub field_b: String,
    #[serde(default = "default_rule")]
    pub rule: String,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub sum: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub percentage_mode: bool,
}

fn default_rule() -> String {
    "equal".to_string()
}

impl DiscrepancyField {
    /// The boolean SQL predicate that is true when this field pair is
    /// considered a *discrepancy* (not when it matches).
    pub fn predicate(&self, table_a: &str, table_b: &str) -> String {
        let a = format!("{table_a}.{}", self.field_a);
        let b = format!("{table_b}.{}", self.field_b);
        if let Some(formula) = &self.formula {
            return formula.replace("{a}", &a).replace("{b}", &b);
        }
        match self.rule.as_str() {
            "equal" => format!("({a} IS DISTINCT FROM {b})"),
            "percentage" | _ if self.percentage_mode => format!(
                "(ABS({a} - {b}) / NULLIF(GREATEST(ABS({a}), ABS({b})), 0) > 0.0)"
            ),
            "greater_equal" => format!("({a} < {b})"),
            "less_equal" => format!("({a} > {b})"),
            _ => format!("({a} IS DISTINCT FROM {b})"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationRuleConfig {
    #[serde(default)]
    pub keys: Vec<CorrelationKey>,
    #[serde(default)]
    pub fields: Vec<DiscrepancyField>,
    /// Seconds B's timestamp may trail A's and still correlate (§4.4
    /// "time-shift window").
    #[serde(default)]
    pub time_shift_from: Option<i64>,
    #[serde(default)]
    pub time_shift_to: Option<i64>,
    /// Seconds of symmetric slack applied on top of the shift window.
    #[serde(default)]
    pub time_tolerance: Option<i64>,
    #[serde(default)]
    pub time_field_a: Option<String>,
    #[serde(default)]
    pub time_field_b: Option<String>,
    #[serde(default = "default_true")]
    pub need_recons_a: bool,
    #[serde(default = "default_true")]
    pub need_recons_b: bool,
    #[serde(default = "default_true")]
    pub need_issues_a: bool,
    #[serde(default = "default_true")]
    pub need_issues_b: bool,
    #[serde(default)]
    pub allow_duplicates: bool,
}

fn default_true() -> bool {
    true
}

impl ReconciliationRuleConfig {
    pub fn key_columns_a(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.column_a.as_str()).collect()
    }

    pub fn key_columns_b(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.column_b.as_str()).collect()
    }

    pub fn join_condition(&self, table_a: &str, table_b: &str) -> String {
        let mut clauses: Vec<String> = self
            .keys
            .iter()
            .map(|k| format!("{table_a}.{} = {table_b}.{}", k.column_a, k.column_b))
            .collect();
        if let (Some(field_a), Some(field_b)) = (&self.time_field_a, &self.time_field_b) {
            let shift_from = self.time_shift_from.unwrap_or(0) - self.time_tolerance.unwrap_or(0);
            let shift_to = self.time_shift_to.unwrap_or(0) + self.time_tolerance.unwrap_or(0);
            clauses.push(format!(
                "{table_b}.{field_b} BETWEEN {table_a}.{field_a} + INTERVAL '{shift_from} seconds' \
                 AND {table_a}.{field_a} + INTERVAL '{shift_to} seconds'"
            ));
        }
        clauses.join(" AND ")
    }

    pub fn discrepancy_predicate(&self, table_a: &str, table_b: &str) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }
        Some(
            self.fields
                .iter()
                .map(|f| f.predicate(table_a, table_b))
                .collect::<Vec<_>>()
                .join(" OR "),
        )
    }
}

pub fn parse(raw: Option<&str>) -> Result<ReconciliationRuleConfig> {
    let raw = raw.filter(|s| !s.trim().is_empty()).unwrap_or("{}");
    serde_json::from_str(raw).map_err(|source| ControlError::MalformedJson {
        control: String::new(),
        field: "rule_config",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_switches_on() {
        let raw = r#"{"keys":[{"column_a":"id","column_b":"ref_id"}]}"#;
        let config = parse(Some(raw)).unwrap();
        assert!(config.need_recons_a);
        assert!(config.need_issues_b);
        assert!(!config.allow_duplicates);
    }

    #[test]
    fn join_condition_includes_time_window() {
        let raw = r#"{
            "keys":[{"column_a":"id","column_b":"ref_id"}],
            "time_field_a":"ts_a","time_field_b":"ts_b",
            "time_shift_from":0,"time_shift_to":60,"time_tolerance":5
        }"#;
        let config = parse(Some(raw)).unwrap();
        let sql = config.join_condition("a", "b");
        assert!(sql.contains("a.id = b.ref_id"));
        assert!(sql.contains("INTERVAL '-5 seconds'"));
        assert!(sql.contains("INTERVAL '65 seconds'"));
    }

    #[test]
    fn discrepancy_predicate_joins_fields_with_or() {
        let raw = r#"{"keys":[],"fields":[
            {"field_a":"amount","field_b":"amount"},
            {"field_a":"currency","field_b":"currency"}
        ]}"#;
        let config = parse(Some(raw)).unwrap();
        let sql = config.discrepancy_predicate("a", "b").unwrap();
        assert!(sql.contains("a.amount IS DISTINCT FROM b.amount"));
        assert!(sql.contains(" OR "));
    }
}
