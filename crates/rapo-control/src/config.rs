//! `rapo_config` row: the static configuration for one control, loaded
//! once per run and consulted throughout the lifecycle.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{ControlError, Result};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ControlConfig {
    pub control_id: i64,
    pub control_name: String,
    pub control_group: Option<String>,
    pub control_type: String,
    pub control_subtype: Option<String>,
    pub control_engine: String,
    pub status: String,
    pub schedule: Option<String>,

    pub period_back: i32,
    pub period_number: i32,
    pub period_type: String,
    pub days_back: i32,
    pub days_retention: i32,
    /// Seconds a run may stay in `S`/`P`/`F` before the scheduler's
    /// supervisor force-cancels it (§4.7, §5). `None`/non-positive means
    /// no timeout is enforced.
    pub timeout: Option<i64>,

    pub source_name: Option<String>,
    pub source_filter: Option<String>,
    pub source_date_field: Option<String>,
    pub source_name_a: Option<String>,
    pub source_filter_a: Option<String>,
    pub source_date_field_a: Option<String>,
    pub source_name_b: Option<String>,
    pub source_filter_b: Option<String>,
    pub source_date_field_b: Option<String>,
    /// Default correlation key columns for `REC` controls when a rule's
    /// own correlation keys don't override them (§3, §4.4).
    pub source_key_field_a: Option<String>,
    pub source_key_field_b: Option<String>,

    pub parallelism: Option<i32>,
    pub need_a: String,
    pub need_b: String,
    pub with_deletion: String,
    pub with_drop: String,
    pub need_hook: String,
    pub need_prerun_hook: String,
    pub need_postrun_hook: String,

    pub prerequisite_sql: Option<String>,
    pub preparation_sql: Option<String>,
    pub completion_sql: Option<String>,

    pub case_config: Option<String>,
    /// CASE-WHEN SQL text referencing `case_config`'s numeric case ids;
    /// substituted into `rapo_result_key`/`rapo_result_value`/
    /// `rapo_result_type` (§4.6).
    pub case_definition: Option<String>,
    pub result_config: Option<String>,
    pub error_config: Option<String>,
    pub rule_config: Option<String>,

    pub output_table: Option<String>,
    pub output_table_a: Option<String>,
    pub output_table_b: Option<String>,

    pub iteration_config: Option<String>,

    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
}

impl ControlConfig {
    pub async fn fetch(pool: &PgPool, name: &str) -> Result<Self> {
        sqlx::query_as("SELECT * FROM rapo_config WHERE lower(control_name) = lower($1)")
            .bind(name)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ControlError::UnknownControl(name.to_string()))
    }

    pub fn is_yes(value: &str) -> bool {
        value.eq_ignore_ascii_case("Y")
    }

    pub fn need_a(&self) -> bool {
        Self::is_yes(&self.need_a)
    }

    pub fn need_b(&self) -> bool {
        Self::is_yes(&self.need_b)
    }

    pub fn with_deletion(&self) -> bool {
        Self::is_yes(&self.with_deletion)
    }

    pub fn with_drop(&self) -> bool {
        Self::is_yes(&self.with_drop)
    }

    pub fn need_hook(&self) -> bool {
        Self::is_yes(&self.need_hook)
    }

    pub fn need_prerun_hook(&self) -> bool {
        Self::is_yes(&self.need_prerun_hook)
    }

    pub fn need_postrun_hook(&self) -> bool {
        Self::is_yes(&self.need_postrun_hook)
    }

    pub fn is_analysis(&self) -> bool {
        self.control_type == "ANL"
    }

    pub fn is_reconciliation(&self) -> bool {
        self.control_type == "REC"
    }

    /// `CMP` controls compare two sources row-for-row (subtype `MA`);
    /// distinct from `REC`'s correlation-key reconciliation (§3, §4.4).
    pub fn is_comparison(&self) -> bool {
        self.control_type == "CMP"
    }

    pub fn is_report(&self) -> bool {
        self.control_type == "REP"
    }

    pub fn has_iterations(&self) -> bool {
        matches!(&self.iteration_config, Some(s) if !s.trim().is_empty() && s.trim() != "[]")
    }
}

/// Template variables a control's SQL fragments can reference as
/// `{control_name}`, `{control_date_from}`, etc. (§6.3, supplemented).
pub struct Variables {
    pub control_name: String,
    pub control_date: Option<chrono::NaiveDate>,
    pub control_date_from: DateTime<Utc>,
    pub control_date_to: DateTime<Utc>,
    pub process_id: i64,
}

impl Variables {
    pub fn substitute(&self, template: &str) -> String {
        let mut out = template.to_string();
        out = out.replace("{control_name}", &self.control_name);
        out = out.replace(
            "{control_date}",
            &self
                .control_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        );
        out = out.replace(
            "{control_date_from}",
            &self.control_date_from.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        out = out.replace(
            "{control_date_to}",
            &self.control_date_to.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        out = out.replace("{process_id}", &self.process_id.to_string());
        out
    }
}
