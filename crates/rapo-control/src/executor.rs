//! Control executor (§4.4): the primitives a lifecycle step calls into —
//! fetch, analyze, match/mismatch, count, save, and the temporary/output
//! table bookkeeping around them.

use rapo_db::{formatter, Gateway};

use crate::config::ControlConfig;
use crate::error::Result;
use crate::parser::{self, OutputColumn};
use crate::reconciliation::ReconciliationRuleConfig;

pub struct Executor<'a> {
    gateway: &'a Gateway,
}

impl<'a> Executor<'a> {
    pub fn new(gateway: &'a Gateway) -> Self {
        Self { gateway }
    }

    /// `CREATE TABLE <into> AS <select>`, returning the created table's
    /// name and the row count once materialized.
    async fn fetch_into(&self, select: &str, into: &str) -> Result<String> {
        self.gateway.check_identifier(into)?;
        let ctas = format!("CREATE TABLE {into} AS\n{select}");
        tracing::info!(table = %into, statement = %formatter::format(&ctas), "creating table");
        self.gateway.execute(&ctas).await?;
        Ok(into.to_string())
    }

    pub async fn fetch_records(&self, select: &str, process_id: i64) -> Result<String> {
        self.fetch_into(select, &format!("rapo_temp_fd_{process_id}")).await
    }

    pub async fn fetch_records_a(&self, select: &str, process_id: i64) -> Result<String> {
        self.fetch_into(select, &format!("rapo_temp_fda_{process_id}")).await
    }

    pub async fn fetch_records_b(&self, select: &str, process_id: i64) -> Result<String> {
        self.fetch_into(select, &format!("rapo_temp_fdb_{process_id}")).await
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let row: (i64,) = sqlx::query_as(&sql).fetch_one(self.gateway.pool()).await?;
        Ok(row.0)
    }

    /// ANL/REP analysis: materialize the discrepancy rows matching
    /// `error_sql` out of the fetched input table.
    pub async fn analyze(
        &self,
        input_table: &str,
        output_columns: Option<&[OutputColumn]>,
        error_sql: &str,
        process_id: i64,
    ) -> Result<String> {
        let select_list = projected_columns(input_table, output_columns);
        let mut select = format!("SELECT {select_list} FROM {input_table}");
        if !error_sql.trim().is_empty() {
            select.push_str(" WHERE ");
            select.push_str(error_sql);
        }
        self.fetch_into(&select, &format!("rapo_temp_err_{process_id}")).await
    }

    /// REC/MA matching: inner-join A and B on the rule columns, keeping
    /// only rows that also satisfy every `error_config` equality.
    pub async fn match_rows(
        &self,
        table_a: &str,
        table_b: &str,
        output_columns: Option<&[OutputColumn]>,
        rule: &[parser::RuleColumns],
        error: &[parser::RuleColumns],
        process_id: i64,
    ) -> Result<String> {
        let select_list = joined_columns(table_a, table_b, output_columns);
        let on_clause = join_condition(table_a, table_b, rule, " AND ");
        let mut select = format!(
            "SELECT {select_list} FROM {table_a} JOIN {table_b} ON {on_clause}"
        );
        for e in error {
            select.push_str(&format!(
                " AND {table_a}.{} = {table_b}.{}",
                e.column_a, e.column_b
            ));
        }
        self.fetch_into(&select, &format!("rapo_temp_md_{process_id}")).await
    }

    /// REC/MA mismatching: left-outer-join A to B, keeping rows where any
    /// `error_config` column pair differs (or B is absent entirely).
    pub async fn mismatch_rows(
        &self,
        table_a: &str,
        table_b: &str,
        output_columns: Option<&[OutputColumn]>,
        rule: &[parser::RuleColumns],
        error: &[parser::RuleColumns],
        process_id: i64,
    ) -> Result<String> {
        let select_list = joined_columns(table_a, table_b, output_columns);
        let on_clause = join_condition(table_a, table_b, rule, " AND ");
        let mut select = format!(
            "SELECT {select_list} FROM {table_a} LEFT JOIN {table_b} ON {on_clause}"
        );
        if !error.is_empty() {
            let diffs: Vec<String> = error
                .iter()
                .map(|e| {
                    format!(
                        "({table_a}.{} <> {table_b}.{} OR {table_b}.{} IS NULL)",
                        e.column_a, e.column_b, e.column_b
                    )
                })
                .collect();
            select.push_str(" WHERE ");
            select.push_str(&diffs.join(" OR "));
        }
        self.fetch_into(&select, &format!("rapo_temp_nmd_{process_id}")).await
    }

    /// REC combination stage (§4.4, sequential): full outer join A and B
    /// on their correlation keys (and optional time window), producing one
    /// row per correlated pair plus any row unmatched on either side.
    pub async fn combine(&self, table_a: &str, table_b: &str, rule: &ReconciliationRuleConfig, process_id: i64) -> Result<String> {
        let on = rule.join_condition(table_a, table_b);
        let select = format!("SELECT {table_a}.*, {table_b}.* FROM {table_a} FULL OUTER JOIN {table_b} ON {on}");
        self.fetch_into(&select, &format!("rapo_temp_comb_{process_id}")).await
    }

    /// REC duplicate-detection prepare (parallel A/B): correlation keys
    /// repeated more than once within one side. Duplicate-finish is folded
    /// into [`Executor::reconsolidate_side`], which excludes these rows
    /// from either output unless `allow_duplicates` is set.
    pub async fn prepare_duplicates(&self, table: &str, key_columns: &[&str], side: char, process_id: i64) -> Result<String> {
        let keys = key_columns.join(", ");
        let select = format!("SELECT {keys}, COUNT(*) AS rapo_dup_count FROM {table} GROUP BY {keys} HAVING COUNT(*) > 1");
        self.fetch_into(&select, &format!("rapo_temp_dup_{side}_{process_id}")).await
    }

    /// REC not-found detection for `side`: combination rows whose
    /// counterpart key is absent, i.e. found only on the other side.
    pub async fn not_found(&self, comb_table: &str, missing_key_column: &str, side: char, process_id: i64) -> Result<String> {
        let select = format!("SELECT * FROM {comb_table} WHERE {missing_key_column} IS NULL");
        self.fetch_into(&select, &format!("rapo_temp_nf_{side}_{process_id}")).await
    }

    /// REC per-side reconsolidation (parallel A/B): split the combination
    /// table into that side's error table (discrepancies and, unless the
    /// other side's rows are ignored, not-found rows) and result table
    /// (everything else), excluding ambiguous duplicate-keyed rows unless
    /// `allow_duplicates`.
    #[allow(clippy::too_many_arguments)]
    pub async fn reconsolidate_side(
        &self,
        comb_table: &str,
        missing_key_column: Option<&str>,
        discrepancy_predicate: Option<&str>,
        dup_table: Option<&str>,
        dup_key_columns: &[&str],
        need_issues: bool,
        need_result: bool,
        allow_duplicates: bool,
        side: char,
        process_id: i64,
    ) -> Result<(Option<String>, Option<String>)> {
        let mut issue_terms = Vec::new();
        if let Some(pred) = discrepancy_predicate {
            issue_terms.push(format!("({pred})"));
        }
        if let Some(col) = missing_key_column {
            issue_terms.push(format!("{col} IS NULL"));
        }
        let issue_predicate = if issue_terms.is_empty() {
            "FALSE".to_string()
        } else {
            issue_terms.join(" OR ")
        };

        let ambiguous_filter = match dup_table {
            Some(dup) if !allow_duplicates && !dup_key_columns.is_empty() => {
                let join = dup_key_columns
                    .iter()
                    .map(|c| format!("{comb_table}.{c} = d.{c}"))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                format!(" AND NOT EXISTS (SELECT 1 FROM {dup} d WHERE {join})")
            }
            _ => String::new(),
        };

        let error_table = if need_issues {
            let select = format!("SELECT * FROM {comb_table} WHERE ({issue_predicate}){ambiguous_filter}");
            Some(self.fetch_into(&select, &format!("rapo_temp_err_{side}_{process_id}")).await?)
        } else {
            None
        };

        let result_table = if need_result {
            let select = format!("SELECT * FROM {comb_table} WHERE NOT ({issue_predicate}){ambiguous_filter}");
            Some(self.fetch_into(&select, &format!("rapo_temp_res_{side}_{process_id}")).await?)
        } else {
            None
        };

        Ok((error_table, result_table))
    }

    /// Copy rows from a result/error table into the control's output
    /// table, stamping each with `rapo_process_id`.
    pub async fn save(&self, source_table: &str, output_table: &str, process_id: i64) -> Result<u64> {
        let sql = format!(
            "INSERT INTO {output_table} \
             SELECT t.*, {process_id} AS rapo_process_id FROM {source_table} t"
        );
        Ok(self.gateway.execute(&sql).await?)
    }

    pub async fn delete_output_records(&self, output_table: &str, process_id: i64, with_deletion: bool) -> Result<()> {
        if with_deletion {
            self.gateway.truncate_table(output_table).await?;
        } else {
            let sql = format!("DELETE FROM {output_table} WHERE rapo_process_id = {process_id}");
            self.gateway.execute(&sql).await?;
        }
        Ok(())
    }

    /// Ensure the output table exists, creating it empty on first use with
    /// the same column shape as `shape_table` — the already-materialized
    /// error/result table about to be saved into it, not the raw source,
    /// since the saved rows carry `rapo_result_*`/joined columns the raw
    /// source doesn't have.
    pub async fn prepare_output_table(
        &self,
        output_table: &str,
        shape_table: &str,
        config: &ControlConfig,
        output_columns: Option<&[OutputColumn]>,
    ) -> Result<()> {
        self.gateway.check_identifier(output_table)?;
        if config.with_deletion() || config.with_drop() {
            if self.gateway.exists(output_table).await? {
                if config.with_deletion() {
                    self.gateway.truncate_table(output_table).await?;
                } else {
                    self.gateway.drop_table(output_table).await?;
                }
            }
        }
        if self.gateway.exists(output_table).await? {
            return Ok(());
        }

        let select_list = match output_columns {
            Some(columns) if !columns.is_empty() => columns
                .iter()
                .filter_map(|c| c.column.clone())
                .collect::<Vec<_>>()
                .join(", "),
            _ => "*".to_string(),
        };
        let select = format!(
            "SELECT {select_list}, NULL::bigint AS rapo_process_id \
             FROM {shape_table} WHERE 1 = 0"
        );
        let ctas = format!("CREATE TABLE {output_table} AS\n{select}");
        let index = format!(
            "CREATE INDEX {output_table}_rapo_process_id_ix ON {output_table}(rapo_process_id)"
        );
        tracing::debug!(table = %output_table, statement = %formatter::document([&ctas, &index]), "creating output table");
        self.gateway.execute(&ctas).await?;
        self.gateway.execute(&index).await?;
        Ok(())
    }

    pub async fn drop_temporary_tables(&self, names: &[String]) -> Result<()> {
        for name in names {
            self.gateway.purge_table(name).await?;
        }
        Ok(())
    }

    /// `SELECT rapo_prerun_control_hook(<process_id>)`; treats a NULL or
    /// `'OK'` result as success, anything else as a soft failure.
    pub async fn prerun_hook(&self, process_id: i64) -> Result<(bool, Option<String>)> {
        let sql = format!("SELECT rapo_prerun_control_hook({process_id})");
        let row: (Option<String>,) = sqlx::query_as(&sql).fetch_one(self.gateway.pool()).await?;
        let ok = row.0.as_deref().map(|v| v.eq_ignore_ascii_case("OK")).unwrap_or(true);
        Ok((ok, row.0))
    }

    pub async fn postrun_hook(&self, process_id: i64) -> Result<()> {
        let sql = format!("SELECT rapo_postrun_control_hook({process_id})");
        self.gateway.execute(&sql).await?;
        Ok(())
    }
}

fn projected_columns(table: &str, output_columns: Option<&[OutputColumn]>) -> String {
    match output_columns {
        Some(columns) if !columns.is_empty() => {
            let mut names: Vec<String> = columns
                .iter()
                .filter_map(|c| c.column.clone())
                .map(|c| format!("{table}.{c}"))
                .collect();
            for mandatory in crate::fields::mandatory_columns() {
                names.push(format!("{table}.{mandatory}"));
            }
            names.join(", ")
        }
        _ => format!("{table}.*"),
    }
}

fn joined_columns(table_a: &str, table_b: &str, output_columns: Option<&[OutputColumn]>) -> String {
    match output_columns {
        Some(columns) if !columns.is_empty() => columns
            .iter()
            .map(|c| {
                let expr = match (&c.column_a, &c.column_b) {
                    (Some(a), Some(b)) => format!("COALESCE({table_a}.{a}, {table_b}.{b})"),
                    (Some(a), None) => format!("{table_a}.{a}"),
                    (None, Some(b)) => format!("{table_b}.{b}"),
                    (None, None) => String::new(),
                };
                match &c.column {
                    Some(name) => format!("{expr} AS {name}"),
                    None => expr,
                }
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => format!("{table_a}.*, {table_b}.*"),
    }
}

fn join_condition(table_a: &str, table_b: &str, rule: &[parser::RuleColumns], sep: &str) -> String {
    rule.iter()
        .map(|r| format!("{table_a}.{} = {table_b}.{}", r.column_a, r.column_b))
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> OutputColumn {
        OutputColumn {
            column: Some(name.to_string()),
            column_a: None,
            column_b: None,
        }
    }

    #[test]
    fn projected_columns_falls_back_to_star_without_output_columns() {
        assert_eq!(projected_columns("t", None), "t.*");
        assert_eq!(projected_columns("t", Some(&[])), "t.*");
    }

    #[test]
    fn projected_columns_qualifies_each_column_and_appends_mandatory_ones() {
        let columns = vec![column("account_id"), column("amount")];
        let projected = projected_columns("fd", Some(&columns));
        assert!(projected.starts_with("fd.account_id, fd.amount"));
        for mandatory in crate::fields::mandatory_columns() {
            assert!(projected.contains(&format!("fd.{mandatory}")));
        }
    }

    #[test]
    fn joined_columns_falls_back_to_both_tables_star() {
        assert_eq!(joined_columns("a", "b", None), "a.*, b.*");
    }

    #[test]
    fn joined_columns_coalesces_paired_columns_with_alias() {
        let columns = vec![OutputColumn {
            column: Some("amount".to_string()),
            column_a: Some("amt_a".to_string()),
            column_b: Some("amt_b".to_string()),
        }];
        let joined = joined_columns("a", "b", Some(&columns));
        assert_eq!(joined, "COALESCE(a.amt_a, b.amt_b) AS amount");
    }

    #[test]
    fn joined_columns_handles_one_sided_column() {
        let columns = vec![OutputColumn {
            column: None,
            column_a: Some("id".to_string()),
            column_b: None,
        }];
        assert_eq!(joined_columns("a", "b", Some(&columns)), "a.id");
    }

    #[test]
    fn join_condition_ands_every_rule_pair() {
        let rule = vec![
            parser::RuleColumns {
                column_a: "id".to_string(),
                column_b: "id_ref".to_string(),
            },
            parser::RuleColumns {
                column_a: "region".to_string(),
                column_b: "region".to_string(),
            },
        ];
        assert_eq!(
            join_condition("a", "b", &rule, " AND "),
            "a.id = b.id_ref AND a.region = b.region"
        );
    }

    #[test]
    fn join_condition_is_empty_for_no_rules() {
        assert_eq!(join_condition("a", "b", &[], " AND "), "");
    }
}
