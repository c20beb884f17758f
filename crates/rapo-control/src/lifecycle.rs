//! Control lifecycle (§4.3): the I -> S -> P -> F -> D/E/C/X state machine
//! that drives one control run from initiation through completion.

use chrono::{DateTime, Utc};
use rapo_db::Gateway;
use serde::Deserialize;

use crate::config::ControlConfig;
use crate::dates::{self, PeriodType};
use crate::error::Result;
use crate::executor::Executor;
use crate::log;
use crate::parser;

pub struct Run {
    pub process_id: i64,
    pub config: ControlConfig,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LogDates {
    control_id: i64,
    date_from: DateTime<Utc>,
    date_to: DateTime<Utc>,
}

impl Run {
    /// Reload a run's `Run` context from its `rapo_log` row, for
    /// operator-triggered actions (cancel, revoke) against an already
    /// initiated process ID.
    pub async fn load(gateway: &Gateway, process_id: i64) -> Result<Self> {
        let row: LogDates = sqlx::query_as(
            "SELECT control_id, date_from, date_to FROM rapo_log WHERE process_id = $1",
        )
        .bind(process_id)
        .fetch_one(gateway.pool())
        .await?;
        let config: ControlConfig = sqlx::query_as("SELECT * FROM rapo_config WHERE control_id = $1")
            .bind(row.control_id)
            .fetch_one(gateway.pool())
            .await?;
        Ok(Run {
            process_id,
            config,
            date_from: row.date_from,
            date_to: row.date_to,
        })
    }
}

/// Load configuration for `name`, compute its date window for `moment`,
/// and drive it through the full lifecycle. Failures during the working
/// phases are caught and recorded on the run's own `rapo_log` row rather
/// than propagated — only failures that happen before a row exists (no
/// config, cannot log) surface to the caller.
pub async fn run_by_name(gateway: &Gateway, name: &str, moment: DateTime<Utc>) -> Result<()> {
    let config = ControlConfig::fetch(gateway.pool(), name).await?;
    let period_type = PeriodType::parse(&config.period_type).unwrap_or(PeriodType::Day);
    let (date_from, date_to) = dates::parse_dates(
        moment,
        config.days_back,
        config.period_back,
        config.period_number,
        period_type,
    );
    run(gateway, config.clone(), date_from, date_to).await?;
    run_iterations(gateway, &config, moment).await
}

#[derive(Debug, Clone, Deserialize)]
struct IterationEntry {
    period_back: i32,
    period_number: i32,
    period_type: String,
    #[serde(default = "default_iteration_enabled")]
    enabled: bool,
}

fn default_iteration_enabled() -> bool {
    true
}

/// `iterate()` (§9 supplement #1): after a control's main run, drive one
/// additional run per enabled `iteration_config` entry, each with its own
/// period window overriding the parent's `period_back`/`period_number`/
/// `period_type`. Iteration runs don't themselves iterate further.
pub async fn run_iterations(gateway: &Gateway, config: &ControlConfig, moment: DateTime<Utc>) -> Result<()> {
    let Some(raw) = config.iteration_config.as_deref().filter(|s| !s.trim().is_empty()) else {
        return Ok(());
    };
    let entries: Vec<IterationEntry> = serde_json::from_str(raw).unwrap_or_default();
    for entry in entries.into_iter().filter(|e| e.enabled) {
        let period_type = PeriodType::parse(&entry.period_type).unwrap_or(PeriodType::Day);
        let (date_from, date_to) = dates::parse_dates(
            moment,
            config.days_back,
            entry.period_back,
            entry.period_number,
            period_type,
        );
        run(gateway, config.clone(), date_from, date_to).await?;
    }
    Ok(())
}

/// Launch a control by name: initiate its `rapo_log` row synchronously and
/// hand the rest of the lifecycle to a background task, returning the new
/// process ID so a caller (the scheduler, the API) can track it without
/// blocking on the full run.
pub async fn launch_by_name(gateway: Gateway, name: &str, moment: DateTime<Utc>) -> Result<i64> {
    let config = ControlConfig::fetch(gateway.pool(), name).await?;
    let period_type = PeriodType::parse(&config.period_type).unwrap_or(PeriodType::Day);
    let (date_from, date_to) = dates::parse_dates(
        moment,
        config.days_back,
        config.period_back,
        config.period_number,
        period_type,
    );
    launch(gateway, config, date_from, date_to).await
}

/// Launch an already-resolved config over an explicit date window (the
/// HTTP dispatcher's `run-control?date_from=&date_to=` path) the same way
/// [`launch_by_name`] does: initiate synchronously, run the rest in the
/// background under a supervisor that enforces `timeout` and the
/// external-cancel protocol (§4.7, §5).
pub async fn launch(gateway: Gateway, config: ControlConfig, date_from: DateTime<Utc>, date_to: DateTime<Utc>) -> Result<i64> {
    let process_id = log::insert(gateway.pool(), config.control_id, date_from, date_to).await?;
    tracing::info!(control = %config.control_name, process_id, "control initiated");
    checkpoint(&gateway, config.control_id, process_id).await;
    let timeout = config.timeout;
    let supervised_gateway = gateway.clone();
    let worker = tokio::spawn(async move {
        let run = Run {
            process_id,
            config,
            date_from,
            date_to,
        };
        if let Err(err) = resume(&gateway, &run).await {
            tracing::error!(control = %run.config.control_name, process_id, error = %err, "control failed");
            escape(&gateway, &run, &err.to_string()).await;
            return;
        }
        if let Err(err) = run_iterations(&gateway, &run.config, run.date_to).await {
            tracing::error!(control = %run.config.control_name, process_id, error = %err, "iteration run failed");
        }
    });
    tokio::spawn(crate::supervisor::supervise(supervised_gateway, process_id, timeout, worker));
    Ok(process_id)
}

pub async fn run(gateway: &Gateway, config: ControlConfig, date_from: DateTime<Utc>, date_to: DateTime<Utc>) -> Result<()> {
    let process_id = log::insert(gateway.pool(), config.control_id, date_from, date_to).await?;
    tracing::info!(control = %config.control_name, process_id, "control initiated");
    checkpoint(gateway, config.control_id, process_id).await;

    let run = Run {
        process_id,
        config,
        date_from,
        date_to,
    };

    if let Err(err) = resume(gateway, &run).await {
        tracing::error!(control = %run.config.control_name, process_id, error = %err, "control failed");
        escape(gateway, &run, &err.to_string()).await;
    }
    Ok(())
}

async fn resume(gateway: &Gateway, run: &Run) -> Result<()> {
    if !prepare(gateway, run).await? {
        log::set_text_message(
            gateway.pool(),
            run.process_id,
            "Control execution stopped because the PREPARATION failed",
        )
        .await?;
        return Ok(());
    }

    if !prerequisite(gateway, run).await? {
        log::set_text_message(
            gateway.pool(),
            run.process_id,
            "Control execution stopped because the PREREQUISITE check not passed",
        )
        .await?;
        return Ok(());
    }

    if !prerun_hook(gateway, run).await? {
        return Ok(());
    }

    start(gateway, run).await?;
    progress(gateway, run).await?;
    finish(gateway, run).await?;
    complete(gateway, run).await?;
    done(gateway, run).await?;
    postrun_hook(gateway, run).await?;
    Ok(())
}

async fn prepare(gateway: &Gateway, run: &Run) -> Result<bool> {
    let variables = parser::variables_for(&run.config, run.process_id, run.date_from, run.date_to);
    let Some(statement) = parser::statement(run.config.preparation_sql.as_deref(), &variables) else {
        return Ok(true);
    };
    tracing::info!(control = %run.config.control_name, "running preparation statement");
    gateway.execute(&statement).await?;
    Ok(true)
}

async fn prerequisite(gateway: &Gateway, run: &Run) -> Result<bool> {
    let variables = parser::variables_for(&run.config, run.process_id, run.date_from, run.date_to);
    let Some(statement) = parser::statement(run.config.prerequisite_sql.as_deref(), &variables) else {
        return Ok(true);
    };
    tracing::info!(control = %run.config.control_name, "checking prerequisite statement");
    let row: (Option<String>,) = sqlx::query_as(&format!("SELECT ({statement})::text"))
        .fetch_one(gateway.pool())
        .await?;
    log::set_prerequisite_value(gateway.pool(), run.process_id, row.0.as_deref()).await?;
    let passed = matches!(row.0.as_deref(), Some(v) if v != "f" && v != "false" && !v.is_empty());
    Ok(passed)
}

async fn prerun_hook(gateway: &Gateway, run: &Run) -> Result<bool> {
    if !(run.config.need_hook() && run.config.need_prerun_hook()) {
        return Ok(true);
    }
    let executor = Executor::new(gateway);
    let (ok, code) = executor.prerun_hook(run.process_id).await?;
    if !ok {
        log::set_text_message(
            gateway.pool(),
            run.process_id,
            &format!(
                "Control execution stopped because PRERUN HOOK function evaluated as NOT OK [{}]",
                code.unwrap_or_default()
            ),
        )
        .await?;
    }
    Ok(ok)
}

async fn start(gateway: &Gateway, run: &Run) -> Result<()> {
    let start_date = Utc::now();
    log::set_status_and_start(gateway.pool(), run.process_id, "S", start_date).await?;
    tracing::info!(control = %run.config.control_name, process_id = run.process_id, "control started");
    Ok(())
}

struct FetchOutcome {
    input_table: Option<String>,
    input_table_a: Option<String>,
    input_table_b: Option<String>,
    fetched: i64,
    fetched_a: i64,
    fetched_b: i64,
}

async fn progress(gateway: &Gateway, run: &Run) -> Result<()> {
    log::set_status(gateway.pool(), run.process_id, "P").await?;

    let fetched = fetch(gateway, run).await?;
    let outcome = execute(gateway, run, &fetched).await?;
    save(gateway, run, &outcome).await?;
    Ok(())
}

async fn fetch(gateway: &Gateway, run: &Run) -> Result<FetchOutcome> {
    let executor = Executor::new(gateway);
    let variables = parser::variables_for(&run.config, run.process_id, run.date_from, run.date_to);

    if run.config.is_comparison() || run.config.is_reconciliation() {
        let source_a = parser::source_name(run.config.source_name_a.as_deref(), &variables);
        let source_b = parser::source_name(run.config.source_name_b.as_deref(), &variables);

        let (table_a, table_b) = futures::try_join!(
            fetch_side(gateway, run, source_a.as_deref(), run.config.source_filter_a.as_deref(), run.config.source_date_field_a.as_deref(), true),
            fetch_side(gateway, run, source_b.as_deref(), run.config.source_filter_b.as_deref(), run.config.source_date_field_b.as_deref(), false),
        )?;

        let fetched_a = executor.count(&table_a).await?;
        let fetched_b = executor.count(&table_b).await?;
        log::set_fetched_sides(gateway.pool(), run.process_id, fetched_a, fetched_b).await?;
        tracing::info!(process_id = run.process_id, fetched_a, fetched_b, "records fetched");

        return Ok(FetchOutcome {
            input_table: None,
            input_table_a: Some(table_a),
            input_table_b: Some(table_b),
            fetched: 0,
            fetched_a,
            fetched_b,
        });
    }

    let source = parser::source_name(run.config.source_name.as_deref(), &variables);
    let case_config = run
        .config
        .case_config
        .as_deref()
        .and_then(|raw| crate::case::parse(raw).ok())
        .unwrap_or_default();
    let result_columns = crate::case::result_columns(run.config.case_definition.as_deref(), &case_config);
    let select = parser::select_source(
        source.as_deref().unwrap_or_default(),
        "*",
        run.config.source_filter.as_deref(),
        run.config.source_date_field.as_deref(),
        Some(run.date_from),
        Some(run.date_to),
        Some(&result_columns),
    );
    let table = executor.fetch_records(&select, run.process_id).await?;
    let fetched = executor.count(&table).await?;
    log::set_fetched(gateway.pool(), run.process_id, fetched).await?;
    tracing::info!(process_id = run.process_id, fetched, "records fetched");

    Ok(FetchOutcome {
        input_table: Some(table),
        input_table_a: None,
        input_table_b: None,
        fetched,
        fetched_a: 0,
        fetched_b: 0,
    })
}

async fn fetch_side(
    gateway: &Gateway,
    run: &Run,
    source: Option<&str>,
    filter: Option<&str>,
    date_field: Option<&str>,
    is_a: bool,
) -> Result<String> {
    let executor = Executor::new(gateway);
    let select = parser::select_source(
        source.unwrap_or_default(),
        "*",
        filter,
        date_field,
        Some(run.date_from),
        Some(run.date_to),
        None,
    );
    if is_a {
        executor.fetch_records_a(&select, run.process_id).await
    } else {
        executor.fetch_records_b(&select, run.process_id).await
    }
}

struct ExecuteOutcome {
    error_table: Option<String>,
    result_table: Option<String>,
    error_table_a: Option<String>,
    error_table_b: Option<String>,
    success: i64,
    errors: i64,
    error_level: f64,
}

impl ExecuteOutcome {
    fn empty() -> Self {
        ExecuteOutcome {
            error_table: None,
            result_table: None,
            error_table_a: None,
            error_table_b: None,
            success: 0,
            errors: 0,
            error_level: 0.0,
        }
    }
}

async fn execute(gateway: &Gateway, run: &Run, fetched: &FetchOutcome) -> Result<ExecuteOutcome> {
    let executor = Executor::new(gateway);
    let output_columns = parser::parse_output_columns(run.config.output_table.as_deref());

    if run.config.is_analysis() || run.config.is_report() {
        if fetched.fetched <= 0 {
            return Ok(ExecuteOutcome::empty());
        }
        let input_table = fetched.input_table.as_deref().unwrap_or_default();
        let error_sql = parser::analyze_error_sql(
            run.config.error_config.as_deref(),
            run.config.case_config.is_some(),
        )?;
        let error_table = executor
            .analyze(input_table, output_columns.as_deref(), &error_sql, run.process_id)
            .await?;
        let errors = executor.count(&error_table).await?;
        let success = fetched.fetched - errors;
        let error_level = if fetched.fetched > 0 {
            (errors as f64 / fetched.fetched as f64) * 100.0
        } else {
            0.0
        };
        if run.config.is_analysis() {
            log::set_result_counts(gateway.pool(), run.process_id, success, errors, error_level).await?;
        }
        return Ok(ExecuteOutcome {
            error_table: Some(error_table),
            success,
            errors,
            error_level,
            ..ExecuteOutcome::empty()
        });
    }

    if run.config.is_comparison() {
        let table_a = fetched.input_table_a.as_deref().unwrap_or_default();
        let table_b = fetched.input_table_b.as_deref().unwrap_or_default();
        let rule = parser::parse_rule_config(run.config.rule_config.as_deref())?;
        let error = parser::parse_rule_config(run.config.error_config.as_deref())?;

        let (result_table, error_table) = futures::try_join!(
            executor.match_rows(table_a, table_b, output_columns.as_deref(), &rule, &error, run.process_id),
            executor.mismatch_rows(table_a, table_b, output_columns.as_deref(), &rule, &error, run.process_id),
        )?;

        let success = executor.count(&result_table).await?;
        let errors = executor.count(&error_table).await?;
        let error_level = if success + errors > 0 {
            (errors as f64 / (success + errors) as f64) * 100.0
        } else {
            0.0
        };
        log::set_result_counts(gateway.pool(), run.process_id, success, errors, error_level).await?;

        return Ok(ExecuteOutcome {
            error_table: Some(error_table),
            result_table: Some(result_table),
            success,
            errors,
            error_level,
            ..ExecuteOutcome::empty()
        });
    }

    if run.config.is_reconciliation() {
        return reconcile(gateway, run, fetched, &executor).await;
    }

    Ok(ExecuteOutcome::empty())
}

/// The real `REC` algorithm (§4.4): combination, duplicate-detection,
/// not-found detection, then per-side reconsolidation, run in the stage
/// order the component description lays out (combination sequential;
/// duplicate-prepare and reconsolidation each parallel across sides).
async fn reconcile(gateway: &Gateway, run: &Run, fetched: &FetchOutcome, executor: &Executor<'_>) -> Result<ExecuteOutcome> {
    let table_a = fetched.input_table_a.as_deref().unwrap_or_default();
    let table_b = fetched.input_table_b.as_deref().unwrap_or_default();
    let rule = parser::parse_reconciliation_rule(run.config.rule_config.as_deref(), run.config.source_key_field_a.as_deref(), run.config.source_key_field_b.as_deref())?;

    let comb_table = executor.combine(table_a, table_b, &rule, run.process_id).await?;

    let key_columns_a = rule.key_columns_a();
    let key_columns_b = rule.key_columns_b();
    let (dup_a, dup_b) = futures::try_join!(
        executor.prepare_duplicates(table_a, &key_columns_a, 'a', run.process_id),
        executor.prepare_duplicates(table_b, &key_columns_b, 'b', run.process_id),
    )?;

    let missing_in_b = key_columns_b.first().map(|c| format!("{comb_table}.{c}"));
    let missing_in_a = key_columns_a.first().map(|c| format!("{comb_table}.{c}"));
    let discrepancy = rule.discrepancy_predicate(&comb_table, &comb_table);

    let ((error_a, result_a), (error_b, result_b)) = futures::try_join!(
        executor.reconsolidate_side(
            &comb_table,
            missing_in_b.as_deref(),
            discrepancy.as_deref(),
            Some(&dup_a),
            &key_columns_a,
            rule.need_issues_a,
            rule.need_recons_a,
            rule.allow_duplicates,
            'a',
            run.process_id,
        ),
        executor.reconsolidate_side(
            &comb_table,
            missing_in_a.as_deref(),
            discrepancy.as_deref(),
            Some(&dup_b),
            &key_columns_b,
            rule.need_issues_b,
            rule.need_recons_b,
            rule.allow_duplicates,
            'b',
            run.process_id,
        ),
    )?;

    let errors_a = match &error_a {
        Some(t) => executor.count(t).await?,
        None => 0,
    };
    let errors_b = match &error_b {
        Some(t) => executor.count(t).await?,
        None => 0,
    };
    let success_a = match &result_a {
        Some(t) => executor.count(t).await?,
        None => 0,
    };
    let success_b = match &result_b {
        Some(t) => executor.count(t).await?,
        None => 0,
    };
    let fetched_total = fetched.fetched_a + fetched.fetched_b;
    let errors = errors_a + errors_b;
    let success = success_a + success_b;
    let error_level = if fetched_total > 0 {
        (errors as f64 / fetched_total as f64) * 100.0
    } else {
        0.0
    };
    log::set_result_counts(gateway.pool(), run.process_id, success, errors, error_level).await?;

    Ok(ExecuteOutcome {
        error_table_a: error_a,
        error_table_b: error_b,
        success,
        errors,
        error_level,
        ..ExecuteOutcome::empty()
    })
}

async fn save(gateway: &Gateway, run: &Run, outcome: &ExecuteOutcome) -> Result<()> {
    let executor = Executor::new(gateway);
    let output_columns = parser::parse_output_columns(run.config.output_table.as_deref());

    if run.config.is_reconciliation() {
        if outcome.errors == 0 {
            return Ok(());
        }
        let outputs = output_table_names(&run.config);
        if let (Some(output_a), Some(error_a)) = (outputs.first(), outcome.error_table_a.as_deref()) {
            executor.prepare_output_table(output_a, error_a, &run.config, output_columns.as_deref()).await?;
            executor.save(error_a, output_a, run.process_id).await?;
        }
        if let (Some(output_b), Some(error_b)) = (outputs.get(1), outcome.error_table_b.as_deref()) {
            executor.prepare_output_table(output_b, error_b, &run.config, output_columns.as_deref()).await?;
            executor.save(error_b, output_b, run.process_id).await?;
        }
        return Ok(());
    }

    let should_save = match run.config.control_type.as_str() {
        "ANL" | "REP" | "CMP" => outcome.errors > 0,
        _ => false,
    };
    if !should_save {
        return Ok(());
    }
    let Some(error_table) = outcome.error_table.as_deref() else {
        return Ok(());
    };
    let output_table = parser::output_table_name(&run.config.control_name);
    executor.prepare_output_table(&output_table, error_table, &run.config, output_columns.as_deref()).await?;
    executor.save(error_table, &output_table, run.process_id).await?;
    Ok(())
}

/// Record a checkpoint for `control_id` against `process_id` (§3, §5): best
/// effort, since a failure to checkpoint shouldn't fail the run itself —
/// it only weakens crash detection on the next startup sweep.
async fn checkpoint(gateway: &Gateway, control_id: i64, process_id: i64) {
    if let Err(err) = rapo_db::cleanup::record(
        gateway.pool(),
        rapo_db::cleanup::CHECKPOINT_TABLE,
        control_id,
        process_id,
        Utc::now(),
    )
    .await
    {
        tracing::warn!(control_id, process_id, error = %err, "failed to record checkpoint");
    }
}

async fn clear_checkpoint(gateway: &Gateway, control_id: i64) {
    if let Err(err) =
        rapo_db::cleanup::clear(gateway.pool(), rapo_db::cleanup::CHECKPOINT_TABLE, control_id).await
    {
        tracing::warn!(control_id, error = %err, "failed to clear checkpoint");
    }
}

async fn finish(gateway: &Gateway, run: &Run) -> Result<()> {
    log::set_status(gateway.pool(), run.process_id, "F").await?;
    let names = parser::temp_names(&run.config.control_type, run.config.control_subtype.as_deref(), run.process_id);
    Executor::new(gateway).drop_temporary_tables(&names).await?;
    tracing::info!(process_id = run.process_id, "control finished");
    Ok(())
}

async fn complete(gateway: &Gateway, run: &Run) -> Result<()> {
    let variables = parser::variables_for(&run.config, run.process_id, run.date_from, run.date_to);
    if let Some(statement) = parser::statement(run.config.completion_sql.as_deref(), &variables) {
        gateway.execute(&statement).await?;
    }
    Ok(())
}

async fn done(gateway: &Gateway, run: &Run) -> Result<()> {
    log::set_status_and_end(gateway.pool(), run.process_id, "D", Utc::now()).await?;
    clear_checkpoint(gateway, run.config.control_id).await;
    tracing::info!(process_id = run.process_id, "control ended");
    Ok(())
}

async fn postrun_hook(gateway: &Gateway, run: &Run) -> Result<()> {
    if run.config.need_hook() && run.config.need_postrun_hook() {
        Executor::new(gateway).postrun_hook(run.process_id).await?;
    }
    Ok(())
}

async fn escape(gateway: &Gateway, run: &Run, error_text: &str) {
    if let Err(err) = log::set_text_error(gateway.pool(), run.process_id, error_text).await {
        tracing::error!(process_id = run.process_id, error = %err, "failed to record error text");
    }
    if let Err(err) = log::set_status_and_end(gateway.pool(), run.process_id, "E", Utc::now()).await {
        tracing::error!(process_id = run.process_id, error = %err, "failed to mark control errored");
    }
    clear_checkpoint(gateway, run.config.control_id).await;
}

/// Cancel an in-progress run: mark it cancelled and unwind any partial
/// output it may have written.
pub async fn cancel(gateway: &Gateway, run: &Run) -> Result<()> {
    match log::current_status(gateway.pool(), run.process_id).await? {
        None => return Ok(()),
        Some(Some(status)) if !log::is_working(&status) => return Ok(()),
        _ => {}
    }
    log::set_status_and_end(gateway.pool(), run.process_id, "C", Utc::now()).await?;
    let names = parser::temp_names(&run.config.control_type, run.config.control_subtype.as_deref(), run.process_id);
    let executor = Executor::new(gateway);
    executor.drop_temporary_tables(&names).await?;
    if parser::has_output(&run.config.control_type, run.config.control_subtype.as_deref()) {
        for output_table in output_table_names(&run.config) {
            executor
                .delete_output_records(&output_table, run.process_id, run.config.with_deletion())
                .await?;
        }
    }
    clear_checkpoint(gateway, run.config.control_id).await;
    Ok(())
}

/// Revoke a completed run's results (an operator-triggered rollback).
pub async fn revoke(gateway: &Gateway, run: &Run) -> Result<()> {
    log::set_status_and_end(gateway.pool(), run.process_id, "X", Utc::now()).await?;
    if parser::has_output(&run.config.control_type, run.config.control_subtype.as_deref()) {
        let executor = Executor::new(gateway);
        for output_table in output_table_names(&run.config) {
            executor
                .delete_output_records(&output_table, run.process_id, run.config.with_deletion())
                .await?;
        }
    }
    clear_checkpoint(gateway, run.config.control_id).await;
    Ok(())
}

/// The output table(s) a control's results land in: single-named for
/// `ANL`/`REP`/`CMP`, or `_a`/`_b`-suffixed for `REC`'s two-sided results.
pub fn output_table_names(config: &ControlConfig) -> Vec<String> {
    if config.is_reconciliation() {
        let base = parser::output_table_name(&config.control_name);
        vec![format!("{base}_a"), format!("{base}_b")]
    } else {
        vec![parser::output_table_name(&config.control_name)]
    }
}

/// Clean up retained output beyond `days_retention` (or truncate entirely
/// when retention is zero). Covers both `_a`/`_b` output tables for `REC`.
pub async fn clean(gateway: &Gateway, config: &ControlConfig) -> Result<()> {
    if !parser::has_output(&config.control_type, config.control_subtype.as_deref()) {
        return Ok(());
    }
    let mut existing = Vec::new();
    for output_table in output_table_names(config) {
        if gateway.exists(&output_table).await? {
            existing.push(output_table);
        }
    }
    if existing.is_empty() {
        return Ok(());
    }
    if config.days_retention == 0 {
        for output_table in &existing {
            gateway.truncate_table(output_table).await?;
        }
        return Ok(());
    }
    let outdated = parser::outdated_results(
        gateway.pool(),
        config.control_id,
        config.days_retention,
        &existing,
    )
    .await?;
    for (table, process_ids) in outdated {
        for process_id in process_ids {
            let sql = format!("DELETE FROM {table} WHERE rapo_process_id = {process_id}");
            gateway.execute(&sql).await?;
        }
    }
    Ok(())
}

/// Run [`clean`] against every configured control, the way the scheduler's
/// maintenance task sweeps retention on its own cadence (§4.7).
pub async fn clean_all(gateway: &Gateway) -> Result<()> {
    let configs: Vec<ControlConfig> = sqlx::query_as("SELECT * FROM rapo_config")
        .fetch_all(gateway.pool())
        .await?;
    for config in &configs {
        if let Err(err) = clean(gateway, config).await {
            tracing::error!(control = %config.control_name, error = %err, "maintenance cleanup failed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config(control_type: &str) -> ControlConfig {
        ControlConfig {
            control_id: 1,
            control_name: "Daily_Revenue".to_string(),
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
            created_date: Utc::now(),
            updated_date: Utc::now(),
        }
    }

    #[test]
    fn output_table_names_is_single_for_non_reconciliation_controls() {
        for control_type in ["ANL", "REP", "CMP"] {
            let config = sample_config(control_type);
            assert_eq!(output_table_names(&config), vec!["rapo_rest_daily_revenue".to_string()]);
        }
    }

    #[test]
    fn output_table_names_is_two_sided_for_reconciliation() {
        let config = sample_config("REC");
        assert_eq!(
            output_table_names(&config),
            vec![
                "rapo_rest_daily_revenue_a".to_string(),
                "rapo_rest_daily_revenue_b".to_string(),
            ]
        );
    }
}
