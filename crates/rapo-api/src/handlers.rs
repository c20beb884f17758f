//! HTTP handlers for the control-management surface (§6.2): one function
//! per `/api/*` route, all query-parameter driven per the literal endpoint
//! table rather than a path-parameter REST shape.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rapo_control::{lifecycle, log, ControlConfig};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize, sqlx::FromRow)]
pub struct ControlSummary {
    pub control_id: i64,
    pub control_name: String,
    pub control_group: Option<String>,
    pub control_type: String,
    pub control_subtype: Option<String>,
    pub status: String,
    pub schedule: Option<String>,
    pub updated_date: DateTime<Utc>,
}

/// `POST /api/run-control?name=&date=&date_from=&date_to=&debug_mode=`
#[derive(Deserialize)]
pub struct RunControlQuery {
    pub name: String,
    pub date: Option<DateTime<Utc>>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub debug_mode: bool,
}

#[derive(Serialize)]
pub struct LaunchResponse {
    pub process_id: i64,
}

pub async fn run_control(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunControlQuery>,
) -> Result<(StatusCode, Json<LaunchResponse>), ApiError> {
    let moment = query.date.unwrap_or_else(Utc::now);
    let process_id = match (query.date_from, query.date_to) {
        (Some(from), Some(to)) => {
            let config = ControlConfig::fetch(state.gateway.pool(), &query.name).await?;
            lifecycle::launch(state.gateway.clone(), config, from, to).await?
        }
        _ => lifecycle::launch_by_name(state.gateway.clone(), &query.name, moment).await?,
    };
    if query.debug_mode {
        tracing::debug!(control = %query.name, process_id, "run-control dispatched in debug mode");
    }
    Ok((StatusCode::ACCEPTED, Json(LaunchResponse { process_id })))
}

/// `POST /api/cancel-control?id=<process_id>` — only clears `status`; the
/// run's own supervisor observes the clear and finishes the cancellation
/// (§5).
#[derive(Deserialize)]
pub struct ProcessIdQuery {
    pub id: i64,
}

pub async fn cancel_control(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProcessIdQuery>,
) -> Result<StatusCode, ApiError> {
    log::request_cancel(state.gateway.pool(), query.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/revoke-control-run?id=<process_id>`
pub async fn revoke_control_run(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProcessIdQuery>,
) -> Result<StatusCode, ApiError> {
    let run = lifecycle::Run::load(&state.gateway, query.id).await?;
    lifecycle::revoke(&state.gateway, &run).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ControlNameQuery {
    pub name: String,
}

/// `DELETE /api/delete-control-output-tables?name=`
pub async fn delete_control_output_tables(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ControlNameQuery>,
) -> Result<StatusCode, ApiError> {
    let config = ControlConfig::fetch(state.gateway.pool(), &query.name).await?;
    for table in lifecycle::output_table_names(&config) {
        state.gateway.drop_table(&table).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/delete-control-temporary-tables?id=`
pub async fn delete_control_temporary_tables(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProcessIdQuery>,
) -> Result<StatusCode, ApiError> {
    let run = lifecycle::Run::load(&state.gateway, query.id).await?;
    let names = rapo_control::parser::temp_names(
        &run.config.control_type,
        run.config.control_subtype.as_deref(),
        run.process_id,
    );
    for name in names {
        state.gateway.purge_table(&name).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/get-running-controls` — log rows with status `P`.
pub async fn get_running_controls(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let rows: Vec<LogEntry> = sqlx::query_as(&format!("{LOG_ENTRY_SELECT} WHERE status = 'P' ORDER BY process_id DESC"))
        .fetch_all(state.gateway.pool())
        .await?;
    Ok(Json(rows))
}

/// `GET /api/get-all-controls` — controls ordered by `updated_date` desc.
pub async fn get_all_controls(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ControlSummary>>, ApiError> {
    let rows: Vec<ControlSummary> = sqlx::query_as(
        "SELECT control_id, control_name, control_group, control_type, control_subtype, \
                status, schedule, updated_date \
         FROM rapo_config ORDER BY updated_date DESC",
    )
    .fetch_all(state.gateway.pool())
    .await?;
    Ok(Json(rows))
}

#[derive(Deserialize, Serialize)]
pub struct ControlIdQuery {
    pub control_id: i64,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct ControlVersion {
    pub control_id: i64,
    pub control_name: String,
    pub control_type: String,
    pub status: String,
    pub audit_date: DateTime<Utc>,
}

/// `GET /api/get-control-versions?control_id=` — historical configs from
/// `rapo_config_bak`.
pub async fn get_control_versions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ControlIdQuery>,
) -> Result<Json<Vec<ControlVersion>>, ApiError> {
    let rows: Vec<ControlVersion> = sqlx::query_as(
        "SELECT control_id, control_name, control_type, status, audit_date \
         FROM rapo_config_bak WHERE control_id = $1 ORDER BY audit_date DESC",
    )
    .bind(query.control_id)
    .fetch_all(state.gateway.pool())
    .await?;
    Ok(Json(rows))
}

const LOG_ENTRY_SELECT: &str = "SELECT process_id, control_id, status, added, start_date, end_date, \
     date_from, date_to, fetched, fetched_a, fetched_b, success, errors, error_level, \
     text_message, text_error FROM rapo_log";

#[derive(sqlx::FromRow, Serialize)]
pub struct LogEntry {
    pub process_id: i64,
    pub control_id: i64,
    pub status: Option<String>,
    pub added: DateTime<Utc>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    pub fetched: Option<i64>,
    pub fetched_a: Option<i64>,
    pub fetched_b: Option<i64>,
    pub success: Option<i64>,
    pub errors: Option<i64>,
    pub error_level: Option<f64>,
    pub text_message: Option<String>,
    pub text_error: Option<String>,
}

/// `GET /api/get-control-runs` — recent runs (most recent 200) with a
/// derived status label (a `NULL` status, mid-run, reads as the
/// cancellation/deinitiation it actually is).
#[derive(Serialize)]
pub struct ControlRunSummary {
    #[serde(flatten)]
    pub log: LogEntry,
    pub status_label: String,
}

pub async fn get_control_runs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ControlRunSummary>>, ApiError> {
    let rows: Vec<LogEntry> = sqlx::query_as(&format!("{LOG_ENTRY_SELECT} ORDER BY process_id DESC LIMIT 200"))
        .fetch_all(state.gateway.pool())
        .await?;
    Ok(Json(
        rows.into_iter()
            .map(|log| ControlRunSummary {
                status_label: status_label(log.status.as_deref()),
                log,
            })
            .collect(),
    ))
}

fn status_label(status: Option<&str>) -> String {
    match status {
        None => "cancelling".to_string(),
        Some("I") => "initiated".to_string(),
        Some("S") => "started".to_string(),
        Some("P") => "in progress".to_string(),
        Some("F") => "finishing".to_string(),
        Some("D") => "done".to_string(),
        Some("E") => "error".to_string(),
        Some("C") => "cancelled".to_string(),
        Some("X") => "revoked".to_string(),
        Some(other) => other.to_string(),
    }
}

/// `GET /api/read-control-logs?control_name=&days=`
#[derive(Deserialize)]
pub struct ReadLogsQuery {
    pub control_name: Option<String>,
    pub days: Option<i32>,
}

pub async fn read_control_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReadLogsQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let days = query.days.unwrap_or(7);
    let rows: Vec<LogEntry> = match query.control_name {
        Some(name) => {
            let config = ControlConfig::fetch(state.gateway.pool(), &name).await?;
            sqlx::query_as(&format!(
                "{LOG_ENTRY_SELECT} WHERE control_id = $1 AND added >= now() - $2::int * interval '1 day' \
                 ORDER BY process_id DESC"
            ))
            .bind(config.control_id)
            .bind(days)
            .fetch_all(state.gateway.pool())
            .await?
        }
        None => {
            sqlx::query_as(&format!(
                "{LOG_ENTRY_SELECT} WHERE added >= now() - $1::int * interval '1 day' ORDER BY process_id DESC"
            ))
            .bind(days)
            .fetch_all(state.gateway.pool())
            .await?
        }
    };
    Ok(Json(rows))
}

#[derive(Serialize, sqlx::FromRow)]
pub struct Datasource {
    pub table_name: String,
}

/// `GET /api/get-datasources`
pub async fn get_datasources(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Datasource>>, ApiError> {
    let rows: Vec<Datasource> = sqlx::query_as(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'public' ORDER BY table_name",
    )
    .fetch_all(state.gateway.pool())
    .await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct DatasourceNameQuery {
    pub datasource_name: String,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct DatasourceColumn {
    pub column_name: String,
    pub data_type: String,
}

/// `GET /api/get-datasource-columns?datasource_name=`
pub async fn get_datasource_columns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DatasourceNameQuery>,
) -> Result<Json<Vec<DatasourceColumn>>, ApiError> {
    let rows: Vec<DatasourceColumn> = sqlx::query_as(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_name = $1 ORDER BY ordinal_position",
    )
    .bind(query.datasource_name.to_lowercase())
    .fetch_all(state.gateway.pool())
    .await?;
    Ok(Json(rows))
}

/// `GET /api/get-datasource-date-columns?datasource_name=` — the
/// date/timestamp-typed subset of [`get_datasource_columns`], so a UI can
/// offer them as candidates for a control's `source_date_field`.
pub async fn get_datasource_date_columns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DatasourceNameQuery>,
) -> Result<Json<Vec<DatasourceColumn>>, ApiError> {
    let rows: Vec<DatasourceColumn> = sqlx::query_as(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_name = $1 AND data_type IN ('date', 'timestamp without time zone', 'timestamp with time zone') \
         ORDER BY ordinal_position",
    )
    .bind(query.datasource_name.to_lowercase())
    .fetch_all(state.gateway.pool())
    .await?;
    Ok(Json(rows))
}

/// `POST /api/save-control` — upsert by presence of `control_id`. An
/// update first backs up the pre-update row into `rapo_config_bak` keyed
/// by `audit_date` (§3's ControlConfig invariant).
#[derive(Deserialize)]
pub struct SaveControlRequest {
    pub control_id: Option<i64>,
    pub control_name: String,
    pub control_group: Option<String>,
    pub control_type: String,
    pub control_subtype: Option<String>,
    #[serde(default = "default_engine")]
    pub control_engine: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub schedule: Option<String>,
    #[serde(default)]
    pub period_back: i32,
    #[serde(default = "default_period_number")]
    pub period_number: i32,
    #[serde(default = "default_period_type")]
    pub period_type: String,
    #[serde(default)]
    pub days_back: i32,
    #[serde(default)]
    pub days_retention: i32,
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
    pub source_key_field_a: Option<String>,
    pub source_key_field_b: Option<String>,
    pub parallelism: Option<i32>,
    #[serde(default = "default_no")]
    pub need_a: String,
    #[serde(default = "default_no")]
    pub need_b: String,
    #[serde(default = "default_no")]
    pub with_deletion: String,
    #[serde(default = "default_no")]
    pub with_drop: String,
    #[serde(default = "default_no")]
    pub need_hook: String,
    #[serde(default = "default_no")]
    pub need_prerun_hook: String,
    #[serde(default = "default_no")]
    pub need_postrun_hook: String,
    pub prerequisite_sql: Option<String>,
    pub preparation_sql: Option<String>,
    pub completion_sql: Option<String>,
    pub case_config: Option<String>,
    pub case_definition: Option<String>,
    pub result_config: Option<String>,
    pub error_config: Option<String>,
    pub rule_config: Option<String>,
    pub output_table: Option<String>,
    pub output_table_a: Option<String>,
    pub output_table_b: Option<String>,
    pub iteration_config: Option<String>,
}

fn default_engine() -> String {
    "DB".to_string()
}

fn default_status() -> String {
    "Y".to_string()
}

fn default_period_number() -> i32 {
    1
}

fn default_period_type() -> String {
    "D".to_string()
}

fn default_no() -> String {
    "N".to_string()
}

macro_rules! bind_control_fields {
    ($query:expr, $body:expr) => {
        $query
            .bind(&$body.control_name)
            .bind(&$body.control_group)
            .bind(&$body.control_type)
            .bind(&$body.control_subtype)
            .bind(&$body.control_engine)
            .bind(&$body.status)
            .bind(&$body.schedule)
            .bind($body.period_back)
            .bind($body.period_number)
            .bind(&$body.period_type)
            .bind($body.days_back)
            .bind($body.days_retention)
            .bind($body.timeout)
            .bind(&$body.source_name)
            .bind(&$body.source_filter)
            .bind(&$body.source_date_field)
            .bind(&$body.source_name_a)
            .bind(&$body.source_filter_a)
            .bind(&$body.source_date_field_a)
            .bind(&$body.source_name_b)
            .bind(&$body.source_filter_b)
            .bind(&$body.source_date_field_b)
            .bind(&$body.source_key_field_a)
            .bind(&$body.source_key_field_b)
            .bind($body.parallelism)
            .bind(&$body.need_a)
            .bind(&$body.need_b)
            .bind(&$body.with_deletion)
            .bind(&$body.with_drop)
            .bind(&$body.need_hook)
            .bind(&$body.need_prerun_hook)
            .bind(&$body.need_postrun_hook)
            .bind(&$body.prerequisite_sql)
            .bind(&$body.preparation_sql)
            .bind(&$body.completion_sql)
            .bind(&$body.case_config)
            .bind(&$body.case_definition)
            .bind(&$body.result_config)
            .bind(&$body.error_config)
            .bind(&$body.rule_config)
            .bind(&$body.output_table)
            .bind(&$body.output_table_a)
            .bind(&$body.output_table_b)
            .bind(&$body.iteration_config)
    };
}

const CONTROL_COLUMNS: &str = "control_name, control_group, control_type, control_subtype, \
    control_engine, status, schedule, period_back, period_number, period_type, days_back, \
    days_retention, timeout, source_name, source_filter, source_date_field, source_name_a, \
    source_filter_a, source_date_field_a, source_name_b, source_filter_b, source_date_field_b, \
    source_key_field_a, source_key_field_b, parallelism, need_a, need_b, with_deletion, \
    with_drop, need_hook, need_prerun_hook, need_postrun_hook, prerequisite_sql, \
    preparation_sql, completion_sql, case_config, case_definition, result_config, \
    error_config, rule_config, output_table, output_table_a, output_table_b, iteration_config";

pub async fn save_control(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SaveControlRequest>,
) -> Result<Json<ControlIdQuery>, ApiError> {
    let pool = state.gateway.pool();
    let control_id = match body.control_id {
        Some(control_id) => {
            sqlx::query(
                "INSERT INTO rapo_config_bak SELECT *, now() AS audit_date FROM rapo_config \
                 WHERE control_id = $1",
            )
            .bind(control_id)
            .execute(pool)
            .await?;

            let sql = format!(
                "UPDATE rapo_config SET control_name = $1, control_group = $2, control_type = $3, \
                 control_subtype = $4, control_engine = $5, status = $6, schedule = $7, \
                 period_back = $8, period_number = $9, period_type = $10, days_back = $11, \
                 days_retention = $12, timeout = $13, source_name = $14, source_filter = $15, \
                 source_date_field = $16, source_name_a = $17, source_filter_a = $18, \
                 source_date_field_a = $19, source_name_b = $20, source_filter_b = $21, \
                 source_date_field_b = $22, source_key_field_a = $23, source_key_field_b = $24, \
                 parallelism = $25, need_a = $26, need_b = $27, with_deletion = $28, \
                 with_drop = $29, need_hook = $30, need_prerun_hook = $31, need_postrun_hook = $32, \
                 prerequisite_sql = $33, preparation_sql = $34, completion_sql = $35, \
                 case_config = $36, case_definition = $37, result_config = $38, error_config = $39, \
                 rule_config = $40, output_table = $41, output_table_a = $42, output_table_b = $43, \
                 iteration_config = $44, updated_date = now() \
                 WHERE control_id = $45"
            );
            bind_control_fields!(sqlx::query(&sql), body)
                .bind(control_id)
                .execute(pool)
                .await?;
            control_id
        }
        None => {
            let sql = format!(
                "INSERT INTO rapo_config ({CONTROL_COLUMNS}, created_date, updated_date) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                 $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, \
                 $33, $34, $35, $36, $37, $38, $39, $40, $41, $42, $43, $44, now(), now()) \
                 RETURNING control_id"
            );
            let row: (i64,) = bind_control_fields!(sqlx::query_as(&sql), body)
                .fetch_one(pool)
                .await?;
            row.0
        }
    };
    Ok(Json(ControlIdQuery { control_id }))
}

/// `DELETE /api/delete-control?control_id=`
pub async fn delete_control(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ControlIdQuery>,
) -> Result<StatusCode, ApiError> {
    sqlx::query("DELETE FROM rapo_config WHERE control_id = $1")
        .bind(query.control_id)
        .execute(state.gateway.pool())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ProcessIdParam {
    pub process_id: i64,
}

/// `GET /api/get-control-run?process_id=`
pub async fn get_control_run(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProcessIdParam>,
) -> Result<Json<LogEntry>, ApiError> {
    let row: Option<LogEntry> = sqlx::query_as(&format!("{LOG_ENTRY_SELECT} WHERE process_id = $1"))
        .bind(query.process_id)
        .fetch_optional(state.gateway.pool())
        .await?;
    row.map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no run with process id {}", query.process_id)))
}
