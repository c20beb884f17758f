//! The Database Gateway (§4.2): owns the connection pool and the
//! statement-execution surface the rest of the engine builds on.

use futures::future::join_all;
use sqlx::PgPool;

use crate::error::{GatewayError, Result};
use crate::pool::{self, PoolConfig};
use crate::{formatter, reflection};

/// A named group of statements to run in one worker strand of a
/// `parallelize` call. Mirrors `automations::server`'s pattern of handing
/// each concurrent strand its own connection, never sharing one across
/// strands.
pub struct StatementGroup {
    pub name: String,
    pub statements: Vec<String>,
}

/// Outcome of a single `StatementGroup`, delivered back to the caller once
/// every group has joined.
pub struct GroupOutcome {
    pub name: String,
    pub result: Result<Vec<RowsAffected>>,
}

pub type RowsAffected = u64;

#[derive(Clone)]
pub struct Gateway {
    pool: PgPool,
    max_identifier_length: usize,
}

impl Gateway {
    pub async fn connect(config: &PoolConfig) -> Result<Self> {
        let pool = pool::connect(config).await?;
        Ok(Self {
            pool,
            max_identifier_length: config.max_identifier_length,
        })
    }

    pub fn from_pool(pool: PgPool, max_identifier_length: usize) -> Self {
        Self {
            pool,
            max_identifier_length,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Validate an identifier this engine is about to emit into SQL, per
    /// the `max_identifier_length` pool setting.
    pub fn check_identifier(&self, identifier: &str) -> Result<()> {
        if identifier.len() > self.max_identifier_length {
            return Err(GatewayError::IdentifierTooLong {
                identifier: identifier.to_string(),
                max: self.max_identifier_length,
            });
        }
        Ok(())
    }

    /// Execute a single statement, returning the number of affected rows.
    #[tracing::instrument(skip(self), fields(sql = %log_excerpt(sql)))]
    pub async fn execute(&self, sql: &str) -> Result<RowsAffected> {
        tracing::debug!(statement = %formatter::format(sql), "executing statement");
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|source| GatewayError::Execute {
                statement: sql.to_string(),
                source,
            })?;
        Ok(result.rows_affected())
    }

    /// Execute several statements in sequence, on the same connection,
    /// short-circuiting on the first error.
    pub async fn execute_many<I, S>(&self, statements: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut conn = self.pool.acquire().await.map_err(GatewayError::Connect)?;
        for sql in statements {
            let sql = sql.as_ref();
            tracing::debug!(statement = %formatter::format(sql), "executing statement (sequential)");
            sqlx::query(sql)
                .execute(&mut *conn)
                .await
                .map_err(|source| GatewayError::Execute {
                    statement: sql.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Run each `StatementGroup`'s statements sequentially within its own
    /// spawned strand; strands run concurrently and never share a
    /// connection. Every strand's outcome is collected and returned once
    /// all strands have joined, regardless of individual failure — the
    /// caller (the control lifecycle) decides how to propagate errors
    /// across peer strands (§5 ordering guarantees).
    pub async fn parallelize(&self, groups: Vec<StatementGroup>) -> Vec<GroupOutcome> {
        let tasks = groups.into_iter().map(|group| {
            let gateway = self.clone();
            tokio::spawn(async move {
                let name = group.name.clone();
                let mut rows = Vec::with_capacity(group.statements.len());
                let mut outcome = Ok(Vec::new());
                for sql in &group.statements {
                    match gateway.execute(sql).await {
                        Ok(affected) => rows.push(affected),
                        Err(err) => {
                            outcome = Err(err);
                            break;
                        }
                    }
                }
                if outcome.is_ok() {
                    outcome = Ok(rows);
                }
                GroupOutcome { name, result: outcome }
            })
        });

        join_all(tasks)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(outcome) => outcome,
                Err(join_err) => GroupOutcome {
                    name: "<panicked>".to_string(),
                    result: Err(GatewayError::Execute {
                        statement: String::new(),
                        source: sqlx::Error::Protocol(join_err.to_string()),
                    }),
                },
            })
            .collect()
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        reflection::exists(&self.pool, name).await
    }

    pub async fn is_table(&self, name: &str) -> Result<bool> {
        reflection::is_table(&self.pool, name).await
    }

    pub async fn is_view(&self, name: &str) -> Result<bool> {
        reflection::is_view(&self.pool, name).await
    }

    pub async fn is_materialized_view(&self, name: &str) -> Result<bool> {
        reflection::is_materialized_view(&self.pool, name).await
    }

    pub async fn drop_table(&self, name: &str) -> Result<()> {
        reflection::drop(&self.pool, name).await
    }

    pub async fn purge_table(&self, name: &str) -> Result<()> {
        reflection::purge(&self.pool, name).await
    }

    pub async fn truncate_table(&self, name: &str) -> Result<()> {
        reflection::truncate(&self.pool, name).await
    }
}

fn log_excerpt(sql: &str) -> String {
    let one_line = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if one_line.len() > 120 {
        format!("{}…", &one_line[..120])
    } else {
        one_line
    }
}
