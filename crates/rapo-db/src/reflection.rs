//! Table reflection and lifecycle helpers (§4.2 point 4).

use sqlx::PgPool;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelKind {
    Table,
    View,
    MaterializedView,
}

/// Does a relation with this name exist, of any kind?
pub async fn exists(pool: &PgPool, name: &str) -> Result<bool> {
    let row: Option<(bool,)> = sqlx::query_as(
        "SELECT TRUE FROM pg_catalog.pg_class WHERE lower(relname) = lower($1)",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .map_err(|source| GatewayError::Execute {
        statement: "pg_catalog.pg_class lookup".into(),
        source,
    })?;
    Ok(row.is_some())
}

async fn relkind(pool: &PgPool, name: &str) -> Result<Option<char>> {
    let row: Option<(i8,)> = sqlx::query_as(
        "SELECT relkind::\"char\"::int FROM pg_catalog.pg_class WHERE lower(relname) = lower($1)",
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .map_err(|source| GatewayError::Execute {
        statement: "pg_catalog.pg_class relkind lookup".into(),
        source,
    })?;
    Ok(row.map(|(k,)| k as u8 as char))
}

pub async fn is_table(pool: &PgPool, name: &str) -> Result<bool> {
    Ok(matches!(relkind(pool, name).await?, Some('r')))
}

pub async fn is_view(pool: &PgPool, name: &str) -> Result<bool> {
    Ok(matches!(relkind(pool, name).await?, Some('v')))
}

pub async fn is_materialized_view(pool: &PgPool, name: &str) -> Result<bool> {
    Ok(matches!(relkind(pool, name).await?, Some('m')))
}

pub fn kind_of(kind: char) -> Option<RelKind> {
    match kind {
        'r' => Some(RelKind::Table),
        'v' => Some(RelKind::View),
        'm' => Some(RelKind::MaterializedView),
        _ => None,
    }
}

/// `DROP TABLE IF EXISTS <name>`.
pub async fn drop(pool: &PgPool, name: &str) -> Result<()> {
    let sql = format!("DROP TABLE IF EXISTS {name}");
    sqlx::query(&sql)
        .execute(pool)
        .await
        .map_err(|source| GatewayError::Execute {
            statement: sql,
            source,
        })?;
    Ok(())
}

/// `DROP TABLE IF EXISTS <name>` followed by a storage reclaim; Postgres
/// has no separate PURGE statement, so this is `DROP` plus `VACUUM`.
pub async fn purge(pool: &PgPool, name: &str) -> Result<()> {
    drop(pool, name).await?;
    let sql = "VACUUM".to_string();
    sqlx::query(&sql)
        .execute(pool)
        .await
        .map_err(|source| GatewayError::Execute {
            statement: sql,
            source,
        })?;
    Ok(())
}

pub async fn truncate(pool: &PgPool, name: &str) -> Result<()> {
    let sql = format!("TRUNCATE TABLE {name}");
    sqlx::query(&sql)
        .execute(pool)
        .await
        .map_err(|source| GatewayError::Execute {
            statement: sql,
            source,
        })?;
    Ok(())
}
