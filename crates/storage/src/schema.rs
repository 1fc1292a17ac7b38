//! Declarative table definitions.
//!
//! The migration log under `migrations/` is the source of truth for DDL; this
//! module records the tables and columns the application expects so a
//! database produced by any migration history can be checked at startup.

use sqlx::{Row, SqlitePool};
use thiserror::Error;

/// A table and the columns the application relies on.
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

macro_rules! table {
    ($name:literal, [$($column:literal),* $(,)?]) => {
        TableDef {
            name: $name,
            columns: &["id", $($column),*],
        }
    };
}

pub const TABLES: &[TableDef] = &[
    table!("groups", ["name", "created_at", "updated_at"]),
    table!(
        "invitations",
        [
            "group_id",
            "invited_by_id",
            "email",
            "token",
            "sent_at",
            "accepted",
            "created_at",
            "updated_at"
        ]
    ),
    table!(
        "memberships",
        ["user_id", "group_id", "role", "created_at", "updated_at"]
    ),
    table!(
        "users",
        [
            "email",
            "first_name",
            "last_name",
            "username",
            "password_digest",
            "created_at",
            "updated_at"
        ]
    ),
    table!("signups", ["email", "token", "created_at", "updated_at"]),
    table!(
        "producers",
        ["name", "email", "address", "created_at", "updated_at"]
    ),
    table!(
        "suppliers",
        ["group_id", "producer_id", "created_at", "updated_at"]
    ),
    table!(
        "products",
        ["name", "price", "unit", "provider_id", "created_at", "updated_at"]
    ),
    table!("orders", ["user_id", "group_id", "created_at", "updated_at"]),
    table!(
        "order_lines",
        [
            "unit",
            "price",
            "quantity",
            "order_id",
            "product_id",
            "created_at",
            "updated_at"
        ]
    ),
    table!(
        "oauth_applications",
        [
            "name",
            "uid",
            "secret",
            "redirect_uri",
            "scopes",
            "superapp",
            "created_at",
            "updated_at"
        ]
    ),
    table!(
        "oauth_access_grants",
        [
            "resource_owner_id",
            "application_id",
            "token",
            "expires_in",
            "redirect_uri",
            "created_at",
            "revoked_at",
            "scopes"
        ]
    ),
    table!(
        "oauth_access_tokens",
        [
            "resource_owner_id",
            "application_id",
            "token",
            "refresh_token",
            "expires_in",
            "revoked_at",
            "created_at",
            "scopes"
        ]
    ),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table {0} is missing")]
    MissingTable(&'static str),
    #[error("column {table}.{column} is missing")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
    #[error("failed to inspect schema: {0}")]
    Inspect(String),
}

/// Compares the live database with [`TABLES`].
pub async fn verify(pool: &SqlitePool) -> Result<(), SchemaError> {
    for table in TABLES {
        let rows = sqlx::query("SELECT name FROM pragma_table_info(?)")
            .bind(table.name)
            .fetch_all(pool)
            .await
            .map_err(|err| SchemaError::Inspect(err.to_string()))?;

        if rows.is_empty() {
            return Err(SchemaError::MissingTable(table.name));
        }

        let present: Vec<String> = rows.iter().map(|row| row.get("name")).collect();
        if let Some(column) = table
            .columns
            .iter()
            .copied()
            .find(|column| !present.iter().any(|name| name == *column))
        {
            return Err(SchemaError::MissingColumn {
                table: table.name,
                column,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_db;

    #[test]
    fn every_table_has_an_id_and_creation_time() {
        for table in TABLES {
            assert_eq!(table.columns.first(), Some(&"id"), "{}", table.name);
            assert!(table.columns.contains(&"created_at"), "{}", table.name);
        }
    }

    #[tokio::test]
    async fn reports_missing_column() {
        let test = setup_db().await;
        sqlx::query("ALTER TABLE signups DROP COLUMN token")
            .execute(test.db.pool())
            .await
            .expect("drop column");

        let err = verify(test.db.pool()).await.expect_err("column removed");
        assert_eq!(
            err,
            SchemaError::MissingColumn {
                table: "signups",
                column: "token"
            }
        );
    }

    #[tokio::test]
    async fn reports_missing_table() {
        let test = setup_db().await;
        sqlx::query("DROP TABLE order_lines")
            .execute(test.db.pool())
            .await
            .expect("drop table");

        let err = verify(test.db.pool()).await.expect_err("table removed");
        assert_eq!(err, SchemaError::MissingTable("order_lines"));
    }
}
