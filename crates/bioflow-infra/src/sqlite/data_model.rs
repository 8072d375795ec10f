//! SQLite data-model tables.
//!
//! Headers and row cells are JSON arrays. `position` keeps rows in insertion
//! order. Patches are applied in memory with [`TableRows::patch`] and written
//! back inside one transaction on the writer.

use bioflow_core::data_model::DataModelService;
use bioflow_types::data_model::{DataModel, DataModelType, TableRows};
use bioflow_types::error::RepositoryError;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{from_json, parse_enum, query_err, to_json};

pub struct SqliteDataModelService {
    pool: DatabasePool,
}

impl SqliteDataModelService {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn table_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DataModel, RepositoryError> {
    let kind: String = row.try_get("kind").map_err(query_err)?;
    let headers: String = row.try_get("headers").map_err(query_err)?;
    Ok(DataModel {
        id: row.try_get("id").map_err(query_err)?,
        workspace_id: row.try_get("workspace_id").map_err(query_err)?,
        name: row.try_get("name").map_err(query_err)?,
        kind: parse_enum("table kind", &kind)?,
        headers: from_json("headers", &headers)?,
    })
}

fn cells_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Vec<String>, RepositoryError> {
    let cells: String = row.try_get("cells").map_err(query_err)?;
    from_json("cells", &cells)
}

async fn upsert_table(conn: &mut SqliteConnection, table: &DataModel) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"INSERT INTO data_tables (id, workspace_id, name, kind, headers)
           VALUES (?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             kind = excluded.kind,
             headers = excluded.headers"#,
    )
    .bind(&table.id)
    .bind(&table.workspace_id)
    .bind(&table.name)
    .bind(table.kind.as_str())
    .bind(to_json(&table.headers)?)
    .execute(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(format!("table '{}' already exists", table.name))
        }
        other => query_err(other),
    })?;
    Ok(())
}

/// Replace every row of `table_id`.
async fn replace_rows(conn: &mut SqliteConnection, table_id: &str, rows: &[Vec<String>]) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM data_rows WHERE table_id = ?")
        .bind(table_id)
        .execute(&mut *conn)
        .await
        .map_err(query_err)?;

    for (position, row) in rows.iter().enumerate() {
        let Some(row_id) = row.first() else {
            continue;
        };
        sqlx::query(
            r#"INSERT INTO data_rows (table_id, row_id, position, cells) VALUES (?, ?, ?, ?)
               ON CONFLICT(table_id, row_id) DO UPDATE SET cells = excluded.cells"#,
        )
        .bind(table_id)
        .bind(row_id)
        .bind(i64::try_from(position).unwrap_or(i64::MAX))
        .bind(to_json(row)?)
        .execute(&mut *conn)
        .await
        .map_err(query_err)?;
    }
    Ok(())
}

impl DataModelService for SqliteDataModelService {
    async fn get_table(&self, workspace_id: &str, table_id: &str) -> Result<Option<DataModel>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, workspace_id, name, kind, headers FROM data_tables WHERE workspace_id = ? AND id = ?",
        )
        .bind(workspace_id)
        .bind(table_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        row.as_ref().map(table_from_row).transpose()
    }

    async fn list_rows(
        &self,
        workspace_id: &str,
        table_id: &str,
        row_ids: &[String],
    ) -> Result<TableRows, RepositoryError> {
        let table = self
            .get_table(workspace_id, table_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT cells FROM data_rows WHERE table_id = ");
        qb.push_bind(table.id.clone());
        if !row_ids.is_empty() {
            qb.push(" AND row_id IN (");
            let mut separated = qb.separated(", ");
            for id in row_ids {
                separated.push_bind(id.clone());
            }
            qb.push(")");
        }
        qb.push(" ORDER BY position ASC");

        let rows = qb.build().fetch_all(&self.pool.reader).await.map_err(query_err)?;
        let rows = rows.iter().map(cells_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(TableRows { table, rows })
    }

    async fn list_tables(
        &self,
        workspace_id: &str,
        search_word: Option<&str>,
        kinds: &[DataModelType],
    ) -> Result<Vec<DataModel>, RepositoryError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, workspace_id, name, kind, headers FROM data_tables WHERE workspace_id = ");
        qb.push_bind(workspace_id.to_string());
        if !kinds.is_empty() {
            qb.push(" AND kind IN (");
            let mut separated = qb.separated(", ");
            for kind in kinds {
                separated.push_bind(kind.as_str());
            }
            qb.push(")");
        }
        if let Some(word) = search_word.filter(|w| !w.is_empty()) {
            qb.push(" AND name LIKE ").push_bind(format!("%{word}%"));
        }
        qb.push(" ORDER BY name ASC");

        let rows = qb.build().fetch_all(&self.pool.reader).await.map_err(query_err)?;
        rows.iter().map(table_from_row).collect()
    }

    async fn patch_table(
        &self,
        workspace_id: &str,
        name: &str,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let existing = sqlx::query(
            "SELECT id, workspace_id, name, kind, headers FROM data_tables WHERE workspace_id = ? AND name = ?",
        )
        .bind(workspace_id)
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(query_err)?;

        let mut current = match existing {
            Some(row) => {
                let table = table_from_row(&row)?;
                let rows = sqlx::query("SELECT cells FROM data_rows WHERE table_id = ? ORDER BY position ASC")
                    .bind(&table.id)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(query_err)?
                    .iter()
                    .map(cells_from_row)
                    .collect::<Result<Vec<_>, _>>()?;
                TableRows { table, rows }
            }
            None => TableRows {
                table: DataModel {
                    id: Uuid::now_v7().to_string(),
                    workspace_id: workspace_id.to_string(),
                    name: name.to_string(),
                    kind: DataModelType::Entity,
                    headers: headers.iter().take(1).cloned().collect(),
                },
                rows: Vec::new(),
            },
        };

        current.patch(headers, rows);
        upsert_table(&mut tx, &current.table).await?;
        replace_rows(&mut tx, &current.table.id, &current.rows).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn import_table(&self, table: &DataModel, rows: &[Vec<String>]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        upsert_table(&mut tx, table).await?;
        replace_rows(&mut tx, &table.id, rows).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(())
    }
}
