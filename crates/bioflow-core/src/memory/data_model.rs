use bioflow_types::data_model::{DataModel, DataModelType, TableRows};
use bioflow_types::error::RepositoryError;
use dashmap::DashMap;

use super::matches_search;
use crate::data_model::DataModelService;

/// Tables keyed by (workspace_id, table_id).
#[derive(Debug, Default)]
pub struct MemoryDataModelService {
    tables: DashMap<(String, String), TableRows>,
}

impl MemoryDataModelService {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_by_name(&self, workspace_id: &str, name: &str) -> Option<(String, String)> {
        self.tables
            .iter()
            .find(|t| t.key().0 == workspace_id && t.table.name == name)
            .map(|t| t.key().clone())
    }
}

impl DataModelService for MemoryDataModelService {
    async fn get_table(
        &self,
        workspace_id: &str,
        table_id: &str,
    ) -> Result<Option<DataModel>, RepositoryError> {
        let key = (workspace_id.to_string(), table_id.to_string());
        Ok(self.tables.get(&key).map(|t| t.table.clone()))
    }

    async fn list_rows(
        &self,
        workspace_id: &str,
        table_id: &str,
        row_ids: &[String],
    ) -> Result<TableRows, RepositoryError> {
        let key = (workspace_id.to_string(), table_id.to_string());
        let table = self.tables.get(&key).ok_or(RepositoryError::NotFound)?;
        let rows = table
            .rows
            .iter()
            .filter(|row| {
                row_ids.is_empty() || row.first().is_some_and(|id| row_ids.contains(id))
            })
            .cloned()
            .collect();
        Ok(TableRows {
            table: table.table.clone(),
            rows,
        })
    }

    async fn list_tables(
        &self,
        workspace_id: &str,
        search_word: Option<&str>,
        kinds: &[DataModelType],
    ) -> Result<Vec<DataModel>, RepositoryError> {
        let mut tables: Vec<DataModel> = self
            .tables
            .iter()
            .filter(|t| t.key().0 == workspace_id)
            .filter(|t| kinds.is_empty() || kinds.contains(&t.table.kind))
            .filter(|t| matches_search(&t.table.name, search_word))
            .map(|t| t.table.clone())
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    async fn patch_table(
        &self,
        workspace_id: &str,
        name: &str,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<(), RepositoryError> {
        let key = match self.find_by_name(workspace_id, name) {
            Some(key) => key,
            None => {
                let table = DataModel {
                    id: uuid::Uuid::now_v7().to_string(),
                    workspace_id: workspace_id.to_string(),
                    name: name.to_string(),
                    kind: DataModelType::Entity,
                    headers: headers.iter().take(1).cloned().collect(),
                };
                let key = (workspace_id.to_string(), table.id.clone());
                self.tables.insert(
                    key.clone(),
                    TableRows {
                        table,
                        rows: Vec::new(),
                    },
                );
                key
            }
        };
        let mut table = self.tables.get_mut(&key).ok_or(RepositoryError::NotFound)?;
        table.patch(headers, rows);
        Ok(())
    }

    async fn import_table(&self, table: &DataModel, rows: &[Vec<String>]) -> Result<(), RepositoryError> {
        let key = (table.workspace_id.clone(), table.id.clone());
        self.tables.insert(
            key,
            TableRows {
                table: table.clone(),
                rows: rows.to_vec(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> DataModel {
        DataModel {
            id: "t-sample".into(),
            workspace_id: "ws".into(),
            name: "sample".into(),
            kind: DataModelType::Entity,
            headers: vec!["sample_id".into(), "fastq".into()],
        }
    }

    #[tokio::test]
    async fn test_list_rows_filters_by_id() {
        let svc = MemoryDataModelService::new();
        svc.import_table(
            &sample_table(),
            &[
                vec!["s1".into(), "f1.fq".into()],
                vec!["s2".into(), "f2.fq".into()],
            ],
        )
        .await
        .unwrap();

        let all = svc.list_rows("ws", "t-sample", &[]).await.unwrap();
        assert_eq!(all.rows.len(), 2);
        let one = svc.list_rows("ws", "t-sample", &["s2".into()]).await.unwrap();
        assert_eq!(one.rows, vec![vec!["s2".to_string(), "f2.fq".to_string()]]);
        assert!(svc.list_rows("other", "t-sample", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_patch_creates_missing_table() {
        let svc = MemoryDataModelService::new();
        svc.patch_table(
            "ws",
            "result",
            &["result_id".into(), "bam".into()],
            &[vec!["r1".into(), "a.bam".into()]],
        )
        .await
        .unwrap();

        let tables = svc.list_tables("ws", Some("result"), &[]).await.unwrap();
        assert_eq!(tables.len(), 1);
        let rows = svc.list_rows("ws", &tables[0].id, &[]).await.unwrap();
        assert_eq!(rows.cell("r1", "bam"), Some("a.bam"));
    }
}
