use bioflow_types::data_model::{DataModelType, TableRows};
use bioflow_types::error::{RepositoryError, ResolveError};
use bioflow_types::submission::Template;
use serde_json::{Map, Value};
use tracing::debug;

use super::reference::Reference;
use crate::data_model::DataModelService;

/// The tables a template can reach from one selected data model.
///
/// `sets` is the entity-set chain, outermost first. `leaf` is the entity
/// table at its bottom (or the selected entity table itself).
#[derive(Debug, Clone, Default)]
pub struct DataList {
    sets: Vec<TableRows>,
    leaf: Option<TableRows>,
    workspace: Option<TableRows>,
}

impl DataList {
    pub fn new(sets: Vec<TableRows>, leaf: Option<TableRows>, workspace: Option<TableRows>) -> Self {
        Self {
            sets,
            leaf,
            workspace,
        }
    }

    /// Load the selected table, the tables below it and the workspace table.
    pub async fn load<D: DataModelService>(
        service: &D,
        workspace_id: &str,
        data_model_id: Option<&str>,
    ) -> Result<Self, ResolveError> {
        let lookup_err = |e: RepositoryError| ResolveError::Lookup(e.to_string());

        let workspace = match service
            .list_tables(workspace_id, None, &[DataModelType::Workspace])
            .await
            .map_err(lookup_err)?
            .into_iter()
            .next()
        {
            Some(table) => Some(
                service
                    .list_rows(workspace_id, &table.id, &[])
                    .await
                    .map_err(lookup_err)?,
            ),
            None => None,
        };

        let Some(data_model_id) = data_model_id else {
            return Ok(Self::new(Vec::new(), None, workspace));
        };

        let mut table = service
            .get_table(workspace_id, data_model_id)
            .await
            .map_err(lookup_err)?
            .ok_or_else(|| ResolveError::Lookup(format!("data model '{data_model_id}' not found")))?;

        let mut sets = Vec::new();
        loop {
            let rows = service
                .list_rows(workspace_id, &table.id, &[])
                .await
                .map_err(lookup_err)?;
            match table.kind {
                DataModelType::Entity => {
                    debug!(levels = sets.len(), leaf = %table.name, "data list loaded");
                    return Ok(Self::new(sets, Some(rows), workspace));
                }
                DataModelType::Workspace => {
                    return Err(ResolveError::Lookup(format!(
                        "'{}' is a workspace table and cannot be selected",
                        table.name
                    )));
                }
                DataModelType::EntitySet => {
                    let member = table
                        .member_table_name()
                        .ok_or_else(|| {
                            ResolveError::Lookup(format!("entity set '{}' lacks the _set suffix", table.name))
                        })?
                        .to_string();
                    sets.push(rows);
                    table = service
                        .list_tables(
                            workspace_id,
                            Some(&member),
                            &[DataModelType::Entity, DataModelType::EntitySet],
                        )
                        .await
                        .map_err(lookup_err)?
                        .into_iter()
                        .find(|t| t.name == member)
                        .ok_or_else(|| ResolveError::Lookup(format!("member table '{member}' not found")))?;
                }
            }
        }
    }

    /// Resolve every entry of `template` for the row `row_id` of the selected table.
    pub fn render(&self, template: &Template, row_id: Option<&str>) -> Result<Map<String, Value>, ResolveError> {
        template
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.resolve(value, row_id)?)))
            .collect()
    }

    fn resolve(&self, value: &Value, row_id: Option<&str>) -> Result<Value, ResolveError> {
        let Value::String(text) = value else {
            return Ok(value.clone());
        };
        match Reference::parse(text)? {
            Reference::Literal => Ok(value.clone()),
            Reference::Workspace(header) => {
                let table = self
                    .workspace
                    .as_ref()
                    .ok_or_else(|| ResolveError::MissingWorkspaceTable(text.clone()))?;
                let row = table.rows.first().ok_or_else(|| ResolveError::UnknownRow {
                    table: table.table.name.clone(),
                    row_id: "(workspace)".to_string(),
                })?;
                let idx = table.table.header_index(header).ok_or_else(|| ResolveError::UnknownHeader {
                    table: table.table.name.clone(),
                    header: header.to_string(),
                })?;
                Ok(Value::String(row.get(idx).cloned().unwrap_or_default()))
            }
            Reference::This(segments) => {
                let row_id = row_id.ok_or_else(|| ResolveError::MissingRow(text.clone()))?;
                self.pick(row_id, &segments, 0, text)
            }
        }
    }

    /// Resolve `segments` for `row_id` at set level `depth`.
    fn pick(&self, row_id: &str, segments: &[&str], depth: usize, path: &str) -> Result<Value, ResolveError> {
        let chain = self.sets.get(depth..).unwrap_or_default();

        if let [segment] = segments {
            return match chain.first() {
                Some(set) if *segment == set.table.id_header() => {
                    set.find_row(row_id).ok_or_else(|| ResolveError::UnknownRow {
                        table: set.table.name.clone(),
                        row_id: row_id.to_string(),
                    })?;
                    Ok(Value::String(row_id.to_string()))
                }
                Some(set) => {
                    let cell = lookup(set, row_id, segment)?;
                    match serde_json::from_str::<Value>(cell) {
                        Ok(list @ Value::Array(_)) => Ok(list),
                        _ => Ok(Value::String(cell.to_string())),
                    }
                }
                None => {
                    let leaf = self.leaf.as_ref().ok_or_else(|| ResolveError::PathTooDeep(path.to_string()))?;
                    Ok(Value::String(lookup(leaf, row_id, segment)?.to_string()))
                }
            };
        }

        let set = chain
            .first()
            .ok_or_else(|| ResolveError::PathTooDeep(path.to_string()))?;
        let cell = lookup(set, row_id, segments[0])?;
        let children: Vec<String> =
            serde_json::from_str(cell).map_err(|_| ResolveError::NotAnIdList(cell.to_string()))?;

        children
            .iter()
            .map(|child| self.pick(child, &segments[1..], depth + 1, path))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

fn lookup<'t>(table: &'t TableRows, row_id: &str, header: &str) -> Result<&'t str, ResolveError> {
    let idx = table
        .table
        .header_index(header)
        .ok_or_else(|| ResolveError::UnknownHeader {
            table: table.table.name.clone(),
            header: header.to_string(),
        })?;
    let row = table.find_row(row_id).ok_or_else(|| ResolveError::UnknownRow {
        table: table.table.name.clone(),
        row_id: row_id.to_string(),
    })?;
    Ok(row.get(idx).map(String::as_str).unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioflow_types::data_model::DataModel;
    use serde_json::json;

    use crate::memory::MemoryDataModelService;

    fn table(id: &str, name: &str, kind: DataModelType, headers: &[&str]) -> DataModel {
        DataModel {
            id: id.into(),
            workspace_id: "ws".into(),
            name: name.into(),
            kind,
            headers: headers.iter().map(|h| h.to_string()).collect(),
        }
    }

    fn rows(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    async fn seeded() -> MemoryDataModelService {
        let svc = MemoryDataModelService::new();
        svc.import_table(
            &table("t-sample", "sample", DataModelType::Entity, &["sample_id", "fastq"]),
            &rows(&[&["s1", "f1.fq"], &["s2", "f2.fq"], &["s3", "f3.fq"]]),
        )
        .await
        .unwrap();
        svc.import_table(
            &table("t-ss", "sample_set", DataModelType::EntitySet, &["sample_set_id", "samples", "label"]),
            &rows(&[&["ss1", r#"["s1","s2"]"#, "batch-a"], &["ss2", r#"["s3"]"#, "batch-b"]]),
        )
        .await
        .unwrap();
        svc.import_table(
            &table("t-sss", "sample_set_set", DataModelType::EntitySet, &["sample_set_set_id", "sample_sets"]),
            &rows(&[&["top", r#"["ss1","ss2"]"#]]),
        )
        .await
        .unwrap();
        svc.import_table(
            &table("t-ws", "workspace", DataModelType::Workspace, &["workspace_id", "genome"]),
            &rows(&[&["ws", "hg38.fa"]]),
        )
        .await
        .unwrap();
        svc
    }

    fn template(entries: &[(&str, Value)]) -> Template {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_entity_selection_resolves_cells_and_workspace() {
        let svc = seeded().await;
        let list = DataList::load(&svc, "ws", Some("t-sample")).await.unwrap();

        let rendered = list
            .render(
                &template(&[
                    ("wf.reads", json!("this.fastq")),
                    ("wf.id", json!("this.sample_id")),
                    ("wf.ref", json!("workspace.genome")),
                    ("wf.threads", json!(4)),
                    ("wf.mode", json!("fast")),
                ]),
                Some("s2"),
            )
            .unwrap();

        assert_eq!(rendered["wf.reads"], json!("f2.fq"));
        assert_eq!(rendered["wf.id"], json!("s2"));
        assert_eq!(rendered["wf.ref"], json!("hg38.fa"));
        assert_eq!(rendered["wf.threads"], json!(4));
        assert_eq!(rendered["wf.mode"], json!("fast"));
    }

    #[tokio::test]
    async fn test_set_selection_descends_to_members() {
        let svc = seeded().await;
        let list = DataList::load(&svc, "ws", Some("t-ss")).await.unwrap();

        let rendered = list
            .render(
                &template(&[
                    ("wf.reads", json!("this.samples.fastq")),
                    ("wf.ids", json!("this.samples")),
                    ("wf.set", json!("this.sample_set_id")),
                    ("wf.label", json!("this.label")),
                ]),
                Some("ss1"),
            )
            .unwrap();

        assert_eq!(rendered["wf.reads"], json!(["f1.fq", "f2.fq"]));
        assert_eq!(rendered["wf.ids"], json!(["s1", "s2"]));
        assert_eq!(rendered["wf.set"], json!("ss1"));
        assert_eq!(rendered["wf.label"], json!("batch-a"));
    }

    #[tokio::test]
    async fn test_member_column_named_after_entity_table() {
        let svc = MemoryDataModelService::new();
        svc.import_table(
            &table("t-sample", "sample", DataModelType::Entity, &["sample_id", "fastq"]),
            &rows(&[&["s1", "f1.fq"], &["s2", "f2.fq"]]),
        )
        .await
        .unwrap();
        svc.import_table(
            &table("t-ss", "sample_set", DataModelType::EntitySet, &["sample_set_id", "sample"]),
            &rows(&[&["ss1", r#"["s1","s2"]"#]]),
        )
        .await
        .unwrap();

        let list = DataList::load(&svc, "ws", Some("t-ss")).await.unwrap();
        let rendered = list
            .render(&template(&[("wf.reads", json!("this.sample.fastq"))]), Some("ss1"))
            .unwrap();
        assert_eq!(rendered["wf.reads"], json!(["f1.fq", "f2.fq"]));
    }

    #[tokio::test]
    async fn test_two_set_levels_nest_twice() {
        let svc = seeded().await;
        let list = DataList::load(&svc, "ws", Some("t-sss")).await.unwrap();

        let rendered = list
            .render(
                &template(&[("wf.reads", json!("this.sample_sets.samples.fastq"))]),
                Some("top"),
            )
            .unwrap();
        assert_eq!(rendered["wf.reads"], json!([["f1.fq", "f2.fq"], ["f3.fq"]]));
    }

    #[tokio::test]
    async fn test_resolution_errors() {
        let svc = seeded().await;
        let list = DataList::load(&svc, "ws", Some("t-ss")).await.unwrap();
        let render = |value: &str, row: &str| list.render(&template(&[("k", json!(value))]), Some(row));

        assert!(matches!(
            render("this.missing", "ss1"),
            Err(ResolveError::UnknownHeader { .. })
        ));
        assert!(matches!(
            render("this.samples.fastq", "nope"),
            Err(ResolveError::UnknownRow { .. })
        ));
        assert!(matches!(
            render("this.samples.fastq.more", "ss1"),
            Err(ResolveError::PathTooDeep(_))
        ));
        assert!(matches!(
            render("this.label.fastq", "ss1"),
            Err(ResolveError::NotAnIdList(_))
        ));
        assert!(matches!(
            list.render(&template(&[("k", json!("this.samples"))]), None),
            Err(ResolveError::MissingRow(_))
        ));
    }

    #[tokio::test]
    async fn test_without_data_model_only_literals_and_workspace_resolve() {
        let svc = seeded().await;
        let list = DataList::load(&svc, "ws", None).await.unwrap();

        let rendered = list
            .render(&template(&[("wf.ref", json!("workspace.genome"))]), None)
            .unwrap();
        assert_eq!(rendered["wf.ref"], json!("hg38.fa"));

        let empty = DataList::default();
        assert!(matches!(
            empty.render(&template(&[("wf.ref", json!("workspace.genome"))]), None),
            Err(ResolveError::MissingWorkspaceTable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_member_table_fails_to_load() {
        let svc = MemoryDataModelService::new();
        svc.import_table(
            &table("t-x", "orphan_set", DataModelType::EntitySet, &["orphan_set_id", "orphans"]),
            &[],
        )
        .await
        .unwrap();
        assert!(matches!(
            DataList::load(&svc, "ws", Some("t-x")).await,
            Err(ResolveError::Lookup(_))
        ));
    }
}
