//! Tabular data-model types.
//!
//! Cell 0 of every row holds the row id. Entity-set tables point at child rows
//! through columns whose cells contain a JSON array of child ids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Suffix that marks an entity-set table, e.g. `sample_set` groups `sample` rows.
pub const SET_SUFFIX: &str = "_set";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataModelType {
    Entity,
    EntitySet,
    Workspace,
}

impl DataModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataModelType::Entity => "entity",
            DataModelType::EntitySet => "entity_set",
            DataModelType::Workspace => "workspace",
        }
    }
}

impl fmt::Display for DataModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity" => Ok(DataModelType::Entity),
            "entity_set" => Ok(DataModelType::EntitySet),
            "workspace" => Ok(DataModelType::Workspace),
            other => Err(format!("unknown data model type: '{other}'")),
        }
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModel {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DataModelType,
    pub headers: Vec<String>,
}

impl DataModel {
    /// Position of `header` in the row layout.
    pub fn header_index(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Name of the table an entity-set groups, e.g. `sample` for `sample_set`.
    pub fn member_table_name(&self) -> Option<&str> {
        self.name.strip_suffix(SET_SUFFIX)
    }

    /// Header that holds the row id of this table (`<name>_id`).
    pub fn id_header(&self) -> String {
        format!("{}_id", self.name)
    }
}

/// A table together with (a subset of) its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRows {
    pub table: DataModel,
    pub rows: Vec<Vec<String>>,
}

impl TableRows {
    pub fn find_row(&self, row_id: &str) -> Option<&[String]> {
        self.rows
            .iter()
            .find(|row| row.first().map(String::as_str) == Some(row_id))
            .map(Vec::as_slice)
    }

    /// Cell `(row_id, header)`, if both exist.
    pub fn cell(&self, row_id: &str, header: &str) -> Option<&str> {
        let idx = self.table.header_index(header)?;
        self.find_row(row_id)?.get(idx).map(String::as_str)
    }

    /// Upsert `rows` laid out by `headers`.
    ///
    /// `headers[0]` names the id column and is not matched against the
    /// table. Missing headers are appended as new columns, missing rows are
    /// appended, and cells not covered by the patch keep their value.
    pub fn patch(&mut self, headers: &[String], rows: &[Vec<String>]) {
        for header in headers.iter().skip(1) {
            if self.table.header_index(header).is_none() {
                self.table.headers.push(header.clone());
            }
        }
        let width = self.table.headers.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }

        let columns: Vec<usize> = headers
            .iter()
            .skip(1)
            .filter_map(|h| self.table.header_index(h))
            .collect();

        for patch in rows {
            let Some(row_id) = patch.first() else {
                continue;
            };
            let pos = match self
                .rows
                .iter()
                .position(|row| row.first() == Some(row_id))
            {
                Some(pos) => pos,
                None => {
                    let mut row = vec![String::new(); width];
                    row[0] = row_id.clone();
                    self.rows.push(row);
                    self.rows.len() - 1
                }
            };
            for (offset, &col) in columns.iter().enumerate() {
                if let Some(value) = patch.get(offset + 1) {
                    self.rows[pos][col] = value.clone();
                }
            }
        }
    }
}
