//! Data-model table CLI subcommands.
//!
//! Tables are imported from tab-separated files whose first line holds the
//! headers. The first header must be `{table}_id`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use bioflow_core::service::ImportTableCommand;
use bioflow_types::data_model::DataModelType;

use super::print_json;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum TableCommand {
    /// Create or replace a table from a TSV file.
    Import {
        file: PathBuf,

        /// Table name; defaults to the file stem.
        #[arg(long)]
        name: Option<String>,

        /// `entity`, `entity_set` or `workspace`.
        #[arg(long, default_value = "entity")]
        kind: DataModelType,
    },

    /// List the tables of the workspace.
    #[command(alias = "ls")]
    List {
        /// Substring of the table name.
        #[arg(long)]
        search: Option<String>,
    },
}

pub async fn handle_table_command(cmd: TableCommand, state: &AppState, workspace_id: &str, json: bool) -> Result<()> {
    match cmd {
        TableCommand::Import { file, name, kind } => {
            let name = match name {
                Some(name) => name,
                None => file_stem(&file)?,
            };
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let (headers, rows) = parse_tsv(&raw)?;
            let command = ImportTableCommand {
                workspace_id: workspace_id.to_string(),
                name,
                kind,
                headers,
                rows,
            };
            import_table(state, command, json).await
        }
        TableCommand::List { search } => list_tables(state, workspace_id, search.as_deref(), json).await,
    }
}

fn file_stem(file: &Path) -> Result<String> {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .with_context(|| format!("cannot derive a table name from {}", file.display()))
}

/// Split a TSV document into headers and rows. Blank lines are skipped.
fn parse_tsv(raw: &str) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut lines = raw.lines().filter(|line| !line.trim().is_empty());
    let Some(header_line) = lines.next() else {
        bail!("table file is empty");
    };
    let split = |line: &str| -> Vec<String> {
        line.trim_end_matches('\r')
            .split('\t')
            .map(|cell| cell.trim().to_string())
            .collect()
    };
    let headers = split(header_line);
    let rows = lines.map(split).collect();
    Ok((headers, rows))
}

async fn import_table(state: &AppState, command: ImportTableCommand, json: bool) -> Result<()> {
    let name = command.name.clone();
    let row_count = command.rows.len();
    let table_id = state
        .catalog_service
        .import_table(command)
        .await
        .with_context(|| format!("failed to import table '{name}'"))?;

    if json {
        print_json(&serde_json::json!({ "id": table_id, "name": name, "rows": row_count }))?;
    } else {
        println!();
        println!(
            "  {} Imported {} rows into '{}'",
            style("ok").green(),
            row_count,
            style(&name).cyan()
        );
        println!("     id: {}", style(&table_id).dim());
        println!();
    }
    Ok(())
}

async fn list_tables(state: &AppState, workspace_id: &str, search: Option<&str>, json: bool) -> Result<()> {
    let tables = state.catalog_service.list_tables(workspace_id, search).await?;

    if json {
        return print_json(&tables);
    }

    if tables.is_empty() {
        println!();
        println!("  {} No tables in '{}'.", style("i").blue().bold(), style(workspace_id).cyan());
        println!("     Import one with: bioflow table import <file.tsv>");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Columns").fg(Color::White),
    ]);
    for dm in &tables {
        table.add_row(vec![
            Cell::new(&dm.id).fg(Color::DarkGrey),
            Cell::new(&dm.name).fg(Color::Cyan),
            Cell::new(dm.kind.as_str()),
            Cell::new(dm.headers.join(", ")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
