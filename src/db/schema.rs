use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    None,
    Primary,
    Unique,
    Foreign,
}

impl KeyRole {
    /// Maps MySQL's `COLUMN_KEY` (`PRI`, `UNI`, `MUL`, empty). `MUL` is only
    /// a non-unique index; whether it is a foreign key is decided by the
    /// foreign-key edges, see [`SchemaDescription::new`].
    pub fn from_column_key(key: &str) -> Self {
        match key.trim().to_ascii_uppercase().as_str() {
            "PRI" => KeyRole::Primary,
            "UNI" => KeyRole::Unique,
            _ => KeyRole::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub key_role: KeyRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

/// Structure of one database, read fresh for every request that needs it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableSchema>,
    pub foreign_keys: Vec<ForeignKeyEdge>,
}

impl SchemaDescription {
    /// Builds the description and marks columns that take part in a foreign
    /// key as [`KeyRole::Foreign`], unless they already carry a primary or
    /// unique role.
    pub fn new(mut tables: Vec<TableSchema>, foreign_keys: Vec<ForeignKeyEdge>) -> Self {
        for edge in &foreign_keys {
            if let Some(table) = tables.iter_mut().find(|t| t.name == edge.from_table) {
                if let Some(column) = table.columns.iter_mut().find(|c| c.name == edge.from_column) {
                    if column.key_role == KeyRole::None {
                        column.key_role = KeyRole::Foreign;
                    }
                }
            }
        }

        Self {
            tables,
            foreign_keys,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Table listing used in model prompts.
    pub fn tables_text(&self) -> String {
        let mut text = String::from("Tables and columns:\n");
        for table in &self.tables {
            let columns = table
                .columns
                .iter()
                .map(|c| format!("{} ({})", c.name, c.data_type))
                .collect::<Vec<_>>()
                .join(", ");
            text.push_str(&format!("- {}({})\n", table.name, columns));
        }
        text
    }

    pub fn relationships_text(&self) -> String {
        let mut text = String::from("\nTable relationships:\n");
        if self.foreign_keys.is_empty() {
            text.push_str("- No foreign key relationships found.\n");
        } else {
            for fk in &self.foreign_keys {
                text.push_str(&format!(
                    "- {}.{} → {}.{}\n",
                    fk.from_table, fk.from_column, fk.to_table, fk.to_column
                ));
            }
        }
        text
    }
}

/// One result row, keyed by column name in select-list order.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub rows: Vec<Row>,
    pub row_count: usize,
}

impl ExecutionResult {
    pub fn new(rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self { rows, row_count }
    }

    pub fn sample(&self, n: usize) -> &[Row] {
        &self.rows[..self.rows.len().min(n)]
    }
}
