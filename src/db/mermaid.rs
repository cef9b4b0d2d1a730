//! Entity-relationship diagrams in Mermaid `erDiagram` syntax.

use crate::db::schema::{KeyRole, SchemaDescription};

/// Replaces every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_identifier(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    // An empty name would break the block syntax
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Strips `(...)` qualifiers and maps a MySQL column type onto the small set
/// of names the diagram renderer accepts. Anything unknown becomes `string`.
pub fn normalize_type(raw: &str) -> &'static str {
    let mut base = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => base.push(c),
            _ => {}
        }
    }

    // "int unsigned" and friends: the first word carries the type
    let base = base.trim().to_ascii_uppercase();
    let base = base.split_whitespace().next().unwrap_or("");

    match base {
        "VARCHAR" | "TEXT" | "CHAR" => "string",
        "INT" | "INTEGER" | "SMALLINT" | "TINYINT" => "int",
        "BIGINT" => "bigint",
        "DECIMAL" => "decimal",
        "FLOAT" => "float",
        "DOUBLE" => "double",
        "DATE" => "date",
        "DATETIME" => "datetime",
        "TIMESTAMP" => "timestamp",
        "TIME" => "time",
        "BOOLEAN" | "BOOL" => "boolean",
        "JSON" => "json",
        _ => "string",
    }
}

fn key_marker(role: KeyRole) -> &'static str {
    match role {
        KeyRole::Primary => " PK",
        KeyRole::Unique => " UK",
        KeyRole::Foreign => " FK",
        KeyRole::None => "",
    }
}

/// Renders one record block per table and one relationship line per
/// foreign-key edge, in the order the description holds them.
pub fn render(schema: &SchemaDescription) -> String {
    let mut mermaid = String::from("erDiagram\n");

    for table in &schema.tables {
        mermaid.push_str(&format!("    {} {{\n", sanitize_identifier(&table.name)));
        for column in &table.columns {
            mermaid.push_str(&format!(
                "        {} {}{}\n",
                normalize_type(&column.data_type),
                sanitize_identifier(&column.name),
                key_marker(column.key_role)
            ));
        }
        mermaid.push_str("    }\n");
    }

    for fk in &schema.foreign_keys {
        mermaid.push_str(&format!(
            "    {} ||--o{{ {} : \"references {}\"\n",
            sanitize_identifier(&fk.to_table),
            sanitize_identifier(&fk.from_table),
            sanitize_identifier(&fk.to_column)
        ));
    }

    mermaid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::fixtures::{column, shop};
    use crate::db::schema::{ForeignKeyEdge, TableSchema};
    use regex::Regex;

    #[test]
    fn sanitize_replaces_non_word_characters() {
        assert_eq!(sanitize_identifier("order items"), "order_items");
        assert_eq!(sanitize_identifier("total-$"), "total__");
        assert_eq!(sanitize_identifier("café"), "caf_");
        assert_eq!(sanitize_identifier("already_ok_1"), "already_ok_1");
    }

    #[test]
    fn normalize_strips_length_qualifiers() {
        assert_eq!(normalize_type("varchar(255)"), "string");
        assert_eq!(normalize_type("decimal(10,2)"), "decimal");
        assert_eq!(normalize_type("int(11) unsigned"), "int");
        assert_eq!(normalize_type("tinyint(1)"), "int");
        assert_eq!(normalize_type("BIGINT"), "bigint");
        assert_eq!(normalize_type("datetime"), "datetime");
    }

    #[test]
    fn normalize_defaults_unknown_types_to_string() {
        assert_eq!(normalize_type("enum('a','b')"), "string");
        assert_eq!(normalize_type("geometry"), "string");
        assert_eq!(normalize_type("longblob"), "string");
    }

    #[test]
    fn one_block_per_table_and_one_line_per_edge() {
        let diagram = render(&shop());
        assert!(diagram.starts_with("erDiagram\n"));
        assert_eq!(diagram.matches(" {\n").count(), 2);
        assert_eq!(diagram.matches("||--o{").count(), 1);
        assert!(diagram.contains("    customers ||--o{ orders : \"references id\"\n"));
        assert!(diagram.contains("        int customer_id FK\n"));
        assert!(diagram.contains("        string email UK\n"));
        assert!(diagram.contains("        int id PK\n"));
    }

    #[test]
    fn every_identifier_is_sanitized() {
        let schema = SchemaDescription::new(
            vec![
                TableSchema {
                    name: "order items".to_string(),
                    columns: vec![
                        column("line #", "int", "PRI"),
                        column("order-id", "int", ""),
                    ],
                },
                TableSchema {
                    name: "orders".to_string(),
                    columns: vec![column("id", "int", "PRI")],
                },
            ],
            vec![ForeignKeyEdge {
                from_table: "order items".to_string(),
                from_column: "order-id".to_string(),
                to_table: "orders".to_string(),
                to_column: "id".to_string(),
            }],
        );

        let diagram = render(&schema);
        let ident = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();

        for line in diagram.lines().skip(1) {
            let line = line.trim();
            if line == "}" {
                continue;
            }
            if let Some(name) = line.strip_suffix(" {") {
                assert!(ident.is_match(name), "table `{}`", name);
            } else if line.contains("||--o{") {
                let parts: Vec<&str> = line.split_whitespace().collect();
                assert!(ident.is_match(parts[0]));
                assert!(ident.is_match(parts[2]));
            } else {
                let parts: Vec<&str> = line.split_whitespace().collect();
                assert!(ident.is_match(parts[1]), "column `{}`", parts[1]);
            }
        }
        assert!(diagram.contains("    order_items {\n"));
        assert!(diagram.contains("        int order_id FK\n"));
    }

    #[test]
    fn rendering_is_stable() {
        let schema = shop();
        assert_eq!(render(&schema), render(&schema.clone()));
    }
}
