use crate::db::schema::{Row, SchemaDescription};

/// Tags offered to the model in the visualization prompt. Aliases are
/// folded onto canonical tags by `VizType::parse`.
pub const VIZ_CHOICES: &str = "[bar, pie, line, table, KPI, map, heatmap, hierarchical, text summary, scatter, bubble, radar, funnel, treemap, geo map]";

pub fn sql_prompt(schema: &SchemaDescription, utterance: &str) -> String {
    format!(
        r#"
You are a MySQL assistant. Convert natural language into SQL queries using ONLY this schema and relationships.

{}
{}

IMPORTANT:
- Do NOT assume any additional columns or tables.
- Use JOINs only when needed based on relationships.
- If no valid SQL can be generated, return a comment explaining why.
- Return a clean SQL query in this format:

```sql
SELECT ...
```

User request: "{}"
"#,
        schema.tables_text(),
        schema.relationships_text(),
        utterance
    )
}

pub fn viz_prompt(
    utterance: &str,
    sql: &str,
    schema: &SchemaDescription,
    sample_rows: &[Row],
) -> String {
    let sample = serde_json::to_string_pretty(sample_rows).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"
You are a data visualization expert.

Based on the following:
- User request: "{}"
- SQL Query: ```sql
{}
```
- Database schema:
{}
{}
- Query result sample:
{}

Choose the most suitable visualization from this list:
{}

Guidelines:
- Use pie for proportions or categorical breakdowns.
- Use bar for comparisons across categories.
- Use line for trends over time.
- Use KPI for single summary metrics (e.g., total users, revenue).
- Use heatmap for matrix-like data comparisons.
- Use hierarchical/treemap for parent-child category breakdowns.
- Use scatter for correlation between two numeric fields.
- Use bubble if there's a third dimension (size) on top of scatter.
- Use funnel for step-wise processes (e.g., sales funnel).
- Use map/geo map for geographic data with coordinates or region fields.
- Use table as fallback for complex, multidimensional queries.
- Use text summary if data is too complex to visualize or better explained in words.

Return only this format:
```viz
<best_chart_type>
```

Then explain why you chose that chart.
"#,
        utterance,
        sql,
        schema.tables_text(),
        schema.relationships_text(),
        sample,
        VIZ_CHOICES
    )
}
