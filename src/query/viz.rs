use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::schema::{ExecutionResult, SchemaDescription};
use crate::llm::{parser, prompts, LlmError, LlmManager};

/// Rows shown to the model when picking a chart.
pub const SAMPLE_ROWS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VizType {
    Bar,
    Pie,
    Line,
    #[default]
    Table,
    Kpi,
    Geomap,
    Heatmap,
    Treemap,
    Scatter,
    Bubble,
    Radar,
    Funnel,
    TextSummary,
}

impl VizType {
    /// Folds the spellings the model is offered onto one tag. Returns `None`
    /// for anything outside the vocabulary.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .trim()
            .to_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let viz = match normalized.as_str() {
            "bar" | "bar chart" => VizType::Bar,
            "pie" | "pie chart" => VizType::Pie,
            "line" | "line chart" => VizType::Line,
            "table" => VizType::Table,
            "kpi" => VizType::Kpi,
            "map" | "geo map" | "geomap" => VizType::Geomap,
            "heatmap" | "heat map" => VizType::Heatmap,
            "hierarchical" | "treemap" | "tree map" => VizType::Treemap,
            "scatter" | "scatter plot" => VizType::Scatter,
            "bubble" | "bubble chart" => VizType::Bubble,
            "radar" => VizType::Radar,
            "funnel" => VizType::Funnel,
            "text summary" | "summary" | "text" => VizType::TextSummary,
            _ => return None,
        };
        Some(viz)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VizType::Bar => "bar",
            VizType::Pie => "pie",
            VizType::Line => "line",
            VizType::Table => "table",
            VizType::Kpi => "kpi",
            VizType::Geomap => "geomap",
            VizType::Heatmap => "heatmap",
            VizType::Treemap => "treemap",
            VizType::Scatter => "scatter",
            VizType::Bubble => "bubble",
            VizType::Radar => "radar",
            VizType::Funnel => "funnel",
            VizType::TextSummary => "text-summary",
        }
    }
}

impl fmt::Display for VizType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag found in a model reply, if it names a known chart.
pub fn viz_from_response(text: &str) -> Option<VizType> {
    parser::extract_viz(text).and_then(|raw| VizType::parse(&raw))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationDecision {
    pub viz_type: VizType,
    pub explanation: String,
}

/// Second model pass: picks a chart for rows that were already fetched.
pub struct VizClassifier {
    llm: Arc<LlmManager>,
}

impl VizClassifier {
    pub fn new(llm: Arc<LlmManager>) -> Self {
        Self { llm }
    }

    /// Unknown or missing tags fall back to `fallback` (the tag from the
    /// first model call, if any), then to `table`.
    pub async fn classify(
        &self,
        utterance: &str,
        sql: &str,
        schema: &SchemaDescription,
        result: &ExecutionResult,
        fallback: Option<VizType>,
    ) -> Result<VisualizationDecision, LlmError> {
        let prompt = prompts::viz_prompt(utterance, sql, schema, result.sample(SAMPLE_ROWS));
        let text = self.llm.complete(&prompt).await?;
        debug!("Visualization response: {}", text);

        let viz_type = match viz_from_response(&text) {
            Some(viz) => viz,
            None => {
                info!("No usable viz tag in classifier response, falling back");
                fallback.unwrap_or_default()
            }
        };

        Ok(VisualizationDecision {
            viz_type,
            explanation: text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_offered_aliases() {
        assert_eq!(VizType::parse("KPI"), Some(VizType::Kpi));
        assert_eq!(VizType::parse("geo map"), Some(VizType::Geomap));
        assert_eq!(VizType::parse("map"), Some(VizType::Geomap));
        assert_eq!(VizType::parse("hierarchical"), Some(VizType::Treemap));
        assert_eq!(VizType::parse("text summary"), Some(VizType::TextSummary));
        assert_eq!(VizType::parse("Text_Summary"), Some(VizType::TextSummary));
        assert_eq!(VizType::parse("  Bar \n"), Some(VizType::Bar));
    }

    #[test]
    fn parse_rejects_unknown_tags() {
        assert_eq!(VizType::parse("sankey"), None);
        assert_eq!(VizType::parse(""), None);
    }

    #[test]
    fn serializes_to_canonical_tags() {
        assert_eq!(serde_json::to_string(&VizType::TextSummary).unwrap(), "\"text-summary\"");
        assert_eq!(serde_json::to_string(&VizType::Kpi).unwrap(), "\"kpi\"");
        for viz in [VizType::Geomap, VizType::Treemap, VizType::Bar] {
            assert_eq!(serde_json::to_value(viz).unwrap(), viz.as_str());
        }
    }

    #[test]
    fn default_is_table() {
        assert_eq!(VizType::default(), VizType::Table);
    }

    #[test]
    fn response_without_known_tag_has_no_viz() {
        assert_eq!(viz_from_response("```viz\nsankey\n```"), None);
        assert_eq!(viz_from_response("just use a table"), None);
        assert_eq!(viz_from_response("```viz\nPie\n```\nShares of a whole."), Some(VizType::Pie));
    }
}
