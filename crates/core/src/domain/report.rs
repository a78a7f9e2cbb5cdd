use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    #[serde(default)]
    pub total_changes: u32,
    #[serde(default)]
    pub overall_risk: RiskLevel,
    #[serde(default)]
    pub key_takeaways: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalChange {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub affected_routes: Vec<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteImpact {
    pub route_name: String,
    pub impact_description: String,
    #[serde(default)]
    pub severity: RiskLevel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedAction {
    pub action: String,
    #[serde(default)]
    pub priority: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_change: Option<String>,
}

/// Structured body of a compliance report. Every section carries a serde
/// default so a partially-formed model response still deserializes; a
/// response that fails to parse at all is replaced by [`ReportContent::fallback`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportContent {
    #[serde(default)]
    pub summary: ReportSummary,
    #[serde(default)]
    pub legal_changes: Vec<LegalChange>,
    #[serde(default)]
    pub route_impacts: Vec<RouteImpact>,
    #[serde(default)]
    pub recommended_actions: Vec<RecommendedAction>,
}

impl ReportContent {
    /// Minimal valid content used when a model response cannot be parsed.
    /// The run keeps moving; the validator decides whether this placeholder
    /// survives.
    pub fn fallback() -> Self {
        Self {
            summary: ReportSummary {
                total_changes: 0,
                overall_risk: RiskLevel::Medium,
                key_takeaways: vec!["Report generation in progress".to_string()],
            },
            legal_changes: Vec::new(),
            route_impacts: Vec::new(),
            recommended_actions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ReportContent, RiskLevel};

    #[test]
    fn missing_sections_deserialize_to_defaults() {
        let content: ReportContent = serde_json::from_str(
            r#"{"summary": {"total_changes": 2, "overall_risk": "high", "key_takeaways": ["Two new rules"]}}"#,
        )
        .expect("partial content should parse");

        assert_eq!(content.summary.total_changes, 2);
        assert_eq!(content.summary.overall_risk, RiskLevel::High);
        assert!(content.legal_changes.is_empty());
        assert!(content.route_impacts.is_empty());
    }

    #[test]
    fn risk_levels_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&RiskLevel::Critical).expect("serialize"), "\"critical\"");
        assert_eq!(serde_json::to_string(&RiskLevel::Low).expect("serialize"), "\"low\"");
    }

    #[test]
    fn fallback_is_a_valid_medium_risk_placeholder() {
        let fallback = ReportContent::fallback();
        assert_eq!(fallback.summary.overall_risk, RiskLevel::Medium);
        assert_eq!(fallback.summary.key_takeaways, vec!["Report generation in progress"]);
        assert!(fallback.legal_changes.is_empty());
    }
}
