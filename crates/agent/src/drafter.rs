use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use routewatch_core::{CompanyProfile, EvidenceItem, ReportContent};

use crate::llm::{strip_code_fences, LlmClient, LlmRequest};

const COMPOSE_TOKENS: u32 = 4000;
const LOGGED_PREFIX_CHARS: usize = 200;

/// Second pipeline stage: turns profile + evidence (+ the previous verdict's
/// feedback, on revision rounds) into structured report content.
///
/// Malformed model output never escapes this stage: anything that fails to
/// parse becomes [`ReportContent::fallback`]. Transport errors do propagate;
/// the controller decides what a dead LLM means for the run.
pub struct ReportDrafter {
    llm: Arc<dyn LlmClient>,
}

impl ReportDrafter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn compose(
        &self,
        profile: &CompanyProfile,
        evidence: &[EvidenceItem],
        previous_feedback: Option<&str>,
    ) -> Result<ReportContent> {
        let prompt = compose_prompt(profile, evidence, previous_feedback)
            .context("assembling draft prompt")?;

        let raw = self
            .llm
            .complete(LlmRequest { operation: "compose_report", prompt, max_tokens: COMPOSE_TOKENS })
            .await?;

        Ok(parse_draft(&raw))
    }
}

fn parse_draft(raw: &str) -> ReportContent {
    let body = strip_code_fences(raw);
    match serde_json::from_str::<ReportContent>(body) {
        Ok(content) => {
            debug!(
                changes = content.legal_changes.len(),
                impacts = content.route_impacts.len(),
                "draft parsed"
            );
            content
        }
        Err(error) => {
            let prefix: String = body.chars().take(LOGGED_PREFIX_CHARS).collect();
            warn!(error = %error, prefix = %prefix, "draft did not parse; using fallback content");
            ReportContent::fallback()
        }
    }
}

fn compose_prompt(
    profile: &CompanyProfile,
    evidence: &[EvidenceItem],
    previous_feedback: Option<&str>,
) -> serde_json::Result<String> {
    let profile_json = serde_json::to_string_pretty(profile)?;
    let evidence_json = serde_json::to_string_pretty(evidence)?;

    let feedback_section = previous_feedback
        .map(|feedback| {
            format!(
                "\nIMPORTANT - Validator Feedback:\n\
                 The previous version of this report was rejected with the following feedback:\n\
                 {feedback}\n\n\
                 Please address these issues in this revised version.\n"
            )
        })
        .unwrap_or_default();

    Ok(format!(
        "You are a logistics compliance analyst. Create a comprehensive compliance report \
         covering regulatory and legal changes, border control updates, environmental rules, \
         and route-level operational impacts for the company below.\n\n\
         Company Profile:\n{profile_json}\n\n\
         Search Results (Legal & Regulatory Information):\n{evidence_json}\n\
         {feedback_section}\n\
         Create a detailed compliance report with the following structure (return as valid JSON):\n\n\
         {{\n\
           \"summary\": {{\n\
             \"total_changes\": <number>,\n\
             \"overall_risk\": \"critical|high|medium|low\",\n\
             \"key_takeaways\": [\"takeaway 1\", \"takeaway 2\"]\n\
           }},\n\
           \"legal_changes\": [\n\
             {{\n\
               \"title\": \"Change title\",\n\
               \"description\": \"Detailed description\",\n\
               \"effective_date\": \"YYYY-MM-DD or null\",\n\
               \"source_url\": \"https://...\",\n\
               \"affected_routes\": [\"Route name\"],\n\
               \"risk_level\": \"critical|high|medium|low\"\n\
             }}\n\
           ],\n\
           \"route_impacts\": [\n\
             {{\n\
               \"route_name\": \"Route name from company profile\",\n\
               \"impact_description\": \"How this route is affected\",\n\
               \"severity\": \"critical|high|medium|low\"\n\
             }}\n\
           ],\n\
           \"recommended_actions\": [\n\
             {{\n\
               \"action\": \"Specific action to take\",\n\
               \"priority\": \"critical|high|medium|low\",\n\
               \"deadline\": \"YYYY-MM-DD or null\",\n\
               \"related_change\": \"Change title or null\"\n\
             }}\n\
           ]\n\
         }}\n\n\
         Guidelines:\n\
         1. Be specific and actionable\n\
         2. Cite sources using the URLs from search results\n\
         3. Focus on changes that directly impact this company's operations\n\
         4. Prioritize by risk level\n\
         5. Ensure all dates are in YYYY-MM-DD format or null\n\n\
         Return ONLY valid JSON, no other text."
    ))
}
