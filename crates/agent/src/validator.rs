use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use routewatch_core::{CompanyProfile, EvidenceItem, ReportContent, ValidationVerdict};

use crate::llm::{strip_code_fences, LlmClient, LlmRequest};

const VALIDATE_TOKENS: u32 = 1500;

/// How many evidence items ride along in the judge prompt. Bounds prompt
/// size; the judge sees the head of the ranked evidence, not all of it.
pub const EVIDENCE_SAMPLE: usize = 5;

/// Third pipeline stage: asks a judge model whether a draft meets quality
/// standards. Deliberately fail-open — a broken judge must never wedge the
/// pipeline, so every internal failure turns into an approving verdict
/// ([`ValidationVerdict::lenient_pass`] on parse trouble,
/// [`ValidationVerdict::error_pass`] on transport trouble) and the review
/// method is infallible by signature.
pub struct ReportValidator {
    llm: Arc<dyn LlmClient>,
    approval_threshold: u8,
}

impl ReportValidator {
    pub fn new(llm: Arc<dyn LlmClient>, approval_threshold: u8) -> Self {
        Self { llm, approval_threshold: approval_threshold.min(100) }
    }

    pub async fn review(
        &self,
        draft: &ReportContent,
        profile: &CompanyProfile,
        evidence: &[EvidenceItem],
    ) -> ValidationVerdict {
        let sample = &evidence[..evidence.len().min(EVIDENCE_SAMPLE)];
        let prompt = match review_prompt(draft, profile, sample, self.approval_threshold) {
            Ok(prompt) => prompt,
            Err(error) => {
                warn!(error = %error, "validator prompt assembly failed; passing the draft");
                return ValidationVerdict::error_pass();
            }
        };

        let raw = match self
            .llm
            .complete(LlmRequest { operation: "validate_report", prompt, max_tokens: VALIDATE_TOKENS })
            .await
        {
            Ok(raw) => raw,
            Err(error) => {
                warn!(error = %error, "validation call failed; passing the draft");
                return ValidationVerdict::error_pass();
            }
        };

        let verdict = parse_verdict(&raw);
        info!(
            approved = verdict.is_approved,
            score = verdict.quality_score,
            issues = verdict.issues.len(),
            "validation verdict"
        );
        verdict
    }
}

/// Raw judge reply. Every field is optional so a half-formed object still
/// yields a verdict; a reply that is not an object at all passes leniently.
#[derive(Deserialize)]
struct RawVerdict {
    #[serde(default)]
    is_approved: bool,
    #[serde(default)]
    quality_score: i64,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    issues: Vec<String>,
}

fn parse_verdict(raw: &str) -> ValidationVerdict {
    let body = strip_code_fences(raw);
    match serde_json::from_str::<RawVerdict>(body) {
        Ok(parsed) => ValidationVerdict {
            is_approved: parsed.is_approved,
            quality_score: parsed.quality_score.clamp(0, 100) as u8,
            feedback: parsed
                .feedback
                .filter(|feedback| !feedback.trim().is_empty())
                .unwrap_or_else(|| "Validation incomplete".to_string()),
            issues: parsed.issues,
        },
        Err(error) => {
            warn!(error = %error, "verdict did not parse; approving by default");
            ValidationVerdict::lenient_pass()
        }
    }
}

fn review_prompt(
    draft: &ReportContent,
    profile: &CompanyProfile,
    evidence: &[EvidenceItem],
    threshold: u8,
) -> serde_json::Result<String> {
    let profile_json = serde_json::to_string_pretty(profile)?;
    let draft_json = serde_json::to_string_pretty(draft)?;
    let evidence_json = serde_json::to_string_pretty(evidence)?;

    Ok(format!(
        "You are a quality assurance expert for logistics compliance reports. Review this \
         report and determine if it meets quality standards.\n\n\
         Company Profile:\n{profile_json}\n\n\
         Generated Report:\n{draft_json}\n\n\
         Search Results Used:\n{evidence_json}\n\n\
         Evaluate the report based on these criteria:\n\
         1. **Structure**: Is the structure valid and complete with all required sections?\n\
         2. **Relevance**: Does it focus on this specific company's operations, routes, and cargo types?\n\
         3. **Actionability**: Are recommendations specific and implementable?\n\
         4. **Risk Assessment**: Are risk levels appropriate for the scenarios described?\n\
         5. **Professionalism**: Is the content well-written and professional?\n\
         6. **Usefulness**: Would this report provide value to the company even with limited data sources?\n\n\
         IMPORTANT GUIDELINES:\n\
         - Accept reports that acknowledge data limitations transparently\n\
         - Accept reports with empty legal_changes if they provide relevant recommendations\n\
         - Do not penalize heavily for lack of source URLs if search results were limited\n\
         - Focus on whether the report is USEFUL and RELEVANT to the company\n\
         - Value quality of analysis over quantity of sources\n\n\
         Return your evaluation as JSON in this exact format:\n\
         {{\n\
           \"is_approved\": true/false,\n\
           \"quality_score\": <number 0-100>,\n\
           \"feedback\": \"Detailed feedback if not approved, or 'Report meets quality standards' if approved\",\n\
           \"issues\": [\"issue 1\", \"issue 2\"] or []\n\
         }}\n\n\
         Standards:\n\
         - Approve if quality_score >= {threshold}\n\
         - Reject only if quality_score < {threshold}\n\
         - Be constructive and generous in feedback\n\
         - Prioritize usefulness over perfection\n\n\
         Return ONLY valid JSON, no other text."
    ))
}
