use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use routewatch_core::{ChatMessage, ChatRole, Report, ReportId};
use routewatch_db::repositories::{ChatRepository, ReportRepository, RepositoryError};

use crate::llm::{parse_string_list, LlmClient, LlmRequest};

const ANSWER_TOKENS: u32 = 2000;
const SUGGEST_TOKENS: u32 = 500;

/// How many trailing messages of a thread ride along in the prompt.
const HISTORY_WINDOW: usize = 5;
const SUGGESTION_CAP: usize = 5;

/// Fixed answer returned when the model cannot be reached. The exchange is
/// still persisted so the thread reflects what the user actually saw.
pub const CHAT_FALLBACK_ANSWER: &str =
    "I apologize, but I encountered an error while processing your question.";

/// Openers offered before a thread has any messages.
const DEFAULT_SUGGESTIONS: [&str; 5] = [
    "What are the main compliance risks in this report?",
    "Which of my routes are most affected?",
    "What actions should I prioritize?",
    "Are there any upcoming deadlines I need to know about?",
    "What changes affect hazardous cargo transport?",
];

/// Offered when follow-up generation fails mid-thread.
const FOLLOW_UP_FALLBACK: [&str; 3] = [
    "Can you tell me more about this?",
    "What are the next steps?",
    "How does this affect my operations?",
];

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("report {0} not found")]
    ReportNotFound(ReportId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Per-report Q&A over a stored report. Answers are grounded in the report
/// content (which carries its cited sources) plus the tail of the thread.
/// A dead LLM degrades to [`CHAT_FALLBACK_ANSWER`]; a missing report is the
/// one hard error.
pub struct ChatService {
    llm: Arc<dyn LlmClient>,
    reports: Arc<dyn ReportRepository>,
    chats: Arc<dyn ChatRepository>,
}

impl ChatService {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        reports: Arc<dyn ReportRepository>,
        chats: Arc<dyn ChatRepository>,
    ) -> Self {
        Self { llm, reports, chats }
    }

    /// Answers one question and persists both sides of the exchange.
    pub async fn send_message(
        &self,
        report_id: &ReportId,
        question: &str,
    ) -> Result<ChatMessage, ChatError> {
        let report = self.require_report(report_id).await?;
        let history = self.chats.history(report_id).await?;

        let answer = match answer_prompt(&report, &history, question) {
            Ok(prompt) => {
                match self
                    .llm
                    .complete(LlmRequest {
                        operation: "answer_question",
                        prompt,
                        max_tokens: ANSWER_TOKENS,
                    })
                    .await
                {
                    Ok(raw) => raw.trim().to_string(),
                    Err(error) => {
                        warn!(report_id = %report_id, error = %error, "answer call failed; using fallback answer");
                        CHAT_FALLBACK_ANSWER.to_string()
                    }
                }
            }
            Err(error) => {
                warn!(report_id = %report_id, error = %error, "answer prompt assembly failed; using fallback answer");
                CHAT_FALLBACK_ANSWER.to_string()
            }
        };

        let user_message = ChatMessage {
            role: ChatRole::User,
            content: question.to_string(),
            created_at: Utc::now(),
        };
        let assistant_message =
            ChatMessage { role: ChatRole::Assistant, content: answer, created_at: Utc::now() };

        self.chats.append(report_id, &user_message).await?;
        self.chats.append(report_id, &assistant_message).await?;

        info!(report_id = %report_id, "chat exchange recorded");
        Ok(assistant_message)
    }

    pub async fn history(&self, report_id: &ReportId) -> Result<Vec<ChatMessage>, ChatError> {
        self.require_report(report_id).await?;
        Ok(self.chats.history(report_id).await?)
    }

    /// Clears a thread and returns how many messages were removed.
    pub async fn clear(&self, report_id: &ReportId) -> Result<u64, ChatError> {
        self.require_report(report_id).await?;
        Ok(self.chats.clear(report_id).await?)
    }

    /// Suggested questions for the thread. Fresh threads get the static
    /// openers; established threads get model-generated follow-ups, falling
    /// back to a static set when the model cannot help.
    pub async fn suggestions(&self, report_id: &ReportId) -> Result<Vec<String>, ChatError> {
        let report = self.require_report(report_id).await?;
        let history = self.chats.history(report_id).await?;

        if history.is_empty() {
            return Ok(DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect());
        }

        let prompt = match suggestion_prompt(&report, &history) {
            Ok(prompt) => prompt,
            Err(error) => {
                warn!(report_id = %report_id, error = %error, "suggestion prompt assembly failed");
                return Ok(follow_up_fallback());
            }
        };

        let response = self
            .llm
            .complete(LlmRequest {
                operation: "suggest_questions",
                prompt,
                max_tokens: SUGGEST_TOKENS,
            })
            .await;

        match response {
            Ok(raw) => match parse_string_list(&raw).filter(|questions| !questions.is_empty()) {
                Some(mut questions) => {
                    questions.truncate(SUGGESTION_CAP);
                    Ok(questions)
                }
                None => {
                    warn!(report_id = %report_id, "suggestion reply was unusable");
                    Ok(follow_up_fallback())
                }
            },
            Err(error) => {
                warn!(report_id = %report_id, error = %error, "suggestion call failed");
                Ok(follow_up_fallback())
            }
        }
    }

    async fn require_report(&self, report_id: &ReportId) -> Result<Report, ChatError> {
        self.reports
            .find_by_id(report_id)
            .await?
            .ok_or(ChatError::ReportNotFound(*report_id))
    }
}

fn follow_up_fallback() -> Vec<String> {
    FOLLOW_UP_FALLBACK.iter().map(|s| s.to_string()).collect()
}

fn history_section(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let tail = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    let mut section = String::from("# Previous Conversation:\n");
    for message in tail {
        section.push_str(&format!(
            "{}: {}\n",
            message.role.as_str().to_uppercase(),
            message.content
        ));
    }
    section
}

fn report_section(report: &Report) -> serde_json::Result<String> {
    match &report.content {
        Some(content) => serde_json::to_string_pretty(content),
        None => Ok(format!(
            "No report content is available. The run for {} finished with status `{}`.",
            report.company_name,
            report.status.as_str()
        )),
    }
}

fn answer_prompt(
    report: &Report,
    history: &[ChatMessage],
    question: &str,
) -> serde_json::Result<String> {
    Ok(format!(
        "You are a helpful assistant answering questions about a logistics compliance report \
         for {company}.\n\n\
         {history}\n\
         # Report Content:\n{report}\n\n\
         # User Question:\n{question}\n\n\
         # Instructions:\n\
         1. Answer the question based ONLY on the report content provided above\n\
         2. Be specific and cite source URLs from the report when possible\n\
         3. If the report does not contain enough information, say so\n\
         4. Use bullet points for clarity when appropriate\n\
         5. Be concise but thorough\n\n\
         Provide your answer below:",
        company = report.company_name,
        history = history_section(history),
        report = report_section(report)?,
    ))
}

fn suggestion_prompt(report: &Report, history: &[ChatMessage]) -> serde_json::Result<String> {
    Ok(format!(
        "Based on this conversation about a logistics compliance report, suggest 3 relevant \
         follow-up questions the user might want to ask.\n\n\
         {history}\n\
         # Report Content:\n{report}\n\n\
         Generate questions that:\n\
         1. Dive deeper into topics already discussed\n\
         2. Explore related compliance issues\n\
         3. Ask about specific actions or deadlines\n\
         4. Clarify risk levels or impacts\n\n\
         Return ONLY a JSON array of question strings:\n\
         [\"question 1\", \"question 2\", \"question 3\"]",
        history = history_section(history),
        report = report_section(report)?,
    ))
}
