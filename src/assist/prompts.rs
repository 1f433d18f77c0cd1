//! Fixed prompt templates for the assist actions.

use serde::{Deserialize, Serialize};

use super::{ChatTurn, GenerationRequest, TurnRole};
use crate::error::LlmError;

/// Upper bound on caller-supplied text per request, in bytes.
const MAX_INPUT_BYTES: usize = 32 * 1024;

/// Which template a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistAction {
    SummarizeSermon,
    Devotional,
    StudyPlan,
    ExplainPassage,
    Prayer,
    Chat,
}

impl AssistAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SummarizeSermon => "summarize_sermon",
            Self::Devotional => "devotional",
            Self::StudyPlan => "study_plan",
            Self::ExplainPassage => "explain_passage",
            Self::Prayer => "prayer",
            Self::Chat => "chat",
        }
    }
}

impl std::fmt::Display for AssistAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const SYSTEM_PROMPT: &str = "\
You are the Lifepoint assistant, helping members of a church community with \
sermons, devotions, Bible study and prayer.
Guidelines:
- Be warm, encouraging and respectful of every tradition.
- Quote scripture accurately and name the reference (book chapter:verse).
- Keep answers focused; use short paragraphs or bullet points.
- If you are unsure about a fact, say so rather than guessing.";

fn template(action: AssistAction) -> &'static str {
    match action {
        AssistAction::SummarizeSermon => "\
Summarize the following sermon for someone who missed the service.
Give the main theme in one sentence, then 3-5 key points with the scripture \
each point draws on, then one practical application for the week.",

        AssistAction::Devotional => "\
Write a short daily devotional (about 250 words) on the following passage or theme.
Open with the key verse, reflect on its meaning for everyday life, and close \
with a one-sentence prayer.",

        AssistAction::StudyPlan => "\
Create a Bible study plan for the following topic or book.
Lay it out day by day: a reading for each day, one discussion question, and a \
short note on what to look for. Default to 7 days unless asked otherwise.",

        AssistAction::ExplainPassage => "\
Explain the following Bible passage.
Cover its historical and literary context, what it meant to its first readers, \
and how it is commonly applied today. Note any well-known differences in interpretation.",

        AssistAction::Prayer => "\
Write a heartfelt prayer about the following request.
Keep it personal and sincere, around 120 words.",

        AssistAction::Chat => "",
    }
}

fn check_len(field: &str, text: &str) -> Result<(), LlmError> {
    if text.len() > MAX_INPUT_BYTES {
        return Err(LlmError::InvalidRequest(format!(
            "{field} exceeds {MAX_INPUT_BYTES} bytes"
        )));
    }
    Ok(())
}

/// Render a single-turn request for a template action.
pub fn render(
    action: AssistAction,
    content: &str,
    context: Option<&str>,
) -> Result<GenerationRequest, LlmError> {
    if action == AssistAction::Chat {
        return Err(LlmError::InvalidRequest(
            "chat takes a message transcript, not content".to_string(),
        ));
    }
    let content = content.trim();
    if content.is_empty() {
        return Err(LlmError::InvalidRequest("content is required".to_string()));
    }
    check_len("content", content)?;

    let mut prompt = format!("{}\n\n---\n{content}\n---", template(action));
    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        check_len("context", context)?;
        prompt.push_str(&format!("\n\nAdditional context from the user:\n{context}"));
    }

    Ok(GenerationRequest {
        system: Some(SYSTEM_PROMPT.to_string()),
        turns: vec![ChatTurn {
            role: TurnRole::User,
            text: prompt,
        }],
    })
}

/// Render a multi-turn chat. The transcript must end with a user turn.
pub fn render_chat(
    messages: &[ChatTurn],
    context: Option<&str>,
) -> Result<GenerationRequest, LlmError> {
    let turns: Vec<ChatTurn> = messages
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .cloned()
        .collect();
    match turns.last() {
        Some(last) if last.role == TurnRole::User => {}
        Some(_) => {
            return Err(LlmError::InvalidRequest(
                "chat transcript must end with a user message".to_string(),
            ));
        }
        None => return Err(LlmError::InvalidRequest("messages are required".to_string())),
    }
    let total: usize = turns.iter().map(|t| t.text.len()).sum();
    if total > MAX_INPUT_BYTES {
        return Err(LlmError::InvalidRequest(format!(
            "messages exceed {MAX_INPUT_BYTES} bytes"
        )));
    }

    let mut system = SYSTEM_PROMPT.to_string();
    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        check_len("context", context)?;
        system.push_str(&format!("\n\nContext for this conversation:\n{context}"));
    }

    Ok(GenerationRequest {
        system: Some(system),
        turns,
    })
}
