//! Core types for assistant requests and responses

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest message the server accepts, in characters
pub const MAX_MESSAGE_CHARS: usize = 2048;

/// Longest history item content the server accepts, in characters
pub const MAX_HISTORY_CONTENT_CHARS: usize = 2048;

/// Most history items the server accepts in one request
pub const MAX_HISTORY_ITEMS: usize = 20;

/// Conversation roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// What the assistant is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantMode {
    /// Answer a question about the user's books
    #[default]
    Chat,
    /// Summarise recent bookkeeping activity
    Summary,
}

impl AssistantMode {
    /// Parse a mode name; an empty name means chat
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "" | "chat" => Ok(AssistantMode::Chat),
            "summary" => Ok(AssistantMode::Summary),
            other => Err(Error::InvalidRequest(format!(
                "mode for ai assistant is invalid: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantMode::Chat => "chat",
            AssistantMode::Summary => "summary",
        }
    }
}

/// One prior conversation turn sent as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub role: Role,
    pub content: String,
}

impl HistoryItem {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Chat or summary request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub mode: AssistantMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryItem>>,
}

impl ChatRequest {
    /// Create a chat request carrying the new message and prior context
    pub fn chat(message: impl Into<String>, history: Vec<HistoryItem>) -> Self {
        Self {
            mode: AssistantMode::Chat,
            message: Some(message.into()),
            history: Some(history),
        }
    }

    /// Create a summary request over prior context
    pub fn summary(history: Vec<HistoryItem>) -> Self {
        Self {
            mode: AssistantMode::Summary,
            message: None,
            history: Some(history),
        }
    }

    /// Trim history so it fits the server's binding limits.
    ///
    /// Keeps the most recent items and shortens over-long contents on char
    /// boundaries. The message itself is left alone; see [`validate`](Self::validate).
    pub fn fit_to_limits(mut self) -> Self {
        if let Some(history) = self.history.as_mut() {
            if history.len() > MAX_HISTORY_ITEMS {
                history.drain(..history.len() - MAX_HISTORY_ITEMS);
            }
            for item in history.iter_mut() {
                if let Some((idx, _)) = item.content.char_indices().nth(MAX_HISTORY_CONTENT_CHARS) {
                    item.content.truncate(idx);
                }
            }
        }
        self
    }

    /// Reject requests the server would refuse
    pub fn validate(&self) -> Result<()> {
        let message = self.message.as_deref().unwrap_or("");

        if self.mode == AssistantMode::Chat && message.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "message for ai assistant is empty".to_string(),
            ));
        }

        let chars = message.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            return Err(Error::InvalidRequest(format!(
                "message is {} characters, limit is {}",
                chars, MAX_MESSAGE_CHARS
            )));
        }

        if let Some(history) = &self.history {
            if history.len() > MAX_HISTORY_ITEMS {
                return Err(Error::InvalidRequest(format!(
                    "{} history items, limit is {}",
                    history.len(),
                    MAX_HISTORY_ITEMS
                )));
            }
        }

        Ok(())
    }
}

/// Non-streaming assistant response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub mode: AssistantMode,
    #[serde(default)]
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<ReferencedTransaction>>,
}

/// Kind of a referenced transaction, numeric on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum TransactionType {
    ModifyBalance,
    Income,
    Expense,
    Transfer,
    Other(u8),
}

impl From<u8> for TransactionType {
    fn from(value: u8) -> Self {
        match value {
            1 => TransactionType::ModifyBalance,
            2 => TransactionType::Income,
            3 => TransactionType::Expense,
            4 => TransactionType::Transfer,
            other => TransactionType::Other(other),
        }
    }
}

impl From<TransactionType> for u8 {
    fn from(value: TransactionType) -> Self {
        match value {
            TransactionType::ModifyBalance => 1,
            TransactionType::Income => 2,
            TransactionType::Expense => 3,
            TransactionType::Transfer => 4,
            TransactionType::Other(other) => other,
        }
    }
}

impl TransactionType {
    /// Short label, matching how the server describes transactions to the model
    pub fn label(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
            TransactionType::Transfer => "transfer",
            TransactionType::ModifyBalance | TransactionType::Other(_) => "unknown",
        }
    }
}

/// A transaction the assistant cited in its reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencedTransaction {
    pub id: String,
    /// Unix seconds
    pub time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_text: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_account_name: Option<String>,
    /// Minor currency units
    pub source_amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
}

impl ReferencedTransaction {
    /// Source amount as a decimal string, suffixed with the currency when known
    pub fn amount_text(&self) -> String {
        let sign = if self.source_amount < 0 { "-" } else { "" };
        let abs = self.source_amount.unsigned_abs();
        let amount = format!("{}{}.{:02}", sign, abs / 100, abs % 100);
        match self.currency.as_deref() {
            Some(currency) if !currency.is_empty() => format!("{} {}", amount, currency),
            _ => amount,
        }
    }
}
