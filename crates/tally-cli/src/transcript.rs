//! Saved conversations, one JSONL file per transcript

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tally_assistant::ConversationMessage;

/// Line types in a transcript file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    /// Always the first line
    Metadata {
        id: String,
        created_at: i64,
        base_url: String,
    },
    Message { message: ConversationMessage },
}

/// A transcript on disk.
///
/// Streaming patches the last message many times, so the file is rewritten
/// whole after each exchange rather than appended to.
pub struct Transcript {
    id: String,
    path: PathBuf,
    created_at: i64,
    base_url: String,
}

impl Transcript {
    /// Get the transcripts directory
    pub fn transcripts_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tally")
            .join("transcripts")
    }

    /// Start a new, empty transcript in the default directory
    pub fn create(base_url: &str) -> std::io::Result<Self> {
        Self::create_in(&Self::transcripts_dir(), base_url)
    }

    pub fn create_in(dir: &Path, base_url: &str) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let id = uuid::Uuid::new_v4().to_string();
        let transcript = Self {
            path: dir.join(format!("{}.jsonl", id)),
            id,
            created_at: chrono::Utc::now().timestamp_millis(),
            base_url: base_url.to_string(),
        };
        transcript.save(&[])?;
        Ok(transcript)
    }

    /// Load a transcript from the default directory
    pub fn load(id: &str) -> std::io::Result<(Self, Vec<ConversationMessage>)> {
        Self::load_from(&Self::transcripts_dir(), id)
    }

    pub fn load_from(dir: &Path, id: &str) -> std::io::Result<(Self, Vec<ConversationMessage>)> {
        let id = uuid::Uuid::parse_str(id)
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("Invalid transcript ID: {}", id),
                )
            })?
            .to_string();
        let id = id.as_str();
        let path = dir.join(format!("{}.jsonl", id));
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Transcript not found: {}", id),
            ));
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut created_at = chrono::Utc::now().timestamp_millis();
        let mut base_url = String::new();
        let mut messages = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptEntry>(&line) {
                Ok(TranscriptEntry::Metadata {
                    created_at: at,
                    base_url: url,
                    ..
                }) => {
                    created_at = at;
                    base_url = url;
                }
                Ok(TranscriptEntry::Message { message }) => messages.push(message),
                Err(e) => tracing::warn!("skipping bad transcript line in {}: {}", id, e),
            }
        }

        Ok((
            Self {
                id: id.to_string(),
                path,
                created_at,
                base_url,
            },
            messages,
        ))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Replace the file contents with `messages`.
    ///
    /// The new contents go to a sibling temp file that is renamed over the
    /// transcript, so a failed write leaves the previous version intact.
    pub fn save(&self, messages: &[ConversationMessage]) -> std::io::Result<()> {
        let tmp_path = self.path.with_extension("jsonl.tmp");
        let result = self.write_to(&tmp_path, messages);
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
            return result;
        }
        fs::rename(&tmp_path, &self.path)
    }

    fn write_to(&self, path: &Path, messages: &[ConversationMessage]) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);

        let metadata = TranscriptEntry::Metadata {
            id: self.id.clone(),
            created_at: self.created_at,
            base_url: self.base_url.clone(),
        };
        writeln!(writer, "{}", serde_json::to_string(&metadata)?)?;

        for message in messages {
            let entry = TranscriptEntry::Message {
                message: message.clone(),
            };
            writeln!(writer, "{}", serde_json::to_string(&entry)?)?;
        }

        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// List transcripts in the default directory, newest first
    pub fn list() -> std::io::Result<Vec<TranscriptInfo>> {
        Self::list_in(&Self::transcripts_dir())
    }

    pub fn list_in(dir: &Path) -> std::io::Result<Vec<TranscriptInfo>> {
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut transcripts = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
                if let Some(info) = Self::read_info(&path) {
                    transcripts.push(info);
                }
            }
        }

        transcripts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transcripts)
    }

    fn read_info(path: &Path) -> Option<TranscriptInfo> {
        let reader = BufReader::new(File::open(path).ok()?);
        let mut lines = reader.lines().map_while(Result::ok);

        let TranscriptEntry::Metadata {
            id,
            created_at,
            base_url,
        } = serde_json::from_str(&lines.next()?).ok()?
        else {
            return None;
        };

        Some(TranscriptInfo {
            id,
            created_at,
            base_url,
            message_count: lines.filter(|l| !l.is_empty()).count(),
        })
    }
}

/// Summary of a saved transcript
#[derive(Debug, Clone)]
pub struct TranscriptInfo {
    pub id: String,
    pub created_at: i64,
    pub base_url: String,
    pub message_count: usize,
}

impl TranscriptInfo {
    /// Format the created_at timestamp for display
    pub fn created_at_display(&self) -> String {
        use chrono::{TimeZone, Utc};
        Utc.timestamp_millis_opt(self.created_at)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
