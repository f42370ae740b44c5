//! Answer records and their on-disk formats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AppError, AppResult};
use crate::planner::QuestionType;
use crate::retrieval::RetrievedDocument;
use crate::validation::ReasoningStep;

/// Confidence above which an answer is considered validated.
pub const VALIDATED_THRESHOLD: f64 = 0.7;

const AGENT_VERSION: &str = concat!("multihop-reasoning v", env!("CARGO_PKG_VERSION"));

/// Answer category derived from the question type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    /// Entity identification.
    Entity,
    /// Fact retrieval.
    Fact,
    /// Causal reasoning.
    Causal,
    /// Anything else.
    General,
    /// The pipeline failed.
    Error,
}

impl From<QuestionType> for AnswerType {
    fn from(question_type: QuestionType) -> Self {
        match question_type {
            QuestionType::EntityIdentification => Self::Entity,
            QuestionType::FactRetrieval => Self::Fact,
            QuestionType::CausalReasoning => Self::Causal,
            QuestionType::General => Self::General,
        }
    }
}

/// Review state derived from confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Confidence above [`VALIDATED_THRESHOLD`].
    Validated,
    /// Everything else.
    NeedsReview,
}

impl ValidationStatus {
    /// `Validated` iff `confidence > 0.7`.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > VALIDATED_THRESHOLD {
            Self::Validated
        } else {
            Self::NeedsReview
        }
    }
}

/// Structured answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Caller-supplied question id.
    pub question_id: String,
    /// Answer text; empty when nothing was found.
    pub answer: String,
    /// Answer category.
    pub answer_type: AnswerType,
    /// Reasoning confidence times validation confidence.
    pub confidence: f64,
    /// Top deduplicated documents, best first.
    #[serde(default)]
    pub evidence: Vec<RetrievedDocument>,
    /// `[reasoning, validation]` for synthesized answers; empty on error.
    #[serde(default)]
    pub reasoning_steps: Vec<ReasoningStep>,
    /// Derived from `confidence`.
    pub validation_status: ValidationStatus,
    /// Creation time (RFC 3339).
    pub generated_at: DateTime<Utc>,
    /// Wall-clock time spent on the question.
    #[serde(default)]
    pub processing_time_ms: u64,
    /// Failure message for `error` answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Answer {
    /// Degraded answer for a failed question.
    pub fn from_error(question_id: impl Into<String>, error: &AppError) -> Self {
        Self {
            question_id: question_id.into(),
            answer: format!("Error: {}", error),
            answer_type: AnswerType::Error,
            confidence: 0.0,
            evidence: Vec::new(),
            reasoning_steps: Vec::new(),
            validation_status: ValidationStatus::NeedsReview,
            generated_at: Utc::now(),
            processing_time_ms: 0,
            error: Some(error.to_string()),
        }
    }

    /// Whether the answer should be produced again by a refill run.
    pub fn needs_refill(&self) -> bool {
        self.answer.trim().is_empty() || self.answer_type == AnswerType::Error
    }
}

/// Metadata attached to a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    /// Producing crate and version.
    pub agent_version: String,
    /// Rankers used to gather evidence.
    pub retrieval_methods: Vec<String>,
}

/// A batch of answers ready to hand in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// When the submission was assembled.
    pub submission_time: DateTime<Utc>,
    /// Number of answers.
    pub total_questions: usize,
    /// Answers in input order.
    pub answers: Vec<Answer>,
    /// Producer metadata.
    pub metadata: SubmissionMetadata,
}

impl Submission {
    /// Bundle answers with submission metadata.
    pub fn from_answers(answers: Vec<Answer>, retrieval_methods: Vec<String>) -> Self {
        Self {
            submission_time: Utc::now(),
            total_questions: answers.len(),
            answers,
            metadata: SubmissionMetadata {
                agent_version: AGENT_VERSION.to_string(),
                retrieval_methods,
            },
        }
    }
}

/// One batch input line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionInput {
    /// Question id.
    pub id: String,
    /// Question text.
    pub question: String,
}

/// Write answers as a pretty-printed JSON array.
pub fn write_answers(path: &Path, answers: &[Answer]) -> AppResult<()> {
    let json = serde_json::to_string_pretty(answers)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Write a [`Submission`] as pretty-printed JSON.
pub fn write_submission(path: &Path, submission: &Submission) -> AppResult<()> {
    let json = serde_json::to_string_pretty(submission)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read answers from a JSON array, a [`Submission`] or JSON lines.
pub fn read_answers(path: &Path) -> AppResult<Vec<Answer>> {
    let data = std::fs::read_to_string(path)?;
    let trimmed = data.trim_start();

    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    if let Ok(submission) = serde_json::from_str::<Submission>(trimmed) {
        return Ok(submission.answers);
    }
    parse_json_lines(&data)
}

/// Read batch questions from JSON lines of `{ "id", "question" }`.
pub fn load_questions(path: &Path) -> AppResult<Vec<QuestionInput>> {
    let data = std::fs::read_to_string(path)?;
    parse_json_lines(&data)
}

/// Read a corpus: a JSON array of strings, or JSON lines of `{ "content" }`.
pub fn load_corpus(path: &Path) -> AppResult<Vec<String>> {
    #[derive(Deserialize)]
    struct CorpusLine {
        content: String,
    }

    let data = std::fs::read_to_string(path)?;
    if data.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(&data)?);
    }
    let lines: Vec<CorpusLine> = parse_json_lines(&data)?;
    Ok(lines.into_iter().map(|l| l.content).collect())
}

fn parse_json_lines<T: serde::de::DeserializeOwned>(data: &str) -> AppResult<Vec<T>> {
    data.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| AppError::Validation {
                field: format!("line {}", i + 1),
                reason: e.to_string(),
            })
        })
        .collect()
}
