//! Command-line front end for the pipeline.

use clap::Subcommand;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::error::AppResult;
use crate::pipeline::{
    load_corpus, load_questions, read_answers, write_answers, write_submission, AnswerType,
    MultiHopPipeline, Submission,
};

/// `multihop` subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Answer a single question and print the answer as JSON
    Ask {
        /// Question text
        question: String,

        /// Corpus file: JSON array of strings or JSON lines of {"content"}
        #[arg(long)]
        corpus: PathBuf,

        /// Question id recorded in the answer (random when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Answer every question in a JSON lines file
    Batch {
        /// Questions: JSON lines of {"id", "question"}
        #[arg(long)]
        input: PathBuf,

        /// Corpus file
        #[arg(long)]
        corpus: PathBuf,

        /// Where to write the answers
        #[arg(long)]
        output: PathBuf,

        /// Wrap answers in a submission envelope
        #[arg(long)]
        submission: bool,
    },

    /// Re-answer empty or failed answers from an earlier run
    Refill {
        /// Questions: JSON lines of {"id", "question"}
        #[arg(long)]
        input: PathBuf,

        /// Earlier answers file, updated in place unless --output is given
        #[arg(long)]
        answers: PathBuf,

        /// Corpus file
        #[arg(long)]
        corpus: PathBuf,

        /// Write refilled answers here instead
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute a CLI command.
pub async fn execute_command(command: Commands, config: &Config) -> CliResult {
    let result = match command {
        Commands::Ask {
            question,
            corpus,
            id,
        } => {
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            execute_ask(config, &corpus, &id, &question).await
        }
        Commands::Batch {
            input,
            corpus,
            output,
            submission,
        } => execute_batch(config, &input, &corpus, &output, submission).await,
        Commands::Refill {
            input,
            answers,
            corpus,
            output,
        } => {
            let output = output.unwrap_or_else(|| answers.clone());
            execute_refill(config, &input, &answers, &corpus, &output).await
        }
    };

    result.unwrap_or_else(|e| CliResult::error(format!("Error: {}", e)))
}

async fn open_pipeline(config: &Config, corpus: &Path) -> AppResult<MultiHopPipeline> {
    let documents = load_corpus(corpus)?;
    info!(path = %corpus.display(), documents = documents.len(), "Corpus loaded");
    MultiHopPipeline::from_config(config, documents).await
}

async fn execute_ask(
    config: &Config,
    corpus: &Path,
    id: &str,
    question: &str,
) -> AppResult<CliResult> {
    let pipeline = open_pipeline(config, corpus).await?;
    let answer = pipeline.process_question(id, question).await;
    let json = serde_json::to_string_pretty(&answer)?;

    Ok(if answer.answer_type == AnswerType::Error {
        CliResult::error(json)
    } else {
        CliResult::success(json)
    })
}

async fn execute_batch(
    config: &Config,
    input: &Path,
    corpus: &Path,
    output: &Path,
    submission: bool,
) -> AppResult<CliResult> {
    let questions = load_questions(input)?;
    let pipeline = open_pipeline(config, corpus).await?;
    let answers = pipeline.process_batch(&questions).await;

    let failed = answers
        .iter()
        .filter(|a| a.answer_type == AnswerType::Error)
        .count();
    let total = answers.len();

    if submission {
        let submission = Submission::from_answers(answers, pipeline.retrieval_methods());
        write_submission(output, &submission)?;
    } else {
        write_answers(output, &answers)?;
    }

    Ok(CliResult::success(format!(
        "Answered {} questions ({} failed), written to {}",
        total,
        failed,
        output.display()
    )))
}

async fn execute_refill(
    config: &Config,
    input: &Path,
    answers_path: &Path,
    corpus: &Path,
    output: &Path,
) -> AppResult<CliResult> {
    let questions = load_questions(input)?;
    let previous = read_answers(answers_path)?;
    let pending = previous.iter().filter(|a| a.needs_refill()).count();

    if pending == 0 {
        return Ok(CliResult::success("No empty or failed answers to refill"));
    }

    let pipeline = open_pipeline(config, corpus).await?;
    let answers = pipeline.refill(previous, &questions).await;
    let remaining = answers.iter().filter(|a| a.needs_refill()).count();
    write_answers(output, &answers)?;

    Ok(CliResult::success(format!(
        "Refilled {} answers ({} still empty or failed), written to {}",
        pending - remaining.min(pending),
        remaining,
        output.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use std::io::Write;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        Config {
            database: DatabaseConfig {
                path: dir.path().join("graph.db"),
                max_connections: 2,
            },
            ..Config::default()
        }
    }

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_ask_prints_answer_json() {
        let dir = TempDir::new().unwrap();
        let corpus = write_file(
            &dir,
            "corpus.json",
            r#"["Marie Curie was born in Warsaw.", "Marie Curie discovered Radium."]"#,
        );

        let result = execute_command(
            Commands::Ask {
                question: "Where was Marie Curie born?".to_string(),
                corpus,
                id: Some("q1".to_string()),
            },
            &config_in(&dir),
        )
        .await;

        assert_eq!(result.exit_code, 0);
        let answer: serde_json::Value = serde_json::from_str(&result.message).unwrap();
        assert_eq!(answer["answer"], "Warsaw");
        assert_eq!(answer["question_id"], "q1");
    }

    #[tokio::test]
    async fn test_missing_corpus_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = execute_command(
            Commands::Ask {
                question: "Where?".to_string(),
                corpus: dir.path().join("missing.json"),
                id: None,
            },
            &config_in(&dir),
        )
        .await;

        assert_eq!(result.exit_code, 1);
        assert!(result.message.starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_batch_submission_names_rankers() {
        let dir = TempDir::new().unwrap();
        let corpus = write_file(&dir, "corpus.json", r#"["Marie Curie discovered Radium."]"#);
        let input = write_file(
            &dir,
            "questions.jsonl",
            "{\"id\": \"1\", \"question\": \"Who discovered Radium?\"}\n",
        );
        let output = dir.path().join("submission.json");

        let result = execute_command(
            Commands::Batch {
                input,
                corpus,
                output: output.clone(),
                submission: true,
            },
            &config_in(&dir),
        )
        .await;
        assert_eq!(result.exit_code, 0, "{}", result.message);

        let submission: Submission =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(submission.total_questions, 1);
        assert_eq!(
            submission.metadata.retrieval_methods,
            vec!["bm25".to_string(), "dense:feature_hashing".to_string()]
        );
    }

    #[tokio::test]
    async fn test_batch_then_refill_nothing_pending() {
        let dir = TempDir::new().unwrap();
        let corpus = write_file(&dir, "corpus.json", r#"["Marie Curie discovered Radium."]"#);
        let input = write_file(
            &dir,
            "questions.jsonl",
            "{\"id\": \"1\", \"question\": \"Who discovered Radium?\"}\n",
        );
        let output = dir.path().join("answers.json");
        let config = config_in(&dir);

        let result = execute_command(
            Commands::Batch {
                input: input.clone(),
                corpus: corpus.clone(),
                output: output.clone(),
                submission: false,
            },
            &config,
        )
        .await;
        assert_eq!(result.exit_code, 0, "{}", result.message);

        let answers = read_answers(&output).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].answer, "Marie Curie");

        let result = execute_command(
            Commands::Refill {
                input,
                answers: output,
                corpus,
                output: None,
            },
            &config,
        )
        .await;
        assert_eq!(result.message, "No empty or failed answers to refill");
    }
}
