//! Per-question orchestration.
//!
//! ```text
//! plan → retrieve (per dependency wave) → dedup → build graph
//!      → reason | fallback → validate chain → Answer
//! ```
//!
//! [`MultiHopPipeline::process_question`] never fails: errors and panics
//! anywhere below it become an [`Answer`] of type `error`.

mod answer;

pub use answer::*;

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{Config, RequestConfig};
use crate::error::{AppError, AppResult};
use crate::graph::FactGraphBuilder;
use crate::langbase::{AnswerCandidate, CompletionService, LangbaseClient};
use crate::planner::{Question, SubTask, TaskPlanner, TaskRecord};
use crate::prompts::{fallback_user_content, FALLBACK_ANSWER_PROMPT};
use crate::reasoning::{PathReasoner, ReasoningResult};
use crate::retrieval::fusion::dedup_by_doc_id;
use crate::retrieval::{HybridRetriever, RetrievedDocument, Retriever};
use crate::retry::{retry_with_backoff, RetryError};
use crate::storage::{GraphStore, SqliteStorage};
use crate::validation::{ChainValidator, FactCheckers, ValidationResult};

/// Confidence assigned to answers that did not come from the graph.
pub const FALLBACK_CONFIDENCE: f64 = 0.6;

/// Orchestrates planner, retriever, graph builder, reasoner and validator.
pub struct MultiHopPipeline {
    planner: TaskPlanner,
    retriever: Arc<dyn Retriever>,
    graph: FactGraphBuilder,
    reasoner: PathReasoner,
    validator: ChainValidator,
    completion: Option<Arc<dyn CompletionService>>,
    request: RequestConfig,
    top_k: usize,
    evidence_limit: usize,
    batch_concurrency: usize,
    history: Mutex<Vec<Answer>>,
}

impl MultiHopPipeline {
    /// Assemble a pipeline over an existing retriever and graph store.
    pub fn new(config: &Config, retriever: Arc<dyn Retriever>, store: Arc<dyn GraphStore>) -> Self {
        let mut graph = FactGraphBuilder::new();
        graph.initialize(store.clone());

        Self {
            planner: TaskPlanner::new(),
            retriever,
            graph,
            reasoner: PathReasoner::new(store, config.reasoning.max_hops),
            validator: ChainValidator::new(
                FactCheckers::with_sanctions_list(&config.validation.sanctions_list),
                config.request.clone(),
            ),
            completion: None,
            request: config.request.clone(),
            top_k: config.retrieval.top_k.max(1),
            evidence_limit: config.reasoning.evidence_limit,
            batch_concurrency: config.reasoning.batch_concurrency.max(1),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Build the full production stack: SQLite fact graph, hybrid retriever
    /// over `corpus`, and Langbase for the fallback path when configured.
    pub async fn from_config(config: &Config, corpus: Vec<String>) -> AppResult<Self> {
        let storage = SqliteStorage::new(&config.database).await?;

        let retrieval = config.retrieval.clone();
        let retriever = tokio::task::spawn_blocking(move || -> AppResult<HybridRetriever> {
            let mut retriever = HybridRetriever::from_config(retrieval)?;
            retriever.initialize(corpus);
            Ok(retriever)
        })
        .await
        .map_err(|e| AppError::pipeline(format!("retriever setup failed: {}", e)))??;

        let mut pipeline = Self::new(config, Arc::new(retriever), Arc::new(storage));

        if let Some(langbase) = &config.langbase {
            let client =
                LangbaseClient::new(langbase, config.request.clone(), config.pipes.fallback.clone())?;
            info!(base_url = %client.base_url(), "Completion service enabled for fallback answers");
            pipeline = pipeline.with_completion_service(Arc::new(client));
        }

        Ok(pipeline)
    }

    /// Use `service` to answer questions without extractable entities.
    pub fn with_completion_service(mut self, service: Arc<dyn CompletionService>) -> Self {
        self.completion = Some(service);
        self
    }

    /// Replace the fact-check strategies.
    pub fn with_fact_checkers(mut self, checkers: FactCheckers) -> Self {
        self.validator = ChainValidator::new(checkers, self.request.clone());
        self
    }

    /// Answer one question. Always returns an [`Answer`].
    pub async fn process_question(&self, question_id: &str, text: &str) -> Answer {
        let start = Instant::now();
        info!(question_id = %question_id, "Processing question");

        let outcome = AssertUnwindSafe(self.run(question_id, text))
            .catch_unwind()
            .await;

        let mut answer = match outcome {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                let e = match e {
                    AppError::Pipeline { .. } => e,
                    other => AppError::pipeline(other),
                };
                error!(question_id = %question_id, error = %e, "Question failed");
                Answer::from_error(question_id, &e)
            }
            Err(panic) => {
                let e = AppError::pipeline(panic_message(panic.as_ref()));
                error!(question_id = %question_id, error = %e, "Question panicked");
                Answer::from_error(question_id, &e)
            }
        };
        answer.processing_time_ms = start.elapsed().as_millis() as u64;

        info!(
            question_id = %question_id,
            answer_type = ?answer.answer_type,
            confidence = answer.confidence,
            latency_ms = answer.processing_time_ms,
            "Question processed"
        );

        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(answer.clone());
        answer
    }

    async fn run(&self, question_id: &str, text: &str) -> AppResult<Answer> {
        let question = self.planner.parse(text);
        let tasks = self.planner.decompose(&question);
        let waves = TaskPlanner::execution_order(&tasks)?;

        let mut by_task: HashMap<u32, Vec<RetrievedDocument>> = HashMap::new();
        let mut retrieved = Vec::new();
        for mut wave in waves {
            for task in wave.iter_mut().filter(|t| !t.depends_on.is_empty()) {
                let upstream: Vec<&str> = task
                    .depends_on
                    .iter()
                    .filter_map(|id| by_task.get(id))
                    .flatten()
                    .map(|d| d.content.as_str())
                    .collect();
                self.planner.bind_dependent(&question, task, &upstream);
            }

            let results =
                futures::future::try_join_all(wave.iter().map(|task| self.retrieve(task))).await?;
            for (task, documents) in wave.iter().zip(results) {
                retrieved.extend(documents.iter().cloned());
                by_task.insert(task.id, documents);
            }
        }
        let documents = dedup_by_doc_id(retrieved);
        debug!(question_id = %question_id, documents = documents.len(), "Evidence gathered");

        let contents: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        self.graph.build(&contents).await?;

        let reasoning = if question.entities.is_empty() {
            self.fallback(&question, &documents).await
        } else {
            self.reasoner
                .reason(&question.entities, &question.relations)
                .await?
        };

        let validation = self
            .validator
            .validate_reasoning_chain(&[reasoning.clone().into()]);

        Ok(self.synthesize(question_id, &question, documents, reasoning, validation))
    }

    /// One sub-task's retrieval, bounded by timeout and retries.
    async fn retrieve(&self, task: &SubTask) -> AppResult<Vec<RetrievedDocument>> {
        let retriever = &self.retriever;
        let query = task.query.as_str();
        let top_k = self.top_k;

        let outcome = retry_with_backoff(
            &self.request,
            "retrieval",
            move || retriever.search(query, top_k),
            // Misuse will not improve on retry
            |e| matches!(e, AppError::NotReady { .. } | AppError::Validation { .. }),
        )
        .await;

        match outcome {
            Ok(documents) => {
                debug!(
                    task_id = task.id,
                    task_type = ?task.task_type,
                    documents = documents.len(),
                    "Sub-task retrieval completed"
                );
                Ok(documents)
            }
            Err(RetryError::Permanent(e)) => Err(e),
            Err(RetryError::Exhausted {
                last_error,
                retries,
            }) => Err(AppError::RetrievalFailure {
                message: last_error,
                retries,
            }),
        }
    }

    /// Low-confidence answer for questions without entities.
    async fn fallback(&self, question: &Question, documents: &[RetrievedDocument]) -> ReasoningResult {
        let evidence: Vec<&str> = documents
            .iter()
            .take(self.evidence_limit)
            .map(|d| d.content.as_str())
            .collect();

        if let Some(service) = &self.completion {
            let content = fallback_user_content(&question.text, &evidence);
            match service.complete(FALLBACK_ANSWER_PROMPT, &content).await {
                Ok(completion) => {
                    let candidate = AnswerCandidate::from_completion(&completion);
                    if !candidate.answer.is_empty() {
                        let confidence = candidate
                            .confidence
                            .unwrap_or(FALLBACK_CONFIDENCE)
                            .min(FALLBACK_CONFIDENCE);
                        return ReasoningResult::fallback(candidate.answer, confidence);
                    }
                    warn!("Completion service returned an empty answer");
                }
                Err(e) => warn!(error = %e, "Completion service failed, using evidence"),
            }
        }

        match evidence.first() {
            Some(passage) => ReasoningResult::fallback(*passage, FALLBACK_CONFIDENCE),
            None => ReasoningResult {
                answer: None,
                ..ReasoningResult::fallback("", 0.0)
            },
        }
    }

    fn synthesize(
        &self,
        question_id: &str,
        question: &Question,
        mut documents: Vec<RetrievedDocument>,
        reasoning: ReasoningResult,
        validation: ValidationResult,
    ) -> Answer {
        let confidence = reasoning.confidence * validation.confidence;
        documents.truncate(self.evidence_limit);

        Answer {
            question_id: question_id.to_string(),
            answer: reasoning.answer.clone().unwrap_or_default(),
            answer_type: question.question_type.into(),
            confidence,
            evidence: documents,
            reasoning_steps: vec![reasoning.into(), validation.into()],
            validation_status: ValidationStatus::from_confidence(confidence),
            generated_at: chrono::Utc::now(),
            processing_time_ms: 0,
            error: None,
        }
    }

    /// Answer many questions, `batch_concurrency` at a time, in input order.
    pub async fn process_batch(&self, questions: &[QuestionInput]) -> Vec<Answer> {
        let start = Instant::now();
        let answers: Vec<Answer> = stream::iter(questions)
            .map(|q| self.process_question(&q.id, &q.question))
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let failed = answers.iter().filter(|a| a.answer_type == AnswerType::Error).count();
        info!(
            questions = questions.len(),
            failed,
            latency_ms = start.elapsed().as_millis(),
            "Batch completed"
        );
        answers
    }

    /// Re-run answers that are empty or failed, keeping the rest.
    ///
    /// Answers whose question id is not in `questions` are kept unchanged.
    pub async fn refill(&self, previous: Vec<Answer>, questions: &[QuestionInput]) -> Vec<Answer> {
        let by_id: HashMap<&str, &str> = questions
            .iter()
            .map(|q| (q.id.as_str(), q.question.as_str()))
            .collect();

        let pending: Vec<(usize, &str, &str)> = previous
            .iter()
            .enumerate()
            .filter(|(_, a)| a.needs_refill())
            .filter_map(|(i, a)| match by_id.get_key_value(a.question_id.as_str()) {
                Some((id, text)) => Some((i, *id, *text)),
                None => {
                    warn!(question_id = %a.question_id, "No question text for answer, skipping");
                    None
                }
            })
            .collect();

        info!(total = previous.len(), pending = pending.len(), "Refilling answers");

        let refreshed: Vec<(usize, Answer)> = stream::iter(pending)
            .map(|(i, id, text)| self.process_question(id, text).map(move |a| (i, a)))
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let mut answers = previous;
        for (i, answer) in refreshed {
            answers[i] = answer;
        }
        answers
    }

    /// Snapshot of every answer produced by this pipeline.
    pub fn history(&self) -> Vec<Answer> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Snapshot of every decomposition made by this pipeline's planner.
    pub fn task_history(&self) -> Vec<TaskRecord> {
        self.planner.task_history()
    }

    /// Snapshot of every validation run by this pipeline.
    pub fn validation_history(&self) -> Vec<ValidationResult> {
        self.validator.validation_history()
    }

    /// Rankers behind the retriever, for submission metadata.
    pub fn retrieval_methods(&self) -> Vec<String> {
        self.retriever.methods()
    }

    /// The validator, for ad-hoc checks outside the per-question flow.
    pub fn validator(&self) -> &ChainValidator {
        &self.validator
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic: unknown cause".to_string()
    }
}
