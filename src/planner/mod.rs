//! Task planner: question classification and sub-task decomposition.
//!
//! A [`Question`] is parsed once and never mutated afterwards. Decomposition
//! yields [`SubTask`]s ordered by id; dependency edges must be honoured by any
//! scheduler, see [`TaskPlanner::execution_order`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::extraction::EntityExtractor;

/// Classification of a question by its interrogative word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// "who" questions.
    EntityIdentification,
    /// "what" questions.
    FactRetrieval,
    /// "how" / "why" questions.
    CausalReasoning,
    /// Anything else.
    General,
}

impl QuestionType {
    /// Classify question text. First match wins, case-insensitive substring test.
    pub fn classify(text: &str) -> Self {
        let lowered = text.to_lowercase();
        if lowered.contains("who") {
            QuestionType::EntityIdentification
        } else if lowered.contains("what") {
            QuestionType::FactRetrieval
        } else if lowered.contains("how") || lowered.contains("why") {
            QuestionType::CausalReasoning
        } else {
            QuestionType::General
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::EntityIdentification => "entity_identification",
            QuestionType::FactRetrieval => "fact_retrieval",
            QuestionType::CausalReasoning => "causal_reasoning",
            QuestionType::General => "general",
        }
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsed question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Original question text.
    pub text: String,
    /// Interrogative classification.
    pub question_type: QuestionType,
    /// Entity names in order of appearance.
    pub entities: Vec<String>,
    /// Normalized relation labels in order of appearance.
    pub relations: Vec<String>,
}

/// Kind of work a sub-task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Locate the primary entity.
    EntitySearch,
    /// Gather facts about a previously located entity.
    RelationSearch,
    /// First search for the requested fact.
    InitialSearch,
    /// Cross-source verification of an earlier finding.
    VerificationSearch,
    /// Single catch-all search.
    ComprehensiveSearch,
}

/// One retrieval step of a decomposed question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    /// Position in the plan, starting at 1.
    pub id: u32,
    /// What the task does.
    pub task_type: TaskType,
    /// Retrieval query bound to the task.
    pub query: String,
    /// Human-readable description.
    pub description: String,
    /// Ids that must complete before this task is dispatched.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<u32>,
}

impl SubTask {
    fn new(id: u32, task_type: TaskType, query: impl Into<String>, description: &str) -> Self {
        Self {
            id,
            task_type,
            query: query.into(),
            description: description.to_string(),
            depends_on: BTreeSet::new(),
        }
    }

    fn after(mut self, id: u32) -> Self {
        self.depends_on.insert(id);
        self
    }
}

fn relation_query(entity: &str) -> String {
    format!("What are the key facts about {}?", entity)
}

/// A recorded decomposition, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Question text.
    pub question: String,
    /// Sub-tasks produced for it, with queries as finally dispatched.
    pub sub_tasks: Vec<SubTask>,
}

/// Parses questions and decomposes them into dependent sub-tasks.
#[derive(Debug, Default)]
pub struct TaskPlanner {
    extractor: EntityExtractor,
    history: Mutex<Vec<TaskRecord>>,
}

impl TaskPlanner {
    /// Create a new planner with an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse question text into entities, relations and a classification.
    pub fn parse(&self, text: &str) -> Question {
        let question = Question {
            text: text.to_string(),
            question_type: QuestionType::classify(text),
            entities: self.extractor.extract(text),
            relations: self.extractor.extract_relations(text),
        };

        debug!(
            question_type = %question.question_type,
            entities = ?question.entities,
            relations = ?question.relations,
            "Parsed question"
        );
        question
    }

    /// Decompose a parsed question into an ordered list of sub-tasks.
    pub fn decompose(&self, question: &Question) -> Vec<SubTask> {
        let text = question.text.as_str();
        let sub_tasks = match question.question_type {
            QuestionType::EntityIdentification => {
                let focus = question
                    .entities
                    .first()
                    .map(String::as_str)
                    .unwrap_or("the entity found in task 1");
                vec![
                    SubTask::new(
                        1,
                        TaskType::EntitySearch,
                        text,
                        "Find the main entity mentioned in the question",
                    ),
                    SubTask::new(
                        2,
                        TaskType::RelationSearch,
                        relation_query(focus),
                        "Find relationships and facts about the identified entity",
                    )
                    .after(1),
                ]
            }
            QuestionType::FactRetrieval => vec![
                SubTask::new(
                    1,
                    TaskType::InitialSearch,
                    text,
                    "Initial search for the main fact",
                ),
                SubTask::new(
                    2,
                    TaskType::VerificationSearch,
                    format!("Verify from multiple sources: {}", text),
                    "Cross-verify the retrieved fact",
                )
                .after(1),
            ],
            QuestionType::CausalReasoning | QuestionType::General => vec![SubTask::new(
                1,
                TaskType::ComprehensiveSearch,
                text,
                "Comprehensive search for the question",
            )],
        };

        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(TaskRecord {
                question: text.to_string(),
                sub_tasks: sub_tasks.clone(),
            });

        sub_tasks
    }

    /// Rebind a relation search to the entity its dependencies found.
    ///
    /// `upstream` holds the documents retrieved by the task's dependencies,
    /// best first. The first entity mentioned there that the question does
    /// not already name becomes the new focus, and the latest matching
    /// history record is updated. Returns `false` and leaves the task alone
    /// when it is not a relation search or no new entity turns up.
    pub fn bind_dependent(
        &self,
        question: &Question,
        task: &mut SubTask,
        upstream: &[&str],
    ) -> bool {
        if task.task_type != TaskType::RelationSearch {
            return false;
        }

        let known: BTreeSet<String> = question
            .entities
            .iter()
            .map(|e| e.to_lowercase())
            .collect();
        let found = upstream
            .iter()
            .flat_map(|doc| self.extractor.extract(doc))
            .find(|entity| !known.contains(&entity.to_lowercase()));

        let Some(entity) = found else {
            debug!(task_id = task.id, "No new entity upstream, keeping query");
            return false;
        };

        let planned = std::mem::replace(&mut task.query, relation_query(&entity));
        debug!(task_id = task.id, entity = %entity, query = %task.query, "Bound dependent task");

        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let recorded = history
            .iter_mut()
            .rev()
            .filter(|record| record.question == question.text)
            .flat_map(|record| record.sub_tasks.iter_mut())
            .find(|t| t.id == task.id && t.query == planned);
        if let Some(recorded) = recorded {
            recorded.query = task.query.clone();
        }
        true
    }

    /// Group tasks into dependency waves.
    ///
    /// Every task appears in a later wave than all of its dependencies; tasks in
    /// the same wave are independent of each other. Unknown dependency ids and
    /// cycles are rejected.
    pub fn execution_order(tasks: &[SubTask]) -> AppResult<Vec<Vec<SubTask>>> {
        let by_id: HashMap<u32, &SubTask> = tasks.iter().map(|t| (t.id, t)).collect();

        for task in tasks {
            if let Some(missing) = task.depends_on.iter().find(|d| !by_id.contains_key(*d)) {
                return Err(AppError::Validation {
                    field: "depends_on".to_string(),
                    reason: format!("task {} depends on unknown task {}", task.id, missing),
                });
            }
        }

        let mut remaining: Vec<&SubTask> = tasks.iter().collect();
        remaining.sort_by_key(|t| t.id);
        let mut done: BTreeSet<u32> = BTreeSet::new();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<&SubTask>, Vec<&SubTask>) = remaining
                .into_iter()
                .partition(|t| t.depends_on.iter().all(|d| done.contains(d)));

            if ready.is_empty() {
                return Err(AppError::Validation {
                    field: "depends_on".to_string(),
                    reason: format!(
                        "dependency cycle among tasks {:?}",
                        blocked.iter().map(|t| t.id).collect::<Vec<_>>()
                    ),
                });
            }

            done.extend(ready.iter().map(|t| t.id));
            waves.push(ready.into_iter().cloned().collect());
            remaining = blocked;
        }

        Ok(waves)
    }

    /// Snapshot of all decompositions made by this planner.
    pub fn task_history(&self) -> Vec<TaskRecord> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
