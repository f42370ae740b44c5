//! Multi-hop path reasoning over the fact graph.
//!
//! Two entities or more: the first and last are connected by the shortest
//! paths of at most `max_hops` edges (edges are traversed in either direction).
//! One entity: a direct lookup of the facts touching it. No entity: the caller
//! substitutes [`ReasoningResult::fallback`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::storage::{GraphStore, Triple};

/// Most paths returned by one search.
const MAX_PATHS: usize = 10;
/// Confidence of a single specific hop.
const BASE_PATH_CONFIDENCE: f64 = 0.95;
/// Multiplier applied per additional hop.
const HOP_DECAY: f64 = 0.9;
/// Specificity of vague predicates.
const GENERIC_PREDICATE_SPECIFICITY: f64 = 0.8;
const GENERIC_PREDICATES: &[&str] = &["related_to", "associated_with", "co_occurs"];
/// Confidence of a lookup that found facts.
const LOOKUP_CONFIDENCE: f64 = 0.9;
/// Confidence of a lookup on an entity the graph does not know.
const UNKNOWN_ENTITY_CONFIDENCE: f64 = 0.2;

/// How a reasoning result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningKind {
    /// Path search between two entities.
    PathFinding,
    /// Single-entity fact lookup.
    EntityLookup,
    /// No entities; answer came from outside the graph.
    Fallback,
}

/// A chain of edges from source to target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    /// Visited entities, source first.
    pub nodes: Vec<String>,
    /// Traversed edges in visiting order, in their stored direction.
    pub edges: Vec<Triple>,
}

impl GraphPath {
    /// Number of relation hops.
    pub fn hops(&self) -> usize {
        self.edges.len()
    }

    /// `0.95 × 0.9^(hops−1) × mean edge specificity`.
    pub fn confidence(&self) -> f64 {
        let specificity = if self.edges.is_empty() {
            1.0
        } else {
            self.edges
                .iter()
                .map(|e| predicate_specificity(&e.predicate))
                .sum::<f64>()
                / self.edges.len() as f64
        };
        let extra_hops = self.hops().saturating_sub(1) as i32;
        BASE_PATH_CONFIDENCE * HOP_DECAY.powi(extra_hops) * specificity
    }

    /// Human-readable hop chain.
    pub fn describe(&self) -> String {
        if self.edges.is_empty() {
            return self.nodes.first().cloned().unwrap_or_default();
        }
        self.edges
            .iter()
            .map(describe_fact)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn predicate_specificity(predicate: &str) -> f64 {
    if GENERIC_PREDICATES.contains(&predicate) {
        GENERIC_PREDICATE_SPECIFICITY
    } else {
        1.0
    }
}

fn describe_fact(triple: &Triple) -> String {
    format!(
        "{} {} {}",
        triple.subject,
        triple.predicate.replace('_', " "),
        triple.object
    )
}

fn stem(word: &str) -> &str {
    for suffix in ["ing", "ed", "es", "s"] {
        if let Some(base) = word.strip_suffix(suffix) {
            if base.len() >= 3 {
                return base;
            }
        }
    }
    word
}

/// Whether a question relation label names the same relation as a stored predicate.
///
/// Compares stemmed content words; prepositions of two letters or fewer are ignored.
pub fn relation_matches(predicate: &str, relation: &str) -> bool {
    let content = |label: &str| -> Vec<String> {
        label
            .split('_')
            .filter(|w| w.len() > 2)
            .map(|w| stem(w).to_string())
            .collect()
    };
    let predicate_words = content(predicate);
    content(relation)
        .iter()
        .any(|w| predicate_words.contains(w))
}

/// Result of one reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResult {
    /// How the result was produced.
    #[serde(rename = "reasoning_type")]
    pub kind: ReasoningKind,
    /// Entities the step was about.
    pub entities: Vec<String>,
    /// Paths found (path finding only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<GraphPath>,
    /// Facts found (entity lookup only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<Triple>,
    /// Answer text derived from the rows, if any.
    pub answer: Option<String>,
    /// Estimated correctness in `[0, 1]`.
    pub confidence: f64,
}

impl ReasoningResult {
    /// Low-confidence result used when no entities are available.
    pub fn fallback(answer: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind: ReasoningKind::Fallback,
            entities: Vec::new(),
            paths: Vec::new(),
            facts: Vec::new(),
            answer: Some(answer.into()),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Queries the graph store for connecting paths and entity facts.
pub struct PathReasoner {
    store: Arc<dyn GraphStore>,
    connected: AtomicBool,
    max_hops: usize,
}

impl PathReasoner {
    /// Create a reasoner; `max_hops` is the default path length bound.
    pub fn new(store: Arc<dyn GraphStore>, max_hops: usize) -> Self {
        Self {
            store,
            connected: AtomicBool::new(false),
            max_hops: max_hops.max(1),
        }
    }

    /// Verify the store is reachable.
    pub async fn connect(&self) -> AppResult<()> {
        match self.store.ping().await {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                debug!("Path reasoner connected to graph store");
                Ok(())
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                warn!(error = %e, "Graph store unreachable");
                Err(AppError::graph_unavailable(e))
            }
        }
    }

    /// Whether the last connection attempt succeeded.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn ensure_connected(&self) -> AppResult<()> {
        if !self.is_connected() {
            self.connect().await?;
        }
        Ok(())
    }

    async fn edges_of(&self, entity: &str) -> AppResult<Vec<Triple>> {
        self.store.edges_of(entity).await.map_err(|e| {
            self.connected.store(false, Ordering::SeqCst);
            AppError::graph_unavailable(e)
        })
    }

    /// All shortest paths (at most 10) from `source` to `target` within `max_hops`.
    ///
    /// An empty list means no path exists; an unreachable store is an error.
    pub async fn find_path(
        &self,
        source: &str,
        target: &str,
        max_hops: usize,
    ) -> AppResult<Vec<GraphPath>> {
        self.ensure_connected().await?;

        if source == target {
            let known = self
                .store
                .has_entity(source)
                .await
                .map_err(AppError::graph_unavailable)?;
            return Ok(if known {
                vec![GraphPath {
                    nodes: vec![source.to_string()],
                    edges: Vec::new(),
                }]
            } else {
                Vec::new()
            });
        }

        let mut depth: HashMap<String, usize> = HashMap::from([(source.to_string(), 0)]);
        let mut parents: HashMap<String, Vec<(String, Triple)>> = HashMap::new();
        let mut frontier = vec![source.to_string()];

        for level in 1..=max_hops {
            let mut next = Vec::new();
            for node in &frontier {
                for edge in self.edges_of(node).await? {
                    let Some(neighbor) = edge.other_end(node).map(str::to_string) else {
                        continue;
                    };
                    match depth.get(&neighbor).copied() {
                        None => {
                            depth.insert(neighbor.clone(), level);
                            parents
                                .entry(neighbor.clone())
                                .or_default()
                                .push((node.clone(), edge));
                            next.push(neighbor);
                        }
                        Some(d) if d == level => {
                            parents.entry(neighbor).or_default().push((node.clone(), edge));
                        }
                        Some(_) => {}
                    }
                }
            }

            if depth.contains_key(target) || next.is_empty() {
                break;
            }
            frontier = next;
        }

        if !depth.contains_key(target) {
            debug!(source = %source, target = %target, max_hops, "No path found");
            return Ok(Vec::new());
        }

        let paths = unwind_paths(source, target, &parents);
        debug!(
            source = %source,
            target = %target,
            paths = paths.len(),
            hops = paths.first().map_or(0, GraphPath::hops),
            "Paths found"
        );
        Ok(paths)
    }

    /// Reason over the question's entities and relation labels.
    pub async fn reason(
        &self,
        entities: &[String],
        relations: &[String],
    ) -> AppResult<ReasoningResult> {
        match entities {
            [] => Err(AppError::Validation {
                field: "entities".to_string(),
                reason: "at least one entity is required; use a fallback result".to_string(),
            }),
            [entity] => self.lookup(entity, relations).await,
            [source, .., target] => {
                let paths = self.find_path(source, target, self.max_hops).await?;
                let best = paths
                    .iter()
                    .max_by(|a, b| {
                        a.confidence()
                            .partial_cmp(&b.confidence())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .cloned();
                let confidence = best.as_ref().map_or(0.0, GraphPath::confidence);

                info!(
                    source = %source,
                    target = %target,
                    paths = paths.len(),
                    confidence,
                    "Path reasoning completed"
                );

                Ok(ReasoningResult {
                    kind: ReasoningKind::PathFinding,
                    entities: vec![source.clone(), target.clone()],
                    answer: best.map(|p| p.describe()),
                    paths,
                    facts: Vec::new(),
                    confidence,
                })
            }
        }
    }

    async fn lookup(&self, entity: &str, relations: &[String]) -> AppResult<ReasoningResult> {
        self.ensure_connected().await?;
        let facts = self.edges_of(entity).await?;

        let (answer, confidence) = if facts.is_empty() {
            (None, UNKNOWN_ENTITY_CONFIDENCE)
        } else {
            let matched = facts.iter().find(|fact| {
                relations
                    .iter()
                    .any(|relation| relation_matches(&fact.predicate, relation))
            });
            let answer = match matched {
                Some(fact) => fact.other_end(entity).map(str::to_string),
                None => Some(
                    facts
                        .iter()
                        .take(3)
                        .map(describe_fact)
                        .collect::<Vec<_>>()
                        .join("; "),
                ),
            };
            (answer, LOOKUP_CONFIDENCE)
        };

        info!(
            entity = %entity,
            facts = facts.len(),
            confidence,
            "Entity lookup completed"
        );

        Ok(ReasoningResult {
            kind: ReasoningKind::EntityLookup,
            entities: vec![entity.to_string()],
            paths: Vec::new(),
            facts,
            answer,
            confidence,
        })
    }
}

/// Enumerate shortest paths by walking parent links back from `target`.
fn unwind_paths(
    source: &str,
    target: &str,
    parents: &HashMap<String, Vec<(String, Triple)>>,
) -> Vec<GraphPath> {
    let mut paths = Vec::new();
    // (current node, nodes from current to target, edges from current to target)
    let mut stack: Vec<(String, Vec<String>, Vec<Triple>)> =
        vec![(target.to_string(), vec![target.to_string()], Vec::new())];

    while let Some((node, nodes, edges)) = stack.pop() {
        if paths.len() >= MAX_PATHS {
            break;
        }
        if node == source {
            let mut nodes = nodes;
            let mut edges = edges;
            nodes.reverse();
            edges.reverse();
            paths.push(GraphPath { nodes, edges });
            continue;
        }
        if let Some(links) = parents.get(&node) {
            for (parent, edge) in links.iter().rev() {
                let mut nodes = nodes.clone();
                let mut edges = edges.clone();
                nodes.push(parent.clone());
                edges.push(edge.clone());
                stack.push((parent.clone(), nodes, edges));
            }
        }
    }

    paths
}
