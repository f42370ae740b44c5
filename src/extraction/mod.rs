//! Rule-based information extraction.
//!
//! - [`EntityExtractor`] finds named-entity mentions (capitalized noun phrases,
//!   numeric literals) in a sentence.
//! - [`TripleExtractor`] links consecutive mentions through the phrase that
//!   connects them, producing `(subject, predicate, object)` triples.
//!
//! The planner reuses the same machinery to pull entities and relation labels
//! out of a question.

use crate::storage::{normalize_predicate, Triple};

/// Capitalized words that never start an entity mention.
const STOP_CAPS: &[&str] = &[
    "a", "about", "after", "also", "an", "and", "are", "as", "at", "before", "both", "but", "by",
    "can", "could", "did", "do", "does", "during", "for", "from", "give", "he", "her", "his",
    "how", "however", "i", "if", "in", "is", "it", "its", "list", "many", "name", "of", "on",
    "or", "she", "should", "some", "tell", "that", "the", "their", "then", "there", "these",
    "they", "this", "those", "to", "was", "we", "were", "what", "when", "where", "which",
    "while", "who", "whom", "whose", "why", "with", "would", "you",
];

/// Lowercase words allowed inside a multi-word mention ("Theory of Relativity").
const CONNECTORS: &[&str] = &[
    "of", "the", "de", "del", "der", "di", "da", "du", "la", "le", "von", "van", "for",
];

/// Words dropped from connecting phrases before they become predicates.
const FUNCTION_WORDS: &[&str] = &[
    "a", "an", "the", "is", "was", "were", "are", "be", "been", "being", "has", "have", "had",
    "did", "does", "do", "who", "what", "when", "where", "why", "how", "which", "whom", "whose",
    "also", "that", "it", "its", "his", "her", "their",
];

/// Auxiliaries that mark a passive construction when followed by `... by`.
const PASSIVE_AUX: &[&str] = &["is", "was", "were", "are", "been", "being"];

/// Phrases made only of these produce no relation.
const CONJUNCTIONS: &[&str] = &["and", "or", "nor", "&", "but", "with"];

/// Longest connecting phrase (in content words) still treated as a relation.
const MAX_PREDICATE_WORDS: usize = 5;

#[derive(Debug, Clone)]
struct Token {
    text: String,
    /// The raw token ended a clause (`,`, `;`, `:` or a closing bracket).
    boundary_after: bool,
}

/// A contiguous entity mention inside one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    /// Surface text of the entity.
    pub text: String,
    start: usize,
    end: usize,
}

/// Named-entity recognizer over capitalization and numeric patterns.
#[derive(Debug, Clone, Default)]
pub struct EntityExtractor;

impl EntityExtractor {
    /// Create a new extractor
    pub fn new() -> Self {
        Self
    }

    /// Distinct entity names across all sentences, in first-seen order.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut entities: Vec<String> = Vec::new();
        for sentence in split_sentences(text) {
            let tokens = tokenize(sentence);
            for mention in find_mentions(&tokens) {
                if !entities.contains(&mention.text) {
                    entities.push(mention.text);
                }
            }
        }
        entities
    }

    /// Relation labels: the normalized phrases around and between mentions.
    pub fn extract_relations(&self, text: &str) -> Vec<String> {
        let mut relations: Vec<String> = Vec::new();
        for sentence in split_sentences(text) {
            let tokens = tokenize(sentence);
            let mentions = find_mentions(&tokens);

            let mut spans = Vec::new();
            let mut cursor = 0;
            for mention in &mentions {
                spans.push((cursor, mention.start));
                cursor = mention.end;
            }
            spans.push((cursor, tokens.len()));

            for (start, end) in spans {
                if start >= end {
                    continue;
                }
                if let Some(phrase) = connecting_phrase(&tokens[start..end]) {
                    let label = normalize_predicate(&phrase.words.join(" "));
                    if !label.is_empty() && !relations.contains(&label) {
                        relations.push(label);
                    }
                }
            }
        }
        relations
    }
}

/// Triple extraction by linking consecutive entity mentions.
#[derive(Debug, Clone, Default)]
pub struct TripleExtractor;

impl TripleExtractor {
    /// Create a new extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract `(subject, predicate, object)` triples from free text.
    pub fn extract(&self, text: &str) -> Vec<Triple> {
        let mut triples = Vec::new();

        for sentence in split_sentences(text) {
            let tokens = tokenize(sentence);
            let mentions = find_mentions(&tokens);

            for pair in mentions.windows(2) {
                let (left, right) = (&pair[0], &pair[1]);
                let gap = &tokens[left.end..right.start];
                let Some(phrase) = connecting_phrase(gap) else {
                    continue;
                };

                let predicate = phrase.words.join(" ");
                let triple = if phrase.passive {
                    Triple::new(right.text.clone(), predicate, left.text.clone())
                } else {
                    Triple::new(left.text.clone(), predicate, right.text.clone())
                };

                if triple.subject != triple.object && !triples.contains(&triple) {
                    triples.push(triple);
                }
            }
        }

        triples
    }
}

struct Phrase {
    words: Vec<String>,
    passive: bool,
}

/// Reduce a token gap to its relation words, or `None` if it carries no relation.
fn connecting_phrase(gap: &[Token]) -> Option<Phrase> {
    // Only the last clause of the gap relates the two mentions:
    // "Albert Einstein, a physicist, worked at Princeton" -> "worked at".
    let clause_start = gap
        .iter()
        .rposition(|t| t.boundary_after)
        .map(|i| i + 1)
        .unwrap_or(0);
    let clause = &gap[clause_start..];

    let lowered: Vec<String> = clause
        .iter()
        .map(|t| t.text.to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();

    if lowered.is_empty() || lowered.iter().all(|w| CONJUNCTIONS.contains(&w.as_str())) {
        return None;
    }

    let has_aux = lowered.iter().any(|w| PASSIVE_AUX.contains(&w.as_str()));
    let mut words: Vec<String> = lowered
        .into_iter()
        .filter(|w| !FUNCTION_WORDS.contains(&w.as_str()))
        .collect();

    let passive = has_aux && words.len() >= 2 && words.last().map(String::as_str) == Some("by");
    if passive {
        words.pop();
    }

    if words.is_empty()
        || words.len() > MAX_PREDICATE_WORDS
        || words.iter().all(|w| CONJUNCTIONS.contains(&w.as_str()))
    {
        return None;
    }

    Some(Phrase { words, passive })
}

/// Split text into sentences on terminal punctuation followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let at_break = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_break {
                let sentence = text[start..i].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = i + c.len_utf8();
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn tokenize(sentence: &str) -> Vec<Token> {
    sentence
        .split_whitespace()
        .filter_map(|raw| {
            let boundary_after = raw.ends_with([',', ';', ':', ')', ']']);
            let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric());
            let text = trimmed
                .strip_suffix("'s")
                .or_else(|| trimmed.strip_suffix("\u{2019}s"))
                .unwrap_or(trimmed);
            if text.is_empty() {
                // Standalone punctuation still closes a clause.
                return if boundary_after {
                    Some(Token {
                        text: String::new(),
                        boundary_after,
                    })
                } else {
                    None
                };
            }
            Some(Token {
                text: text.to_string(),
                boundary_after,
            })
        })
        .collect()
}

fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(char::is_uppercase)
}

fn is_numeric(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_digit())
}

fn is_stop_cap(word: &str) -> bool {
    STOP_CAPS.contains(&word.to_lowercase().as_str())
}

fn find_mentions(tokens: &[Token]) -> Vec<Mention> {
    let mut mentions = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let word = &tokens[i].text;

        if is_numeric(word) {
            mentions.push(Mention {
                text: word.clone(),
                start: i,
                end: i + 1,
            });
            i += 1;
            continue;
        }

        if !is_capitalized(word) || is_stop_cap(word) {
            i += 1;
            continue;
        }

        let start = i;
        let mut end = i + 1;
        while end < tokens.len() && !tokens[end - 1].boundary_after {
            let next = &tokens[end].text;
            if is_capitalized(next) && !is_stop_cap(next) {
                end += 1;
                continue;
            }
            // A connector joins two capitalized parts: "University of Zurich".
            let joins = CONNECTORS.contains(&next.as_str())
                && !tokens[end].boundary_after
                && tokens
                    .get(end + 1)
                    .is_some_and(|t| is_capitalized(&t.text) && !is_stop_cap(&t.text));
            if joins {
                end += 2;
                continue;
            }
            break;
        }

        let text = tokens[start..end]
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        mentions.push(Mention { text, start, end });
        i = end;
    }

    mentions
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entities_multiword_and_connectors() {
        let extractor = EntityExtractor::new();
        let entities =
            extractor.extract("Albert Einstein developed the Theory of Relativity at the University of Zurich.");
        assert_eq!(
            entities,
            vec![
                "Albert Einstein".to_string(),
                "Theory of Relativity".to_string(),
                "University of Zurich".to_string()
            ]
        );
    }

    #[test]
    fn test_entities_skip_interrogatives() {
        let extractor = EntityExtractor::new();
        let entities = extractor.extract("Who developed the Theory of Relativity?");
        assert_eq!(entities, vec!["Theory of Relativity".to_string()]);
    }

    #[test]
    fn test_entities_empty_for_lowercase_text() {
        let extractor = EntityExtractor::new();
        assert!(extractor.extract("why is the sky blue?").is_empty());
    }

    #[test]
    fn test_relations_from_question() {
        let extractor = EntityExtractor::new();
        assert_eq!(
            extractor.extract_relations("Who developed the Theory of Relativity?"),
            vec!["developed".to_string()]
        );
        assert_eq!(
            extractor.extract_relations("Where was Marie Curie born?"),
            vec!["born".to_string()]
        );
    }

    #[test]
    fn test_triples_simple_sentences() {
        let extractor = TripleExtractor::new();
        let triples = extractor.extract(
            "Albert Einstein was born in Ulm. Albert Einstein worked at Princeton University.",
        );
        assert_eq!(
            triples,
            vec![
                Triple::new("Albert Einstein", "born_in", "Ulm"),
                Triple::new("Albert Einstein", "worked_at", "Princeton University"),
            ]
        );
    }

    #[test]
    fn test_triples_drop_determiners() {
        let extractor = TripleExtractor::new();
        let triples = extractor.extract("Albert Einstein developed the Theory of Relativity.");
        assert_eq!(
            triples,
            vec![Triple::new("Albert Einstein", "developed", "Theory of Relativity")]
        );
    }

    #[test]
    fn test_triples_passive_voice_is_inverted() {
        let extractor = TripleExtractor::new();
        let triples = extractor.extract("Radium was discovered by Marie Curie.");
        assert_eq!(triples, vec![Triple::new("Marie Curie", "discovered", "Radium")]);
    }

    #[test]
    fn test_triples_skip_appositive_clause() {
        let extractor = TripleExtractor::new();
        let triples =
            extractor.extract("Albert Einstein, a theoretical physicist, worked at Princeton University.");
        assert_eq!(
            triples,
            vec![Triple::new("Albert Einstein", "worked_at", "Princeton University")]
        );
    }

    #[test]
    fn test_triples_conjunction_is_not_a_relation() {
        let extractor = TripleExtractor::new();
        assert!(extractor
            .extract("Albert Einstein and Marie Curie corresponded.")
            .is_empty());
    }

    #[test]
    fn test_triples_numeric_objects() {
        let extractor = TripleExtractor::new();
        let triples = extractor.extract("Marie Curie won the Nobel Prize in 1903.");
        assert_eq!(
            triples,
            vec![
                Triple::new("Marie Curie", "won", "Nobel Prize"),
                Triple::new("Nobel Prize", "in", "1903"),
            ]
        );
    }

    #[test]
    fn test_possessive_is_stripped() {
        let extractor = EntityExtractor::new();
        assert_eq!(
            extractor.extract("Einstein's theory changed physics."),
            vec!["Einstein".to_string()]
        );
    }

    #[test]
    fn test_split_sentences_keeps_decimals_together() {
        assert_eq!(
            split_sentences("Pi is 3.14 roughly. Next one!"),
            vec!["Pi is 3.14 roughly", "Next one"]
        );
    }
}
