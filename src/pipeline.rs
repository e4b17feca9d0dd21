//! Response-shaping pipelines.
//!
//! A route may declare an ordered [`Stage`] sequence that shapes fetched
//! records before they reach the caller. At request time the handler merges
//! its identity or filter criteria into the declared sequence with
//! [`merge_criteria`]; the declared sequence is shared across all requests
//! for the route and is never mutated in place.

use crate::store::{compare_values, matches_filter, Document, ID_FIELD};

/// Sort direction within a [`Stage::Sort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One ordered, named pipeline step.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Equality filter; the identity/criteria injection point.
    Match(Document),
    /// Keep only the named fields (plus the record identifier).
    Project(Vec<String>),
    /// Multi-key value ordering.
    Sort(Vec<(String, SortOrder)>),
    Skip(usize),
    Limit(usize),
    /// Terminal: report how many records survived the preceding stages.
    Count,
}

/// Result of executing a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutput {
    Documents(Vec<Document>),
    Count(usize),
}

impl PipelineOutput {
    #[must_use]
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            Self::Documents(docs) => docs,
            Self::Count(_) => Vec::new(),
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Documents(docs) => docs.len(),
            Self::Count(count) => *count,
        }
    }
}

/// Produce a new stage sequence with `criteria` injected.
///
/// If a `Match` stage exists, the criteria are shallow-merged into the
/// *first* one, new keys winning on conflict; otherwise a fresh `Match`
/// carrying exactly the criteria is prepended. Later `Match` stages are left
/// untouched: their interaction with injected criteria is deliberately
/// undefined, and user-declared stages always run after the injected filter.
///
/// The declared sequence is cloned, never mutated.
#[must_use]
pub fn merge_criteria(stages: &[Stage], criteria: &Document) -> Vec<Stage> {
    let mut merged: Vec<Stage> = stages.to_vec();
    if let Some(Stage::Match(existing)) = merged
        .iter_mut()
        .find(|stage| matches!(stage, Stage::Match(_)))
    {
        for (key, value) in criteria {
            existing.insert(key.clone(), value.clone());
        }
    } else {
        merged.insert(0, Stage::Match(criteria.clone()));
    }
    merged
}

/// Build the count-only variant of a shaped sequence: the same filter and
/// ordering stages, with projection and windowing dropped and a terminal
/// `Count` appended.
#[must_use]
pub fn count_variant(stages: &[Stage]) -> Vec<Stage> {
    let mut counted: Vec<Stage> = stages
        .iter()
        .filter(|stage| matches!(stage, Stage::Match(_) | Stage::Sort(_)))
        .cloned()
        .collect();
    counted.push(Stage::Count);
    counted
}

/// Execute a stage sequence over a snapshot of records.
#[must_use]
pub fn execute(stages: &[Stage], mut docs: Vec<Document>) -> PipelineOutput {
    for stage in stages {
        match stage {
            Stage::Match(filter) => docs.retain(|doc| matches_filter(doc, filter)),
            Stage::Project(fields) => {
                for doc in &mut docs {
                    doc.retain(|key, _| key == ID_FIELD || fields.iter().any(|f| f == key));
                }
            }
            Stage::Sort(keys) => {
                docs.sort_by(|a, b| {
                    for (field, order) in keys {
                        let ordering = compare_values(a.get(field), b.get(field));
                        let ordering = match order {
                            SortOrder::Asc => ordering,
                            SortOrder::Desc => ordering.reverse(),
                        };
                        if ordering != std::cmp::Ordering::Equal {
                            return ordering;
                        }
                    }
                    std::cmp::Ordering::Equal
                });
            }
            Stage::Skip(n) => {
                docs = docs.into_iter().skip(*n).collect();
            }
            Stage::Limit(n) => docs.truncate(*n),
            Stage::Count => return PipelineOutput::Count(docs.len()),
        }
    }
    PipelineOutput::Documents(docs)
}
