//! Collection queries.
//!
//! Evaluation is shared by every backend so that ordering and filtering are
//! identical in memory, on disk and under chaos: filter, sort by the order
//! clauses, break remaining ties by document id, then truncate to the limit.

use std::cmp::Ordering;

use crate::{CollectionPath, Document, FieldPath, Value};

/// Sort direction of an order clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    /// Field equals the value.
    Eq(Value),
    /// Field is an array containing the value.
    ArrayContains(Value),
    /// Field is strictly less than the value.
    Lt(Value),
    /// Field is less than or equal to the value.
    Le(Value),
    /// Field is strictly greater than the value.
    Gt(Value),
    /// Field is greater than or equal to the value.
    Ge(Value),
}

/// A predicate on one field. Documents missing the field never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Field under test.
    pub field: FieldPath,
    /// Comparison.
    pub op: FilterOp,
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        let Some(value) = doc.get(&self.field) else {
            return false;
        };
        match &self.op {
            FilterOp::Eq(expected) => value == expected,
            FilterOp::ArrayContains(item) => value.as_array().is_some_and(|a| a.contains(item)),
            FilterOp::Lt(bound) => value < bound,
            FilterOp::Le(bound) => value <= bound,
            FilterOp::Gt(bound) => value > bound,
            FilterOp::Ge(bound) => value >= bound,
        }
    }
}

/// Filtered, ordered and limited view of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Collection to scan.
    pub collection: CollectionPath,
    /// All filters must match.
    pub filters: Vec<Filter>,
    /// Order clauses, most significant first.
    pub order_by: Vec<(FieldPath, Direction)>,
    /// Maximum number of documents returned.
    pub limit: Option<usize>,
}

impl Query {
    /// Every document of a collection, ordered by id.
    pub fn collection(collection: CollectionPath) -> Self {
        Self { collection, filters: Vec::new(), order_by: Vec::new(), limit: None }
    }

    /// Add a filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<FieldPath>, op: FilterOp) -> Self {
        self.filters.push(Filter { field: field.into(), op });
        self
    }

    /// Add an order clause.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<FieldPath>, direction: Direction) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    /// Cap the result size.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True if the document belongs to this query's collection and passes
    /// every filter.
    pub fn matches(&self, doc: &Document) -> bool {
        doc.path.collection == self.collection && self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filter, order and truncate a set of candidate documents.
    ///
    /// Documents missing an ordered field are excluded. Ties after the last
    /// order clause are broken by document id in that clause's direction.
    pub fn evaluate(&self, candidates: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut docs: Vec<Document> = candidates
            .into_iter()
            .filter(|doc| self.matches(doc))
            .filter(|doc| self.order_by.iter().all(|(field, _)| doc.get(field).is_some()))
            .collect();

        let tie_direction =
            self.order_by.last().map_or(Direction::Ascending, |(_, direction)| *direction);

        docs.sort_by(|a, b| {
            for (field, direction) in &self.order_by {
                let ordering = directed(a.get(field).cmp(&b.get(field)), *direction);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            directed(a.id().cmp(b.id()), tie_direction)
        });

        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

fn directed(ordering: Ordering, direction: Direction) -> Ordering {
    match direction {
        Direction::Ascending => ordering,
        Direction::Descending => ordering.reverse(),
    }
}
