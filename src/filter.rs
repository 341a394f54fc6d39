//! Filter Evaluator
//!
//! Boolean filters for `list`: a disjunction of conjunctions of field
//! predicates.
//!
//! ```text
//! OR[ AND[f1, f2], AND[f3] ]   ≡   (f1 ∧ f2) ∨ f3
//! ```
//!
//! - An empty OR list matches nothing
//! - An empty AND group matches everything
//! - Each filter keeps a record iff `predicate(value) != negate`
//!
//! Expressions are compiled against a table before any data is read, so a
//! bad field name, a predicate on the wrong field type or an invalid regex
//! fails the call without touching the shard.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::schema::{FieldType, FieldValue, Record, TableDef};

/// Test applied to one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate {
    /// Inclusive numeric range (number fields)
    Range { min: f64, max: f64 },

    /// Regex search anywhere in the value (string fields)
    Regex { pattern: String },

    /// Equality with a boolean (boolean fields)
    Flag { value: bool },
}

impl Predicate {
    fn name(&self) -> &'static str {
        match self {
            Predicate::Range { .. } => "range",
            Predicate::Regex { .. } => "regex",
            Predicate::Flag { .. } => "flag",
        }
    }

    fn field_type(&self) -> FieldType {
        match self {
            Predicate::Range { .. } => FieldType::Number,
            Predicate::Regex { .. } => FieldType::String,
            Predicate::Flag { .. } => FieldType::Boolean,
        }
    }
}

/// A predicate bound to a field name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub predicate: Predicate,
    #[serde(default)]
    pub negate: bool,
}

impl Filter {
    pub fn range(field: impl Into<String>, min: f64, max: f64) -> Self {
        Self::new(field, Predicate::Range { min, max })
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(
            field,
            Predicate::Regex {
                pattern: pattern.into(),
            },
        )
    }

    pub fn flag(field: impl Into<String>, value: bool) -> Self {
        Self::new(field, Predicate::Flag { value })
    }

    /// Invert this filter
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    fn new(field: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            field: field.into(),
            predicate,
            negate: false,
        }
    }
}

/// `OR[ AND[Filter…] … ]`, serialized as a JSON array of arrays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterExpr {
    pub groups: Vec<Vec<Filter>>,
}

impl FilterExpr {
    pub fn new(groups: Vec<Vec<Filter>>) -> Self {
        Self { groups }
    }

    /// Matches nothing (no groups)
    pub fn none() -> Self {
        Self::default()
    }

    /// Matches every record (one empty group)
    pub fn all() -> Self {
        Self {
            groups: vec![Vec::new()],
        }
    }

    /// Add an AND group
    pub fn or(mut self, group: Vec<Filter>) -> Self {
        self.groups.push(group);
        self
    }
}

enum Matcher {
    Range { min: f64, max: f64 },
    Regex(Regex),
    Flag(bool),
}

impl Matcher {
    fn matches(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Matcher::Range { min, max }, FieldValue::Number(n)) => *min <= *n && *n <= *max,
            (Matcher::Regex(re), FieldValue::String(s)) => re.is_match(s),
            (Matcher::Flag(expected), FieldValue::Boolean(b)) => expected == b,
            _ => false,
        }
    }
}

struct Condition {
    index: usize,
    matcher: Matcher,
    negate: bool,
}

impl Condition {
    fn keeps(&self, record: &Record) -> bool {
        let matched = record
            .get(self.index)
            .map_or(false, |value| self.matcher.matches(value));
        matched != self.negate
    }
}

/// A filter expression validated against one table
pub struct CompiledFilter {
    groups: Vec<Vec<Condition>>,
}

impl CompiledFilter {
    /// Resolve field names, check predicate types and compile regexes
    pub fn compile(table: &TableDef, expr: &FilterExpr) -> Result<Self> {
        let mut groups = Vec::with_capacity(expr.groups.len());

        for group in &expr.groups {
            let mut conditions = Vec::with_capacity(group.len());
            for filter in group {
                conditions.push(Self::compile_filter(table, filter)?);
            }
            groups.push(conditions);
        }

        Ok(Self { groups })
    }

    /// True if evaluation can only return an empty set
    pub fn matches_nothing(&self) -> bool {
        self.groups.is_empty()
    }

    /// Union of every group's matches, first-match order, each record once
    ///
    /// `records` come from one shard, so positions identify ids uniquely.
    pub fn evaluate(&self, records: &[Record]) -> Vec<Record> {
        let mut selected = vec![false; records.len()];
        let mut order = Vec::new();

        for group in &self.groups {
            let mut candidates: Vec<usize> = (0..records.len()).collect();
            for condition in group {
                candidates.retain(|&i| condition.keeps(&records[i]));
                if candidates.is_empty() {
                    break;
                }
            }

            for i in candidates {
                if !selected[i] {
                    selected[i] = true;
                    order.push(i);
                }
            }
        }

        order.into_iter().map(|i| records[i].clone()).collect()
    }

    fn compile_filter(table: &TableDef, filter: &Filter) -> Result<Condition> {
        let index = table
            .field_index(&filter.field)
            .ok_or_else(|| StoreError::UnknownField {
                table: table.name().to_string(),
                field: filter.field.clone(),
            })?;

        let actual = table.fields()[index].field_type;
        if actual != filter.predicate.field_type() {
            return Err(StoreError::FilterTypeMismatch {
                field: filter.field.clone(),
                predicate: filter.predicate.name(),
                actual,
            });
        }

        let matcher = match &filter.predicate {
            Predicate::Range { min, max } => Matcher::Range {
                min: *min,
                max: *max,
            },
            Predicate::Regex { pattern } => {
                let re = Regex::new(pattern).map_err(|source| StoreError::InvalidRegex {
                    pattern: pattern.clone(),
                    source,
                })?;
                Matcher::Regex(re)
            }
            Predicate::Flag { value } => Matcher::Flag(*value),
        };

        Ok(Condition {
            index,
            matcher,
            negate: filter.negate,
        })
    }
}
