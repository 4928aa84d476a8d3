//! A small predicate language over nodes and connections.
//!
//! Conditions address fields of the entity's JSON form by dotted path
//! (`"type"`, `"x"`, `"data.channel"`, `"metadata.tags"`) and combine with
//! `and`, `or` and `not`:
//!
//! ```
//! use serde_json::json;
//! use trellis_graph::query::{Condition, Query, SortDirection};
//!
//! let query = Query::new()
//!     .filter(Condition::and([
//!         Condition::is_in("type", json!(["sms", "ai-call"])),
//!         Condition::not(Condition::starts_with("label", "Draft")),
//!     ]))
//!     .sort_by("x", SortDirection::Asc)
//!     .paginate(1, 20);
//! assert!(query.compile().is_ok());
//! ```
//!
//! Missing fields read as `null`. Ordering operators compare numbers with
//! numbers and strings with strings; mixed comparisons are false.

use core::cmp::Ordering;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use trellis_core::value::get_path;
use trellis_core::{ErrorCode, codes};

/// Comparison applied to one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Equal to any element of an array.
    In,
    /// Equal to no element of an array.
    Nin,
    /// Substring of a string, or element of an array.
    Contains,
    /// String prefix.
    StartsWith,
    /// String suffix.
    EndsWith,
    /// Regular expression match on a string.
    Regex,
}

/// A filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    /// A single field comparison.
    Field {
        /// Dotted path into the entity.
        field: String,
        /// Comparison.
        op: Operator,
        /// Operand.
        value: Value,
    },
    /// All sub-conditions hold. Empty is true.
    And(Vec<Condition>),
    /// Any sub-condition holds. Empty is false.
    Or(Vec<Condition>),
    /// The sub-condition does not hold.
    Not(Box<Condition>),
}

macro_rules! field_ops {
    ($($(#[$meta:meta])* $name:ident => $op:ident,)*) => {
        impl Condition {
            $(
                $(#[$meta])*
                #[must_use]
                pub fn $name(field: impl Into<String>, value: impl Into<Value>) -> Self {
                    Condition::field(field, Operator::$op, value)
                }
            )*
        }
    };
}

field_ops! {
    /// `field == value`.
    eq => Eq,
    /// `field != value`.
    ne => Ne,
    /// `field > value`.
    gt => Gt,
    /// `field >= value`.
    gte => Gte,
    /// `field < value`.
    lt => Lt,
    /// `field <= value`.
    lte => Lte,
    /// `field` is one of the array `value`.
    is_in => In,
    /// `field` is none of the array `value`.
    not_in => Nin,
    /// `field` contains `value`.
    contains => Contains,
    /// `field` starts with `value`.
    starts_with => StartsWith,
    /// `field` ends with `value`.
    ends_with => EndsWith,
    /// `field` matches the pattern `value`.
    regex => Regex,
}

impl Condition {
    /// A single field comparison.
    #[must_use]
    pub fn field(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Condition::Field {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Conjunction.
    #[must_use]
    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::And(conditions.into_iter().collect())
    }

    /// Disjunction.
    #[must_use]
    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Or(conditions.into_iter().collect())
    }

    /// Negation.
    #[must_use]
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }
}

/// Sort order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    /// Dotted path into the entity.
    pub field: String,
    /// Order.
    #[serde(default)]
    pub direction: SortDirection,
}

/// 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Page number, starting at 1.
    pub page: usize,
    /// Items per page.
    pub page_size: usize,
}

/// Filter, sort and pagination in one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Query {
    /// Filter; `None` matches everything.
    pub condition: Option<Condition>,
    /// Sort keys, most significant first.
    pub sort: Vec<SortSpec>,
    /// Page selection; `None` returns every match.
    pub pagination: Option<Pagination>,
}

/// A page of query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult<T> {
    /// Matching items on this page.
    pub items: Vec<T>,
    /// Matching items across all pages.
    pub total: usize,
    /// Page number.
    pub page: usize,
    /// Page size; equals `total` when not paginated.
    pub page_size: usize,
    /// Number of pages.
    pub total_pages: usize,
}

/// A malformed query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A `regex` operand failed to compile.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidRegex {
        /// The pattern.
        pattern: String,
        /// Compiler message.
        message: String,
    },
    /// `in` / `nin` need an array operand.
    #[error("operator {0:?} requires an array value")]
    ExpectedArray(Operator),
    /// String operators need a string operand.
    #[error("operator {0:?} requires a string value")]
    ExpectedString(Operator),
    /// Page or page size is zero.
    #[error("page and page size must be at least 1")]
    InvalidPagination,
    /// An entity could not be converted to JSON.
    #[error("failed to serialize entity: {0}")]
    Serialize(String),
}

impl ErrorCode for QueryError {
    fn code(&self) -> &'static str {
        match self {
            QueryError::Serialize(_) => codes::SERIALIZATION_ERROR,
            _ => codes::INVALID_ARGUMENT,
        }
    }
}

impl Query {
    /// A query matching everything, unsorted, unpaginated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter.
    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Appends a sort key.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    /// Selects a page.
    #[must_use]
    pub fn paginate(mut self, page: usize, page_size: usize) -> Self {
        self.pagination = Some(Pagination { page, page_size });
        self
    }

    /// Checks operands and compiles patterns.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] for malformed operands or pagination.
    pub fn compile(&self) -> Result<CompiledQuery<'_>, QueryError> {
        if let Some(Pagination { page, page_size }) = self.pagination
            && (page == 0 || page_size == 0)
        {
            return Err(QueryError::InvalidPagination);
        }
        let matcher = self.condition.as_ref().map(Matcher::compile).transpose()?;
        Ok(CompiledQuery {
            query: self,
            matcher,
        })
    }

    /// Filters, sorts and paginates `items`.
    ///
    /// # Errors
    ///
    /// See [`compile`](Self::compile).
    pub fn run<'a, T>(&self, items: impl IntoIterator<Item = &'a T>) -> Result<QueryResult<T>, QueryError>
    where
        T: Serialize + Clone + 'a,
    {
        self.compile()?.run(items)
    }
}

/// A validated query ready to run repeatedly.
#[derive(Debug)]
pub struct CompiledQuery<'q> {
    query: &'q Query,
    matcher: Option<Matcher>,
}

impl CompiledQuery<'_> {
    /// Filters, sorts and paginates `items`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Serialize`] if an item cannot be viewed as JSON.
    pub fn run<'a, T>(&self, items: impl IntoIterator<Item = &'a T>) -> Result<QueryResult<T>, QueryError>
    where
        T: Serialize + Clone + 'a,
    {
        let mut matched: Vec<(Value, &T)> = Vec::new();
        for item in items {
            let json = serde_json::to_value(item).map_err(|err| QueryError::Serialize(err.to_string()))?;
            if self.matcher.as_ref().is_none_or(|m| m.matches(&json)) {
                matched.push((json, item));
            }
        }

        if !self.query.sort.is_empty() {
            matched.sort_by(|(a, _), (b, _)| {
                self.query
                    .sort
                    .iter()
                    .map(|spec| {
                        let ordering = compare_for_sort(field(a, &spec.field), field(b, &spec.field));
                        match spec.direction {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        let total = matched.len();
        let (page, page_size) = match self.query.pagination {
            Some(Pagination { page, page_size }) => (page, page_size),
            None => (1, total.max(1)),
        };
        let items: Vec<T> = matched
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .map(|(_, item)| item.clone())
            .collect();
        Ok(QueryResult {
            items,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Evaluation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Matcher {
    Field {
        field: String,
        test: FieldTest,
    },
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
    Not(Box<Matcher>),
}

#[derive(Debug)]
enum FieldTest {
    Compare(Operator, Value),
    Set { values: Vec<Value>, negate: bool },
    Text(Operator, String),
    Pattern(Regex),
}

impl Matcher {
    fn compile(condition: &Condition) -> Result<Self, QueryError> {
        Ok(match condition {
            Condition::And(items) => Matcher::And(items.iter().map(Matcher::compile).collect::<Result<_, _>>()?),
            Condition::Or(items) => Matcher::Or(items.iter().map(Matcher::compile).collect::<Result<_, _>>()?),
            Condition::Not(inner) => Matcher::Not(Box::new(Matcher::compile(inner)?)),
            Condition::Field { field, op, value } => Matcher::Field {
                field: field.clone(),
                test: FieldTest::compile(*op, value)?,
            },
        })
    }

    fn matches(&self, entity: &Value) -> bool {
        match self {
            Matcher::And(items) => items.iter().all(|m| m.matches(entity)),
            Matcher::Or(items) => items.iter().any(|m| m.matches(entity)),
            Matcher::Not(inner) => !inner.matches(entity),
            Matcher::Field { field: path, test } => test.matches(field(entity, path)),
        }
    }
}

impl FieldTest {
    fn compile(op: Operator, value: &Value) -> Result<Self, QueryError> {
        Ok(match op {
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                FieldTest::Compare(op, value.clone())
            }
            Operator::In | Operator::Nin => {
                let Value::Array(values) = value else {
                    return Err(QueryError::ExpectedArray(op));
                };
                FieldTest::Set {
                    values: values.clone(),
                    negate: op == Operator::Nin,
                }
            }
            Operator::Contains => match value {
                Value::String(text) => FieldTest::Text(op, text.clone()),
                other => FieldTest::Compare(op, other.clone()),
            },
            Operator::StartsWith | Operator::EndsWith => {
                let Value::String(text) = value else {
                    return Err(QueryError::ExpectedString(op));
                };
                FieldTest::Text(op, text.clone())
            }
            Operator::Regex => {
                let Value::String(pattern) = value else {
                    return Err(QueryError::ExpectedString(op));
                };
                FieldTest::Pattern(Regex::new(pattern).map_err(|err| QueryError::InvalidRegex {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })?)
            }
        })
    }

    fn matches(&self, actual: &Value) -> bool {
        match self {
            FieldTest::Compare(Operator::Eq, expected) => values_equal(actual, expected),
            FieldTest::Compare(Operator::Ne, expected) => !values_equal(actual, expected),
            FieldTest::Compare(Operator::Contains, expected) => match actual {
                Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
                _ => false,
            },
            FieldTest::Compare(op, expected) => match compare(actual, expected) {
                Some(ordering) => match op {
                    Operator::Gt => ordering.is_gt(),
                    Operator::Gte => ordering.is_ge(),
                    Operator::Lt => ordering.is_lt(),
                    _ => ordering.is_le(),
                },
                None => false,
            },
            FieldTest::Set { values, negate } => {
                values.iter().any(|value| values_equal(actual, value)) != *negate
            }
            FieldTest::Text(op, text) => match actual {
                Value::String(s) => match op {
                    Operator::StartsWith => s.starts_with(text.as_str()),
                    Operator::EndsWith => s.ends_with(text.as_str()),
                    _ => s.contains(text.as_str()),
                },
                Value::Array(items) if *op == Operator::Contains => {
                    items.iter().any(|item| item.as_str() == Some(text.as_str()))
                }
                _ => false,
            },
            FieldTest::Pattern(regex) => actual.as_str().is_some_and(|s| regex.is_match(s)),
        }
    }
}

static NULL: Value = Value::Null;

fn field<'a>(entity: &'a Value, path: &str) -> &'a Value {
    get_path(entity, path).unwrap_or(&NULL)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order for sorting: null < bool < number < string < other.
fn compare_for_sort(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => compare(a, b).unwrap_or_else(|| rank(a).cmp(&rank(b))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::{Node, NodeKind};

    fn nodes() -> Vec<Node> {
        let mut sms = Node::new("sms-1", NodeKind::Sms, 300.0, 0.0);
        sms.label = Some("Welcome SMS".into());
        sms.data.insert("tags".into(), json!(["vip", "new"]));
        let mut call = Node::new("call-1", NodeKind::AiCall, 100.0, 0.0);
        call.label = Some("Draft call".into());
        let wait = Node::new("wait-1", NodeKind::Wait, 200.0, 0.0);
        vec![sms, call, wait]
    }

    fn ids(result: &QueryResult<Node>) -> Vec<&str> {
        result.items.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn query_filters_by_type_and_numeric_range() {
        let nodes = nodes();
        let result = Query::new()
            .filter(Condition::and([
                Condition::ne("type", "wait"),
                Condition::gte("x", 150),
            ]))
            .run(&nodes)
            .expect("query should compile");
        assert_eq!(ids(&result), vec!["sms-1"]);
    }

    #[test]
    fn query_supports_or_not_and_string_ops() {
        let nodes = nodes();
        let result = Query::new()
            .filter(Condition::or([
                Condition::starts_with("label", "Draft"),
                Condition::not(Condition::regex("id", "^(sms|call)-")),
            ]))
            .run(&nodes)
            .expect("query should compile");
        assert_eq!(ids(&result), vec!["call-1", "wait-1"]);
    }

    #[test]
    fn contains_matches_array_elements_and_substrings() {
        let nodes = nodes();
        let tagged = Query::new()
            .filter(Condition::contains("data.tags", "vip"))
            .run(&nodes)
            .expect("query should compile");
        assert_eq!(ids(&tagged), vec!["sms-1"]);
        let labelled = Query::new()
            .filter(Condition::contains("label", "call"))
            .run(&nodes)
            .expect("query should compile");
        assert_eq!(ids(&labelled), vec!["call-1"]);
    }

    #[test]
    fn sort_and_paginate() {
        let nodes = nodes();
        let query = Query::new().sort_by("x", SortDirection::Desc).paginate(2, 2);
        let result = query.run(&nodes).expect("query should compile");
        assert_eq!(ids(&result), vec!["call-1"]);
        assert_eq!(result.total, 3);
        assert_eq!(result.total_pages, 2);
    }

    #[test]
    fn in_and_nin_need_arrays() {
        let nodes = nodes();
        let result = Query::new()
            .filter(Condition::not_in("type", json!(["sms", "wait"])))
            .run(&nodes)
            .expect("query should compile");
        assert_eq!(ids(&result), vec!["call-1"]);
        assert_eq!(
            Query::new().filter(Condition::is_in("type", "sms")).compile().err(),
            Some(QueryError::ExpectedArray(Operator::In))
        );
    }

    #[test]
    fn malformed_queries_are_rejected() {
        assert!(matches!(
            Query::new().filter(Condition::regex("id", "(")).compile(),
            Err(QueryError::InvalidRegex { .. })
        ));
        assert_eq!(
            Query::new().paginate(0, 10).compile().err(),
            Some(QueryError::InvalidPagination)
        );
    }

    #[test]
    fn missing_fields_read_as_null() {
        let nodes = nodes();
        let result = Query::new()
            .filter(Condition::eq("data.missing", Value::Null))
            .run(&nodes)
            .expect("query should compile");
        assert_eq!(result.total, 3);
    }
}
