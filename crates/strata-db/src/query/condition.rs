//! Boolean condition tree
//!
//! A [`WhereNode`] is either a leaf predicate or an AND/OR composite over
//! an ordered list of children. Rendering is a two-pass contract: the
//! *generation* pass appends one placeholder per leaf in tree order, the
//! *injection* pass emits the bound values in the identical order. Both
//! passes walk the same tree, so placeholder position N always receives
//! value N. An empty composite renders nothing and acts as a no-op
//! filter.

use std::fmt;

use serde_json::Value as JsonValue;

use crate::value::{Document, FieldValue};

/// Comparison operators supported in leaf predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "="),
            CompareOp::Ne => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Ge => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Le => write!(f, "<="),
            CompareOp::Like => write!(f, "LIKE"),
        }
    }
}

/// Leaf predicate: column, operator, deferred bound value
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCondition {
    pub column: String,
    pub op: CompareOp,
    pub value: FieldValue,
}

impl QueryCondition {
    pub fn new(column: impl Into<String>, op: CompareOp, value: impl Into<FieldValue>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }
}

/// Monotonically increasing placeholder cursor shared by every leaf of a
/// statement, across SET assignments and the WHERE tree alike.
#[derive(Debug)]
pub struct ParamCursor {
    next: usize,
}

impl ParamCursor {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Emit the next positional placeholder and advance
    pub fn placeholder(&mut self) -> String {
        let text = format!("${}", self.next);
        self.next += 1;
        text
    }

    /// Number of placeholders emitted so far
    pub fn emitted(&self) -> usize {
        self.next - 1
    }
}

impl Default for ParamCursor {
    fn default() -> Self {
        Self::new()
    }
}

/// Boolean expression tree over leaf predicates
#[derive(Debug, Clone, PartialEq)]
pub enum WhereNode {
    Condition(QueryCondition),
    And(Vec<WhereNode>),
    Or(Vec<WhereNode>),
}

impl WhereNode {
    /// The always-true empty filter
    pub fn empty() -> Self {
        WhereNode::And(Vec::new())
    }

    /// Convenience equality leaf
    pub fn eq(column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        WhereNode::Condition(QueryCondition::new(column, CompareOp::Eq, value))
    }

    /// Convenience leaf with an explicit operator
    pub fn condition(
        column: impl Into<String>,
        op: CompareOp,
        value: impl Into<FieldValue>,
    ) -> Self {
        WhereNode::Condition(QueryCondition::new(column, op, value))
    }

    /// True when this node renders no text and binds no value
    pub fn is_empty(&self) -> bool {
        match self {
            WhereNode::Condition(_) => false,
            WhereNode::And(children) | WhereNode::Or(children) => {
                children.iter().all(WhereNode::is_empty)
            }
        }
    }

    /// Generation pass: append placeholder text for every leaf in tree
    /// order, advancing the shared cursor once per leaf.
    pub fn generate(&self, sql: &mut String, cursor: &mut ParamCursor) {
        match self {
            WhereNode::Condition(cond) => {
                sql.push_str(&cond.column);
                sql.push(' ');
                sql.push_str(&cond.op.to_string());
                sql.push(' ');
                sql.push_str(&cursor.placeholder());
            }
            WhereNode::And(children) => Self::generate_composite(children, "AND", sql, cursor),
            WhereNode::Or(children) => Self::generate_composite(children, "OR", sql, cursor),
        }
    }

    fn generate_composite(
        children: &[WhereNode],
        joiner: &str,
        sql: &mut String,
        cursor: &mut ParamCursor,
    ) {
        let live: Vec<&WhereNode> = children.iter().filter(|c| !c.is_empty()).collect();
        if live.is_empty() {
            return;
        }
        sql.push('(');
        for (i, child) in live.iter().enumerate() {
            if i > 0 {
                sql.push(' ');
                sql.push_str(joiner);
                sql.push(' ');
            }
            child.generate(sql, cursor);
        }
        sql.push(')');
    }

    /// Injection pass: append each leaf's value in the identical tree
    /// order the generation pass used.
    pub fn inject(&self, params: &mut Vec<FieldValue>) {
        match self {
            WhereNode::Condition(cond) => params.push(cond.value.clone()),
            WhereNode::And(children) | WhereNode::Or(children) => {
                for child in children.iter().filter(|c| !c.is_empty()) {
                    child.inject(params);
                }
            }
        }
    }

    /// Evaluate the tree directly against a stored document. This is the
    /// document-backend counterpart of the generate/inject pair; an empty
    /// composite matches everything.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            WhereNode::Condition(cond) => {
                let stored = doc.get(&cond.column).unwrap_or(&JsonValue::Null);
                compare(stored, cond.op, &cond.value)
            }
            WhereNode::And(children) => children
                .iter()
                .filter(|c| !c.is_empty())
                .all(|c| c.matches(doc)),
            WhereNode::Or(children) => {
                let live: Vec<&WhereNode> = children.iter().filter(|c| !c.is_empty()).collect();
                live.is_empty() || live.iter().any(|c| c.matches(doc))
            }
        }
    }
}

fn compare(stored: &JsonValue, op: CompareOp, value: &FieldValue) -> bool {
    let wanted = value.to_json();
    match op {
        CompareOp::Eq => json_eq(stored, &wanted),
        CompareOp::Ne => !json_eq(stored, &wanted),
        CompareOp::Gt => json_ord(stored, &wanted).map_or(false, |o| o.is_gt()),
        CompareOp::Ge => json_ord(stored, &wanted).map_or(false, |o| o.is_ge()),
        CompareOp::Lt => json_ord(stored, &wanted).map_or(false, |o| o.is_lt()),
        CompareOp::Le => json_ord(stored, &wanted).map_or(false, |o| o.is_le()),
        CompareOp::Like => match (stored.as_str(), wanted.as_str()) {
            (Some(s), Some(pattern)) => like_match(s, pattern),
            _ => false,
        },
    }
}

fn json_eq(left: &JsonValue, right: &JsonValue) -> bool {
    // numbers compare by value so 5 == 5.0
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn json_ord(left: &JsonValue, right: &JsonValue) -> Option<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

/// Minimal LIKE support for the document backend: leading and/or
/// trailing `%` wildcards.
fn like_match(text: &str, pattern: &str) -> bool {
    let starts = pattern.starts_with('%');
    let ends = pattern.ends_with('%') && pattern.len() > 1;
    let core = pattern.trim_start_matches('%').trim_end_matches('%');
    match (starts, ends) {
        (true, true) => text.contains(core),
        (true, false) => text.ends_with(core),
        (false, true) => text.starts_with(core),
        (false, false) => text == pattern,
    }
}
