// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Query and update descriptions evaluated against JSON documents
//!
//! A [`Filter`] is a conjunction of per-field conditions addressed by
//! dotted paths (`"details.type"`). An [`Update`] carries set/inc/unset
//! mutations. Both are plain data so a store backend can translate them
//! to its native query language; the in-memory store evaluates them
//! directly with [`Filter::matches`] and [`Update::apply`].

use serde_json::Value;
use std::cmp::Ordering;

/// A single per-field condition
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    /// Field equals the value (a missing field only matches `Eq(Null)`)
    Eq(Value),
    /// Field is absent or differs from the value
    Ne(Value),
    /// Field equals one of the values
    In(Vec<Value>),
    /// Field presence
    Exists(bool),
    /// Field is strictly less than the value
    Lt(Value),
    /// Field is strictly greater than the value
    Gt(Value),
}

/// Conjunction of conditions over dotted field paths
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    terms: Vec<(String, Cond)>,
}

impl Filter {
    /// A filter matching every document
    pub fn all() -> Self {
        Self::default()
    }

    /// Equality on the `_id` field
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::all().eq("_id", id.into())
    }

    pub fn eq(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(path, Cond::Eq(value.into()))
    }

    pub fn ne(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(path, Cond::Ne(value.into()))
    }

    pub fn any_of(self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.push(path, Cond::In(values))
    }

    pub fn exists(self, path: impl Into<String>, exists: bool) -> Self {
        self.push(path, Cond::Exists(exists))
    }

    pub fn lt(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(path, Cond::Lt(value.into()))
    }

    pub fn gt(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(path, Cond::Gt(value.into()))
    }

    fn push(mut self, path: impl Into<String>, cond: Cond) -> Self {
        self.terms.push((path.into(), cond));
        self
    }

    /// Evaluate the filter against a document
    pub fn matches(&self, doc: &Value) -> bool {
        self.terms.iter().all(|(path, cond)| {
            let field = lookup(doc, path);
            match cond {
                Cond::Eq(v) => field.unwrap_or(&Value::Null) == v,
                Cond::Ne(v) => field.unwrap_or(&Value::Null) != v,
                Cond::In(vs) => {
                    let field = field.unwrap_or(&Value::Null);
                    vs.iter().any(|v| v == field)
                }
                Cond::Exists(want) => {
                    let present = field.map(|v| !v.is_null()).unwrap_or(false);
                    present == *want
                }
                Cond::Lt(v) => field
                    .and_then(|f| compare(f, v))
                    .map(|o| o == Ordering::Less)
                    .unwrap_or(false),
                Cond::Gt(v) => field
                    .and_then(|f| compare(f, v))
                    .map(|o| o == Ordering::Greater)
                    .unwrap_or(false),
            }
        })
    }

    /// The equality terms, used to seed an upserted document
    pub fn equality_terms(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.terms.iter().filter_map(|(path, cond)| match cond {
            Cond::Eq(v) => Some((path.as_str(), v)),
            _ => None,
        })
    }
}

/// Resolve a dotted path inside a document
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Order two JSON scalars, if they are comparable
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        _ => None,
    }
}

/// Field mutations applied by update operations
#[derive(Debug, Clone, Default)]
pub struct Update {
    set: Vec<(String, Value)>,
    inc: Vec<(String, i64)>,
    unset: Vec<String>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((path.into(), value.into()));
        self
    }

    pub fn inc(mut self, path: impl Into<String>, delta: i64) -> Self {
        self.inc.push((path.into(), delta));
        self
    }

    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.unset.push(path.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.inc.is_empty() && self.unset.is_empty()
    }

    /// Apply the mutations to a document in place
    pub fn apply(&self, doc: &mut Value) {
        for (path, value) in &self.set {
            set_path(doc, path, value.clone());
        }
        for (path, delta) in &self.inc {
            let current = lookup(doc, path).and_then(Value::as_i64).unwrap_or(0);
            set_path(doc, path, Value::from(current + delta));
        }
        for path in &self.unset {
            unset_path(doc, path);
        }
    }
}

/// Write a value at a dotted path, creating intermediate objects
fn set_path(doc: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for segment in &segments[..segments.len() - 1] {
        let obj = match current.as_object_mut() {
            Some(obj) => obj,
            None => return,
        };
        current = obj
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
    if let Some(obj) = current.as_object_mut() {
        obj.insert(segments[segments.len() - 1].to_string(), value);
    }
}

fn unset_path(doc: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for segment in &segments[..segments.len() - 1] {
        match current.get_mut(*segment) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Some(obj) = current.as_object_mut() {
        obj.remove(segments[segments.len() - 1]);
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
