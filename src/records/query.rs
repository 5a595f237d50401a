//! Field queries over stored transactions.

use crate::types::{Milestone, Transaction};
use std::cmp::Ordering;

/// Queryable transaction fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Hash,
    Address,
    Bundle,
    ReceivedAt,
    Ctime,
    Confirmed,
    Milestone,
    Reattached,
}

impl Field {
    /// Parse the field's wire name (`receivedAt`, `ctime`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "hash" => Some(Field::Hash),
            "address" => Some(Field::Address),
            "bundle" => Some(Field::Bundle),
            "receivedAt" => Some(Field::ReceivedAt),
            "ctime" => Some(Field::Ctime),
            "confirmed" => Some(Field::Confirmed),
            "milestone" => Some(Field::Milestone),
            "reattached" => Some(Field::Reattached),
            _ => None,
        }
    }

    /// Read this field from a transaction.
    pub fn value_of(&self, tx: &Transaction) -> FieldValue {
        match self {
            Field::Hash => FieldValue::Str(tx.hash.0.clone()),
            Field::Address => tx.address.clone().map_or(FieldValue::Null, FieldValue::Str),
            Field::Bundle => tx.bundle.clone().map_or(FieldValue::Null, FieldValue::Str),
            Field::ReceivedAt => tx.received_at.map_or(FieldValue::Null, FieldValue::Int),
            Field::Ctime => tx.ctime.map_or(FieldValue::Null, FieldValue::Int),
            Field::Confirmed => FieldValue::Bool(tx.confirmed),
            Field::Milestone => match &tx.milestone {
                None => FieldValue::Null,
                Some(Milestone::Index(i)) => FieldValue::Int(*i as i64),
                Some(Milestone::Marker(m)) => FieldValue::Str(m.clone()),
            },
            Field::Reattached => FieldValue::Bool(tx.reattached),
        }
    }
}

/// A comparable field value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl FieldValue {
    /// Order two values. Values of different kinds do not compare,
    /// except that `Null` sorts before everything.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Some(Ordering::Equal),
            (FieldValue::Null, _) => Some(Ordering::Less),
            (_, FieldValue::Null) => Some(Ordering::Greater),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Str(a), FieldValue::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

/// Comparison applied by a condition.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Eq(FieldValue),
    Ne(FieldValue),
    Gt(FieldValue),
    Gte(FieldValue),
    Lt(FieldValue),
    Lte(FieldValue),
    In(Vec<FieldValue>),
}

/// A single `field op value` condition.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub field: Field,
    pub op: Op,
}

impl Condition {
    pub fn matches(&self, tx: &Transaction) -> bool {
        let value = self.field.value_of(tx);
        match &self.op {
            Op::Eq(v) => value == *v,
            Op::Ne(v) => value != *v,
            Op::Gt(v) => non_null(&value) && value.compare(v) == Some(Ordering::Greater),
            Op::Gte(v) => {
                non_null(&value)
                    && matches!(value.compare(v), Some(Ordering::Greater | Ordering::Equal))
            }
            Op::Lt(v) => non_null(&value) && value.compare(v) == Some(Ordering::Less),
            Op::Lte(v) => {
                non_null(&value)
                    && matches!(value.compare(v), Some(Ordering::Less | Ordering::Equal))
            }
            Op::In(values) => values.iter().any(|v| value == *v),
        }
    }
}

fn non_null(v: &FieldValue) -> bool {
    !matches!(v, FieldValue::Null)
}

/// Conjunction of conditions. The empty query matches every transaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub conditions: Vec<Condition>,
}

impl Query {
    /// Match everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, Op::Eq(value.into()))
    }

    pub fn ne(self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, Op::Ne(value.into()))
    }

    pub fn gt(self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, Op::Gt(value.into()))
    }

    pub fn gte(self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, Op::Gte(value.into()))
    }

    pub fn lt(self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, Op::Lt(value.into()))
    }

    pub fn lte(self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.with(field, Op::Lte(value.into()))
    }

    pub fn one_of(self, field: Field, values: Vec<FieldValue>) -> Self {
        self.with(field, Op::In(values))
    }

    fn with(mut self, field: Field, op: Op) -> Self {
        self.conditions.push(Condition { field, op });
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.conditions.iter().all(|c| c.matches(tx))
    }

    /// First string equality condition on `field`, used for index lookups.
    pub(crate) fn equality_on(&self, field: Field) -> Option<&str> {
        self.conditions.iter().find_map(|c| match (&c.field, &c.op) {
            (f, Op::Eq(FieldValue::Str(s))) if *f == field => Some(s.as_str()),
            _ => None,
        })
    }

    /// Inclusive receivedAt bounds implied by integer comparisons, used for index lookups.
    pub(crate) fn received_range(&self) -> Option<(i64, i64)> {
        let mut bounds: Option<(i64, i64)> = None;
        for c in self.conditions.iter().filter(|c| c.field == Field::ReceivedAt) {
            let (lo, hi) = match &c.op {
                Op::Eq(FieldValue::Int(v)) => (*v, *v),
                Op::Gt(FieldValue::Int(v)) => (v.saturating_add(1), i64::MAX),
                Op::Gte(FieldValue::Int(v)) => (*v, i64::MAX),
                Op::Lt(FieldValue::Int(v)) => (i64::MIN, v.saturating_sub(1)),
                Op::Lte(FieldValue::Int(v)) => (i64::MIN, *v),
                _ => continue,
            };
            let (from, to) = bounds.unwrap_or((i64::MIN, i64::MAX));
            bounds = Some((from.max(lo), to.min(hi)));
        }
        bounds
    }
}

/// Simple one-field sort.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sort {
    pub field: Field,
    pub descending: bool,
}

impl Sort {
    pub fn asc(field: Field) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn desc(field: Field) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    /// Stable sort in place. Incomparable values keep their relative order.
    pub fn apply(&self, txs: &mut [Transaction]) {
        txs.sort_by(|a, b| {
            let ord = self
                .field
                .value_of(a)
                .compare(&self.field.value_of(b))
                .unwrap_or(Ordering::Equal);
            if self.descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }
}
