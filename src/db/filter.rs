//! Structured query filters.
//!
//! A [`Filter`] is a small predicate tree over column names. It is compiled
//! into a parameterised `WHERE` clause with [`sqlx::QueryBuilder`], so values
//! are always bound and never spliced into SQL text. Column names are
//! `&'static str` and therefore always come from the code, never from input.

use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Real(f64),
    Int(i64),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(v as i64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    Ne(&'static str, Value),
    /// Inclusive range.
    Between(&'static str, Value, Value),
    /// An empty list matches nothing.
    In(&'static str, Vec<Value>),
    IsNull(&'static str),
    /// An empty conjunction matches everything.
    And(Vec<Filter>),
    /// An empty disjunction matches nothing.
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Eq(column, value.into())
    }

    pub fn ne(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Ne(column, value.into())
    }

    pub fn between(column: &'static str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Filter::Between(column, low.into(), high.into())
    }

    pub fn in_list<V, I>(column: &'static str, values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Filter::In(column, values.into_iter().map(Into::into).collect())
    }

    pub fn all(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn any(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    pub fn negate(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Starts a query with `prefix`, followed by `WHERE` and this filter.
    pub fn query<'args>(&self, prefix: &str) -> QueryBuilder<'args, Sqlite> {
        let mut builder = QueryBuilder::new(prefix);
        builder.push(" WHERE ");
        self.push_to(&mut builder);
        builder
    }

    /// Appends this filter as a boolean SQL expression.
    pub fn push_to(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Filter::Eq(column, value) => {
                builder.push(*column).push(" = ");
                push_value(builder, value);
            }
            Filter::Ne(column, value) => {
                builder.push(*column).push(" <> ");
                push_value(builder, value);
            }
            Filter::Between(column, low, high) => {
                builder.push(*column).push(" BETWEEN ");
                push_value(builder, low);
                builder.push(" AND ");
                push_value(builder, high);
            }
            Filter::In(_, values) if values.is_empty() => {
                builder.push("0 = 1");
            }
            Filter::In(column, values) => {
                builder.push(*column).push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        builder.push(", ");
                    }
                    push_value(builder, value);
                }
                builder.push(")");
            }
            Filter::IsNull(column) => {
                builder.push(*column).push(" IS NULL");
            }
            Filter::And(filters) => push_joined(builder, filters, " AND ", "1 = 1"),
            Filter::Or(filters) => push_joined(builder, filters, " OR ", "0 = 1"),
            Filter::Not(inner) => {
                builder.push("NOT (");
                inner.push_to(builder);
                builder.push(")");
            }
        }
    }

    /// Renders the clause with `?` placeholders.
    pub fn to_sql(&self) -> String {
        let mut builder = QueryBuilder::<Sqlite>::new("");
        self.push_to(&mut builder);
        builder.sql().to_string()
    }

    /// Bound values in placeholder order.
    pub fn params(&self) -> Vec<&Value> {
        let mut out = Vec::new();
        self.collect_params(&mut out);
        out
    }

    fn collect_params<'a>(&'a self, out: &mut Vec<&'a Value>) {
        match self {
            Filter::Eq(_, v) | Filter::Ne(_, v) => out.push(v),
            Filter::Between(_, low, high) => {
                out.push(low);
                out.push(high);
            }
            Filter::In(_, values) => out.extend(values.iter()),
            Filter::IsNull(_) => {}
            Filter::And(filters) | Filter::Or(filters) => {
                for f in filters {
                    f.collect_params(out);
                }
            }
            Filter::Not(inner) => inner.collect_params(out),
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::Text(s) => builder.push_bind(s.clone()),
        Value::Real(f) => builder.push_bind(*f),
        Value::Int(i) => builder.push_bind(*i),
    };
}

fn push_joined(
    builder: &mut QueryBuilder<'_, Sqlite>,
    filters: &[Filter],
    separator: &str,
    empty: &str,
) {
    if filters.is_empty() {
        builder.push(empty);
        return;
    }
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            builder.push(separator);
        }
        builder.push("(");
        filter.push_to(builder);
        builder.push(")");
    }
}
