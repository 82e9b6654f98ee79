//! SELECT evaluation over the dataset snapshot.
//!
//! Parses the materialized query with the Postgres dialect and runs it
//! against the snapshot collections, so staging answers follow the same
//! SQL as the database: `WHERE`, `ORDER BY`, `LIMIT`/`OFFSET`, column
//! projection and derived tables. Anything outside that subset (joins,
//! grouping, function calls) is rejected rather than approximated.
//!
//! ```text
//! sql ──parse──► Query
//!                  │ FROM table / (subquery)
//!                  ▼
//!      rows ─ WHERE ─ project ─ DISTINCT ─ ORDER BY ─ OFFSET/LIMIT
//! ```

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde_json::Value;
use sqlparser::ast::{
    BinaryOperator, DateTimeField, Distinct, Expr, GroupByExpr, Ident, OrderByExpr, Query, Select,
    SelectItem, SetExpr, Statement, TableFactor, UnaryOperator, Value as SqlValue,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use super::staging::TableMap;
use super::RawRow;
use crate::dataset::DatasetSnapshot;
use crate::error::StoreError;

/// Run one SELECT with `$1..$n` bound to `params`.
pub fn run_select(
    sql: &str,
    params: &[String],
    snapshot: &DatasetSnapshot,
    tables: &TableMap,
) -> Result<Vec<RawRow>, StoreError> {
    let mut statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| StoreError::Rejected(format!("syntax error: {}", e)))?;

    let query = match (statements.pop(), statements.is_empty()) {
        (Some(Statement::Query(query)), true) => query,
        _ => return Err(unsupported("anything but a single SELECT")),
    };

    Evaluator {
        params,
        snapshot,
        tables,
    }
    .query(&query)
}

fn unsupported(what: impl std::fmt::Display) -> StoreError {
    StoreError::Rejected(format!("not supported in staging mode: {}", what))
}

struct Evaluator<'a> {
    params: &'a [String],
    snapshot: &'a DatasetSnapshot,
    tables: &'a TableMap,
}

impl<'a> Evaluator<'a> {
    fn query(&self, query: &Query) -> Result<Vec<RawRow>, StoreError> {
        if query.with.is_some() {
            return Err(unsupported("WITH"));
        }
        if query.fetch.is_some() {
            return Err(unsupported("FETCH"));
        }
        let SetExpr::Select(select) = query.body.as_ref() else {
            return Err(unsupported(format!("query body `{}`", query.body)));
        };
        check_plain_select(select)?;

        let source = self.source(select)?;
        let columns: HashSet<String> = source.iter().flat_map(|r| r.keys().cloned()).collect();

        let mut kept: Vec<(&RawRow, RawRow)> = Vec::new();
        for row in source.iter() {
            let scope = Scope::new(row, &columns);
            if let Some(filter) = &select.selection {
                if truth(&self.expr(filter, &scope)?)? != Some(true) {
                    continue;
                }
            }
            kept.push((row, self.project(&select.projection, &scope)?));
        }

        if matches!(select.distinct, Some(Distinct::Distinct)) {
            let mut seen = HashSet::new();
            kept.retain(|(_, out)| seen.insert(serde_json::to_string(out).unwrap_or_default()));
        }

        let mut rows: Vec<RawRow> = match &query.order_by {
            Some(order_by) if !order_by.exprs.is_empty() => {
                let mut keyed = Vec::with_capacity(kept.len());
                for (row, out) in kept {
                    let scope = Scope::new(row, &columns).with_output(&out);
                    let keys = order_by
                        .exprs
                        .iter()
                        .map(|o| self.expr(&o.expr, &scope))
                        .collect::<Result<Vec<_>, _>>()?;
                    keyed.push((keys, out));
                }
                keyed.sort_by(|(a, _), (b, _)| {
                    order_by
                        .exprs
                        .iter()
                        .zip(a.iter().zip(b))
                        .map(|(o, (x, y))| sort_order(o, x, y))
                        .find(|ord| ord.is_ne())
                        .unwrap_or(Ordering::Equal)
                });
                keyed.into_iter().map(|(_, out)| out).collect()
            }
            _ => kept.into_iter().map(|(_, out)| out).collect(),
        };

        if let Some(offset) = &query.offset {
            let skip = self.count(&offset.value, "OFFSET")?;
            rows.drain(..skip.min(rows.len()));
        }
        if let Some(limit) = &query.limit {
            let take = self.count(limit, "LIMIT")?;
            rows.truncate(take);
        }
        Ok(rows)
    }

    fn source(&self, select: &Select) -> Result<Cow<'a, [RawRow]>, StoreError> {
        let [from] = select.from.as_slice() else {
            return Err(unsupported("a FROM clause without exactly one source"));
        };
        if !from.joins.is_empty() {
            return Err(unsupported("JOIN"));
        }
        match &from.relation {
            TableFactor::Table { name, .. } => {
                let table = name.to_string().replace('"', "");
                let collection = self
                    .tables
                    .resolve(&table)
                    .ok_or_else(|| StoreError::Rejected(format!("unknown table '{}'", table)))?;
                Ok(Cow::Borrowed(self.snapshot.collection(collection)))
            }
            TableFactor::Derived { subquery, .. } => Ok(Cow::Owned(self.query(subquery)?)),
            other => Err(unsupported(format!("FROM {}", other))),
        }
    }

    fn project(&self, items: &[SelectItem], scope: &Scope<'_>) -> Result<RawRow, StoreError> {
        let mut out = RawRow::new();
        for item in items {
            match item {
                SelectItem::Wildcard(..) | SelectItem::QualifiedWildcard(..) => {
                    out.extend(scope.row.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                SelectItem::UnnamedExpr(expr) => {
                    out.insert(column_label(expr), self.expr(expr, scope)?);
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    out.insert(alias.value.clone(), self.expr(expr, scope)?);
                }
            }
        }
        Ok(out)
    }

    /// Non-negative row count for LIMIT / OFFSET.
    fn count(&self, expr: &Expr, clause: &str) -> Result<usize, StoreError> {
        let empty = RawRow::new();
        let columns = HashSet::new();
        let value = self.expr(expr, &Scope::new(&empty, &columns))?;
        let count = match &value {
            Value::Null => Some(usize::MAX),
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        count.ok_or_else(|| StoreError::Rejected(format!("{} must be a non-negative integer", clause)))
    }

    fn expr(&self, expr: &Expr, scope: &Scope<'_>) -> Result<Value, StoreError> {
        let value = match expr {
            Expr::Identifier(ident) => scope.column(ident)?,
            Expr::CompoundIdentifier(parts) => match parts.last() {
                Some(ident) => scope.column(ident)?,
                None => Value::Null,
            },
            Expr::Value(value) => self.literal(value)?,
            Expr::Nested(inner) => self.expr(inner, scope)?,
            Expr::IsNull(inner) => Value::Bool(self.expr(inner, scope)?.is_null()),
            Expr::IsNotNull(inner) => Value::Bool(!self.expr(inner, scope)?.is_null()),
            Expr::UnaryOp { op, expr: inner } => {
                let value = self.expr(inner, scope)?;
                match op {
                    UnaryOperator::Not => from_truth(truth(&value)?.map(|b| !b)),
                    UnaryOperator::Plus => value,
                    UnaryOperator::Minus => match number(&value) {
                        _ if value.is_null() => Value::Null,
                        Some(n) => Value::from(-n),
                        None => return Err(StoreError::Rejected(format!("cannot negate {}", value))),
                    },
                    other => return Err(unsupported(format!("operator {}", other))),
                }
            }
            Expr::BinaryOp { left, op, right } => {
                let l = self.expr(left, scope)?;
                let r = self.expr(right, scope)?;
                binary(&l, op, &r)?
            }
            Expr::InList {
                expr: inner,
                list,
                negated,
            } => {
                let needle = self.expr(inner, scope)?;
                let mut unknown = needle.is_null();
                let mut found = false;
                for item in list {
                    match compare(&needle, &self.expr(item, scope)?) {
                        Some(Ordering::Equal) => {
                            found = true;
                            break;
                        }
                        None => unknown = true,
                        Some(_) => {}
                    }
                }
                let result = if found {
                    Some(true)
                } else if unknown {
                    None
                } else {
                    Some(false)
                };
                from_truth(result.map(|b| b != *negated))
            }
            Expr::Between {
                expr: inner,
                negated,
                low,
                high,
            } => {
                let value = self.expr(inner, scope)?;
                let above = compare(&value, &self.expr(low, scope)?).map(Ordering::is_ge);
                let below = compare(&value, &self.expr(high, scope)?).map(Ordering::is_le);
                from_truth(and(above, below).map(|b| b != *negated))
            }
            Expr::Like {
                negated,
                expr: inner,
                pattern,
                escape_char,
                ..
            } => {
                if escape_char.is_some() {
                    return Err(unsupported("LIKE ... ESCAPE"));
                }
                like(&self.expr(inner, scope)?, &self.expr(pattern, scope)?, *negated, false)?
            }
            Expr::ILike {
                negated,
                expr: inner,
                pattern,
                escape_char,
                ..
            } => {
                if escape_char.is_some() {
                    return Err(unsupported("ILIKE ... ESCAPE"));
                }
                like(&self.expr(inner, scope)?, &self.expr(pattern, scope)?, *negated, true)?
            }
            Expr::Extract {
                field, expr: inner, ..
            } => extract(field, &self.expr(inner, scope)?)?,
            other => return Err(unsupported(format!("expression `{}`", other))),
        };
        Ok(value)
    }

    fn literal(&self, value: &SqlValue) -> Result<Value, StoreError> {
        match value {
            SqlValue::SingleQuotedString(s) => Ok(Value::String(s.clone())),
            SqlValue::Number(n, _) => n
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| n.parse::<f64>().map(Value::from))
                .map_err(|_| StoreError::Rejected(format!("invalid number {}", n))),
            SqlValue::Boolean(b) => Ok(Value::Bool(*b)),
            SqlValue::Null => Ok(Value::Null),
            SqlValue::Placeholder(marker) => self.param(marker),
            other => Err(unsupported(format!("literal {}", other))),
        }
    }

    /// Bound value for `$n`. Values are always text, as the database binds them.
    fn param(&self, marker: &str) -> Result<Value, StoreError> {
        marker
            .strip_prefix('$')
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.params.get(i))
            .map(|p| Value::String(p.clone()))
            .ok_or_else(|| StoreError::Rejected(format!("no value bound for parameter {}", marker)))
    }
}

/// Reject the parts of a SELECT this evaluator does not implement.
fn check_plain_select(select: &Select) -> Result<(), StoreError> {
    if !matches!(&select.group_by, GroupByExpr::Expressions(exprs, ..) if exprs.is_empty()) {
        return Err(unsupported("GROUP BY"));
    }
    if select.having.is_some() {
        return Err(unsupported("HAVING"));
    }
    if matches!(select.distinct, Some(Distinct::On(_))) {
        return Err(unsupported("DISTINCT ON"));
    }
    Ok(())
}

/// Output name of an unaliased select item, as Postgres names it.
fn column_label(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|ident| ident.value.clone())
            .unwrap_or_default(),
        Expr::Extract { .. } => "extract".to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// Row scope
// ============================================================================

struct Scope<'r> {
    row: &'r RawRow,
    columns: &'r HashSet<String>,
    /// Projected row; ORDER BY may name output aliases.
    output: Option<&'r RawRow>,
}

impl<'r> Scope<'r> {
    fn new(row: &'r RawRow, columns: &'r HashSet<String>) -> Self {
        Self {
            row,
            columns,
            output: None,
        }
    }

    fn with_output(mut self, output: &'r RawRow) -> Self {
        self.output = Some(output);
        self
    }

    /// Column value. Unquoted names also match case-insensitively; a column
    /// present elsewhere in the collection reads as NULL for this record.
    fn column(&self, ident: &Ident) -> Result<Value, StoreError> {
        let name = ident.value.as_str();
        let folds = ident.quote_style.is_none();
        let matches = |key: &str| key == name || (folds && key.eq_ignore_ascii_case(name));

        let found = self
            .output
            .and_then(|out| out.get(name))
            .or_else(|| self.row.get(name))
            .or_else(|| {
                self.row
                    .iter()
                    .find(|(key, _)| matches(key.as_str()))
                    .map(|(_, v)| v)
            });
        if let Some(value) = found {
            return Ok(value.clone());
        }
        if self.columns.iter().any(|c| matches(c.as_str())) {
            return Ok(Value::Null);
        }
        Err(StoreError::Rejected(format!("column \"{}\" does not exist", name)))
    }
}

// ============================================================================
// Values
// ============================================================================

fn truth(value: &Value) -> Result<Option<bool>, StoreError> {
    match value {
        Value::Bool(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        other => Err(StoreError::Rejected(format!(
            "argument must be type boolean, not {}",
            other
        ))),
    }
}

fn from_truth(value: Option<bool>) -> Value {
    value.map(Value::Bool).unwrap_or(Value::Null)
}

fn and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    }
}

/// SQL comparison; `None` when either side is NULL. A number against
/// numeric text compares numerically, everything else as text.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(_), _) | (_, Value::Number(_)) => match (number(a), number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => Some(text(a).cmp(&text(b))),
        },
        _ => Some(text(a).cmp(&text(b))),
    }
}

fn binary(l: &Value, op: &BinaryOperator, r: &Value) -> Result<Value, StoreError> {
    let value = match op {
        BinaryOperator::And => from_truth(and(truth(l)?, truth(r)?)),
        BinaryOperator::Or => from_truth(or(truth(l)?, truth(r)?)),
        BinaryOperator::Eq
        | BinaryOperator::NotEq
        | BinaryOperator::Lt
        | BinaryOperator::LtEq
        | BinaryOperator::Gt
        | BinaryOperator::GtEq => from_truth(compare(l, r).map(|ord| satisfies(op, ord))),
        BinaryOperator::StringConcat => {
            if l.is_null() || r.is_null() {
                Value::Null
            } else {
                Value::String(format!("{}{}", text(l), text(r)))
            }
        }
        BinaryOperator::Plus
        | BinaryOperator::Minus
        | BinaryOperator::Multiply
        | BinaryOperator::Divide => {
            if l.is_null() || r.is_null() {
                return Ok(Value::Null);
            }
            let (Some(x), Some(y)) = (number(l), number(r)) else {
                return Err(StoreError::Rejected(format!(
                    "operator {} needs numbers, got {} and {}",
                    op, l, r
                )));
            };
            match op {
                BinaryOperator::Plus => Value::from(x + y),
                BinaryOperator::Minus => Value::from(x - y),
                BinaryOperator::Multiply => Value::from(x * y),
                _ if y == 0.0 => return Err(StoreError::Rejected("division by zero".to_string())),
                _ => Value::from(x / y),
            }
        }
        other => return Err(unsupported(format!("operator {}", other))),
    };
    Ok(value)
}

fn satisfies(op: &BinaryOperator, ord: Ordering) -> bool {
    match op {
        BinaryOperator::Eq => ord.is_eq(),
        BinaryOperator::NotEq => ord.is_ne(),
        BinaryOperator::Lt => ord.is_lt(),
        BinaryOperator::LtEq => ord.is_le(),
        BinaryOperator::Gt => ord.is_gt(),
        BinaryOperator::GtEq => ord.is_ge(),
        _ => false,
    }
}

fn like(value: &Value, pattern: &Value, negated: bool, fold_case: bool) -> Result<Value, StoreError> {
    if value.is_null() || pattern.is_null() {
        return Ok(Value::Null);
    }
    let matched = like_regex(&text(pattern), fold_case)?.is_match(&text(value));
    Ok(Value::Bool(matched != negated))
}

/// `%` is any run, `_` one character, `\` escapes the next character.
fn like_regex(pattern: &str, fold_case: bool) -> Result<Regex, StoreError> {
    let mut re = String::from(if fold_case { "(?is)^" } else { "(?s)^" });
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    re.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
                }
            }
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| StoreError::Rejected(format!("invalid LIKE pattern: {}", e)))
}

/// YEAR / MONTH / DAY of a `YYYY-MM-DD...` date or timestamp value.
fn extract(field: &DateTimeField, value: &Value) -> Result<Value, StoreError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let raw = text(value);
    let date = raw
        .trim()
        .get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .ok_or_else(|| {
            StoreError::Rejected(format!("invalid input syntax for type timestamp: \"{}\"", raw))
        })?;
    let part = match field {
        DateTimeField::Year => date.year(),
        DateTimeField::Month => date.month() as i32,
        DateTimeField::Day => date.day() as i32,
        other => return Err(unsupported(format!("EXTRACT({})", other))),
    };
    Ok(Value::from(part))
}

fn sort_order(order: &OrderByExpr, a: &Value, b: &Value) -> Ordering {
    let descending = order.asc == Some(false);
    // Postgres puts NULLs last ascending and first descending.
    let nulls_first = order.nulls_first.unwrap_or(descending);
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) if nulls_first => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, true) if nulls_first => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = compare(a, b).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}
