//! In-memory [`RowStore`] for small datasets and tests.
//!
//! Predicates are a conjunction of `column <op> literal` comparisons joined
//! with `AND` (`=`, `!=`, `<>`, `<`, `<=`, `>`, `>=`; string literals in single
//! quotes). Projection expressions are not evaluated; only column references.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use crate::error::{Error, Result};
use crate::traits::RowStore;
use crate::types::{value_as_text, DatasetRef, FieldSource, Fields, Predicate, Projection, RowId, SearchResultItem, StoredRow};

#[derive(Default)]
pub struct MemoryRowStore {
    tables: RwLock<HashMap<String, Vec<Fields>>>,
    round_trips: AtomicUsize,
}

impl MemoryRowStore {
    pub fn new() -> Self { Self::default() }

    /// Replaces `table` with `rows`; non-object values are skipped.
    pub fn insert_table(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let rows = rows.into_iter().filter_map(|v| match v { Value::Object(m) => Some(m), _ => None }).collect();
        self.tables.write().insert(table.to_string(), rows);
    }

    /// Number of queries served so far.
    pub fn round_trips(&self) -> usize { self.round_trips.load(AtomicOrdering::SeqCst) }

    fn matching_rows(&self, dataset: &DatasetRef, predicate: Option<&Predicate>, ids: Option<&HashSet<RowId>>) -> Result<Vec<(RowId, Fields)>> {
        self.round_trips.fetch_add(1, AtomicOrdering::SeqCst);
        let filter = predicate.map(Conjunction::parse).transpose()?;
        let tables = self.tables.read();
        let rows = tables.get(&dataset.table).ok_or_else(|| Error::Query(format!("unknown table '{}'", dataset.table)))?;
        let mut out = Vec::new();
        for row in rows {
            let Some(id) = row.get(&dataset.id_column).and_then(RowId::from_json) else { continue };
            if ids.is_some_and(|set| !set.contains(&id)) { continue; }
            if filter.as_ref().is_some_and(|f| !f.eval(row)) { continue; }
            out.push((id, row.clone()));
        }
        Ok(out)
    }
}

fn select(row: &Fields, columns: &[String]) -> Fields {
    columns.iter().map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null))).collect()
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn scan_rows(&self, dataset: &DatasetRef, columns: &[String], predicate: Option<&Predicate>) -> Result<Vec<StoredRow>> {
        let rows = self.matching_rows(dataset, predicate, None)?;
        Ok(rows.into_iter().map(|(id, row)| StoredRow { id, values: select(&row, columns) }).collect())
    }

    async fn fetch_rows(
        &self,
        dataset: &DatasetRef,
        ids: &[RowId],
        columns: &[String],
        predicate: Option<&Predicate>,
    ) -> Result<Vec<StoredRow>> {
        let wanted: HashSet<RowId> = ids.iter().cloned().collect();
        let rows = self.matching_rows(dataset, predicate, Some(&wanted))?;
        Ok(rows.into_iter().map(|(id, row)| StoredRow { id, values: select(&row, columns) }).collect())
    }

    async fn project_rows(&self, projection: &Projection, ids: &[RowId], predicate: Option<&Predicate>) -> Result<Vec<SearchResultItem>> {
        if let Some(f) = projection.fields.iter().find(|f| matches!(f.source, FieldSource::Expression(_))) {
            return Err(Error::Query(format!("field '{}': expressions are not supported by the in-memory store", f.name)));
        }
        let wanted: HashSet<RowId> = ids.iter().cloned().collect();
        let rows = self.matching_rows(&projection.dataset, predicate, Some(&wanted))?;
        Ok(rows
            .into_iter()
            .map(|(id, row)| {
                let mut item = SearchResultItem::new(id);
                item.x = projection.x.as_ref().and_then(|c| row.get(c)).and_then(Value::as_f64);
                item.y = projection.y.as_ref().and_then(|c| row.get(c)).and_then(Value::as_f64);
                item.text = projection.text.as_ref().and_then(|c| row.get(c)).filter(|v| !v.is_null()).map(value_as_text);
                for f in &projection.fields {
                    item.fields.insert(f.name.clone(), row.get(f.source.sql()).cloned().unwrap_or(Value::Null));
                }
                item
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
}

#[derive(Debug, Clone)]
struct Clause {
    column: String,
    op: Op,
    literal: Literal,
}

#[derive(Debug, Clone)]
struct Conjunction(Vec<Clause>);

impl Conjunction {
    fn parse(predicate: &Predicate) -> Result<Self> {
        split_and(predicate.as_str()).iter().map(|c| parse_clause(c)).collect::<Result<Vec<_>>>().map(Self)
    }

    fn eval(&self, row: &Fields) -> bool {
        self.0.iter().all(|c| {
            let cell = row.get(&c.column).unwrap_or(&Value::Null);
            match compare(cell, &c.literal) {
                Some(ord) => match c.op {
                    Op::Eq => ord == Ordering::Equal,
                    Op::Ne => ord != Ordering::Equal,
                    Op::Lt => ord == Ordering::Less,
                    Op::Le => ord != Ordering::Greater,
                    Op::Gt => ord == Ordering::Greater,
                    Op::Ge => ord != Ordering::Less,
                },
                None => false,
            }
        })
    }
}

fn compare(cell: &Value, literal: &Literal) -> Option<Ordering> {
    match literal {
        Literal::Number(n) => {
            let v = match cell {
                Value::Number(v) => v.as_f64()?,
                Value::String(s) => s.trim().parse::<f64>().ok()?,
                _ => return None,
            };
            v.partial_cmp(n)
        }
        Literal::Text(t) => (!cell.is_null()).then(|| value_as_text(cell).as_str().cmp(t.as_str())),
        Literal::Bool(b) => cell.as_bool().map(|c| c.cmp(b)),
    }
}

/// Splits on `AND` keywords that sit outside quoted literals.
fn split_and(s: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut in_quote = false;
    fn flush_word(word: &mut String, current: &mut Vec<String>, clauses: &mut Vec<String>) {
        if word.is_empty() { return; }
        if word.eq_ignore_ascii_case("and") {
            clauses.push(current.join(" "));
            current.clear();
        } else {
            current.push(word.clone());
        }
        word.clear();
    }
    for ch in s.chars() {
        if ch == '\'' { in_quote = !in_quote; }
        if ch.is_whitespace() && !in_quote {
            flush_word(&mut word, &mut current, &mut clauses);
        } else {
            word.push(ch);
        }
    }
    flush_word(&mut word, &mut current, &mut clauses);
    clauses.push(current.join(" "));
    clauses
}

fn parse_clause(raw: &str) -> Result<Clause> {
    let clause = raw.trim().trim_start_matches('(').trim_end_matches(')').trim();
    let bad = || Error::Query(format!("unsupported predicate clause '{raw}'"));
    let mut in_quote = false;
    let mut split = None;
    for (i, ch) in clause.char_indices() {
        if ch == '\'' { in_quote = !in_quote; }
        if !in_quote && matches!(ch, '<' | '>' | '=' | '!') { split = Some(i); break; }
    }
    let at = split.ok_or_else(bad)?;
    let rest = &clause[at..];
    let (op, width) = if rest.starts_with("<=") {
        (Op::Le, 2)
    } else if rest.starts_with(">=") {
        (Op::Ge, 2)
    } else if rest.starts_with("!=") || rest.starts_with("<>") {
        (Op::Ne, 2)
    } else if rest.starts_with('<') {
        (Op::Lt, 1)
    } else if rest.starts_with('>') {
        (Op::Gt, 1)
    } else if rest.starts_with('=') {
        (Op::Eq, 1)
    } else {
        return Err(bad());
    };
    let column = clause[..at].trim().trim_matches('"').to_string();
    let value = rest[width..].trim();
    if column.is_empty() || value.is_empty() { return Err(bad()); }
    let literal = if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        Literal::Text(value[1..value.len() - 1].replace("''", "'"))
    } else if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        Literal::Bool(value.eq_ignore_ascii_case("true"))
    } else {
        Literal::Number(value.parse::<f64>().map_err(|_| bad())?)
    };
    Ok(Clause { column, op, literal })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryRowStore {
        let store = MemoryRowStore::new();
        store.insert_table(
            "t",
            vec![
                json!({"id": 1, "region": "arm", "age": 30, "note": "it's red"}),
                json!({"id": 2, "region": "leg", "age": 50}),
                json!({"id": 3, "region": "arm", "age": 70}),
            ],
        );
        store
    }

    fn ids(rows: &[StoredRow]) -> Vec<RowId> { rows.iter().map(|r| r.id.clone()).collect() }

    #[tokio::test]
    async fn scan_honours_conjunctions() {
        let store = store();
        let ds = DatasetRef::new("t", "id");
        let p = Predicate::canonicalize("region = 'arm' AND age < 60");
        let rows = store.scan_rows(&ds, &["region".to_string()], p.as_ref()).await.expect("scan");
        assert_eq!(ids(&rows), vec![RowId::Int(1)]);
        assert_eq!(rows[0].values.get("region"), Some(&json!("arm")));
    }

    #[tokio::test]
    async fn quoted_literals_keep_operators_and_keywords() {
        let store = store();
        let ds = DatasetRef::new("t", "id");
        let p = Predicate::canonicalize("note = 'it''s red'");
        let rows = store.scan_rows(&ds, &[], p.as_ref()).await.expect("scan");
        assert_eq!(ids(&rows), vec![RowId::Int(1)]);
    }

    #[tokio::test]
    async fn fetch_limits_to_requested_ids() {
        let store = store();
        let ds = DatasetRef::new("t", "id");
        let rows = store.fetch_rows(&ds, &[RowId::Int(3), RowId::Int(2)], &[], None).await.expect("fetch");
        assert_eq!(ids(&rows), vec![RowId::Int(2), RowId::Int(3)]);
        assert_eq!(store.round_trips(), 1);
    }

    #[tokio::test]
    async fn unknown_syntax_is_a_query_error() {
        let store = store();
        let ds = DatasetRef::new("t", "id");
        let p = Predicate::canonicalize("region LIKE 'a%'");
        let err = store.scan_rows(&ds, &[], p.as_ref()).await.expect_err("should fail");
        assert!(matches!(err, Error::Query(_)));
    }
}
