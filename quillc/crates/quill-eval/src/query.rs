//! The relational pipeline engine.
//!
//! A `from` pipeline streams rows through pull-based iterators: each
//! step wraps the previous step's iterator, so `take n` over a long
//! source evaluates only what it needs, and errors flow through as
//! items. Steps that inherently need the whole stream (`order`,
//! `group`, `distinct`, the set operations, `into`/`compute`,
//! `through`) materialize at their position.
//!
//! A row is a set of named bindings, or a single anonymous value after
//! a non-record `yield`. The row *value* - what `into`, `union` and the
//! final collection see - is the single binding's value when there is
//! exactly one, otherwise a record of all bindings in canonical label
//! order.
//!
//! Ordering discipline: scanning a list keeps the stream ordered,
//! scanning a bag makes it unordered; `order` re-establishes order,
//! `unorder`, `group` and the set operations drop it. An ordered
//! pipeline yields a `list`, an unordered one a `bag`.

use crate::env::Env;
use crate::exn::{EvalResult, Raise};
use crate::value::{value_cmp, value_eq, Value};
use crate::Evaluator;
use quill_core::{CoreExpr, CoreKind, CorePat, CoreSource, CoreStep, CoreStepKind};
use quill_typ::TypeKind;
use quill_util::{Label, Pos, Symbol};

/// One row of the stream
#[derive(Debug, Clone)]
pub(crate) struct Row {
    bindings: Vec<(Symbol, Value)>,
    anon: Option<Value>,
}

impl Row {
    fn empty() -> Self {
        Row {
            bindings: Vec::new(),
            anon: None,
        }
    }

    /// The row as a single value
    fn value(&self) -> Value {
        if let Some(v) = &self.anon {
            return v.clone();
        }
        match self.bindings.as_slice() {
            [] => Value::Unit,
            [(_, v)] => v.clone(),
            many => Value::record(
                many.iter()
                    .map(|(name, v)| (Label::from(*name), v.clone()))
                    .collect(),
            ),
        }
    }

    /// Rebuild a row of this shape from a row value
    fn from_value(&self, value: Value, pos: Pos) -> Result<Row, Raise> {
        if self.anon.is_some() || self.bindings.is_empty() {
            return Ok(Row {
                bindings: Vec::new(),
                anon: Some(value),
            });
        }
        if self.bindings.len() == 1 {
            return Ok(Row {
                bindings: vec![(self.bindings[0].0, value)],
                anon: None,
            });
        }
        match value.deref() {
            Value::Record(fields) => {
                let mut bindings = Vec::with_capacity(self.bindings.len());
                for (name, _) in &self.bindings {
                    let field = fields.get(&Label::from(*name)).cloned().ok_or_else(|| {
                        Raise::fail(&format!("row value lacks field {}", name), pos)
                    })?;
                    bindings.push((*name, field));
                }
                Ok(Row {
                    bindings,
                    anon: None,
                })
            }
            _ => Err(Raise::fail("row value is not a record", pos)),
        }
    }
}

type RowIter<'it> = Box<dyn Iterator<Item = Result<Row, Raise>> + 'it>;

/// Evaluate a whole pipeline to its value
pub fn eval_pipeline(
    evaluator: &Evaluator,
    steps: &[CoreStep],
    env: &Env,
    pos: Pos,
) -> EvalResult {
    let mut rows: RowIter = Box::new(std::iter::once(Ok(Row::empty())));
    let mut ordered = true;
    for step in steps {
        match &step.kind {
            CoreStepKind::Scan { pat, source, on } => {
                match source {
                    CoreSource::In(src) => {
                        // The static source type decides ordering.
                        if matches!(evaluator.registry.kind(src.ty), TypeKind::Bag(_)) {
                            ordered = false;
                        }
                        rows = scan_iter(evaluator, rows, pat, src, on.as_ref(), env, step.pos);
                    }
                    CoreSource::Eq(src) => {
                        rows = scalar_scan_iter(
                            evaluator,
                            rows,
                            pat,
                            src,
                            on.as_ref(),
                            env,
                            step.pos,
                        );
                    }
                }
            }
            CoreStepKind::Where(cond) => {
                rows = filter_iter(evaluator, rows, cond, env);
            }
            CoreStepKind::Yield(exp) => {
                rows = yield_iter(evaluator, rows, exp, env);
            }
            CoreStepKind::Order(key) => {
                let mut keyed = Vec::new();
                for row in rows {
                    let row = row?;
                    let row_env = row_env(evaluator, env, &row);
                    let key_value = evaluator.eval(key, &row_env)?;
                    keyed.push((key_value, row));
                }
                keyed.sort_by(|(a, _), (b, _)| value_cmp(a, b));
                rows = Box::new(keyed.into_iter().map(|(_, row)| Ok(row)));
                ordered = true;
            }
            CoreStepKind::Take(n) => {
                let count = eval_count(evaluator, n, env)?;
                rows = Box::new(rows.take(count));
            }
            CoreStepKind::Skip(n) => {
                let count = eval_count(evaluator, n, env)?;
                rows = Box::new(rows.skip(count));
            }
            CoreStepKind::Distinct => {
                let materialized = collect_rows(rows)?;
                let mut seen: Vec<Value> = Vec::new();
                let mut kept = Vec::new();
                for row in materialized {
                    let value = row.value();
                    if !seen.iter().any(|v| value_eq(v, &value)) {
                        seen.push(value);
                        kept.push(row);
                    }
                }
                rows = Box::new(kept.into_iter().map(Ok));
            }
            CoreStepKind::Unorder => {
                ordered = false;
            }
            CoreStepKind::Group { keys, computes } => {
                rows = group_rows(evaluator, rows, keys, computes, env, step.pos)?;
                ordered = false;
            }
            CoreStepKind::Union { distinct, sources } => {
                let mut materialized = collect_rows(rows)?;
                let shape = materialized.last().cloned().unwrap_or_else(Row::empty);
                for source in sources {
                    let value = evaluator.eval(source, env)?;
                    for item in collection_items(&value, step.pos)? {
                        materialized.push(shape.from_value(item, step.pos)?);
                    }
                }
                if *distinct {
                    materialized = dedup_rows(materialized);
                }
                rows = Box::new(materialized.into_iter().map(Ok));
                ordered = false;
            }
            CoreStepKind::Intersect { distinct, sources } => {
                let materialized = collect_rows(rows)?;
                let mut source_values: Vec<Vec<Value>> = Vec::new();
                for source in sources {
                    let value = evaluator.eval(source, env)?;
                    source_values.push(collection_items(&value, step.pos)?);
                }
                let mut kept: Vec<Row> = materialized
                    .into_iter()
                    .filter(|row| {
                        let value = row.value();
                        source_values
                            .iter()
                            .all(|vs| vs.iter().any(|v| value_eq(v, &value)))
                    })
                    .collect();
                if *distinct {
                    kept = dedup_rows(kept);
                }
                rows = Box::new(kept.into_iter().map(Ok));
                ordered = false;
            }
            CoreStepKind::Except { distinct, sources } => {
                let materialized = collect_rows(rows)?;
                let mut source_values: Vec<Value> = Vec::new();
                for source in sources {
                    let value = evaluator.eval(source, env)?;
                    source_values.extend(collection_items(&value, step.pos)?);
                }
                let mut kept: Vec<Row> = materialized
                    .into_iter()
                    .filter(|row| {
                        let value = row.value();
                        !source_values.iter().any(|v| value_eq(v, &value))
                    })
                    .collect();
                if *distinct {
                    kept = dedup_rows(kept);
                }
                rows = Box::new(kept.into_iter().map(Ok));
                ordered = false;
            }
            CoreStepKind::Through { pat, exp } => {
                let materialized = collect_rows(rows)?;
                let values: Vec<Value> = materialized.iter().map(Row::value).collect();
                let stream = if ordered {
                    Value::list(values)
                } else {
                    Value::bag(values)
                };
                let f = evaluator.eval(exp, env)?;
                let result = evaluator.apply_value(f, stream, step.pos)?;
                ordered = result.is_ordered_collection();
                let mut out = Vec::new();
                for item in collection_items(&result, step.pos)? {
                    let mut bound = Vec::new();
                    if evaluator.match_pattern(pat, &item, &mut bound) {
                        out.push(Row {
                            bindings: bound,
                            anon: None,
                        });
                    }
                }
                rows = Box::new(out.into_iter().map(Ok));
            }
            CoreStepKind::Into(target) => {
                let materialized = collect_rows(rows)?;
                let values: Vec<Value> = materialized.iter().map(Row::value).collect();
                let stream = if ordered {
                    Value::list(values)
                } else {
                    Value::bag(values)
                };
                let f = evaluator.eval(target, env)?;
                return evaluator.apply_value(f, stream, step.pos);
            }
            CoreStepKind::Compute(computes) => {
                let materialized = collect_rows(rows)?;
                let columns = eval_aggregates(evaluator, computes, &materialized, env, step.pos)?;
                return Ok(match columns.len() {
                    1 => columns.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Unit),
                    _ => Value::record(
                        columns
                            .into_iter()
                            .map(|(name, v)| (Label::from(name), v))
                            .collect(),
                    ),
                });
            }
        }
    }
    let mut values = Vec::new();
    for row in rows {
        values.push(row?.value());
    }
    Ok(if ordered {
        Value::list(values)
    } else {
        Value::bag(values)
    })
}

/// Environment with the row's bindings in scope
fn row_env(evaluator: &Evaluator, env: &Env, row: &Row) -> Env {
    evaluator.bind_values(env, row.bindings.clone())
}

fn eval_count(evaluator: &Evaluator, exp: &CoreExpr, env: &Env) -> Result<usize, Raise> {
    match evaluator.eval(exp, env)?.deref() {
        Value::Int(n) if n >= 0 => Ok(n as usize),
        Value::Int(_) => Ok(0),
        _ => Err(Raise::fail("take/skip expects an int", exp.pos)),
    }
}

fn collect_rows(rows: RowIter) -> Result<Vec<Row>, Raise> {
    rows.collect()
}

fn dedup_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut seen: Vec<Value> = Vec::new();
    let mut out = Vec::new();
    for row in rows {
        let value = row.value();
        if !seen.iter().any(|v| value_eq(v, &value)) {
            seen.push(value);
            out.push(row);
        }
    }
    out
}

fn collection_items(value: &Value, pos: Pos) -> Result<Vec<Value>, Raise> {
    match value.deref() {
        Value::List(items) | Value::Bag(items) | Value::Vector(items) => {
            Ok(items.as_ref().clone())
        }
        _ => Err(Raise::fail("expected a collection", pos)),
    }
}

/// `scan pat in src [on cond]`: per row, iterate the source, keeping
/// pattern matches; the pattern's bindings are visible to `on`
fn scan_iter<'it>(
    evaluator: &'it Evaluator,
    rows: RowIter<'it>,
    pat: &'it CorePat,
    src: &'it CoreExpr,
    on: Option<&'it CoreExpr>,
    env: &'it Env,
    pos: Pos,
) -> RowIter<'it> {
    Box::new(rows.flat_map(move |row| -> Vec<Result<Row, Raise>> {
        let row = match row {
            Ok(row) => row,
            Err(raise) => return vec![Err(raise)],
        };
        let outer = row_env(evaluator, env, &row);
        let source_value = match evaluator.eval(src, &outer) {
            Ok(v) => v,
            Err(raise) => return vec![Err(raise)],
        };
        let items = match collection_items(&source_value, pos) {
            Ok(items) => items,
            Err(raise) => return vec![Err(raise)],
        };
        let mut out = Vec::new();
        for item in items {
            let mut bound = Vec::new();
            // Non-matching elements are skipped, not errors.
            if !evaluator.match_pattern(pat, &item, &mut bound) {
                continue;
            }
            let mut new_row = row.clone();
            new_row.anon = None;
            new_row.bindings.extend(bound);
            if let Some(cond) = on {
                let cond_env = row_env(evaluator, env, &new_row);
                match evaluator.eval(cond, &cond_env) {
                    Ok(v) => match v.deref() {
                        Value::Bool(true) => {}
                        Value::Bool(false) => continue,
                        _ => {
                            out.push(Err(Raise::fail("on expects a bool", pos)));
                            continue;
                        }
                    },
                    Err(raise) => {
                        out.push(Err(raise));
                        continue;
                    }
                }
            }
            out.push(Ok(new_row));
        }
        out
    }))
}

/// `scan pat = scalar`: bind a single value per row
fn scalar_scan_iter<'it>(
    evaluator: &'it Evaluator,
    rows: RowIter<'it>,
    pat: &'it CorePat,
    src: &'it CoreExpr,
    on: Option<&'it CoreExpr>,
    env: &'it Env,
    pos: Pos,
) -> RowIter<'it> {
    Box::new(rows.filter_map(move |row| -> Option<Result<Row, Raise>> {
        let row = match row {
            Ok(row) => row,
            Err(raise) => return Some(Err(raise)),
        };
        let outer = row_env(evaluator, env, &row);
        let value = match evaluator.eval(src, &outer) {
            Ok(v) => v,
            Err(raise) => return Some(Err(raise)),
        };
        let mut bound = Vec::new();
        if !evaluator.match_pattern(pat, &value, &mut bound) {
            return None;
        }
        let mut new_row = row;
        new_row.anon = None;
        new_row.bindings.extend(bound);
        if let Some(cond) = on {
            let cond_env = row_env(evaluator, env, &new_row);
            match evaluator.eval(cond, &cond_env) {
                Ok(v) => match v.deref() {
                    Value::Bool(true) => {}
                    Value::Bool(false) => return None,
                    _ => return Some(Err(Raise::fail("on expects a bool", pos))),
                },
                Err(raise) => return Some(Err(raise)),
            }
        }
        Some(Ok(new_row))
    }))
}

fn filter_iter<'it>(
    evaluator: &'it Evaluator,
    rows: RowIter<'it>,
    cond: &'it CoreExpr,
    env: &'it Env,
) -> RowIter<'it> {
    Box::new(rows.filter_map(move |row| -> Option<Result<Row, Raise>> {
        let row = match row {
            Ok(row) => row,
            Err(raise) => return Some(Err(raise)),
        };
        let cond_env = row_env(evaluator, env, &row);
        match evaluator.eval(cond, &cond_env) {
            Ok(v) => match v.deref() {
                Value::Bool(true) => Some(Ok(row)),
                Value::Bool(false) => None,
                _ => Some(Err(Raise::fail("where expects a bool", cond.pos))),
            },
            Err(raise) => Some(Err(raise)),
        }
    }))
}

/// `yield e`: a record expression re-binds its labels, anything else
/// makes the row anonymous
fn yield_iter<'it>(
    evaluator: &'it Evaluator,
    rows: RowIter<'it>,
    exp: &'it CoreExpr,
    env: &'it Env,
) -> RowIter<'it> {
    let is_record = matches!(exp.kind, CoreKind::Record(_));
    Box::new(rows.map(move |row| {
        let row = row?;
        let row_scope = row_env(evaluator, env, &row);
        let value = evaluator.eval(exp, &row_scope)?;
        if is_record {
            match value.deref() {
                Value::Record(fields) => Ok(Row {
                    bindings: fields
                        .iter()
                        .map(|(label, v)| (Symbol::intern(label.as_str()), v.clone()))
                        .collect(),
                    anon: None,
                }),
                other => Ok(Row {
                    bindings: Vec::new(),
                    anon: Some(other),
                }),
            }
        } else {
            Ok(Row {
                bindings: Vec::new(),
                anon: Some(value),
            })
        }
    }))
}

/// Partition rows by key values, then aggregate each group's computes
fn group_rows<'it>(
    evaluator: &Evaluator,
    rows: RowIter,
    keys: &[(Symbol, CoreExpr)],
    computes: &[(Symbol, CoreExpr)],
    env: &Env,
    pos: Pos,
) -> Result<RowIter<'it>, Raise> {
    let materialized = collect_rows(rows)?;
    // Linear grouping keeps first-seen key order, which the bag result
    // does not promise but makes runs reproducible.
    let mut groups: Vec<(Vec<Value>, Vec<Row>)> = Vec::new();
    for row in materialized {
        let scope = row_env(evaluator, env, &row);
        let mut key_values = Vec::with_capacity(keys.len());
        for (_, key_exp) in keys {
            key_values.push(evaluator.eval(key_exp, &scope)?);
        }
        match groups.iter_mut().find(|(existing, _)| {
            existing
                .iter()
                .zip(key_values.iter())
                .all(|(a, b)| value_eq(a, b))
        }) {
            Some((_, members)) => members.push(row),
            None => groups.push((key_values, vec![row])),
        }
    }
    let mut out = Vec::with_capacity(groups.len());
    for (key_values, members) in groups {
        let mut bindings: Vec<(Symbol, Value)> = keys
            .iter()
            .map(|(name, _)| *name)
            .zip(key_values)
            .collect();
        let columns = eval_aggregates(evaluator, computes, &members, env, pos)?;
        bindings.extend(columns);
        out.push(Row {
            bindings,
            anon: None,
        });
    }
    Ok(Box::new(out.into_iter().map(Ok)))
}

/// Evaluate aggregate columns over a set of member rows
fn eval_aggregates(
    evaluator: &Evaluator,
    computes: &[(Symbol, CoreExpr)],
    members: &[Row],
    env: &Env,
    pos: Pos,
) -> Result<Vec<(Symbol, Value)>, Raise> {
    let mut out = Vec::with_capacity(computes.len());
    for (name, column) in computes {
        let value = match &column.kind {
            CoreKind::Aggregate { agg, arg } => {
                let agg_value = evaluator.eval(agg, env)?;
                let mut collected = Vec::with_capacity(members.len());
                for member in members {
                    let scope = row_env(evaluator, env, member);
                    collected.push(evaluator.eval(arg, &scope)?);
                }
                evaluator.apply_value(agg_value, Value::list(collected), pos)?
            }
            _ => {
                return Err(Raise::fail(
                    "compute column must be an aggregate application",
                    column.pos,
                ))
            }
        };
        out.push((*name, value));
    }
    Ok(out)
}
