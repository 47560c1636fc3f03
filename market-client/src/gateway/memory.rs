use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use super::{Direction, Gateway, Query, Table};
use crate::error::{MarketClientError, MarketClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Default)]
struct State {
    rows: HashMap<Table, Vec<Value>>,
    failures: HashMap<(Table, Op), String>,
    calls: Vec<(Op, Table)>,
}

/// Таблицы в памяти с теми же ограничениями уникальности, что и на сервере.
#[derive(Clone, Default)]
pub(crate) struct MemoryGateway {
    state: Arc<Mutex<State>>,
}

impl MemoryGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn seed(&self, table: Table, rows: Vec<Value>) {
        self.state
            .lock()
            .expect("memory gateway mutex poisoned")
            .rows
            .entry(table)
            .or_default()
            .extend(rows);
    }

    pub(crate) fn rows(&self, table: Table) -> Vec<Value> {
        self.state
            .lock()
            .expect("memory gateway mutex poisoned")
            .rows
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    /// Все последующие вызовы `op` над `table` завершаются ошибкой сервера.
    pub(crate) fn fail(&self, table: Table, op: Op, message: &str) {
        self.state
            .lock()
            .expect("memory gateway mutex poisoned")
            .failures
            .insert((table, op), message.to_string());
    }

    pub(crate) fn heal(&self, table: Table, op: Op) {
        self.state
            .lock()
            .expect("memory gateway mutex poisoned")
            .failures
            .remove(&(table, op));
    }

    pub(crate) fn select_count(&self, table: Table) -> usize {
        self.count(Op::Select, table)
    }

    pub(crate) fn count(&self, op: Op, table: Table) -> usize {
        self.state
            .lock()
            .expect("memory gateway mutex poisoned")
            .calls
            .iter()
            .filter(|call| **call == (op, table))
            .count()
    }

    fn enter(&self, op: Op, table: Table) -> Result<std::sync::MutexGuard<'_, State>, MarketClientError> {
        let mut state = self.state.lock().expect("memory gateway mutex poisoned");
        state.calls.push((op, table));
        if let Some(message) = state.failures.get(&(table, op)) {
            return Err(MarketClientError::Rejected {
                status: 503,
                message: message.clone(),
            });
        }
        Ok(state)
    }
}

fn unique_key(table: Table) -> &'static [&'static str] {
    match table {
        Table::Likes => &["post_id", "user_id"],
        Table::ServiceProviders => &["user_id"],
        _ => &["id"],
    }
}

fn sort_key(row: &Value, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn select(&self, table: Table, query: &Query) -> MarketClientResult<Vec<Value>> {
        let state = self.enter(Op::Select, table)?;
        let mut rows: Vec<Value> = state
            .rows
            .get(&table)
            .map(|rows| rows.iter().filter(|row| query.matches(row)).cloned().collect())
            .unwrap_or_default();
        if let Some((column, direction)) = query.ordering() {
            rows.sort_by_key(|row| sort_key(row, column));
            if direction == Direction::Desc {
                rows.reverse();
            }
        }
        if let Some(limit) = query.row_limit() {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, mut row: Value) -> MarketClientResult<Value> {
        let mut state = self.enter(Op::Insert, table)?;
        if let Value::Object(map) = &mut row {
            map.entry("id").or_insert_with(|| json!(Uuid::new_v4()));
            map.entry("created_at").or_insert_with(|| json!(Utc::now()));
        }

        let rows = state.rows.entry(table).or_default();
        let key = unique_key(table);
        let duplicate = rows
            .iter()
            .any(|existing| key.iter().all(|column| existing.get(*column) == row.get(*column)));
        if duplicate {
            return Err(MarketClientError::Conflict(format!(
                "duplicate key value violates unique constraint on {table}"
            )));
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        query: &Query,
        patch: Value,
    ) -> MarketClientResult<Vec<Value>> {
        let mut state = self.enter(Op::Update, table)?;
        let mut updated = Vec::new();
        for row in state.rows.entry(table).or_default().iter_mut() {
            if !query.matches(row) {
                continue;
            }
            if let (Value::Object(target), Value::Object(changes)) = (&mut *row, &patch) {
                for (column, value) in changes {
                    target.insert(column.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, query: &Query) -> MarketClientResult<Vec<Value>> {
        let mut state = self.enter(Op::Delete, table)?;
        let rows = state.rows.entry(table).or_default();
        let (removed, kept): (Vec<Value>, Vec<Value>) =
            rows.drain(..).partition(|row| query.matches(row));
        *rows = kept;
        Ok(removed)
    }
}
