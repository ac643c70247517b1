//! DatabaseSourceComponent - streams the result of a SQL query
//!
//! Queries run against a SQLite database file on a blocking thread. Rows
//! are handed to the async side through a bounded channel so a slow
//! pipeline throttles the cursor instead of buffering the whole result.

use crate::registry::ComponentDefinition;
use etlflow_runtime::{
    async_trait, Component, ComponentKind, Error, ParameterDef, ParameterSet, Ports, Result, Row,
    Value, WorkerContext,
};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Reads rows from a SQLite database
pub struct DatabaseSourceComponent {
    params: ParameterSet,
}

impl Default for DatabaseSourceComponent {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(vec![
                ParameterDef::string("database")
                    .label("Database File")
                    .description("Path of the SQLite database to read from")
                    .required(),
                ParameterDef::sql("query")
                    .label("SQL Query")
                    .description("SQL query to execute (SELECT statements only)")
                    .required(),
            ]),
        }
    }
}

impl ComponentDefinition for DatabaseSourceComponent {
    const ID: &'static str = "database-source";
    const LABEL: &'static str = "Database Source";
    const DESCRIPTION: &'static str = "Reads data from a database";
    const KIND: ComponentKind = ComponentKind::Source;
    const TYPE_PATH: &'static str = "etlflow_components::DatabaseSourceComponent";
    const SUPPORTS_CONTROL_FLOW: bool = true;
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::from(hex::encode(b)),
    }
}

fn query_rows(
    path: &str,
    query: &str,
    tx: mpsc::Sender<BTreeMap<String, Value>>,
) -> std::result::Result<u64, rusqlite::Error> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let mut stmt = conn.prepare(query)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        let mut payload = BTreeMap::new();
        for (i, column) in columns.iter().enumerate() {
            payload.insert(column.clone(), to_value(row.get_ref(i)?));
        }
        if tx.blocking_send(payload).is_err() {
            // Receiver gone: the async side already failed
            break;
        }
        count += 1;
    }
    Ok(count)
}

#[async_trait]
impl Component for DatabaseSourceComponent {
    fn component_id(&self) -> &str {
        Self::ID
    }

    fn kind(&self) -> ComponentKind {
        Self::KIND
    }

    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    async fn run(&mut self, ctx: &WorkerContext, ports: &mut Ports) -> Result<()> {
        let database = self.params.require_str("database")?;
        let query = self.params.require_str("query")?;
        ctx.info(format!("Executing query: {query}"));

        let (tx, mut rx) = mpsc::channel(ctx.context().queue_capacity());
        let reader = tokio::task::spawn_blocking(move || query_rows(&database, &query, tx));

        let mut sent = 0u64;
        while let Some(payload) = rx.recv().await {
            let mut row = Row::new();
            row.replace_payload(payload);
            ports.send(row).await?;
            sent += 1;
            if sent % 100 == 0 {
                ctx.debug(format!("Processed {sent} rows"));
            }
        }

        let count = reader
            .await
            .map_err(|e| Error::component(format!("query task failed: {e}")))?
            .map_err(|e| Error::component(format!("database error: {e}")))?;
        ctx.info(format!("Query execution complete. Total rows processed: {count}"));
        ports.output.finish().await
    }
}
