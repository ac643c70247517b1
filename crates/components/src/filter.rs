//! FilterComponent - drops rows that do not satisfy a condition
//!
//! Conditions have the form `<field> <op> <literal>` with `op` one of
//! `== != > >= < <=`. Literals are numbers, quoted strings or bare words.
//! `true`, `*` or an empty condition pass every row.

use crate::registry::ComponentDefinition;
use etlflow_runtime::{
    async_trait, Component, ComponentKind, Error, ParameterDef, ParameterSet, Ports, Result, Row,
    Value, WorkerContext,
};
use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Condition {
    Always,
    Compare { field: String, op: Op, literal: Value },
}

fn condition_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^\s*([A-Za-z_][\w.]*)\s*(==|!=|>=|<=|>|<|=)\s*(.+?)\s*$"#)
            .expect("condition pattern is valid")
    })
}

fn parse_literal(raw: &str) -> Value {
    let quoted = (raw.starts_with('\'') && raw.ends_with('\''))
        || (raw.starts_with('"') && raw.ends_with('"'));
    if quoted && raw.len() >= 2 {
        return Value::from(&raw[1..raw.len() - 1]);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    match raw {
        "true" => Value::from(true),
        "false" => Value::from(false),
        "null" => Value::Null,
        _ => Value::from(raw),
    }
}

impl Condition {
    pub(crate) fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "*" || trimmed.eq_ignore_ascii_case("true") {
            return Ok(Condition::Always);
        }
        let caps = condition_pattern()
            .captures(trimmed)
            .ok_or_else(|| Error::parameter("condition", format!("cannot parse '{trimmed}'")))?;
        let op = match &caps[2] {
            "==" | "=" => Op::Eq,
            "!=" => Op::Ne,
            ">" => Op::Gt,
            ">=" => Op::Ge,
            "<" => Op::Lt,
            _ => Op::Le,
        };
        Ok(Condition::Compare {
            field: caps[1].to_string(),
            op,
            literal: parse_literal(&caps[3]),
        })
    }

    pub(crate) fn matches(&self, row: &Row) -> bool {
        let Condition::Compare { field, op, literal } = self else {
            return true;
        };
        let actual = row.get(field).unwrap_or(&Value::Null);
        match compare(actual, literal) {
            Some(ordering) => match op {
                Op::Eq => ordering == Ordering::Equal,
                Op::Ne => ordering != Ordering::Equal,
                Op::Gt => ordering == Ordering::Greater,
                Op::Ge => ordering != Ordering::Less,
                Op::Lt => ordering == Ordering::Less,
                Op::Le => ordering != Ordering::Greater,
            },
            None => *op == Op::Ne,
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(actual: &Value, literal: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(literal)) {
        return a.partial_cmp(&b);
    }
    match (actual, literal) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (a, b) => Some(
            etlflow_runtime::row::value_to_text(a).cmp(&etlflow_runtime::row::value_to_text(b)),
        ),
    }
}

/// Forwards rows matching `condition`
pub struct FilterComponent {
    params: ParameterSet,
}

impl Default for FilterComponent {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(vec![ParameterDef::string("condition")
                .label("Filter Condition")
                .required()]),
        }
    }
}

impl ComponentDefinition for FilterComponent {
    const ID: &'static str = "filter";
    const LABEL: &'static str = "Filter";
    const DESCRIPTION: &'static str = "Filters data based on conditions";
    const KIND: ComponentKind = ComponentKind::Transform;
    const TYPE_PATH: &'static str = "etlflow_components::FilterComponent";
}

#[async_trait]
impl Component for FilterComponent {
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
        let text = self.params.get_str("condition").unwrap_or_default();
        let condition = Condition::parse(&text)?;
        ctx.info(format!("Using filter condition: {text}"));

        let (mut passed, mut dropped) = (0u64, 0u64);
        loop {
            let row = ports.take().await?;
            if row.is_terminator() {
                ctx.info(format!(
                    "Received terminator row ({passed} passed, {dropped} dropped)"
                ));
                return ports.send(row).await;
            }
            if condition.matches(&row) {
                passed += 1;
                ports.send(row).await?;
            } else {
                dropped += 1;
                ctx.debug(format!("Row {} filtered out", row.id()));
            }
        }
    }
}
