//! MapTransformComponent - projects rows with a SELECT-style expression
//!
//! Supported: `SELECT *`, `SELECT a, b AS c, 'text' AS d, 42 AS e`. A
//! trailing `FROM ...` clause is accepted and ignored.

use crate::registry::ComponentDefinition;
use etlflow_runtime::{
    async_trait, Component, ComponentKind, Error, ParameterDef, ParameterSet, Ports, Result, Row,
    Value, WorkerContext,
};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    All,
    Column { name: String, alias: String },
    Literal { value: Value, alias: String },
}

fn alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^(.+?)\s+as\s+([A-Za-z_][\w]*)$").unwrap())
}

fn from_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\s+from\s+[\w.]+\s*;?\s*$").unwrap())
}

/// Split on commas that are not inside single or double quotes
fn split_items(list: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in list.chars() {
        match (c, quote) {
            ('\'' | '"', None) => {
                quote = Some(c);
                current.push(c);
            }
            (c, Some(q)) if c == q => {
                quote = None;
                current.push(c);
            }
            (',', None) => items.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    items.push(current);
    items.into_iter().map(|i| i.trim().to_string()).collect()
}

fn literal(expr: &str) -> Option<Value> {
    let quoted = expr.len() >= 2
        && ((expr.starts_with('\'') && expr.ends_with('\''))
            || (expr.starts_with('"') && expr.ends_with('"')));
    if quoted {
        return Some(Value::from(&expr[1..expr.len() - 1]));
    }
    if let Ok(i) = expr.parse::<i64>() {
        return Some(Value::from(i));
    }
    expr.parse::<f64>().ok().map(Value::from)
}

pub(crate) fn parse_mapping(expression: &str) -> Result<Vec<Projection>> {
    let trimmed = expression.trim();
    let body = trimmed
        .get(..6)
        .filter(|head| head.eq_ignore_ascii_case("select"))
        .map(|_| &trimmed[6..])
        .ok_or_else(|| {
            Error::parameter("mappingExpression", "expression must start with SELECT")
        })?;
    let body = from_pattern().replace(body, "");

    let mut projections = Vec::new();
    for item in split_items(&body) {
        if item.is_empty() {
            return Err(Error::parameter("mappingExpression", "empty select item"));
        }
        if item == "*" {
            projections.push(Projection::All);
            continue;
        }
        let (expr, alias) = match alias_pattern().captures(&item) {
            Some(caps) => (caps[1].trim().to_string(), Some(caps[2].to_string())),
            None => (item.clone(), None),
        };
        if let Some(value) = literal(&expr) {
            let alias = alias.ok_or_else(|| {
                Error::parameter("mappingExpression", format!("literal {expr} needs an alias"))
            })?;
            projections.push(Projection::Literal { value, alias });
        } else {
            let alias = alias.unwrap_or_else(|| expr.clone());
            projections.push(Projection::Column { name: expr, alias });
        }
    }
    Ok(projections)
}

pub(crate) fn project(row: &Row, projections: &[Projection]) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for projection in projections {
        match projection {
            Projection::All => {
                out.extend(row.payload().iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Projection::Column { name, alias } => {
                out.insert(alias.clone(), row.get(name).cloned().unwrap_or(Value::Null));
            }
            Projection::Literal { value, alias } => {
                out.insert(alias.clone(), value.clone());
            }
        }
    }
    out
}

/// Maps input rows to a new shape
pub struct MapTransformComponent {
    params: ParameterSet,
}

impl Default for MapTransformComponent {
    fn default() -> Self {
        Self {
            params: ParameterSet::new(vec![ParameterDef::sql("mappingExpression")
                .label("Mapping Expression")
                .description(
                    "SQL expression to map input fields to output fields \
                     (e.g., SELECT field1 as newField1, field2 as newField2)",
                )
                .required()]),
        }
    }
}

impl ComponentDefinition for MapTransformComponent {
    const ID: &'static str = "map-transform";
    const LABEL: &'static str = "Map Transform";
    const DESCRIPTION: &'static str = "Maps input data to a new schema using SQL expressions";
    const KIND: ComponentKind = ComponentKind::Transform;
    const TYPE_PATH: &'static str = "etlflow_components::MapTransformComponent";
}

#[async_trait]
impl Component for MapTransformComponent {
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
        let expression = self.params.require_str("mappingExpression")?;
        let projections = parse_mapping(&expression)?;
        ctx.debug(format!("Mapping with {} projections", projections.len()));

        loop {
            let mut row = ports.take().await?;
            if row.is_terminator() {
                return ports.send(row).await;
            }
            let payload = project(&row, &projections);
            row.replace_payload(payload);
            ports.send(row).await?;
        }
    }
}
