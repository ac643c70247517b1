//! Component parameter declarations and bound values

use crate::error::{Error, Result};
use crate::row::{value_to_text, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Declared type of a parameter, as shown in the designer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Secret,
    Sql,
    Select,
}

impl ParameterType {
    /// Types whose values are emitted as quoted string literals
    pub fn is_textual(self) -> bool {
        !matches!(self, ParameterType::Number | ParameterType::Boolean)
    }
}

impl FromStr for ParameterType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "secret" => Ok(Self::Secret),
            "sql" => Ok(Self::Sql),
            "select" => Ok(Self::Select),
            other => Err(Error::parameter(other, "unknown parameter type")),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Secret => "secret",
            Self::Sql => "sql",
            Self::Select => "select",
        };
        f.write_str(s)
    }
}

/// Static declaration of one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub declared_type: ParameterType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl ParameterDef {
    pub fn new(name: &str, declared_type: ParameterType) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            description: String::new(),
            declared_type,
            required: false,
            default_value: None,
            options: Vec::new(),
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, ParameterType::String)
    }

    pub fn number(name: &str) -> Self {
        Self::new(name, ParameterType::Number)
    }

    pub fn sql(name: &str) -> Self {
        Self::new(name, ParameterType::Sql)
    }

    pub fn select(name: &str, options: &[&str]) -> Self {
        let mut def = Self::new(name, ParameterType::Select);
        def.options = options.iter().map(|o| o.to_string()).collect();
        def
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Declared parameters of a component plus the values bound to them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    defs: Vec<ParameterDef>,
    values: HashMap<String, Value>,
}

impl ParameterSet {
    pub fn new(defs: Vec<ParameterDef>) -> Self {
        Self {
            defs,
            values: HashMap::new(),
        }
    }

    pub fn definitions(&self) -> &[ParameterDef] {
        &self.defs
    }

    pub fn definition(&self, name: &str) -> Option<&ParameterDef> {
        self.defs.iter().find(|d| d.name == name)
    }

    /// Bind a value. Unknown names are rejected; so are select values
    /// outside the declared options.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let def = self
            .definition(name)
            .ok_or_else(|| Error::parameter(name, "parameter not found"))?;

        if def.declared_type == ParameterType::Select && !def.options.is_empty() {
            let text = value_to_text(&value);
            if !def.options.iter().any(|o| *o == text) {
                return Err(Error::parameter(
                    name,
                    format!("'{}' is not one of {:?}", text, def.options),
                ));
            }
        }

        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Bound value, falling back to the declared default
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .filter(|v| !v.is_null())
            .or_else(|| self.definition(name).and_then(|d| d.default_value.as_ref()))
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.values.get(name).is_some_and(|v| !v.is_null())
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get(name).map(value_to_text)
    }

    /// Like [`get_str`](Self::get_str), failing when absent or empty
    pub fn require_str(&self, name: &str) -> Result<String> {
        self.get_str(name)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::MissingParameter(name.to_string()))
    }

    pub fn get_i64(&self, name: &str) -> Result<Option<i64>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| Error::parameter(name, format!("{n} is not an integer"))),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Error::parameter(name, format!("'{s}' is not an integer"))),
            Some(other) => Err(Error::parameter(name, format!("{other} is not an integer"))),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(Error::parameter(name, format!("'{s}' is not a boolean"))),
            },
            Some(other) => Err(Error::parameter(name, format!("{other} is not a boolean"))),
        }
    }

    /// First required parameter with neither a value nor a default
    pub fn check_required(&self) -> Result<()> {
        match self
            .defs
            .iter()
            .find(|d| d.required && self.get(&d.name).is_none())
        {
            Some(def) => Err(Error::MissingParameter(def.name.clone())),
            None => Ok(()),
        }
    }
}
