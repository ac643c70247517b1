//! Rust literal formatting for generated source

use etlflow_runtime::Value;

/// Escape `text` for use between double quotes in a Rust string literal
pub fn escape_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{{{:x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// A quoted Rust string literal
pub fn string_literal(text: &str) -> String {
    format!("\"{}\"", escape_str(text))
}

/// Expression building `value` as an `etlflow_runtime::Value`
pub fn value_expr(value: &Value) -> String {
    match value {
        Value::Null => "Value::Null".to_string(),
        Value::Bool(b) => format!("Value::from({b})"),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                format!("Value::from({i}_i64)")
            } else if let Some(u) = n.as_u64() {
                format!("Value::from({u}_u64)")
            } else {
                format!("Value::from({:?}_f64)", n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => format!("Value::from({})", string_literal(s)),
        // Bound parameters are scalars; anything else travels as JSON text
        other => format!("Value::from({})", string_literal(&other.to_string())),
    }
}
