use std::collections::HashSet;

use rmpv::Value;

use crate::client::Fields;

/// Flatten a record into `[key, name1, value1, name2, value2, ...]`.
pub fn fields_to_tuple(key: &str, values: &Fields) -> Vec<Value> {
    let mut tuple = Vec::with_capacity(1 + 2 * values.len());
    tuple.push(Value::from(key));
    for (name, value) in values {
        tuple.push(Value::from(name.as_str()));
        tuple.push(Value::from(value.as_str()));
    }
    tuple
}

/// Rebuild the field map of a stored tuple. Position 0 holds the key and is
/// skipped; a trailing name without a value is ignored.
pub fn tuple_to_fields(tuple: Option<&[Value]>, fields: Option<&HashSet<String>>) -> Fields {
    let mut result = Fields::new();
    let Some(tuple) = tuple else {
        return result;
    };

    for pair in tuple.get(1..).unwrap_or_default().chunks_exact(2) {
        let name = value_to_string(&pair[0]);
        if fields.map_or(true, |wanted| wanted.contains(&name)) {
            result.insert(name, value_to_string(&pair[1]));
        }
    }
    result
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => match s.as_str() {
            Some(s) => s.to_string(),
            None => String::from_utf8_lossy(s.as_bytes()).into_owned(),
        },
        Value::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => other.to_string(),
    }
}
