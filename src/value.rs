use serde_json::Value;

/// Truthiness used by conditionals and the `or` combinator: null, `false`,
/// empty string, empty sequence and empty mapping are falsy, everything else
/// (including the number zero) is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::Number(_) => true,
    }
}

/// Text rendering for string interpolation and text joins. Sequences render as
/// the separator-less concatenation of their elements, nulls as empty text.
pub fn text_form(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(text_form).collect(),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Coerce a value to a list: null yields nothing, a sequence yields its
/// elements, anything else yields itself as a single element.
pub fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

/// Recursively strip mapping fields holding null/empty values and null
/// elements from sequences. Records carry no empty fields once persisted.
pub fn remove_empty(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            for (_, field) in fields.iter_mut() {
                remove_empty(field);
            }
            fields.retain(|_, field| !is_empty(field));
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                remove_empty(item);
            }
            items.retain(|item| !item.is_null());
        }
        _ => {}
    }
}

/// Recursively flatten nested sequences into `leaves`, preserving order.
/// Non-sequence values (null included) are leaves.
pub fn flatten_deep(value: &Value, leaves: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_deep(item, leaves);
            }
        }
        other => leaves.push(other.clone()),
    }
}
