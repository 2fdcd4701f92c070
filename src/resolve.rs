use serde_json::{Map, Value};

use crate::error::PhenolinkError;
use crate::store::DataIndex;
use crate::template::{Expr, Segment, Step, Template};
use crate::value::{as_list, flatten_deep, is_truthy, text_form};

/// Evaluate a parsed template against a context document and the index.
/// Read-only and deterministic; neither the document nor the index is touched.
pub fn resolve(
    template: &Template,
    document: &Value,
    index: &dyn DataIndex,
) -> Result<Value, PhenolinkError> {
    Ok(resolve_node(template, document, index)?.unwrap_or(Value::Null))
}

/// Node-level evaluation. `None` means the value is omitted entirely (an empty
/// `map`/`to` inside a mapping template drops its key instead of going null).
fn resolve_node(
    template: &Template,
    document: &Value,
    index: &dyn DataIndex,
) -> Result<Option<Value>, PhenolinkError> {
    match template {
        Template::Literal(value) => Ok(Some(value.clone())),
        Template::Expr(expr) => eval_expr(expr, document, index).map(Some),
        Template::Interpolated(segments) => {
            let mut out = String::new();
            for segment in segments {
                match segment {
                    Segment::Literal(text) => out.push_str(text),
                    Segment::Expr(expr) => {
                        out.push_str(&text_form(&eval_expr(expr, document, index)?));
                    }
                }
            }
            Ok(Some(Value::String(out)))
        }
        Template::List(items) => {
            let mut out = Vec::new();
            for item in items {
                out.push(resolve(item, document, index)?);
            }
            Ok(Some(Value::Array(out)))
        }
        Template::Map(entries) => {
            let mut out = Map::new();
            for (key, value) in entries {
                if let Some(resolved) = resolve_node(value, document, index)? {
                    out.insert(key.clone(), resolved);
                }
            }
            Ok(Some(Value::Object(out)))
        }
        Template::If {
            condition,
            then,
            otherwise,
        } => {
            if is_truthy(&resolve(condition, document, index)?) {
                resolve_node(then, document, index)
            } else if let Some(otherwise) = otherwise {
                resolve_node(otherwise, document, index)
            } else {
                Ok(Some(Value::Null))
            }
        }
        Template::JoinText {
            items,
            separator,
            accept_none,
        } => {
            let resolved = resolve(items, document, index)?;
            let mut leaves = Vec::new();
            flatten_deep(&resolved, &mut leaves);
            if !accept_none && leaves.iter().any(Value::is_null) {
                return Ok(Some(Value::Null));
            }
            let texts: Vec<String> = leaves.iter().map(text_form).collect();
            Ok(Some(Value::String(texts.join(separator.as_str()))))
        }
        Template::Merge { base, overlay } => {
            let mut out = Map::new();
            for part in [base, overlay] {
                if let Value::Object(fields) = resolve(part, document, index)? {
                    for (key, value) in fields {
                        out.insert(key, value);
                    }
                }
            }
            Ok(Some(Value::Object(out)))
        }
        Template::MapEach { source, to } => {
            let source = resolve(source, document, index)?;
            if !is_truthy(&source) {
                return Ok(None);
            }
            let elements = as_list(&source);
            let mut out = Vec::new();
            for element in &elements {
                out.push(resolve(to, element, index)?);
            }
            Ok(Some(Value::Array(out)))
        }
        Template::Or(candidates) => {
            for candidate in candidates {
                let value = resolve(candidate, document, index)?;
                if is_truthy(&value) {
                    return Ok(Some(value));
                }
            }
            Ok(Some(Value::Null))
        }
        Template::FlattenDistinct(items) => {
            let mut leaves = Vec::new();
            for item in items {
                let value = resolve(item, document, index)?;
                flatten_deep(&value, &mut leaves);
            }
            let mut distinct = Vec::new();
            for leaf in leaves {
                if !leaf.is_null() && !distinct.contains(&leaf) {
                    distinct.push(leaf);
                }
            }
            Ok(Some(Value::Array(distinct)))
        }
        Template::TransformList { list, transforms } => {
            let mut value = resolve(list, document, index)?;
            for name in transforms {
                value = match name.as_str() {
                    "capitalize" => capitalize(&value),
                    "flatten" => {
                        let mut leaves = Vec::new();
                        flatten_deep(&value, &mut leaves);
                        Value::Array(leaves)
                    }
                    unknown => {
                        return Err(PhenolinkError::UnknownTransform(unknown.to_string()));
                    }
                };
            }
            Ok(Some(value))
        }
    }
}

fn eval_expr(expr: &Expr, document: &Value, index: &dyn DataIndex) -> Result<Value, PhenolinkError> {
    let head = eval_step(&expr.head, document);
    if expr.joins.is_empty() {
        return Ok(head);
    }
    // Nothing to dereference: the whole chain is null, not an empty sequence.
    if head.is_null() {
        return Ok(Value::Null);
    }

    // Each arrow dereferences every value of the running sequence through the
    // index, applies the next step to the document behind it and flattens the
    // step results back into one sequence.
    let mut current = as_list(&head);
    for step in &expr.joins {
        let mut next = Vec::new();
        for element in &current {
            if element.is_null() {
                continue;
            }
            let key = text_form(element);
            let linked = index
                .get(&key)
                .ok_or_else(|| PhenolinkError::UnresolvedKey(key.clone()))?;
            let value = eval_step(step, linked);
            if value.is_null() {
                continue;
            }
            next.extend(as_list(&value));
        }
        current = next;
    }

    // Text compositions collapse to their distinct results across the chain.
    if matches!(expr.joins.last(), Some(Step::Concat(_))) {
        let mut distinct = Vec::new();
        for value in current {
            if !distinct.contains(&value) {
                distinct.push(value);
            }
        }
        current = distinct;
    }
    Ok(Value::Array(current))
}

fn eval_step(step: &Step, document: &Value) -> Value {
    match step {
        Step::Path(path) => walk(document, path),
        Step::Concat(paths) => {
            let texts: Vec<String> = paths
                .iter()
                .map(|path| walk(document, path))
                .filter(|value| !value.is_null())
                .map(|value| text_form(&value))
                .collect();
            if texts.is_empty() {
                Value::Null
            } else {
                Value::String(join_distinct_words(&texts))
            }
        }
    }
}

/// Field walk from the context document; any missing field at any depth
/// resolves the whole path to null.
fn walk(document: &Value, path: &[String]) -> Value {
    let mut current = document;
    for field in path {
        match current {
            Value::Object(fields) => match fields.get(field) {
                Some(value) => current = value,
                None => return Value::Null,
            },
            _ => return Value::Null,
        }
    }
    current.clone()
}

/// `+` composition: split operand texts into words, keep the first occurrence
/// of each, join with single spaces. "Zea" + "Zea mays" reads "Zea mays".
fn join_distinct_words(texts: &[String]) -> String {
    let mut words: Vec<&str> = Vec::new();
    for text in texts {
        for word in text.split_whitespace() {
            if !words.contains(&word) {
                words.push(word);
            }
        }
    }
    words.join(" ")
}

fn capitalize(value: &Value) -> Value {
    match value {
        Value::String(text) => {
            let mut chars = text.chars();
            match chars.next() {
                Some(first) => Value::String(first.to_uppercase().chain(chars).collect()),
                None => Value::String(String::new()),
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(capitalize).collect()),
        other => other.clone(),
    }
}
