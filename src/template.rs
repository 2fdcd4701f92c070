use serde_json::{Map, Value};

use crate::error::PhenolinkError;

const K_IF: &str = "{if}";
const K_THEN: &str = "{then}";
const K_ELSE: &str = "{else}";
const K_JOIN: &str = "{join}";
const K_SEPARATOR: &str = "{separator}";
const K_ACCEPT_NONE: &str = "{accept_none}";
const K_MERGE: &str = "{merge}";
const K_WITH: &str = "{with}";
const K_MAP: &str = "{map}";
const K_TO: &str = "{to}";
const K_OR: &str = "{or}";
const K_FLATTEN_DISTINCT: &str = "{flatten_distinct}";
const K_LIST: &str = "{list}";
const K_TRANSFORM: &str = "{transform}";

const RESERVED: &[&str] = &[
    K_IF,
    K_THEN,
    K_ELSE,
    K_JOIN,
    K_SEPARATOR,
    K_ACCEPT_NONE,
    K_MERGE,
    K_WITH,
    K_MAP,
    K_TO,
    K_OR,
    K_FLATTEN_DISTINCT,
    K_LIST,
    K_TRANSFORM,
];

/// One `.`-separated field walk. An empty step list is the identity path `.`
/// (the current document itself).
pub type Path = Vec<String>;

/// One stage of an expression chain, evaluated against a single document.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Path(Path),
    /// `+`-combined paths, rendered as a distinct-word text join.
    Concat(Vec<Path>),
}

/// A brace-delimited expression: a head step, then one store dereference per
/// `=>` arrow followed by the next step.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub head: Step,
    pub joins: Vec<Step>,
}

/// Fragment of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Expr(Expr),
}

/// Parsed template AST. Immutable once parsed; evaluated repeatedly against
/// different documents by [`crate::resolve::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// Plain value with no expression spans.
    Literal(Value),
    /// A string that is exactly one expression span; preserves the resolved
    /// value's type.
    Expr(Expr),
    /// A string mixing literal text and expression spans; always stringifies.
    Interpolated(Vec<Segment>),
    List(Vec<Template>),
    Map(Vec<(String, Template)>),
    If {
        condition: Box<Template>,
        then: Box<Template>,
        otherwise: Option<Box<Template>>,
    },
    JoinText {
        items: Box<Template>,
        separator: String,
        accept_none: bool,
    },
    Merge {
        base: Box<Template>,
        overlay: Box<Template>,
    },
    MapEach {
        source: Box<Template>,
        to: Box<Template>,
    },
    Or(Vec<Template>),
    FlattenDistinct(Vec<Template>),
    TransformList {
        list: Box<Template>,
        transforms: Vec<String>,
    },
}

/// Parse a raw template literal (written in the same value syntax as the data
/// it produces) into an AST.
pub fn parse_template(raw: &Value) -> Result<Template, PhenolinkError> {
    match raw {
        Value::String(text) => parse_text(text),
        Value::Array(items) => {
            let parsed = items
                .iter()
                .map(parse_template)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Template::List(parsed))
        }
        Value::Object(fields) => parse_mapping(fields),
        other => Ok(Template::Literal(other.clone())),
    }
}

fn parse_text(text: &str) -> Result<Template, PhenolinkError> {
    let segments = scan_segments(text)?;
    let expr_count = segments
        .iter()
        .filter(|segment| matches!(segment, Segment::Expr(_)))
        .count();
    if expr_count == 0 {
        return Ok(Template::Literal(Value::String(text.to_string())));
    }
    if expr_count == 1 && segments.len() == 1 {
        if let Some(Segment::Expr(expr)) = segments.into_iter().next() {
            return Ok(Template::Expr(expr));
        }
        unreachable!("single segment checked as expression");
    }
    Ok(Template::Interpolated(segments))
}

fn scan_segments(text: &str) -> Result<Vec<Segment>, PhenolinkError> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(position) = rest.find(['{', '}']) {
        if rest[position..].starts_with('}') {
            return Err(PhenolinkError::TemplateSyntax(format!(
                "unbalanced braces in \"{text}\""
            )));
        }
        if position > 0 {
            segments.push(Segment::Literal(rest[..position].to_string()));
        }
        let after_open = &rest[position + 1..];
        let close = after_open.find(['{', '}']).ok_or_else(|| {
            PhenolinkError::TemplateSyntax(format!("unbalanced braces in \"{text}\""))
        })?;
        if after_open[close..].starts_with('{') {
            return Err(PhenolinkError::TemplateSyntax(format!(
                "unbalanced braces in \"{text}\""
            )));
        }
        let expr = parse_expr(&after_open[..close], text)?;
        segments.push(Segment::Expr(expr));
        rest = &after_open[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

fn parse_expr(span: &str, context: &str) -> Result<Expr, PhenolinkError> {
    let span = span.trim();
    if span.is_empty() {
        return Err(PhenolinkError::TemplateSyntax(format!(
            "empty expression in \"{context}\""
        )));
    }
    let mut steps = span
        .split("=>")
        .map(|step| parse_step(step, context))
        .collect::<Result<Vec<_>, _>>()?;
    let head = steps.remove(0);
    Ok(Expr { head, joins: steps })
}

fn parse_step(step: &str, context: &str) -> Result<Step, PhenolinkError> {
    let step = step.trim();
    if !step.contains('+') {
        return Ok(Step::Path(parse_path(step, context)?));
    }
    let paths = step
        .split('+')
        .map(|path| parse_path(path, context))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Step::Concat(paths))
}

fn parse_path(path: &str, context: &str) -> Result<Path, PhenolinkError> {
    let path = path.trim();
    if path == "." {
        return Ok(Vec::new());
    }
    let Some(stripped) = path.strip_prefix('.') else {
        return Err(PhenolinkError::TemplateSyntax(format!(
            "path must start with '.' in \"{context}\""
        )));
    };
    let mut fields = Vec::new();
    for segment in stripped.split('.') {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(PhenolinkError::TemplateSyntax(format!(
                "empty path segment in \"{context}\""
            )));
        }
        fields.push(segment.to_string());
    }
    Ok(fields)
}

/// Reserved keys present in a mapping must form exactly one combinator; a
/// mapping with no reserved keys is a plain mapping template.
fn parse_mapping(fields: &Map<String, Value>) -> Result<Template, PhenolinkError> {
    let reserved: Vec<&str> = fields
        .keys()
        .filter(|key| RESERVED.contains(&key.as_str()))
        .map(String::as_str)
        .collect();

    if reserved.is_empty() {
        let mut entries = Vec::new();
        for (key, value) in fields {
            entries.push((key.clone(), parse_template(value)?));
        }
        return Ok(Template::Map(entries));
    }

    if reserved.len() != fields.len() {
        return Err(PhenolinkError::TemplateSyntax(format!(
            "plain keys mixed with reserved keys {reserved:?}"
        )));
    }

    let primaries: Vec<&str> = reserved
        .iter()
        .copied()
        .filter(|key| {
            matches!(
                *key,
                K_IF | K_JOIN | K_MERGE | K_MAP | K_OR | K_FLATTEN_DISTINCT | K_LIST
            )
        })
        .collect();
    if primaries.len() != 1 {
        return Err(PhenolinkError::TemplateSyntax(format!(
            "ambiguous combinator keys {reserved:?}"
        )));
    }

    let allowed: &[&str] = match primaries[0] {
        K_IF => &[K_IF, K_THEN, K_ELSE],
        K_JOIN => &[K_JOIN, K_SEPARATOR, K_ACCEPT_NONE],
        K_MERGE => &[K_MERGE, K_WITH],
        K_MAP => &[K_MAP, K_TO],
        K_OR => &[K_OR],
        K_FLATTEN_DISTINCT => &[K_FLATTEN_DISTINCT],
        K_LIST => &[K_LIST, K_TRANSFORM],
        _ => unreachable!("primary key checked above"),
    };
    if let Some(stray) = reserved.iter().find(|key| !allowed.contains(key)) {
        return Err(PhenolinkError::TemplateSyntax(format!(
            "key {stray} does not belong to the {} form",
            primaries[0]
        )));
    }

    let partner = |key: &str| -> Result<&Value, PhenolinkError> {
        fields.get(key).ok_or_else(|| {
            PhenolinkError::TemplateSyntax(format!(
                "{} form is missing its {key} key",
                primaries[0]
            ))
        })
    };

    match primaries[0] {
        K_IF => Ok(Template::If {
            condition: Box::new(parse_template(&fields[K_IF])?),
            then: Box::new(parse_template(partner(K_THEN)?)?),
            otherwise: fields
                .get(K_ELSE)
                .map(parse_template)
                .transpose()?
                .map(Box::new),
        }),
        K_JOIN => {
            let separator = match fields.get(K_SEPARATOR) {
                None => String::new(),
                Some(Value::String(text)) => text.clone(),
                Some(other) => {
                    return Err(PhenolinkError::TemplateSyntax(format!(
                        "{K_SEPARATOR} must be a string, got {other}"
                    )));
                }
            };
            let accept_none = match fields.get(K_ACCEPT_NONE) {
                None => false,
                Some(Value::Bool(flag)) => *flag,
                Some(other) => {
                    return Err(PhenolinkError::TemplateSyntax(format!(
                        "{K_ACCEPT_NONE} must be a boolean, got {other}"
                    )));
                }
            };
            Ok(Template::JoinText {
                items: Box::new(parse_template(&fields[K_JOIN])?),
                separator,
                accept_none,
            })
        }
        K_MERGE => Ok(Template::Merge {
            base: Box::new(parse_template(&fields[K_MERGE])?),
            overlay: Box::new(parse_template(partner(K_WITH)?)?),
        }),
        K_MAP => Ok(Template::MapEach {
            source: Box::new(parse_template(&fields[K_MAP])?),
            to: Box::new(parse_template(partner(K_TO)?)?),
        }),
        K_OR => Ok(Template::Or(parse_items(&fields[K_OR])?)),
        K_FLATTEN_DISTINCT => Ok(Template::FlattenDistinct(parse_items(
            &fields[K_FLATTEN_DISTINCT],
        )?)),
        K_LIST => {
            let transforms = match partner(K_TRANSFORM)? {
                Value::Array(names) => names
                    .iter()
                    .map(|name| {
                        name.as_str().map(str::to_string).ok_or_else(|| {
                            PhenolinkError::TemplateSyntax(format!(
                                "{K_TRANSFORM} names must be strings, got {name}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                Value::String(name) => vec![name.clone()],
                other => {
                    return Err(PhenolinkError::TemplateSyntax(format!(
                        "{K_TRANSFORM} must be a list of names, got {other}"
                    )));
                }
            };
            Ok(Template::TransformList {
                list: Box::new(parse_template(&fields[K_LIST])?),
                transforms,
            })
        }
        _ => unreachable!("primary key checked above"),
    }
}

fn parse_items(raw: &Value) -> Result<Vec<Template>, PhenolinkError> {
    match raw {
        Value::Array(items) => items.iter().map(parse_template).collect(),
        other => Ok(vec![parse_template(other)?]),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn plain_string_is_literal() {
        let template = parse_template(&json!("foo")).unwrap();
        assert_eq!(template, Template::Literal(json!("foo")));
    }

    #[test]
    fn bare_span_is_an_expression() {
        let template = parse_template(&json!("{.foo.bar}")).unwrap();
        assert_matches!(template, Template::Expr(_));
    }

    #[test]
    fn mixed_text_is_interpolated() {
        let template = parse_template(&json!("The species is {.genus}")).unwrap();
        let Template::Interpolated(segments) = template else {
            panic!("expected interpolated template");
        };
        assert_eq!(segments.len(), 2);
        assert_matches!(&segments[0], Segment::Literal(text) if text == "The species is ");
        assert_matches!(&segments[1], Segment::Expr(_));
    }

    #[test]
    fn two_spans_are_interpolated() {
        let template = parse_template(&json!("{.foo}{.bar}")).unwrap();
        assert_matches!(template, Template::Interpolated(_));
    }

    #[test]
    fn identity_path() {
        let template = parse_template(&json!("{.}")).unwrap();
        let Template::Expr(expr) = template else {
            panic!("expected expression");
        };
        assert_eq!(expr.head, Step::Path(vec![]));
        assert!(expr.joins.is_empty());
    }

    #[test]
    fn chain_with_joins_and_concat() {
        let template = parse_template(&json!("{ .titi => .toto.tata + .tutu }")).unwrap();
        let Template::Expr(expr) = template else {
            panic!("expected expression");
        };
        assert_eq!(expr.head, Step::Path(vec!["titi".to_string()]));
        assert_eq!(
            expr.joins,
            vec![Step::Concat(vec![
                vec!["toto".to_string(), "tata".to_string()],
                vec!["tutu".to_string()],
            ])]
        );
    }

    #[test]
    fn unbalanced_braces_fail() {
        for raw in ["{.foo", ".foo}", "{.foo{.bar}}", "a } b"] {
            let err = parse_template(&json!(raw)).unwrap_err();
            assert_matches!(err, PhenolinkError::TemplateSyntax(_), "raw: {raw}");
        }
    }

    #[test]
    fn empty_path_segment_fails() {
        for raw in ["{}", "{.foo..bar}", "{foo}", "{.foo + }"] {
            let err = parse_template(&json!(raw)).unwrap_err();
            assert_matches!(err, PhenolinkError::TemplateSyntax(_), "raw: {raw}");
        }
    }

    #[test]
    fn reserved_mapping_forms_parse() {
        let template = parse_template(&json!({
            "{if}": "{.flag}",
            "{then}": "yes",
            "{else}": "no"
        }))
        .unwrap();
        assert_matches!(template, Template::If { otherwise: Some(_), .. });

        let template = parse_template(&json!({
            "{join}": ["a", "b"],
            "{separator}": ", "
        }))
        .unwrap();
        assert_matches!(
            template,
            Template::JoinText { separator, accept_none: false, .. } if separator == ", "
        );
    }

    #[test]
    fn missing_partner_key_fails() {
        let err = parse_template(&json!({"{if}": "x"})).unwrap_err();
        assert_matches!(err, PhenolinkError::TemplateSyntax(_));

        let err = parse_template(&json!({"{map}": "{.x}"})).unwrap_err();
        assert_matches!(err, PhenolinkError::TemplateSyntax(_));

        let err = parse_template(&json!({"{merge}": {}})).unwrap_err();
        assert_matches!(err, PhenolinkError::TemplateSyntax(_));

        let err = parse_template(&json!({"{list}": []})).unwrap_err();
        assert_matches!(err, PhenolinkError::TemplateSyntax(_));
    }

    #[test]
    fn ambiguous_combinator_keys_fail() {
        let err = parse_template(&json!({
            "{if}": "x",
            "{then}": "y",
            "{or}": ["z"]
        }))
        .unwrap_err();
        assert_matches!(err, PhenolinkError::TemplateSyntax(_));

        // Secondary key without its primary.
        let err = parse_template(&json!({"{then}": "y"})).unwrap_err();
        assert_matches!(err, PhenolinkError::TemplateSyntax(_));

        // Secondary key of a different family.
        let err = parse_template(&json!({
            "{join}": ["a"],
            "{with}": {}
        }))
        .unwrap_err();
        assert_matches!(err, PhenolinkError::TemplateSyntax(_));
    }

    #[test]
    fn reserved_keys_do_not_mix_with_plain_keys() {
        let err = parse_template(&json!({
            "{map}": "{.x}",
            "{to}": "{.}",
            "name": "x"
        }))
        .unwrap_err();
        assert_matches!(err, PhenolinkError::TemplateSyntax(_));
    }

    #[test]
    fn plain_mapping_keeps_key_order() {
        let template = parse_template(&json!({"b": "1", "a": "{.x}"})).unwrap();
        let Template::Map(entries) = template else {
            panic!("expected mapping template");
        };
        assert_eq!(entries[0].0, "b");
        assert_eq!(entries[1].0, "a");
    }
}
