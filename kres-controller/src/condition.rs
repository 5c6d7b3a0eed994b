// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

//! A relaxed JSONPath dialect for wait conditions.
//!
//! Supported syntax: an optional `$` root (kubectl style `{...}` braces are
//! also accepted), `.field`, `['field']`, `[index]` with negative indexes
//! counting from the end, `*` / `[*]` wildcards, `..` recursive descent and
//! filters of the form `[?(@.type == "Ready")]`, `[?(@.name != 'x')]` and
//! `[?(@.status)]`. A leading bare field name (`status.phase`) is treated as
//! `$.status.phase`.

use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid path {path:?} at offset {offset}: {message}")]
pub struct PathError {
    pub path: String,
    pub offset: usize,
    pub message: String,
}

/// A compiled path expression
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Child(String),
    Children(Vec<String>),
    Index(i64),
    Wildcard,
    Descendants,
    Filter(Filter),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Filter {
    Exists(Vec<Segment>),
    Compare {
        path: Vec<Segment>,
        negate: bool,
        literal: Value,
    },
}

/// Result of evaluating a path against a document
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation<'a> {
    Found(Vec<&'a Value>),
    NotPresent,
}

impl<'a> Evaluation<'a> {
    pub fn is_present(&self) -> bool {
        matches!(self, Evaluation::Found(_))
    }

    pub fn values(&self) -> &[&'a Value] {
        match self {
            Evaluation::Found(values) => values,
            Evaluation::NotPresent => &[],
        }
    }

    /// The first matched value rendered as text
    pub fn first_text(&self) -> Option<String> {
        self.values().first().map(|value| value_text(value))
    }

    /// Whether any matched value equals `expected`, or when no value is
    /// expected, whether any matched value is non-empty
    pub fn satisfies(&self, expected: Option<&str>) -> bool {
        let values = self.values();
        match expected {
            Some(expected) => values.iter().any(|value| value_text(value) == expected),
            None => values.iter().any(|value| !is_empty(value)),
        }
    }
}

/// Evaluate a compiled path. Never fails and never mutates the document; a
/// path that selects nothing is `NotPresent`.
pub fn evaluate<'a>(document: &'a Value, path: &JsonPath) -> Evaluation<'a> {
    let found = select(vec![document], &path.segments);
    if found.is_empty() {
        Evaluation::NotPresent
    } else {
        Evaluation::Found(found)
    }
}

/// Text form of a value used for comparisons: strings are unquoted, other
/// scalars use their JSON spelling, containers are compact JSON
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn select<'a>(nodes: Vec<&'a Value>, segments: &[Segment]) -> Vec<&'a Value> {
    segments.iter().fold(nodes, |nodes, segment| {
        let mut next = Vec::new();
        for node in nodes {
            apply_segment(node, segment, &mut next);
        }
        next
    })
}

fn apply_segment<'a>(node: &'a Value, segment: &Segment, out: &mut Vec<&'a Value>) {
    match segment {
        Segment::Child(name) => {
            if let Some(child) = node.as_object().and_then(|map| map.get(name)) {
                out.push(child);
            }
        },
        Segment::Children(names) => {
            if let Some(map) = node.as_object() {
                out.extend(names.iter().filter_map(|name| map.get(name)));
            }
        },
        Segment::Index(index) => {
            if let Some(items) = node.as_array() {
                let resolved = if *index < 0 { items.len() as i64 + index } else { *index };
                if let Some(item) = usize::try_from(resolved).ok().and_then(|i| items.get(i)) {
                    out.push(item);
                }
            }
        },
        Segment::Wildcard => match node {
            Value::Array(items) => out.extend(items.iter()),
            Value::Object(map) => out.extend(map.values()),
            _ => {},
        },
        Segment::Descendants => collect_descendants(node, out),
        Segment::Filter(filter) => {
            let candidates: Vec<&Value> = match node {
                Value::Array(items) => items.iter().collect(),
                Value::Object(map) => map.values().collect(),
                _ => Vec::new(),
            };
            out.extend(candidates.into_iter().filter(|candidate| filter.accepts(candidate)));
        },
    }
}

fn collect_descendants<'a>(node: &'a Value, out: &mut Vec<&'a Value>) {
    out.push(node);
    match node {
        Value::Array(items) => items.iter().for_each(|item| collect_descendants(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_descendants(item, out)),
        _ => {},
    }
}

impl Filter {
    fn accepts(&self, candidate: &Value) -> bool {
        match self {
            Filter::Exists(path) => !select(vec![candidate], path).is_empty(),
            Filter::Compare { path, negate, literal } => {
                let found = select(vec![candidate], path);
                let equal = found.iter().any(|value| literal_equals(value, literal));
                if *negate { !found.is_empty() && !equal } else { equal }
            },
        }
    }
}

fn literal_equals(value: &Value, literal: &Value) -> bool {
    match (value, literal) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        // Relaxed: "3" matches 3 and "true" matches true
        (Value::String(text), Value::Number(_) | Value::Bool(_)) => *text == literal.to_string(),
        (Value::Number(_) | Value::Bool(_), Value::String(text)) => value.to_string() == *text,
        _ => value == literal,
    }
}

impl JsonPath {
    pub fn parse(source: &str) -> Result<Self, PathError> {
        let segments = path_grammar::path(source).map_err(|e| PathError {
            path: source.to_string(),
            offset: e.location.offset,
            message: format!("expected {}", e.expected),
        })?;
        Ok(JsonPath { source: source.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for JsonPath {
    type Err = PathError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        JsonPath::parse(source)
    }
}

impl Display for JsonPath {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.write_str(&self.source)
    }
}

// Unquoted filter operands that are not JSON scalars compare as strings
fn word_literal(word: &str) -> Value {
    serde_json::from_str::<Value>(word)
        .ok()
        .filter(|value| !value.is_object() && !value.is_array())
        .unwrap_or_else(|| Value::String(word.to_string()))
}

peg::parser! {
    grammar path_grammar() for str {
        rule _() = quiet!{[' ' | '\t' | '\r' | '\n']*}

        rule reserved()
            = [' ' | '\t' | '\r' | '\n' | '.' | '[' | ']' | '(' | ')' | '=' | '!' | '{' | '}' | '\'' | '"' | '*' | '@' | '$' | ',']

        rule name() -> String
            = quiet!{n:$((!reserved() [_])+) { n.to_string() }} / expected!("<field name>")

        rule escaped() -> char = "\\" c:[_] { c }

        rule quoted() -> String
            = "'" s:(escaped() / !['\''] c:[_] { c })* "'" { s.into_iter().collect() }
            / "\"" s:(escaped() / !['"'] c:[_] { c })* "\"" { s.into_iter().collect() }

        rule index() -> i64
            = n:$("-"? ['0'..='9']+) {? n.parse().map_err(|_| "<index>") }

        rule literal() -> Value
            = s:quoted() { Value::String(s) }
            / w:$((![' ' | '\t' | '\r' | '\n' | ')'] [_])+) { word_literal(w) }

        rule child() -> Segment = n:name() { Segment::Child(n) }
        rule wildcard() -> Segment = "*" { Segment::Wildcard }

        rule step() -> Vec<Segment>
            = ".." s:(wildcard() / child() / bracket()) { vec![Segment::Descendants, s] }
            / "." s:(wildcard() / child()) { vec![s] }
            / s:bracket() { vec![s] }

        rule bracket() -> Segment = "[" _ s:selector() _ "]" { s }

        rule selector() -> Segment
            = "*" { Segment::Wildcard }
            / "?" _ "(" _ f:filter() _ ")" { Segment::Filter(f) }
            / names:(quoted() ++ (_ "," _)) {
                if names.len() == 1 {
                    Segment::Child(names[0].clone())
                } else {
                    Segment::Children(names)
                }
            }
            / i:index() { Segment::Index(i) }

        rule negated() -> bool = "==" { false } / "!=" { true }

        rule filter() -> Filter
            = "@" path:step()* _ negate:negated() _ literal:literal() {
                Filter::Compare { path: path.concat(), negate, literal }
            }
            / "@" path:step()* { Filter::Exists(path.concat()) }

        // A bare leading field (`status.phase`) reads as `$.status.phase`
        rule steps() -> Vec<Segment>
            = "$" rest:step()* { rest.concat() }
            / head:child() rest:step()* { std::iter::once(head).chain(rest.into_iter().flatten()).collect() }
            / rest:step()+ { rest.concat() }

        pub rule path() -> Vec<Segment>
            = _ "{" _ s:steps() _ "}" _ { s }
            / _ s:steps() _ { s }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn deployment() -> Value {
        json!({
            "metadata": {
                "name": "web",
                "annotations": {"app.kubernetes.io/name": "web"},
            },
            "spec": {"replicas": 3, "paused": false},
            "status": {
                "ready": "True",
                "observedGeneration": 4,
                "conditions": [
                    {"type": "Progressing", "status": "True"},
                    {"type": "Available", "status": "False", "reason": "MinimumReplicasUnavailable"},
                ],
                "empty": "",
            },
        })
    }

    fn eval(document: &Value, path: &str) -> Vec<Value> {
        let path = JsonPath::parse(path).unwrap();
        evaluate(document, &path).values().iter().map(|value| (*value).clone()).collect()
    }

    #[rstest]
    #[case("$.status.ready", json!(["True"]))]
    #[case("status.ready", json!(["True"]))]
    #[case(".status.ready", json!(["True"]))]
    #[case("{.status.ready}", json!(["True"]))]
    #[case("$['status']['ready']", json!(["True"]))]
    #[case("$.metadata.annotations['app.kubernetes.io/name']", json!(["web"]))]
    #[case("$.status.conditions[1].type", json!(["Available"]))]
    #[case("$.status.conditions[-1].type", json!(["Available"]))]
    #[case("$.status.conditions[*].type", json!(["Progressing", "Available"]))]
    #[case("$.status.conditions.*.status", json!(["True", "False"]))]
    #[case("$.status.conditions[?(@.type == 'Available')].status", json!(["False"]))]
    #[case("$.status.conditions[?(@.type != \"Available\")].type", json!(["Progressing"]))]
    #[case("$.status.conditions[?(@.reason)].type", json!(["Available"]))]
    #[case("$..reason", json!(["MinimumReplicasUnavailable"]))]
    #[case("$.spec['replicas','paused']", json!([3, false]))]
    #[case("$.status[?(@ == 4)]", json!([4]))]
    fn selects_expected_nodes(#[case] path: &str, #[case] expected: Value) {
        assert_eq!(Value::Array(eval(&deployment(), path)), expected);
    }

    #[rstest]
    #[case("$.status.missing")]
    #[case("$.status.conditions[5]")]
    #[case("$.status.conditions[-3]")]
    #[case("$.status.ready.deeper")]
    #[case("$.spec.replicas[0]")]
    #[case("$.status.conditions[?(@.type == 'Degraded')]")]
    fn missing_paths_are_not_present(#[case] path: &str) {
        let document = deployment();
        let path = JsonPath::parse(path).unwrap();
        assert_eq!(evaluate(&document, &path), Evaluation::NotPresent);
    }

    #[rstest]
    #[case("")]
    #[case("$.")]
    #[case("$.status[")]
    #[case("$.status[abc]")]
    #[case("$['unterminated]")]
    #[case("$.status.conditions[?(@.type ~ 'x')]")]
    #[case("$.a b")]
    #[case("{.status")]
    fn malformed_paths_are_rejected(#[case] path: &str) {
        assert!(JsonPath::parse(path).is_err(), "{path:?} should not parse");
    }

    #[test]
    fn satisfies_uses_any_match_and_text_comparison() {
        let document = deployment();

        let statuses = JsonPath::parse("$.status.conditions[*].status").unwrap();
        assert!(evaluate(&document, &statuses).satisfies(Some("False")));
        assert!(evaluate(&document, &statuses).satisfies(Some("True")));
        assert!(!evaluate(&document, &statuses).satisfies(Some("Unknown")));

        let generation = JsonPath::parse("$.status.observedGeneration").unwrap();
        assert!(evaluate(&document, &generation).satisfies(Some("4")));

        let paused = JsonPath::parse("$.spec.paused").unwrap();
        assert!(evaluate(&document, &paused).satisfies(Some("false")));
        assert!(evaluate(&document, &paused).satisfies(None));
    }

    #[test]
    fn empty_values_do_not_satisfy_presence() {
        let document = deployment();
        let empty = JsonPath::parse("$.status.empty").unwrap();
        let evaluation = evaluate(&document, &empty);
        assert!(evaluation.is_present());
        assert!(!evaluation.satisfies(None));
        assert!(evaluation.satisfies(Some("")));

        let missing = JsonPath::parse("$.status.nope").unwrap();
        assert!(!evaluate(&document, &missing).satisfies(None));
    }

    #[test]
    fn evaluation_leaves_document_untouched() {
        let document = deployment();
        let before = document.clone();
        let path = JsonPath::parse("$..*").unwrap();
        assert!(evaluate(&document, &path).is_present());
        assert_eq!(document, before);
    }

    #[test]
    fn error_reports_offset() {
        let error = JsonPath::parse("$.status[abc]").unwrap_err();
        assert_eq!(error.offset, 9);
        assert_eq!(error.path, "$.status[abc]");
        assert!(error.message.starts_with("expected "), "{}", error.message);

        let error = JsonPath::parse("$.status.conditions[?(@.type ~ 'x')]").unwrap_err();
        assert_eq!(error.offset, 29);
    }
}
