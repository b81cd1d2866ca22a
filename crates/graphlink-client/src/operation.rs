//! Operation model: documents, kinds, contexts, and responses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::GraphqlError;

/// GraphQL document wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlDocument {
    document: String,
}

impl GraphqlDocument {
    /// Create a new document from a string.
    #[must_use]
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }

    /// Create a new document from a static string.
    #[must_use]
    pub fn from_static(document: &'static str) -> Self {
        Self::new(document)
    }

    /// Return the document text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.document
    }
}

/// Structural discriminant of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// A read.
    Query,
    /// A write.
    Mutation,
    /// A long-lived stream of results.
    Subscription,
}

impl OperationKind {
    /// Derive the kind from a document's first operation definition.
    ///
    /// Skips comments and fragment definitions; shorthand documents
    /// (starting with `{`) are queries, as is anything unrecognizable.
    #[must_use]
    pub fn of_document(document: &str) -> Self {
        let mut rest = document;
        loop {
            rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
            if let Some(after) = rest.strip_prefix('#') {
                rest = after.split_once('\n').map_or("", |(_, tail)| tail);
                continue;
            }
            if rest.starts_with('{') {
                return Self::Query;
            }
            let word_len = rest
                .find(|c: char| !c.is_alphanumeric() && c != '_')
                .unwrap_or(rest.len());
            let (word, after) = rest.split_at(word_len);
            match word {
                "query" => return Self::Query,
                "mutation" => return Self::Mutation,
                "subscription" => return Self::Subscription,
                "fragment" => {
                    rest = skip_braced_block(after);
                    continue;
                }
                _ => return Self::Query,
            }
        }
    }

    /// Whether this operation streams results.
    #[must_use]
    pub const fn is_subscription(self) -> bool {
        matches!(self, Self::Subscription)
    }
}

/// Skip past the first balanced `{ ... }` block in `input`.
fn skip_braced_block(input: &str) -> &str {
    let Some(open) = input.find('{') else {
        return "";
    };
    let mut depth = 0_usize;
    for (index, c) in input[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &input[open + index + 1..];
                }
            }
            _ => {}
        }
    }
    ""
}

/// Mutable context attached to an operation before dispatch.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    headers: HashMap<String, String>,
    extensions: HashMap<String, Value>,
}

impl OperationContext {
    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Fetch a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Iterate all headers.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Attach an arbitrary side-channel value.
    pub fn set_extension(&mut self, key: impl Into<String>, value: Value) {
        self.extensions.insert(key.into(), value);
    }

    /// Fetch a side-channel value.
    #[must_use]
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }
}

/// A single requested unit of work.
///
/// Created by the caller, augmented in place by the interceptor chain,
/// consumed by exactly one transport.
#[derive(Debug, Clone)]
pub struct Operation {
    id: Uuid,
    document: GraphqlDocument,
    kind: OperationKind,
    operation_name: Option<String>,
    variables: Value,
    context: OperationContext,
}

impl Operation {
    /// Create an operation; the kind is derived from the document.
    #[must_use]
    pub fn new(document: impl Into<String>) -> Self {
        let document = GraphqlDocument::new(document);
        let kind = OperationKind::of_document(document.as_str());
        Self {
            id: Uuid::new_v4(),
            document,
            kind,
            operation_name: None,
            variables: Value::Null,
            context: OperationContext::default(),
        }
    }

    /// Attach an operation name.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Attach variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    /// Correlation id for tracing.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The document.
    #[must_use]
    pub const fn document(&self) -> &GraphqlDocument {
        &self.document
    }

    /// The structural discriminant.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// The operation name, if any.
    #[must_use]
    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    /// The variables.
    #[must_use]
    pub const fn variables(&self) -> &Value {
        &self.variables
    }

    /// The context.
    #[must_use]
    pub const fn context(&self) -> &OperationContext {
        &self.context
    }

    /// Mutable access to the context.
    pub fn context_mut(&mut self) -> &mut OperationContext {
        &mut self.context
    }

    /// The request body shared by both transports.
    #[must_use]
    pub fn request_body(&self) -> Value {
        let mut body = serde_json::Map::new();
        body.insert(
            "query".to_string(),
            Value::String(self.document.as_str().to_string()),
        );
        body.insert("variables".to_string(), self.variables.clone());
        if let Some(name) = &self.operation_name {
            body.insert("operationName".to_string(), Value::String(name.clone()));
        }
        Value::Object(body)
    }
}

/// GraphQL response container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct GraphqlResponse<T> {
    /// Response data.
    #[serde(default)]
    pub data: Option<T>,
    /// GraphQL errors.
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
    /// Extensions payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl<T> GraphqlResponse<T> {
    /// Returns `true` if no GraphQL errors were returned.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_of_named_operations() {
        assert_eq!(
            OperationKind::of_document("query Viewer { viewer { id } }"),
            OperationKind::Query
        );
        assert_eq!(
            OperationKind::of_document("mutation Save($id: ID!) { save(id: $id) }"),
            OperationKind::Mutation
        );
        assert_eq!(
            OperationKind::of_document("subscription OnOrder { orderPlaced { _id } }"),
            OperationKind::Subscription
        );
    }

    #[test]
    fn shorthand_document_is_a_query() {
        assert_eq!(OperationKind::of_document("{ viewer { id } }"), OperationKind::Query);
    }

    #[test]
    fn comments_are_skipped() {
        let document = "# streams order updates\nsubscription { orderPlaced { _id } }";
        assert_eq!(OperationKind::of_document(document), OperationKind::Subscription);
    }

    #[test]
    fn leading_fragments_are_skipped() {
        let document = "fragment OrderFields on Order { _id status }\n\
                        subscription { orderPlaced { ...OrderFields } }";
        assert_eq!(OperationKind::of_document(document), OperationKind::Subscription);
    }

    #[test]
    fn unrecognized_input_defaults_to_query() {
        assert_eq!(OperationKind::of_document(""), OperationKind::Query);
        assert_eq!(OperationKind::of_document("???"), OperationKind::Query);
    }

    #[test]
    fn request_body_shape() {
        let operation = Operation::new("query Viewer { viewer { id } }")
            .with_operation_name("Viewer")
            .with_variables(serde_json::json!({ "limit": 10 }));
        let body = operation.request_body();
        assert_eq!(body["query"], "query Viewer { viewer { id } }");
        assert_eq!(body["operationName"], "Viewer");
        assert_eq!(body["variables"]["limit"], 10);
    }

    #[test]
    fn context_mutates_in_place() {
        let mut operation = Operation::new("{ viewer { id } }");
        operation.context_mut().set_header("authorization", "Bearer x");
        operation
            .context_mut()
            .set_extension("attempt", serde_json::json!(1));
        assert_eq!(operation.context().header("authorization"), Some("Bearer x"));
        assert_eq!(
            operation.context().extension("attempt"),
            Some(&serde_json::json!(1))
        );
    }
}
