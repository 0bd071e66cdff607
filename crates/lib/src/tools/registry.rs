//! Tool registry: tools are data (name, description, input schema, handler) looked up by name.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::message::{ToolArgs, ToolCall};

/// Failure of a single tool call. Rendered into the transcript, never fatal to the engine.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
    /// A command ran but exited unsuccessfully; output is kept for the model to reason about.
    #[error("command failed ({status})\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    Command {
        status: String,
        stdout: String,
        stderr: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    Duplicate(String),
}

/// JSON type expected for one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// Any JSON value (no type check).
    Any,
}

impl FieldKind {
    fn accepts(self, v: &Value) -> bool {
        match self {
            FieldKind::String => v.is_string(),
            FieldKind::Integer => v.is_i64() || v.is_u64(),
            FieldKind::Number => v.is_number(),
            FieldKind::Boolean => v.is_boolean(),
            FieldKind::Array => v.is_array(),
            FieldKind::Object => v.is_object(),
            FieldKind::Any => true,
        }
    }

    fn json_type(self) -> Option<&'static str> {
        match self {
            FieldKind::String => Some("string"),
            FieldKind::Integer => Some("integer"),
            FieldKind::Number => Some("number"),
            FieldKind::Boolean => Some("boolean"),
            FieldKind::Array => Some("array"),
            FieldKind::Object => Some("object"),
            FieldKind::Any => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,
}

/// Declared input of a tool: ordered fields with type and required flag.
#[derive(Debug, Clone, Default)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required: true,
            description: description.to_string(),
        });
        self
    }

    pub fn optional(mut self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required: false,
            description: description.to_string(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Check required fields are present and every declared field has the right type.
    /// Null counts as absent. Undeclared fields are passed through.
    pub fn validate(&self, args: &ToolArgs) -> Result<(), ToolError> {
        for f in &self.fields {
            match args.get(&f.name) {
                None | Some(Value::Null) => {
                    if f.required {
                        return Err(ToolError::InvalidArguments(format!(
                            "missing required parameter '{}'",
                            f.name
                        )));
                    }
                }
                Some(v) => {
                    if !f.kind.accepts(v) {
                        return Err(ToolError::InvalidArguments(format!(
                            "parameter '{}' must be of type {}",
                            f.name,
                            f.kind.json_type().unwrap_or("any")
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Equivalent JSON Schema object for model tool definitions.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for f in &self.fields {
            let mut prop = Map::new();
            if let Some(t) = f.kind.json_type() {
                prop.insert("type".to_string(), json!(t));
            }
            if !f.description.is_empty() {
                prop.insert("description".to_string(), json!(f.description));
            }
            properties.insert(f.name.clone(), Value::Object(prop));
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Executes one tool call with already-validated arguments.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArgs) -> Result<String, ToolError>;
}

type BoxFuture = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>>;

struct FnHandler(Box<dyn Fn(ToolArgs) -> BoxFuture + Send + Sync>);

#[async_trait]
impl ToolHandler for FnHandler {
    async fn call(&self, args: ToolArgs) -> Result<String, ToolError> {
        (self.0)(args).await
    }
}

/// A registered tool.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub schema: InputSchema,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: InputSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler,
        }
    }

    /// Tool backed by an async closure.
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: InputSchema,
        f: F,
    ) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let handler = FnHandler(Box::new(move |args| Box::pin(f(args))));
        Self::new(name, description, schema, Arc::new(handler))
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.schema.to_json_schema(),
        }
    }
}

/// What the model is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tools keyed by name. Read-only once built; safe to share across sessions.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Tool) -> Result<(), RegistryError> {
        if self.tools.contains_key(&tool.name) {
            return Err(RegistryError::Duplicate(tool.name));
        }
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tool specs for the model, sorted by name.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(Tool::spec).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Look up, validate, and run one call.
    pub async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(&call.tool_name)
            .ok_or_else(|| ToolError::UnknownTool(call.tool_name.clone()))?;
        tool.schema.validate(&call.arguments)?;
        tool.handler.call(call.arguments.clone()).await
    }
}

pub(crate) fn str_arg<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required parameter '{}'", key)))
}

pub(crate) fn opt_str<'a>(args: &'a ToolArgs, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub(crate) fn opt_u64(args: &ToolArgs, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

pub(crate) fn opt_bool(args: &ToolArgs, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}
