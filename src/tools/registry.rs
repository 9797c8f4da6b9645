use anyhow::Result;
use async_trait::async_trait;
use genai::chat::Tool;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Schema of a single named parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
}

impl PropertySchema {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            kind: "string".to_string(),
            description: description.into(),
            items: None,
        }
    }

    pub fn string_array(description: impl Into<String>) -> Self {
        Self {
            kind: "array".to_string(),
            description: description.into(),
            items: Some(Box::new(Self {
                kind: "string".to_string(),
                description: String::new(),
                items: None,
            })),
        }
    }
}

/// Object schema describing a tool's arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: BTreeMap<String, PropertySchema>,
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn object() -> Self {
        Self {
            kind: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    pub fn property(mut self, name: &str, schema: PropertySchema) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    pub fn required_property(mut self, name: &str, schema: PropertySchema) -> Self {
        self.required.push(name.to_string());
        self.property(name, schema)
    }
}

/// Machine-readable description of a callable operation, as sent to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

impl ToolDescriptor {
    pub fn to_genai_tool(&self) -> Result<Tool> {
        Ok(Tool::new(self.name.clone())
            .with_description(self.description.clone())
            .with_schema(serde_json::to_value(&self.parameters)?))
    }
}

/// An operation the model can invoke
///
/// Handlers receive the agent's working root on every call and must validate
/// their own path arguments against it. `Err` is a recoverable failure that is
/// reported back to the model; it never aborts the conversation.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> ParameterSchema;

    async fn execute(&self, working_root: &Path, args: Value) -> Result<String>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a tool named '{0}' is already registered")]
    DuplicateTool(String),
}

/// Resolved registry slot: the handler plus the descriptor captured at registration
#[derive(Clone)]
pub struct RegistryEntry {
    pub handler: Arc<dyn AgentTool>,
    pub descriptor: ToolDescriptor,
}

/// Name-to-handler mapping
///
/// Populated once at startup, then shared read-only (usually behind an `Arc`).
/// There is no removal and no replacement: a second registration under an
/// existing name is rejected.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<RegistryEntry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) -> Result<(), RegistryError> {
        let descriptor = tool.descriptor();
        if self.index.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool(descriptor.name));
        }

        self.index.insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(RegistryEntry {
            handler: tool,
            descriptor,
        });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&RegistryEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors in registration order
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.entries.iter().map(|e| e.descriptor.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.descriptor.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
