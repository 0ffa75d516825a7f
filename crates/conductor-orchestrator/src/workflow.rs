//! Workflow definitions and parsing.
//!
//! A workflow document has a `workflow_name` and an ordered `steps` list.
//! Each step names an `agent` and carries a `task` mapping. Both are kept
//! optional here: a malformed step still parses and is skipped when the
//! workflow runs, so one bad step never hides the rest of the run.
//!
//! ```yaml
//! workflow_name: Quarterly report
//! steps:
//!   - name: Fetch
//!     agent: research
//!     task: { query: "Q3 revenue" }
//!   - name: Summarize
//!     agent: writer
//!     task: { style: brief }
//!     depends_on: [Fetch]
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use conductor_core::{AgentId, Task};

use crate::{error::WorkflowParseError, report::SkipReason};

fn default_workflow_name() -> String {
    "Untitled".to_string()
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ============================================================================
// DEFINITIONS
// ============================================================================

/// A named, ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name
    #[serde(rename = "workflow_name", default = "default_workflow_name")]
    pub name: String,
    /// Steps in execution order
    #[serde(default, deserialize_with = "null_as_empty")]
    pub steps: Vec<StepDefinition>,
}

impl Default for WorkflowDefinition {
    fn default() -> Self {
        Self {
            name: default_workflow_name(),
            steps: Vec::new(),
        }
    }
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Optional display name; see [`StepDefinition::label`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Destination agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
    /// Task payload, expected to be a mapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Value>,
    /// Labels of earlier steps that must finish first (concurrent mode)
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl WorkflowDefinition {
    /// Create an empty workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step.
    #[must_use]
    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Parse a YAML document. An empty document is an empty workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed, does not match the
    /// workflow schema, or declares an invalid dependency.
    pub fn from_yaml_str(text: &str) -> Result<Self, WorkflowParseError> {
        let value: serde_yaml::Value = if text.trim().is_empty() {
            serde_yaml::Value::Null
        } else {
            serde_yaml::from_str(text)?
        };

        let definition = if value.is_null() {
            Self::default()
        } else {
            serde_yaml::from_value(value)?
        };

        definition.validate()?;
        Ok(definition)
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, does not match the
    /// workflow schema, or declares an invalid dependency.
    pub fn from_json_str(text: &str) -> Result<Self, WorkflowParseError> {
        let definition: Self = serde_json::from_str(text)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Load a workflow file. `.json` files are read as JSON, everything
    /// else as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorkflowParseError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WorkflowParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        debug!(path = %path.display(), json = is_json, "Loading workflow");

        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// Serialize as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml_string(&self) -> Result<String, WorkflowParseError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self) -> Result<String, WorkflowParseError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every `depends_on` entry names an earlier step.
    ///
    /// Dependencies can only point backwards, so a valid workflow never
    /// contains a cycle.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowParseError::InvalidDependency`] on the first bad entry.
    pub fn validate(&self) -> Result<(), WorkflowParseError> {
        let mut earlier: HashSet<String> = HashSet::new();

        for (index, step) in self.steps.iter().enumerate() {
            let label = step.label(index);
            if let Some(dependency) = step.depends_on.iter().find(|d| !earlier.contains(*d)) {
                return Err(WorkflowParseError::InvalidDependency {
                    step: label,
                    dependency: dependency.clone(),
                });
            }
            earlier.insert(label);
        }

        Ok(())
    }

    /// Positional label of every step.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| step.label(index))
            .collect()
    }

    /// For every step, the indices of the earlier steps it waits for.
    ///
    /// A label shared by several earlier steps waits for all of them.
    /// Entries that match no earlier step are ignored.
    #[must_use]
    pub fn dependency_indices(&self) -> Vec<Vec<usize>> {
        let labels = self.labels();
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                (0..index)
                    .filter(|&earlier| step.depends_on.contains(&labels[earlier]))
                    .collect()
            })
            .collect()
    }
}

impl StepDefinition {
    /// Create a step dispatching `task` to `agent`.
    pub fn new(agent: impl Into<AgentId>, task: Task) -> Self {
        Self {
            agent: Some(agent.into()),
            task: Some(task.into_value()),
            ..Self::default()
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Wait for the step labelled `label`.
    #[must_use]
    pub fn after(mut self, label: impl Into<String>) -> Self {
        self.depends_on.push(label.into());
        self
    }

    /// Display label: the step name, or `Unnamed Step {n}` counting from 1.
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Unnamed Step {}", index + 1),
        }
    }

    /// Extract the destination and task, or the reason the step must be
    /// skipped. An empty agent id counts as missing.
    ///
    /// # Errors
    ///
    /// Returns the [`SkipReason`] for a malformed step.
    pub fn prepare(&self) -> Result<(AgentId, Task), SkipReason> {
        let agent = self
            .agent
            .as_ref()
            .filter(|agent| !agent.as_str().is_empty())
            .ok_or(SkipReason::MissingAgentOrTask)?;
        let task = self.task.as_ref().ok_or(SkipReason::MissingAgentOrTask)?;
        let task = Task::try_from(task.clone()).map_err(|_| SkipReason::TaskNotMapping)?;
        Ok((agent.clone(), task))
    }
}
