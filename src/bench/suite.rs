//! 任务集：从 JSON 或 TOML 文件加载
//!
//! JSON 接受任务数组或 `{"tasks": [...]}`；TOML 使用 `[[tasks]]` 表数组。

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::TaskDescriptor;
use crate::core::AgentError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSuite {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskDescriptor>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonSuite {
    Tasks(Vec<TaskDescriptor>),
    Suite(TaskSuite),
}

impl TaskSuite {
    pub fn new(tasks: Vec<TaskDescriptor>) -> Self {
        Self { name: None, tasks }
    }

    pub fn from_json_str(s: &str) -> Result<Self, AgentError> {
        let parsed: JsonSuite = serde_json::from_str(s)
            .map_err(|e| AgentError::ConfigError(format!("invalid task suite JSON: {e}")))?;
        let suite = match parsed {
            JsonSuite::Tasks(tasks) => Self::new(tasks),
            JsonSuite::Suite(suite) => suite,
        };
        suite.validated()
    }

    pub fn from_toml_str(s: &str) -> Result<Self, AgentError> {
        let suite: TaskSuite = toml::from_str(s)
            .map_err(|e| AgentError::ConfigError(format!("invalid task suite TOML: {e}")))?;
        suite.validated()
    }

    /// 按扩展名选择格式：.toml 走 TOML，其它一律按 JSON 解析
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AgentError::ConfigError(format!("cannot read {}: {e}", path.display())))?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);
        let mut suite = if is_toml {
            Self::from_toml_str(&text)?
        } else {
            Self::from_json_str(&text)?
        };
        if suite.name.is_none() {
            suite.name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        }
        Ok(suite)
    }

    /// id 唯一、描述非空
    fn validated(self) -> Result<Self, AgentError> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.description.trim().is_empty() {
                return Err(AgentError::ConfigError(format!("task {} has an empty description", task.id)));
            }
            if !seen.insert(task.id.as_str()) {
                return Err(AgentError::ConfigError(format!("duplicate task id: {}", task.id)));
            }
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.tasks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_json_shapes() {
        let suite = TaskSuite::from_json_str(
            r#"[{"id": "t1", "description": "Go to the kitchen"},
               {"id": "t2", "description": "Find Tomas", "category": "search_interaction"}]"#,
        )
        .unwrap();
        assert_eq!(suite.len(), 2);
        assert_eq!(suite.tasks[1].category.as_deref(), Some("search_interaction"));

        let suite = TaskSuite::from_json_str(
            r#"{"name": "home", "tasks": [{"id": "a", "description": "Spin",
                "world": {"robot_location": "kitchen"}}]}"#,
        )
        .unwrap();
        assert_eq!(suite.name.as_deref(), Some("home"));
        assert_eq!(suite.tasks[0].world.as_ref().unwrap().robot_location, "kitchen");
    }

    #[test]
    fn test_validation() {
        assert!(TaskSuite::from_json_str(r#"[{"id": "a", "description": " "}]"#).is_err());
        assert!(TaskSuite::from_json_str(
            r#"[{"id": "a", "description": "x"}, {"id": "a", "description": "y"}]"#
        )
        .is_err());
        assert!(TaskSuite::from_json_str("not json").is_err());
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[[tasks]]\nid = \"nav-1\"\ndescription = \"Go to the gym\"\n\n[[tasks]]\nid = \"nav-2\"\ndescription = \"Go to the garage\"\ncategory = \"unknown_location\""
        )
        .unwrap();
        let suite = TaskSuite::load(file.path()).unwrap();
        assert_eq!(suite.len(), 2);
        assert!(suite.name.is_some());
        assert_eq!(suite.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), ["nav-1", "nav-2"]);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            TaskSuite::load("/definitely/not/here.json"),
            Err(AgentError::ConfigError(_))
        ));
    }
}
