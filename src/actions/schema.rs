//! 动作调用 JSON Schema 生成（schemars）
//!
//! 拼入推理提示词，减少模型输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 动作调用格式：与解析器接受的 `{"action": "...", "args": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ActionCallFormat {
    /// 动作名，如 go_to_place、talk、find_person
    pub action: String,
    /// 动作参数，依动作不同而不同（location、text、name 等）
    pub args: HashMap<String, Value>,
}

/// 返回动作调用的 JSON Schema 字符串
pub fn action_call_schema_json() -> String {
    let schema = schema_for!(ActionCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
