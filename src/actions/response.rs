//! 动作结果与提供方响应形态
//!
//! 提供方可能返回布尔、审批字符串、带 approved 字段的记录、单值载荷或已成形的结果。
//! 每种形态只有一个成功判定与一个字符串化规则；"Success:" / "Failure:" 前缀只在适配边界生成一次，
//! 下游只看 `ok` 字段，从不重新解析 observation。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 审批类提供方的成功令牌
pub const APPROVAL_TOKEN: &str = "approved";

/// 统一的动作结果；每次调用新建，返回后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub ok: bool,
    pub observation: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ActionResult {
    pub fn ok(observation: impl Into<String>) -> Self {
        Self {
            ok: true,
            observation: observation.into(),
            data: Map::new(),
        }
    }

    pub fn fail(observation: impl Into<String>) -> Self {
        Self {
            ok: false,
            observation: observation.into(),
            data: Map::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// 提供方原始响应的封闭形态集合
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    /// 布尔：true 即成功
    Flag(bool),
    /// 字符串：等于审批令牌即成功
    Token(String),
    /// 记录：`approved` 为 true 或 "approved" 即成功；`message` 字段（若有）作为描述
    Record(Map<String, Value>),
    /// 单值载荷（深度、识别文本等）：有非空值即成功
    Payload { field: String, value: Option<Value> },
    /// 已成形的结果，原样透传
    Shaped(ActionResult),
}

impl ResponseShape {
    pub fn record(value: Value) -> Self {
        match value {
            Value::Object(map) => ResponseShape::Record(map),
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                ResponseShape::Record(map)
            }
        }
    }

    pub fn payload(field: impl Into<String>, value: Option<Value>) -> Self {
        ResponseShape::Payload {
            field: field.into(),
            value,
        }
    }

    /// 成功判定
    pub fn is_ok(&self) -> bool {
        match self {
            ResponseShape::Flag(b) => *b,
            ResponseShape::Token(t) => t.trim() == APPROVAL_TOKEN,
            ResponseShape::Record(map) => match map.get("approved") {
                Some(Value::Bool(b)) => *b,
                Some(Value::String(s)) => s == APPROVAL_TOKEN,
                _ => false,
            },
            ResponseShape::Payload { value, .. } => match value {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.trim().is_empty(),
                Some(_) => true,
            },
            ResponseShape::Shaped(r) => r.ok,
        }
    }

    /// 字符串化（不带成功/失败前缀）
    pub fn stringify(&self) -> String {
        match self {
            ResponseShape::Flag(b) => b.to_string(),
            ResponseShape::Token(t) => t.clone(),
            ResponseShape::Record(map) => match map.get("message").and_then(Value::as_str) {
                Some(msg) => msg.to_string(),
                None => Value::Object(map.clone()).to_string(),
            },
            ResponseShape::Payload { field, value } => match value {
                Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
                Some(Value::String(_)) | Some(Value::Null) | None => format!("no {field}"),
                Some(v) => v.to_string(),
            },
            ResponseShape::Shaped(r) => r.observation.clone(),
        }
    }

    /// 默认适配：按判定加前缀，记录/载荷写入 data
    pub fn into_result(self) -> ActionResult {
        if let ResponseShape::Shaped(r) = self {
            return r;
        }
        let ok = self.is_ok();
        let text = self.stringify();
        let observation = if ok {
            format!("Success: {text}")
        } else {
            format!("Failure: {text}")
        };
        let data = match self {
            ResponseShape::Record(map) => map,
            ResponseShape::Payload {
                field,
                value: Some(v),
            } => {
                let mut map = Map::new();
                map.insert(field, v);
                map
            }
            _ => Map::new(),
        };
        ActionResult {
            ok,
            observation,
            data,
        }
    }
}
