//! 动作规格：名称、参数 schema（类型 + 是否必需）、描述、示例
//!
//! 启动时构造一次，此后只读；由 ActionRegistry 独占持有。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    Str,
    Int,
    Float,
    Bool,
}

impl ArgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgType::Str => "str",
            ArgType::Int => "int",
            ArgType::Float => "float",
            ArgType::Bool => "bool",
        }
    }

    /// 可选参数缺省时的填充值：空串 / 0 / 0.0 / false
    pub fn default_value(&self) -> Value {
        match self {
            ArgType::Str => Value::String(String::new()),
            ArgType::Int => Value::from(0),
            ArgType::Float => Value::from(0.0),
            ArgType::Bool => Value::Bool(false),
        }
    }

    /// 按类型规整传入值；LLM 常把数字写成字符串，这里做宽松转换。无法转换返回 None
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ArgType::Str, Value::String(_)) => Some(value.clone()),
            (ArgType::Str, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ArgType::Str, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (ArgType::Int, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Value::from),
            (ArgType::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (ArgType::Float, Value::Number(n)) => n.as_f64().map(Value::from),
            (ArgType::Float, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::from),
            (ArgType::Bool, Value::Bool(_)) => Some(value.clone()),
            (ArgType::Bool, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// 单个参数的声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgField {
    pub name: String,
    #[serde(rename = "type")]
    pub arg_type: ArgType,
    pub required: bool,
}

/// 动作规格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    /// 按声明顺序保存（首个必需参数用于字符串输入映射）
    pub args: Vec<ArgField>,
    pub description: String,
    pub example: Option<Value>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            description: description.into(),
            example: None,
        }
    }

    pub fn required(mut self, name: impl Into<String>, arg_type: ArgType) -> Self {
        self.args.push(ArgField {
            name: name.into(),
            arg_type,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: impl Into<String>, arg_type: ArgType) -> Self {
        self.args.push(ArgField {
            name: name.into(),
            arg_type,
            required: false,
        });
        self
    }

    pub fn example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }

    /// 复制规格并换名（别名动作使用）
    pub fn alias(&self, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..self.clone()
        }
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &ArgField> {
        self.args.iter().filter(|a| a.required)
    }

    /// 校验并补全参数：必需参数缺失立即失败；可选参数缺失按类型填默认值；未声明的参数原样保留
    pub fn validate(&self, args: &Map<String, Value>) -> Result<Map<String, Value>, AgentError> {
        let mut out = args.clone();
        for field in &self.args {
            match args.get(&field.name).filter(|v| !v.is_null()) {
                Some(v) => {
                    let coerced = field.arg_type.coerce(v).ok_or_else(|| AgentError::InvalidArgument {
                        field: field.name.clone(),
                        expected: field.arg_type.as_str().to_string(),
                    })?;
                    out.insert(field.name.clone(), coerced);
                }
                None if field.required => {
                    return Err(AgentError::MissingArgument(field.name.clone()));
                }
                None => {
                    out.insert(field.name.clone(), field.arg_type.default_value());
                }
            }
        }
        Ok(out)
    }

    /// 把非对象输入（裸字符串 / 数字）映射到第一个参数（优先必需参数）
    pub fn normalize_input(&self, raw: Value) -> Map<String, Value> {
        match raw {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let target = self.required_fields().next().or_else(|| self.args.first());
                let mut map = Map::new();
                if let Some(field) = target {
                    map.insert(field.name.clone(), other);
                }
                map
            }
        }
    }

    /// 提示词中的单行签名：`name(arg:type, ...) [required: ...]`
    pub fn signature(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|a| format!("{}:{}", a.name, a.arg_type.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        let required: Vec<&str> = self.required_fields().map(|a| a.name.as_str()).collect();
        if required.is_empty() {
            format!("{}({})", self.name, args)
        } else {
            format!("{}({}) [required: {}]", self.name, args, required.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn go_to() -> ActionSpec {
        ActionSpec::new("go_to_place", "Navigate")
            .required("location", ArgType::Str)
            .optional("graph", ArgType::Int)
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_missing_required() {
        let err = go_to().validate(&Map::new()).unwrap_err();
        assert_eq!(err, AgentError::MissingArgument("location".into()));
    }

    #[test]
    fn test_optional_defaults_filled() {
        let out = go_to().validate(&obj(json!({"location": "kitchen"}))).unwrap();
        assert_eq!(out["graph"], json!(0));
        assert_eq!(out["location"], json!("kitchen"));
    }

    #[test]
    fn test_defaults_per_type() {
        let spec = ActionSpec::new("x", "")
            .optional("s", ArgType::Str)
            .optional("f", ArgType::Float)
            .optional("b", ArgType::Bool);
        let out = spec.validate(&Map::new()).unwrap();
        assert_eq!(out["s"], json!(""));
        assert_eq!(out["f"], json!(0.0));
        assert_eq!(out["b"], json!(false));
    }

    #[test]
    fn test_coercion_and_invalid() {
        let spec = ActionSpec::new("spin", "").required("degrees", ArgType::Float);
        let out = spec.validate(&obj(json!({"degrees": "90"}))).unwrap();
        assert_eq!(out["degrees"], json!(90.0));

        let err = spec.validate(&obj(json!({"degrees": "a lot"}))).unwrap_err();
        assert!(err.is_argument_error());
        assert!(err.to_string().contains("degrees"));
    }

    #[test]
    fn test_normalize_bare_string() {
        let args = go_to().normalize_input(json!("kitchen"));
        assert_eq!(args["location"], json!("kitchen"));
    }

    #[test]
    fn test_signature() {
        assert_eq!(
            go_to().signature(),
            "go_to_place(location:str, graph:int) [required: location]"
        );
    }
}
