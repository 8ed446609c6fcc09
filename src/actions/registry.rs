//! 动作注册表
//!
//! 所有动作实现 ActionProvider trait，由 ActionRegistry 按名注册（保持注册顺序，用于生成提示词目录）。
//! invoke 是全函数：未注册、参数缺失、处理器报错、超时都转为 ok=false 的 ActionResult，从不向上抛错。
//! 每次调用输出结构化审计日志（JSON）。
//! 可挂一个 ObservationFilter，在结果返回给调用方之前改写它（鲁棒性扰动用）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::actions::{ActionResult, ActionSpec, ResponseShape};
use crate::core::AgentError;

/// 动作提供方：执行并返回原始响应形态；adapt 把形态转为统一结果（可按动作定制描述）
#[async_trait]
pub trait ActionProvider: Send + Sync {
    async fn invoke(&self, args: &Map<String, Value>) -> Result<ResponseShape, String>;

    fn adapt(&self, _args: &Map<String, Value>, shape: ResponseShape) -> ActionResult {
        shape.into_result()
    }
}

/// 闭包形式的提供方（测试与简单动作）
pub struct FnProvider<F>(pub F);

#[async_trait]
impl<F> ActionProvider for FnProvider<F>
where
    F: Fn(&Map<String, Value>) -> Result<ResponseShape, String> + Send + Sync,
{
    async fn invoke(&self, args: &Map<String, Value>) -> Result<ResponseShape, String> {
        (self.0)(args)
    }
}

/// 结果改写钩子：拿到动作名与已适配的结果，返回交给调用方的结果
pub trait ObservationFilter: Send + Sync {
    fn filter(&self, action: &str, result: ActionResult) -> ActionResult;
}

#[derive(Clone)]
struct Entry {
    spec: ActionSpec,
    provider: Arc<dyn ActionProvider>,
}

/// 动作注册表：初始化后只读，可在并发运行之间共享
#[derive(Clone)]
pub struct ActionRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    timeout: Duration,
    filter: Option<Arc<dyn ObservationFilter>>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            timeout: Duration::from_secs(30),
            filter: None,
        }
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单个动作调用超时
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// 共享同一批提供方、但结果经过 filter 的副本
    pub fn with_observation_filter(&self, filter: Arc<dyn ObservationFilter>) -> Self {
        Self {
            filter: Some(filter),
            ..self.clone()
        }
    }

    /// 注册动作；同名再次注册会替换原条目（位置不变）
    pub fn register(&mut self, spec: ActionSpec, provider: impl ActionProvider + 'static) -> &mut Self {
        self.insert(spec, Arc::new(provider));
        self
    }

    pub fn register_fn<F>(&mut self, spec: ActionSpec, f: F) -> &mut Self
    where
        F: Fn(&Map<String, Value>) -> Result<ResponseShape, String> + Send + Sync + 'static,
    {
        self.register(spec, FnProvider(f))
    }

    /// 为已注册动作添加别名，共享同一个提供方；目标不存在时返回 ActionNotFound
    pub fn register_alias(
        &mut self,
        alias: &str,
        target: &str,
        description: &str,
    ) -> Result<&mut Self, AgentError> {
        let entry = self
            .entry(target)
            .ok_or_else(|| AgentError::ActionNotFound(target.to_string()))?;
        let spec = entry.spec.alias(alias, description);
        let provider = Arc::clone(&entry.provider);
        self.insert(spec, provider);
        Ok(self)
    }

    fn insert(&mut self, spec: ActionSpec, provider: Arc<dyn ActionProvider>) {
        let name = spec.name.clone();
        match self.index.get(&name) {
            Some(&i) => self.entries[i] = Entry { spec, provider },
            None => {
                self.index.insert(name, self.entries.len());
                self.entries.push(Entry { spec, provider });
            }
        }
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn spec(&self, name: &str) -> Option<&ActionSpec> {
        self.entry(name).map(|e| &e.spec)
    }

    /// 按注册顺序
    pub fn specs(&self) -> impl Iterator<Item = &ActionSpec> {
        self.entries.iter().map(|e| &e.spec)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.spec.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 把模型给出的原始输入规整为参数对象（裸字符串映射到首个必需参数）
    pub fn normalize_input(&self, name: &str, raw: Value) -> Map<String, Value> {
        match self.spec(name) {
            Some(spec) => spec.normalize_input(raw),
            None => match raw {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                other => {
                    let mut map = Map::new();
                    map.insert("input".into(), other);
                    map
                }
            },
        }
    }

    /// 调用动作：查找 -> 参数校验（缺失必需参数时不调用处理器）-> 限时执行 -> 适配
    pub async fn invoke(&self, name: &str, args: &Map<String, Value>) -> ActionResult {
        let start = Instant::now();
        let (result, outcome) = self.invoke_inner(name, args).await;
        let result = match &self.filter {
            Some(filter) => filter.filter(name, result),
            None => result,
        };
        let audit = serde_json::json!({
            "event": "action_audit",
            "action": name,
            "ok": result.ok,
            "outcome": outcome,
            "filtered": self.filter.is_some(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit, "action");
        result
    }

    async fn invoke_inner(&self, name: &str, args: &Map<String, Value>) -> (ActionResult, &'static str) {
        let Some(entry) = self.entry(name) else {
            return (
                ActionResult::fail(AgentError::ActionNotFound(name.to_string()).to_string()),
                "not_found",
            );
        };

        let args = match entry.spec.validate(args) {
            Ok(a) => a,
            Err(e) => return (ActionResult::fail(e.to_string()), "invalid_args"),
        };

        match timeout(self.timeout, entry.provider.invoke(&args)).await {
            Ok(Ok(shape)) => (entry.provider.adapt(&args, shape), "ok"),
            Ok(Err(e)) => (
                ActionResult::fail(AgentError::ProviderException(e).to_string()),
                "error",
            ),
            Err(_) => (
                ActionResult::fail(
                    AgentError::ProviderException(format!(
                        "{} timed out after {}s",
                        name,
                        self.timeout.as_secs()
                    ))
                    .to_string(),
                ),
                "timeout",
            ),
        }
    }

    /// 提示词中的可用动作目录：每行签名 + 描述 + 示例
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for spec in self.specs() {
            out.push_str(&format!("- {}: {}\n", spec.signature(), spec.description));
            if let Some(example) = &spec.example {
                out.push_str(&format!("  Example: {}\n", example));
            }
        }
        out
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
