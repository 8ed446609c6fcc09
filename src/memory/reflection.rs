//! 反思记忆：每次失败尝试对应一条自然语言反思
//!
//! 作用域为单个任务运行：随 RunContext 创建，任务开始时清空，不跨任务、不跨并发运行共享。

use serde::{Deserialize, Serialize};

/// 有序的反思列表（第 i 条对应第 i 次失败尝试）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionMemory {
    entries: Vec<String>,
}

impl ReflectionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reflection: impl Into<String>) {
        self.entries.push(reflection.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 拼入推理模型上下文的反思段落；无反思时返回空串
    pub fn to_context(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let mut out = String::from("--- REFLECTIONS FROM PREVIOUS ATTEMPTS ---\n");
        out.push_str("Learn from these past mistakes to improve your strategy:\n\n");
        for (i, reflection) in self.entries.iter().enumerate() {
            out.push_str(&format!("Attempt {}: {}\n\n", i + 1, reflection));
        }
        out.push_str("--- END REFLECTIONS ---\n");
        out
    }
}
