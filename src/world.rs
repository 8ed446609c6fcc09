//! 世界状态与环境协作方
//!
//! 引擎本身从不直接调用 Environment；只有动作处理器读写世界，基准运行器在任务之间 reset / apply。
//! 共享世界上的并发运行不安全，需由调用方串行化（BenchRunner 逐个任务执行）。

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// 世界快照：机器人位置、人员与物体位置、可达地点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    pub robot_location: String,
    #[serde(default)]
    pub people_locations: BTreeMap<String, String>,
    #[serde(default)]
    pub objects_locations: BTreeMap<String, String>,
    #[serde(default)]
    pub available_locations: Vec<String>,
}

impl Default for WorldState {
    /// 住宅场景：机器人在门厅，几位常驻人员与物品
    fn default() -> Self {
        let locations = [
            "living room",
            "kitchen",
            "bedroom",
            "gym",
            "entrance hall",
        ];
        let people = [
            ("Alice", "kitchen"),
            ("Tomas", "living room"),
            ("Maria", "bedroom"),
            ("David", "gym"),
        ];
        let objects = [
            ("keys", "living room"),
            ("book", "bedroom"),
            ("first aid kit", "kitchen"),
            ("exercise ball", "gym"),
        ];
        Self {
            robot_location: "entrance hall".to_string(),
            people_locations: people
                .iter()
                .map(|(p, l)| (p.to_string(), l.to_string()))
                .collect(),
            objects_locations: objects
                .iter()
                .map(|(o, l)| (o.to_string(), l.to_string()))
                .collect(),
            available_locations: locations.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl WorldState {
    /// 大小写不敏感、下划线视同空格地匹配地点；返回规范名称
    pub fn resolve_location(&self, name: &str) -> Option<&str> {
        let wanted = normalize(name);
        self.available_locations
            .iter()
            .find(|l| normalize(l) == wanted)
            .map(|s| s.as_str())
    }

    /// 大小写不敏感地查找人员，返回 (规范名, 位置)
    pub fn person(&self, name: &str) -> Option<(&str, &str)> {
        let wanted = normalize(name);
        self.people_locations
            .iter()
            .find(|(p, _)| normalize(p) == wanted)
            .map(|(p, l)| (p.as_str(), l.as_str()))
    }

    pub fn object(&self, name: &str) -> Option<(&str, &str)> {
        let wanted = normalize(name);
        self.objects_locations
            .iter()
            .find(|(o, _)| normalize(o) == wanted)
            .map(|(o, l)| (o.as_str(), l.as_str()))
    }

    pub fn people_at(&self, location: &str) -> Vec<&str> {
        self.people_locations
            .iter()
            .filter(|(_, l)| l.as_str() == location)
            .map(|(p, _)| p.as_str())
            .collect()
    }

    pub fn objects_at(&self, location: &str) -> Vec<&str> {
        self.objects_locations
            .iter()
            .filter(|(_, l)| l.as_str() == location)
            .map(|(o, _)| o.as_str())
            .collect()
    }

    pub fn describe(&self) -> String {
        let mut lines = vec![
            format!("Robot location: {}", self.robot_location),
            format!(
                "Available locations ({}): {}",
                self.available_locations.len(),
                self.available_locations.join(", ")
            ),
            format!("People ({}):", self.people_locations.len()),
        ];
        for (person, loc) in &self.people_locations {
            lines.push(format!("  - {}: {}", person, loc));
        }
        lines.push(format!("Objects ({}):", self.objects_locations.len()));
        for (obj, loc) in &self.objects_locations {
            lines.push(format!("  - {}: {}", obj, loc));
        }
        lines.join("\n")
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace('_', " ")
}

/// 环境协作方：由基准运行器在任务间调用
pub trait Environment: Send + Sync {
    /// 恢复初始状态
    fn reset(&self);
    /// 覆盖为给定状态
    fn apply(&self, state: WorldState);
    fn describe(&self) -> String;
}

/// 内存模拟世界；动作处理器通过 Arc 共享
#[derive(Debug)]
pub struct SimulatedWorld {
    initial: WorldState,
    state: Mutex<WorldState>,
}

impl SimulatedWorld {
    pub fn new(initial: WorldState) -> Self {
        Self {
            state: Mutex::new(initial.clone()),
            initial,
        }
    }

    /// 当前状态的拷贝
    pub fn snapshot(&self) -> WorldState {
        self.lock().clone()
    }

    /// 在锁内读写状态
    pub fn with_state<R>(&self, f: impl FnOnce(&mut WorldState) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        // 处理器 panic 不应让整个世界不可用
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SimulatedWorld {
    fn default() -> Self {
        Self::new(WorldState::default())
    }
}

impl Environment for SimulatedWorld {
    fn reset(&self) {
        *self.lock() = self.initial.clone();
    }

    fn apply(&self, state: WorldState) {
        *self.lock() = state;
    }

    fn describe(&self) -> String {
        self.lock().describe()
    }
}
