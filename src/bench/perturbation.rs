//! 鲁棒性扰动
//!
//! 在基准运行时对三处施加受控噪声：
//! - 任务输入：按词错误率模拟语音识别错误，另可叠加四种纯文本扰动（干扰信息、噪声、含糊、缺词）
//! - 模型调用：每次调用前额外等待，带 ±20% 抖动
//! - 动作观察：按概率附加无关的传感器描述；按概率篡改人员位置线索或翻转导航结果
//!
//! 每个任务使用独立的 Perturber（计数器与随机源都不跨任务），设了种子时按任务 id 派生，结果可复现。

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::{ActionResult, ObservationFilter};
use crate::agent::BenchAgent;
use crate::config::PerturbationSection;
use crate::core::AgentError;
use crate::llm::{LlmClient, LlmResponse};
use crate::memory::Message;

/// 常见的误识别：小写原词 -> 候选（可能选回原词）
const ASR_SUBSTITUTIONS: &[(&str, &[&str])] = &[
    ("tomas", &["thomas", "tomás", "tomas"]),
    ("david", &["dávid", "dabid", "david"]),
    ("alice", &["alicia", "alise", "alice"]),
    ("maria", &["maría", "mari", "maria"]),
    ("kitchen", &["kitchin", "chicken", "kitchen"]),
    ("living", &["leaving", "living", "living"]),
    ("door", &["floor", "dour", "door"]),
    ("hello", &["yellow", "hallo", "hello"]),
    ("cocina", &["cosina", "cozina", "cocina"]),
    ("sala", &["salla", "sala", "sala"]),
    ("puerta", &["puerto", "puerta", "puerta"]),
    ("hola", &["ola", "jola", "hola"]),
];

const VOWELS: &[char] = &['a', 'e', 'i', 'o', 'u'];

const SENSOR_DISTRACTORS: &[&str] = &[
    "Ambient noise detected.",
    "Movement in the field of view.",
    "Proximity sensor triggered briefly.",
    "Unidentified sound captured.",
    "Lighting change detected.",
    "Unrecognized object in the background.",
    "Temporary camera interference.",
];

const TASK_DISTRACTORS: &[&str] = &[
    " (Note: The weather is sunny today.)",
    " (By the way, it's Tuesday.)",
    " (Remember that your battery is at 85%.)",
    " (The temperature is 22°C.)",
];

const AMBIGUITY_PHRASES: &[&str] = &[
    " Maybe check the nearby area first.",
    " It might be there or somewhere close.",
    " You could try looking around.",
    " Perhaps start somewhere.",
];

const WRONG_LOCATIONS: &[&str] = &["kitchen", "living room", "entrance hall", "hallway"];

/// 被视为导航的动作（环境失配时翻转结果）
const NAVIGATION_ACTIONS: &[&str] = &["go_to_place", "move_to"];
/// 会带回人员位置线索的动作（环境失配时篡改位置）
const PERSON_SEARCH_ACTIONS: &[&str] = &["find_person", "ask_person_location"];

const LOCATION_CLUE: &str = " is in the ";

/// 数值化的扰动强度
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerturbationConfig {
    pub enabled: bool,
    pub asr_wer: f64,
    pub latency_ms: u64,
    pub distractor_prob: f64,
    pub mismatch_prob: f64,
}

impl PerturbationConfig {
    /// 概率类字段截断到 [0, 1]
    pub fn clamped(mut self) -> Self {
        self.asr_wer = self.asr_wer.clamp(0.0, 1.0);
        self.distractor_prob = self.distractor_prob.clamp(0.0, 1.0);
        self.mismatch_prob = self.mismatch_prob.clamp(0.0, 1.0);
        self
    }
}

/// 预设等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerturbationLevel {
    Baseline,
    Mild,
    Moderate,
    Severe,
}

impl PerturbationLevel {
    pub fn config(&self) -> PerturbationConfig {
        let (asr_wer, latency_ms, distractor_prob, mismatch_prob) = match self {
            PerturbationLevel::Baseline => return PerturbationConfig::default(),
            PerturbationLevel::Mild => (0.1, 100, 0.1, 0.05),
            PerturbationLevel::Moderate => (0.2, 300, 0.2, 0.1),
            PerturbationLevel::Severe => (0.3, 500, 0.3, 0.2),
        };
        PerturbationConfig {
            enabled: true,
            asr_wer,
            latency_ms,
            distractor_prob,
            mismatch_prob,
        }
    }
}

impl FromStr for PerturbationLevel {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "baseline" | "none" => Ok(PerturbationLevel::Baseline),
            "mild" => Ok(PerturbationLevel::Mild),
            "moderate" => Ok(PerturbationLevel::Moderate),
            "severe" => Ok(PerturbationLevel::Severe),
            other => Err(AgentError::ConfigError(format!("unknown perturbation level: {other}"))),
        }
    }
}

/// 只改写任务描述的文本扰动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerturbationKind {
    Distractors,
    Noise,
    Ambiguity,
    Incomplete,
}

impl PerturbationKind {
    pub const ALL: [PerturbationKind; 4] = [
        PerturbationKind::Distractors,
        PerturbationKind::Noise,
        PerturbationKind::Ambiguity,
        PerturbationKind::Incomplete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PerturbationKind::Distractors => "distractors",
            PerturbationKind::Noise => "noise",
            PerturbationKind::Ambiguity => "ambiguity",
            PerturbationKind::Incomplete => "incomplete",
        }
    }
}

impl FromStr for PerturbationKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AgentError::ConfigError(format!("unknown perturbation type: {s}")))
    }
}

/// 整个基准共用的扰动设置；每个任务由它派生一个 Perturber
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerturbationPlan {
    pub config: PerturbationConfig,
    pub kinds: Vec<PerturbationKind>,
    pub seed: Option<u64>,
}

impl PerturbationPlan {
    pub fn new(config: PerturbationConfig) -> Self {
        Self {
            config: config.clamped(),
            kinds: Vec::new(),
            seed: None,
        }
    }

    pub fn with_kinds(mut self, kinds: Vec<PerturbationKind>) -> Self {
        self.kinds = kinds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 等级名或类型名无法识别时返回 ConfigError
    pub fn from_section(section: &PerturbationSection) -> Result<Self, AgentError> {
        let config = match &section.level {
            Some(level) => level.parse::<PerturbationLevel>()?.config(),
            None => PerturbationConfig {
                enabled: section.enabled,
                asr_wer: section.asr_wer,
                latency_ms: section.latency_ms,
                distractor_prob: section.distractor_prob,
                mismatch_prob: section.mismatch_prob,
            },
        };
        let kinds = section
            .task_perturbations
            .iter()
            .map(|k| k.parse())
            .collect::<Result<Vec<PerturbationKind>, _>>()?;
        Ok(Self {
            config: config.clamped(),
            kinds,
            seed: section.seed,
        })
    }

    /// 既未启用数值扰动、也没有文本扰动时，运行器完全跳过扰动
    pub fn is_active(&self) -> bool {
        self.config.enabled || !self.kinds.is_empty()
    }

    pub fn perturber_for(&self, task_id: &str) -> Perturber {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(
                task_id
                    .bytes()
                    .fold(seed, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b))),
            ),
            None => StdRng::from_entropy(),
        };
        Perturber {
            config: self.config.clone().clamped(),
            kinds: self.kinds.clone(),
            rng: Mutex::new(rng),
            applied: AtomicUsize::new(0),
        }
    }
}

/// 单个任务的扰动记录，写入 TaskResult
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerturbationRecord {
    pub perturbed_description: String,
    pub perturbations_applied: usize,
    pub config: PerturbationConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<PerturbationKind>,
}

/// 单个任务的扰动器：可在模型装饰器与注册表过滤器之间共享
pub struct Perturber {
    config: PerturbationConfig,
    kinds: Vec<PerturbationKind>,
    rng: Mutex<StdRng>,
    applied: AtomicUsize,
}

impl Perturber {
    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut rng)
    }

    fn bump(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    /// 实际改动过的输入与观察总数
    pub fn applied(&self) -> usize {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn record(&self, perturbed_description: impl Into<String>) -> PerturbationRecord {
        PerturbationRecord {
            perturbed_description: perturbed_description.into(),
            perturbations_applied: self.applied(),
            config: self.config.clone(),
            kinds: self.kinds.clone(),
        }
    }

    /// 任务描述：先按配置的词错误率加噪，再依次套用文本扰动
    pub fn perturb_task(&self, description: &str) -> String {
        let mut text = description.to_string();
        if self.config.enabled {
            text = self.with_rng(|rng| asr_noise(rng, &text, self.config.asr_wer));
        }
        for kind in &self.kinds {
            text = self.with_rng(|rng| apply_kind(rng, *kind, &text));
        }
        if text != description {
            self.bump();
        }
        text
    }

    /// 本次模型调用前应额外等待的时长
    pub fn latency(&self) -> Option<Duration> {
        if !self.config.enabled || self.config.latency_ms == 0 {
            return None;
        }
        let base = self.config.latency_ms as f64;
        let jitter = base * 0.2;
        let ms = self.with_rng(|rng| base + rng.gen_range(-jitter..=jitter));
        Some(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }

    /// 动作观察：干扰描述 + 环境失配；改动过的结果在 data 中标记 perturbed
    pub fn perturb_observation(&self, action: &str, result: ActionResult) -> ActionResult {
        if !self.config.enabled {
            return result;
        }
        let before = result.clone();
        let mut result = result;

        let distractor = self.with_rng(|rng| {
            if !rng.gen_bool(self.config.distractor_prob) {
                return None;
            }
            let note = SENSOR_DISTRACTORS.choose(rng).copied()?;
            Some((note, rng.gen_bool(0.5)))
        });
        if let Some((note, before_obs)) = distractor {
            result.observation = if before_obs {
                format!("{note} {}", result.observation)
            } else {
                format!("{} {note}", result.observation)
            };
        }

        if self.with_rng(|rng| rng.gen_bool(self.config.mismatch_prob)) {
            if PERSON_SEARCH_ACTIONS.contains(&action) {
                let wrong = self.with_rng(|rng| WRONG_LOCATIONS.choose(rng).copied());
                if let Some(text) = wrong.and_then(|w| misplace(&result.observation, w)) {
                    result.observation = text;
                }
            } else if NAVIGATION_ACTIONS.contains(&action) {
                result = flip_outcome(result);
            }
        }

        if result != before {
            self.bump();
            result.data.insert("perturbed".into(), Value::Bool(true));
            tracing::debug!(action, observation = %result.observation, "observation perturbed");
        }
        result
    }
}

impl ObservationFilter for Perturber {
    fn filter(&self, action: &str, result: ActionResult) -> ActionResult {
        self.perturb_observation(action, result)
    }
}

/// 模型装饰器：调用前注入延迟，其余透传
pub struct PerturbedLlm {
    inner: Arc<dyn LlmClient>,
    perturber: Arc<Perturber>,
}

impl PerturbedLlm {
    pub fn new(inner: Arc<dyn LlmClient>, perturber: Arc<Perturber>) -> Self {
        Self { inner, perturber }
    }
}

#[async_trait]
impl LlmClient for PerturbedLlm {
    async fn complete(&self, messages: &[Message]) -> Result<LlmResponse, String> {
        if let Some(delay) = self.perturber.latency() {
            tokio::time::sleep(delay).await;
        }
        self.inner.complete(messages).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// 让 agent 的模型调用与动作观察都经过同一个扰动器
pub fn perturb_agent(agent: &BenchAgent, perturber: Arc<Perturber>) -> BenchAgent {
    let llm: Arc<dyn LlmClient> = Arc::new(PerturbedLlm::new(agent.llm(), perturber.clone()));
    let registry = Arc::new(agent.registry().with_observation_filter(perturber));
    agent.clone().with_llm(llm).with_registry(registry)
}

fn asr_noise(rng: &mut StdRng, text: &str, wer: f64) -> String {
    if wer <= 0.0 {
        return text.to_string();
    }
    text.split_whitespace()
        .map(|word| {
            if rng.gen_bool(wer.min(1.0)) {
                corrupt_word(rng, word)
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn corrupt_word(rng: &mut StdRng, word: &str) -> String {
    let lower = word.to_lowercase();
    if let Some((_, options)) = ASR_SUBSTITUTIONS.iter().find(|(w, _)| *w == lower) {
        return options.choose(rng).map(|s| s.to_string()).unwrap_or_else(|| word.to_string());
    }
    let mut chars: Vec<char> = word.chars().collect();
    let len = chars.len();
    let vowel = VOWELS.choose(rng).copied().unwrap_or('a');
    match rng.gen_range(0..3) {
        0 if len > 2 => {
            let i = rng.gen_range(1..len - 1);
            chars[i] = vowel;
        }
        1 if len > 3 => {
            let i = rng.gen_range(1..len - 1);
            chars.remove(i);
        }
        2 => {
            let i = rng.gen_range(0..=len);
            chars.insert(i, vowel);
        }
        _ => {}
    }
    chars.into_iter().collect()
}

fn apply_kind(rng: &mut StdRng, kind: PerturbationKind, text: &str) -> String {
    match kind {
        PerturbationKind::Distractors => {
            format!("{text}{}", TASK_DISTRACTORS.choose(rng).copied().unwrap_or_default())
        }
        PerturbationKind::Noise => asr_noise(rng, text, 0.15),
        PerturbationKind::Ambiguity => {
            format!("{text}{}", AMBIGUITY_PHRASES.choose(rng).copied().unwrap_or_default())
        }
        PerturbationKind::Incomplete => {
            let words: Vec<&str> = text.split_whitespace().collect();
            if words.len() <= 5 {
                return text.to_string();
            }
            // 只删中间的词，首尾保留
            let count = rng.gen_range(1..=2.min(words.len() / 3));
            let dropped: Vec<usize> = rand::seq::index::sample(rng, words.len() - 2, count)
                .into_iter()
                .map(|i| i + 1)
                .collect();
            let kept: Vec<&str> = words
                .iter()
                .enumerate()
                .filter(|(i, _)| !dropped.contains(i))
                .map(|(_, w)| *w)
                .collect();
            format!("{} [...]", kept.join(" "))
        }
    }
}

/// 把 "X is in the <loc>." 中的地点换成 wrong；没有位置线索时返回 None
fn misplace(observation: &str, wrong: &str) -> Option<String> {
    let start = observation.find(LOCATION_CLUE)? + LOCATION_CLUE.len();
    let end = observation[start..]
        .find('.')
        .map(|i| start + i)
        .unwrap_or(observation.len());
    if observation[start..end].trim() == wrong {
        return None;
    }
    Some(format!("{}{}{}", &observation[..start], wrong, &observation[end..]))
}

/// 导航结果取反，观察前缀随之改写
fn flip_outcome(mut result: ActionResult) -> ActionResult {
    let body = result
        .observation
        .strip_prefix("Success:")
        .or_else(|| result.observation.strip_prefix("Failure:"))
        .unwrap_or(&result.observation)
        .trim()
        .to_string();
    result.ok = !result.ok;
    result.observation = if result.ok {
        format!("Success: {body}")
    } else {
        format!("Failure: {body}")
    };
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn always(config: PerturbationConfig) -> Perturber {
        PerturbationPlan::new(config).with_seed(42).perturber_for("t1")
    }

    #[test]
    fn test_levels_and_parsing() {
        assert_eq!(PerturbationLevel::Baseline.config(), PerturbationConfig::default());
        let severe = "Severe".parse::<PerturbationLevel>().unwrap().config();
        assert!(severe.enabled);
        assert_eq!(severe.latency_ms, 500);
        assert!("extreme".parse::<PerturbationLevel>().is_err());
        assert_eq!("noise".parse::<PerturbationKind>().unwrap(), PerturbationKind::Noise);
        assert!("typos".parse::<PerturbationKind>().is_err());
    }

    #[test]
    fn test_plan_from_section() {
        let section = PerturbationSection {
            level: Some("moderate".into()),
            task_perturbations: vec!["ambiguity".into()],
            seed: Some(3),
            ..PerturbationSection::default()
        };
        let plan = PerturbationPlan::from_section(&section).unwrap();
        assert!(plan.is_active());
        assert_eq!(plan.config.asr_wer, 0.2);
        assert_eq!(plan.kinds, vec![PerturbationKind::Ambiguity]);

        assert!(!PerturbationPlan::from_section(&PerturbationSection::default())
            .unwrap()
            .is_active());
        let bad = PerturbationSection {
            task_perturbations: vec!["typos".into()],
            ..PerturbationSection::default()
        };
        assert!(PerturbationPlan::from_section(&bad).is_err());
    }

    #[test]
    fn test_disabled_is_identity() {
        let p = PerturbationPlan::default().perturber_for("t");
        assert_eq!(p.perturb_task("Go to the kitchen"), "Go to the kitchen");
        let r = p.perturb_observation("go_to_place", ActionResult::ok("Success: true"));
        assert_eq!(r, ActionResult::ok("Success: true"));
        assert!(p.latency().is_none());
        assert_eq!(p.applied(), 0);
    }

    #[test]
    fn test_asr_noise_is_reproducible_with_seed() {
        let config = PerturbationConfig {
            enabled: true,
            asr_wer: 1.0,
            ..PerturbationConfig::default()
        };
        let a = always(config.clone()).perturb_task("please bring the book");
        let b = always(config).perturb_task("please bring the book");
        assert_eq!(a, b);
        assert_eq!(a.split_whitespace().count(), 4);
    }

    #[test]
    fn test_text_kinds() {
        let plan = PerturbationPlan::default()
            .with_kinds(vec![PerturbationKind::Distractors, PerturbationKind::Ambiguity])
            .with_seed(1);
        let p = plan.perturber_for("t");
        let out = p.perturb_task("Find Tomas");
        assert!(out.starts_with("Find Tomas ("));
        assert!(AMBIGUITY_PHRASES.iter().any(|s| out.ends_with(s)));
        assert_eq!(p.applied(), 1);

        let p = PerturbationPlan::default()
            .with_kinds(vec![PerturbationKind::Incomplete])
            .with_seed(1)
            .perturber_for("t");
        let out = p.perturb_task("go to the kitchen and tell Tomas hello");
        assert!(out.starts_with("go "));
        assert!(out.ends_with("hello [...]"));
        let kept = out.trim_end_matches(" [...]").split_whitespace().count();
        assert!(kept == 7 || kept == 6);

        // 太短的描述不删词
        let p = PerturbationPlan::default()
            .with_kinds(vec![PerturbationKind::Incomplete])
            .perturber_for("t");
        assert_eq!(p.perturb_task("Find Tomas"), "Find Tomas");
    }

    #[test]
    fn test_mismatch_rewrites_clue_and_flips_navigation() {
        let p = always(PerturbationConfig {
            enabled: true,
            mismatch_prob: 1.0,
            ..PerturbationConfig::default()
        });
        let r = p.perturb_observation(
            "find_person",
            ActionResult::fail("Failure: Tomas was not found here. Tomas is in the gym."),
        );
        assert!(!r.observation.contains("gym"));
        assert!(r.observation.starts_with("Failure: Tomas was not found here. Tomas is in the "));
        assert_eq!(r.data["perturbed"], Value::Bool(true));

        let r = p.perturb_observation("go_to_place", ActionResult::ok("Success: true"));
        assert!(!r.ok);
        assert_eq!(r.observation, "Failure: true");

        // 其他动作不受失配影响
        let r = p.perturb_observation("talk", ActionResult::ok("Success: true"));
        assert_eq!(r, ActionResult::ok("Success: true"));
        assert_eq!(p.applied(), 2);
    }

    #[test]
    fn test_distractor_keeps_original_text() {
        let p = always(PerturbationConfig {
            enabled: true,
            distractor_prob: 1.0,
            ..PerturbationConfig::default()
        });
        let r = p.perturb_observation("talk", ActionResult::ok("Success: true"));
        assert!(r.ok);
        assert!(r.observation.contains("Success: true"));
        assert!(SENSOR_DISTRACTORS.iter().any(|d| r.observation.contains(d)));
    }

    #[tokio::test]
    async fn test_latency_wrapper_delegates() {
        let perturber = Arc::new(always(PerturbationConfig {
            enabled: true,
            latency_ms: 10,
            ..PerturbationConfig::default()
        }));
        let delay = perturber.latency().unwrap();
        assert!(delay >= Duration::from_millis(8) && delay <= Duration::from_millis(12));

        let mock = Arc::new(MockLlmClient::scripted(["hi"]));
        let llm = PerturbedLlm::new(mock.clone(), perturber);
        let start = std::time::Instant::now();
        assert_eq!(llm.complete(&[Message::user("x")]).await.unwrap().content, "hi");
        assert!(start.elapsed() >= Duration::from_millis(8));
        assert_eq!(llm.model_name(), "mock");
        assert_eq!(mock.call_count(), 1);
    }
}
