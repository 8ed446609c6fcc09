//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BENCHBOT__*` 覆盖（双下划线表示嵌套，如 `BENCHBOT__ENGINE__MAX_ATTEMPTS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub engine: EngineSection,
    pub plan: PlanSection,
    pub classifier: ClassifierSection,
    pub perturbation: PerturbationSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：mock / openai / deepseek
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// [engine] 段：推理循环与反思重试的预算
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// 单次尝试的挂钟时间上限（秒），在两轮之间检查
    #[serde(default = "default_max_execution_time")]
    pub max_execution_time_secs: f64,
    /// 模型输出无法解析时的静默重试次数
    #[serde(default = "default_format_retries")]
    pub format_retries: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// 单个动作调用超时（秒）
    #[serde(default = "default_action_timeout")]
    pub action_timeout_secs: u64,
    /// 反思尝试评估时是否额外要求所有步骤 ok
    #[serde(default)]
    pub require_all_steps_ok: bool,
    /// 最终答案中出现即判定尝试失败的标记（小写匹配）
    #[serde(default = "default_fatal_markers")]
    pub fatal_markers: Vec<String>,
}

fn default_max_iterations() -> usize {
    10
}

fn default_max_execution_time() -> f64 {
    120.0
}

fn default_format_retries() -> usize {
    3
}

fn default_max_attempts() -> usize {
    3
}

fn default_action_timeout() -> u64 {
    30
}

fn default_fatal_markers() -> Vec<String> {
    vec![
        "fatal error".into(),
        "error fatal".into(),
        "agent stopped".into(),
    ]
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_execution_time_secs: default_max_execution_time(),
            format_retries: default_format_retries(),
            max_attempts: default_max_attempts(),
            action_timeout_secs: default_action_timeout(),
            require_all_steps_ok: false,
            fatal_markers: default_fatal_markers(),
        }
    }
}

/// [plan] 段：计划执行遇到失败时哪些 observation 视为「信息性失败」（正则）
#[derive(Debug, Clone, Deserialize)]
pub struct PlanSection {
    #[serde(default = "default_informative_patterns")]
    pub informative_failure_patterns: Vec<String>,
}

fn default_informative_patterns() -> Vec<String> {
    vec![
        r"(?i)\bis (?:in|at) (?:the )?[a-z]".into(),
        r"(?i)\best[aá] en\b".into(),
    ]
}

impl Default for PlanSection {
    fn default() -> Self {
        Self {
            informative_failure_patterns: default_informative_patterns(),
        }
    }
}

/// [classifier] 段：结果分类使用的短语（小写匹配）
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSection {
    #[serde(default = "default_capability_gap_phrases")]
    pub capability_gap_phrases: Vec<String>,
    #[serde(default = "default_success_phrases")]
    pub success_phrases: Vec<String>,
    #[serde(default = "default_fatal_phrases")]
    pub fatal_phrases: Vec<String>,
    /// 输出长度超过该值才算「非平凡」输出
    #[serde(default = "default_min_output_chars")]
    pub min_informative_output_chars: usize,
}

fn default_capability_gap_phrases() -> Vec<String> {
    [
        "i don't know",
        "i do not know",
        "i don't have access",
        "not available",
        "unknown location",
        "i am not able to",
        "i'm not able to",
        "i can't",
        "i cannot",
        "no conozco",
        "no tengo acceso",
        "no puedo",
        "no está disponible",
        "desconocido",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_success_phrases() -> Vec<String> {
    [
        "task completed",
        "completed the task",
        "i have found",
        "i found",
        "i have arrived",
        "i arrived",
        "i have said",
        "i told",
        "i have delivered",
        "completé la tarea",
        "he encontrado",
        "he llegado",
        "he dicho",
        "he comunicado",
        "tarea completada",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_fatal_phrases() -> Vec<String> {
    [
        "fatal error",
        "failed",
        "could not",
        "impossible",
        "error fatal",
        "falló",
        "no se pudo",
        "imposible",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_min_output_chars() -> usize {
    10
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            capability_gap_phrases: default_capability_gap_phrases(),
            success_phrases: default_success_phrases(),
            fatal_phrases: default_fatal_phrases(),
            min_informative_output_chars: default_min_output_chars(),
        }
    }
}

/// [perturbation] 段：鲁棒性扰动，默认关闭
///
/// `level` 选择预设（baseline / mild / moderate / severe），设置后忽略下面的数值字段。
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PerturbationSection {
    pub level: Option<String>,
    pub enabled: bool,
    /// 词错误率 0.0-1.0
    pub asr_wer: f64,
    /// 每次模型调用前额外等待的毫秒数
    pub latency_ms: u64,
    pub distractor_prob: f64,
    pub mismatch_prob: f64,
    /// 只作用于任务描述的文本扰动：distractors / noise / ambiguity / incomplete
    pub task_perturbations: Vec<String>,
    pub seed: Option<u64>,
}

/// 从 config 目录加载配置，环境变量 BENCHBOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BENCHBOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BENCHBOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.engine.max_iterations, 10);
        assert_eq!(cfg.engine.max_attempts, 3);
        assert_eq!(cfg.engine.format_retries, 3);
        assert!((cfg.engine.max_execution_time_secs - 120.0).abs() < f64::EPSILON);
        assert!(!cfg.plan.informative_failure_patterns.is_empty());
        assert_eq!(cfg.classifier.min_informative_output_chars, 10);
        assert!(!cfg.perturbation.enabled);
        assert!(cfg.perturbation.task_perturbations.is_empty());
    }

    #[test]
    fn test_load_from_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[engine]\nmax_attempts = 5\nmax_iterations = 4\n\n[llm]\nprovider = \"openai\"\nmodel = \"gpt-4o\"\n\n[perturbation]\nlevel = \"mild\"\nseed = 7"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.engine.max_attempts, 5);
        assert_eq!(cfg.engine.max_iterations, 4);
        // 未写出的键保持默认
        assert_eq!(cfg.engine.format_retries, 3);
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.model.as_deref(), Some("gpt-4o"));
        assert_eq!(cfg.perturbation.level.as_deref(), Some("mild"));
        assert_eq!(cfg.perturbation.seed, Some(7));
    }
}
