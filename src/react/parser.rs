//! 推理输出解析
//!
//! 接受两种格式：
//! - 文本 ReAct：`Thought:` / `Action:` / `Action Input:` / `Final Answer:`，遇到模型自己编造的 `Observation:` 即截断
//! - JSON：`{"action": "...", "args": {...}}`（也接受 tool / action_input / arguments）或 `{"final_answer": "..."}`，允许 ```json 围栏
//!
//! 同时给出动作与最终答案视为格式错误。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

/// 模型选择的动作；input 为原始参数（对象或裸字符串，由注册表规整）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub action: String,
    pub input: Value,
}

/// 一轮推理的输出
#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningOutput {
    Action {
        thought: Option<String>,
        call: ActionCall,
    },
    FinalAnswer {
        thought: Option<String>,
        answer: String,
    },
}

#[derive(Clone, Copy)]
enum Field {
    None,
    Thought,
    Input,
    Final,
}

#[derive(Default)]
struct TextFields {
    thought: Option<String>,
    action: Option<String>,
    input: Option<String>,
    final_answer: Option<String>,
}

/// 若行以 `key:`（大小写不敏感，冒号前可有空白）开头，返回冒号后的内容
fn label<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let t = line.trim_start();
    let head = t.get(..key.len())?;
    if !head.eq_ignore_ascii_case(key) {
        return None;
    }
    let rest = t.get(key.len()..)?.trim_start();
    rest.strip_prefix(':').map(str::trim)
}

fn append(slot: &mut Option<String>, line: &str) {
    if let Some(s) = slot {
        s.push('\n');
        s.push_str(line);
    }
}

fn scan_text(output: &str) -> TextFields {
    let mut f = TextFields::default();
    let mut cur = Field::None;
    for line in output.lines() {
        if label(line, "Observation").is_some() {
            break;
        }
        if let Some(rest) = label(line, "Final Answer") {
            f.final_answer = Some(rest.to_string());
            cur = Field::Final;
        } else if let Some(rest) = label(line, "Action Input") {
            f.input = Some(rest.to_string());
            cur = Field::Input;
        } else if let Some(rest) = label(line, "Action") {
            if f.action.is_some() {
                break;
            }
            f.action = Some(rest.to_string());
            cur = Field::None;
        } else if let Some(rest) = label(line, "Thought") {
            if f.action.is_some() {
                break;
            }
            f.thought = Some(rest.to_string());
            cur = Field::Thought;
        } else {
            match cur {
                Field::Thought => append(&mut f.thought, line),
                Field::Input => append(&mut f.input, line),
                Field::Final => append(&mut f.final_answer, line),
                Field::None => {}
            }
        }
    }
    f
}

/// 去掉 ``` / ```json 围栏
fn strip_fences(s: &str) -> &str {
    let t = s.trim();
    let Some(inner) = t.strip_prefix("```") else {
        return t;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.rfind("```").map(|end| &inner[..end]).unwrap_or(inner).trim()
}

/// Action Input：优先按 JSON 解析，否则作为裸字符串（去掉包裹的引号）
fn parse_input(raw: &str) -> Value {
    let s = strip_fences(raw);
    if s.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(s)
        .unwrap_or_else(|_| Value::String(s.trim_matches(|c| c == '"' || c == '\'').to_string()))
}

fn preview(output: &str) -> String {
    let p: String = output.chars().take(200).collect();
    if output.chars().count() > 200 {
        format!("{p}...")
    } else {
        p
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// 从文本中提取 JSON 对象（```json 围栏或首个 `{` 到末个 `}`）
fn extract_json(trimmed: &str) -> Option<&str> {
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn parse_json(output: &str) -> Result<ReasoningOutput, AgentError> {
    let trimmed = output.trim();
    let json_str = extract_json(trimmed).ok_or_else(|| {
        AgentError::ParseFailure(format!(
            "no Action or Final Answer found in: {}",
            preview(trimmed)
        ))
    })?;
    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| AgentError::ParseFailure(format!("{}: {}", e, preview(json_str))))?;
    let obj = value
        .as_object()
        .ok_or_else(|| AgentError::ParseFailure(format!("expected a JSON object: {}", preview(json_str))))?;

    let thought = obj
        .get("thought")
        .and_then(Value::as_str)
        .map(str::to_string);
    let action = obj
        .get("action")
        .or_else(|| obj.get("tool"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let final_answer = obj.get("final_answer").and_then(Value::as_str);

    match (action, final_answer) {
        (Some(_), Some(_)) => Err(AgentError::ParseFailure(
            "response contains both an action and a final answer".into(),
        )),
        (Some(name), None) => {
            let input = ["args", "action_input", "arguments"]
                .iter()
                .find_map(|k| obj.get(*k))
                .cloned()
                .unwrap_or(Value::Null);
            Ok(ReasoningOutput::Action {
                thought,
                call: ActionCall {
                    action: name.to_string(),
                    input,
                },
            })
        }
        (None, Some(answer)) => Ok(ReasoningOutput::FinalAnswer {
            thought,
            answer: answer.trim().to_string(),
        }),
        (None, None) => Err(AgentError::ParseFailure(format!(
            "JSON has neither \"action\" nor \"final_answer\": {}",
            preview(json_str)
        ))),
    }
}

/// 解析一轮模型输出为动作或最终答案
pub fn parse_reasoning_output(output: &str) -> Result<ReasoningOutput, AgentError> {
    let fields = scan_text(output);
    let thought = non_empty(fields.thought);

    match (fields.action, fields.final_answer) {
        (Some(_), Some(_)) => Err(AgentError::ParseFailure(
            "response contains both an action and a final answer".into(),
        )),
        (Some(action), None) => {
            let name = action
                .trim()
                .trim_matches(|c| c == '`' || c == '"' || c == '\'')
                .to_string();
            if name.is_empty() {
                return Err(AgentError::ParseFailure("empty action name".into()));
            }
            Ok(ReasoningOutput::Action {
                thought,
                call: ActionCall {
                    action: name,
                    input: fields.input.as_deref().map(parse_input).unwrap_or(Value::Null),
                },
            })
        }
        (None, Some(answer)) => Ok(ReasoningOutput::FinalAnswer {
            thought,
            answer: answer.trim().to_string(),
        }),
        (None, None) => parse_json(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(out: ReasoningOutput) -> (Option<String>, ActionCall) {
        match out {
            ReasoningOutput::Action { thought, call } => (thought, call),
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[test]
    fn test_text_action() {
        let out = parse_reasoning_output(
            "Thought: I need to go to the kitchen\nAction: go_to_place\nAction Input: {\"location\": \"kitchen\"}",
        )
        .unwrap();
        let (thought, call) = action(out);
        assert_eq!(thought.as_deref(), Some("I need to go to the kitchen"));
        assert_eq!(call.action, "go_to_place");
        assert_eq!(call.input, json!({"location": "kitchen"}));
    }

    #[test]
    fn test_text_bare_input_and_hallucinated_observation() {
        let out = parse_reasoning_output(
            "Thought: go\nAction: `move_to`\nAction Input: \"kitchen\"\nObservation: arrived\nThought: done\nFinal Answer: ok",
        )
        .unwrap();
        let (_, call) = action(out);
        assert_eq!(call.action, "move_to");
        assert_eq!(call.input, json!("kitchen"));
    }

    #[test]
    fn test_multiline_final_answer() {
        let out = parse_reasoning_output("Thought: done\nFinal Answer: I went to the kitchen\nand said hello").unwrap();
        assert_eq!(
            out,
            ReasoningOutput::FinalAnswer {
                thought: Some("done".into()),
                answer: "I went to the kitchen\nand said hello".into()
            }
        );
    }

    #[test]
    fn test_both_action_and_final_is_failure() {
        let err = parse_reasoning_output("Action: talk\nAction Input: {}\nFinal Answer: done").unwrap_err();
        assert!(matches!(err, AgentError::ParseFailure(_)));
    }

    #[test]
    fn test_json_formats() {
        let (_, call) = action(
            parse_reasoning_output("```json\n{\"action\": \"talk\", \"args\": {\"text\": \"hi\"}}\n```").unwrap(),
        );
        assert_eq!(call.action, "talk");
        assert_eq!(call.input, json!({"text": "hi"}));

        let (_, call) = action(parse_reasoning_output("{\"tool\": \"spin\", \"action_input\": {\"degrees\": 90}}").unwrap());
        assert_eq!(call.action, "spin");

        let out = parse_reasoning_output("{\"final_answer\": \"done\"}").unwrap();
        assert!(matches!(out, ReasoningOutput::FinalAnswer { ref answer, .. } if answer == "done"));
    }

    #[test]
    fn test_garbage_is_failure() {
        assert!(parse_reasoning_output("I think I will just wander around").is_err());
        assert!(parse_reasoning_output("{\"foo\": 1}").is_err());
        assert!(parse_reasoning_output("Action:   \nAction Input: {}").is_err());
    }
}
