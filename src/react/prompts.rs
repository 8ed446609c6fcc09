//! 提示词模板：推理循环、计划生成、失败反思、每步反思

use crate::core::Trace;

/// 推理循环的 system prompt：可用动作目录 + 调用格式
pub fn reasoning_system_prompt(catalogue: &str, action_schema: &str) -> String {
    format!(
        "You control a service robot. Complete the user's task by choosing one action at a time.\n\n\
        AVAILABLE ACTIONS:\n{catalogue}\n\
        RESPONSE FORMAT (follow exactly):\n\
        Thought: <what you need to do next and why>\n\
        Action: <exact action name from the list>\n\
        Action Input: <JSON object with the action arguments>\n\n\
        The system replies with an Observation. Repeat Thought/Action/Action Input as needed, then finish with:\n\
        Thought: <why the task is done>\n\
        Final Answer: <summary of what you did>\n\n\
        You may instead reply with one JSON object matching this schema:\n{action_schema}\n\
        or {{\"final_answer\": \"...\"}}.\n\n\
        RULES:\n\
        - Only use actions from the list; never invent actions or capabilities.\n\
        - If a location or person is unknown, say so explicitly in the Final Answer.\n\
        - Never write an Observation yourself."
    )
}

/// 任务消息：反思段落（若有）+ 任务描述
pub fn task_prompt(task: &str, reflections_context: &str) -> String {
    if reflections_context.is_empty() {
        format!("TASK: {task}\n\nBegin.")
    } else {
        format!("{reflections_context}\nTASK: {task}\n\nBegin.")
    }
}

/// 动作执行后喂回模型的观察
pub fn observation_prompt(observation: &str) -> String {
    format!("Observation: {observation}")
}

/// 计划生成的 system prompt：一次性给出完整有序步骤
pub fn planning_system_prompt(catalogue: &str) -> String {
    format!(
        "You are an expert planner for a service robot. Produce a complete step-by-step plan for the user's task.\n\n\
        AVAILABLE ACTIONS:\n{catalogue}\n\
        RESPONSE FORMAT: a single JSON object with a \"steps\" list. Each step has\n\
        - \"action\": the EXACT action name\n\
        - \"args\": an object with the EXACT argument names\n\n\
        Example:\n\
        {{\"steps\": [{{\"action\": \"go_to_place\", \"args\": {{\"location\": \"kitchen\"}}}}, \
        {{\"action\": \"talk\", \"args\": {{\"text\": \"Lunch is ready\"}}}}]}}\n\n\
        Do not invent actions or arguments. Reply with the JSON only."
    )
}

pub fn planning_user_prompt(task: &str) -> String {
    format!("Task: {task}")
}

/// 反思 prompt：失败尝试的步骤摘要与最终输出
pub fn reflection_prompt(
    task: &str,
    attempt: usize,
    trace: &Trace,
    final_output: &str,
    termination: &str,
) -> String {
    let steps = if trace.is_empty() {
        "No steps were executed.".to_string()
    } else {
        trace
            .steps()
            .iter()
            .map(|s| {
                format!(
                    "{}. [{}] {}({}) -> {}",
                    s.index,
                    if s.result.ok { "ok" } else { "failed" },
                    s.action_name,
                    serde_json::Value::Object(s.arguments.clone()),
                    s.result.observation
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let final_output = if final_output.is_empty() {
        "(no final answer)"
    } else {
        final_output
    };
    format!(
        "You are analysing the performance of a service robot.\n\n\
        ORIGINAL TASK:\n{task}\n\n\
        ATTEMPT #{attempt} - RESULT: FAILURE ({termination})\n\n\
        EXECUTED STEPS:\n{steps}\n\n\
        FINAL OUTPUT:\n{final_output}\n\n\
        Analyse what went wrong: wrong actions, wrong arguments, wrong order, ignored hints in observations.\n\
        Give a concise reflection (2-4 sentences) that helps the robot succeed on the next attempt.\n\n\
        REFLECTION:"
    )
}

/// 每步反思：只看刚执行的一步，要求一句话
pub fn step_reflection_prompt(task: &str, step: usize, action_call: &str, observation: &str) -> String {
    format!(
        "Briefly analyse the step the robot just executed and give one concise reflection (1 sentence).\n\n\
        Original task: {task}\n\
        Current step: {step}\n\
        Last action: {action_call}\n\
        Result: {observation}\n\n\
        Focus on whether the result was successful, what should happen next, and whether the strategy needs adjusting.\n\n\
        REFLECTION (1 sentence):"
    )
}
