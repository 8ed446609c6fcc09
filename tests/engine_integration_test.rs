//! 引擎集成测试：注册表、各策略、运行器、扰动与报表（全部基于 MockLlmClient）

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use benchbot::actions::{
        simulated_catalogue, ActionRegistry, ActionResult, ActionSpec, ArgType, ResponseShape,
    };
    use benchbot::bench::{PerturbationConfig, PerturbationKind, PerturbationPlan};
    use benchbot::evaluation::{ResultCategory, TaskCategory};
    use benchbot::llm::MockLlmClient;
    use benchbot::world::{SimulatedWorld, WorldState};
    use benchbot::{BenchAgent, BenchReport, BenchRunner, Strategy, TaskDescriptor, TaskSuite};
    use serde_json::{json, Map, Value};

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    /// goTo 恒成功，findPerson 恒带回位置线索，openDoor 是死路
    fn scenario_registry() -> Arc<ActionRegistry> {
        let mut reg = ActionRegistry::new();
        reg.register_fn(
            ActionSpec::new("go_to_place", "Move the robot").required("location", ArgType::Str),
            |_| Ok(ResponseShape::Flag(true)),
        )
        .register_fn(
            ActionSpec::new("find_person", "Look for someone").required("name", ArgType::Str),
            |_| Ok(ResponseShape::Shaped(ActionResult::fail("Tomas is in the living room"))),
        )
        .register_fn(ActionSpec::new("open_door", "Open the door"), |_| {
            Ok(ResponseShape::Shaped(ActionResult::fail("the door is jammed")))
        })
        .register_fn(
            ActionSpec::new("talk", "Say something").required("text", ArgType::Str),
            |_| Ok(ResponseShape::Flag(true)),
        );
        Arc::new(reg)
    }

    fn agent_with(script: &[&str], strategy: Strategy) -> (Arc<MockLlmClient>, BenchAgent) {
        let mock = Arc::new(MockLlmClient::scripted(script.iter().copied()));
        let agent = BenchAgent::new(mock.clone(), scenario_registry(), strategy);
        (mock, agent)
    }

    #[tokio::test]
    async fn test_registry_totality() {
        let reg = scenario_registry();
        for name in ["fly", "", "GO_TO_PLACE", "go_to_place "] {
            let r = reg.invoke(name, &Map::new()).await;
            assert!(!r.ok, "{name:?} should not resolve");
            assert!(r.observation.starts_with("action not found"));
        }
    }

    #[tokio::test]
    async fn test_missing_argument_never_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut reg = ActionRegistry::new();
        reg.register_fn(
            ActionSpec::new("talk", "Say something").required("x", ArgType::Str),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ResponseShape::Flag(true))
            },
        );
        let r = reg.invoke("talk", &obj(json!({"y": "hi"}))).await;
        assert!(!r.ok);
        assert!(r.observation.contains('x'));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(reg.invoke("talk", &obj(json!({"x": "hi"}))).await.ok);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reflexion_succeeds_on_third_attempt() {
        let (mock, agent) = agent_with(
            &[
                "Final Answer: Fatal error, I could not move",
                "I should call go_to_place first.",
                "Final Answer: Fatal error again",
                "Really call go_to_place with a location.",
                "Thought: move\nAction: go_to_place\nAction Input: {\"location\": \"kitchen\"}",
                "Final Answer: I have arrived at the kitchen",
            ],
            Strategy::Reflexion,
        );
        let r = agent.run(&TaskDescriptor::new("c", "go to the kitchen")).await;

        assert!(r.success);
        assert_eq!(r.attempts, 3);
        assert_eq!(r.reflections.len(), 2);
        assert_eq!(r.all_attempts.len(), 3);
        assert_eq!(r.steps, 1);
        // 指标覆盖全部尝试与反思调用
        assert_eq!(r.metrics.call_count, 6);
        assert_eq!(mock.call_count(), 6);
    }

    #[tokio::test]
    async fn test_reflexion_exhaustion_keeps_reflections_one_behind() {
        let script: Vec<&str> = vec![
            "Final Answer: Fatal error",
            "reflection 1",
            "Final Answer: Fatal error",
            "reflection 2",
            "Final Answer: Fatal error",
        ];
        let (mock, agent) = agent_with(&script, Strategy::Reflexion);
        let r = agent.run(&TaskDescriptor::new("x", "go to the kitchen")).await;
        assert!(!r.success);
        assert_eq!(r.attempts, 3);
        assert_eq!(r.reflections.len(), r.attempts - 1);
        assert_eq!(mock.call_count(), 5);
    }

    #[tokio::test]
    async fn test_reflexion_first_success_stops_early() {
        let (mock, agent) = agent_with(&["Final Answer: Task completed"], Strategy::Reflexion);
        let r = agent.run(&TaskDescriptor::new("p4", "spin")).await;
        assert!(r.success);
        assert_eq!(r.attempts, 1);
        assert!(r.reflections.is_empty());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_plan_aborts_on_dead_end() {
        let (_, agent) = agent_with(
            &[r#"{"steps": [
                {"action": "go_to_place", "args": {"location": "hall"}},
                {"action": "open_door", "args": {}},
                {"action": "talk", "args": {"text": "hello"}}
            ]}"#],
            Strategy::Plan,
        );
        let r = agent.run(&TaskDescriptor::new("p5", "open the door and greet")).await;
        assert!(!r.success);
        assert_eq!(r.trace.len(), 2);
        assert_eq!(r.steps, 2);
    }

    #[tokio::test]
    async fn test_plan_single_step_success() {
        let (_, agent) = agent_with(
            &[r#"[{"action": "go_to_place", "args": {"location": "kitchen"}}]"#],
            Strategy::Plan,
        );
        let r = agent.run(&TaskDescriptor::new("a", "go to the kitchen")).await;
        assert!(r.success);
        assert_eq!(r.steps, 1);
        assert_eq!(r.category, ResultCategory::Success);
        assert_eq!(r.task_category, TaskCategory::NavigationSimple);
    }

    #[tokio::test]
    async fn test_plan_informative_last_step_fails() {
        let (_, agent) = agent_with(
            &[r#"[{"action": "go_to_place", "args": {"location": "kitchen"}},
                 {"action": "find_person", "args": {"name": "Tomas"}}]"#],
            Strategy::Plan,
        );
        let r = agent.run(&TaskDescriptor::new("b", "find Tomas")).await;
        assert_eq!(r.trace.len(), 2);
        assert!(!r.trace.steps()[1].result.ok);
        assert!(!r.success);
        assert_eq!(r.category, ResultCategory::Partial);
    }

    #[tokio::test]
    async fn test_sequential_runs_do_not_share_telemetry() {
        let (_, agent) = agent_with(
            &[
                "Action: go_to_place\nAction Input: kitchen",
                "Action: talk\nAction Input: hi",
                "Final Answer: I have said hi",
                "Final Answer: Task completed",
            ],
            Strategy::React,
        );
        let runner = BenchRunner::new(agent);
        let suite = TaskSuite::new(vec![
            TaskDescriptor::new("a", "go to the kitchen and say hi"),
            TaskDescriptor::new("b", "spin"),
        ]);
        let results = runner.run_suite(&suite).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metrics.call_count, 3);
        assert_eq!(results[1].metrics.call_count, 1);
        assert_ne!(results[0].run_id, results[1].run_id);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let mut reg = ActionRegistry::new();
        reg.register_fn(ActionSpec::new("explode", "Always panics"), |_| {
            panic!("handler blew up")
        });
        let mock = Arc::new(MockLlmClient::scripted(["Action: explode\nAction Input: {}"]));
        let agent = BenchAgent::new(mock, Arc::new(reg), Strategy::React);
        let r = agent.run(&TaskDescriptor::new("boom", "explode")).await;
        assert!(!r.success);
        assert_eq!(r.category, ResultCategory::Fail);
        assert!(r.final_output.starts_with("Fatal error:"));
        assert!(r.error.is_some());
    }

    #[tokio::test]
    async fn test_runner_resets_world_between_tasks() {
        let world = Arc::new(SimulatedWorld::default());
        let registry = Arc::new(simulated_catalogue(world.clone(), 5));
        let mock = Arc::new(MockLlmClient::scripted([
            r#"[{"action": "go_to_place", "args": {"location": "kitchen"}},
                {"action": "find_person", "args": {"name": "Alice"}}]"#,
            r#"[{"action": "find_person", "args": {"name": "Alice"}}]"#,
            r#"[{"action": "find_person", "args": {"name": "Tomas"}}]"#,
        ]));
        let agent = BenchAgent::new(mock, registry, Strategy::Plan);
        let runner = BenchRunner::new(agent).with_environment(world.clone());

        let mut moved = WorldState::default();
        moved.people_locations.insert("Tomas".into(), "entrance hall".into());
        let suite = TaskSuite::new(vec![
            TaskDescriptor::new("1", "Find Alice in the kitchen"),
            TaskDescriptor::new("2", "Find Alice"),
            TaskDescriptor::new("3", "Find Tomas").with_world(moved),
        ]);
        let (results, report) = runner.run_with_report(&suite).await;

        assert!(results[0].success);
        // 第二个任务开始前机器人回到门厅，只能拿到位置线索
        assert!(!results[1].success);
        assert!(results[1].trace.steps()[0]
            .result
            .observation
            .contains("Alice is in the kitchen"));
        // 第三个任务使用自带的世界状态
        assert!(results[2].success);
        assert_eq!(world.snapshot().people_locations["Tomas"], "entrance hall");

        assert_eq!(report.total_tasks, 3);
        assert_eq!(report.successes, 2);
        assert_eq!(report.success_rate, 66.7);
        assert_eq!(report.efficiency.total_llm_calls, 3);
        assert_eq!(report.cost_estimate.model, "mock");
    }

    #[test]
    fn test_report_serializes_category_maps() {
        let report = BenchReport::default();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_tasks"], 0);
        assert!(json["result_categories"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_runner_records_input_perturbation() {
        let (mock, agent) = agent_with(
            &[
                "Final Answer: I have arrived at the kitchen",
                "Final Answer: I have arrived at the living room",
            ],
            Strategy::React,
        );
        let plan = PerturbationPlan::new(PerturbationConfig::default())
            .with_kinds(vec![PerturbationKind::Distractors])
            .with_seed(11);
        let runner = BenchRunner::new(agent).with_perturbation(plan);
        let suite = TaskSuite::new(vec![
            TaskDescriptor::new("1", "Go to the kitchen"),
            TaskDescriptor::new("2", "Go to the living room"),
        ]);
        let (results, report) = runner.run_with_report(&suite).await;

        for (task, r) in suite.iter().zip(&results) {
            // 结果保留原始描述，类别也按原文归类
            assert_eq!(r.description, task.description);
            assert_eq!(r.task_category, TaskCategory::NavigationSimple);
            let record = r.perturbation.as_ref().unwrap();
            assert!(record.perturbed_description.starts_with(&task.description));
            assert_ne!(record.perturbed_description, task.description);
            assert_eq!(record.perturbations_applied, 1);
            assert_eq!(record.kinds, [PerturbationKind::Distractors]);
        }
        let first_prompt = &mock.prompts()[0];
        let perturbed = &results[0].perturbation.as_ref().unwrap().perturbed_description;
        assert!(first_prompt.iter().any(|m| m.content.contains(perturbed.as_str())));

        assert_eq!(report.perturbed_tasks, 2);
        assert_eq!(report.perturbations_applied, 2);
    }

    #[tokio::test]
    async fn test_runner_mismatch_flips_navigation_result() {
        let (_, agent) = agent_with(
            &[r#"[{"action": "go_to_place", "args": {"location": "kitchen"}}]"#],
            Strategy::Plan,
        );
        let plan = PerturbationPlan::new(PerturbationConfig {
            enabled: true,
            asr_wer: 0.0,
            latency_ms: 0,
            distractor_prob: 0.0,
            mismatch_prob: 1.0,
        })
        .with_seed(5);
        let runner = BenchRunner::new(agent).with_perturbation(plan);
        let r = runner.run_task(&TaskDescriptor::new("1", "Go to the kitchen")).await;

        assert!(!r.success);
        let step = &r.trace.steps()[0];
        assert!(!step.result.ok);
        assert_eq!(step.result.observation, "Failure: true");
        assert_eq!(step.result.data["perturbed"], Value::Bool(true));
        let record = r.perturbation.unwrap();
        assert_eq!(record.perturbed_description, "Go to the kitchen");
        assert_eq!(record.perturbations_applied, 1);
    }

    #[tokio::test]
    async fn test_inactive_plan_leaves_results_untouched() {
        let (_, agent) = agent_with(&["Final Answer: done"], Strategy::React);
        let runner = BenchRunner::new(agent).with_perturbation(PerturbationPlan::default());
        let r = runner.run_task(&TaskDescriptor::new("1", "Go to the kitchen")).await;
        assert!(r.perturbation.is_none());
    }

    #[tokio::test]
    async fn test_reference_keeps_one_reflection_per_action() {
        let (mock, agent) = agent_with(
            &[
                "Thought: look first\nAction: find_person\nAction Input: {\"name\": \"Tomas\"}",
                "Tomas is in the living room, go there next.",
                "Thought: go\nAction: go_to_place\nAction Input: {\"location\": \"living room\"}",
                "Arrived where Tomas is.",
                "Final Answer: I found Tomas in the living room",
            ],
            Strategy::Reference,
        );
        let r = agent
            .run(&TaskDescriptor::new("ref", "Find Tomas and then go to his place"))
            .await;

        assert_eq!(r.steps, 2);
        assert_eq!(r.reflections.len(), r.steps);
        // 收尾窗口内两步只有一步成功，未过半
        assert!(!r.success);
        assert!(!r.trace.steps()[0].result.ok);
        assert!(r.trace.steps()[1].result.ok);
        assert_eq!(r.metrics.call_count, 5);
        assert_eq!(mock.call_count(), 5);
    }
}
