//! 模拟机器人动作目录
//!
//! 导航、语音、感知类动作，读写共享的 SimulatedWorld。各动作刻意返回不同的响应形态
//! （审批令牌 / 布尔 / 记录 / 载荷 / 成形结果），统一由注册表适配。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::actions::{
    ActionProvider, ActionRegistry, ActionResult, ActionSpec, ArgType, ResponseShape,
    APPROVAL_TOKEN,
};
use crate::world::SimulatedWorld;

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or("")
}

/// 导航到命名地点：审批令牌
pub struct GoToPlace {
    world: Arc<SimulatedWorld>,
}

#[async_trait]
impl ActionProvider for GoToPlace {
    async fn invoke(&self, args: &Map<String, Value>) -> Result<ResponseShape, String> {
        let wanted = str_arg(args, "location");
        let token = self.world.with_state(|s| {
            match s.resolve_location(wanted).map(str::to_string) {
                Some(loc) => {
                    s.robot_location = loc;
                    APPROVAL_TOKEN.to_string()
                }
                None => "unknown_location".to_string(),
            }
        });
        Ok(ResponseShape::Token(token))
    }

    fn adapt(&self, args: &Map<String, Value>, shape: ResponseShape) -> ActionResult {
        let wanted = str_arg(args, "location");
        if shape.is_ok() {
            let here = self.world.snapshot().robot_location;
            ActionResult::ok(format!("Success: arrived at {here}")).with_data("location", here)
        } else {
            let known = self.world.snapshot().available_locations.join(", ");
            ActionResult::fail(format!(
                "Failure: unknown location '{wanted}'. Known locations: {known}"
            ))
        }
    }
}

/// 说话：布尔
pub struct Talk;

#[async_trait]
impl ActionProvider for Talk {
    async fn invoke(&self, args: &Map<String, Value>) -> Result<ResponseShape, String> {
        Ok(ResponseShape::Flag(!str_arg(args, "text").trim().is_empty()))
    }

    fn adapt(&self, args: &Map<String, Value>, shape: ResponseShape) -> ActionResult {
        if shape.is_ok() {
            ActionResult::ok(format!("Success: said \"{}\"", str_arg(args, "text")))
        } else {
            ActionResult::fail("Failure: nothing to say")
        }
    }
}

/// 在当前地点寻找某人：记录；若此人在别处，失败描述携带其位置
pub struct FindPerson {
    world: Arc<SimulatedWorld>,
}

#[async_trait]
impl ActionProvider for FindPerson {
    async fn invoke(&self, args: &Map<String, Value>) -> Result<ResponseShape, String> {
        let name = str_arg(args, "name");
        let state = self.world.snapshot();
        let here = state.robot_location.as_str();
        let record = match state.person(name) {
            Some((person, loc)) if loc == here => json!({
                "approved": true,
                "person": person,
                "location": loc,
                "message": format!("found {person} in the {loc}"),
            }),
            Some((person, loc)) => json!({
                "approved": false,
                "person": person,
                "message": format!("{person} was not found here. {person} is in the {loc}."),
            }),
            None => json!({
                "approved": false,
                "message": format!("nobody called {name} was found in the {here}"),
            }),
        };
        Ok(ResponseShape::record(record))
    }
}

/// 询问在场的人某人在哪里：载荷（answer）
pub struct AskPersonLocation {
    world: Arc<SimulatedWorld>,
}

#[async_trait]
impl ActionProvider for AskPersonLocation {
    async fn invoke(&self, args: &Map<String, Value>) -> Result<ResponseShape, String> {
        let name = str_arg(args, "name");
        let state = self.world.snapshot();
        if state.people_at(&state.robot_location).is_empty() {
            return Ok(ResponseShape::payload("answer", None));
        }
        let answer = match state.person(name) {
            Some((person, loc)) => format!("{person} is in the {loc}"),
            None => format!("I don't know where {name} is"),
        };
        Ok(ResponseShape::payload("answer", Some(Value::String(answer))))
    }

    fn adapt(&self, _args: &Map<String, Value>, shape: ResponseShape) -> ActionResult {
        if shape.is_ok() {
            shape.into_result()
        } else {
            ActionResult::fail("Failure: there is nobody here to ask")
        }
    }
}

/// 人脸识别：记录（approved + person）
pub struct RecognizeFace {
    world: Arc<SimulatedWorld>,
}

#[async_trait]
impl ActionProvider for RecognizeFace {
    async fn invoke(&self, _args: &Map<String, Value>) -> Result<ResponseShape, String> {
        let state = self.world.snapshot();
        let record = match state.people_at(&state.robot_location).first() {
            Some(person) => json!({
                "approved": true,
                "person": person,
                "message": format!("recognized {person}"),
            }),
            None => json!({
                "approved": false,
                "person": "",
                "message": "no face in front of the robot",
            }),
        };
        Ok(ResponseShape::record(record))
    }
}

/// 读取二维码：载荷（text）
pub struct ReadQr {
    world: Arc<SimulatedWorld>,
}

#[async_trait]
impl ActionProvider for ReadQr {
    async fn invoke(&self, _args: &Map<String, Value>) -> Result<ResponseShape, String> {
        let here = self.world.snapshot().robot_location;
        Ok(ResponseShape::payload(
            "text",
            Some(Value::String(format!("QR code: {here}"))),
        ))
    }
}

/// 计算标注框深度：载荷（depth）
pub struct CalcDepth;

#[async_trait]
impl ActionProvider for CalcDepth {
    async fn invoke(&self, args: &Map<String, Value>) -> Result<ResponseShape, String> {
        let w = args.get("w").and_then(Value::as_f64).unwrap_or(0.0);
        let h = args.get("h").and_then(Value::as_f64).unwrap_or(0.0);
        if w < 0.0 || h < 0.0 {
            return Err(format!("invalid bounding box {w}x{h}"));
        }
        Ok(ResponseShape::payload("depth", Some(json!(1.5))))
    }
}

/// 语音转文字：载荷（text），无人在场时无内容
pub struct Speech2Text {
    world: Arc<SimulatedWorld>,
}

#[async_trait]
impl ActionProvider for Speech2Text {
    async fn invoke(&self, _args: &Map<String, Value>) -> Result<ResponseShape, String> {
        let state = self.world.snapshot();
        let heard = state
            .people_at(&state.robot_location)
            .first()
            .map(|p| Value::String(format!("{p}: hello robot")));
        Ok(ResponseShape::payload("text", heard))
    }
}

/// 图像描述：记录（approved + message）
pub struct ImgDesc {
    world: Arc<SimulatedWorld>,
}

#[async_trait]
impl ActionProvider for ImgDesc {
    async fn invoke(&self, _args: &Map<String, Value>) -> Result<ResponseShape, String> {
        let state = self.world.snapshot();
        let here = state.robot_location.as_str();
        let people = state.people_at(here);
        let objects = state.objects_at(here);
        let mut message = format!("the {here}");
        if !people.is_empty() {
            message.push_str(&format!(" with {}", people.join(", ")));
        }
        if !objects.is_empty() {
            message.push_str(&format!("; visible objects: {}", objects.join(", ")));
        }
        Ok(ResponseShape::record(json!({
            "approved": true,
            "message": message,
        })))
    }
}

/// 原地旋转：布尔
pub struct Spin;

#[async_trait]
impl ActionProvider for Spin {
    async fn invoke(&self, args: &Map<String, Value>) -> Result<ResponseShape, String> {
        let degrees = args.get("degrees").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(ResponseShape::Flag(degrees.is_finite()))
    }
}

/// 描述面前的人：成形结果
pub struct GetPersonDesc {
    world: Arc<SimulatedWorld>,
}

#[async_trait]
impl ActionProvider for GetPersonDesc {
    async fn invoke(&self, _args: &Map<String, Value>) -> Result<ResponseShape, String> {
        let state = self.world.snapshot();
        let result = match state.people_at(&state.robot_location).first() {
            Some(person) => ActionResult::ok(format!(
                "Success: {person} is an adult, about 30 years old, looking happy"
            ))
            .with_data("person", *person)
            .with_data("age", 30)
            .with_data("status", "happy"),
            None => ActionResult::fail("Failure: nobody in front of the robot"),
        };
        Ok(ResponseShape::Shaped(result))
    }
}

/// 在当前地点寻找物体：审批令牌
pub struct LookForObject {
    world: Arc<SimulatedWorld>,
}

#[async_trait]
impl ActionProvider for LookForObject {
    async fn invoke(&self, args: &Map<String, Value>) -> Result<ResponseShape, String> {
        let wanted = str_arg(args, "object_name");
        let state = self.world.snapshot();
        let found = matches!(state.object(wanted), Some((_, loc)) if loc == state.robot_location);
        Ok(ResponseShape::Token(
            if found { APPROVAL_TOKEN } else { "not_found" }.to_string(),
        ))
    }

    fn adapt(&self, args: &Map<String, Value>, shape: ResponseShape) -> ActionResult {
        let wanted = str_arg(args, "object_name");
        let here = self.world.snapshot().robot_location;
        if shape.is_ok() {
            ActionResult::ok(format!("Success: found the {wanted} in the {here}"))
        } else {
            ActionResult::fail(format!("Failure: no {wanted} was seen in the {here}"))
        }
    }
}

/// 构造模拟机器人的完整动作目录（含别名）
pub fn simulated_catalogue(world: Arc<SimulatedWorld>, action_timeout_secs: u64) -> ActionRegistry {
    let mut reg = ActionRegistry::new().with_timeout(action_timeout_secs);
    let w = || Arc::clone(&world);

    reg.register(
        ActionSpec::new("go_to_place", "Navigate the robot to a named location")
            .required("location", ArgType::Str)
            .optional("graph", ArgType::Int)
            .example(json!({"location": "kitchen"})),
        GoToPlace { world: w() },
    )
    .register(
        ActionSpec::new("talk", "Say a sentence out loud")
            .required("text", ArgType::Str)
            .optional("language", ArgType::Str)
            .example(json!({"text": "Hello, I am your robot"})),
        Talk,
    )
    .register(
        ActionSpec::new("find_person", "Look for a person at the current location")
            .required("name", ArgType::Str)
            .example(json!({"name": "Tomas"})),
        FindPerson { world: w() },
    )
    .register(
        ActionSpec::new(
            "ask_person_location",
            "Ask the people at the current location where someone is",
        )
        .required("name", ArgType::Str)
        .example(json!({"name": "Maria"})),
        AskPersonLocation { world: w() },
    )
    .register(
        ActionSpec::new("recognize_face", "Recognize the face of the person in front")
            .optional("num_pics", ArgType::Int)
            .example(json!({"num_pics": 3})),
        RecognizeFace { world: w() },
    )
    .register(
        ActionSpec::new("read_qr", "Read a QR code in front of the camera")
            .optional("timeout", ArgType::Float)
            .example(json!({"timeout": 5.0})),
        ReadQr { world: w() },
    )
    .register(
        ActionSpec::new("calc_depth", "Distance in meters to a detected bounding box")
            .optional("x", ArgType::Float)
            .optional("y", ArgType::Float)
            .optional("w", ArgType::Float)
            .optional("h", ArgType::Float)
            .example(json!({"x": 100.0, "y": 150.0, "w": 80.0, "h": 120.0})),
        CalcDepth,
    )
    .register(
        ActionSpec::new("speech2text", "Listen and transcribe what is said")
            .optional("seconds", ArgType::Int)
            .optional("lang", ArgType::Str)
            .example(json!({"seconds": 5, "lang": "eng"})),
        Speech2Text { world: w() },
    )
    .register(
        ActionSpec::new("img_desc", "Describe what the front camera sees")
            .required("prompt", ArgType::Str)
            .optional("camera_name", ArgType::Str)
            .example(json!({"prompt": "What do you see?"})),
        ImgDesc { world: w() },
    )
    .register(
        ActionSpec::new("spin", "Rotate in place by the given degrees")
            .required("degrees", ArgType::Float)
            .example(json!({"degrees": 90})),
        Spin,
    )
    .register(
        ActionSpec::new("get_person_desc", "Describe the person in front of the robot"),
        GetPersonDesc { world: w() },
    )
    .register(
        ActionSpec::new("look_for_object", "Look for an object at the current location")
            .required("object_name", ArgType::Str)
            .optional("ignore_already_seen", ArgType::Bool)
            .example(json!({"object_name": "keys"})),
        LookForObject { world: w() },
    );

    let aliases = [
        ("move_to", "go_to_place", "Alias of go_to_place"),
        ("say", "talk", "Alias of talk"),
        ("listen", "speech2text", "Alias of speech2text"),
    ];
    for (alias, target, description) in aliases {
        if let Err(e) = reg.register_alias(alias, target, description) {
            tracing::warn!(alias, error = %e, "alias skipped");
        }
    }
    reg
}
