//! 动作层：规格、响应形态与适配、注册表、调用 Schema、模拟机器人目录

pub mod registry;
pub mod response;
pub mod robot;
pub mod schema;
pub mod spec;

pub use registry::{ActionProvider, ActionRegistry, FnProvider, ObservationFilter};
pub use response::{ActionResult, ResponseShape, APPROVAL_TOKEN};
pub use robot::simulated_catalogue;
pub use schema::action_call_schema_json;
pub use spec::{ActionSpec, ArgField, ArgType};
