//! 记忆层：模型对话消息、任务级反思记忆

pub mod message;
pub mod reflection;

pub use message::{Message, Role};
pub use reflection::ReflectionMemory;
