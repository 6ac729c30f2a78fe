//! 工具层：Tool trait、有序注册表、参数 schema 与校验、笔记库工具集、执行器

pub mod executor;
pub mod registry;
pub mod schema;
pub mod vault_tools;

pub use executor::{SessionStats, ToolExecutor, ToolOutcome, ToolResult};
pub use registry::{Tool, ToolError, ToolOutput, ToolRegistry, VaultEffect};
pub use schema::{schema_for_args, validate_args};
pub use vault_tools::{build_vault_registry, DECLARED_TOOLS};
