//! 工具层：Tool trait、按来源注册的 ToolRegistry、带超时与审计的 ToolExecutor
//!
//! 具体工具（shell、文件、诊断等）由宿主注册；这里只内置测试用的 echo。

pub mod echo;
pub mod executor;
pub mod registry;

pub use echo::EchoTool;
pub use executor::{ToolDispatcher, ToolExecutor, ToolResult};
pub use registry::{ExternalToolClient, Tool, ToolOrigin, ToolRegistry};
