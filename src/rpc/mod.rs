//! RPC surface: protocol framing and the tool catalog

mod protocol;
mod tools;

pub use protocol::{
    methods, InitializeResult, ResourcesCapability, RpcError, RpcHandler, RpcRequest,
    RpcResponse, RpcServer, ServerCapabilities, ServerInfo, ToolCallResult, ToolContent,
    ToolDefinition, ToolsCapability, METHOD_NOT_FOUND, PARSE_ERROR,
};
pub use tools::{get_tool_definitions, RESOURCES, TOOL_DEFINITIONS};
