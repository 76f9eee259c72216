//! Tool protocol: the stdio tool server and the process bridge that calls it.

pub mod bridge;
mod line_buffer;
pub mod protocol;
pub mod server;
mod tools;

pub use bridge::{search_music, BridgeError, RpcBridge, ServerCommand};
pub use line_buffer::LineBuffer;
pub use protocol::{ErrorCode, ErrorObject, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use server::ToolServer;
pub use tools::{
    search_music_schema, SearchMusicArgs, Tool, ToolError, ToolHandler, ToolRegistry, SEARCH_MUSIC,
    SEARCH_MUSIC_DESCRIPTION,
};
