pub mod agent;
pub mod chat;
pub mod flow;
pub mod mcp;
pub mod source;

pub use agent::*;
pub use chat::*;
pub use flow::*;
pub use mcp::*;
pub use source::*;
