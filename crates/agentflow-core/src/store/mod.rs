pub mod agent_store;
pub mod chat_store;
pub mod flow_store;

pub use agent_store::AgentStore;
pub use chat_store::ChatStore;
pub use flow_store::FlowStore;
