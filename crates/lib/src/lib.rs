//! Courier core library: Telegram relay, tool dispatcher, Google Workspace
//! handles, agent loop and tool server used by the `courier` binary.

pub mod agent;
pub mod bootstrap;
pub mod channels;
pub mod config;
pub mod google;
pub mod init;
pub mod llm;
pub mod relay;
pub mod server;
pub mod tools;
