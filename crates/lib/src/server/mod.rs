//! Tool server: the dispatcher over HTTP and over a stdio line protocol.
//!
//! HTTP: `GET /` health, `GET /tools` definitions, `POST /tools/invoke` with
//! `{ "tool", "input" }`. Stdio: one JSON request per line (see `protocol`).

mod http;
mod protocol;
mod stdio;

pub use http::{bind_tool_listener, run_tool_server, serve_tool_server, tool_router};
pub use protocol::{StdioRequest, StdioResponse};
pub use stdio::serve_stdio;
