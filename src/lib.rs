//! mcpchat connects OpenAI-compatible chat models to tools served over the
//! Model Context Protocol.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the turn loop: streamed completions are folded into text
//!   and tool calls, tool calls are dispatched, and their results are fed
//!   back until the model answers.
//! - [`mcp`] provides the streamable HTTP MCP client behind the
//!   [`mcp::ToolService`] seam.
//! - [`api`] defines the chat-completions payloads.
//! - [`cli`] wires configuration, logging and the terminal front end.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod mcp;
pub mod utils;
