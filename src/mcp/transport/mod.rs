//! Response handling shared by MCP listing and call flows.

use rust_mcp_schema::schema_utils::ServerMessage;

pub mod streamable_http;

/// JSON-RPC code used by servers to indicate unsupported list methods.
pub const MCP_METHOD_NOT_FOUND: i64 = -32601;

/// Outcome of a listing call. "Method not found" is a soft capability
/// signal, not a failure.
#[derive(Debug)]
pub enum ListFetch<T> {
    Ok(T),
    MethodNotFound,
    Err(String),
}

pub fn list_fetch_from_response<T>(
    response: Result<ServerMessage, String>,
    parse: impl FnOnce(ServerMessage) -> Result<T, String>,
) -> ListFetch<T> {
    match response {
        Ok(message) if is_method_not_found(&message) => ListFetch::MethodNotFound,
        Ok(message) => match parse(message) {
            Ok(list) => ListFetch::Ok(list),
            Err(err) => ListFetch::Err(err),
        },
        Err(err) => ListFetch::Err(err),
    }
}

/// Returns true when a server reports the JSON-RPC method-not-found code.
pub fn is_method_not_found(message: &ServerMessage) -> bool {
    matches!(
        message,
        ServerMessage::Error(error) if error.error.code == MCP_METHOD_NOT_FOUND
    )
}
