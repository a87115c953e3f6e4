use super::{
    apply_streamable_http_client_post_headers, apply_streamable_http_protocol_version_header,
    client_details_for, protocol, McpClient, MCP_SESSION_ID_HEADER,
};
use crate::mcp::transport::streamable_http::next_sse_server_message;
use crate::utils::sse::is_event_stream_content_type;
use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
    ServerMessage,
};
use rust_mcp_schema::RequestId;
use tracing::debug;

impl McpClient {
    /// Runs the initialize handshake and records the server's details and
    /// negotiated protocol version. Any previous session is discarded.
    pub async fn initialize(&self) -> Result<(), String> {
        {
            let mut session = self.session.write().await;
            session.session_id = None;
            session.negotiated_protocol_version = None;
        }

        let client_details = client_details_for(&self.config);
        let response = self
            .send_request(RequestFromClient::InitializeRequest(client_details))
            .await?;
        let initialize = protocol::parse_initialize_result(response)?;
        debug!(
            server = %self.base_url,
            protocol_version = %initialize.protocol_version,
            server_name = %initialize.server_info.name,
            "MCP session initialized"
        );

        let has_session = {
            let mut session = self.session.write().await;
            session.negotiated_protocol_version = Some(initialize.protocol_version.clone());
            session.server_details = Some(initialize);
            session.session_id.is_some()
        };
        if !has_session {
            debug!(server = %self.base_url, "Server did not assign a session id");
        }

        self.send_notification(NotificationFromClient::InitializedNotification(None))
            .await
    }

    pub(crate) async fn send_request(
        &self,
        request: RequestFromClient,
    ) -> Result<ServerMessage, String> {
        let request_id = self.next_request_id();
        let message = ClientMessage::from_message(
            MessageFromClient::RequestFromClient(request),
            Some(RequestId::Integer(request_id)),
        )
        .map_err(|err| err.to_string())?;

        let response = self.post_message(&message).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        if is_event_stream_content_type(&content_type) {
            next_sse_server_message(response, |message| {
                if !matches!(
                    message,
                    ServerMessage::Response(_) | ServerMessage::Error(_)
                ) {
                    debug!(server = %self.base_url, "Ignoring server-initiated MCP message");
                }
            })
            .await
        } else {
            let body = response.bytes().await.map_err(|err| err.to_string())?;
            serde_json::from_slice::<ServerMessage>(&body).map_err(|err| err.to_string())
        }
    }

    async fn send_notification(&self, notification: NotificationFromClient) -> Result<(), String> {
        let message = ClientMessage::from_message(
            MessageFromClient::NotificationFromClient(notification),
            None,
        )
        .map_err(|err| err.to_string())?;
        self.post_message(&message).await.map(|_| ())
    }

    /// POSTs one message with the session headers, checks the status and
    /// adopts any session id the server hands back.
    async fn post_message(&self, message: &ClientMessage) -> Result<reqwest::Response, String> {
        let payload = serde_json::to_string(message).map_err(|err| err.to_string())?;
        let (session_id, protocol_version) = {
            let session = self.session.read().await;
            (
                session.session_id.clone(),
                protocol::effective_protocol_version(
                    &self.config,
                    session.negotiated_protocol_version.as_deref(),
                ),
            )
        };

        debug!(url = %self.base_url, "Sending MCP HTTP request");
        let mut request = apply_streamable_http_protocol_version_header(
            apply_streamable_http_client_post_headers(self.http_client.post(&self.base_url)),
            Some(protocol_version.as_str()),
        )
        .body(payload);

        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }
        if let Some(session_id) = session_id {
            request = request.header(MCP_SESSION_ID_HEADER, session_id);
        }

        let response = request.send().await.map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP error: {}", response.status()));
        }

        if let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
        {
            self.session.write().await.session_id = Some(session_id);
        }

        Ok(response)
    }
}
