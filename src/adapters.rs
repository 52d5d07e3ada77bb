use anyhow::Result;
use futures_util::Sink;
use http::HeaderValue;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

pub mod maibot;
pub mod onebot;

pub type TraitSink =
    Box<dyn Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin>;

/// 连接断开时为 None
pub type LockedWriter = Arc<AsyncMutex<Option<TraitSink>>>;

/// 构造 WebSocket 握手请求并附加额外请求头
pub fn ws_request(url: &str, headers: &[(&'static str, String)]) -> Result<Request> {
    let mut request = url.into_client_request()?;
    for (name, value) in headers {
        if value.is_empty() {
            continue;
        }
        request
            .headers_mut()
            .insert(*name, HeaderValue::from_str(value)?);
    }
    Ok(request)
}
