//! WebSocket implementation of [`PushConnector`].

use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use url::Url;

use crate::error::Result;
use crate::transport::{FrameStream, PushConnector, Subscription};

/// Dials `{base}/{domain}?scope=a,b,c&mode=latest|full`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base: Url,
}

impl WebSocketConnector {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn endpoint(&self, subscription: &Subscription) -> Result<Url> {
        let mut url = self.base.join(subscription.domain.path())?;
        let scope = subscription
            .scope
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",");
        url.query_pairs_mut()
            .append_pair("scope", &scope)
            .append_pair("mode", subscription.mode.as_query());
        Ok(url)
    }
}

#[async_trait]
impl PushConnector for WebSocketConnector {
    async fn open(&self, subscription: &Subscription) -> Result<FrameStream> {
        let url = self.endpoint(subscription)?;
        debug!(url = %url, "Dialing push endpoint");

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (_sink, stream) = ws_stream.split();

        let frames = stream.filter_map(|msg| async move {
            match msg {
                Ok(msg @ (WsMessage::Text(_) | WsMessage::Binary(_))) => match msg.to_text() {
                    Ok(text) => Some(Ok(text.to_owned())),
                    Err(e) => {
                        warn!(error = %e, "Ignoring non UTF-8 push frame");
                        None
                    }
                },
                // The close frame is followed by the end of the stream.
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            }
        });

        Ok(frames.boxed())
    }
}
