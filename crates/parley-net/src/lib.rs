// REST and push networking for the Parley sync core.

pub mod api;
pub mod conflate;
pub mod error;
pub mod transport;
pub mod websocket;

pub use api::{ChatApi, HttpChatApi};
pub use error::{NetError, Result};
pub use transport::{EventTransport, FrameStream, PushConnector, Subscription, Updates};
pub use websocket::WebSocketConnector;
