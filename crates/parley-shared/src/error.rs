use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed push frame: {0}")]
    Malformed(#[source] serde_json::Error),
}
