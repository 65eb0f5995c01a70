use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Invalid payload for event '{0}': {1}")]
    Payload(String, String),
}
