use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("credential endpoint error: {0}")]
    Credential(String),

    #[error("SDP exchange failed: {0}")]
    SdpExchange(String),

    #[error("peer connection error: {0}")]
    Peer(#[from] webrtc::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
