//! Error types for the engine

use crate::core_protocol::ProtocolError;
use thiserror::Error;

pub type ConnectResult<T> = Result<T, ConnectError>;
pub type TemplateResult<T> = Result<T, TemplateError>;
pub type RenderResult<T> = Result<T, RenderError>;
pub type QrResult<T> = Result<T, QrError>;

/// Session establishment failed. Never retried internally.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("failed to open pairing stream: {0}")]
    PairingStream(ProtocolError),

    #[error("failed to connect: {0}")]
    Connect(ProtocolError),

    #[error("session establishment already in progress")]
    AlreadyEstablishing,
}

/// One recipient could not be reached. Counted, never propagated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("send to {recipient} failed: {source}")]
pub struct SendError {
    pub recipient: String,
    pub source: ProtocolError,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// Non-numeric, zero or negative id; rejected before any lookup
    #[error("Invalid template ID: {0}")]
    InvalidId(String),

    #[error("Template not found: {0}")]
    NotFound(u64),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Placeholder substitution failed. Offsets are byte positions in the content.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("unclosed placeholder starting at byte {0}")]
    Unclosed(usize),

    #[error("empty placeholder at byte {0}")]
    Empty(usize),

    #[error("invalid placeholder name '{name}' at byte {offset}")]
    InvalidName { name: String, offset: usize },

    #[error("unmatched '}}' at byte {0}")]
    UnmatchedClose(usize),

    #[error("no value bound for placeholder '{0}'")]
    Unbound(String),
}

/// A pairing code could not be turned into an image
#[derive(Debug, Error)]
pub enum QrError {
    #[error("cannot encode pairing code: {0}")]
    Encode(qrcode::types::QrError),

    #[error("cannot write PNG: {0}")]
    Png(#[from] image::ImageError),
}
