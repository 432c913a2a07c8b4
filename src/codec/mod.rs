//! CIP wire codec: EPATH segments, request/response framing, and the
//! Unconnected_Send / Multiple_Service_Packet envelopes.
//!
//! Framing is parameterized by [`FramingOptions`], which is process-wide
//! configuration rather than per-call state — real captures we're modeling
//! rarely mix framing conventions mid-scenario, so treating it like a
//! connection-level setting (set once, read many times) matches usage.

pub mod envelope;
pub mod epath;
pub mod request;
pub mod response;

pub use envelope::{build_multiple_service, build_unconnected_send, parse_multiple_service, parse_unconnected_send};
pub use epath::{decode_epath, encode_epath, looks_like_epath, CipPath, EpathDecode};
pub use request::{decode_request, encode_request, CipRequest};
pub use response::{decode_response, encode_response, CipResponse};

use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramingOptions {
    pub byte_order: ByteOrder,
    pub include_path_size: bool,
    pub include_resp_reserved: bool,
    pub use_cpf: bool,
}

impl Default for FramingOptions {
    fn default() -> Self {
        FramingOptions {
            byte_order: ByteOrder::Little,
            include_path_size: true,
            include_resp_reserved: true,
            use_cpf: true,
        }
    }
}

lazy_static::lazy_static! {
    static ref FRAMING: RwLock<FramingOptions> = RwLock::new(FramingOptions::default());
}

/// Reads the current process-wide framing options.
pub fn framing() -> FramingOptions {
    *FRAMING.read().expect("framing options lock poisoned")
}

/// Replaces the process-wide framing options. Intended to be called once per
/// scenario, not per message — see the module docs.
pub fn set_framing(opts: FramingOptions) {
    *FRAMING.write().expect("framing options lock poisoned") = opts;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TooShort,
    InvalidSegment,
    BadPathSize,
    BadExtStatusSize,
    BadSymbolLength,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("codec error: {kind:?} at offset {offset} (expected {expected}, got {got})")]
pub struct CodecError {
    pub kind: ErrorKind,
    pub offset: usize,
    pub expected: usize,
    pub got: usize,
}

impl CodecError {
    pub fn too_short(offset: usize, expected: usize, got: usize) -> Self {
        CodecError { kind: ErrorKind::TooShort, offset, expected, got }
    }

    pub fn invalid_segment(offset: usize) -> Self {
        CodecError { kind: ErrorKind::InvalidSegment, offset, expected: 0, got: 0 }
    }

    pub fn bad_path_size(offset: usize, expected: usize, got: usize) -> Self {
        CodecError { kind: ErrorKind::BadPathSize, offset, expected, got }
    }

    pub fn bad_ext_status_size(offset: usize, expected: usize, got: usize) -> Self {
        CodecError { kind: ErrorKind::BadExtStatusSize, offset, expected, got }
    }

    pub fn bad_symbol_length(offset: usize) -> Self {
        CodecError { kind: ErrorKind::BadSymbolLength, offset, expected: 0, got: 0 }
    }
}
