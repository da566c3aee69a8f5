// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors raised while building or decoding a [`Record`](crate::record::Record).

use thiserror::Error;

/// Errors that can occur when constructing or reading a record payload.
///
/// Both variants are local to the caller: nothing has been enqueued yet, so the
/// caller may correct the input and try again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The payload is not text, bytes or a key/value map.
    ///
    /// `kind` names the rejected shape (`null`, `array`, `number`, `bool`).
    #[error("invalid payload kind '{kind}': a record holds text, bytes or a key/value map")]
    InvalidPayloadKind { kind: &'static str },

    /// A textual payload could not be decoded as structured data.
    #[error("record payload is not JSON parsable: {reason}")]
    NotParsable { reason: String },
}
