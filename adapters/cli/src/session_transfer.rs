#![allow(clippy::missing_errors_doc)]

use std::{collections::BTreeMap, error::Error, fmt};

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use geocoin_core::RecordKind;
use serde::{Deserialize, Serialize};

const TRANSFER_DOMAIN: &str = "geocoin";
const TRANSFER_VERSION: &str = "v1";

/// Identifier prefix emitted before the encoded session payload.
pub(crate) const TRANSFER_HEADER: &str = "geocoin:v1";
/// Delimiter used to separate the prefix, version and payload.
const FIELD_DELIMITER: char = ':';

/// Every persisted record of a session, packed for moving between machines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SessionTransfer {
    /// Stored records keyed by record name.
    pub(crate) records: BTreeMap<String, String>,
}

impl SessionTransfer {
    /// Encodes the session into a single-line string suitable for clipboard transfer.
    #[must_use]
    pub(crate) fn encode(&self) -> String {
        let payload = SerializableSession {
            records: self.records.clone(),
        };
        let json = serde_json::to_vec(&payload).expect("session serialization never fails");
        let encoded = STANDARD_NO_PAD.encode(json);
        format!("{TRANSFER_HEADER}{FIELD_DELIMITER}{encoded}")
    }

    /// Decodes a session from the provided string representation.
    pub(crate) fn decode(value: &str) -> Result<Self, SessionTransferError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SessionTransferError::EmptyPayload);
        }

        let mut parts = trimmed.splitn(3, FIELD_DELIMITER);
        let domain = parts.next().ok_or(SessionTransferError::MissingPrefix)?;
        let version = parts.next().ok_or(SessionTransferError::MissingVersion)?;
        let payload = parts
            .next()
            .filter(|payload| !payload.is_empty())
            .ok_or(SessionTransferError::MissingPayload)?;

        if domain != TRANSFER_DOMAIN {
            return Err(SessionTransferError::InvalidPrefix(domain.to_owned()));
        }
        if version != TRANSFER_VERSION {
            return Err(SessionTransferError::UnsupportedVersion(version.to_owned()));
        }

        let bytes = STANDARD_NO_PAD
            .decode(payload.as_bytes())
            .map_err(SessionTransferError::InvalidEncoding)?;
        let decoded: SerializableSession =
            serde_json::from_slice(&bytes).map_err(SessionTransferError::InvalidPayload)?;

        if let Some(unknown) = decoded
            .records
            .keys()
            .find(|key| !RecordKind::ALL.iter().any(|record| record.key() == key.as_str()))
        {
            return Err(SessionTransferError::UnknownRecord(unknown.clone()));
        }

        Ok(Self {
            records: decoded.records,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct SerializableSession {
    records: BTreeMap<String, String>,
}

/// Errors that can occur while decoding session transfer strings.
#[derive(Debug)]
pub(crate) enum SessionTransferError {
    /// The provided string was empty or contained only whitespace.
    EmptyPayload,
    /// The prefix segment was missing from the encoded session.
    MissingPrefix,
    /// The encoded session did not contain a version segment.
    MissingVersion,
    /// The encoded session did not include the payload segment.
    MissingPayload,
    /// The encoded session used an unexpected prefix segment.
    InvalidPrefix(String),
    /// The encoded session used an unsupported version identifier.
    UnsupportedVersion(String),
    /// The base64 payload could not be decoded.
    InvalidEncoding(base64::DecodeError),
    /// The decoded payload could not be deserialised.
    InvalidPayload(serde_json::Error),
    /// The payload carried a record this version does not know.
    UnknownRecord(String),
}

impl fmt::Display for SessionTransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPayload => write!(f, "session payload was empty"),
            Self::MissingPrefix => write!(f, "session string is missing the prefix"),
            Self::MissingVersion => write!(f, "session string is missing the version"),
            Self::MissingPayload => write!(f, "session string is missing the payload"),
            Self::InvalidPrefix(prefix) => write!(f, "session prefix '{prefix}' is not supported"),
            Self::UnsupportedVersion(version) => {
                write!(f, "session version '{version}' is not supported")
            }
            Self::InvalidEncoding(error) => {
                write!(f, "could not decode session payload: {error}")
            }
            Self::InvalidPayload(error) => {
                write!(f, "could not parse session payload: {error}")
            }
            Self::UnknownRecord(record) => {
                write!(f, "session payload carries unknown record '{record}'")
            }
        }
    }
}

impl Error for SessionTransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidEncoding(error) => Some(error),
            Self::InvalidPayload(error) => Some(error),
            _ => None,
        }
    }
}
