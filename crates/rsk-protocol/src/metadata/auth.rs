//! Authentication metadata
//!
//! The first byte is either `0x80 | id` for a well-known scheme or the
//! length of a custom scheme name. Simple credentials follow as a `u16`
//! username length, the username and the remaining bytes as password.
//! Bearer credentials are the remaining bytes as token.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

const WELL_KNOWN_FLAG: u8 = 0x80;
const SIMPLE: u8 = 0x00;
const BEARER: u8 = 0x01;
const MAX_AUTH_TYPE_LENGTH: usize = 0x7F;

/// Credentials carried in an authentication metadata entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    Simple { username: String, password: String },
    Bearer { token: String },
    Custom { auth_type: String, data: Bytes },
}

impl Authentication {
    pub fn simple(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Simple {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        match self {
            Self::Simple { username, password } => {
                if username.len() > u16::MAX as usize {
                    return Err(ProtocolError::Unencodable(format!(
                        "username of {} bytes exceeds {}",
                        username.len(),
                        u16::MAX
                    )));
                }
                buf.put_u8(WELL_KNOWN_FLAG | SIMPLE);
                buf.put_u16(username.len() as u16);
                buf.put_slice(username.as_bytes());
                buf.put_slice(password.as_bytes());
            }
            Self::Bearer { token } => {
                buf.put_u8(WELL_KNOWN_FLAG | BEARER);
                buf.put_slice(token.as_bytes());
            }
            Self::Custom { auth_type, data } => {
                if auth_type.is_empty()
                    || auth_type.len() > MAX_AUTH_TYPE_LENGTH
                    || !auth_type.is_ascii()
                {
                    return Err(ProtocolError::Unencodable(format!(
                        "authentication type {:?} must be 1..=127 ASCII bytes",
                        auth_type
                    )));
                }
                buf.put_u8(auth_type.len() as u8);
                buf.put_slice(auth_type.as_bytes());
                buf.put_slice(data);
            }
        }
        Ok(buf.freeze())
    }

    pub fn decode(mut src: Bytes) -> Result<Self, ProtocolError> {
        if !src.has_remaining() {
            return Err(ProtocolError::truncated("authentication type", 1, 0));
        }
        let first = src.get_u8();
        if first & WELL_KNOWN_FLAG != 0 {
            return match first & 0x7F {
                SIMPLE => {
                    if src.remaining() < 2 {
                        return Err(ProtocolError::truncated(
                            "username length",
                            2,
                            src.remaining(),
                        ));
                    }
                    let len = src.get_u16() as usize;
                    if src.remaining() < len {
                        return Err(ProtocolError::truncated("username", len, src.remaining()));
                    }
                    let username = utf8(src.split_to(len), "username")?;
                    let password = utf8(src, "password")?;
                    Ok(Self::Simple { username, password })
                }
                BEARER => Ok(Self::Bearer {
                    token: utf8(src, "bearer token")?,
                }),
                other => Err(ProtocolError::UnknownAuthType(other)),
            };
        }

        let len = first as usize;
        if len == 0 {
            return Err(ProtocolError::Malformed(
                "empty authentication type".to_string(),
            ));
        }
        if src.remaining() < len {
            return Err(ProtocolError::truncated(
                "authentication type",
                len,
                src.remaining(),
            ));
        }
        let auth_type = src.split_to(len);
        if !auth_type.is_ascii() {
            return Err(ProtocolError::Malformed(
                "authentication type is not ASCII".to_string(),
            ));
        }
        Ok(Self::Custom {
            auth_type: String::from_utf8_lossy(&auth_type).into_owned(),
            data: src,
        })
    }
}

fn utf8(raw: Bytes, what: &str) -> Result<String, ProtocolError> {
    String::from_utf8(raw.to_vec())
        .map_err(|e| ProtocolError::Malformed(format!("{} is not UTF-8: {}", what, e)))
}
