use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

use super::packet::{capabilities::*, MAX_ALLOWED_PACKET};
use super::wire;

/// Protocol version this driver speaks.
pub const PROTOCOL_VERSION: u8 = 10;

/// MySQL initial handshake packet (server -> client)
#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub thread_id: u32,
    pub capability_flags: u32,
    pub character_set: u8,
    pub status_flags: u16,
    /// 20-byte scramble assembled from both halves of the payload.
    pub scramble: Vec<u8>,
}

impl InitialHandshake {
    /// Parse from packet payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;

        let protocol_version = wire::read_u8(&mut buf)?;
        if protocol_version != PROTOCOL_VERSION {
            return Err(Error::protocol(format!(
                "unsupported protocol version {protocol_version}"
            )));
        }

        let server_version =
            String::from_utf8_lossy(wire::read_null_terminated(&mut buf)?).to_string();
        let thread_id = wire::read_u32_le(&mut buf)?;

        let scramble_part1 = wire::take(&mut buf, 8)?.to_vec();
        // filler
        wire::read_u8(&mut buf)?;

        let capability_flags_lower = wire::read_u16_le(&mut buf)? as u32;
        let character_set = wire::read_u8(&mut buf)?;
        let status_flags = wire::read_u16_le(&mut buf)?;
        let capability_flags_upper = wire::read_u16_le(&mut buf)? as u32;
        let capability_flags = capability_flags_lower | (capability_flags_upper << 16);

        // scramble length byte and 10 reserved bytes, both unused by 4.1 clients
        wire::read_u8(&mut buf)?;
        wire::take(&mut buf, 10)?;

        let scramble_part2 = wire::read_null_terminated(&mut buf)?;
        if scramble_part2.len() < 12 {
            return Err(Error::protocol("short scramble in handshake"));
        }

        let mut scramble = scramble_part1;
        scramble.extend_from_slice(scramble_part2);

        Ok(Self {
            protocol_version,
            server_version,
            thread_id,
            capability_flags,
            character_set,
            status_flags,
            scramble,
        })
    }

    /// Server version packed as `major*10000 + minor*100 + patch`.
    pub fn server_version_number(&self) -> u32 {
        let mut parts = self
            .server_version
            .split(|c: char| !c.is_ascii_digit())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<u32>().unwrap_or(0));
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        let patch = parts.next().unwrap_or(0);
        major * 10_000 + minor * 100 + patch
    }
}

/// MySQL handshake response packet (client -> server)
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub capability_flags: u32,
    pub character_set: u8,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
}

impl HandshakeResponse {
    /// Encode to a command payload
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        buf.put_u32_le(self.capability_flags);
        buf.put_u32_le(MAX_ALLOWED_PACKET);
        buf.put_u8(self.character_set);

        // Reserved (23 bytes)
        buf.extend_from_slice(&[0u8; 23]);

        // Username
        buf.extend_from_slice(self.username.as_bytes());
        buf.put_u8(0);

        // Scrambled password (length-prefixed, empty for no password)
        wire::put_lcs(&mut buf, &self.auth_response);

        // Database
        if self.capability_flags & CLIENT_CONNECT_WITH_DB != 0 {
            if let Some(ref db) = self.database {
                buf.extend_from_slice(db.as_bytes());
            }
            buf.put_u8(0);
        }

        buf.freeze()
    }
}

/// Compute the native 4.1 auth token:
/// `SHA1(password) XOR SHA1(scramble || SHA1(SHA1(password)))`.
pub fn compute_auth_response(password: &[u8], scramble: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    // SHA1(password)
    let mut hasher = Sha1::new();
    hasher.update(password);
    let stage1 = hasher.finalize();

    // SHA1(SHA1(password))
    let mut hasher = Sha1::new();
    hasher.update(stage1);
    let stage2 = hasher.finalize();

    // SHA1(scramble + SHA1(SHA1(password)))
    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(stage2);
    let mask = hasher.finalize();

    stage1
        .iter()
        .zip(mask.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}
