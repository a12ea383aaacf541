//! Protocol scenario tests against a scripted in-process server.
//!
//! Each test owns both halves of a `tokio::io::duplex` pipe: the client
//! half becomes a [`Conn`] via `Conn::from_stream`, the server half is
//! driven by a spawned task that replays a wire transcript and asserts
//! on the bytes the driver sends.

mod handshake;
mod infile;
mod prepared;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use hermes_mysql::Opts;

/// Scramble advertised by the scripted server.
pub const SALT: &[u8] = b"123456789ABCDEFGHIJK";

/// Options matching the scripted server's handshake.
pub fn test_opts() -> Opts {
    Opts {
        user: "u".to_string(),
        password: "p".to_string(),
        database: Some("d".to_string()),
        ..Opts::default()
    }
}

/// Encode one frame: 3-byte length, sequence id, payload.
pub fn frame(seq: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&[
        (payload.len() & 0xFF) as u8,
        ((payload.len() >> 8) & 0xFF) as u8,
        ((payload.len() >> 16) & 0xFF) as u8,
        seq,
    ]);
    out.extend_from_slice(payload);
    out
}

pub async fn write_packet(stream: &mut DuplexStream, seq: u8, payload: &[u8]) {
    stream.write_all(&frame(seq, payload)).await.unwrap();
}

pub async fn read_packet(stream: &mut DuplexStream) -> (u8, Vec<u8>) {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.unwrap();
    let len = header[0] as usize | (header[1] as usize) << 8 | (header[2] as usize) << 16;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    (header[3], payload)
}

/// Initial handshake payload: protocol 10, version 5.1.34, thread id 42,
/// utf8 charset, autocommit status, scramble split 8 + 12.
pub fn handshake_payload() -> Vec<u8> {
    let mut payload = Vec::new();
    payload.push(10);
    payload.extend_from_slice(b"5.1.34\0");
    payload.extend_from_slice(&42u32.to_le_bytes());
    payload.extend_from_slice(&SALT[..8]);
    payload.push(0);
    payload.extend_from_slice(&0xF7FFu16.to_le_bytes());
    payload.push(33);
    payload.extend_from_slice(&0x0002u16.to_le_bytes());
    payload.extend_from_slice(&0x0000u16.to_le_bytes());
    payload.push(21);
    payload.extend_from_slice(&[0u8; 10]);
    payload.extend_from_slice(&SALT[8..]);
    payload.push(0);
    payload
}

/// Minimal OK payload with the given status flags.
pub fn ok_payload(affected_rows: u8, status: u16) -> Vec<u8> {
    let mut payload = vec![0x00, affected_rows, 0x00];
    payload.extend_from_slice(&status.to_le_bytes());
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload
}

/// EOF payload with the given status flags.
pub fn eof_payload(status: u16) -> Vec<u8> {
    let mut payload = vec![0xFE];
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload.extend_from_slice(&status.to_le_bytes());
    payload
}

/// Column definition payload.
pub fn field_payload(name: &str, column_type: u8, flags: u16) -> Vec<u8> {
    let mut payload = Vec::new();
    for s in [&b"def"[..], b"d", b"t", b"t", name.as_bytes(), name.as_bytes()] {
        payload.push(s.len() as u8);
        payload.extend_from_slice(s);
    }
    payload.push(0x0C);
    payload.extend_from_slice(&33u16.to_le_bytes());
    payload.extend_from_slice(&20u32.to_le_bytes());
    payload.push(column_type);
    payload.extend_from_slice(&flags.to_le_bytes());
    payload.push(0);
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload
}

/// Serve the handshake exchange and answer the auth packet with OK.
/// Returns the raw auth payload for inspection.
pub async fn accept_handshake(server: &mut DuplexStream) -> Vec<u8> {
    write_packet(server, 0, &handshake_payload()).await;
    let (seq, auth) = read_packet(server).await;
    assert_eq!(seq, 1, "auth packet must continue the handshake sequence");
    write_packet(server, 2, &ok_payload(0, 0x0002)).await;
    auth
}
