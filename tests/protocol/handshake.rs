//! Connect-time behaviour: auth packet layout, scramble, auth failure,
//! init command.

use hermes_mysql::protocol::capabilities::*;
use hermes_mysql::protocol::compute_auth_response;
use hermes_mysql::{Conn, Error, Opts};

use crate::{accept_handshake, ok_payload, read_packet, test_opts, write_packet, SALT};

fn le32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[tokio::test]
async fn auth_packet_carries_scrambled_password() {
    let (client, mut server) = tokio::io::duplex(1 << 16);

    let server_task = tokio::spawn(async move {
        let auth = accept_handshake(&mut server).await;

        let flags = le32(&auth[..4]);
        assert_ne!(flags & CLIENT_PROTOCOL_41, 0);
        assert_ne!(flags & CLIENT_SECURE_CONNECTION, 0);
        assert_ne!(flags & CLIENT_LONG_PASSWORD, 0);
        assert_ne!(flags & CLIENT_CONNECT_WITH_DB, 0);
        assert_eq!(le32(&auth[4..8]), 1 << 30); // max packet
        assert_eq!(auth[8], 33); // charset
        assert!(auth[9..32].iter().all(|&b| b == 0)); // reserved

        let mut rest = &auth[32..];
        let nul = rest.iter().position(|&b| b == 0).unwrap();
        assert_eq!(&rest[..nul], b"u");
        rest = &rest[nul + 1..];

        let token_len = rest[0] as usize;
        assert_eq!(token_len, 20);
        let token = &rest[1..1 + token_len];
        assert_eq!(token, compute_auth_response(b"p", SALT).as_slice());
        rest = &rest[1 + token_len..];

        let nul = rest.iter().position(|&b| b == 0).unwrap();
        assert_eq!(&rest[..nul], b"d");
    });

    let conn = Conn::from_stream(client, test_opts()).await.unwrap();
    assert_eq!(conn.server_version(), "5.1.34");
    assert_eq!(conn.server_version_number(), 50134);
    assert_eq!(conn.thread_id(), 42);
    assert_eq!(conn.charset_name(), "utf8");
    assert_eq!(conn.server_status(), 0x0002);
    server_task.await.unwrap();
}

#[tokio::test]
async fn empty_password_sends_empty_token() {
    let (client, mut server) = tokio::io::duplex(1 << 16);

    let server_task = tokio::spawn(async move {
        let auth = accept_handshake(&mut server).await;
        let mut rest = &auth[32..];
        let nul = rest.iter().position(|&b| b == 0).unwrap();
        rest = &rest[nul + 1..];
        assert_eq!(rest[0], 0, "empty password must yield an empty LCS");
    });

    let opts = Opts {
        user: "anon".to_string(),
        ..Opts::default()
    };
    Conn::from_stream(client, opts).await.unwrap();
    server_task.await.unwrap();
}

#[tokio::test]
async fn auth_rejection_surfaces_server_error() {
    let (client, mut server) = tokio::io::duplex(1 << 16);

    let server_task = tokio::spawn(async move {
        write_packet(&mut server, 0, &crate::handshake_payload()).await;
        let _ = read_packet(&mut server).await;
        let mut err = vec![0xFF, 0x15, 0x04, b'#'];
        err.extend_from_slice(b"28000");
        err.extend_from_slice(b"Access denied for user 'u'");
        write_packet(&mut server, 2, &err).await;
    });

    let result = Conn::from_stream(client, test_opts()).await;
    match result {
        Err(e @ Error::Server { .. }) => {
            assert_eq!(e.errno(), 1045);
            assert_eq!(e.sqlstate(), "28000");
        }
        other => panic!("expected server error, got {other:?}"),
    }
    server_task.await.unwrap();
}

#[tokio::test]
async fn init_command_runs_after_auth() {
    let (client, mut server) = tokio::io::duplex(1 << 16);

    let server_task = tokio::spawn(async move {
        accept_handshake(&mut server).await;
        let (seq, cmd) = read_packet(&mut server).await;
        assert_eq!(seq, 0);
        assert_eq!(cmd[0], 0x03);
        assert_eq!(&cmd[1..], b"SET time_zone='+00:00'");
        write_packet(&mut server, 1, &ok_payload(0, 0x0002)).await;
    });

    let opts = Opts {
        init_command: Some("SET time_zone='+00:00'".to_string()),
        ..test_opts()
    };
    Conn::from_stream(client, opts).await.unwrap();
    server_task.await.unwrap();
}
