//! LOAD DATA LOCAL INFILE sub-protocol.

use hermes_mysql::{Conn, Error, Opts};

use crate::{accept_handshake, read_packet, test_opts, write_packet};

#[tokio::test]
async fn streams_file_then_empty_packet_then_reads_ok() {
    let dir = std::env::temp_dir().join(format!("hermes-infile-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join("x.csv");
    tokio::fs::write(&path, b"1,alpha\n2,beta\n").await.unwrap();
    let path_str = path.to_str().unwrap().to_string();

    let (client, mut server) = tokio::io::duplex(1 << 16);

    let server_path = path_str.clone();
    let server_task = tokio::spawn(async move {
        accept_handshake(&mut server).await;

        let (_, cmd) = read_packet(&mut server).await;
        assert_eq!(cmd[0], 0x03);

        // request the file
        let mut request = vec![0xFB];
        request.extend_from_slice(server_path.as_bytes());
        write_packet(&mut server, 1, &request).await;

        // file content packets, then the empty terminator
        let mut content = Vec::new();
        loop {
            let (_, chunk) = read_packet(&mut server).await;
            if chunk.is_empty() {
                break;
            }
            content.extend_from_slice(&chunk);
        }
        assert_eq!(content, b"1,alpha\n2,beta\n");

        // final OK carries affected rows; file fits one packet, so seq 4
        write_packet(&mut server, 4, &[0x00, 0x02, 0x00, 0x02, 0x00, 0x00, 0x00]).await;
    });

    let opts = Opts {
        local_infile: true,
        ..test_opts()
    };
    let mut conn = Conn::from_stream(client, opts).await.unwrap();
    let result = conn
        .query(&format!("LOAD DATA LOCAL INFILE '{path_str}' INTO TABLE t"))
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(conn.affected_rows(), 2);

    server_task.await.unwrap();
    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

#[tokio::test]
async fn disabled_local_infile_still_completes_the_exchange() {
    let (client, mut server) = tokio::io::duplex(1 << 16);

    let server_task = tokio::spawn(async move {
        accept_handshake(&mut server).await;

        let (_, cmd) = read_packet(&mut server).await;
        assert_eq!(cmd[0], 0x03);
        write_packet(&mut server, 1, b"\xFB/etc/passwd").await;

        // client must still send the empty terminator
        let (seq, chunk) = read_packet(&mut server).await;
        assert_eq!(seq, 2);
        assert!(chunk.is_empty());
        write_packet(&mut server, 3, &crate::ok_payload(0, 0x0002)).await;

        // connection remains usable afterwards
        let (seq, cmd) = read_packet(&mut server).await;
        assert_eq!((seq, cmd[0]), (0, 0x0E));
        write_packet(&mut server, 1, &crate::ok_payload(0, 0x0002)).await;
    });

    let mut conn = Conn::from_stream(client, test_opts()).await.unwrap();
    let err = conn.query("LOAD DATA LOCAL INFILE ...").await.unwrap_err();
    assert!(matches!(err, Error::Client(_)));
    assert!(!conn.is_closed());
    conn.ping().await.unwrap();

    server_task.await.unwrap();
}
