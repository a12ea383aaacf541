//! Prepared statement lifecycle over the binary protocol.

use hermes_mysql::{Conn, Value};

use crate::{
    accept_handshake, eof_payload, field_payload, ok_payload, read_packet, test_opts,
    write_packet,
};

fn prepare_ok_payload(id: u32, columns: u16, params: u16) -> Vec<u8> {
    let mut payload = vec![0x00];
    payload.extend_from_slice(&id.to_le_bytes());
    payload.extend_from_slice(&columns.to_le_bytes());
    payload.extend_from_slice(&params.to_le_bytes());
    payload.push(0);
    payload.extend_from_slice(&0u16.to_le_bytes());
    payload
}

#[tokio::test]
async fn prepare_execute_close_lifecycle() {
    let (client, mut server) = tokio::io::duplex(1 << 16);

    let server_task = tokio::spawn(async move {
        accept_handshake(&mut server).await;

        // COM_STMT_PREPARE
        let (seq, cmd) = read_packet(&mut server).await;
        assert_eq!(seq, 0);
        assert_eq!(cmd[0], 0x16);
        assert_eq!(&cmd[1..], b"select ? + ?");

        write_packet(&mut server, 1, &prepare_ok_payload(7, 1, 2)).await;
        write_packet(&mut server, 2, &field_payload("?", 0xfd, 0)).await;
        write_packet(&mut server, 3, &field_payload("?", 0xfd, 0)).await;
        write_packet(&mut server, 4, &eof_payload(0x0002)).await;
        write_packet(&mut server, 5, &field_payload("sum", 0xf6, 0)).await;
        write_packet(&mut server, 6, &eof_payload(0x0002)).await;

        // COM_STMT_EXECUTE
        let (seq, cmd) = read_packet(&mut server).await;
        assert_eq!(seq, 0);
        assert_eq!(cmd[0], 0x17);
        assert_eq!(&cmd[1..5], &7u32.to_le_bytes()); // statement id
        assert_eq!(cmd[5], 0); // no cursor
        assert_eq!(&cmd[6..10], &1u32.to_le_bytes()); // iteration count
        assert_eq!(cmd[10], 0x00); // null bitmap
        assert_eq!(cmd[11], 0x01); // new params bound
        assert_eq!(&cmd[12..16], &[0x08, 0x00, 0x08, 0x00]); // LONGLONG, signed
        assert_eq!(&cmd[16..24], &[2, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&cmd[24..32], &[3, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(cmd.len(), 32);

        write_packet(&mut server, 1, &[0x01]).await; // one column
        write_packet(&mut server, 2, &field_payload("sum", 0xf6, 0)).await;
        write_packet(&mut server, 3, &eof_payload(0x0002)).await;
        // binary row: header, null bitmap, LCS "5"
        write_packet(&mut server, 4, &[0x00, 0x00, 0x01, b'5']).await;
        write_packet(&mut server, 5, &eof_payload(0x0002)).await;

        // COM_STMT_CLOSE, no reply
        let (seq, cmd) = read_packet(&mut server).await;
        assert_eq!(seq, 0);
        assert_eq!(cmd[0], 0x19);
        assert_eq!(&cmd[1..5], &7u32.to_le_bytes());
    });

    let mut conn = Conn::from_stream(client, test_opts()).await.unwrap();

    let mut stmt = conn.prepare("select ? + ?").await.unwrap();
    assert_eq!(stmt.id(), 7);
    assert_eq!(stmt.param_count(), 2);
    assert_eq!(stmt.column_count(), 1);

    let mut result = stmt
        .execute(&[Value::Int(2), Value::Int(3)])
        .await
        .unwrap()
        .unwrap();
    let row = result.fetch_row().unwrap();
    assert_eq!(row[0], Value::Bytes(b"5".to_vec()));

    stmt.close().await.unwrap();
    server_task.await.unwrap();
}

#[tokio::test]
async fn execute_arity_mismatch_is_client_error() {
    let (client, mut server) = tokio::io::duplex(1 << 16);

    let server_task = tokio::spawn(async move {
        accept_handshake(&mut server).await;

        let (_, cmd) = read_packet(&mut server).await;
        assert_eq!(cmd[0], 0x16);
        write_packet(&mut server, 1, &prepare_ok_payload(3, 0, 2)).await;
        write_packet(&mut server, 2, &field_payload("?", 0xfd, 0)).await;
        write_packet(&mut server, 3, &field_payload("?", 0xfd, 0)).await;
        write_packet(&mut server, 4, &eof_payload(0x0002)).await;

        // dropped statement: close arrives before the next command
        let (seq, cmd) = read_packet(&mut server).await;
        assert_eq!((seq, cmd[0]), (0, 0x19));
        assert_eq!(&cmd[1..5], &3u32.to_le_bytes());

        let (seq, cmd) = read_packet(&mut server).await;
        assert_eq!((seq, cmd[0]), (0, 0x0E));
        write_packet(&mut server, 1, &ok_payload(0, 0x0002)).await;
    });

    let mut conn = Conn::from_stream(client, test_opts()).await.unwrap();
    {
        let mut stmt = conn.prepare("insert into t values (?, ?)").await.unwrap();
        let err = stmt.execute(&[Value::Int(1)]).await.unwrap_err();
        assert_eq!(err.errno(), 0);
        assert!(err.to_string().contains("2 parameters"));
        // dropped without close: the id goes onto the deferred queue
    }
    conn.ping().await.unwrap();

    server_task.await.unwrap();
}

#[tokio::test]
async fn execute_without_rows_returns_none() {
    let (client, mut server) = tokio::io::duplex(1 << 16);

    let server_task = tokio::spawn(async move {
        accept_handshake(&mut server).await;

        let (_, cmd) = read_packet(&mut server).await;
        assert_eq!(cmd[0], 0x16);
        write_packet(&mut server, 1, &prepare_ok_payload(11, 0, 1)).await;
        write_packet(&mut server, 2, &field_payload("?", 0xfd, 0)).await;
        write_packet(&mut server, 3, &eof_payload(0x0002)).await;

        let (_, cmd) = read_packet(&mut server).await;
        assert_eq!(cmd[0], 0x17);
        // NULL parameter: bitmap bit 0 set, no value bytes follow the types
        assert_eq!(cmd[10], 0x01);
        assert_eq!(cmd[11], 0x01);
        assert_eq!(cmd.len(), 14);
        write_packet(&mut server, 1, &ok_payload(1, 0x0002)).await;

        let (_, cmd) = read_packet(&mut server).await;
        assert_eq!(cmd[0], 0x19);
    });

    let mut conn = Conn::from_stream(client, test_opts()).await.unwrap();
    let mut stmt = conn.prepare("insert into t values (?)").await.unwrap();
    let result = stmt.execute(&[Value::Null]).await.unwrap();
    assert!(result.is_none());
    stmt.close().await.unwrap();
    assert_eq!(conn.affected_rows(), 1);

    server_task.await.unwrap();
}
