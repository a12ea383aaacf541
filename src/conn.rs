//! Connection establishment, the command façade, and response handling.

use std::future::Future;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, error, warn};

use crate::charset;
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::codec::PacketCodec;
use crate::protocol::handshake::{compute_auth_response, HandshakeResponse, InitialHandshake};
use crate::protocol::packet::{capabilities, status, Command};
use crate::protocol::response::{
    is_eof_packet, is_err_packet, is_local_infile_packet, is_ok_packet, parse_local_infile,
    parse_result_header, EofPacket, ErrPacket, Field, OkPacket, PrepareOk,
};
use crate::resultset::ResultSet;
use crate::stmt::{Statement, StatementInner};
use crate::value;

/// Byte stream usable as a connection transport.
pub trait Socket: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Socket for T {}

/// File bytes are streamed to the server in packets of this size during
/// LOAD DATA LOCAL INFILE; must stay below the max frame payload.
const INFILE_CHUNK: usize = 1 << 20;

/// Snapshot of the most recent OK/EOF terminator.
#[derive(Debug, Clone, Default)]
struct OkSnapshot {
    affected_rows: u64,
    last_insert_id: u64,
    warnings: u16,
    info: String,
}

/// A single MySQL connection.
///
/// Exactly one command exchange runs at a time; every command method
/// takes `&mut self`, which is the mutual-exclusion guard for the whole
/// exchange. Result sets are buffered before they are returned, so
/// iterating them never touches the socket.
pub struct Conn {
    framed: Framed<Box<dyn Socket>, PacketCodec>,
    opts: Opts,
    capabilities: u32,
    charset_number: u8,
    charset_name: String,
    server_version: String,
    server_version_number: u32,
    thread_id: u32,
    status_flags: u16,
    last_ok: OkSnapshot,
    last_error: Option<ErrPacket>,
    closed: bool,
    /// Statement ids dropped without an explicit close; drained before
    /// the next command so the close packets never race an exchange.
    pending_closes: Vec<u32>,
}

impl Conn {
    /// Connect and authenticate using the given options.
    pub async fn connect(opts: Opts) -> Result<Self> {
        let connect_timeout = opts.connect_timeout;
        let stream: Box<dyn Socket> = if opts.uses_socket() {
            connect_unix(&opts.socket, connect_timeout).await?
        } else {
            let host = opts.host.as_deref().unwrap_or_default();
            let addr = format!("{}:{}", host, opts.port);
            debug!(addr = %addr, "connecting");
            let stream = maybe_timeout(connect_timeout, TcpStream::connect(&addr)).await??;
            Box::new(stream)
        };
        Self::handshake(stream, opts).await
    }

    /// Connect using a `mysql://` URL.
    pub async fn connect_url(url: &str) -> Result<Self> {
        Self::connect(Opts::from_url(url)?).await
    }

    /// Connect over an already-established transport. Useful for custom
    /// transports and protocol tests.
    pub async fn from_stream<S: Socket + 'static>(stream: S, opts: Opts) -> Result<Self> {
        Self::handshake(Box::new(stream), opts).await
    }

    async fn handshake(stream: Box<dyn Socket>, opts: Opts) -> Result<Self> {
        let mut conn = Conn {
            framed: Framed::new(stream, PacketCodec::new()),
            opts,
            capabilities: 0,
            charset_number: 0,
            charset_name: String::new(),
            server_version: String::new(),
            server_version_number: 0,
            thread_id: 0,
            status_flags: 0,
            last_ok: OkSnapshot::default(),
            last_error: None,
            closed: false,
            pending_closes: Vec::new(),
        };

        let payload = conn.recv().await?;
        let handshake = InitialHandshake::parse(&payload).map_err(|e| conn.fail(e))?;

        conn.server_version_number = handshake.server_version_number();
        conn.server_version = handshake.server_version.clone();
        conn.thread_id = handshake.thread_id;
        conn.status_flags = handshake.status_flags;

        let cs = match conn.opts.charset.as_deref() {
            Some(name) => charset::by_name(name)
                .ok_or_else(|| Error::client(format!("unknown charset name: {name}")))?,
            None => charset::by_number(handshake.character_set).ok_or_else(|| {
                Error::client(format!(
                    "server default charset {} has no known host encoding",
                    handshake.character_set
                ))
            })?,
        };
        conn.charset_number = cs.number;
        conn.charset_name = cs.name.to_string();

        let mut flags = capabilities::BASE_CAPABILITIES | conn.opts.extra_capabilities;
        if conn.opts.database.is_some() {
            flags |= capabilities::CLIENT_CONNECT_WITH_DB;
        }
        if conn.opts.local_infile {
            flags |= capabilities::CLIENT_LOCAL_FILES;
        }
        conn.capabilities = flags;

        let auth = HandshakeResponse {
            capability_flags: flags,
            character_set: conn.charset_number,
            username: conn.opts.user.clone(),
            auth_response: compute_auth_response(
                conn.opts.password.as_bytes(),
                &handshake.scramble,
            ),
            database: conn.opts.database.clone(),
        };
        conn.send(auth.encode()).await?;

        let payload = conn.recv().await?;
        if is_err_packet(&payload) {
            let err = conn.server_error(&payload);
            error!(error = %err, "authentication failed");
            return Err(err);
        }
        if !is_ok_packet(&payload) {
            return Err(conn.fail(Error::protocol("expected OK after authentication")));
        }
        let ok = OkPacket::parse(&payload).map_err(|e| conn.fail(e))?;
        conn.handle_ok(ok);

        debug!(
            server_version = %conn.server_version,
            thread_id = conn.thread_id,
            charset = %conn.charset_name,
            "connected"
        );

        if conn.opts.charset.is_some() {
            let sql = format!("SET NAMES {}", conn.charset_name);
            conn.query(&sql).await?;
        }
        if let Some(sql) = conn.opts.init_command.clone() {
            conn.query(&sql).await?;
        }
        Ok(conn)
    }

    /// Issue a text query. `None` means the statement produced no result
    /// set; affected rows and insert id are available on the connection.
    pub async fn query(&mut self, sql: &str) -> Result<Option<ResultSet>> {
        self.begin_command(Command::Query, sql.as_bytes()).await?;
        self.read_query_response().await
    }

    /// Whether the server announced another result after the last one.
    pub fn more_results(&self) -> bool {
        self.status_flags & status::SERVER_MORE_RESULTS_EXISTS != 0
    }

    /// Read the next result of a multi-result exchange. Returns `None`
    /// when no further result is pending or the next result carries no
    /// rows (check [`Conn::more_results`] to tell these apart).
    pub async fn next_result(&mut self) -> Result<Option<ResultSet>> {
        if !self.more_results() {
            return Ok(None);
        }
        // same exchange: the sequence counter keeps running
        self.read_query_response().await
    }

    /// Prepare a statement for execution.
    pub async fn prepare(&mut self, sql: &str) -> Result<Statement<'_>> {
        self.begin_command(Command::StmtPrepare, sql.as_bytes())
            .await?;

        let payload = self.recv().await?;
        if is_err_packet(&payload) {
            return Err(self.server_error(&payload));
        }
        let prepare_ok = PrepareOk::parse(&payload).map_err(|e| self.fail(e))?;

        let params = self.read_fields(prepare_ok.param_count as usize, false).await?;
        let columns = self.read_fields(prepare_ok.column_count as usize, false).await?;

        debug!(
            statement_id = prepare_ok.statement_id,
            params = prepare_ok.param_count,
            columns = prepare_ok.column_count,
            "statement prepared"
        );

        Ok(Statement::new(
            self,
            StatementInner {
                id: prepare_ok.statement_id,
                params,
                columns,
                warnings: prepare_ok.warnings,
            },
        ))
    }

    /// Check the server is alive.
    pub async fn ping(&mut self) -> Result<()> {
        self.begin_command(Command::Ping, &[]).await?;
        self.read_ok().await
    }

    /// Change the default database.
    pub async fn select_db(&mut self, db: &str) -> Result<()> {
        self.begin_command(Command::InitDb, db.as_bytes()).await?;
        self.read_ok().await?;
        self.opts.database = Some(db.to_string());
        Ok(())
    }

    /// Flush server caches; `options` is a bitset of `refresh` flags.
    pub async fn refresh(&mut self, options: u8) -> Result<()> {
        self.begin_command(Command::Refresh, &[options]).await?;
        self.read_ok().await
    }

    /// Ask the server to terminate another connection.
    pub async fn kill(&mut self, thread_id: u32) -> Result<()> {
        self.begin_command(Command::ProcessKill, &thread_id.to_le_bytes())
            .await?;
        self.read_ok().await
    }

    /// Request a server shutdown (default level).
    pub async fn shutdown(&mut self) -> Result<()> {
        self.begin_command(Command::Shutdown, &[0]).await?;
        let payload = self.recv().await?;
        if is_err_packet(&payload) {
            return Err(self.server_error(&payload));
        }
        // pre-5.7 servers answer with EOF instead of OK
        if is_eof_packet(&payload) {
            let eof = EofPacket::parse(&payload).map_err(|e| self.fail(e))?;
            self.handle_eof(eof);
            return Ok(());
        }
        let ok = OkPacket::parse(&payload).map_err(|e| self.fail(e))?;
        self.handle_ok(ok);
        Ok(())
    }

    /// Server statistics as a plain string.
    pub async fn stat(&mut self) -> Result<String> {
        self.begin_command(Command::Statistics, &[]).await?;
        let payload = self.recv().await?;
        if is_err_packet(&payload) {
            return Err(self.server_error(&payload));
        }
        Ok(String::from_utf8_lossy(&payload).to_string())
    }

    /// The server's process list as a result set.
    pub async fn process_info(&mut self) -> Result<ResultSet> {
        self.begin_command(Command::ProcessInfo, &[]).await?;
        self.read_query_response()
            .await?
            .ok_or_else(|| Error::protocol("expected a result set from process info"))
    }

    /// List the columns of a table, with default values.
    pub async fn field_list(&mut self, table: &str, wildcard: &str) -> Result<Vec<Field>> {
        let mut data = BytesMut::with_capacity(table.len() + wildcard.len() + 1);
        data.extend_from_slice(table.as_bytes());
        data.put_u8(0);
        data.extend_from_slice(wildcard.as_bytes());
        self.begin_command(Command::FieldList, &data).await?;

        let mut fields = Vec::new();
        loop {
            let payload = self.recv().await?;
            if is_err_packet(&payload) {
                return Err(self.server_error(&payload));
            }
            if is_eof_packet(&payload) {
                let eof = EofPacket::parse(&payload).map_err(|e| self.fail(e))?;
                self.handle_eof(eof);
                return Ok(fields);
            }
            fields.push(Field::parse(&payload, true).map_err(|e| self.fail(e))?);
        }
    }

    /// Set a server option (COM_SET_OPTION).
    pub async fn set_server_option(&mut self, option: u16) -> Result<()> {
        self.begin_command(Command::SetOption, &option.to_le_bytes())
            .await?;
        let payload = self.recv().await?;
        if is_err_packet(&payload) {
            return Err(self.server_error(&payload));
        }
        // servers answer COM_SET_OPTION with EOF
        if is_eof_packet(&payload) {
            let eof = EofPacket::parse(&payload).map_err(|e| self.fail(e))?;
            self.handle_eof(eof);
            return Ok(());
        }
        let ok = OkPacket::parse(&payload).map_err(|e| self.fail(e))?;
        self.handle_ok(ok);
        Ok(())
    }

    /// Commit the current transaction.
    pub async fn commit(&mut self) -> Result<()> {
        self.query("COMMIT").await.map(|_| ())
    }

    /// Roll back the current transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        self.query("ROLLBACK").await.map(|_| ())
    }

    /// Switch autocommit mode.
    pub async fn autocommit(&mut self, on: bool) -> Result<()> {
        let sql = if on {
            "SET AUTOCOMMIT=1"
        } else {
            "SET AUTOCOMMIT=0"
        };
        self.query(sql).await.map(|_| ())
    }

    /// Send COM_QUIT and release the transport. Socket errors during
    /// close are swallowed.
    pub async fn close(mut self) {
        if !self.closed {
            self.framed.codec_mut().reset_sequence();
            let mut payload = BytesMut::with_capacity(1);
            payload.put_u8(Command::Quit as u8);
            let _ = self.framed.send(payload.freeze()).await;
            self.closed = true;
            debug!(thread_id = self.thread_id, "connection closed");
        }
    }

    // accessors

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Server version as `major*10000 + minor*100 + patch`.
    pub fn server_version_number(&self) -> u32 {
        self.server_version_number
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    pub fn charset_name(&self) -> &str {
        &self.charset_name
    }

    pub fn charset_number(&self) -> u8 {
        self.charset_number
    }

    pub fn capability_flags(&self) -> u32 {
        self.capabilities
    }

    /// Raw server status bitset from the last OK/EOF packet.
    pub fn server_status(&self) -> u16 {
        self.status_flags
    }

    pub fn affected_rows(&self) -> u64 {
        self.last_ok.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.last_ok.last_insert_id
    }

    pub fn warning_count(&self) -> u16 {
        self.last_ok.warnings
    }

    /// Info message of the last OK packet.
    pub fn info(&self) -> &str {
        &self.last_ok.info
    }

    /// Error number of the last server error, 0 when none.
    pub fn errno(&self) -> u16 {
        self.last_error.as_ref().map_or(0, |e| e.error_code)
    }

    /// Message of the last server error, empty when none.
    pub fn error_str(&self) -> &str {
        self.last_error.as_ref().map_or("", |e| &e.error_message)
    }

    /// SQLSTATE of the last server error, `"00000"` when none.
    pub fn sqlstate(&self) -> &str {
        self.last_error
            .as_ref()
            .map_or(crate::error::SQLSTATE_UNKNOWN, |e| &e.sql_state)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next packet sequence id; diagnostics and tests.
    pub fn sequence(&self) -> u8 {
        self.framed.codec().sequence()
    }

    // internals

    pub(crate) fn queue_stmt_close(&mut self, statement_id: u32) {
        self.pending_closes.push(statement_id);
    }

    pub(crate) async fn begin_command(&mut self, cmd: Command, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::client("connection is closed"));
        }
        if self.more_results() {
            return Err(Error::client(
                "result sets pending; call next_result() first",
            ));
        }
        self.last_error = None;

        let pending = std::mem::take(&mut self.pending_closes);
        for id in pending {
            debug!(statement_id = id, "closing dropped statement");
            self.send_command(Command::StmtClose, &id.to_le_bytes())
                .await?;
        }
        self.send_command(cmd, data).await
    }

    async fn send_command(&mut self, cmd: Command, data: &[u8]) -> Result<()> {
        self.framed.codec_mut().reset_sequence();
        let mut payload = BytesMut::with_capacity(1 + data.len());
        payload.put_u8(cmd as u8);
        payload.extend_from_slice(data);
        self.send(payload.freeze()).await
    }

    pub(crate) async fn send(&mut self, payload: Bytes) -> Result<()> {
        let write_timeout = self.opts.write_timeout;
        match maybe_timeout(write_timeout, self.framed.send(payload)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.fail(e)),
            Err(elapsed) => Err(self.fail(elapsed)),
        }
    }

    pub(crate) async fn recv(&mut self) -> Result<Bytes> {
        let read_timeout = self.opts.read_timeout;
        let item = match maybe_timeout(read_timeout, self.framed.next()).await {
            Ok(item) => item,
            Err(elapsed) => return Err(self.fail(elapsed)),
        };
        match item {
            Some(Ok(payload)) => Ok(payload),
            Some(Err(e)) => Err(self.fail(e)),
            None => Err(self.fail(Error::protocol("server closed the connection"))),
        }
    }

    /// Mark the connection unusable on fatal errors.
    pub(crate) fn fail(&mut self, e: Error) -> Error {
        if e.is_fatal() {
            self.closed = true;
        }
        e
    }

    /// Record and surface an ERR packet.
    pub(crate) fn server_error(&mut self, payload: &[u8]) -> Error {
        match ErrPacket::parse(payload) {
            Ok(err) => {
                warn!(
                    code = err.error_code,
                    sqlstate = %err.sql_state,
                    message = %err.error_message,
                    "server error"
                );
                self.last_error = Some(err.clone());
                err.into_error()
            }
            Err(e) => self.fail(e),
        }
    }

    pub(crate) fn handle_ok(&mut self, ok: OkPacket) {
        self.status_flags = ok.status_flags;
        self.last_ok = OkSnapshot {
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            info: ok.info,
        };
    }

    pub(crate) fn handle_eof(&mut self, eof: EofPacket) {
        self.status_flags = eof.status_flags;
        self.last_ok.warnings = eof.warnings;
    }

    async fn read_ok(&mut self) -> Result<()> {
        let payload = self.recv().await?;
        if is_err_packet(&payload) {
            return Err(self.server_error(&payload));
        }
        if !is_ok_packet(&payload) {
            return Err(self.fail(Error::protocol("expected OK packet")));
        }
        let ok = OkPacket::parse(&payload).map_err(|e| self.fail(e))?;
        self.handle_ok(ok);
        Ok(())
    }

    /// Read a COM_QUERY-style response: OK, ERR, LOCAL INFILE request, or
    /// a column-count header followed by fields and text rows.
    async fn read_query_response(&mut self) -> Result<Option<ResultSet>> {
        let payload = self.recv().await?;
        if is_ok_packet(&payload) {
            let ok = OkPacket::parse(&payload).map_err(|e| self.fail(e))?;
            self.handle_ok(ok);
            return Ok(None);
        }
        if is_err_packet(&payload) {
            return Err(self.server_error(&payload));
        }
        if is_local_infile_packet(&payload) {
            let filename = parse_local_infile(&payload).map_err(|e| self.fail(e))?;
            self.send_local_infile(&filename).await?;
            return Ok(None);
        }

        let column_count = parse_result_header(&payload).map_err(|e| self.fail(e))?;
        let fields = self.read_fields(column_count as usize, false).await?;
        let rows = self.read_rows(&fields, false).await?;
        Ok(Some(ResultSet::new(fields, rows)))
    }

    /// Read `count` column definitions and, when `count > 0`, the EOF
    /// terminating the field stream.
    pub(crate) async fn read_fields(
        &mut self,
        count: usize,
        with_default: bool,
    ) -> Result<Vec<Field>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let payload = self.recv().await?;
            if is_err_packet(&payload) {
                return Err(self.server_error(&payload));
            }
            fields.push(Field::parse(&payload, with_default).map_err(|e| self.fail(e))?);
        }
        let payload = self.recv().await?;
        if !is_eof_packet(&payload) {
            return Err(self.fail(Error::protocol("expected EOF after field list")));
        }
        let eof = EofPacket::parse(&payload).map_err(|e| self.fail(e))?;
        self.handle_eof(eof);
        Ok(fields)
    }

    /// Read row packets until EOF, decoding text or binary rows.
    pub(crate) async fn read_rows(
        &mut self,
        fields: &[Field],
        binary: bool,
    ) -> Result<Vec<Vec<crate::value::Value>>> {
        let mut rows = Vec::new();
        loop {
            let payload = self.recv().await?;
            if is_err_packet(&payload) {
                return Err(self.server_error(&payload));
            }
            if is_eof_packet(&payload) {
                let eof = EofPacket::parse(&payload).map_err(|e| self.fail(e))?;
                self.handle_eof(eof);
                return Ok(rows);
            }
            let row = if binary {
                value::read_bin_row(&payload, fields)
            } else {
                value::read_text_row(&payload, fields.len())
            };
            rows.push(row.map_err(|e| self.fail(e))?);
        }
    }

    /// Stream a local file to the server after a LOAD DATA LOCAL INFILE
    /// request, then read the final OK. The empty trailer packet is sent
    /// even when the file is unreadable so the exchange stays in step.
    async fn send_local_infile(&mut self, filename: &str) -> Result<()> {
        debug!(filename = %filename, "server requested local infile");

        let mut client_error = None;
        if !self.opts.local_infile {
            client_error = Some(Error::client(
                "server requested LOCAL INFILE but local_infile is disabled",
            ));
        } else {
            match tokio::fs::File::open(filename).await {
                Ok(mut file) => {
                    let mut buf = vec![0u8; INFILE_CHUNK];
                    loop {
                        match file.read(&mut buf).await {
                            Ok(0) => break,
                            Ok(n) => self.send(Bytes::copy_from_slice(&buf[..n])).await?,
                            Err(e) => {
                                client_error =
                                    Some(Error::client(format!("cannot read {filename}: {e}")));
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    client_error = Some(Error::client(format!("cannot read {filename}: {e}")));
                }
            }
        }

        // empty packet marks end-of-file
        self.send(Bytes::new()).await?;

        let payload = self.recv().await?;
        let server_result = if is_err_packet(&payload) {
            Err(self.server_error(&payload))
        } else {
            let ok = OkPacket::parse(&payload).map_err(|e| self.fail(e))?;
            self.handle_ok(ok);
            Ok(())
        };

        match client_error {
            Some(e) => Err(e),
            None => server_result,
        }
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("server_version", &self.server_version)
            .field("thread_id", &self.thread_id)
            .field("charset", &self.charset_name)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
async fn connect_unix(path: &str, timeout: Option<Duration>) -> Result<Box<dyn Socket>> {
    debug!(path = %path, "connecting over unix socket");
    let stream = maybe_timeout(timeout, tokio::net::UnixStream::connect(path)).await??;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
async fn connect_unix(_path: &str, _timeout: Option<Duration>) -> Result<Box<dyn Socket>> {
    Err(Error::client(
        "unix socket transport is not available on this platform",
    ))
}

async fn maybe_timeout<F: Future>(
    duration: Option<Duration>,
    future: F,
) -> std::result::Result<F::Output, Error> {
    match duration {
        Some(d) => tokio::time::timeout(d, future)
            .await
            .map_err(|_| Error::Timeout),
        None => Ok(future.await),
    }
}
