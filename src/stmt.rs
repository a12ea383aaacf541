//! Prepared statements: prepare/execute/close lifecycle and the binary
//! parameter block.

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::conn::Conn;
use crate::error::{Error, Result};
use crate::protocol::packet::Command;
use crate::protocol::response::{
    is_err_packet, is_ok_packet, parse_result_header, Field, OkPacket,
};
use crate::resultset::ResultSet;
use crate::value::{self, Value};

#[derive(Debug)]
pub(crate) struct StatementInner {
    pub id: u32,
    pub params: Vec<Field>,
    pub columns: Vec<Field>,
    pub warnings: u16,
}

/// A server-side prepared statement.
///
/// The statement borrows its connection, so the connection outlives it by
/// construction and no other command can interleave with an execute.
/// Dropping the statement without [`Statement::close`] queues the close
/// packet on the connection, which sends it before its next command.
#[derive(Debug)]
pub struct Statement<'a> {
    conn: &'a mut Conn,
    inner: StatementInner,
    closed: bool,
}

impl<'a> Statement<'a> {
    pub(crate) fn new(conn: &'a mut Conn, inner: StatementInner) -> Self {
        Self {
            conn,
            inner,
            closed: false,
        }
    }

    /// Server-assigned statement id.
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn param_count(&self) -> usize {
        self.inner.params.len()
    }

    pub fn column_count(&self) -> usize {
        self.inner.columns.len()
    }

    /// Parameter metadata from the prepare response.
    pub fn params(&self) -> &[Field] {
        &self.inner.params
    }

    /// Column metadata from the prepare response.
    pub fn columns(&self) -> &[Field] {
        &self.inner.columns
    }

    /// Warning count reported by the prepare.
    pub fn warning_count(&self) -> u16 {
        self.inner.warnings
    }

    /// Execute with the given parameters. `None` means the statement
    /// produced no result set.
    pub async fn execute(&mut self, params: &[Value]) -> Result<Option<ResultSet>> {
        if self.closed {
            return Err(Error::client("statement is closed"));
        }
        if params.len() != self.inner.params.len() {
            return Err(Error::client(format!(
                "statement takes {} parameters, {} given",
                self.inner.params.len(),
                params.len()
            )));
        }

        let mut body = BytesMut::with_capacity(9 + params.len() * 10);
        body.put_u32_le(self.inner.id);
        body.put_u8(0); // no cursor
        body.put_u32_le(1); // iteration count

        if !params.is_empty() {
            body.extend_from_slice(&value::param_null_bitmap(params));
            body.put_u8(1); // new params bound
            for param in params {
                body.extend_from_slice(&value::param_type_pair(param));
            }
            for param in params {
                value::write_bin_value(&mut body, param);
            }
        }

        self.conn.begin_command(Command::StmtExecute, &body).await?;

        let payload = self.conn.recv().await?;
        if is_ok_packet(&payload) {
            let ok = OkPacket::parse(&payload).map_err(|e| self.conn.fail(e))?;
            self.conn.handle_ok(ok);
            return Ok(None);
        }
        if is_err_packet(&payload) {
            return Err(self.conn.server_error(&payload));
        }

        let column_count = parse_result_header(&payload).map_err(|e| self.conn.fail(e))?;
        let fields = self.conn.read_fields(column_count as usize, false).await?;
        let rows = self.conn.read_rows(&fields, true).await?;
        Ok(Some(ResultSet::new(fields, rows)))
    }

    /// Release the statement on the server. The server sends no reply.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        debug!(statement_id = self.inner.id, "closing statement");
        self.conn
            .begin_command(Command::StmtClose, &self.inner.id.to_le_bytes())
            .await
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.conn.queue_stmt_close(self.inner.id);
        }
    }
}
