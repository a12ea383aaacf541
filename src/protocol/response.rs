//! Server response packet grammars: OK, ERR, EOF, result header, column
//! definitions, and prepare-OK.

use crate::error::{Error, Result};

use super::packet::{column_flags, ColumnType};
use super::wire;

/// First byte of a LOCAL INFILE request packet.
pub const LOCAL_INFILE_HEADER: u8 = 0xFB;

/// Check if payload is an OK packet
pub fn is_ok_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&0x00)
}

/// Check if payload is an ERR packet
pub fn is_err_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&0xFF)
}

/// Check if payload is an EOF packet (0xFE with at most 5 bytes)
pub fn is_eof_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&0xFE) && payload.len() <= 5
}

/// Check if payload is a LOAD DATA LOCAL INFILE filename request
pub fn is_local_infile_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&LOCAL_INFILE_HEADER)
}

/// OK packet
#[derive(Debug, Clone, Default)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

impl OkPacket {
    /// Parse from packet payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        if wire::read_u8(&mut buf)? != 0x00 {
            return Err(Error::protocol("expected OK packet"));
        }
        let affected_rows = wire::read_lcb(&mut buf)?.unwrap_or(0);
        let last_insert_id = wire::read_lcb(&mut buf)?.unwrap_or(0);
        let status_flags = wire::read_u16_le(&mut buf)?;
        let warnings = wire::read_u16_le(&mut buf)?;
        let info = String::from_utf8_lossy(buf).to_string();
        Ok(Self {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings,
            info,
        })
    }
}

/// ERR packet
#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    /// Parse from packet payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        if wire::read_u8(&mut buf)? != 0xFF {
            return Err(Error::protocol("expected ERR packet"));
        }
        let error_code = wire::read_u16_le(&mut buf)?;

        let sql_state = if buf.first() == Some(&b'#') {
            wire::read_u8(&mut buf)?;
            String::from_utf8_lossy(wire::take(&mut buf, 5)?).to_string()
        } else {
            "HY000".to_string()
        };
        let error_message = String::from_utf8_lossy(buf).to_string();

        Ok(Self {
            error_code,
            sql_state,
            error_message,
        })
    }

    pub fn into_error(self) -> Error {
        Error::Server {
            code: self.error_code,
            sqlstate: self.sql_state,
            message: self.error_message,
        }
    }
}

/// EOF packet terminating field and row streams
#[derive(Debug, Clone, Default)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: u16,
}

impl EofPacket {
    /// Parse from packet payload. Pre-4.1 servers send a bare 0xFE byte;
    /// warning count and status read as zero in that case.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        if wire::read_u8(&mut buf)? != 0xFE {
            return Err(Error::protocol("expected EOF packet"));
        }
        if buf.is_empty() {
            return Ok(Self::default());
        }
        let warnings = wire::read_u16_le(&mut buf)?;
        let status_flags = wire::read_u16_le(&mut buf)?;
        Ok(Self {
            warnings,
            status_flags,
        })
    }
}

/// Result-set header: the column count introducing a field stream.
pub fn parse_result_header(payload: &[u8]) -> Result<u64> {
    let mut buf = payload;
    let count = wire::read_lcb(&mut buf)?
        .ok_or_else(|| Error::protocol("NULL column count in result header"))?;
    if count == 0 {
        return Err(Error::protocol("zero column count in result header"));
    }
    Ok(count)
}

/// LOCAL INFILE request: the server-requested filename.
pub fn parse_local_infile(payload: &[u8]) -> Result<String> {
    let mut buf = payload;
    if wire::read_u8(&mut buf)? != LOCAL_INFILE_HEADER {
        return Err(Error::protocol("expected LOCAL INFILE packet"));
    }
    Ok(String::from_utf8_lossy(buf).to_string())
}

/// Column definition from a field packet.
#[derive(Debug, Clone)]
pub struct Field {
    pub database: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub charsetnr: u16,
    pub length: u32,
    pub column_type: ColumnType,
    pub flags: u16,
    pub decimals: u8,
    /// Only present in FIELD_LIST responses.
    pub default: Option<Vec<u8>>,
    /// Max byte length observed in the materialised rows.
    pub max_length: usize,
}

impl Field {
    /// Parse from packet payload. `with_default` is set for FIELD_LIST
    /// responses, which append a default-value string.
    pub fn parse(payload: &[u8], with_default: bool) -> Result<Self> {
        let mut buf = payload;

        // catalog, always "def", not retained
        wire::read_lcs(&mut buf)?;
        let database = lcs_string(&mut buf)?;
        let table = lcs_string(&mut buf)?;
        let org_table = lcs_string(&mut buf)?;
        let name = lcs_string(&mut buf)?;
        let org_name = lcs_string(&mut buf)?;

        // length of the fixed-size block, always 0x0C
        wire::read_u8(&mut buf)?;

        let charsetnr = wire::read_u16_le(&mut buf)?;
        let length = wire::read_u32_le(&mut buf)?;
        let type_code = wire::read_u8(&mut buf)?;
        let column_type = ColumnType::from_u8(type_code)
            .ok_or_else(|| Error::protocol(format!("unknown column type 0x{type_code:02x}")))?;
        let flags = wire::read_u16_le(&mut buf)?;
        let decimals = wire::read_u8(&mut buf)?;
        wire::read_u16_le(&mut buf)?; // filler

        let default = if with_default && !buf.is_empty() {
            wire::read_lcs(&mut buf)?.map(|d| d.to_vec())
        } else {
            None
        };

        Ok(Self {
            database,
            table,
            org_table,
            name,
            org_name,
            charsetnr,
            length,
            column_type,
            flags,
            decimals,
            default,
            max_length: 0,
        })
    }

    /// Whether the column holds a numeric value. Timestamps of display
    /// width 8 or 14 count as numeric, matching the classic client library.
    pub fn is_num(&self) -> bool {
        matches!(
            self.column_type,
            ColumnType::Decimal
                | ColumnType::NewDecimal
                | ColumnType::Tiny
                | ColumnType::Short
                | ColumnType::Long
                | ColumnType::Float
                | ColumnType::Double
                | ColumnType::LongLong
                | ColumnType::Int24
                | ColumnType::Year
        ) || (self.column_type == ColumnType::Timestamp
            && (self.length == 8 || self.length == 14))
    }

    /// Whether the column is unsigned.
    pub fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED_FLAG != 0
    }

    /// Whether the column carries binary (non-charset) data.
    pub fn is_binary(&self) -> bool {
        self.flags & column_flags::BINARY_FLAG != 0
    }
}

fn lcs_string(buf: &mut &[u8]) -> Result<String> {
    Ok(wire::read_lcs(buf)?
        .map(|s| String::from_utf8_lossy(s).to_string())
        .unwrap_or_default())
}

/// Prepare-OK packet heading a COM_STMT_PREPARE response.
#[derive(Debug, Clone)]
pub struct PrepareOk {
    pub statement_id: u32,
    pub column_count: u16,
    pub param_count: u16,
    pub warnings: u16,
}

impl PrepareOk {
    /// Parse from packet payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        if wire::read_u8(&mut buf)? != 0x00 {
            return Err(Error::protocol("expected prepare-OK packet"));
        }
        let statement_id = wire::read_u32_le(&mut buf)?;
        let column_count = wire::read_u16_le(&mut buf)?;
        let param_count = wire::read_u16_le(&mut buf)?;
        wire::read_u8(&mut buf)?; // filler
        let warnings = wire::read_u16_le(&mut buf)?;
        Ok(Self {
            statement_id,
            column_count,
            param_count,
            warnings,
        })
    }
}
