pub mod codec;
pub mod handshake;
pub mod packet;
pub mod response;
pub mod wire;

pub use codec::PacketCodec;
pub use handshake::{compute_auth_response, HandshakeResponse, InitialHandshake};
pub use packet::{capabilities, column_flags, refresh, status, ColumnType, Command, Packet};
pub use response::{
    is_eof_packet, is_err_packet, is_local_infile_packet, is_ok_packet, EofPacket, ErrPacket,
    Field, OkPacket, PrepareOk,
};
