//! Tuning wire protocol
//!
//! Stateless encoding and decoding of the binary command protocol spoken on
//! the tuning TCP port.
//!
//! - [`header`] - the fixed 48-byte command header
//! - [`ids`] - command id namespaces and general command tables
//! - [`codec`] - cooperative framing of headers, payloads and file transfers

pub mod codec;
pub mod header;
pub mod ids;

pub use codec::{
    encode_request, encode_settings_file, is_file_transfer, write_header, write_packet,
    write_response, CommandReader, ReadOutcome, MAX_PAYLOAD,
};
pub use header::{CommandHeader, CommandType, CommandValue, Direction, ParamWord};
pub use ids::{CommandSpace, GeneralCommand, GeneralGet, GeneralSet};
