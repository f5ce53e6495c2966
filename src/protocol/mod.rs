//! PostgreSQL v3 frontend wire protocol
//!
//! Just enough of the protocol for a monitoring client: startup and
//! password authentication (trust, cleartext, md5) plus the simple query
//! flow. The extended query protocol is not needed here.

mod codec;
mod message;

pub use codec::MessageCodec;
pub use message::{
    md5_password, parse_data_row, password_message, query_message, startup_message, tags,
    terminate_message, AuthRequest, BackendMessage, ErrorFields,
};
