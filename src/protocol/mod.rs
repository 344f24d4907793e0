pub mod command;
pub mod framing;

pub use command::{decode_record, Command, ItemFailure, Payload, Response, SaveSummary};
pub use framing::{read_message, write_message, FramingError};
