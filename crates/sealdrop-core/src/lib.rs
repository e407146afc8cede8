//! # sealdrop Core
//!
//! Protocol implementation for sealdrop: encrypted, chunked, single-file
//! transfer between a sender and a receiver.
//!
//! This crate provides:
//! - The wire [`message::Message`] set and its binary encoding
//! - [`sender::SenderSession`]: handshake, stop-and-wait chunk loop, stop
//! - [`receiver::ReceiverSession`]: validation, reassembly, file output
//! - [`server::Server`]: one receive session per accepted TCP connection
//!
//! A transfer looks like this:
//!
//! ```text
//! Idle --Start--> KeyExchangeSent --Ack{0}--> Streaming --Ack{n}--> Completed
//!                        |                        |
//!                        +------ anything else ---+----> Aborted
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod error;
pub mod message;
pub mod receiver;
pub mod sender;
pub mod server;

pub use channel::MessageChannel;
pub use error::{Result, SessionError};
pub use message::{ACK_REJECT, Message, MessageError, MessageTag, PROTOCOL_VERSION};
pub use receiver::{
    ReceiveOutcome, ReceivedFile, ReceiverConfig, ReceiverSession, ReceiverState, Step,
    TransferState,
};
pub use sender::{SenderSession, SenderState, TransferProgress, TransferReport};
pub use server::{Server, ServerConfig, receive_on};
