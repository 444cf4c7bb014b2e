//! Rust implementation of the Erlang distribution protocol.
//!
//! The distribution protocol is what lets an Erlang/OTP node talk to
//! other nodes (Erlang or otherwise) over TCP: a name-resolution step via
//! [`epmd`], a handshake establishing trust via a shared cookie
//! ([`handshake`]), and a framed connection carrying [`message`] control
//! traffic and [`term`] payloads once connected ([`channel`]).
//!
//! On top of the wire layer, [`process`] hosts a small Erlang-style
//! process runtime (mailboxes, links, exit signals) so a program built on
//! this crate can look, from a connected peer's point of view, like an
//! ordinary (if minimal) Erlang node; [`rpc`] layers the conventional
//! `rpc:call/4`-over-distribution protocol on top of that.
//!
//! Reference: [12 Distribution Protocol](http://erlang.org/doc/apps/erts/erl_dist_protocol.html)
//!
//! # Examples
//!
//! - Client Node Example: [send_msg.rs](https://github.com/sile/erl_dist/blob/master/examples/send_msg.rs)
//! - Server Node Example: [recv_msg.rs](https://github.com/sile/erl_dist/blob/master/examples/recv_msg.rs)
// #![warn(missing_docs)]

pub use channel::{channel, Receiver, Sender};
pub use epmd::EpmdClient;
pub use flags::DistributionFlags;
pub use handshake::{ClientHandshake, PeerInfo, ServerHandshake};
pub use message::Message;
pub use node::{Creation, LocalNode, NodeName, NodeType};
pub use process::{ExitReason, Node, ProcessContext};
pub use term::{Atom, BigInt, Pid, Reference, Term};

pub mod channel;
pub mod cookie;
pub mod epmd;
pub mod flags;
pub mod handshake;
pub mod message;
pub mod node;
pub mod process;
pub mod rpc;
mod socket;
pub mod term;
