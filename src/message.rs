//! Control messages exchanged over a connected (post-handshake) channel.
//!
//! Every non-tick frame carries a small tagged control tuple describing
//! the operation, optionally followed by a second term carrying the
//! operation's payload. See [13.1 Protocol between connected
//! nodes](https://www.erlang.org/doc/apps/erts/erl_dist_protocol.html#protocol-between-connected-nodes).

use crate::term::{self, Atom, CodecError, ConnectionIdentity, Pid, Reference, Term};
use log::warn;

const OP_LINK: i128 = 1;
const OP_SEND: i128 = 2;
const OP_EXIT: i128 = 3;
const OP_UNLINK: i128 = 4;
const OP_NODE_LINK: i128 = 5;
const OP_REG_SEND: i128 = 6;
const OP_GROUP_LEADER: i128 = 7;
const OP_EXIT2: i128 = 8;
const OP_MONITOR_P: i128 = 19;
const OP_DEMONITOR_P: i128 = 20;
const OP_MONITOR_P_EXIT: i128 = 21;
const OP_SEND_SENDER: i128 = 22;
const OP_UNLINK_ID: i128 = 35;
const OP_UNLINK_ID_ACC: i128 = 36;

/// A control message, with its payload (if any) already paired up.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Link { from: Pid, to: Pid },
    Send { to: Pid, message: Term },
    Exit { from: Pid, to: Pid, reason: Term },
    Unlink { from: Pid, to: Pid },
    NodeLink,
    RegSend { from: Pid, to_name: Atom, message: Term },
    GroupLeader { from: Pid, to: Pid },
    Exit2 { from: Pid, to: Pid, reason: Term },
    MonitorP { from: Pid, to: Pid, reference: Reference },
    DemonitorP { from: Pid, to: Pid, reference: Reference },
    MonitorPExit { from: Pid, to: Pid, reference: Reference, reason: Term },
    SendSender { from: Pid, to: Pid, message: Term },
    UnlinkId { id: u64, from: Pid, to: Pid },
    UnlinkIdAck { id: u64, from: Pid, to: Pid },
    /// A zero-length keepalive frame; carries no control tuple at all.
    Tick,
    /// A control tuple whose operation this crate doesn't recognize.
    /// Forward-compat sentinel: the frame has already been logged and
    /// dropped by [`Message::read_from`] rather than torn down as an
    /// error, so callers can simply ignore it and keep reading.
    Unknown { op: i128 },
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MessageError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("malformed control tuple for operation {op}")]
    Malformed { op: i128 },
}

impl Message {
    /// Encodes this message's control term (and payload term, if any) and
    /// appends them to `out`. Does not write the frame length prefix or
    /// the pass-through byte — that's [`crate::channel`]'s job.
    pub fn write_into(&self, conn: Option<&ConnectionIdentity>, out: &mut Vec<u8>) {
        match self {
            Message::Tick => {}
            Message::Link { from, to } => {
                out.extend(term::encode(&ctrl(OP_LINK, [pid(from), pid(to)]), conn));
            }
            Message::Send { to, message } => {
                out.extend(term::encode(&ctrl(OP_SEND, [Term::Nil, pid(to)]), conn));
                out.extend(term::encode(message, conn));
            }
            Message::Exit { from, to, reason } => {
                out.extend(term::encode(
                    &ctrl(OP_EXIT, [pid(from), pid(to), reason.clone()]),
                    conn,
                ));
            }
            Message::Unlink { from, to } => {
                out.extend(term::encode(&ctrl(OP_UNLINK, [pid(from), pid(to)]), conn));
            }
            Message::NodeLink => {
                out.extend(term::encode(&ctrl(OP_NODE_LINK, []), conn));
            }
            Message::RegSend {
                from,
                to_name,
                message,
            } => {
                out.extend(term::encode(
                    &ctrl(
                        OP_REG_SEND,
                        [pid(from), Term::Nil, Term::Atom(to_name.clone())],
                    ),
                    conn,
                ));
                out.extend(term::encode(message, conn));
            }
            Message::GroupLeader { from, to } => {
                out.extend(term::encode(
                    &ctrl(OP_GROUP_LEADER, [pid(from), pid(to)]),
                    conn,
                ));
            }
            Message::Exit2 { from, to, reason } => {
                out.extend(term::encode(
                    &ctrl(OP_EXIT2, [pid(from), pid(to), reason.clone()]),
                    conn,
                ));
            }
            Message::MonitorP {
                from,
                to,
                reference,
            } => {
                out.extend(term::encode(
                    &ctrl(
                        OP_MONITOR_P,
                        [pid(from), pid(to), reference_term(reference)],
                    ),
                    conn,
                ));
            }
            Message::DemonitorP {
                from,
                to,
                reference,
            } => {
                out.extend(term::encode(
                    &ctrl(
                        OP_DEMONITOR_P,
                        [pid(from), pid(to), reference_term(reference)],
                    ),
                    conn,
                ));
            }
            Message::MonitorPExit {
                from,
                to,
                reference,
                reason,
            } => {
                out.extend(term::encode(
                    &ctrl(
                        OP_MONITOR_P_EXIT,
                        [
                            pid(from),
                            pid(to),
                            reference_term(reference),
                            reason.clone(),
                        ],
                    ),
                    conn,
                ));
            }
            Message::SendSender { from, to, message } => {
                out.extend(term::encode(
                    &ctrl(OP_SEND_SENDER, [pid(from), pid(to)]),
                    conn,
                ));
                out.extend(term::encode(message, conn));
            }
            Message::UnlinkId { id, from, to } => {
                out.extend(term::encode(
                    &ctrl(
                        OP_UNLINK_ID,
                        [Term::Integer(*id as i128), pid(from), pid(to)],
                    ),
                    conn,
                ));
            }
            Message::UnlinkIdAck { id, from, to } => {
                out.extend(term::encode(
                    &ctrl(
                        OP_UNLINK_ID_ACC,
                        [Term::Integer(*id as i128), pid(from), pid(to)],
                    ),
                    conn,
                ));
            }
            // Decode-only sentinel; nothing meaningful to re-encode.
            Message::Unknown { .. } => {}
        }
    }

    /// Decodes a message out of a frame body (everything after the
    /// pass-through byte, or an empty slice for a tick).
    pub fn read_from(
        bytes: &[u8],
        conn: Option<&ConnectionIdentity>,
    ) -> Result<Message, MessageError> {
        if bytes.is_empty() {
            return Ok(Message::Tick);
        }
        let mut cursor = bytes;
        let control = term::decode_one(&mut cursor, conn)?;
        let elems = control.as_tuple().ok_or(MessageError::Malformed { op: -1 })?;
        let op = elems
            .first()
            .and_then(Term::as_i128)
            .ok_or(MessageError::Malformed { op: -1 })?;

        let rest = &elems[1..];
        match op {
            OP_LINK => {
                let [from, to] = take2(rest, op)?;
                Ok(Message::Link {
                    from: expect_pid(from, op)?,
                    to: expect_pid(to, op)?,
                })
            }
            OP_SEND => {
                let [_, to] = take2(rest, op)?;
                let message = term::decode_one(&mut cursor, conn)?;
                Ok(Message::Send {
                    to: expect_pid(to, op)?,
                    message,
                })
            }
            OP_EXIT => {
                let [from, to, reason] = take3(rest, op)?;
                Ok(Message::Exit {
                    from: expect_pid(from, op)?,
                    to: expect_pid(to, op)?,
                    reason: reason.clone(),
                })
            }
            OP_UNLINK => {
                let [from, to] = take2(rest, op)?;
                Ok(Message::Unlink {
                    from: expect_pid(from, op)?,
                    to: expect_pid(to, op)?,
                })
            }
            OP_NODE_LINK => Ok(Message::NodeLink),
            OP_REG_SEND => {
                let [from, _unused, to_name] = take3(rest, op)?;
                let message = term::decode_one(&mut cursor, conn)?;
                Ok(Message::RegSend {
                    from: expect_pid(from, op)?,
                    to_name: expect_atom(to_name, op)?,
                    message,
                })
            }
            OP_GROUP_LEADER => {
                let [from, to] = take2(rest, op)?;
                Ok(Message::GroupLeader {
                    from: expect_pid(from, op)?,
                    to: expect_pid(to, op)?,
                })
            }
            OP_EXIT2 => {
                let [from, to, reason] = take3(rest, op)?;
                Ok(Message::Exit2 {
                    from: expect_pid(from, op)?,
                    to: expect_pid(to, op)?,
                    reason: reason.clone(),
                })
            }
            OP_MONITOR_P => {
                let [from, to, reference] = take3(rest, op)?;
                Ok(Message::MonitorP {
                    from: expect_pid(from, op)?,
                    to: expect_pid(to, op)?,
                    reference: expect_reference(reference, op)?,
                })
            }
            OP_DEMONITOR_P => {
                let [from, to, reference] = take3(rest, op)?;
                Ok(Message::DemonitorP {
                    from: expect_pid(from, op)?,
                    to: expect_pid(to, op)?,
                    reference: expect_reference(reference, op)?,
                })
            }
            OP_MONITOR_P_EXIT => {
                let [from, to, reference, reason] = take4(rest, op)?;
                Ok(Message::MonitorPExit {
                    from: expect_pid(from, op)?,
                    to: expect_pid(to, op)?,
                    reference: expect_reference(reference, op)?,
                    reason: reason.clone(),
                })
            }
            OP_SEND_SENDER => {
                let [from, to] = take2(rest, op)?;
                let message = term::decode_one(&mut cursor, conn)?;
                Ok(Message::SendSender {
                    from: expect_pid(from, op)?,
                    to: expect_pid(to, op)?,
                    message,
                })
            }
            OP_UNLINK_ID => {
                let [id, from, to] = take3(rest, op)?;
                Ok(Message::UnlinkId {
                    id: expect_u64(id, op)?,
                    from: expect_pid(from, op)?,
                    to: expect_pid(to, op)?,
                })
            }
            OP_UNLINK_ID_ACC => {
                let [id, from, to] = take3(rest, op)?;
                Ok(Message::UnlinkIdAck {
                    id: expect_u64(id, op)?,
                    from: expect_pid(from, op)?,
                    to: expect_pid(to, op)?,
                })
            }
            other => {
                warn!("dropping frame for unsupported control operation {other}");
                Ok(Message::Unknown { op: other })
            }
        }
    }
}

fn ctrl<const N: usize>(op: i128, fields: [Term; N]) -> Term {
    let mut elems = Vec::with_capacity(N + 1);
    elems.push(Term::Integer(op));
    elems.extend(fields);
    Term::Tuple(elems)
}

fn pid(p: &Pid) -> Term {
    Term::Pid(p.clone())
}

fn reference_term(r: &Reference) -> Term {
    Term::Reference(r.clone())
}

fn take2(rest: &[Term], op: i128) -> Result<[&Term; 2], MessageError> {
    match rest {
        [a, b] => Ok([a, b]),
        _ => Err(MessageError::Malformed { op }),
    }
}

fn take3(rest: &[Term], op: i128) -> Result<[&Term; 3], MessageError> {
    match rest {
        [a, b, c] => Ok([a, b, c]),
        _ => Err(MessageError::Malformed { op }),
    }
}

fn take4(rest: &[Term], op: i128) -> Result<[&Term; 4], MessageError> {
    match rest {
        [a, b, c, d] => Ok([a, b, c, d]),
        _ => Err(MessageError::Malformed { op }),
    }
}

fn expect_pid(term: &Term, op: i128) -> Result<Pid, MessageError> {
    term.as_pid().cloned().ok_or(MessageError::Malformed { op })
}

fn expect_atom(term: &Term, op: i128) -> Result<Atom, MessageError> {
    term.as_atom()
        .cloned()
        .ok_or(MessageError::Malformed { op })
}

fn expect_reference(term: &Term, op: i128) -> Result<Reference, MessageError> {
    match term {
        Term::Reference(r) => Ok(r.clone()),
        _ => Err(MessageError::Malformed { op }),
    }
}

fn expect_u64(term: &Term, op: i128) -> Result<u64, MessageError> {
    match term.as_i128() {
        Some(v) if v >= 0 => Ok(v as u64),
        _ => Err(MessageError::Malformed { op }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid_for(id: u32) -> Pid {
        Pid {
            node: Some(Atom::new("a@localhost")),
            id,
            serial: 0,
            creation: 1,
        }
    }

    #[test]
    fn link_round_trips() {
        let msg = Message::Link {
            from: pid_for(1),
            to: pid_for(2),
        };
        let mut buf = Vec::new();
        msg.write_into(None, &mut buf);
        assert_eq!(Message::read_from(&buf, None).unwrap(), msg);
    }

    #[test]
    fn reg_send_round_trips_with_payload() {
        let msg = Message::RegSend {
            from: pid_for(1),
            to_name: Atom::new("rex"),
            message: Term::tuple(vec![Term::atom("call"), Term::Integer(1)]),
        };
        let mut buf = Vec::new();
        msg.write_into(None, &mut buf);
        assert_eq!(Message::read_from(&buf, None).unwrap(), msg);
    }

    #[test]
    fn unlink_id_round_trips() {
        let msg = Message::UnlinkId {
            id: 42,
            from: pid_for(1),
            to: pid_for(2),
        };
        let mut buf = Vec::new();
        msg.write_into(None, &mut buf);
        assert_eq!(Message::read_from(&buf, None).unwrap(), msg);
    }

    #[test]
    fn tick_round_trips_as_empty_frame() {
        let mut buf = Vec::new();
        Message::Tick.write_into(None, &mut buf);
        assert!(buf.is_empty());
        assert_eq!(Message::read_from(&buf, None).unwrap(), Message::Tick);
    }

    #[test]
    fn unknown_op_is_dropped_not_errored() {
        let bogus = ctrl(999, []);
        let mut buf = Vec::new();
        buf.extend(term::encode(&bogus, None));
        assert_eq!(
            Message::read_from(&buf, None).unwrap(),
            Message::Unknown { op: 999 }
        );
    }
}
