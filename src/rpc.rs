//! RPC and session helpers layered on top of a connected [`channel`].
//!
//! `rpc` implements the classic `rpc:call/4`-over-distribution trick: send
//! a `REG_SEND` to the peer's registered `rex` process and wait for its
//! reply. `call` is a local helper with no wire component, used to bound
//! how long a synchronous operation (including an `rpc` call itself) is
//! allowed to block.

use std::time::Duration;

use futures::io::{AsyncRead, AsyncWrite};

use crate::channel::{RecvError, Receiver, SendError, Sender};
use crate::message::Message;
use crate::process::Node;
use crate::term::{Atom, Pid, Term};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RpcError {
    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Recv(#[from] RecvError),

    #[error("rpc reply did not match the expected {{rex, Result}} shape: {0:?}")]
    UnexpectedReply(Term),
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CallError {
    #[error("operation did not complete within the allotted timeout")]
    Timeout,
}

/// A connected channel plus the local identity used to address replies.
///
/// Control traffic that isn't the `rpc` reply itself (links, exits,
/// `reg_send` to some other registered name, unlink handshakes, ...) is
/// routed into `node` via [`Node::dispatch`] rather than discarded, so a
/// `Connection` doubles as the transport half of a distributed process.
pub struct Connection<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
    self_pid: Pid,
    node: Node,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(sender: Sender<T>, receiver: Receiver<T>, self_pid: Pid, node: Node) -> Self {
        Self {
            sender,
            receiver,
            self_pid,
            node,
        }
    }

    /// Calls `module:function(args)` on the peer node and returns its
    /// result, per the `rex` registered-process RPC protocol: send
    /// `{self(), {call, module, function, args, user}}` to `{rex, node}`,
    /// then wait for `{rex, Result}`.
    pub async fn rpc(
        &mut self,
        module: Atom,
        function: Atom,
        args: Vec<Term>,
    ) -> Result<Term, RpcError> {
        let payload = Term::tuple(vec![
            Term::Pid(self.self_pid.clone()),
            Term::tuple(vec![
                Term::atom("call"),
                Term::Atom(module),
                Term::Atom(function),
                Term::list(args),
                Term::atom("user"),
            ]),
        ]);
        self.sender
            .send(Message::RegSend {
                from: self.self_pid.clone(),
                to_name: Atom::new("rex"),
                message: payload,
            })
            .await?;

        loop {
            match self.receiver.recv().await? {
                Message::Tick => continue,
                Message::Send { message, .. } | Message::SendSender { message, .. } => {
                    if let Some(result) = match_rex_reply(&message) {
                        return Ok(result);
                    }
                    return Err(RpcError::UnexpectedReply(message));
                }
                other => {
                    if let Some(reply) = self.node.dispatch(other) {
                        self.sender.send(reply).await?;
                    }
                    continue;
                }
            }
        }
    }
}

fn match_rex_reply(message: &Term) -> Option<Term> {
    let elems = message.as_tuple()?;
    if elems.len() != 2 {
        return None;
    }
    let tag = elems[0].as_atom()?;
    if tag.as_str() != "rex" {
        return None;
    }
    Some(elems[1].clone())
}

/// Runs `f` on its own thread, waiting up to `timeout` for it to finish.
/// On timeout, `f`'s eventual result is silently dropped rather than
/// delivered anywhere: nothing is reading for it anymore.
pub fn call<F, T>(timeout: Duration, f: F) -> Result<T, CallError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    use std::sync::mpsc;

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = f();
        let _ = tx.send(result);
    });

    rx.recv_timeout(timeout).map_err(|_| CallError::Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_rex_reply_extracts_result() {
        let msg = Term::tuple(vec![Term::atom("rex"), Term::Integer(42)]);
        assert_eq!(match_rex_reply(&msg), Some(Term::Integer(42)));
    }

    #[test]
    fn match_rex_reply_rejects_other_shapes() {
        let msg = Term::tuple(vec![Term::atom("not_rex"), Term::Integer(42)]);
        assert_eq!(match_rex_reply(&msg), None);
    }

    #[test]
    fn call_returns_result_within_timeout() {
        let result = call(Duration::from_secs(1), || 1 + 1);
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn call_times_out_on_slow_work() {
        let result = call(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_secs(2));
            42
        });
        assert!(matches!(result, Err(CallError::Timeout)));
    }
}
