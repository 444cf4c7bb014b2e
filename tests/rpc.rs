//! End-to-end RPC test: two in-process "nodes" connected by an in-memory
//! duplex pipe, one playing a peer's `rex` process by hand.
use erl_dist::channel;
use erl_dist::message::Message;
use erl_dist::process::Node;
use erl_dist::rpc;
use erl_dist::term::{Atom, ConnectionIdentity, Pid, Term};

fn identity(name: &str) -> ConnectionIdentity {
    ConnectionIdentity {
        node: Atom::new(name),
        creation: 1,
    }
}

fn pid(node: &str, id: u32) -> Pid {
    Pid {
        node: Some(Atom::new(node)),
        id,
        serial: 0,
        creation: 1,
    }
}

#[test]
fn rpc_call_round_trips_through_rex() {
    smol::block_on(async {
        let (client_stream, server_stream) = smol::net::unix::UnixStream::pair().unwrap();

        let (client_tx, client_rx) = channel::channel(
            client_stream,
            Default::default(),
            identity("client@localhost"),
        );
        let (mut server_tx, mut server_rx) = channel::channel(
            server_stream,
            Default::default(),
            identity("server@localhost"),
        );

        let server_task = smol::spawn(async move {
            loop {
                match server_rx.recv().await.expect("server recv failed") {
                    Message::Tick => continue,
                    Message::RegSend {
                        from,
                        to_name,
                        message,
                    } => {
                        assert_eq!(to_name.as_str(), "rex");
                        let envelope = message.as_tuple().expect("payload must be {From, Call}");
                        let call = envelope[1]
                            .as_tuple()
                            .expect("second element must be a call tuple")
                            .to_vec();
                        assert_eq!(call[0], Term::atom("call"));
                        assert_eq!(call[1], Term::atom("calculator"));
                        assert_eq!(call[2], Term::atom("add"));
                        let args = match &call[3] {
                            Term::List(elems, _) => elems.clone(),
                            Term::Nil => Vec::new(),
                            other => panic!("unexpected args shape: {other:?}"),
                        };
                        let sum: i128 = args.iter().map(|t| t.as_i128().unwrap()).sum();

                        server_tx
                            .send(Message::Send {
                                to: from,
                                message: Term::tuple(vec![Term::atom("rex"), Term::Integer(sum)]),
                            })
                            .await
                            .expect("server send failed");
                        return;
                    }
                    other => panic!("unexpected message: {other:?}"),
                }
            }
        });

        let node = Node::new(Atom::new("client@localhost"), 1);
        let mut conn = rpc::Connection::new(client_tx, client_rx, pid("client@localhost", 0), node);
        let result = conn
            .rpc(
                Atom::new("calculator"),
                Atom::new("add"),
                vec![Term::Integer(1), Term::Integer(2), Term::Integer(3)],
            )
            .await
            .expect("rpc call failed");

        assert_eq!(result, Term::Integer(6));
        server_task.await;
    });
}
