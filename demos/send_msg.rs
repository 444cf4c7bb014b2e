//! Client Node Example.
//!
//! The node connects to the specified peer and sends a message to a
//! registered process on it.
//!
//! # Usage Examples
//!
//! ```bash
//! $ cargo run --example send_msg -- --help
//! $ cargo run --example send_msg -- --peer foo --destination foo --cookie erlang_cookie -m hello
//! ```
use clap::Parser;
use erl_dist::term::{Atom, Term};

#[derive(Debug, Parser)]
#[clap(name = "send_msg")]
struct Args {
    #[clap(long, short = 'H', default_value = "127.0.0.1")]
    epmd_host: String,

    #[clap(long, short = 'p', default_value_t = erl_dist::epmd::DEFAULT_EPMD_PORT)]
    epmd_port: u16,

    #[clap(long = "peer", default_value = "foo")]
    peer_name: String,

    #[clap(long, default_value = "WPKYDIOSJIMJUURLRUHV")]
    cookie: String,

    #[clap(long = "self", default_value = "bar@localhost")]
    self_node: erl_dist::node::NodeName,

    #[clap(long, short, default_value = "foo")]
    destination: String,

    #[clap(long, short, default_value = "hello_world")]
    message: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    smol::block_on(async {
        let epmd_stream =
            smol::net::TcpStream::connect((args.epmd_host.as_str(), args.epmd_port)).await?;
        let info = erl_dist::epmd::EpmdClient::new(epmd_stream)
            .get_node_info(&args.peer_name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("node {} is not registered", args.peer_name))?;

        let stream = smol::net::TcpStream::connect((args.epmd_host.as_str(), info.port)).await?;
        let local_node = erl_dist::node::LocalNode::new(
            args.self_node.clone(),
            erl_dist::node::Creation::random(),
        );
        let (stream, peer) =
            erl_dist::handshake::ClientHandshake::connect(stream, &local_node, &args.cookie)
                .await?;
        println!("# Connected: {}", peer.name);
        println!("# Distribution Flags: {:?}", peer.flags);

        let identity = erl_dist::term::ConnectionIdentity {
            node: Atom::new(args.self_node.to_string()),
            creation: local_node.creation.value(),
        };
        let (mut tx, _rx) = erl_dist::channel(stream, local_node.flags & peer.flags, identity);

        let from_pid = erl_dist::term::Pid {
            node: None,
            id: 0,
            serial: 0,
            creation: 0,
        };
        let message = erl_dist::Message::RegSend {
            from: from_pid,
            to_name: Atom::new(args.destination),
            message: Term::atom(args.message),
        };
        println!("# Send: {:?}", message);
        tx.send(message).await?;
        println!("# DONE");
        Ok(())
    })
}
