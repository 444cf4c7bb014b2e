//! Looks a node up in EPMD and performs a client-side handshake against it.
//!
//! # Usage Examples
//!
//! ```bash
//! $ cargo run --example handshake -- --help
//! $ cargo run --example handshake -- --peer foo --self bar@localhost --cookie erlang_cookie
//! ```
use clap::Parser;

#[derive(Debug, Parser)]
#[clap(name = "handshake")]
struct Args {
    #[clap(long, short = 'H', default_value = "127.0.0.1")]
    epmd_host: String,

    #[clap(long, short = 'p', default_value_t = erl_dist::epmd::DEFAULT_EPMD_PORT)]
    epmd_port: u16,

    #[clap(long = "peer", default_value = "foo")]
    peer_name: String,

    #[clap(long = "self", default_value = "bar@localhost")]
    self_node: erl_dist::node::NodeName,

    #[clap(long, default_value = "WPKYDIOSJIMJUURLRUHV")]
    cookie: String,
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

        let peer_addr = (args.epmd_host.as_str(), info.port);
        let stream = smol::net::TcpStream::connect(peer_addr).await?;

        let local_node =
            erl_dist::node::LocalNode::new(args.self_node, erl_dist::node::Creation::random());
        let (_stream, peer) =
            erl_dist::handshake::ClientHandshake::connect(stream, &local_node, &args.cookie)
                .await?;

        println!("Connected: {}", peer.name);
        println!("Peer flags: {:?}", peer.flags);
        println!("Peer creation: {}", peer.creation);
        Ok(())
    })
}
