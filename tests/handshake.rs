//! Scripted-peer handshake test: both sides of a real handshake running
//! against each other over an in-memory duplex socket pair, rather than
//! a real `erl` node.
use erl_dist::handshake::{ClientHandshake, ServerHandshake};
use erl_dist::node::{Creation, LocalNode, NodeName};

fn node(name: &str) -> LocalNode {
    LocalNode::new(name.parse::<NodeName>().unwrap(), Creation::new(1))
}

#[test]
fn client_and_server_handshake_agree() {
    smol::block_on(async {
        let (client_stream, server_stream) = smol::net::unix::UnixStream::pair().unwrap();

        let client_node = node("client@localhost");
        let server_node = node("server@localhost");
        let cookie = "sekrit";

        let (client_result, server_result) = futures::join!(
            ClientHandshake::connect(client_stream, &client_node, cookie),
            ServerHandshake::accept(server_stream, &server_node, cookie),
        );

        let (_stream, peer_seen_by_client) = client_result.expect("client handshake failed");
        let (_stream, peer_seen_by_server) = server_result.expect("server handshake failed");

        assert_eq!(peer_seen_by_client.name.to_string(), "server@localhost");
        assert_eq!(peer_seen_by_server.name.to_string(), "client@localhost");
        assert_eq!(peer_seen_by_client.flags, server_node.flags);
        assert_eq!(peer_seen_by_server.flags, client_node.flags);
    });
}

#[test]
fn mismatched_cookie_is_rejected() {
    smol::block_on(async {
        let (client_stream, server_stream) = smol::net::unix::UnixStream::pair().unwrap();

        let client_node = node("client@localhost");
        let server_node = node("server@localhost");

        let (client_result, server_result) = futures::join!(
            ClientHandshake::connect(client_stream, &client_node, "right-cookie"),
            ServerHandshake::accept(server_stream, &server_node, "wrong-cookie"),
        );

        assert!(client_result.is_err());
        assert!(server_result.is_err());
    });
}
