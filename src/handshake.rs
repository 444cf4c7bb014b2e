//! Distribution handshake: the exchange two nodes perform before either
//! will accept control messages from the other.
//!
//! Implements the tag-`'N'` (8-byte flags) handshake introduced in OTP 23,
//! the one in active use for every modern peer. See [12.2 Distribution
//! Handshake](http://erlang.org/doc/apps/erts/erl_dist_protocol.html#distribution-handshake)
//! for the wire-level reference.
use crate::flags::DistributionFlags;
use crate::node::{Creation, LocalNode, NodeName};
use crate::socket::Socket;
use futures::io::{AsyncRead, AsyncWrite};
use log::debug;
use rand::Rng as _;

const TAG_NAME: u8 = b'N';
const TAG_STATUS: u8 = b's';
const TAG_CHALLENGE: u8 = b'N';
const TAG_CHALLENGE_REPLY: u8 = b'r';
const TAG_CHALLENGE_ACK: u8 = b'a';

/// Errors that can occur during a handshake attempt.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HandshakeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("peer rejected the handshake with status {status:?}")]
    Rejected { status: String },

    #[error("peer's challenge digest did not match the shared cookie")]
    DigestMismatch,

    #[error("expected message tag {expected:?}, got {got:?}")]
    UnexpectedTag { expected: char, got: u8 },

    #[error("peer node name is not valid: {0}")]
    InvalidNodeName(#[from] crate::node::NodeNameError),
}

/// The peer's identity and capabilities, established once a handshake
/// completes.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub name: NodeName,
    pub flags: DistributionFlags,
    pub creation: Creation,
}

fn calc_digest(cookie: &str, challenge: u32) -> [u8; 16] {
    md5::compute(format!("{cookie}{challenge}")).0
}

fn generate_challenge() -> u32 {
    rand::thread_rng().gen()
}

/// Drives the connecting ("client") side of a handshake to completion.
pub struct ClientHandshake;

impl ClientHandshake {
    pub async fn connect<T>(
        socket: T,
        local: &LocalNode,
        cookie: &str,
    ) -> Result<(T, PeerInfo), HandshakeError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut socket = Socket::new(socket);

        // send_name
        {
            let name = local.name.to_string();
            let mut w = socket.message_writer();
            w.write_u8(TAG_NAME)?;
            w.write_u64(local.flags.bits())?;
            w.write_u32(local.creation.value())?;
            w.write_u16(name.len() as u16)?;
            w.write_all(name.as_bytes())?;
            w.finish().await?;
        }
        debug!("sent handshake name as {}", local.name);

        // await_status
        let status = {
            let mut r = socket.message_reader().await?;
            let tag = r.read_u8().await?;
            if tag != TAG_STATUS {
                return Err(HandshakeError::UnexpectedTag {
                    expected: 's',
                    got: tag,
                });
            }
            let bytes = r.read_bytes_to_end().await?;
            String::from_utf8_lossy(&bytes).into_owned()
        };
        if status != "ok" && status != "ok_simultaneous" {
            return Err(HandshakeError::Rejected { status });
        }
        debug!("peer accepted handshake name with status {status:?}");

        // await_challenge
        let (peer_flags, peer_challenge, peer_creation, peer_name) =
            read_challenge(&mut socket).await?;

        // send_challenge_reply
        let our_challenge = generate_challenge();
        let digest = calc_digest(cookie, peer_challenge);
        {
            let mut w = socket.message_writer();
            w.write_u8(TAG_CHALLENGE_REPLY)?;
            w.write_u32(our_challenge)?;
            w.write_all(&digest)?;
            w.finish().await?;
        }

        // await_ack
        {
            let mut r = socket.message_reader().await?;
            let tag = r.read_u8().await?;
            if tag != TAG_CHALLENGE_ACK {
                return Err(HandshakeError::UnexpectedTag {
                    expected: 'a',
                    got: tag,
                });
            }
            let mut their_digest = [0u8; 16];
            r.read_exact(&mut their_digest).await?;
            let expected = calc_digest(cookie, our_challenge);
            if their_digest != expected {
                return Err(HandshakeError::DigestMismatch);
            }
        }

        let peer = PeerInfo {
            name: peer_name.parse()?,
            flags: peer_flags,
            creation: Creation::new(peer_creation),
        };
        Ok((socket.into_inner(), peer))
    }
}

/// Drives the accepting ("server") side of a handshake to completion.
pub struct ServerHandshake;

impl ServerHandshake {
    pub async fn accept<T>(
        socket: T,
        local: &LocalNode,
        cookie: &str,
    ) -> Result<(T, PeerInfo), HandshakeError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut socket = Socket::new(socket);

        // await_name
        let (peer_flags, peer_creation, peer_name) = {
            let mut r = socket.message_reader().await?;
            let tag = r.read_u8().await?;
            if tag != TAG_NAME {
                return Err(HandshakeError::UnexpectedTag {
                    expected: 'N',
                    got: tag,
                });
            }
            let flags = DistributionFlags::from_bits_truncate(r.read_u64().await?);
            let creation = r.read_u32().await?;
            let name = r.read_u16_string().await?;
            (flags, creation, name)
        };
        debug!("received handshake name from {peer_name}");

        // send_status
        {
            let mut w = socket.message_writer();
            w.write_u8(TAG_STATUS)?;
            w.write_all(b"ok")?;
            w.finish().await?;
        }

        // send_challenge
        let our_challenge = generate_challenge();
        {
            let name = local.name.to_string();
            let mut w = socket.message_writer();
            w.write_u8(TAG_CHALLENGE)?;
            w.write_u64(local.flags.bits())?;
            w.write_u32(our_challenge)?;
            w.write_u32(local.creation.value())?;
            w.write_u16(name.len() as u16)?;
            w.write_all(name.as_bytes())?;
            w.finish().await?;
        }

        // await_challenge_reply
        let (peer_challenge, peer_digest) = {
            let mut r = socket.message_reader().await?;
            let tag = r.read_u8().await?;
            if tag != TAG_CHALLENGE_REPLY {
                return Err(HandshakeError::UnexpectedTag {
                    expected: 'r',
                    got: tag,
                });
            }
            let challenge = r.read_u32().await?;
            let mut digest = [0u8; 16];
            r.read_exact(&mut digest).await?;
            (challenge, digest)
        };
        let expected = calc_digest(cookie, our_challenge);
        if peer_digest != expected {
            return Err(HandshakeError::DigestMismatch);
        }

        // send_challenge_ack
        {
            let digest = calc_digest(cookie, peer_challenge);
            let mut w = socket.message_writer();
            w.write_u8(TAG_CHALLENGE_ACK)?;
            w.write_all(&digest)?;
            w.finish().await?;
        }

        let peer = PeerInfo {
            name: peer_name.parse()?,
            flags: peer_flags,
            creation: Creation::new(peer_creation),
        };
        Ok((socket.into_inner(), peer))
    }
}

async fn read_challenge<T>(
    socket: &mut Socket<T>,
) -> Result<(DistributionFlags, u32, u32, String), HandshakeError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut r = socket.message_reader().await?;
    let tag = r.read_u8().await?;
    if tag != TAG_CHALLENGE {
        return Err(HandshakeError::UnexpectedTag {
            expected: 'N',
            got: tag,
        });
    }
    let flags = DistributionFlags::from_bits_truncate(r.read_u64().await?);
    let challenge = r.read_u32().await?;
    let creation = r.read_u32().await?;
    let name = r.read_u16_string().await?;
    Ok((flags, challenge, creation, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_vector() {
        let digest = calc_digest("kaka", 0xB0BA_BEEF);
        assert_eq!(
            digest,
            [
                0xD7, 0x6B, 0x31, 0x0C, 0xD6, 0x63, 0x6B, 0x27, 0xE4, 0xB3, 0x6D, 0x86, 0xC5,
                0x50, 0x8B, 0x50
            ]
        );
    }
}
