//! Source Engine server queries (A2S_INFO / A2S_PLAYER) over UDP.
//!
//! Only single-packet replies are handled; a grid returning a split reply is
//! reported as malformed rather than reassembled.

use super::{PlayerRecord, QueryClient, QueryError, ServerInfo};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

const SINGLE_PACKET: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

const A2S_INFO: u8 = 0x54;
const A2S_PLAYER: u8 = 0x55;
const S2C_CHALLENGE: u8 = 0x41;
const S2A_INFO: u8 = 0x49;
const S2A_PLAYER: u8 = 0x44;

const INFO_PAYLOAD: &[u8] = b"Source Engine Query\0";
const NO_CHALLENGE: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const MAX_CHALLENGES: usize = 2;
const RECV_BUFFER: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Info,
    Players,
}

impl Request {
    fn encode(self, challenge: Option<[u8; 4]>) -> Vec<u8> {
        let mut pkt = SINGLE_PACKET.to_vec();
        match self {
            Request::Info => {
                pkt.push(A2S_INFO);
                pkt.extend_from_slice(INFO_PAYLOAD);
                if let Some(c) = challenge {
                    pkt.extend_from_slice(&c);
                }
            }
            Request::Players => {
                pkt.push(A2S_PLAYER);
                pkt.extend_from_slice(&challenge.unwrap_or(NO_CHALLENGE));
            }
        }
        pkt
    }

    fn reply_type(self) -> u8 {
        match self {
            Request::Info => S2A_INFO,
            Request::Players => S2A_PLAYER,
        }
    }
}

/// Client A2S sans état : une socket éphémère par appel.
#[derive(Debug, Clone, Default)]
pub struct A2sClient;

impl A2sClient {
    pub fn new() -> Self {
        Self
    }

    async fn exchange(
        &self,
        host: &str,
        port: u16,
        limit: Duration,
        request: Request,
    ) -> Result<Vec<u8>, QueryError> {
        tokio::time::timeout(limit, Self::exchange_inner(host, port, request))
            .await
            .map_err(|_| QueryError::NoResponse)?
    }

    async fn exchange_inner(
        host: &str,
        port: u16,
        request: Request,
    ) -> Result<Vec<u8>, QueryError> {
        let target = lookup_host((host, port))
            .await
            .map_err(|e| QueryError::Transport(format!("cannot resolve {host}: {e}")))?
            .next()
            .ok_or_else(|| QueryError::Transport(format!("no address for {host}")))?;

        let socket = bind_for(target).await?;
        socket.connect(target).await?;

        let mut buf = vec![0u8; RECV_BUFFER];
        let mut challenge = None;

        for _ in 0..=MAX_CHALLENGES {
            socket.send(&request.encode(challenge)).await?;
            let len = socket.recv(&mut buf).await?;

            match split_reply(&buf[..len])? {
                (S2C_CHALLENGE, body) => {
                    let token: [u8; 4] = body
                        .get(..4)
                        .and_then(|b| b.try_into().ok())
                        .ok_or_else(|| QueryError::Malformed("truncated challenge".into()))?;
                    debug!(%target, ?request, "challenge received");
                    challenge = Some(token);
                }
                (kind, body) if kind == request.reply_type() => return Ok(body.to_vec()),
                (kind, _) => {
                    return Err(QueryError::Malformed(format!(
                        "unexpected response type 0x{kind:02x}"
                    )))
                }
            }
        }

        Err(QueryError::Malformed("server kept issuing challenges".into()))
    }
}

#[async_trait]
impl QueryClient for A2sClient {
    async fn info(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<ServerInfo, QueryError> {
        let body = self.exchange(host, port, timeout, Request::Info).await?;
        Ok(decode_info(&body))
    }

    async fn players(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Vec<PlayerRecord>, QueryError> {
        let body = self.exchange(host, port, timeout, Request::Players).await?;
        decode_players(&body)
    }
}

async fn bind_for(target: SocketAddr) -> Result<UdpSocket, QueryError> {
    let local = if target.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
    Ok(UdpSocket::bind(local).await?)
}

/// Sépare l'en-tête du type de réponse et du corps
fn split_reply(packet: &[u8]) -> Result<(u8, &[u8]), QueryError> {
    match packet {
        [0xFF, 0xFF, 0xFF, 0xFF, kind, body @ ..] => Ok((*kind, body)),
        [0xFE, 0xFF, 0xFF, 0xFF, _, ..] => {
            Err(QueryError::Malformed("split responses are not supported".into()))
        }
        _ if packet.len() < 5 => Err(QueryError::Malformed(format!(
            "{} byte packet is too short",
            packet.len()
        ))),
        _ => Err(QueryError::Malformed("unexpected packet header".into())),
    }
}

/// Les champs tronqués restent à `None` : l'agrégateur décide s'ils manquent.
fn decode_info(body: &[u8]) -> ServerInfo {
    let mut info = ServerInfo::default();
    let _ = fill_info(&mut Reader::new(body), &mut info);
    info
}

fn fill_info(r: &mut Reader<'_>, info: &mut ServerInfo) -> Option<()> {
    r.u8()?; // protocol
    info.server_name = Some(r.cstring()?);
    info.map = Some(r.cstring()?);
    r.cstring()?; // folder
    r.cstring()?; // game
    r.u16_le()?; // app id
    info.player_count = Some(u32::from(r.u8()?));
    info.max_players = Some(u32::from(r.u8()?));
    Some(())
}

fn decode_players(body: &[u8]) -> Result<Vec<PlayerRecord>, QueryError> {
    let mut r = Reader::new(body);
    let count = r
        .u8()
        .ok_or_else(|| QueryError::Malformed("missing player count".into()))?;

    (0..count)
        .map(|i| {
            decode_player(&mut r)
                .ok_or_else(|| QueryError::Malformed(format!("player #{i} is truncated")))
        })
        .collect()
}

fn decode_player(r: &mut Reader<'_>) -> Option<PlayerRecord> {
    r.u8()?; // index
    Some(PlayerRecord {
        name: r.cstring()?,
        score: r.i32_le()?,
        duration: r.f32_le()?,
    })
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.buf.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn u16_le(&mut self) -> Option<u16> {
        self.take().map(u16::from_le_bytes)
    }

    fn i32_le(&mut self) -> Option<i32> {
        self.take().map(i32::from_le_bytes)
    }

    fn f32_le(&mut self) -> Option<f32> {
        self.take().map(f32::from_le_bytes)
    }

    fn cstring(&mut self) -> Option<String> {
        let rest = self.buf.get(self.pos..)?;
        let end = rest.iter().position(|&b| b == 0)?;
        self.pos += end + 1;
        Some(String::from_utf8_lossy(&rest[..end]).into_owned())
    }
}
