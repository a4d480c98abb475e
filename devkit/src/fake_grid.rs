/*!
Faux serveur de jeu pour tests sans vrai grid

Écoute en TCP et en UDP sur le même port local :
- TCP : accepte puis ferme (suffit pour la sonde de joignabilité)
- UDP : répond aux requêtes A2S_INFO / A2S_PLAYER selon le `Behaviour` choisi
*/

use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;

const HEADER: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
const CHALLENGE: [u8; 4] = [0x0B, 0xAD, 0xF0, 0x0D];
const INFO_PAYLOAD_LEN: usize = b"Source Engine Query\0".len();
const BIND_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct FakePlayer {
    pub name: String,
    pub score: i32,
    pub duration: f32,
}

impl FakePlayer {
    pub fn new(name: &str, score: i32, duration: f32) -> Self {
        Self {
            name: name.into(),
            score,
            duration,
        }
    }
}

/// Comportement UDP du faux grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Réponses A2S correctes
    Answer,
    /// Joignable en TCP mais ne répond jamais en UDP
    Silent,
    /// Réponse info tronquée juste après le nom du serveur
    TruncatedInfo,
    /// Info correcte, requête joueurs ignorée
    SilentPlayers,
}

#[derive(Debug, Clone)]
pub struct FakeGridSpec {
    pub server_name: String,
    pub map: String,
    pub max_players: u8,
    pub players: Vec<FakePlayer>,
    pub challenge: bool,
    pub behaviour: Behaviour,
}

impl FakeGridSpec {
    pub fn new(server_name: &str, map: &str, max_players: u8) -> Self {
        Self {
            server_name: server_name.into(),
            map: map.into(),
            max_players,
            players: Vec::new(),
            challenge: false,
            behaviour: Behaviour::Answer,
        }
    }

    pub fn with_players(mut self, players: Vec<FakePlayer>) -> Self {
        self.players = players;
        self
    }

    pub fn with_challenge(mut self) -> Self {
        self.challenge = true;
        self
    }

    pub fn with_behaviour(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }
}

/// Grid de test ; les tâches d'écoute s'arrêtent au drop
pub struct FakeGrid {
    port: u16,
    queries: Arc<AtomicUsize>,
    tasks: Vec<JoinHandle<()>>,
}

impl FakeGrid {
    pub async fn start(spec: FakeGridSpec) -> Result<Self> {
        let (tcp, udp) = bind_pair().await?;
        let port = tcp.local_addr()?.port();
        let queries = Arc::new(AtomicUsize::new(0));

        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = tcp.accept().await {
                drop(stream);
            }
        });
        let answer = tokio::spawn(serve_udp(udp, spec, Arc::clone(&queries)));

        tracing::debug!(port, "fake grid started");
        Ok(Self {
            port,
            queries,
            tasks: vec![accept, answer],
        })
    }

    pub fn host(&self) -> &'static str {
        "127.0.0.1"
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Nombre de datagrammes UDP reçus
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl Drop for FakeGrid {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Port local sur lequel rien n'écoute (ni TCP ni UDP)
pub async fn closed_port() -> Result<u16> {
    let (tcp, udp) = bind_pair().await?;
    let port = tcp.local_addr()?.port();
    drop((tcp, udp));
    Ok(port)
}

async fn bind_pair() -> Result<(TcpListener, UdpSocket)> {
    for _ in 0..BIND_ATTEMPTS {
        let tcp = TcpListener::bind("127.0.0.1:0").await?;
        let port = tcp.local_addr()?.port();
        // le port UDP homonyme peut être pris : on retente avec un autre
        if let Ok(udp) = UdpSocket::bind(("127.0.0.1", port)).await {
            return Ok((tcp, udp));
        }
    }
    anyhow::bail!("no free TCP+UDP port pair after {BIND_ATTEMPTS} attempts")
}

async fn serve_udp(socket: UdpSocket, spec: FakeGridSpec, queries: Arc<AtomicUsize>) {
    let mut buf = [0u8; 1500];
    loop {
        let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
            continue;
        };
        queries.fetch_add(1, Ordering::SeqCst);

        if let Some(reply) = reply_to(&spec, &buf[..len]) {
            if let Err(e) = socket.send_to(&reply, peer).await {
                tracing::warn!("fake grid send error: {e}");
            }
        }
    }
}

fn reply_to(spec: &FakeGridSpec, request: &[u8]) -> Option<Vec<u8>> {
    if request.len() < 5 || request[..4] != HEADER {
        return None;
    }
    let (kind, rest) = (request[4], &request[5..]);

    match (kind, spec.behaviour) {
        (_, Behaviour::Silent) => None,
        (0x54, _) => {
            let challenge = rest.get(INFO_PAYLOAD_LEN..);
            if spec.challenge && challenge != Some(&CHALLENGE[..]) {
                return Some(packet(0x41, &CHALLENGE));
            }
            Some(packet(0x49, &info_body(spec)))
        }
        (0x55, Behaviour::SilentPlayers) => None,
        (0x55, _) => {
            if spec.challenge && rest != CHALLENGE {
                return Some(packet(0x41, &CHALLENGE));
            }
            Some(packet(0x44, &players_body(&spec.players)))
        }
        _ => None,
    }
}

fn packet(kind: u8, body: &[u8]) -> Vec<u8> {
    let mut pkt = HEADER.to_vec();
    pkt.push(kind);
    pkt.extend_from_slice(body);
    pkt
}

fn push_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn info_body(spec: &FakeGridSpec) -> Vec<u8> {
    let mut b = vec![17]; // protocol
    push_cstr(&mut b, &spec.server_name);
    if spec.behaviour == Behaviour::TruncatedInfo {
        return b;
    }
    push_cstr(&mut b, &spec.map);
    push_cstr(&mut b, "cstrike");
    push_cstr(&mut b, "Counter-Strike: Source");
    b.extend_from_slice(&240u16.to_le_bytes());
    b.push(spec.players.len().min(u8::MAX as usize) as u8);
    b.push(spec.max_players);
    b.push(0); // bots
    b.extend_from_slice(b"dl\0\x01"); // server type, environment, visibility, vac
    b
}

fn players_body(players: &[FakePlayer]) -> Vec<u8> {
    let mut b = vec![players.len().min(u8::MAX as usize) as u8];
    for (i, p) in players.iter().take(u8::MAX as usize).enumerate() {
        b.push(i as u8);
        push_cstr(&mut b, &p.name);
        b.extend_from_slice(&p.score.to_le_bytes());
        b.extend_from_slice(&p.duration.to_le_bytes());
    }
    b
}
