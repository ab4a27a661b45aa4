//! Network layer: listeners, line framing, and the connection loops.
//!
//! Each connection gets a read half driven here and a writer task fed by
//! an unbounded mpsc queue; everything that wants to talk to the
//! connection goes through that queue, so emit order is preserved per
//! link. Client connections walk a small registration state machine
//! before joining registry dispatch; server connections complete the
//! `PASS`/`CAPAB`/`SERVER` handshake against a configured link block.

use crate::caps::CapSet;
use crate::db::Database;
use crate::error::HandlerError;
use crate::handlers::{Context, Origin, PeerContext, Registry};
use crate::snomask::SnoMask;
use crate::state::{user::User, Matrix, Peer};
use corvid_proto::{irc_fold, is_valid_nick, Message, MessageRef, Numeric};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, info, warn};

const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_LINE_LENGTH: usize = 510;

/// Bind the configured listeners and spawn their accept loops.
pub async fn start_listeners(
    matrix: Arc<Matrix>,
    db: Database,
    registry: Arc<Registry>,
) -> anyhow::Result<()> {
    let client_listener = TcpListener::bind(matrix.config.listen.client).await?;
    info!(addr = %matrix.config.listen.client, "Client listener up");
    {
        let (matrix, db, registry) = (matrix.clone(), db.clone(), registry.clone());
        tokio::spawn(async move {
            loop {
                match client_listener.accept().await {
                    Ok((stream, addr)) => {
                        let (matrix, db, registry) =
                            (matrix.clone(), db.clone(), registry.clone());
                        tokio::spawn(async move {
                            handle_client(matrix, db, registry, stream, addr.to_string()).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "Client accept failed"),
                }
            }
        });
    }

    if let Some(addr) = matrix.config.listen.server {
        let server_listener = TcpListener::bind(addr).await?;
        info!(addr = %addr, "Server-link listener up");
        tokio::spawn(async move {
            loop {
                match server_listener.accept().await {
                    Ok((stream, addr)) => {
                        let (matrix, db, registry) =
                            (matrix.clone(), db.clone(), registry.clone());
                        tokio::spawn(async move {
                            handle_server_link(matrix, db, registry, stream, addr.to_string())
                                .await;
                        });
                    }
                    Err(e) => warn!(error = %e, "Server accept failed"),
                }
            }
        });
    }

    Ok(())
}

/// Spawn a writer task that drains a message queue into the sink.
fn spawn_writer(
    mut sink: futures_util::stream::SplitSink<Framed<TcpStream, LinesCodec>, String>,
) -> mpsc::UnboundedSender<Message> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg.to_string()).await.is_err() {
                break;
            }
        }
    });
    tx
}

// ============================================================================
// Client connections
// ============================================================================

struct Handshake {
    nick: Option<String>,
    user: Option<(String, String)>,
}

async fn handle_client(
    matrix: Arc<Matrix>,
    db: Database,
    registry: Arc<Registry>,
    stream: TcpStream,
    addr: String,
) {
    let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let (sink, mut lines) = framed.split();
    let writer = spawn_writer(sink);

    let server_prefix = matrix.server_prefix();
    let mut hs = Handshake {
        nick: None,
        user: None,
    };

    // Registration: NICK + USER within the timeout.
    let registered = loop {
        let line = match tokio::time::timeout(REGISTRATION_TIMEOUT, lines.next()).await {
            Ok(Some(Ok(line))) => line,
            Ok(Some(Err(_))) | Ok(None) | Err(_) => return,
        };
        let Ok(msg) = MessageRef::parse(&line) else {
            continue;
        };

        match msg.command.to_ascii_uppercase().as_str() {
            "NICK" => {
                let Some(nick) = msg.arg(0).filter(|n| !n.is_empty()) else {
                    let _ = writer.send(
                        Message::numeric(
                            Numeric::ERR_ERRONEUSNICKNAME,
                            vec!["*".into(), "*".into(), "Erroneous Nickname".into()],
                        )
                        .with_prefix(server_prefix.clone()),
                    );
                    continue;
                };
                if !is_valid_nick(nick, matrix.config.limits.nicklen) {
                    let _ = writer.send(
                        Message::numeric(
                            Numeric::ERR_ERRONEUSNICKNAME,
                            vec!["*".into(), nick.into(), "Erroneous Nickname".into()],
                        )
                        .with_prefix(server_prefix.clone()),
                    );
                    continue;
                }
                // Reserved nicks are refused at the door.
                let reserved = matrix
                    .store
                    .lock()
                    .resvs
                    .matching_nick_resv(nick)
                    .is_some();
                if reserved {
                    let _ = writer.send(
                        Message::numeric(
                            Numeric::ERR_ERRONEUSNICKNAME,
                            vec!["*".into(), nick.into(), "Erroneous Nickname".into()],
                        )
                        .with_prefix(server_prefix.clone()),
                    );
                    continue;
                }
                if matrix.find_uid_by_nick(nick).is_some() {
                    let _ = writer.send(
                        Message::numeric(
                            Numeric::ERR_NICKNAMEINUSE,
                            vec![
                                "*".into(),
                                nick.into(),
                                "Nickname is already in use".into(),
                            ],
                        )
                        .with_prefix(server_prefix.clone()),
                    );
                    continue;
                }
                hs.nick = Some(nick.to_string());
            }
            "USER" => {
                let (Some(username), Some(realname)) = (msg.arg(0), msg.arg(3)) else {
                    let _ = writer.send(
                        Message::numeric(
                            Numeric::ERR_NEEDMOREPARAMS,
                            vec!["*".into(), "USER".into(), "Not enough parameters".into()],
                        )
                        .with_prefix(server_prefix.clone()),
                    );
                    continue;
                };
                hs.user = Some((username.to_string(), realname.to_string()));
            }
            "QUIT" => return,
            "CAP" => {} // no IRCv3 negotiation toward clients
            _ => {
                let _ = writer.send(
                    Message::numeric(
                        Numeric::ERR_NOTREGISTERED,
                        vec!["*".into(), "You have not registered".into()],
                    )
                    .with_prefix(server_prefix.clone()),
                );
            }
        }

        if let (Some(nick), Some(user)) = (&hs.nick, &hs.user) {
            break (nick.clone(), user.clone());
        }
    };

    let (nick, (username, realname)) = registered;
    let uid = matrix.next_uid();
    let host = addr.split(':').next().unwrap_or(&addr).to_string();
    matrix.add_user(User {
        uid: uid.clone(),
        nick: nick.clone(),
        user: username,
        host,
        realname,
        server: matrix.info.name.clone(),
        invisible: false,
        oper: None,
        snomask: SnoMask::NONE,
        channels: Default::default(),
        sender: Some(writer.clone()),
    });

    let _ = writer.send(
        Message::numeric(
            Numeric::RPL_WELCOME,
            vec![
                nick.clone(),
                format!(
                    "Welcome to the {} Internet Relay Network {}",
                    matrix.info.network, nick
                ),
            ],
        )
        .with_prefix(server_prefix.clone()),
    );
    debug!(uid = %uid, nick = %nick, "Client registered");

    // Steady state: registry dispatch.
    while let Some(Ok(line)) = lines.next().await {
        let Ok(msg) = MessageRef::parse(&line) else {
            continue;
        };
        let ctx = Context {
            matrix: &matrix,
            db: &db,
            uid: &uid,
        };
        let Some(handler) = registry.client(msg.command) else {
            ctx.numeric(
                Numeric::ERR_UNKNOWNCOMMAND,
                vec![msg.command.to_string(), "Unknown command".to_string()],
            )
            .await;
            continue;
        };
        match handler.handle(&ctx, &msg).await {
            Ok(()) => {}
            Err(HandlerError::Quit(_)) => break,
            Err(HandlerError::Send(_)) => break,
            Err(e) => {
                if let Some(reply) =
                    e.to_irc_reply(&matrix.info.name, &ctx.nick().await, msg.command)
                {
                    let _ = writer.send(reply);
                }
            }
        }
    }

    matrix.remove_user(&uid).await;
    debug!(uid = %uid, "Client disconnected");
}

// ============================================================================
// Server links
// ============================================================================

struct LinkHandshake {
    password: Option<String>,
    sid: Option<String>,
    caps: CapSet,
}

async fn handle_server_link(
    matrix: Arc<Matrix>,
    db: Database,
    registry: Arc<Registry>,
    stream: TcpStream,
    addr: String,
) {
    let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let (sink, mut lines) = framed.split();
    let writer = spawn_writer(sink);

    let mut hs = LinkHandshake {
        password: None,
        sid: None,
        caps: CapSet::EMPTY,
    };

    // PASS/CAPAB ... SERVER completes the handshake.
    let (peer_name, peer_desc) = loop {
        let line = match tokio::time::timeout(REGISTRATION_TIMEOUT, lines.next()).await {
            Ok(Some(Ok(line))) => line,
            Ok(Some(Err(_))) | Ok(None) | Err(_) => return,
        };
        let Ok(msg) = MessageRef::parse(&line) else {
            continue;
        };

        match msg.command.to_ascii_uppercase().as_str() {
            // PASS <password> TS 6 :<sid>
            "PASS" => {
                hs.password = msg.arg(0).map(str::to_string);
                hs.sid = msg.arg(3).map(str::to_string);
            }
            // CAPAB :<tokens>
            "CAPAB" => {
                let tokens = msg.args.iter().flat_map(|a| a.split_whitespace());
                hs.caps = CapSet::parse_tokens(tokens);
            }
            // SERVER <name> <hopcount> :<description>
            "SERVER" => {
                let Some(name) = msg.arg(0) else { continue };
                break (name.to_string(), msg.arg(2).unwrap_or("").to_string());
            }
            "QUIT" | "ERROR" => return,
            _ => {}
        }
    };

    let authorized = matrix.config.links.iter().any(|link| {
        corvid_proto::irc_eq(&link.name, &peer_name)
            && hs.password.as_deref() == Some(link.password.as_str())
    });
    if !authorized {
        warn!(peer = %peer_name, addr = %addr, "Unauthorized link attempt");
        let _ = writer.send(Message::new(
            "ERROR",
            vec![format!("Closing Link: {peer_name} (No matching link block)")],
        ));
        return;
    }
    let Some(peer_sid) = hs.sid else {
        let _ = writer.send(Message::new(
            "ERROR",
            vec![format!("Closing Link: {peer_name} (No SID)")],
        ));
        return;
    };
    if !hs.caps.has_all(CapSet::TS6) {
        let _ = writer.send(Message::new(
            "ERROR",
            vec![format!("Closing Link: {peer_name} (TS6 required)")],
        ));
        return;
    }

    // Our side of the handshake, then the prop-ban burst.
    let our_caps = CapSet::TS6 | CapSet::ENCAP | CapSet::CLUSTER | CapSet::BAN;
    let _ = writer.send(Message::new(
        "PASS",
        vec![
            hs.password.unwrap_or_default(),
            "TS".into(),
            "6".into(),
            matrix.info.sid.clone(),
        ],
    ));
    let _ = writer.send(Message::new("CAPAB", vec![our_caps.tokens()]));
    let _ = writer.send(Message::new(
        "SERVER",
        vec![
            matrix.info.name.clone(),
            "1".into(),
            matrix.info.description.clone(),
        ],
    ));

    let peer = Arc::new(Peer {
        name: peer_name.clone(),
        sid: peer_sid,
        caps: hs.caps,
        sender: writer.clone(),
    });
    matrix.peers.insert(irc_fold(&peer_name), peer.clone());

    if peer.caps.has_all(CapSet::BAN | CapSet::TS6) {
        let frames: Vec<Message> = {
            let store = matrix.store.lock();
            store
                .prop_bans
                .iter()
                .map(|conf| crate::s2s::router::ban_r_frame(&matrix.info.sid, conf))
                .collect()
        };
        for frame in frames {
            peer.send(frame);
        }
    }

    info!(peer = %peer_name, desc = %peer_desc, "Server link established");
    matrix
        .sendto_realops(
            SnoMask::GENERAL,
            &format!("Link with {peer_name} established"),
        )
        .await;

    // Frame dispatch.
    while let Some(Ok(line)) = lines.next().await {
        let Ok(msg) = MessageRef::parse(&line) else {
            continue;
        };

        let origin = match msg.source() {
            Some(token) if matrix.users.contains_key(token) => Origin::Person(token.to_string()),
            Some(token) => Origin::Server(token.to_string()),
            None => Origin::Server(peer.name.clone()),
        };
        let ctx = PeerContext {
            matrix: &matrix,
            db: &db,
            peer: &peer,
            origin,
        };
        match registry.peer(msg.command) {
            Some(handler) => {
                if let Err(e) = handler.handle(&ctx, &msg).await {
                    debug!(error = %e, command = %msg.command, "Peer handler error");
                }
            }
            None => debug!(command = %msg.command, "Unhandled peer command"),
        }
    }

    // Netsplit: drop the link and every user behind it.
    matrix.peers.remove(&irc_fold(&peer_name));
    let lost: Vec<String> = {
        let mut lost = Vec::new();
        for entry in matrix.users.iter() {
            let user = entry.value().read().await;
            if corvid_proto::irc_eq(&user.server, &peer_name) {
                lost.push(user.uid.clone());
            }
        }
        lost
    };
    for uid in lost {
        matrix.remove_user(&uid).await;
    }
    matrix
        .sendto_realops(SnoMask::GENERAL, &format!("Link with {peer_name} lost"))
        .await;
    info!(peer = %peer_name, "Server link closed");
}
