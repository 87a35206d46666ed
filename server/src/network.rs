//! Server network layer: TCP connections feeding a single sequencer loop

use crate::sequencer::{Outgoing, Sequencer};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{read_packet, write_packet, ConnectionId, Packet, SyncError, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from connection tasks to the sequencer loop
#[derive(Debug)]
pub enum ServerMessage<I> {
    Connected {
        addr: SocketAddr,
        outbox: mpsc::UnboundedSender<Packet<I>>,
        reply: oneshot::Sender<Result<ConnectionId, String>>,
    },
    PacketReceived {
        connection: ConnectionId,
        packet: Packet<I>,
    },
    ConnectionClosed {
        connection: ConnectionId,
    },
}

/// Owns the sequencer and the per-connection outboxes
///
/// Only the sequencer loop touches this, so no locking is involved.
struct Host<Q: Sequencer> {
    sequencer: Q,
    outboxes: HashMap<ConnectionId, mpsc::UnboundedSender<Packet<Q::Input>>>,
}

impl<Q> Host<Q>
where
    Q: Sequencer,
    Q::Input: Clone + Debug,
{
    fn dispatch(&self, outgoing: Vec<Outgoing<Q::Input>>) {
        for out in outgoing {
            for recipient in &out.recipients {
                match self.outboxes.get(recipient) {
                    Some(outbox) => {
                        if outbox.send(out.packet.clone()).is_err() {
                            debug!("Outbox for {} already closed", recipient);
                        }
                    }
                    None => debug!("No outbox for {}", recipient),
                }
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage<Q::Input>) {
        match message {
            ServerMessage::Connected {
                addr,
                outbox,
                reply,
            } => match self.sequencer.connect() {
                Ok((connection, outgoing)) => {
                    if reply.send(Ok(connection)).is_err() {
                        warn!("Connection task for {} vanished during handshake", addr);
                        let outgoing = self.sequencer.disconnect(connection);
                        self.dispatch(outgoing);
                        return;
                    }
                    info!("Client {} connected from {}", connection, addr);
                    self.outboxes.insert(connection, outbox);
                    self.dispatch(outgoing);
                }
                Err(e) => {
                    warn!("Rejecting client from {}: {}", addr, e);
                    let _ = reply.send(Err(e.to_string()));
                }
            },

            ServerMessage::PacketReceived { connection, packet } => match packet {
                Packet::ClientFrame { frame, events } => {
                    match self.sequencer.receive_frame(connection, frame, events) {
                        Ok(outgoing) => self.dispatch(outgoing),
                        Err(e) => warn!("Dropped frame {} from {}: {}", frame, connection, e),
                    }
                }
                other => {
                    warn!(
                        "Unexpected {} packet from client {}",
                        other.kind(),
                        connection
                    );
                }
            },

            ServerMessage::ConnectionClosed { connection } => {
                self.outboxes.remove(&connection);
                info!("Client {} disconnected", connection);
                let outgoing = self.sequencer.disconnect(connection);
                self.dispatch(outgoing);
            }
        }
    }

    fn broadcast_snapshot(&self) {
        match self.sequencer.snapshot() {
            Ok(Some(out)) => self.dispatch(vec![out]),
            Ok(None) => {}
            Err(e) => error!("Failed to encode state snapshot: {}", e),
        }
    }
}

/// TCP host around a [`Sequencer`]
pub struct Server<Q: Sequencer> {
    listener: TcpListener,
    host: Host<Q>,
    snapshot_interval: Option<Duration>,
}

impl<Q> Server<Q>
where
    Q: Sequencer + Send + 'static,
    Q::Input: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub async fn new(
        addr: &str,
        sequencer: Q,
        snapshot_interval: Option<Duration>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            host: Host {
                sequencer,
                outboxes: HashMap::new(),
            },
            snapshot_interval,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs until ctrl-c
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let Server {
            listener,
            mut host,
            snapshot_interval,
        } = self;

        let (server_tx, mut server_rx) = mpsc::unbounded_channel();
        spawn_acceptor::<Q::Input>(listener, server_tx);

        let mut snapshot_timer =
            interval(snapshot_interval.unwrap_or(Duration::from_secs(3600)));
        snapshot_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately
        snapshot_timer.tick().await;

        let mut last_logged_frame = host.sequencer.frame();
        info!("Server started successfully");

        loop {
            tokio::select! {
                message = server_rx.recv() => {
                    match message {
                        Some(message) => host.handle_message(message),
                        None => {
                            info!("Acceptor stopped, shutting down");
                            break;
                        }
                    }
                },

                _ = snapshot_timer.tick(), if snapshot_interval.is_some() => {
                    host.broadcast_snapshot();
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                    break;
                },
            }

            let frame = host.sequencer.frame();
            if frame / 60 != last_logged_frame / 60 {
                debug!(
                    "Frame {}: {} connections",
                    frame,
                    host.sequencer.connection_count()
                );
            }
            last_logged_frame = frame;
        }

        Ok(())
    }
}

fn spawn_acceptor<I>(listener: TcpListener, server_tx: mpsc::UnboundedSender<ServerMessage<I>>)
where
    I: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                    }
                    tokio::spawn(handle_connection(stream, addr, server_tx.clone()));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    });
}

async fn handle_connection<I>(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage<I>>,
) where
    I: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let (mut reader, mut writer) = stream.into_split();

    match read_packet::<_, I>(&mut reader).await {
        Ok(Some(Packet::Hello { protocol_version })) if protocol_version == PROTOCOL_VERSION => {}
        Ok(Some(Packet::Hello { protocol_version })) => {
            warn!(
                "Client {} speaks protocol {}, expected {}",
                addr, protocol_version, PROTOCOL_VERSION
            );
            let reason = SyncError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: protocol_version,
            };
            reject::<I>(&mut writer, &reason.to_string()).await;
            return;
        }
        Ok(Some(other)) => {
            warn!("Expected Hello from {}, got {}", addr, other.kind());
            return;
        }
        Ok(None) => return,
        Err(e) => {
            warn!("Handshake with {} failed: {}", addr, e);
            return;
        }
    }

    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = oneshot::channel();
    if server_tx
        .send(ServerMessage::Connected {
            addr,
            outbox: outbox_tx,
            reply: reply_tx,
        })
        .is_err()
    {
        return;
    }

    let connection = match reply_rx.await {
        Ok(Ok(connection)) => connection,
        Ok(Err(reason)) => {
            reject::<I>(&mut writer, &reason).await;
            return;
        }
        Err(_) => return,
    };

    tokio::spawn(drain_outbox(writer, outbox_rx, connection));
    read_until_closed(reader, connection, &server_tx).await;

    let _ = server_tx.send(ServerMessage::ConnectionClosed { connection });
}

async fn reject<I: Serialize>(writer: &mut OwnedWriteHalf, reason: &str) {
    let packet: Packet<I> = Packet::Disconnected {
        reason: reason.to_string(),
    };
    if let Err(e) = write_packet(writer, &packet).await {
        debug!("Failed to send rejection: {}", e);
    }
}

async fn drain_outbox<I: Serialize>(
    mut writer: OwnedWriteHalf,
    mut outbox: mpsc::UnboundedReceiver<Packet<I>>,
    connection: ConnectionId,
) {
    while let Some(packet) = outbox.recv().await {
        if let Err(e) = write_packet(&mut writer, &packet).await {
            warn!("Failed to send {} to {}: {}", packet.kind(), connection, e);
            break;
        }
    }
}

async fn read_until_closed<I: DeserializeOwned>(
    mut reader: OwnedReadHalf,
    connection: ConnectionId,
    server_tx: &mpsc::UnboundedSender<ServerMessage<I>>,
) {
    loop {
        match read_packet::<_, I>(&mut reader).await {
            Ok(Some(packet)) => {
                if server_tx
                    .send(ServerMessage::PacketReceived { connection, packet })
                    .is_err()
                {
                    error!("Sequencer loop gone, dropping {}", connection);
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading from {}: {}", connection, e);
                break;
            }
        }
    }
}
