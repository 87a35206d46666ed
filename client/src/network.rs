use crate::input::BotInput;
use crate::reconciler::Reconciler;
use log::{debug, error, info};
use shared::platformer::{PlatformerInput, World};
use shared::{read_packet, write_packet, Event, FrameClock, Packet};
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Knobs for the headless client loop
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub tick_rate: u32,
    /// Stop after submitting this many frames
    pub frame_limit: Option<u32>,
    /// Simulated latency in milliseconds, split across send and receive
    pub fake_ping_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            frame_limit: None,
            fake_ping_ms: 0,
        }
    }
}

pub struct Client<R> {
    writer: OwnedWriteHalf,
    packets: mpsc::UnboundedReceiver<Packet<PlatformerInput>>,
    reconciler: R,
    bot: BotInput,
    options: ClientOptions,
    clock: FrameClock,
    frames_sent: u32,
}

impl<R> Client<R>
where
    R: Reconciler<State = World, Input = PlatformerInput>,
{
    pub async fn connect(
        server_addr: &str,
        reconciler: R,
        bot: BotInput,
        options: ClientOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to server...");
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        write_packet(&mut writer, &Packet::<PlatformerInput>::hello()).await?;

        let (tx, packets) = mpsc::unbounded_channel();
        let receive_delay = Duration::from_millis(options.fake_ping_ms / 2);
        tokio::spawn(async move {
            loop {
                match read_packet::<_, PlatformerInput>(&mut reader).await {
                    Ok(Some(packet)) => {
                        if !receive_delay.is_zero() {
                            sleep(receive_delay).await;
                        }
                        if tx.send(packet).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Server closed the connection");
                        break;
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Client {
            writer,
            packets,
            reconciler,
            bot,
            options,
            clock: FrameClock::new(),
            frames_sent: 0,
        })
    }

    pub fn reconciler(&self) -> &R {
        &self.reconciler
    }

    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }

    async fn send_packet(
        &mut self,
        packet: &Packet<PlatformerInput>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if self.options.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.options.fake_ping_ms / 2)).await;
        }
        write_packet(&mut self.writer, packet).await?;
        Ok(())
    }

    fn handle_packet(
        &mut self,
        packet: Packet<PlatformerInput>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &packet {
            Packet::ClientInitialize { .. } => self.clock.reset(),
            Packet::ServerFrame { .. } => self.clock.mark(),
            _ => {}
        }
        self.reconciler.handle_packet(packet)?;
        Ok(())
    }

    async fn tick(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let connection = match self.reconciler.connection() {
            Some(connection) => connection,
            None => return Ok(()),
        };
        if !self.reconciler.can_tick() {
            return Ok(());
        }

        let input = self.bot.next_input(self.reconciler.state(), connection);
        let packet = self
            .reconciler
            .tick_frame(vec![Event::input(connection, input)])?;
        self.send_packet(&packet).await?;
        self.frames_sent += 1;

        if self.frames_sent % 60 == 0 {
            info!(
                "Sent {} frames, confirmed frame {}, avg server frame interval {:?}",
                self.frames_sent,
                self.reconciler.confirmed_frame(),
                self.clock.average()
            );
        }
        Ok(())
    }

    fn finished(&self) -> bool {
        self.options
            .frame_limit
            .map(|limit| self.frames_sent >= limit)
            .unwrap_or(false)
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let period = Duration::from_secs_f64(1.0 / self.options.tick_rate.max(1) as f64);
        let mut tick_interval = interval(period);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                packet = self.packets.recv() => {
                    match packet {
                        Some(packet) => {
                            self.handle_packet(packet)?;
                            if !self.reconciler.is_connected() {
                                break;
                            }
                        }
                        None => {
                            self.reconciler.disconnect();
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Error sending frame: {}", e);
                        break;
                    }
                    if self.finished() {
                        info!("Frame limit reached after {} frames", self.frames_sent);
                        break;
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                    break;
                },
            }
        }

        debug!(
            "Client stopped at confirmed frame {}",
            self.reconciler.confirmed_frame()
        );
        Ok(())
    }
}
