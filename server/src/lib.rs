//! # Frame Sequencer Server
//!
//! Authoritative side of the frame synchronization protocol. The server
//! collects one batch of events per client per frame, finalizes frames in a
//! single global order, applies them to the canonical state and broadcasts
//! them back so every participant replays exactly the same history.
//!
//! ## Sequencer Variants
//!
//! ### Lockstep (`lockstep`)
//! A frame is finalized only when every connected client has submitted its
//! batch for it. Clients wait for each broadcast before producing the next
//! batch, so nobody ever runs ahead of the server.
//!
//! ### Rollback (`rollback`)
//! Frames are batched and drained the same way, but clients keep simulating
//! ahead on their own predictions and rewind when the authoritative frame
//! arrives. Disconnects are queued as server events and appended to the next
//! finalized frame.
//!
//! ## Module Organization
//!
//! - `connections`: registered connections and their pending batches
//! - `sequencer`: the `Sequencer` trait, the authoritative state holder and
//!   the `Outgoing` packets both variants produce
//! - `network`: TCP host running one sequencer behind a message loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::lockstep::LockstepServer;
//! use server::network::Server;
//! use server::sequencer::ServerConfig;
//! use shared::platformer::Platformer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sequencer = LockstepServer::new(Platformer, ServerConfig::default());
//!     let server = Server::new("127.0.0.1:8080", sequencer, None).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! Sequencers never touch sockets. Every operation returns the packets to
//! send along with their recipients, which keeps them testable in isolation
//! and lets the host stay a thin dispatcher.

pub mod connections;
pub mod lockstep;
pub mod network;
pub mod rollback;
pub mod sequencer;
