//! # Frame Sync Client Library
//!
//! Client side of the frame synchronization protocol. A client receives a
//! bootstrap snapshot from the server, submits one event batch per local
//! frame, and folds the server's finalized frames into its local copy of the
//! simulation state.
//!
//! ## Reconcilers
//!
//! ### Lockstep (`lockstep`)
//! Never simulates past the last confirmed frame. After submitting a batch
//! the client waits for the matching server frame before it may tick again,
//! so at most one batch is ever outstanding.
//!
//! ### Rollback (`rollback`)
//! Simulates its own batches immediately and keeps them as predictions.
//! Every authoritative frame rewinds to the last confirmed state, replays
//! the server's events and then re-applies the predictions that are still
//! unconfirmed.
//!
//! Both implement the `Reconciler` trait from `reconciler`, which is what
//! the network driver talks to.
//!
//! ## Other Modules
//!
//! - `input`: headless bot producing platformer inputs
//! - `network`: TCP driver that connects, pumps packets and ticks frames
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::BotInput;
//! use client::network::{Client, ClientOptions};
//! use client::rollback::RollbackClient;
//! use shared::platformer::Platformer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reconciler = RollbackClient::new(Platformer);
//!     let mut client = Client::connect(
//!         "127.0.0.1:8080",
//!         reconciler,
//!         BotInput::new(),
//!         ClientOptions::default(),
//!     )
//!     .await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod lockstep;
pub mod network;
pub mod reconciler;
pub mod rollback;
