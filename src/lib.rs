#![doc(html_root_url = "https://docs.rs/tssend/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tssend - real-time MPEG-TS sender
//!
//! `tssend` takes already-encoded access units (H.264/H.265 video, AAC/Opus
//! audio), packetizes them into an MPEG-2 transport stream with PAT, PMT and
//! SDT tables, queues the result under backpressure and drains the queue onto
//! a network transport, reporting throughput as it goes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tssend::sender::{TsSender, UdpTransport};
//! use tssend::SenderConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (sender, mut events) = TsSender::new(SenderConfig::from_env()?)?;
//!     sender.set_audio_info(48000, true)?;
//!     sender.start(UdpTransport::connect("udp://239.0.0.1:1234").await?)?;
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!
//!     for i in 0..100u64 {
//!         let pts = Duration::from_millis(i * 21);
//!         sender.send_audio_frame(&[0x21, 0x00, 0x49, 0x90], pts)?;
//!         tokio::time::sleep(Duration::from_millis(21)).await;
//!     }
//!     sender.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: codec identifiers and the transport packet type
//! - `codec`: ADTS, Opus and H.26x parameter set framing
//! - `format::ts`: TS packets, PES, PSI/SI tables, table registry,
//!   injection policy and packetizers
//! - `sender`: bounded send queue, sender loop, throughput estimation and
//!   transports
//! - `config`: sender settings and their environment overlay
//! - `error`: the crate error type
//! - `utils`: MPEG-2 CRC32

/// Codec identifiers and transport packets
pub mod av;

/// Codec-specific framing
pub mod codec;

/// Sender configuration
pub mod config;

/// Error types and utilities
pub mod error;

/// Container formats
pub mod format;

/// Queued sender pipeline
pub mod sender;

/// Common utilities and helper functions
pub mod utils;

pub use config::SenderConfig;
pub use error::{Result, TsError};
