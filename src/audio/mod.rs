//! # Audio Module
//!
//! Clip catalog and per-guild playback for the airhorn bot.
//!
//! ## Architecture
//!
//! ### [`clip`] / [`catalog`] - Clip Catalog
//! - Loads every clip of every collection once at startup from `.dca` resources
//! - Weighted-random selection inside a collection
//! - Resolves chat commands to collections
//!
//! ### [`request`] - Play Requests
//! - Resolves the requester's voice channel
//! - Builds a play, plus its chained follow-up when the collection has one
//!
//! ### [`queue`] - Guild Queues
//! - Bounded FIFO per guild, dropping plays once full
//! - The queue entry doubles as the "guild is playing" flag
//!
//! ### [`player`] - Playback Driver
//! - At most one playback run per guild
//! - Joins, plays the chain, drains the queue, releases the connection
//!
//! ### [`transport`] / [`songbird_transport`] - Voice Transport
//! - Narrow session interface the driver talks to
//! - Songbird implementation used in production
//!
//! ## Audio Format
//!
//! - **Container**: length-prefixed Opus frames (`<u16 LE length><payload>`)
//! - **Sample Rate**: 48kHz, stereo, 20ms frames
//! - Frames are forwarded untouched; nothing is decoded or re-encoded.

pub mod catalog;
pub mod clip;
pub mod player;
pub mod queue;
pub mod request;
pub mod songbird_transport;
pub mod transport;
