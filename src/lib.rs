//! # Music Maniac
//!
//! Discord music bot built around a per-guild playback orchestrator.
//!
//! Each guild gets one session task that owns its queue, its current track
//! and its voice connection; every command and every asynchronous event for
//! that guild is processed in order by that task. See [`audio`].

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod storage;
pub mod ui;
