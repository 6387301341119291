//! XIAO MG24 Sense audio recorder
//!
//! Requests short audio captures from the board over USB-CDC serial, then
//! plots, plays back and saves them as WAV.

pub mod app;
pub mod audio;
pub mod config;
pub mod protocol;
pub mod recorder;
pub mod transport;
