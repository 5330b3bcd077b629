//! Core of an NFC daemon: polling loop, tag/device lifecycle manager,
//! LLCP/SNEP peer-to-peer session manager, and NDEF record codec.
//! [`facade`] wires just enough of a transport around the core to prove it
//! runs end to end.

pub mod config;
pub mod device_store;
pub mod driver;
pub mod engine;
pub mod error;
pub mod event_bridge;
pub mod facade;
pub mod llcp;
pub mod ndef;
pub mod tag_store;
pub mod types;
