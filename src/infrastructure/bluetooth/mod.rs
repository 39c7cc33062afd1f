//! Bluetooth Module
//!
//! Provides the BLE link to the Hollow watch.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │  (Service loop - owns all session and link state)        │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼──────────────┬──────────────┐
//!         │             │              │              │
//!         ▼             ▼              ▼              ▼
//! ┌────────────┐ ┌─────────────┐ ┌────────────┐ ┌────────────┐
//! │ Connection │ │ Reassembler │ │ Fragmenter │ │  Protocol  │
//! │            │ │             │ │            │ │            │
//! │ - Scanner  │ │ - Tokens    │ │ - Chunking │ │ - UUIDs    │
//! │ - Backoff  │ │ - Audio     │ │ - Pacing   │ │ - Framing  │
//! └─────┬──────┘ └─────────────┘ └────────────┘ └────────────┘
//!       │
//!       ▼
//! ┌───────────────────────────┐
//! │ BleTransport (trait)      │
//! │ - platform stack / mock   │
//! └───────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - UUIDs, control tokens and inbound frame classification
//! - [`reassembler`] - Turns notifications into completed audio sessions
//! - [`fragmenter`] - Chunked, paced writes to the text characteristic
//! - [`transport`] - Platform seam for scan, GATT and notifications
//! - [`scanner`] - Watch discovery
//! - [`connection`] - Connection state machine and reconnect backoff
//! - [`mock`] - In-memory transport for tests and demos
//! - [`service`] - Main service coordinator

pub mod connection;
pub mod fragmenter;
pub mod mock;
pub mod protocol;
pub mod reassembler;
pub mod scanner;
pub mod service;
pub mod transport;

// Re-export main service for convenience
pub use service::{BluetoothService, Collaborators};
