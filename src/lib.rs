//! Hollow Link
//!
//! BLE session engine for the Hollow watch: connection management with
//! reconnect backoff, audio frame reassembly, IMA-ADPCM decoding, assistant
//! round trips and paced reply delivery back to the watch.

pub mod audio;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::models::{AppEvent, BluetoothCommand, ConnectionState, VoiceState};
pub use domain::settings::SettingsService;
pub use error::{LinkError, PipelineError, ProtocolError};
pub use infrastructure::bluetooth::mock::MockTransport;
pub use infrastructure::bluetooth::{BluetoothService, Collaborators};
