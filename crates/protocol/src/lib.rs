//! klangwerk-protocol – Netzwerkprotokoll von Klangwerk
//!
//! Dieses Crate definiert das Frame-Format, mit dem Steuernachrichten und
//! Audiofragmente ueber dieselbe TCP-Verbindung transportiert werden, den
//! Reassembly-Puffer fuer eingehende Bytes sowie die JSON-Antworten des
//! Servers.

pub mod error;
pub mod reassembly;
pub mod response;
pub mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use reassembly::ReassemblyBuffer;
pub use response::{AudioEncoding, AudioFormat, ResponseStatus, ServerResponse};
pub use wire::{Frame, FrameCodec, FrameType};
