// src/drivers/mod.rs
// device-facing layer: serial link, port negotiation, accelerometer samples
pub mod buffer;
pub mod error;
pub mod link;
pub mod negotiator;
pub mod pipeline;
pub mod source;
// re-exports for the engine and the binary
pub use buffer::{sample_count, BurstSummary, ConditionedSample, SampleBurst};
pub use error::DriverError;
pub use link::{ConnectedLink, PortDescriptor, PortOpener, SystemPorts};
pub use negotiator::{Handshake, ManualPolicy, NegotiationProfile, Negotiator};
pub use pipeline::{CalibrationProfile, SignalConditioner};
pub use source::{LinkSource, SampleSource, SimulatedSource};
