// src/waveform/mod.rs
// test-plan sheets -> fixed-width controller commands
pub mod encoder;
pub mod plan;
pub mod segment;
pub use encoder::{encode, NoteRange, VoltageScaling, WaveformTable};
pub use plan::{Sheet, TestPlanRow};
pub use segment::{CONNECT_WAVEFORM, EMPTY_WAVEFORM, VERIFY_WAVEFORM};
