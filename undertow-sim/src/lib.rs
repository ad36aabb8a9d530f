//! Undertow Simulation - In-memory stand-ins for the remote store and ffmpeg.
//!
//! Lets the streaming and sampling paths run without network access or
//! external binaries. The chunk store enforces the same alignment and
//! per-call rules as a real store and records every call, so tests can
//! assert on offset accounting as well as on returned bytes.

pub mod content;
pub mod frames;
pub mod store;

pub use content::{DemoObject, demo_store, deterministic_content, fake_mp4};
pub use frames::SimulatedFrameExtractor;
pub use store::{FetchRecord, Fault, InMemoryChunkStore};
