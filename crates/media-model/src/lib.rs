//! Retime Media Model
//!
//! Defines the core data contracts for Retime:
//! - **Segments:** speed segments, pitch policies, and named presets
//! - **Requests:** process/trim/volume/thumbnail/metadata request shapes
//! - **Media:** probed tracks and the metadata response
//! - **Timeline:** composed output clips and the audio mix plan
//!
//! All times are seconds on either the source or the output timeline.

pub mod media;
pub mod request;
pub mod segment;
pub mod timeline;

pub use media::*;
pub use request::*;
pub use segment::*;
pub use timeline::*;
