//! lettersync-metadata — token metadata published from the confirmed event log.
//!
//! Every publish rewrites the full artifact set for the current log:
//!
//! ```text
//! METADATA_DIR/
//!   0             letter metadata (origin + every hop)
//!   0.svg         letter artwork, when a renderer is configured
//!   1 .. N        stamp metadata (origin + the first i hops)
//!   1.svg .. N.svg
//!   summary.json  { "stamps": [{ "ensNode", "tokenID" }] }
//! ```

pub mod angles;
pub mod publisher;

pub use angles::{angle_sequence, subject_angle, AngleError};
pub use publisher::{ArtworkRenderer, FsMetadataPublisher, Summary, SummaryStamp, TokenMetadata};
