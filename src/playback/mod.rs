pub mod http;
pub mod links;
pub mod snapshot;
pub mod source;

pub use http::HttpRemotePlayback;
pub use links::{track_link, SourceRef};
pub use snapshot::{TrackId, TrackMetadata, TrackPage, TrackSnapshot};
pub use source::{RemotePlayback, SnapshotSource};
