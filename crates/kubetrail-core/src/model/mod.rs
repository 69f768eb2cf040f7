//! Domain model: resource identity, canonical resources, scans and windows.

pub mod identity;
pub mod resource;
pub mod scan;
pub mod window;

pub use identity::ResourceIdentity;
pub use resource::{CanonicalResource, Fingerprint};
pub use scan::{Scan, ScanId, ScanMetadata, ScanScope, ScanSummary};
pub use window::{parse_duration, TimeWindow};
