pub mod artifacts;
pub mod error;
pub mod loader;
pub mod manifest;

pub use artifacts::{
    checksum, read_manifest, verify_run, write_run, ArtifactKind, ArtifactStore,
    DirectoryArtifactStore, InMemoryArtifactStore, RunContext,
};
pub use error::StoreError;
pub use loader::{load_orders, missing_columns, parse_orders, read_header, LoadedOrders};
pub use manifest::{
    ArtifactCheck, ArtifactEntry, ArtifactStatus, InputFingerprint, RunManifest,
    VerificationReport, MANIFEST_FILE,
};
