//! Base image metadata: descriptors, the shared lookup cache, and the local
//! and remote providers behind [`BaseImageResolver`].
//!
//! # Lookup order
//!
//! ```text
//! reference ──► "scratch"? ──yes──► empty descriptor
//!                  │no
//!                  ▼
//!           ImageConfigCache ──hit──► cached descriptor
//!                  │miss
//!                  ▼
//!        LocalImageInspector ──ok──► decode ──► insert-if-absent
//!                  │err
//!                  ▼
//!        RemoteConfigFetcher ──ok──► insert-if-absent
//!                  │err
//!                  ▼
//!           ImageLookup error
//! ```

pub mod cache;
pub mod descriptor;
pub mod local;
pub mod registry;
pub mod resolver;

pub use cache::ImageConfigCache;
pub use descriptor::ImageDescriptor;
pub use local::{DockerInspect, LocalImageInspector, NoLocalInspector};
pub use registry::{RegistryAuth, RegistryConfigFetcher, RemoteConfigFetcher};
pub use resolver::{is_scratch, BaseImageResolver};
