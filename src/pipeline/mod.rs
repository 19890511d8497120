//! The asset pipeline: source discovery, transforms, stages, caching,
//! and the task registry.

pub mod cache;
pub mod registry;
pub mod result;
pub mod source;
pub mod stage;
pub mod transform;

pub use cache::ChangeCache;
pub use registry::{Concurrency, Orchestrator, RegistryError};
pub use result::{ErrorKind, FileError, GroupResult, RunResult};
pub use source::{SourceError, SourceFile, SourceSpec};
pub use stage::Stage;
pub use transform::{
    CopyFile, ImageResize, MinifyScript, OutputFile, Stylesheet, Template, Transform,
    TransformError,
};
