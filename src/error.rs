//! Crate-level error type: a thin `thiserror` wrapper over each pipeline
//! stage's own error enum, in the public-wrapper pattern used by
//! `other_examples/manifests/dfgordon-a2kit` (library errors propagate
//! stage-specific detail; callers that just want a `Display`able failure
//! use this one).
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("compiling '{path}': {source}")]
    Unit { path: PathBuf, source: crate::unit::Error },
    #[error("linking: {0}")]
    Link(#[from] crate::linker::Error),
}
