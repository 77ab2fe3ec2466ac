use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::HookKind;

/// Errors that can occur when attaching profilers to a host or producing reports.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The profiler is already attached to a host. A profiler can be attached to
    /// at most one host at a time and must be detached before attaching again.
    #[error("the {profiler} profiler is already attached to a host")]
    AlreadyAttached {
        /// Which kind of profiler rejected the attach.
        profiler: &'static str,
    },

    /// The host is not able to accept a hook registration, for example because
    /// it has been shut down.
    #[error("the host cannot accept a {hook} hook: {reason}")]
    HookUnavailable {
        /// The kind of hook that could not be registered.
        hook: HookKind,

        /// A human-readable description of why the host refused the hook.
        reason: String,
    },

    /// The same hook was registered with the host twice.
    #[error("this {hook} hook is already registered with the host")]
    DuplicateHook {
        /// The kind of hook that was registered twice.
        hook: HookKind,
    },

    /// A report template could not be parsed or refers to an unknown placeholder.
    #[error("invalid report template '{template}': {problem}")]
    InvalidTemplate {
        /// The template as provided by the caller.
        template: String,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// A rendered report could not be written to its destination file.
    ///
    /// The counters have already been reset when this error is returned.
    #[error("failed to write report to '{}'", .path.display())]
    WriteReport {
        /// The file the report was being written to.
        path: PathBuf,

        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// A specialized `Result` type for profiler operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
