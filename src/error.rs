use std::{io, path::PathBuf};

use thiserror::Error;

use crate::graphs::Vertex;

#[derive(Debug, Error)]
pub enum ContractionError {
    #[error("core factor must be between 0.0 and 1.0 (inclusive), got {0}")]
    InvalidCoreFactor(f32),

    #[error("thread count must be at least 1, got {0}")]
    InvalidThreadCount(usize),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: bad fingerprint, file was not written by this tool", .path.display())]
    BadFingerprint { path: PathBuf },

    #[error("{}: unsupported format version {version}", .path.display())]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("{}: file is truncated", .path.display())]
    Truncated { path: PathBuf },

    #[error("{}: checksum mismatch, expected {expected:08x} but got {actual:08x}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    #[error("edge {source_vertex} -> {target_vertex} is malformed: {reason}")]
    MalformedEdge {
        source_vertex: Vertex,
        target_vertex: Vertex,
        reason: &'static str,
    },

    #[error("node data of length {got} does not match node count {expected}")]
    NodeCountMismatch { expected: usize, got: usize },

    #[error("weight overflow while summing {left} and {right}")]
    WeightOverflow { left: u64, right: u64 },

    #[error("the merged edge container supports at most {limit} contraction passes")]
    TooManyPasses { limit: usize },

    #[error("contracting pass {pass}: {source}")]
    Pass {
        pass: usize,
        #[source]
        source: Box<ContractionError>,
    },

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl ContractionError {
    pub fn in_pass(self, pass: usize) -> ContractionError {
        ContractionError::Pass {
            pass,
            source: Box::new(self),
        }
    }
}
