use thiserror::Error;

/// Rejected model input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("texture {width}x{height} needs {expected} bytes of RGBA8, got {actual}")]
    TextureSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("part `{part}` has {positions} positions but {uvs} uvs")]
    UvCountMismatch {
        part: String,
        positions: usize,
        uvs: usize,
    },

    #[error("part `{part}` index count {count} is not a multiple of 3")]
    PartialTriangle { part: String, count: usize },

    #[error("part `{part}` references vertex {index} but has {vertex_count} vertices")]
    IndexOutOfRange {
        part: String,
        index: u16,
        vertex_count: usize,
    },

    #[error("part `{part}` has {count} vertices, more than a u16 index can address")]
    TooManyVertices { part: String, count: usize },

    #[error("mask `{mask}` of part `{part}` is not a part of this model")]
    UnknownMask { part: String, mask: String },
}
