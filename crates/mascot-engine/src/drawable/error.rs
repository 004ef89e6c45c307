use std::fmt;

use thiserror::Error;

/// Which of a drawable's buffers a size check refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BufferKind {
    Positions,
    Uvs,
    Indices,
    Opacity,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BufferKind::Positions => "position",
            BufferKind::Uvs => "uv",
            BufferKind::Indices => "index",
            BufferKind::Opacity => "opacity",
        })
    }
}

/// A drawable whose static description or attached buffers break its
/// invariants. Raised at construction or attachment, never at draw time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrawableError {
    #[error("drawable {drawable}: mask count is {mask_count} but {masks} masks are listed")]
    MaskCountMismatch {
        drawable: usize,
        mask_count: usize,
        masks: usize,
    },

    #[error("drawable {drawable}: mask {mask} is not one of the model's {drawable_count} drawables")]
    MaskOutOfRange {
        drawable: usize,
        mask: usize,
        drawable_count: usize,
    },

    #[error("drawable {drawable} lists itself as a mask")]
    SelfMask { drawable: usize },

    #[error("drawable {drawable}: texture {texture_index} out of range ({texture_count} textures)")]
    TextureOutOfRange {
        drawable: usize,
        texture_index: usize,
        texture_count: usize,
    },

    #[error("drawable {drawable}: {index_count} indices exceed the u32 draw range")]
    IndexCountOverflow { drawable: usize, index_count: usize },

    #[error("drawable {drawable}: {kind} buffer holds {actual} bytes, expected {expected}")]
    BufferSize {
        drawable: usize,
        kind: BufferKind,
        expected: u64,
        actual: u64,
    },

    #[error("drawable {drawable} has {index_count} indices but no index buffer")]
    MissingIndexBuffer { drawable: usize, index_count: usize },

    #[error("drawable {drawable} has no indices but an index buffer was attached")]
    UnexpectedIndexBuffer { drawable: usize },

    #[error("drawable {drawable} has no vertices; it takes no buffers")]
    EmptyMesh { drawable: usize },
}
