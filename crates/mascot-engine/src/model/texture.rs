use super::ModelError;

/// One texture atlas page: premultiplied RGBA8, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ModelError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected || width == 0 || height == 0 {
            return Err(ModelError::TextureSize {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// Builds an image by evaluating `f(x, y)` for every texel.
    ///
    /// Both dimensions must be non-zero.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        debug_assert!(width > 0 && height > 0, "texture dimensions must be non-zero");
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        Self { width, height, pixels }
    }

    /// 1x1 image of a single premultiplied color.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::from_fn(1, 1, |_, _| rgba)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn bytes_per_row(&self) -> u32 {
        self.width * 4
    }
}
