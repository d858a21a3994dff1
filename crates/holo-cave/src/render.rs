//! Render primitives shared by the compositor and the scene backend.

use glam::Mat4;
use std::fmt;

pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const COUNT: usize = 2;

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            Eye::Left
        } else {
            Eye::Right
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Eye::Left => Eye::Right,
            Eye::Right => Eye::Left,
        }
    }

    /// Sign of the half-interocular offset along the head's right axis.
    pub fn offset_sign(self) -> f32 {
        match self {
            Eye::Left => -1.0,
            Eye::Right => 1.0,
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eye::Left => write!(f, "left"),
            Eye::Right => write!(f, "right"),
        }
    }
}

/// One solved pass handed to the scene backend.
#[derive(Debug, Clone, Copy)]
pub struct RenderView {
    pub eye: Eye,
    pub view: Mat4,
    pub projection: Mat4,
}

impl RenderView {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Scene backend seam. Implementations draw synchronously into the given
/// RGBA8 target; the engine never touches a GPU itself.
pub trait SceneRenderer: Send {
    fn render(&mut self, view: &RenderView, target: &mut SurfaceImage);
}

/// CPU-side RGBA8 image used as a render target and as the frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl SurfaceImage {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for pixel in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&rgba);
        }
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let at = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.pixels[at..at + BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0; 4];
        }
        let at = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [
            self.pixels[at],
            self.pixels[at + 1],
            self.pixels[at + 2],
            self.pixels[at + 3],
        ]
    }

    /// Takes the size and pixels of `other`, reusing this allocation.
    pub fn copy_from(&mut self, other: &SurfaceImage) {
        self.width = other.width;
        self.height = other.height;
        self.pixels.clear();
        self.pixels.extend_from_slice(&other.pixels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_images_are_clamped() {
        let img = SurfaceImage::new(0, 0);
        assert_eq!((img.width(), img.height()), (1, 1));
        assert_eq!(img.pixels().len(), BYTES_PER_PIXEL);
    }

    #[test]
    fn pixels_round_trip() {
        let mut img = SurfaceImage::new(4, 3);
        img.put_pixel(2, 1, [10, 20, 30, 255]);
        assert_eq!(img.pixel(2, 1), [10, 20, 30, 255]);
        assert_eq!(img.pixel(0, 0), [0, 0, 0, 0]);
        // Out of bounds writes are dropped.
        img.put_pixel(9, 9, [1, 1, 1, 1]);
        assert_eq!(img.pixel(9, 9), [0, 0, 0, 0]);
    }

    #[test]
    fn copy_from_tracks_size_changes() {
        let mut dst = SurfaceImage::new(2, 2);
        let mut src = SurfaceImage::new(3, 1);
        src.fill([5, 5, 5, 5]);
        dst.copy_from(&src);
        assert_eq!((dst.width(), dst.height()), (3, 1));
        assert_eq!(dst.pixels(), src.pixels());
    }

    #[test]
    fn eye_indexing_is_stable() {
        assert_eq!(Eye::from_index(0), Eye::Left);
        assert_eq!(Eye::from_index(1), Eye::Right);
        assert_eq!(Eye::Left.opposite(), Eye::Right);
        assert_eq!(Eye::Left.offset_sign(), -1.0);
        assert_eq!(Eye::Right.offset_sign(), 1.0);
    }
}
