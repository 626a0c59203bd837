use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::render::check_surface_size;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    #[default]
    Png,
    Jpeg,
}

impl ImageEncoding {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// An off-screen drawing target the rasterizer paints into.
pub trait Surface: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Copies an RGBA8 frame onto the surface at the origin, clipped to the
    /// surface bounds.
    fn draw_rgba(&mut self, width: u32, height: u32, pixels: &[u8]) -> AppResult<()>;
    fn export(&self) -> AppResult<Vec<u8>>;
}

pub trait SurfaceFactory: Send + Sync {
    fn create(&self, width: u32, height: u32) -> AppResult<Box<dyn Surface>>;

    fn release(&self, surface: Box<dyn Surface>) {
        drop(surface);
    }

    fn encoding(&self) -> ImageEncoding;
}

/// Holds a surface for the duration of one render and hands it back to its
/// factory when dropped, whichever way the render exits.
pub struct ScopedSurface<'f> {
    factory: &'f dyn SurfaceFactory,
    surface: Option<Box<dyn Surface>>,
}

impl<'f> ScopedSurface<'f> {
    pub fn acquire(factory: &'f dyn SurfaceFactory, width: u32, height: u32) -> AppResult<Self> {
        let surface = factory.create(width, height)?;
        Ok(Self {
            factory,
            surface: Some(surface),
        })
    }

    pub fn surface_mut(&mut self) -> &mut dyn Surface {
        self.surface
            .as_deref_mut()
            .expect("scoped surface is present until drop")
    }

    pub fn export(&self) -> AppResult<Vec<u8>> {
        self.surface
            .as_deref()
            .expect("scoped surface is present until drop")
            .export()
    }
}

impl Drop for ScopedSurface<'_> {
    fn drop(&mut self) {
        if let Some(surface) = self.surface.take() {
            self.factory.release(surface);
        }
    }
}

pub struct RasterSurface {
    canvas: RgbaImage,
    encoding: ImageEncoding,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32, encoding: ImageEncoding) -> Self {
        Self {
            canvas: RgbaImage::new(width, height),
            encoding,
        }
    }
}

impl Surface for RasterSurface {
    fn width(&self) -> u32 {
        self.canvas.width()
    }

    fn height(&self) -> u32 {
        self.canvas.height()
    }

    fn draw_rgba(&mut self, width: u32, height: u32, pixels: &[u8]) -> AppResult<()> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(AppError::invalid_argument(format!(
                "frame has {} bytes, expected {expected} for {width}x{height}",
                pixels.len()
            )));
        }

        let frame = RgbaImage::from_raw(width, height, pixels.to_vec())
            .ok_or_else(|| AppError::invalid_argument("frame does not fit its dimensions"))?;
        image::imageops::replace(&mut self.canvas, &frame, 0, 0);
        Ok(())
    }

    fn export(&self) -> AppResult<Vec<u8>> {
        let mut data = Vec::new();
        let mut cursor = Cursor::new(&mut data);
        let written = match self.encoding {
            ImageEncoding::Png => self.canvas.write_to(&mut cursor, ImageFormat::Png),
            ImageEncoding::Jpeg => DynamicImage::ImageRgba8(self.canvas.clone())
                .to_rgb8()
                .write_to(&mut cursor, ImageFormat::Jpeg),
        };
        written.map_err(|err| {
            AppError::invalid_argument(format!("failed to encode surface: {err}"))
        })?;
        Ok(data)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RasterSurfaceFactory {
    encoding: ImageEncoding,
}

impl RasterSurfaceFactory {
    pub fn new(encoding: ImageEncoding) -> Self {
        Self { encoding }
    }
}

impl SurfaceFactory for RasterSurfaceFactory {
    fn create(&self, width: u32, height: u32) -> AppResult<Box<dyn Surface>> {
        if width == 0 || height == 0 {
            return Err(AppError::invalid_argument(
                "surface dimensions must be non-zero",
            ));
        }
        check_surface_size(width, height)?;
        Ok(Box::new(RasterSurface::new(width, height, self.encoding)))
    }

    fn encoding(&self) -> ImageEncoding {
        self.encoding
    }
}
