use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::backend::PageHandle;
use crate::error::{AppError, AppResult};
use crate::surface::{ImageEncoding, ScopedSurface, SurfaceFactory};

/// Pixel rectangle a page is rendered into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
}

impl Viewport {
    pub fn for_page(page_width: f32, page_height: f32, scale: f32) -> AppResult<Self> {
        validate_scale(scale)?;
        if !(page_width.is_finite() && page_height.is_finite()) {
            return Err(AppError::invalid_argument(
                "page dimensions must be finite",
            ));
        }

        let width = scaled_extent(page_width, scale);
        let height = scaled_extent(page_height, scale);
        check_surface_size(width, height)?;

        Ok(Self {
            width,
            height,
            scale,
        })
    }
}

/// Upper bound on the RGBA buffer behind one rendered page.
pub const MAX_SURFACE_BYTES: usize = 1 << 30;

pub(crate) fn check_surface_size(width: u32, height: u32) -> AppResult<()> {
    let bytes = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4));
    match bytes {
        Some(bytes) if bytes <= MAX_SURFACE_BYTES => Ok(()),
        _ => Err(AppError::invalid_argument(format!(
            "{width}x{height} surface exceeds the {MAX_SURFACE_BYTES} byte render budget"
        ))),
    }
}

fn scaled_extent(extent: f32, scale: f32) -> u32 {
    (extent.max(0.0) * scale).round().clamp(1.0, u32::MAX as f32) as u32
}

pub(crate) fn validate_scale(scale: f32) -> AppResult<()> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(AppError::invalid_argument(
            "scale must be a positive finite value",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageImage {
    pub page_number: usize,
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl PageImage {
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

pub fn render_page(
    page: &PageHandle<'_>,
    scale: f32,
    surfaces: &dyn SurfaceFactory,
) -> AppResult<PageImage> {
    let started = Instant::now();
    let page_number = page.page_number();
    let (page_width, page_height) = page.dimensions()?;
    let viewport = Viewport::for_page(page_width, page_height, scale)?;

    let mut surface = ScopedSurface::acquire(surfaces, viewport.width, viewport.height)
        .map_err(|err| AppError::pdf_render(page_number, err))?;
    page.rasterize(&viewport, surface.surface_mut())
        .map_err(|err| into_render_error(page_number, err))?;
    let data = surface
        .export()
        .map_err(|err| AppError::pdf_render(page_number, err))?;

    debug!(
        page = page_number,
        width = viewport.width,
        height = viewport.height,
        bytes = data.len(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "rendered page"
    );

    Ok(PageImage {
        page_number,
        width: viewport.width,
        height: viewport.height,
        encoding: surfaces.encoding(),
        data,
    })
}

// Range errors from the backend keep their kind; everything else is a render failure.
fn into_render_error(page: usize, err: AppError) -> AppError {
    match err {
        AppError::PageRange { .. } | AppError::PdfRender { .. } => err,
        other => AppError::pdf_render(page, other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::backend::{PageHandle, PdfBackend, check_page};
    use crate::error::{AppError, AppResult};
    use crate::surface::{ImageEncoding, RasterSurface, Surface, SurfaceFactory};
    use crate::text::TextContent;

    use super::{Viewport, render_page};

    struct FailingBackend;

    impl PdfBackend for FailingBackend {
        fn page_count(&self) -> usize {
            1
        }

        fn page_dimensions(&self, page: usize) -> AppResult<(f32, f32)> {
            check_page(page, 1)?;
            Ok((100.0, 50.0))
        }

        fn rasterize(
            &self,
            page: usize,
            _viewport: &Viewport,
            _surface: &mut dyn Surface,
        ) -> AppResult<()> {
            Err(AppError::invalid_argument(format!("cannot paint page {page}")))
        }

        fn text_content(&self, _page: usize) -> AppResult<TextContent> {
            Ok(TextContent::default())
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
        released: Arc<AtomicUsize>,
    }

    impl SurfaceFactory for CountingFactory {
        fn create(&self, width: u32, height: u32) -> AppResult<Box<dyn Surface>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RasterSurface::new(width, height, ImageEncoding::Png)))
        }

        fn release(&self, surface: Box<dyn Surface>) {
            self.released.fetch_add(1, Ordering::SeqCst);
            drop(surface);
        }

        fn encoding(&self) -> ImageEncoding {
            ImageEncoding::Png
        }
    }

    #[test]
    fn viewport_scales_and_rounds_page_size() {
        let viewport = Viewport::for_page(612.0, 792.0, 1.5).expect("viewport should build");
        assert_eq!((viewport.width, viewport.height), (918, 1188));

        let tiny = Viewport::for_page(0.2, 0.2, 1.0).expect("viewport should build");
        assert_eq!((tiny.width, tiny.height), (1, 1));
    }

    #[test]
    fn viewport_rejects_oversized_surface() {
        let err = Viewport::for_page(200.0, 100.0, 100_000.0).expect_err("viewport should be too large");
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let err = Viewport::for_page(f32::MAX, f32::MAX, 1.0).expect_err("viewport should be too large");
        assert!(matches!(err, AppError::InvalidArgument(_)));

        Viewport::for_page(16_384.0, 16_384.0, 1.0).expect("a 1 GiB surface is within budget");
    }

    #[test]
    fn viewport_rejects_invalid_scale() {
        for scale in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let err = Viewport::for_page(100.0, 100.0, scale).expect_err("scale should be invalid");
            assert!(matches!(err, AppError::InvalidArgument(_)));
        }
    }

    #[test]
    fn render_failure_still_releases_surface() {
        let backend = FailingBackend;
        let factory = CountingFactory::default();
        let page = PageHandle::new(&backend, 1);

        let err = render_page(&page, 1.0, &factory).expect_err("render should fail");
        assert!(matches!(err, AppError::PdfRender { page: 1, .. }));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(factory.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn render_out_of_range_page_acquires_no_surface() {
        let backend = FailingBackend;
        let factory = CountingFactory::default();
        let page = PageHandle::new(&backend, 2);

        let err = render_page(&page, 1.0, &factory).expect_err("page should be invalid");
        assert!(matches!(
            err,
            AppError::PageRange {
                page: 2,
                page_count: 1
            }
        ));
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }
}
