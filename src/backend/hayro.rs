use std::sync::Arc;

use hayro::hayro_interpret::font::Glyph;
use hayro::hayro_interpret::util::{PageExt, RectExt};
use hayro::hayro_interpret::{
    BlendMode, ClipPath, Context, Device, GlyphDrawMode, Image, InterpreterSettings, Paint,
    PathDrawMode, SoftMask, interpret_page,
};
use hayro::hayro_syntax::Pdf;
use hayro::hayro_syntax::page::Page;
use hayro::vello_cpu::color::palette::css::{TRANSPARENT, WHITE};
use hayro::{RenderSettings, render};
use kurbo::{Affine, BezPath, Point};

use crate::error::{AppError, AppResult};
use crate::render::Viewport;
use crate::session::Background;
use crate::surface::Surface;
use crate::text::{TextContent, TextItem};

use super::traits::{PdfBackend, check_page};

pub struct HayroBackend {
    pdf: Pdf,
    background: Background,
}

impl PdfBackend for HayroBackend {
    fn page_count(&self) -> usize {
        self.pdf.pages().len()
    }

    fn page_dimensions(&self, page: usize) -> AppResult<(f32, f32)> {
        Ok(self.page(page)?.render_dimensions())
    }

    fn rasterize(
        &self,
        page: usize,
        viewport: &Viewport,
        surface: &mut dyn Surface,
    ) -> AppResult<()> {
        let page_ref = self.page(page)?;

        let render_settings = RenderSettings {
            x_scale: viewport.scale,
            y_scale: viewport.scale,
            bg_color: match self.background {
                Background::White => WHITE,
                Background::Transparent => TRANSPARENT,
            },
            ..Default::default()
        };
        let interpreter_settings = InterpreterSettings::default();
        let pixmap = render(page_ref, &interpreter_settings, &render_settings);

        surface
            .draw_rgba(
                pixmap.width() as u32,
                pixmap.height() as u32,
                pixmap.data_as_u8_slice(),
            )
            .map_err(|err| AppError::pdf_render(page, err))
    }

    fn text_content(&self, page: usize) -> AppResult<TextContent> {
        Ok(extract_text_with_device(self.page(page)?))
    }
}

impl HayroBackend {
    pub fn open(bytes: Arc<Vec<u8>>, background: Background) -> AppResult<Self> {
        let pdf = Pdf::new(bytes).map_err(|_| AppError::parse("failed to parse PDF with hayro"))?;
        Ok(Self { pdf, background })
    }

    fn page(&self, page: usize) -> AppResult<&Page<'_>> {
        check_page(page, self.page_count())?;
        self.pdf
            .pages()
            .get(page - 1)
            .ok_or(AppError::page_range(page, self.page_count()))
    }
}

fn extract_text_with_device(page: &Page<'_>) -> TextContent {
    let mut context = Context::new(
        page.initial_transform(true),
        page.intersected_crop_box().to_kurbo(),
        page.xref(),
        InterpreterSettings::default(),
    );
    let mut device = TextCollectDevice::default();
    interpret_page(page, &mut context, &mut device);
    device.finish()
}

/// Groups glyphs into items; a new item starts whenever the baseline moves.
#[derive(Default)]
struct TextCollectDevice {
    items: Vec<TextItem>,
    last_glyph: Option<(char, i32, i32)>,
}

impl TextCollectDevice {
    fn finish(self) -> TextContent {
        TextContent { items: self.items }
    }

    fn push_char(&mut self, ch: char, x: f64, y: f64) {
        match self.items.last_mut() {
            Some(item) if (y - item.y).abs() <= BASELINE_TOLERANCE => item.text.push(ch),
            _ => self.items.push(TextItem {
                text: ch.to_string(),
                x,
                y,
            }),
        }
    }

    fn is_duplicate_glyph(&self, ch: char, x: f64, y: f64) -> bool {
        self.last_glyph == Some((ch, quantize_coord(x), quantize_coord(y)))
    }

    fn set_last_glyph(&mut self, ch: char, x: f64, y: f64) {
        self.last_glyph = Some((ch, quantize_coord(x), quantize_coord(y)));
    }
}

impl<'a> Device<'a> for TextCollectDevice {
    fn set_soft_mask(&mut self, _mask: Option<SoftMask<'a>>) {}

    fn set_blend_mode(&mut self, _blend_mode: BlendMode) {}

    fn draw_path(
        &mut self,
        _path: &BezPath,
        _transform: Affine,
        _paint: &Paint<'a>,
        _draw_mode: &PathDrawMode,
    ) {
    }

    fn push_clip_path(&mut self, _clip_path: &ClipPath) {}

    fn push_transparency_group(
        &mut self,
        _opacity: f32,
        _mask: Option<SoftMask<'a>>,
        _blend_mode: BlendMode,
    ) {
    }

    fn draw_glyph(
        &mut self,
        glyph: &Glyph<'a>,
        transform: Affine,
        glyph_transform: Affine,
        _paint: &Paint<'a>,
        _draw_mode: &GlyphDrawMode,
    ) {
        let Some(ch) = glyph.as_unicode() else {
            return;
        };

        let position = (transform * glyph_transform) * Point::ORIGIN;
        if self.is_duplicate_glyph(ch, position.x, position.y) {
            return;
        }

        self.set_last_glyph(ch, position.x, position.y);
        self.push_char(ch, position.x, position.y);
    }

    fn draw_image(&mut self, _image: Image<'a, '_>, _transform: Affine) {}

    fn pop_clip_path(&mut self) {}

    fn pop_transparency_group(&mut self) {}
}

fn quantize_coord(value: f64) -> i32 {
    (value * 100.0).round() as i32
}

const BASELINE_TOLERANCE: f64 = 1.0;
