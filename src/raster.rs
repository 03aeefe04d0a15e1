use crate::canvas::Command;
use crate::error::PrintError;
use crate::pdf::ImageData;
use crate::types::{Color, Dpi, Pt, Size};
use tiny_skia::{
    BlendMode, FillRule, FilterQuality, IntSize, LineCap, LineJoin, Mask, Paint, Path,
    PathBuilder, Pixmap, PixmapPaint, Rect, Stroke, StrokeDash, Transform,
};

// Upper bound per preview axis. Pages beyond this are a caller bug, not a
// reason to attempt a multi-gigabyte allocation.
const MAX_PREVIEW_DIM: u32 = 100_000;

/// One page's preview raster. Created white-filled when the page begins
/// and kept for the life of the session; the drawing-context wrapper that
/// binds to it lives only while the page is open.
///
/// The backing pixmap can be swapped wholesale with [`set_pixmap`] (a
/// collaborator substituting a post-processed frame). The session detects
/// the swap by backing-address comparison and rebuilds its context
/// wrapper before the next command lands.
///
/// [`set_pixmap`]: PagePreview::set_pixmap
pub struct PagePreview {
    pixmap: Pixmap,
    dpi: Dpi,
}

impl PagePreview {
    pub(crate) fn new(width_px: u32, height_px: u32, dpi: Dpi) -> Result<Self, PrintError> {
        let mut pixmap = Pixmap::new(width_px, height_px).ok_or_else(|| {
            PrintError::PreviewAllocation(format!("invalid raster size {width_px}x{height_px}"))
        })?;
        pixmap.fill(tiny_skia::Color::WHITE);
        Ok(Self { pixmap, dpi })
    }

    pub fn width_px(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height_px(&self) -> u32 {
        self.pixmap.height()
    }

    /// The resolution this preview was rasterized at. Later session-level
    /// resolution changes do not rescale existing previews.
    pub fn dpi(&self) -> Dpi {
        self.dpi
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Replaces the backing storage. The replacement should keep the
    /// original pixel dimensions; drawing onto a smaller surface is
    /// clipped rather than rescaled.
    pub fn set_pixmap(&mut self, pixmap: Pixmap) {
        self.pixmap = pixmap;
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, PrintError> {
        self.pixmap
            .encode_png()
            .map_err(|err| PrintError::Image(format!("png encode failed: {err}")))
    }

    pub(crate) fn backing_addr(&self) -> usize {
        self.pixmap.data().as_ptr() as usize
    }

    pub(crate) fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }
}

/// Pixel dimensions for a page preview: `ceil(inches × dpi)` per axis.
pub(crate) fn preview_dimensions(size: Size, dpi: Dpi) -> Result<(u32, u32), PrintError> {
    Ok((axis_px(size.width, dpi.x)?, axis_px(size.height, dpi.y)?))
}

fn axis_px(length: Pt, dpi: f32) -> Result<u32, PrintError> {
    if !dpi.is_finite() || dpi <= 0.0 {
        return Err(PrintError::PreviewAllocation(format!(
            "invalid preview dpi {dpi}"
        )));
    }
    let px = (length.to_f32() / 72.0 * dpi).ceil();
    if !px.is_finite() || px < 1.0 || px > MAX_PREVIEW_DIM as f32 {
        return Err(PrintError::PreviewAllocation(format!(
            "page of {:.3}pt at {dpi} dpi is not rasterizable",
            length.to_f32()
        )));
    }
    Ok(px as u32)
}

/// The wrapper the session lazily (re)builds around the preview surface:
/// the captured backing address plus the page's base transform (dpi
/// scale and y-flip; the canvas draws in y-up point space, the raster is
/// y-down pixel space).
struct PreviewContext {
    backing_addr: usize,
    base_transform: Transform,
}

#[derive(Clone)]
struct RasterState {
    transform: Transform,
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    line_cap: u8,
    line_join: u8,
    miter_limit: Pt,
    dash_pattern: Vec<Pt>,
    dash_phase: Pt,
    fill_opacity: f32,
    stroke_opacity: f32,
    clip_mask: Option<Mask>,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            transform: Transform::identity(),
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            line_cap: 0,
            line_join: 0,
            miter_limit: Pt::from_f32(10.0),
            dash_pattern: Vec::new(),
            dash_phase: Pt::ZERO,
            fill_opacity: 1.0,
            stroke_opacity: 1.0,
            clip_mask: None,
        }
    }
}

/// Per-open-page raster state: graphics state, current path, and the
/// lazily-built context wrapper. Torn down whole by `finish_page`, which
/// is what releases the wrapper and its cached backing address.
pub(crate) struct PageRaster {
    page_height_pt: f32,
    dpi: Dpi,
    context: Option<PreviewContext>,
    state: RasterState,
    stack: Vec<RasterState>,
    path_builder: PathBuilder,
    has_path: bool,
}

impl PageRaster {
    pub fn new(size: Size, dpi: Dpi) -> Self {
        Self {
            page_height_pt: size.height.to_f32(),
            dpi,
            context: None,
            state: RasterState::default(),
            stack: Vec::new(),
            path_builder: PathBuilder::new(),
            has_path: false,
        }
    }

    /// Revalidates the context wrapper against the surface's current
    /// backing address, rebuilding on first use or after the backing
    /// moved. This is a correctness requirement: a wrapper built over
    /// storage that has since been replaced would target the old buffer.
    /// Returns true when an existing wrapper was replaced.
    pub fn ensure_context(&mut self, surface: &PagePreview) -> bool {
        let addr = surface.backing_addr();
        if let Some(ctx) = &self.context {
            if ctx.backing_addr == addr {
                return false;
            }
        }
        let rebound = self.context.is_some();
        let sx = self.dpi.x / 72.0;
        let sy = self.dpi.y / 72.0;
        self.context = Some(PreviewContext {
            backing_addr: addr,
            base_transform: Transform::from_row(sx, 0.0, 0.0, -sy, 0.0, self.page_height_pt * sy),
        });
        rebound
    }

    #[cfg(test)]
    pub fn context_backing_addr(&self) -> Option<usize> {
        self.context.as_ref().map(|ctx| ctx.backing_addr)
    }

    pub fn apply(&mut self, cmd: &Command, surface: &mut PagePreview) {
        let base_transform = self
            .context
            .as_ref()
            .expect("preview context not built")
            .base_transform;
        let pixmap = surface.pixmap_mut();
        let state = &mut self.state;
        match cmd {
            Command::SaveState => self.stack.push(state.clone()),
            Command::RestoreState => {
                if let Some(restored) = self.stack.pop() {
                    *state = restored;
                }
            }
            // Operator order is PDF's: the newest transform applies to
            // the path first, then everything issued before it.
            Command::Translate(x, y) => {
                state.transform = state
                    .transform
                    .pre_concat(Transform::from_translate(x.to_f32(), y.to_f32()));
            }
            Command::Scale(x, y) => {
                state.transform = state.transform.pre_concat(Transform::from_scale(*x, *y));
            }
            Command::Rotate(angle) => {
                let deg = *angle * 180.0 / core::f32::consts::PI;
                state.transform = state.transform.pre_concat(Transform::from_rotate(deg));
            }
            Command::ConcatMatrix { a, b, c, d, e, f } => {
                state.transform = state.transform.pre_concat(Transform::from_row(
                    *a,
                    *b,
                    *c,
                    *d,
                    e.to_f32(),
                    f.to_f32(),
                ));
            }
            Command::SetFillColor(color) => state.fill_color = *color,
            Command::SetStrokeColor(color) => state.stroke_color = *color,
            Command::SetLineWidth(width) => {
                state.line_width = if *width < Pt::ZERO { Pt::ZERO } else { *width };
            }
            Command::SetLineCap(cap) => state.line_cap = *cap,
            Command::SetLineJoin(join) => state.line_join = *join,
            Command::SetMiterLimit(limit) => {
                state.miter_limit = if *limit < Pt::ZERO { Pt::ZERO } else { *limit };
            }
            Command::SetDash { pattern, phase } => {
                state.dash_pattern = pattern.clone();
                state.dash_phase = *phase;
            }
            Command::SetOpacity { fill, stroke } => {
                state.fill_opacity = fill.clamp(0.0, 1.0);
                state.stroke_opacity = stroke.clamp(0.0, 1.0);
            }
            Command::ClipRect {
                x,
                y,
                width,
                height,
            } => {
                if let Some(rect) =
                    Rect::from_xywh(x.to_f32(), y.to_f32(), width.to_f32(), height.to_f32())
                {
                    let path = PathBuilder::from_rect(rect);
                    let device_ts = base_transform.pre_concat(state.transform);
                    apply_clip_path(
                        state,
                        &path,
                        FillRule::Winding,
                        device_ts,
                        pixmap.width(),
                        pixmap.height(),
                    );
                }
            }
            Command::MoveTo { x, y } => {
                self.path_builder.move_to(x.to_f32(), y.to_f32());
                self.has_path = true;
            }
            Command::LineTo { x, y } => {
                self.path_builder.line_to(x.to_f32(), y.to_f32());
                self.has_path = true;
            }
            Command::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                self.path_builder.cubic_to(
                    x1.to_f32(),
                    y1.to_f32(),
                    x2.to_f32(),
                    y2.to_f32(),
                    x.to_f32(),
                    y.to_f32(),
                );
                self.has_path = true;
            }
            Command::ClosePath => {
                if self.has_path {
                    self.path_builder.close();
                }
            }
            Command::Fill => {
                if let Some(path) = take_path(&mut self.path_builder, &mut self.has_path) {
                    fill_path(pixmap, state, &path, FillRule::Winding, base_transform);
                }
            }
            Command::FillEvenOdd => {
                if let Some(path) = take_path(&mut self.path_builder, &mut self.has_path) {
                    fill_path(pixmap, state, &path, FillRule::EvenOdd, base_transform);
                }
            }
            Command::Stroke => {
                if let Some(path) = take_path(&mut self.path_builder, &mut self.has_path) {
                    stroke_path(pixmap, state, &path, base_transform);
                }
            }
            Command::FillStroke => {
                if let Some(path) = take_path(&mut self.path_builder, &mut self.has_path) {
                    fill_path(pixmap, state, &path, FillRule::Winding, base_transform);
                    stroke_path(pixmap, state, &path, base_transform);
                }
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                if let Some(rect) =
                    Rect::from_xywh(x.to_f32(), y.to_f32(), width.to_f32(), height.to_f32())
                {
                    let path = PathBuilder::from_rect(rect);
                    fill_path(pixmap, state, &path, FillRule::Winding, base_transform);
                }
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                image,
            } => {
                let Some(source) = image_to_pixmap(image) else {
                    return;
                };
                let src_w = source.width() as f32;
                let src_h = source.height() as f32;
                if src_w <= 0.0 || src_h <= 0.0 {
                    return;
                }
                // Source row 0 lands at the visual top of the target
                // rect, matching what the sink's /Im Do placement shows.
                let image_ts = Transform::from_row(
                    width.to_f32() / src_w,
                    0.0,
                    0.0,
                    -height.to_f32() / src_h,
                    x.to_f32(),
                    y.to_f32() + height.to_f32(),
                );
                let device_ts = base_transform.pre_concat(state.transform.pre_concat(image_ts));
                let paint = PixmapPaint {
                    opacity: state.fill_opacity.clamp(0.0, 1.0),
                    blend_mode: BlendMode::Multiply,
                    quality: FilterQuality::Bilinear,
                };
                pixmap.draw_pixmap(
                    0,
                    0,
                    source.as_ref(),
                    &paint,
                    device_ts,
                    state.clip_mask.as_ref(),
                );
            }
        }
    }
}

fn fill_path(
    pixmap: &mut Pixmap,
    state: &RasterState,
    path: &Path,
    fill_rule: FillRule,
    base_transform: Transform,
) {
    let paint = ink_paint(state.fill_color, state.fill_opacity);
    pixmap.fill_path(
        path,
        &paint,
        fill_rule,
        base_transform.pre_concat(state.transform),
        state.clip_mask.as_ref(),
    );
}

fn stroke_path(pixmap: &mut Pixmap, state: &RasterState, path: &Path, base_transform: Transform) {
    let paint = ink_paint(state.stroke_color, state.stroke_opacity);
    let stroke = build_stroke(state);
    pixmap.stroke_path(
        path,
        &paint,
        &stroke,
        base_transform.pre_concat(state.transform),
        state.clip_mask.as_ref(),
    );
}

fn apply_clip_path(
    state: &mut RasterState,
    path: &Path,
    fill_rule: FillRule,
    transform: Transform,
    width: u32,
    height: u32,
) {
    if let Some(mask) = state.clip_mask.as_mut() {
        mask.intersect_path(path, fill_rule, true, transform);
        return;
    }
    let Some(mut mask) = Mask::new(width, height) else {
        return;
    };
    mask.fill_path(path, fill_rule, true, transform);
    state.clip_mask = Some(mask);
}

fn take_path(path_builder: &mut PathBuilder, has_path: &mut bool) -> Option<Path> {
    if !*has_path {
        return None;
    }
    *has_path = false;
    let builder = std::mem::replace(path_builder, PathBuilder::new());
    builder.finish()
}

fn build_stroke(state: &RasterState) -> Stroke {
    let mut stroke = Stroke {
        // Zero-width lines mean "thinnest visible" in the sink; give the
        // raster something it can actually paint.
        width: state.line_width.to_f32().max(0.1),
        miter_limit: state.miter_limit.to_f32().max(1.0),
        line_cap: match state.line_cap {
            1 => LineCap::Round,
            2 => LineCap::Square,
            _ => LineCap::Butt,
        },
        line_join: match state.line_join {
            1 => LineJoin::Round,
            2 => LineJoin::Bevel,
            _ => LineJoin::Miter,
        },
        dash: None,
    };
    if !state.dash_pattern.is_empty() {
        let mut array: Vec<f32> = state.dash_pattern.iter().map(|v| v.to_f32()).collect();
        // Odd-length dash arrays repeat, which needs an even array here.
        if array.len() % 2 != 0 {
            let doubled = array.clone();
            array.extend(doubled);
        }
        stroke.dash = StrokeDash::new(array, state.dash_phase.to_f32());
    }
    stroke
}

// Ink darkens what it lands on; overlapping passes multiply instead of
// replacing.
fn ink_paint(color: Color, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color, opacity));
    paint.anti_alias = true;
    paint.blend_mode = BlendMode::Multiply;
    paint
}

fn to_sk_color(color: Color, opacity: f32) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba(
        color.r.clamp(0.0, 1.0),
        color.g.clamp(0.0, 1.0),
        color.b.clamp(0.0, 1.0),
        opacity.clamp(0.0, 1.0),
    )
    .unwrap_or(tiny_skia::Color::BLACK)
}

/// Converts a decoded image into the premultiplied form tiny-skia draws.
fn image_to_pixmap(image: &ImageData) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())?;
    let pixel_count = (image.width() as usize) * (image.height() as usize);
    let mut data = Vec::with_capacity(pixel_count * 4);
    match image.alpha() {
        Some(alpha) => {
            for (i, rgb) in image.rgb().chunks_exact(3).enumerate() {
                let a = alpha[i] as u16;
                data.push(((rgb[0] as u16 * a) / 255) as u8);
                data.push(((rgb[1] as u16 * a) / 255) as u8);
                data.push(((rgb[2] as u16 * a) / 255) as u8);
                data.push(a as u8);
            }
        }
        None => {
            for rgb in image.rgb().chunks_exact(3) {
                data.push(rgb[0]);
                data.push(rgb[1]);
                data.push(rgb[2]);
                data.push(255);
            }
        }
    }
    Pixmap::from_vec(data, size)
}
