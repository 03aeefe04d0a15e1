use crate::PrintSession;
use crate::error::PrintError;
use crate::pdf::ImageData;
use crate::types::{Color, Pt};
use std::sync::Arc;

/// One drawing operation. Every command issued against a [`PageCanvas`]
/// is replayed into both the document sink and the preview raster inside
/// a single call, so the two outputs cannot drift apart.
#[derive(Debug, Clone)]
pub enum Command {
    SaveState,
    RestoreState,
    Translate(Pt, Pt),
    Scale(f32, f32),
    Rotate(f32),
    ConcatMatrix {
        a: f32,
        b: f32,
        c: f32,
        d: f32,
        e: Pt,
        f: Pt,
    },
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    SetLineCap(u8),
    SetLineJoin(u8),
    SetMiterLimit(Pt),
    SetDash {
        pattern: Vec<Pt>,
        phase: Pt,
    },
    // Applies both fill and stroke alpha. Values outside 0..1 are clamped.
    SetOpacity {
        fill: f32,
        stroke: f32,
    },
    ClipRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    CurveTo {
        x1: Pt,
        y1: Pt,
        x2: Pt,
        y2: Pt,
        x: Pt,
        y: Pt,
    },
    ClosePath,
    Fill,
    FillEvenOdd,
    Stroke,
    FillStroke,
    DrawRect {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        image: Arc<ImageData>,
    },
}

/// The drawing surface for the page currently in progress. Obtained from
/// [`PrintSession::canvas`], which returns `None` when no page is open.
///
/// Coordinates are in points with the origin at the bottom-left of the
/// page, y up: the document sink's native space. The preview raster's
/// y-flip and dpi scale are applied internally.
pub struct PageCanvas<'s> {
    pub(crate) session: &'s mut PrintSession,
}

impl PageCanvas<'_> {
    pub fn save_state(&mut self) {
        self.session.apply(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        self.session.apply(Command::RestoreState);
    }

    pub fn translate(&mut self, x: Pt, y: Pt) {
        self.session.apply(Command::Translate(x, y));
    }

    pub fn scale(&mut self, x: f32, y: f32) {
        self.session.apply(Command::Scale(x, y));
    }

    pub fn rotate(&mut self, angle_radians: f32) {
        self.session.apply(Command::Rotate(angle_radians));
    }

    pub fn concat_matrix(&mut self, a: f32, b: f32, c: f32, d: f32, e: Pt, f: Pt) {
        self.session
            .apply(Command::ConcatMatrix { a, b, c, d, e, f });
    }

    pub fn set_fill_color(&mut self, color: Color) {
        self.session.apply(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        self.session.apply(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = if width < Pt::ZERO { Pt::ZERO } else { width };
        self.session.apply(Command::SetLineWidth(width));
    }

    pub fn set_line_cap(&mut self, cap: u8) {
        self.session.apply(Command::SetLineCap(cap));
    }

    pub fn set_line_join(&mut self, join: u8) {
        self.session.apply(Command::SetLineJoin(join));
    }

    pub fn set_miter_limit(&mut self, limit: Pt) {
        let limit = if limit < Pt::ZERO { Pt::ZERO } else { limit };
        self.session.apply(Command::SetMiterLimit(limit));
    }

    pub fn set_dash(&mut self, pattern: Vec<Pt>, phase: Pt) {
        self.session.apply(Command::SetDash { pattern, phase });
    }

    pub fn set_opacity(&mut self, fill: f32, stroke: f32) {
        self.session.apply(Command::SetOpacity {
            fill: fill.clamp(0.0, 1.0),
            stroke: stroke.clamp(0.0, 1.0),
        });
    }

    pub fn clip_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.session.apply(Command::ClipRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.session.apply(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.session.apply(Command::LineTo { x, y });
    }

    pub fn curve_to(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt, x: Pt, y: Pt) {
        self.session.apply(Command::CurveTo {
            x1,
            y1,
            x2,
            y2,
            x,
            y,
        });
    }

    pub fn close_path(&mut self) {
        self.session.apply(Command::ClosePath);
    }

    pub fn fill(&mut self) {
        self.session.apply(Command::Fill);
    }

    pub fn fill_evenodd(&mut self) {
        self.session.apply(Command::FillEvenOdd);
    }

    pub fn stroke(&mut self) {
        self.session.apply(Command::Stroke);
    }

    pub fn fill_stroke(&mut self) {
        self.session.apply(Command::FillStroke);
    }

    pub fn draw_rect(&mut self, x: Pt, y: Pt, width: Pt, height: Pt) {
        self.session.apply(Command::DrawRect {
            x,
            y,
            width,
            height,
        });
    }

    /// Draws a PNG or JPEG payload into the given rectangle. Decoding
    /// happens up front; a bad payload leaves both targets untouched.
    pub fn draw_image(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        bytes: &[u8],
    ) -> Result<(), PrintError> {
        let image = ImageData::decode(bytes)?;
        self.session.apply(Command::DrawImage {
            x,
            y,
            width,
            height,
            image: Arc::new(image),
        });
        Ok(())
    }

    /// Draws an already-decoded image, sharing the decode across pages.
    pub fn draw_image_data(&mut self, x: Pt, y: Pt, width: Pt, height: Pt, image: Arc<ImageData>) {
        self.session.apply(Command::DrawImage {
            x,
            y,
            width,
            height,
            image,
        });
    }
}
