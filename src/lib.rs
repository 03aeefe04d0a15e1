mod canvas;
mod debug;
mod error;
mod inspect;
mod metrics;
mod pdf;
mod raster;
mod types;

pub use canvas::{Command, PageCanvas};
pub use error::PrintError;
pub use inspect::{
    DocumentReport, InspectError, InspectErrorCode, inspect_document_bytes, inspect_document_path,
};
pub use metrics::{PageMetrics, SessionMetrics};
pub use pdf::ImageData;
pub use raster::PagePreview;
pub use types::{Color, Dpi, Pt, Size};

use debug::SessionLog;
use pdf::PdfSink;
use raster::PageRaster;
use std::path::PathBuf;

/// A single multi-page print session, the target an emulated printer
/// prints into.
///
/// The session owns two synchronized artifacts under one page lifecycle:
/// an append-only page-description document (readable once the session
/// finishes) and one raster preview per page (readable immediately, for
/// on-screen display). Every drawing command issued through
/// [`PrintSession::canvas`] is replayed into both, so they cannot
/// diverge.
///
/// Sequencing is a hard contract: beginning a page while one is open,
/// finishing a page that isn't, or touching a finished session are
/// caller bugs and panic. Resource problems (preview allocation, image
/// decoding) come back as [`PrintError`].
///
/// Dropping an unfinished session finishes it, so the document sink is
/// closed and consistent on every exit path.
pub struct PrintSession {
    preview_dpi: Dpi,
    page_in_progress: bool,
    finished: bool,
    page_count: usize,
    previews: Vec<PagePreview>,
    sink: PdfSink,
    raster: Option<PageRaster>,
    commands_this_page: usize,
    metrics: SessionMetrics,
    log: Option<SessionLog>,
}

#[derive(Debug, Clone)]
pub struct PrintSessionBuilder {
    preview_dpi: Dpi,
    log_path: Option<PathBuf>,
}

impl PrintSessionBuilder {
    pub fn new() -> Self {
        Self {
            preview_dpi: Dpi::SCREEN,
            log_path: None,
        }
    }

    pub fn preview_dpi(mut self, dpi: Dpi) -> Self {
        self.preview_dpi = dpi;
        self
    }

    /// Writes a JSON-lines event log (page.begin, page.finish,
    /// preview.rebind, session.finish) to the given path.
    pub fn event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<PrintSession, PrintError> {
        let log = match self.log_path {
            Some(path) => Some(SessionLog::create(path)?),
            None => None,
        };
        let mut session = PrintSession::new();
        session.preview_dpi = self.preview_dpi;
        session.log = log;
        Ok(session)
    }
}

impl Default for PrintSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PrintSession {
    pub fn new() -> Self {
        Self {
            preview_dpi: Dpi::SCREEN,
            page_in_progress: false,
            finished: false,
            page_count: 0,
            previews: Vec::new(),
            sink: PdfSink::new(),
            raster: None,
            commands_this_page: 0,
            metrics: SessionMetrics::default(),
            log: None,
        }
    }

    pub fn builder() -> PrintSessionBuilder {
        PrintSessionBuilder::new()
    }

    /// The resolution used for preview rasters. Changes apply to pages
    /// begun afterwards; existing previews keep the resolution they were
    /// rasterized at.
    pub fn preview_dpi(&self) -> Dpi {
        self.preview_dpi
    }

    pub fn set_preview_dpi(&mut self, dpi: Dpi) {
        self.preview_dpi = dpi;
    }

    /// True strictly between `begin_page` and its matching `finish_page`.
    pub fn page_in_progress(&self) -> bool {
        self.page_in_progress
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Pages begun so far, including the one in progress.
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// One preview per page begun so far, in page order, including the
    /// in-progress page.
    pub fn page_previews(&self) -> &[PagePreview] {
        &self.previews
    }

    /// The in-progress page's preview, or `None` between pages.
    pub fn current_page_preview(&self) -> Option<&PagePreview> {
        if self.page_in_progress {
            self.previews.last()
        } else {
            None
        }
    }

    pub fn current_page_preview_mut(&mut self) -> Option<&mut PagePreview> {
        if self.page_in_progress {
            self.previews.last_mut()
        } else {
            None
        }
    }

    /// The drawing surface for the open page, or `None` when no page is
    /// open.
    pub fn canvas(&mut self) -> Option<PageCanvas<'_>> {
        if self.page_in_progress {
            Some(PageCanvas { session: self })
        } else {
            None
        }
    }

    /// The finalized document bytes. `None` until `finish_session`;
    /// immutable afterwards.
    pub fn document_data(&self) -> Option<&[u8]> {
        if self.finished {
            Some(self.sink.data())
        } else {
            None
        }
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Starts a new page. A size with a non-positive dimension is
    /// replaced by Letter (8.5in x 11in). On error the session is left
    /// exactly as it was: nothing framed, nothing counted, no preview
    /// appended.
    pub fn begin_page(&mut self, size: Size) -> Result<(), PrintError> {
        assert!(
            !self.finished,
            "begin_page called on a finished print session"
        );
        assert!(
            !self.page_in_progress,
            "begin_page called while a page is already in progress"
        );

        let size = if size.width <= Pt::ZERO || size.height <= Pt::ZERO {
            Size::letter()
        } else {
            size
        };

        // The raster is the only thing that can fail; allocate it before
        // touching any session state.
        let (width_px, height_px) = raster::preview_dimensions(size, self.preview_dpi)?;
        let preview = PagePreview::new(width_px, height_px, self.preview_dpi)?;

        self.sink.begin_page(size);
        self.raster = Some(PageRaster::new(size, self.preview_dpi));
        self.previews.push(preview);
        self.page_count += 1;
        self.page_in_progress = true;
        self.commands_this_page = 0;

        if let Some(log) = self.log.as_mut() {
            log.increment("pages", 1);
            log.log_json(&format!(
                "{{\"type\":\"page.begin\",\"page\":{},\"width_pt\":{:.3},\"height_pt\":{:.3},\"preview_px_w\":{},\"preview_px_h\":{}}}",
                self.page_count,
                size.width.to_f32(),
                size.height.to_f32(),
                width_px,
                height_px
            ));
        }
        Ok(())
    }

    /// Finishes and commits the current page. The preview context
    /// wrapper and its cached backing address are released; the preview
    /// image itself stays in `page_previews`.
    pub fn finish_page(&mut self) {
        assert!(
            self.page_in_progress,
            "finish_page called while no page is in progress"
        );

        let content_bytes = self.sink.end_page();
        self.raster = None;
        self.page_in_progress = false;

        let (preview_width_px, preview_height_px) = self
            .previews
            .last()
            .map(|p| (p.width_px(), p.height_px()))
            .unwrap_or((0, 0));
        self.metrics.pages.push(PageMetrics {
            page_number: self.page_count,
            command_count: self.commands_this_page,
            content_bytes,
            preview_width_px,
            preview_height_px,
        });

        if let Some(log) = self.log.as_mut() {
            log.log_json(&format!(
                "{{\"type\":\"page.finish\",\"page\":{},\"commands\":{},\"content_bytes\":{}}}",
                self.page_count, self.commands_this_page, content_bytes
            ));
        }
    }

    /// Commits a page of the given size with nothing drawn on it.
    pub fn insert_blank_page(&mut self, size: Size) -> Result<(), PrintError> {
        self.begin_page(size)?;
        self.finish_page();
        Ok(())
    }

    /// Finishes the current page if one is open and closes the document
    /// sink permanently. Must be called exactly once; afterwards the
    /// document bytes are readable and nothing further can be printed.
    pub fn finish_session(&mut self) {
        assert!(
            !self.finished,
            "finish_session called on an already finished print session"
        );

        if self.page_in_progress {
            self.finish_page();
        }

        self.sink.finish();
        self.finished = true;
        self.metrics.document_bytes = self.sink.data().len();

        if let Some(log) = self.log.as_mut() {
            log.log_json(&format!(
                "{{\"type\":\"session.finish\",\"pages\":{},\"bytes\":{}}}",
                self.page_count,
                self.metrics.document_bytes
            ));
            log.emit_summary("session.finish");
            log.flush();
        }
    }

    /// Replays one command into both targets. The preview context is
    /// revalidated against the surface's backing address on every
    /// command, per the session's relocation contract.
    pub(crate) fn apply(&mut self, cmd: Command) {
        assert!(
            self.page_in_progress,
            "drawing issued while no page is in progress"
        );
        self.commands_this_page += 1;
        self.sink.append(&cmd);

        let raster = self.raster.as_mut().expect("open page without raster state");
        let surface = self
            .previews
            .last_mut()
            .expect("open page without preview surface");
        let rebound = raster.ensure_context(surface);
        if rebound {
            if let Some(log) = self.log.as_mut() {
                log.increment("preview.rebind", 1);
                log.log_json(&format!(
                    "{{\"type\":\"preview.rebind\",\"page\":{}}}",
                    self.page_count
                ));
            }
        }
        raster.apply(&cmd, surface);
    }
}

impl Default for PrintSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PrintSession {
    fn drop(&mut self) {
        if !self.finished {
            self.finish_session();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn pt(value: f32) -> Pt {
        Pt::from_f32(value)
    }

    fn temp_path(tag: &str, file: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "platen_{}_{}_{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir.join(file)
    }

    #[test]
    fn previews_track_page_count_through_any_sequence() {
        let mut session = PrintSession::new();
        assert_eq!(session.page_previews().len(), session.page_count());

        session.begin_page(Size::letter()).expect("begin");
        assert_eq!(session.page_previews().len(), session.page_count());
        assert_eq!(session.page_count(), 1);
        assert!(session.page_in_progress());
        assert!(session.current_page_preview().is_some());

        session.finish_page();
        assert_eq!(session.page_previews().len(), session.page_count());
        assert!(!session.page_in_progress());
        assert!(session.current_page_preview().is_none());

        session.insert_blank_page(Size::a4()).expect("blank");
        assert_eq!(session.page_previews().len(), session.page_count());
        assert_eq!(session.page_count(), 2);

        session.finish_session();
        assert_eq!(session.page_previews().len(), session.page_count());
        assert!(session.finished());
    }

    #[test]
    fn document_data_gated_until_finish() {
        let mut session = PrintSession::new();
        assert!(session.document_data().is_none());
        session.begin_page(Size::letter()).expect("begin");
        assert!(session.document_data().is_none());
        session.finish_page();
        assert!(session.document_data().is_none());
        session.finish_session();
        let bytes = session.document_data().expect("data");
        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert!(bytes.ends_with(b"%%EOF"));
    }

    #[test]
    fn empty_session_produces_a_parseable_document() {
        let mut session = PrintSession::new();
        session.finish_session();
        let report =
            inspect_document_bytes(session.document_data().expect("data")).expect("inspect");
        assert_eq!(report.page_count, 0);
    }

    #[test]
    fn zero_size_page_defaults_to_letter() {
        let mut session = PrintSession::new();
        session.begin_page(Size::ZERO).expect("begin");
        let preview = session.current_page_preview().expect("preview");
        assert_eq!((preview.width_px(), preview.height_px()), (612, 792));
        session.finish_session();

        let report =
            inspect_document_bytes(session.document_data().expect("data")).expect("inspect");
        let (w, h) = report.media_boxes[0];
        assert!((w - 612.0).abs() < 0.01 && (h - 792.0).abs() < 0.01);
    }

    #[test]
    #[should_panic(expected = "page is already in progress")]
    fn begin_page_twice_panics() {
        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        let _ = session.begin_page(Size::letter());
    }

    #[test]
    fn failed_begin_page_leaves_session_untouched() {
        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _ = session.begin_page(Size::letter());
        }));
        assert!(result.is_err());
        assert_eq!(session.page_count(), 1);
        assert_eq!(session.page_previews().len(), 1);
        assert!(session.page_in_progress());

        // An allocation failure must leave the closed session state alone
        // the same way.
        session.finish_page();
        session.set_preview_dpi(Dpi::uniform(0.0));
        let err = session.begin_page(Size::letter()).expect_err("bad dpi");
        assert!(matches!(err, PrintError::PreviewAllocation(_)));
        assert_eq!(session.page_count(), 1);
        assert_eq!(session.page_previews().len(), 1);
        assert!(!session.page_in_progress());
    }

    #[test]
    #[should_panic(expected = "no page is in progress")]
    fn finish_page_without_begin_panics() {
        let mut session = PrintSession::new();
        session.finish_page();
    }

    #[test]
    #[should_panic(expected = "already finished print session")]
    fn finish_session_twice_panics() {
        let mut session = PrintSession::new();
        session.finish_session();
        session.finish_session();
    }

    #[test]
    fn document_survives_a_failed_second_finish() {
        let mut session = PrintSession::new();
        session.insert_blank_page(Size::letter()).expect("blank");
        session.finish_session();
        let before = session.document_data().expect("data").to_vec();

        let result = catch_unwind(AssertUnwindSafe(|| session.finish_session()));
        assert!(result.is_err());
        assert_eq!(session.document_data().expect("data"), &before[..]);
    }

    #[test]
    fn finish_session_implicitly_closes_open_page() {
        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        session.finish_session();
        assert!(!session.page_in_progress());
        assert_eq!(session.page_count(), 1);
        let report =
            inspect_document_bytes(session.document_data().expect("data")).expect("inspect");
        assert_eq!(report.page_count, 1);
    }

    #[test]
    fn insert_blank_page_is_begin_plus_finish_with_no_drawing() {
        let mut session = PrintSession::new();
        session.insert_blank_page(Size::letter()).expect("blank");
        assert_eq!(session.page_count(), 1);
        assert!(!session.page_in_progress());
        session.finish_session();
        assert_eq!(session.metrics().pages[0].command_count, 0);
    }

    #[test]
    fn preview_resolution_sizes_raster_buffers() {
        let mut session = PrintSession::new();
        session.set_preview_dpi(Dpi::uniform(144.0));
        session
            .begin_page(Size::from_inches(8.5, 11.0))
            .expect("begin");
        let preview = session.current_page_preview().expect("preview");
        assert_eq!((preview.width_px(), preview.height_px()), (1224, 1584));
    }

    #[test]
    fn dpi_change_applies_only_to_later_pages() {
        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        session.finish_page();
        session.set_preview_dpi(Dpi::uniform(144.0));
        session.begin_page(Size::letter()).expect("begin");
        session.finish_page();

        assert_eq!(session.page_previews()[0].width_px(), 612);
        assert_eq!(session.page_previews()[0].dpi(), Dpi::SCREEN);
        assert_eq!(session.page_previews()[1].width_px(), 1224);
        assert_eq!(session.page_previews()[1].dpi(), Dpi::uniform(144.0));
    }

    #[test]
    fn canvas_absent_when_no_page_open() {
        let mut session = PrintSession::new();
        assert!(session.canvas().is_none());
        session.begin_page(Size::letter()).expect("begin");
        assert!(session.canvas().is_some());
        session.finish_page();
        assert!(session.canvas().is_none());
    }

    #[test]
    fn overlapping_ink_multiplies_instead_of_replacing() {
        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        {
            let mut canvas = session.canvas().expect("canvas");
            canvas.set_fill_color(Color::rgb(0.5, 0.5, 0.5));
            canvas.draw_rect(pt(100.0), pt(100.0), pt(150.0), pt(150.0));
            canvas.draw_rect(pt(175.0), pt(100.0), pt(150.0), pt(150.0));
        }
        let preview = session.current_page_preview().expect("preview");
        let pixmap = preview.pixmap();
        // Letter at 72dpi maps one pixel per point; the raster's y axis
        // points down.
        let outside = pixmap.pixel(50, 792 - 150).expect("pixel");
        let single = pixmap.pixel(120, 792 - 150).expect("pixel");
        let overlap = pixmap.pixel(200, 792 - 150).expect("pixel");
        assert_eq!(outside.red(), 255);
        assert!(single.red() > 100 && single.red() < 150, "got {}", single.red());
        assert!(overlap.red() < single.red() - 30, "got {}", overlap.red());
    }

    #[test]
    fn preview_context_rebinds_after_backing_swap() {
        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        {
            let mut canvas = session.canvas().expect("canvas");
            canvas.draw_rect(pt(10.0), pt(10.0), pt(20.0), pt(20.0));
        }
        let first_addr = session
            .raster
            .as_ref()
            .expect("raster")
            .context_backing_addr()
            .expect("context");

        // Swap the surface's backing storage out from under the cached
        // context, the way a platform silently relocates a bitmap.
        let replacement = session
            .current_page_preview()
            .expect("preview")
            .pixmap()
            .clone();
        session
            .current_page_preview_mut()
            .expect("preview")
            .set_pixmap(replacement);

        {
            let mut canvas = session.canvas().expect("canvas");
            canvas.draw_rect(pt(300.0), pt(300.0), pt(10.0), pt(10.0));
        }
        let second_addr = session
            .raster
            .as_ref()
            .expect("raster")
            .context_backing_addr()
            .expect("context");
        assert_ne!(first_addr, second_addr);

        // The marker drawn after the swap must be present in the current
        // buffer, and the context must wrap that buffer's address.
        let preview = session.current_page_preview().expect("preview");
        assert_eq!(second_addr, preview.pixmap().data().as_ptr() as usize);
        let marker = preview.pixmap().pixel(305, 792 - 305).expect("pixel");
        assert!(marker.red() < 128);
        let earlier = preview.pixmap().pixel(20, 792 - 20).expect("pixel");
        assert!(earlier.red() < 128);
    }

    #[test]
    fn clip_rect_confines_ink() {
        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        {
            let mut canvas = session.canvas().expect("canvas");
            canvas.clip_rect(pt(100.0), pt(100.0), pt(50.0), pt(50.0));
            canvas.draw_rect(pt(0.0), pt(0.0), pt(612.0), pt(792.0));
        }
        let pixmap = session.current_page_preview().expect("preview").pixmap();
        let inside = pixmap.pixel(120, 792 - 120).expect("pixel");
        let outside = pixmap.pixel(300, 792 - 300).expect("pixel");
        assert!(inside.red() < 64);
        assert_eq!(outside.red(), 255);
    }

    #[test]
    fn stroked_paths_leave_ink_on_the_preview() {
        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        {
            let mut canvas = session.canvas().expect("canvas");
            canvas.set_line_width(pt(4.0));
            canvas.move_to(pt(100.0), pt(400.0));
            canvas.line_to(pt(500.0), pt(400.0));
            canvas.stroke();
        }
        let pixmap = session.current_page_preview().expect("preview").pixmap();
        let on_line = pixmap.pixel(300, 792 - 400).expect("pixel");
        assert!(on_line.red() < 128);
        let off_line = pixmap.pixel(300, 792 - 450).expect("pixel");
        assert_eq!(off_line.red(), 255);
    }

    #[test]
    fn filled_paths_respect_transforms() {
        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        {
            let mut canvas = session.canvas().expect("canvas");
            canvas.save_state();
            canvas.translate(pt(200.0), pt(200.0));
            canvas.move_to(pt(0.0), pt(0.0));
            canvas.line_to(pt(100.0), pt(0.0));
            canvas.line_to(pt(100.0), pt(100.0));
            canvas.line_to(pt(0.0), pt(100.0));
            canvas.close_path();
            canvas.fill();
            canvas.restore_state();
        }
        let pixmap = session.current_page_preview().expect("preview").pixmap();
        let inside = pixmap.pixel(250, 792 - 250).expect("pixel");
        assert!(inside.red() < 64);
        let at_origin = pixmap.pixel(50, 792 - 50).expect("pixel");
        assert_eq!(at_origin.red(), 255);
    }

    #[test]
    fn draw_image_lands_in_both_targets() {
        let mut src = image::RgbaImage::new(2, 2);
        for y in 0..2 {
            for x in 0..2 {
                src.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
            }
        }
        let mut bytes = Vec::new();
        src.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .expect("encode");

        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        session
            .canvas()
            .expect("canvas")
            .draw_image(pt(100.0), pt(100.0), pt(100.0), pt(100.0), &bytes)
            .expect("draw image");

        let pixmap = session.current_page_preview().expect("preview").pixmap();
        let sample = pixmap.pixel(150, 792 - 150).expect("pixel");
        assert!(sample.red() > 200);
        assert!(sample.green() < 64);

        session.finish_session();
        let data = session.document_data().expect("data");
        assert!(data.windows(8).any(|w| w == b"/XObject"));
        let report = inspect_document_bytes(data).expect("inspect");
        assert_eq!(report.page_count, 1);
    }

    #[test]
    fn draw_image_rejects_garbage_without_side_effects() {
        let mut session = PrintSession::new();
        session.begin_page(Size::letter()).expect("begin");
        let err = session
            .canvas()
            .expect("canvas")
            .draw_image(pt(0.0), pt(0.0), pt(10.0), pt(10.0), b"not an image")
            .expect_err("garbage");
        assert!(matches!(err, PrintError::Image(_)));
        session.finish_session();
        assert_eq!(session.metrics().pages[0].command_count, 0);
    }

    #[test]
    fn metrics_record_commands_and_document_size() {
        let mut session = PrintSession::new();
        session.insert_blank_page(Size::letter()).expect("blank");
        session.begin_page(Size::letter()).expect("begin");
        {
            let mut canvas = session.canvas().expect("canvas");
            canvas.set_fill_color(Color::rgb(0.0, 0.0, 0.0));
            canvas.draw_rect(pt(10.0), pt(10.0), pt(50.0), pt(50.0));
        }
        session.finish_session();

        let metrics = session.metrics();
        assert_eq!(metrics.pages.len(), 2);
        assert_eq!(metrics.pages[0].command_count, 0);
        assert_eq!(metrics.pages[1].command_count, 2);
        assert!(metrics.pages[1].content_bytes > 0);
        assert_eq!(metrics.pages[0].preview_width_px, 612);
        assert_eq!(metrics.document_bytes, session.document_data().expect("data").len());
    }

    #[test]
    fn dropping_an_unfinished_session_finishes_it() {
        let path = temp_path("drop", "session.log");
        {
            let mut session = PrintSession::builder()
                .event_log(&path)
                .build()
                .expect("build");
            session.begin_page(Size::letter()).expect("begin");
            // Dropped with the page still open.
        }
        let contents = std::fs::read_to_string(&path).expect("log");
        assert!(contents.contains("\"type\":\"page.begin\""));
        assert!(contents.contains("\"type\":\"page.finish\""));
        assert!(contents.contains("\"type\":\"session.finish\""));
        assert!(contents.contains("session.summary"));
    }

    #[test]
    fn event_log_records_preview_rebinds() {
        let path = temp_path("rebind", "session.log");
        {
            let mut session = PrintSession::builder()
                .event_log(&path)
                .build()
                .expect("build");
            session.begin_page(Size::letter()).expect("begin");
            session
                .canvas()
                .expect("canvas")
                .draw_rect(pt(10.0), pt(10.0), pt(10.0), pt(10.0));
            let replacement = session
                .current_page_preview()
                .expect("preview")
                .pixmap()
                .clone();
            session
                .current_page_preview_mut()
                .expect("preview")
                .set_pixmap(replacement);
            session
                .canvas()
                .expect("canvas")
                .draw_rect(pt(30.0), pt(30.0), pt(10.0), pt(10.0));
            session.finish_session();
        }
        let contents = std::fs::read_to_string(&path).expect("log");
        assert!(contents.contains("\"type\":\"preview.rebind\""));
    }

    #[test]
    fn mixed_page_sizes_round_trip_through_inspection() {
        let mut session = PrintSession::new();
        session.insert_blank_page(Size::letter()).expect("letter");
        session.insert_blank_page(Size::a4()).expect("a4");
        session
            .insert_blank_page(Size::from_mm(100.0, 150.0))
            .expect("custom");
        session.finish_session();

        let report =
            inspect_document_bytes(session.document_data().expect("data")).expect("inspect");
        assert_eq!(report.page_count, 3);
        let (w, _) = report.media_boxes[0];
        assert!((w - 612.0).abs() < 0.01);
        let (w, _) = report.media_boxes[1];
        assert!((w - 595.28).abs() < 0.01);
        let (w, h) = report.media_boxes[2];
        assert!((w - 283.465).abs() < 0.01 && (h - 425.197).abs() < 0.01);
    }

    #[test]
    fn preview_png_encoding_round_trips() {
        let mut session = PrintSession::new();
        session.begin_page(Size::from_inches(2.0, 2.0)).expect("begin");
        {
            let mut canvas = session.canvas().expect("canvas");
            canvas.set_fill_color(Color::rgb(0.0, 0.0, 0.0));
            canvas.draw_rect(pt(36.0), pt(36.0), pt(72.0), pt(72.0));
        }
        let png = session
            .current_page_preview()
            .expect("preview")
            .encode_png()
            .expect("png");
        let decoded = image::load_from_memory(&png).expect("decode").to_rgba8();
        assert_eq!(decoded.dimensions(), (144, 144));
        let center = decoded.get_pixel(72, 72);
        assert!(center.0[0] < 64);
    }
}
