use glam::Mat4;
use std::cell::{Ref, RefCell};
use std::fmt::Write;
use std::rc::Rc;
use stride_common::Color;
use stride_ecs::MeshHandle;
use stride_kernel::{BackendError, GraphicsBackend, WindowHandle};

/// One submitted mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Index of the frame it was submitted in, starting at 1.
    pub frame: u64,
    pub mesh: MeshHandle,
    /// As received, i.e. transposed.
    pub transform: Mat4,
}

/// Everything a `RecordingBackend` has observed.
#[derive(Debug, Default)]
pub struct Recording {
    pub window: Option<WindowHandle>,
    pub initialized: bool,
    pub cleaned_up: bool,
    pub frames_begun: u64,
    pub frames_ended: u64,
    pub lagging_frames: u64,
    /// Clear colors of the most recent frame.
    pub clears: Vec<Color>,
    /// Draw calls of the most recent frame.
    pub draw_calls: Vec<DrawCall>,
    pub total_draw_calls: u64,
    lagging: bool,
}

/// Graphics back-end that renders nothing and records every call.
///
/// Clones share one recording, so a test or tool can keep a clone while the
/// engine owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    shared: Rc<RefCell<Recording>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recording(&self) -> Ref<'_, Recording> {
        self.shared.borrow()
    }

    /// Human-readable dump of the latest frame.
    pub fn summary(&self) -> String {
        let rec = self.shared.borrow();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== Render (frames={}, lagging_frames={}, draw_calls={}) ===",
            rec.frames_ended, rec.lagging_frames, rec.total_draw_calls
        );
        if let Some(window) = &rec.window {
            let _ = writeln!(out, "Window: {:?} {}x{}", window.title, window.width, window.height);
        }
        for call in &rec.draw_calls {
            // Undo the submission transpose to read the translation column.
            let t = call.transform.transpose().w_axis;
            let _ = writeln!(
                out,
                "  [mesh {}] pos=({:.2}, {:.2}, {:.2})",
                call.mesh.0, t.x, t.y, t.z
            );
        }
        out
    }
}

impl GraphicsBackend for RecordingBackend {
    fn init(&mut self, window: &WindowHandle) -> Result<(), BackendError> {
        let mut rec = self.shared.borrow_mut();
        if rec.initialized {
            return Err(BackendError::Graphics("already initialized".into()));
        }
        rec.initialized = true;
        rec.window = Some(window.clone());
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), BackendError> {
        let mut rec = self.shared.borrow_mut();
        if !rec.initialized {
            return Err(BackendError::Graphics("cleanup before init".into()));
        }
        rec.initialized = false;
        rec.cleaned_up = true;
        Ok(())
    }

    fn begin_frame(&mut self) {
        let mut rec = self.shared.borrow_mut();
        rec.frames_begun += 1;
        rec.clears.clear();
        rec.draw_calls.clear();
        if rec.lagging {
            rec.lagging_frames += 1;
        }
    }

    fn end_frame(&mut self) {
        self.shared.borrow_mut().frames_ended += 1;
    }

    fn clear(&mut self, color: Color) {
        self.shared.borrow_mut().clears.push(color);
    }

    fn draw_tri_mesh(&mut self, mesh: MeshHandle, transform: &Mat4) {
        let mut rec = self.shared.borrow_mut();
        let frame = rec.frames_begun;
        rec.draw_calls.push(DrawCall {
            frame,
            mesh,
            transform: *transform,
        });
        rec.total_draw_calls += 1;
    }

    fn set_lagging(&mut self, lagging: bool) {
        self.shared.borrow_mut().lagging = lagging;
    }

    fn is_lagging(&self) -> bool {
        self.shared.borrow().lagging
    }
}
