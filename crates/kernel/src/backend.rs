//! Collaborator interfaces the engine drives but does not implement: render
//! back-end, sound device and window system. Headless stand-ins are provided
//! for tools and tests.

use glam::Mat4;
use stride_common::Color;
use stride_ecs::MeshHandle;

use crate::error::BackendError;

/// Identifies the window a graphics back-end renders into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle {
    pub id: u64,
    pub title: String,
    pub width: u32,
    pub height: u32,
}

/// Events reported by the window system's event pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// The user asked to close the window; the engine responds with `exit()`.
    CloseRequested,
    Resized { width: u32, height: u32 },
}

/// Render back-end. The engine wraps every Draw step in
/// `begin_frame`/`end_frame` and sets the lagging flag just before it.
pub trait GraphicsBackend {
    fn init(&mut self, window: &WindowHandle) -> Result<(), BackendError>;
    fn cleanup(&mut self) -> Result<(), BackendError>;
    fn begin_frame(&mut self);
    fn end_frame(&mut self);
    fn clear(&mut self, color: Color);
    /// Submit one mesh. `transform` is already in the back-end's (column-major
    /// after transpose) convention.
    fn draw_tri_mesh(&mut self, mesh: MeshHandle, transform: &Mat4);
    /// True while the simulation is more than one draw period behind.
    fn set_lagging(&mut self, lagging: bool);
    fn is_lagging(&self) -> bool;
}

pub trait SoundBackend {
    fn init(&mut self) -> Result<(), BackendError>;
    fn cleanup(&mut self) -> Result<(), BackendError>;
}

pub trait WindowSystem {
    fn open(&mut self, title: &str, width: u32, height: u32) -> Result<WindowHandle, BackendError>;
    /// Called once per outer loop iteration.
    fn pump_events(&mut self) -> Result<Vec<WindowEvent>, BackendError>;
    fn close(&mut self) -> Result<(), BackendError>;
}

/// Graphics back-end that discards everything.
#[derive(Debug, Default)]
pub struct NullGraphics {
    lagging: bool,
}

impl GraphicsBackend for NullGraphics {
    fn init(&mut self, _window: &WindowHandle) -> Result<(), BackendError> {
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn begin_frame(&mut self) {}

    fn end_frame(&mut self) {}

    fn clear(&mut self, _color: Color) {}

    fn draw_tri_mesh(&mut self, _mesh: MeshHandle, _transform: &Mat4) {}

    fn set_lagging(&mut self, lagging: bool) {
        self.lagging = lagging;
    }

    fn is_lagging(&self) -> bool {
        self.lagging
    }
}

#[derive(Debug, Default)]
pub struct NullSound;

impl SoundBackend for NullSound {
    fn init(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// A window that never appears on screen. Optionally reports
/// `CloseRequested` on the Nth pump so headless runs terminate.
#[derive(Debug, Default)]
pub struct HeadlessWindow {
    close_after: Option<u64>,
    pumps: u64,
    handle: Option<WindowHandle>,
}

impl HeadlessWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close_after(mut self, pumps: u64) -> Self {
        self.close_after = Some(pumps);
        self
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn pumps(&self) -> u64 {
        self.pumps
    }
}

impl WindowSystem for HeadlessWindow {
    fn open(&mut self, title: &str, width: u32, height: u32) -> Result<WindowHandle, BackendError> {
        if self.handle.is_some() {
            return Err(BackendError::Window(format!("window {title:?} is already open")));
        }
        let handle = WindowHandle {
            id: 1,
            title: title.to_owned(),
            width,
            height,
        };
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    fn pump_events(&mut self) -> Result<Vec<WindowEvent>, BackendError> {
        if self.handle.is_none() {
            return Err(BackendError::Window("pumped events on a closed window".into()));
        }
        self.pumps += 1;
        match self.close_after {
            Some(limit) if self.pumps >= limit => Ok(vec![WindowEvent::CloseRequested]),
            _ => Ok(Vec::new()),
        }
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.handle
            .take()
            .map(|_| ())
            .ok_or_else(|| BackendError::Window("window is not open".into()))
    }
}
