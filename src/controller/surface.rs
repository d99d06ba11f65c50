//! Where the controller draws.
//!
//! [`DisplaySurface`] stands in for the page: two image views, a status line,
//! one loading indicator per filter and the filter triggers. [`Canvas`] is the
//! in-memory implementation used by the headless session and by tests.

use crate::types::ImageBuffer;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Info,
    Error,
}

pub trait DisplaySurface {
    /// Draw the freshly loaded image.
    fn show_original(&mut self, image: &ImageBuffer);
    /// Draw a filter result. Always RGBA.
    fn show_processed(&mut self, image: &ImageBuffer);
    /// Blank the processed view.
    fn clear_processed(&mut self);
    fn set_status(&mut self, kind: StatusKind, message: &str);
    fn clear_status(&mut self);
    fn show_spinner(&mut self, id: &str);
    fn hide_spinner(&mut self, id: &str);
    fn set_filters_enabled(&mut self, enabled: bool);
}

/// Something the controller did to a [`Canvas`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Original { width: u32, height: u32 },
    Processed { width: u32, height: u32 },
    ProcessedCleared,
    Status(StatusKind, String),
    StatusCleared,
    SpinnerShown(String),
    SpinnerHidden(String),
    FiltersEnabled(bool),
}

/// Records what is currently on screen plus the full event history.
#[derive(Debug, Default)]
pub struct Canvas {
    pub original: Option<ImageBuffer>,
    pub processed: Option<ImageBuffer>,
    pub status: Option<(StatusKind, String)>,
    pub spinners: BTreeSet<String>,
    pub filters_enabled: bool,
    pub history: Vec<SurfaceEvent>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status.as_ref().map(|(_, m)| m.as_str())
    }

    pub fn is_spinning(&self, id: &str) -> bool {
        self.spinners.contains(id)
    }
}

impl DisplaySurface for Canvas {
    fn show_original(&mut self, image: &ImageBuffer) {
        self.history.push(SurfaceEvent::Original {
            width: image.width(),
            height: image.height(),
        });
        self.original = Some(image.clone());
    }

    fn show_processed(&mut self, image: &ImageBuffer) {
        self.history.push(SurfaceEvent::Processed {
            width: image.width(),
            height: image.height(),
        });
        self.processed = Some(image.clone());
    }

    fn clear_processed(&mut self) {
        self.history.push(SurfaceEvent::ProcessedCleared);
        self.processed = None;
    }

    fn set_status(&mut self, kind: StatusKind, message: &str) {
        self.history
            .push(SurfaceEvent::Status(kind, message.to_string()));
        self.status = Some((kind, message.to_string()));
    }

    fn clear_status(&mut self) {
        self.history.push(SurfaceEvent::StatusCleared);
        self.status = None;
    }

    fn show_spinner(&mut self, id: &str) {
        self.history.push(SurfaceEvent::SpinnerShown(id.to_string()));
        self.spinners.insert(id.to_string());
    }

    fn hide_spinner(&mut self, id: &str) {
        self.history.push(SurfaceEvent::SpinnerHidden(id.to_string()));
        self.spinners.remove(id);
    }

    fn set_filters_enabled(&mut self, enabled: bool) {
        self.history.push(SurfaceEvent::FiltersEnabled(enabled));
        self.filters_enabled = enabled;
    }
}
