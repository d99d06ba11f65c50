//! UI-side event handling.
//!
//! The [`Controller`] owns the decoded pixels of the current image and turns
//! user events into relay requests, and relay responses into drawing on a
//! [`DisplaySurface`]. It never talks to the relay itself: [`trigger_filter`]
//! returns the request to send and [`on_relay_response`] consumes whatever
//! comes back, which keeps the controller synchronous and directly testable.
//!
//! ## State
//!
//! ```text
//! Empty ──load ok──▶ Loaded(gen 1) ──load ok──▶ Loaded(gen 2) ──▶ …
//! ```
//!
//! Filters can be triggered only in `Loaded` and only once the relay has
//! answered `init` successfully. Every successful load bumps the generation;
//! a result for an older generation is dropped without touching the
//! processed view, which a new image blanks. A filter's loading indicator
//! stays up until its last in-flight request resolves.
//!
//! [`trigger_filter`]: Controller::trigger_filter
//! [`on_relay_response`]: Controller::on_relay_response

pub mod pending;
pub mod surface;

pub use pending::{PendingRequest, PendingRequests};
pub use surface::{Canvas, DisplaySurface, StatusKind, SurfaceEvent};

use crate::codec;
use crate::relay::{Payload, Request, RequestId, Response};
use crate::types::{ImageBuffer, Operation};
use log::debug;
use std::path::PathBuf;

/// PNG compiled into the binary and shown once the relay is ready.
pub const DEFAULT_ASSET: &[u8] = include_bytes!("../../assets/default.png");

pub const LOAD_SPINNER: &str = "loadSpinner";

/// Source of the image loaded automatically after init.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DefaultImage {
    #[default]
    Bundled,
    Path(PathBuf),
}

/// How a relay response was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Ready,
    InitFailed(String),
    Rendered {
        request_id: RequestId,
        operation: String,
    },
    Failed {
        request_id: RequestId,
        message: String,
    },
    /// The image changed while the request was in flight.
    Stale(RequestId),
    /// No pending request with this id.
    Ignored(RequestId),
}

pub struct Controller<S: DisplaySurface> {
    surface: S,
    image: Option<ImageBuffer>,
    generation: u64,
    relay_ready: bool,
    pending: PendingRequests,
    default_image: DefaultImage,
}

impl<S: DisplaySurface> Controller<S> {
    pub fn new(mut surface: S, default_image: DefaultImage) -> Self {
        surface.set_filters_enabled(false);
        Self {
            surface,
            image: None,
            generation: 0,
            relay_ready: false,
            pending: PendingRequests::new(),
            default_image,
        }
    }

    /// Show the loading status and return the `init` request to send.
    pub fn start(&mut self) -> Request {
        self.surface
            .set_status(StatusKind::Info, "Loading image module...");
        Request::Init
    }

    /// Decode `bytes` and make them the current image.
    ///
    /// On failure the previous image, if any, stays current.
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<(), codec::CodecError> {
        self.surface.show_spinner(LOAD_SPINNER);
        let decoded = codec::decode(bytes);
        self.surface.hide_spinner(LOAD_SPINNER);
        match decoded {
            Ok(image) => {
                self.install(image);
                Ok(())
            }
            Err(e) => {
                self.surface
                    .set_status(StatusKind::Error, &format!("Failed to load image: {e}"));
                Err(e)
            }
        }
    }

    /// Load the bundled asset, or the configured override.
    pub fn load_default_image(&mut self) -> Result<(), codec::CodecError> {
        let decoded = match &self.default_image {
            DefaultImage::Bundled => codec::decode(DEFAULT_ASSET),
            DefaultImage::Path(path) => codec::decode_file(path),
        };
        match decoded {
            Ok(image) => {
                self.install(image);
                Ok(())
            }
            Err(e) => {
                debug!("default image: {e}");
                self.surface
                    .set_status(StatusKind::Error, "Failed to load default image");
                Err(e)
            }
        }
    }

    fn install(&mut self, image: ImageBuffer) {
        self.surface.show_original(&image);
        // a result for the previous image must not sit next to this one
        self.surface.clear_processed();
        self.image = Some(image);
        self.generation += 1;
        if self.relay_ready {
            self.surface.set_filters_enabled(true);
        }
    }

    /// Build the `process` request for `operation`.
    ///
    /// Returns `None` while no image is loaded or the relay is not ready.
    /// Names outside the four filters are still sent; the relay answers
    /// with an error naming them.
    pub fn trigger_filter(&mut self, operation: &str) -> Option<Request> {
        if !self.relay_ready {
            return None;
        }
        let image = self.image.as_ref()?;

        let (display, spinner) = match operation.parse::<Operation>() {
            Ok(op) => (op.display_name().to_string(), op.spinner_id().to_string()),
            Err(_) => (operation.to_string(), format!("{operation}Spinner")),
        };
        let request_id = RequestId::next();
        self.pending.insert(
            request_id,
            PendingRequest {
                operation: display,
                spinner: spinner.clone(),
                generation: self.generation,
            },
        );
        self.surface.show_spinner(&spinner);

        Some(Request::Process {
            operation: operation.to_string(),
            request_id,
            pixels: image.pixels().to_vec(),
            width: image.width(),
            height: image.height(),
        })
    }

    pub fn on_relay_response(&mut self, response: Response) -> Resolution {
        match response {
            Response::Init { success: true, .. } => {
                self.surface.clear_status();
                self.relay_ready = true;
                // a failure is already on the status line
                let _ = self.load_default_image();
                if self.image.is_some() {
                    self.surface.set_filters_enabled(true);
                }
                Resolution::Ready
            }
            Response::Init {
                success: false,
                message,
            } => {
                self.surface.set_status(
                    StatusKind::Error,
                    &format!("Failed to load image module: {message}"),
                );
                Resolution::InitFailed(message)
            }
            Response::Result {
                request_id,
                success,
                payload,
                message,
            } => self.resolve(request_id, success, payload, message),
        }
    }

    fn resolve(
        &mut self,
        request_id: RequestId,
        success: bool,
        payload: Option<Payload>,
        message: Option<String>,
    ) -> Resolution {
        let Some(pending) = self.pending.take(request_id) else {
            debug!("ignoring result for unknown request {request_id}");
            return Resolution::Ignored(request_id);
        };
        if !self.pending.uses_spinner(&pending.spinner) {
            self.surface.hide_spinner(&pending.spinner);
        }

        if pending.generation != self.generation {
            debug!(
                "discarding stale result {request_id} (generation {} != {})",
                pending.generation, self.generation
            );
            return Resolution::Stale(request_id);
        }

        let rendered = match (success, payload) {
            (true, Some(payload)) => payload
                .into_image()
                .map(|image| self.surface.show_processed(&image.to_rgba()))
                .map_err(|e| e.to_string()),
            (true, None) => Err("result carried no pixels".to_string()),
            (false, _) => Err(message.unwrap_or_else(|| "unknown error".to_string())),
        };
        match rendered {
            Ok(()) => Resolution::Rendered {
                request_id,
                operation: pending.operation,
            },
            Err(message) => {
                self.surface.set_status(
                    StatusKind::Error,
                    &format!(
                        "Failed to apply {}: {message}",
                        pending.operation.to_lowercase()
                    ),
                );
                Resolution::Failed {
                    request_id,
                    message,
                }
            }
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn image(&self) -> Option<&ImageBuffer> {
        self.image.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_ready(&self) -> bool {
        self.relay_ready
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }
}
