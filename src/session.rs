//! A controller over an in-memory [`Canvas`] wired to a live [`Relay`].
//!
//! [`Playground`] is what the headless CLI drives: it sends the controller's
//! requests to the relay thread and pumps responses back until nothing is
//! pending. Waits are bounded by a timeout; an expired wait leaves pending
//! entries in place.

use crate::codec::CodecError;
use crate::controller::{Canvas, Controller, DefaultImage, Resolution};
use crate::imaging::ModuleLoader;
use crate::relay::{FilterParams, Relay, RelayGone, Request};
use crate::types::{ImageBuffer, Operation};
use log::debug;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    RelayGone(#[from] RelayGone),
    #[error("failed to start relay thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("timed out after {0:?} waiting for the relay")]
    Timeout(Duration),
    #[error("Failed to load image module: {0}")]
    InitFailed(String),
    #[error("Failed to load image: {0}")]
    Load(#[from] CodecError),
    #[error("image module not ready")]
    NotReady,
    #[error("no image loaded")]
    NoImage,
    #[error("{0}")]
    Filter(String),
}

/// The result of one filter, as rendered on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub operation: Operation,
    pub image: ImageBuffer,
    pub elapsed: Duration,
}

pub struct Playground {
    controller: Controller<Canvas>,
    relay: Relay,
    timeout: Duration,
}

impl Playground {
    /// Spawn the relay and send `init`. Call [`wait_ready`](Self::wait_ready)
    /// before triggering filters.
    pub fn start(
        loader: Box<dyn ModuleLoader>,
        params: FilterParams,
        default_image: DefaultImage,
    ) -> Result<Self, SessionError> {
        let relay = Relay::spawn(loader, params)?;
        let mut controller = Controller::new(Canvas::new(), default_image);
        relay.send(controller.start())?;
        Ok(Self {
            controller,
            relay,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait for the `init` answer. On success the default image is loaded.
    pub fn wait_ready(&mut self) -> Result<(), SessionError> {
        while !self.controller.is_ready() {
            match self.pump_one()? {
                Resolution::InitFailed(message) => return Err(SessionError::InitFailed(message)),
                resolution => debug!("pumped {resolution:?} while waiting for init"),
            }
        }
        Ok(())
    }

    /// Feed new image bytes to the controller.
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        Ok(self.controller.load_image(bytes)?)
    }

    /// Trigger `operation` and dispatch the request. `false` when the
    /// controller refused (no image or relay not ready).
    pub fn trigger(&mut self, operation: &str) -> Result<bool, SessionError> {
        match self.controller.trigger_filter(operation) {
            Some(request) => {
                self.relay.send(request)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Receive one response and hand it to the controller.
    pub fn pump_one(&mut self) -> Result<Resolution, SessionError> {
        let response = self
            .relay
            .recv_timeout(self.timeout)?
            .ok_or(SessionError::Timeout(self.timeout))?;
        Ok(self.controller.on_relay_response(response))
    }

    /// Pump until no request is pending. Returns every resolution seen.
    pub fn settle(&mut self) -> Result<Vec<Resolution>, SessionError> {
        let mut resolutions = Vec::new();
        while !self.controller.pending().is_empty() {
            resolutions.push(self.pump_one()?);
        }
        Ok(resolutions)
    }

    /// Run one filter to completion and return what was rendered.
    pub fn apply(&mut self, operation: Operation) -> Result<FilterOutcome, SessionError> {
        let started = Instant::now();
        if !self.trigger(operation.name())? {
            return Err(if self.controller.is_ready() {
                SessionError::NoImage
            } else {
                SessionError::NotReady
            });
        }
        for resolution in self.settle()? {
            match resolution {
                Resolution::Rendered { .. } => {}
                Resolution::Failed { .. } => {
                    let message = self
                        .controller
                        .surface()
                        .status_message()
                        .unwrap_or("filter failed")
                        .to_string();
                    return Err(SessionError::Filter(message));
                }
                other => debug!("pumped {other:?} while applying {operation}"),
            }
        }
        let image = self
            .controller
            .surface()
            .processed
            .clone()
            .ok_or(SessionError::NoImage)?;
        Ok(FilterOutcome {
            operation,
            image,
            elapsed: started.elapsed(),
        })
    }

    /// Send a raw request, bypassing the controller.
    pub fn send_raw(&self, request: Request) -> Result<(), SessionError> {
        Ok(self.relay.send(request)?)
    }

    pub fn controller(&self) -> &Controller<Canvas> {
        &self.controller
    }

    pub fn canvas(&self) -> &Canvas {
        self.controller.surface()
    }

    /// Stop the relay thread. Also happens on drop.
    pub fn shutdown(mut self) {
        self.relay.shutdown();
    }
}
