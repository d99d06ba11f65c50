//! The relay thread and the handle the UI side holds on to.
//!
//! Requests are handled strictly one at a time in arrival order. Nothing a
//! request does can take the thread down: module errors and panics become
//! failure responses and the loop keeps going.

use super::invoke::{self, FilterParams, RelayError, panic_message};
use super::protocol::{Payload, Request, Response};
use crate::imaging::{ImageModule, ModuleLoader};
use log::{debug, info, warn};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("relay thread has stopped")]
pub struct RelayGone;

/// Owning handle to a running relay thread.
///
/// Dropping the handle sends `shutdown` and joins the thread.
pub struct Relay {
    requests: Sender<Request>,
    responses: Receiver<Response>,
    handle: Option<JoinHandle<()>>,
}

impl Relay {
    /// Start the relay thread. The module is not loaded until an
    /// [`Request::Init`] arrives.
    pub fn spawn(loader: Box<dyn ModuleLoader>, params: FilterParams) -> io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("image-relay".into())
            .spawn(move || {
                Worker {
                    loader,
                    params,
                    module: None,
                }
                .run(request_rx, response_tx)
            })?;
        Ok(Self {
            requests: request_tx,
            responses: response_rx,
            handle: Some(handle),
        })
    }

    pub fn send(&self, request: Request) -> Result<(), RelayGone> {
        self.requests.send(request).map_err(|_| RelayGone)
    }

    /// Block until the next response.
    pub fn recv(&self) -> Result<Response, RelayGone> {
        self.responses.recv().map_err(|_| RelayGone)
    }

    /// `Ok(None)` when nothing arrived within `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Response>, RelayGone> {
        match self.responses.recv_timeout(timeout) {
            Ok(response) => Ok(Some(response)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(RelayGone),
        }
    }

    pub fn try_recv(&self) -> Result<Option<Response>, RelayGone> {
        match self.responses.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(RelayGone),
        }
    }

    /// Stop the thread and drop the module. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        // a send error means the thread already exited
        let _ = self.requests.send(Request::Shutdown);
        if handle.join().is_err() {
            warn!("relay thread panicked during shutdown");
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the relay thread.
struct Worker {
    loader: Box<dyn ModuleLoader>,
    params: FilterParams,
    module: Option<Box<dyn ImageModule>>,
}

impl Worker {
    fn run(mut self, requests: Receiver<Request>, responses: Sender<Response>) {
        debug!("relay thread started");
        for request in requests {
            debug!("relay <- {}", request.to_log_line());
            let response = match request {
                Request::Init => self.initialize(),
                Request::Process {
                    operation,
                    request_id,
                    pixels,
                    width,
                    height,
                } => match self.process(&operation, &pixels, width, height) {
                    Ok(payload) => Response::result_ok(request_id, payload),
                    Err(e) => {
                        warn!("request {request_id} ({operation}) failed: {e}");
                        Response::result_failed(request_id, e)
                    }
                },
                Request::Shutdown => break,
            };
            debug!("relay -> {}", response.to_log_line());
            if responses.send(response).is_err() {
                break;
            }
        }
        if let Some(module) = self.module.take() {
            let stats = module.memory_stats();
            debug!(
                "dropping image module ({} live allocations, heap {} bytes)",
                stats.live_allocations, stats.heap_size
            );
        }
        debug!("relay thread stopped");
    }

    fn initialize(&mut self) -> Response {
        if self.module.is_some() {
            return Response::init_ok();
        }
        let loader = &self.loader;
        let loaded = panic::catch_unwind(AssertUnwindSafe(|| loader.load()));
        match loaded {
            Ok(Ok(module)) => {
                info!("image module loaded");
                self.module = Some(module);
                Response::init_ok()
            }
            Ok(Err(e)) => {
                warn!("image module failed to load: {e}");
                Response::init_failed(e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!("image module loader panicked: {message}");
                Response::init_failed(message)
            }
        }
    }

    fn process(
        &mut self,
        operation: &str,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Payload, RelayError> {
        let module = self.module.as_deref_mut().ok_or(RelayError::NotInitialized)?;
        invoke::process(module, operation, pixels, width, height, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockLoader, MockModule, RecordedOp};
    use crate::imaging::{ModuleError, NativeLoader};
    use crate::relay::protocol::RequestId;

    const WAIT: Duration = Duration::from_secs(5);

    fn process_request(operation: &str, width: u32, height: u32) -> (RequestId, Request) {
        let id = RequestId::next();
        let request = Request::Process {
            operation: operation.to_string(),
            request_id: id,
            pixels: vec![128; (width * height * 4) as usize],
            width,
            height,
        };
        (id, request)
    }

    fn roundtrip(relay: &Relay, request: Request) -> Response {
        relay.send(request).unwrap();
        relay.recv_timeout(WAIT).unwrap().expect("relay did not answer")
    }

    #[test]
    fn init_reports_success_message() {
        let relay = Relay::spawn(Box::new(NativeLoader::default()), FilterParams::default()).unwrap();
        assert_eq!(roundtrip(&relay, Request::Init), Response::init_ok());
    }

    #[test]
    fn second_init_does_not_reload() {
        // MockLoader hands out its module once; a reload would fail
        let loader = MockLoader::with_module(MockModule::new());
        let relay = Relay::spawn(Box::new(loader), FilterParams::default()).unwrap();
        assert_eq!(roundtrip(&relay, Request::Init), Response::init_ok());
        assert_eq!(roundtrip(&relay, Request::Init), Response::init_ok());
    }

    #[test]
    fn init_failure_carries_loader_message() {
        let loader = MockLoader::failing("module file missing");
        let relay = Relay::spawn(Box::new(loader), FilterParams::default()).unwrap();
        assert_eq!(
            roundtrip(&relay, Request::Init),
            Response::init_failed("module file missing")
        );
    }

    #[test]
    fn process_before_init_fails() {
        let relay = Relay::spawn(Box::new(NativeLoader::default()), FilterParams::default()).unwrap();
        let (id, request) = process_request("grayscale", 2, 2);
        assert_eq!(
            roundtrip(&relay, request),
            Response::result_failed(id, "image module not initialized")
        );
    }

    #[test]
    fn relay_keeps_serving_after_failure() {
        let module = MockModule::failing("fcv_grayscale");
        let log = module.log();
        let relay = Relay::spawn(
            Box::new(MockLoader::with_module(module)),
            FilterParams::default(),
        )
        .unwrap();
        roundtrip(&relay, Request::Init);

        let (id, request) = process_request("grayscale", 2, 2);
        assert_eq!(
            roundtrip(&relay, request),
            Response::result_failed(id, "Failed to process image")
        );

        let (id, request) = process_request("blur", 2, 2);
        match roundtrip(&relay, request) {
            Response::Result {
                request_id,
                success,
                payload,
                ..
            } => {
                assert_eq!(request_id, id);
                assert!(success);
                assert_eq!(payload.unwrap().pixels, vec![0x7f; 16]);
            }
            other => panic!("unexpected response {other:?}"),
        }

        let frees = log
            .lock()
            .unwrap()
            .iter()
            .filter(|op| matches!(op, RecordedOp::Free(_)))
            .count();
        assert_eq!(frees, 3);
    }

    #[test]
    fn responses_arrive_in_request_order() {
        let relay = Relay::spawn(Box::new(NativeLoader::default()), FilterParams::default()).unwrap();
        roundtrip(&relay, Request::Init);

        let (first, a) = process_request("sobel", 3, 3);
        let (second, b) = process_request("unknown", 3, 3);
        relay.send(a).unwrap();
        relay.send(b).unwrap();

        let ids: Vec<RequestId> = (0..2)
            .map(|_| match relay.recv_timeout(WAIT).unwrap().unwrap() {
                Response::Result { request_id, .. } => request_id,
                other => panic!("unexpected response {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn panicking_loader_is_reported() {
        struct Exploding;
        impl ModuleLoader for Exploding {
            fn load(&self) -> Result<Box<dyn ImageModule>, ModuleError> {
                panic!("linker exploded")
            }
        }
        let relay = Relay::spawn(Box::new(Exploding), FilterParams::default()).unwrap();
        assert_eq!(
            roundtrip(&relay, Request::Init),
            Response::init_failed("linker exploded")
        );
    }

    #[test]
    fn shutdown_closes_response_channel() {
        let mut relay =
            Relay::spawn(Box::new(NativeLoader::default()), FilterParams::default()).unwrap();
        relay.shutdown();
        relay.shutdown();
        assert_eq!(relay.recv(), Err(RelayGone));
        assert_eq!(relay.send(Request::Init), Err(RelayGone));
    }

    #[test]
    fn try_recv_is_empty_before_any_request() {
        let relay = Relay::spawn(Box::new(NativeLoader::default()), FilterParams::default()).unwrap();
        assert_eq!(relay.try_recv(), Ok(None));
    }
}
