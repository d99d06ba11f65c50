//! # Filter Playground
//!
//! Load an image, run one of four fixed filters on it through an image
//! module that lives on its own thread, and show the result.
//!
//! # Architecture: Controller and Relay
//!
//! ```text
//! bytes ─▶ Controller ──process{op, pixels, w, h, id}──▶ Relay thread ──▶ ImageModule
//!          (decode,     ◀──result{id, pixels, channels}──   (malloc, call,
//!           draw)                                            read, free)
//! ```
//!
//! The two sides share no memory. The controller clones the pixels it sends,
//! keeps a map of pending requests keyed by request id, and draws whatever
//! comes back onto a [`controller::DisplaySurface`]. The relay owns the only
//! handle to the module and drives it through a C-style calling convention:
//! copy pixels into module memory, call an entry point by name, copy the
//! result out, free both regions.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`controller`] | UI events: load, trigger, render responses, pending-request bookkeeping |
//! | [`relay`] | Relay thread, request/response protocol, the guarded `process` call |
//! | [`imaging`] | The `ImageModule` trait and the native module with its linear heap and filter kernels |
//! | [`session`] | A controller wired to a live relay, used by the CLI |
//! | [`codec`] | PNG/JPEG decode to RGBA and PNG encode via the `image` crate |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation |
//! | [`types`] | `ImageBuffer` and `Operation` shared by every layer |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Synchronous Controller
//!
//! [`controller::Controller`] never blocks and never touches a channel. It
//! returns the request to send and consumes responses handed to it. The same
//! code therefore runs under the threaded [`session::Playground`] and under
//! plain unit tests that feed it hand-built responses.
//!
//! ## Stale Results
//!
//! Every successful image load bumps a generation counter and every pending
//! request remembers the generation it was sent against. A result that
//! arrives after the image changed is dropped and only its loading indicator
//! is cleared, so an old filter can never paint over a newer image.
//!
//! ## Module Memory Is Always Released
//!
//! [`relay::process`] frees the input region and any output region on every
//! path out of a request, including a null result and a panic inside the
//! module, so the module heap stays bounded across any number of requests.

pub mod codec;
pub mod config;
pub mod controller;
pub mod imaging;
pub mod output;
pub mod relay;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
