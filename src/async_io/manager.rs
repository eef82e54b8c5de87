//! Background listing dispatch using one thread per request.

use std::thread;

use tracing::debug;

use crate::async_io::{IoRequest, IoResponse};

/// Dispatches listings to background threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct Loader;

impl Loader {
    pub fn new() -> Self {
        Self
    }

    /// Run `req` on a new thread and hand the response to `deliver` from
    /// that thread.
    pub fn dispatch<F>(&self, req: IoRequest, deliver: F)
    where
        F: FnOnce(IoResponse) + Send + 'static,
    {
        debug!(generation = req.generation, path = %req.path, "dispatching listing");
        thread::spawn(move || deliver(handle_request(req)));
    }
}

fn handle_request(req: IoRequest) -> IoResponse {
    let result = req.backend.list(&req.cancel, &req.path);
    IoResponse {
        generation: req.generation,
        path: req.path,
        result,
    }
}
