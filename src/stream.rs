//! Frame stream
//!
//! Resolves a sequence of frame requests on one worker thread. Requests are
//! handed over through a bounded channel so a fast producer blocks instead of
//! queueing unbounded work; results come back in submission order. All frames
//! of one stream share a session, so tone-mapping state carries over from one
//! frame to the next.

use crate::error::{Error, Result};
use crate::pipe::Request;
use crate::resolver::{Resolver, SharedSession, Submission};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;

/// Outcome of one streamed frame
#[derive(Debug)]
pub struct FrameResult {
    /// Position of the request in the stream, starting at 0
    pub sequence: u64,
    pub result: Result<Vec<Submission>>,
}

impl FrameResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Worker thread resolving frames in order
pub struct FrameStream {
    requests: Option<Sender<(u64, Request)>>,
    results: Receiver<FrameResult>,
    session: SharedSession,
    worker: Option<JoinHandle<()>>,
    next_sequence: u64,
}

impl FrameStream {
    /// Start a stream with a fresh session. `capacity` bounds the number of
    /// requests waiting for the worker.
    pub fn spawn(resolver: Resolver, capacity: usize) -> Result<Self> {
        Self::with_session(resolver, SharedSession::new(), capacity)
    }

    /// Start a stream on an existing session
    pub fn with_session(resolver: Resolver, session: SharedSession, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(1);
        let (request_tx, request_rx) = crossbeam_channel::bounded::<(u64, Request)>(capacity);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<FrameResult>();

        let worker_session = session.clone();
        let worker = std::thread::Builder::new()
            .name("vproute-resolver".into())
            .spawn(move || run_worker(resolver, worker_session, request_rx, result_tx))?;

        tracing::debug!("Frame stream started (capacity {})", capacity);
        Ok(Self {
            requests: Some(request_tx),
            results: result_rx,
            session,
            worker: Some(worker),
            next_sequence: 0,
        })
    }

    /// Queue one frame. Blocks while the queue is full.
    pub fn submit(&mut self, request: Request) -> Result<u64> {
        let sender = self
            .requests
            .as_ref()
            .ok_or_else(|| Error::StreamClosed("already finished".into()))?;
        let sequence = self.next_sequence;
        sender
            .send((sequence, request))
            .map_err(|_| Error::StreamClosed("resolver thread stopped".into()))?;
        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Wait for the next result. `None` once the worker has stopped and
    /// every result was taken.
    pub fn recv(&self) -> Option<FrameResult> {
        self.results.recv().ok()
    }

    /// Take a result if one is ready
    pub fn try_recv(&self) -> Option<FrameResult> {
        match self.results.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Number of frames submitted so far
    pub fn submitted(&self) -> u64 {
        self.next_sequence
    }

    /// Close the queue, wait for the worker and return every result not yet taken
    pub fn finish(mut self) -> Vec<FrameResult> {
        self.shutdown();
        self.results.try_iter().collect()
    }

    fn shutdown(&mut self) {
        // Dropping the sender ends the worker loop.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Resolver thread panicked");
            }
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    resolver: Resolver,
    session: SharedSession,
    requests: Receiver<(u64, Request)>,
    results: Sender<FrameResult>,
) {
    tracing::debug!("Resolver thread started");
    for (sequence, request) in requests {
        let result = {
            let mut session = session.lock();
            resolver.resolve_frame(&request, &mut session)
        };
        match &result {
            Err(e) if e.is_capability_issue() => {
                tracing::warn!("Frame {} not supported by the hardware: {}", sequence, e)
            }
            Err(e) => tracing::error!("Frame {} failed: {}", sequence, e),
            Ok(_) => {}
        }
        if results.send(FrameResult { sequence, result }).is_err() {
            break;
        }
    }
    tracing::debug!("Resolver thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::{CapsPreset, HwCaps};
    use crate::types::{Format, Surface};

    fn resolver() -> Resolver {
        Resolver::new(HwCaps::from(CapsPreset::Reference))
    }

    fn request() -> Request {
        Request::single(
            Surface::new(Format::Nv12, 1920, 1080),
            Surface::new(Format::Nv12, 1280, 720),
        )
    }

    #[test]
    fn test_results_in_order() {
        let mut stream = FrameStream::spawn(resolver(), 2).unwrap();
        for expected in 0..5 {
            assert_eq!(stream.submit(request()).unwrap(), expected);
        }
        let results = stream.finish();
        assert_eq!(results.len(), 5);
        for (i, frame) in results.iter().enumerate() {
            assert_eq!(frame.sequence, i as u64);
            assert!(frame.is_ok());
        }
    }

    #[test]
    fn test_session_counts_frames() {
        let mut stream = FrameStream::spawn(resolver(), 4).unwrap();
        let session = stream.session().clone();
        stream.submit(request()).unwrap();
        stream.submit(request()).unwrap();
        assert!(stream.recv().is_some());
        assert!(stream.recv().is_some());
        assert_eq!(session.snapshot().frames(), 2);
        assert_eq!(stream.submitted(), 2);
    }

    #[test]
    fn test_failed_frame_keeps_stream_alive() {
        let mut stream = FrameStream::spawn(resolver(), 1).unwrap();
        stream.submit(Request::default()).unwrap();
        stream.submit(request()).unwrap();
        let results = stream.finish();
        assert_eq!(results.len(), 2);
        assert!(!results[0].is_ok());
        assert!(results[1].is_ok());
    }

    #[test]
    fn test_submit_after_shutdown_is_closed() {
        let mut stream = FrameStream::spawn(resolver(), 1).unwrap();
        stream.submit(request()).unwrap();
        stream.shutdown();
        assert!(matches!(stream.submit(request()), Err(Error::StreamClosed(_))));
        assert_eq!(stream.submitted(), 1);
        assert!(stream.try_recv().is_some_and(|frame| frame.is_ok()));
    }
}
