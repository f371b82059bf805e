use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    cancel::CancelToken,
    state::{ProgressSnapshot, SimulationResult},
};

/// Receives progress snapshots while a run is in flight.
///
/// Called synchronously from the run loop, so implementations should be quick.
/// A panic inside `on_progress` is contained and does not stop the run.
pub trait ProgressListener: Send + Sync {
    /// Handles one snapshot.
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressListener for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot);
    }
}

/// Listener that keeps every snapshot in emission order.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    snapshots: Mutex<Vec<ProgressSnapshot>>,
}

impl TraceRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the recorded trace.
    #[must_use]
    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.snapshots.lock().clone()
    }

    /// Takes the recorded trace, leaving the recorder empty.
    pub fn take(&self) -> Vec<ProgressSnapshot> {
        std::mem::take(&mut *self.snapshots.lock())
    }
}

impl ProgressListener for TraceRecorder {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.snapshots.lock().push(*snapshot);
    }
}

/// Item of a [`RunEvents`] stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunEvent {
    /// Intermediate snapshot.
    Progress(ProgressSnapshot),
    /// Terminal result; always the last item.
    Finished(SimulationResult),
}

/// Ordered stream of a spawned run: snapshots, then exactly one result.
///
/// Dropping the stream cancels the run; it then finishes as [`Termination::Cancelled`].
///
/// [`Termination::Cancelled`]: crate::state::Termination::Cancelled
#[derive(Debug)]
pub struct RunEvents {
    run_id: Uuid,
    receiver: mpsc::UnboundedReceiver<RunEvent>,
    cancel: CancelToken,
}

impl RunEvents {
    pub(crate) const fn new(
        run_id: Uuid,
        receiver: mpsc::UnboundedReceiver<RunEvent>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            run_id,
            receiver,
            cancel,
        }
    }

    /// Identifier used in the run's telemetry.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Requests cancellation of the underlying run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drains the stream and returns the terminal result.
    ///
    /// Returns `None` if the run task died before finishing.
    pub async fn into_result(mut self) -> Option<SimulationResult> {
        while let Some(event) = self.receiver.recv().await {
            if let RunEvent::Finished(result) = event {
                return Some(result);
            }
        }
        None
    }
}

impl Drop for RunEvents {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Stream for RunEvents {
    type Item = RunEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Delivers snapshots of one run to the registered listener and event channel.
pub(crate) struct Emitter {
    listener: Option<Arc<dyn ProgressListener>>,
    channel: Option<mpsc::UnboundedSender<RunEvent>>,
    faults: u64,
}

impl Emitter {
    pub(crate) fn new(
        listener: Option<Arc<dyn ProgressListener>>,
        channel: Option<mpsc::UnboundedSender<RunEvent>>,
    ) -> Self {
        Self {
            listener,
            channel,
            faults: 0,
        }
    }

    /// Emits a snapshot. Returns the panic message if the listener faulted.
    pub(crate) fn emit(&mut self, snapshot: ProgressSnapshot) -> Option<String> {
        if let Some(channel) = &self.channel {
            // A dropped stream only means nobody is watching.
            let _ = channel.send(RunEvent::Progress(snapshot));
        }
        let listener = self.listener.as_ref()?;
        match catch_unwind(AssertUnwindSafe(|| listener.on_progress(&snapshot))) {
            Ok(()) => None,
            Err(payload) => {
                self.faults += 1;
                Some(panic_message(payload.as_ref()))
            }
        }
    }

    pub(crate) fn finish(&self, result: SimulationResult) {
        if let Some(channel) = &self.channel {
            let _ = channel.send(RunEvent::Finished(result));
        }
    }

    pub(crate) const fn faults(&self) -> u64 {
        self.faults
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "listener panicked".to_string()
    }
}
