//! Start/stop lifecycle shared by source nodes.

/// Scheduled playback window of a source node.
///
/// A node produces output from its start time until its stop time. Once
/// disposed it stays silent and every further `start`/`stop`/`dispose` call
/// is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Lifecycle {
    start: Option<f64>,
    stop: Option<f64>,
    disposed: bool,
}

impl Lifecycle {
    /// Schedule playback to begin at `time`.
    pub fn start(&mut self, time: f64) {
        if self.disposed {
            return;
        }
        self.start = Some(time);
        self.stop = None;
    }

    /// Schedule playback to end at `time`.
    ///
    /// Returns `false` when the node was already disposed.
    pub fn stop(&mut self, time: f64) -> bool {
        if self.disposed {
            return false;
        }
        self.stop = Some(time);
        true
    }

    /// Drop a pending stop so the node keeps playing.
    pub fn cancel_stop(&mut self) {
        if !self.disposed {
            self.stop = None;
        }
    }

    /// Tear down permanently.
    pub fn dispose(&mut self) {
        #[cfg(feature = "tracing")]
        if self.disposed {
            tracing::trace!("node_dispose: already disposed");
        }
        self.disposed = true;
        self.start = None;
        self.stop = None;
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Scheduled start time.
    pub fn start_time(&self) -> Option<f64> {
        self.start
    }

    /// Scheduled stop time.
    pub fn stop_time(&self) -> Option<f64> {
        self.stop
    }

    /// Whether the node produces output at `time`.
    pub fn is_playing(&self, time: f64) -> bool {
        match (self.start, self.stop) {
            (Some(start), Some(stop)) => time >= start && time < stop,
            (Some(start), None) => time >= start,
            _ => false,
        }
    }

    /// Whether the node was started and its stop time has passed.
    pub fn has_ended(&self, time: f64) -> bool {
        self.disposed || self.stop.is_some_and(|stop| time >= stop)
    }
}
