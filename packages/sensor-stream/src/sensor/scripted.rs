// Scripted sensor source
//
// Replays a fixed list of callback results synchronously from `start()`.
// Every reading is enqueued before `start()` returns, which makes pipeline
// runs fully deterministic.

use super::{SensorRequest, SensorSink, SensorSource};
use crate::error::{StreamError, StreamResult};
use crate::types::{Sample, SensorKind};

pub struct ScriptedSource {
    kind: SensorKind,
    available: bool,
    script: Vec<Result<Sample, String>>,
    last_request: Option<SensorRequest>,
    starts: usize,
}

impl ScriptedSource {
    pub fn new(kind: SensorKind, script: Vec<Result<Sample, String>>) -> Self {
        Self {
            kind,
            available: true,
            script,
            last_request: None,
            starts: 0,
        }
    }

    pub fn unavailable(kind: SensorKind) -> Self {
        Self {
            available: false,
            ..Self::new(kind, Vec::new())
        }
    }

    /// Request passed to the most recent `start()`
    pub fn last_request(&self) -> Option<SensorRequest> {
        self.last_request
    }

    pub fn starts(&self) -> usize {
        self.starts
    }
}

impl SensorSource for ScriptedSource {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn start(&mut self, request: SensorRequest, sink: SensorSink) -> StreamResult<()> {
        if !self.available {
            return Err(StreamError::SensorUnavailable(self.kind));
        }

        self.last_request = Some(request);
        self.starts += 1;

        let mut delivered = 0;
        for result in &self.script {
            if sink.deliver(result.clone()) {
                delivered += 1;
            }
        }
        log::debug!(
            "Scripted {} source delivered {}/{} callbacks",
            self.kind,
            delivered,
            self.script.len()
        );
        Ok(())
    }

    fn stop(&mut self) {}
}
