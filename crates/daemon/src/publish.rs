// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame publication seam between the executor and the broker.
//!
//! The executor relays task output at chunk rate; routing it through this
//! narrow trait keeps the task subsystem free of broker internals (and lets
//! tests capture frames without a hub).

use aicli_wire::WsMessage;
use smol_str::SmolStr;

pub trait FramePublisher: Send + Sync + 'static {
    /// Deliver a frame to every subscriber of `channel`. Never blocks;
    /// slow consumers are the broker's problem.
    fn publish(&self, channel: &SmolStr, frame: &WsMessage);
}

/// Publisher that drops everything, for daemons running without a broker
/// (and for tests that don't care about frames).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

impl FramePublisher for NullPublisher {
    fn publish(&self, _channel: &SmolStr, _frame: &WsMessage) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every published frame for assertions.
    #[derive(Default, Clone)]
    pub struct RecordingPublisher {
        frames: Arc<Mutex<Vec<(SmolStr, WsMessage)>>>,
    }

    impl RecordingPublisher {
        pub fn frames(&self) -> Vec<(SmolStr, WsMessage)> {
            self.frames.lock().clone()
        }

        pub fn frames_on(&self, channel: &str) -> Vec<WsMessage> {
            self.frames
                .lock()
                .iter()
                .filter(|(c, _)| c == channel)
                .map(|(_, f)| f.clone())
                .collect()
        }
    }

    impl FramePublisher for RecordingPublisher {
        fn publish(&self, channel: &SmolStr, frame: &WsMessage) {
            self.frames.lock().push((channel.clone(), frame.clone()));
        }
    }
}
