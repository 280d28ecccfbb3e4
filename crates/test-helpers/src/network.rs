use parking_lot::Mutex;
use spos_core::{BroadcastError, BroadcastMessenger};

type BroadcastFn = Box<dyn Fn(&str, &[u8]) -> Result<(), BroadcastError> + Send + Sync>;

/// Messenger recording every `(topic, payload)` it is asked to publish.
#[derive(Default)]
pub struct BroadcastMessengerMock {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    broadcast: Mutex<Option<BroadcastFn>>,
}

impl BroadcastMessengerMock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the outcome of every broadcast. Failed broadcasts are not recorded.
    pub fn set_broadcast<F>(&self, f: F)
    where
        F: Fn(&str, &[u8]) -> Result<(), BroadcastError> + Send + Sync + 'static,
    {
        *self.broadcast.lock() = Some(Box::new(f));
    }

    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().clone()
    }

    /// Payloads published on `topic`.
    pub fn sent_on(&self, topic: &str) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

impl BroadcastMessenger for BroadcastMessengerMock {
    fn broadcast(&self, topic: &str, payload: Vec<u8>) -> Result<(), BroadcastError> {
        if let Some(f) = self.broadcast.lock().as_ref() {
            f(topic, &payload)?;
        }
        self.sent.lock().push((topic.to_string(), payload));
        Ok(())
    }
}
