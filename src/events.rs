use crate::types::RoundEvent;
use log::debug;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Fans `RoundEvent`s out to subscribers. Best-effort: a full or lagging
/// receiver never blocks or fails the game loop, matching the "never
/// blocks the advance loop" contract the transport sits behind.
///
/// `subscribe` returns both a snapshot of the events emitted so far and the
/// live receiver, so a caller joining mid-game can replay from the
/// beginning before switching over to the broadcast stream.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: RoundEvent);
    fn subscribe(&self) -> (Vec<RoundEvent>, broadcast::Receiver<RoundEvent>);
}

pub struct BroadcastEmitter {
    sender: broadcast::Sender<RoundEvent>,
    history: Mutex<VecDeque<RoundEvent>>,
    capacity: usize,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }
}

impl EventEmitter for BroadcastEmitter {
    fn emit(&self, event: RoundEvent) {
        {
            let mut history = self.history.lock().expect("event history lock poisoned");
            history.push_back(event.clone());
            if history.len() > self.capacity {
                history.pop_front();
            }
        }

        // send() only errors when there are no receivers; that is the
        // common case between games and is not a failure.
        if self.sender.send(event).is_err() {
            debug!("event emitted with no active subscribers");
        }
    }

    fn subscribe(&self) -> (Vec<RoundEvent>, broadcast::Receiver<RoundEvent>) {
        // Subscribe first so no event emitted after the history snapshot is
        // taken can be missed between the two steps.
        let receiver = self.sender.subscribe();
        let history = self.history.lock().expect("event history lock poisoned");
        (history.iter().cloned().collect(), receiver)
    }
}
