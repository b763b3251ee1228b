//! ---
//! mbus_section: "15-testing-qa-runbook"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Shared fake modules and factories for test suites."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
//! Fake modules used across the workspace's test suites: a recorder that
//! captures every delivery for later assertions, a blocker that parks
//! inside `receive` so removal-while-delivering can be exercised, and
//! factories so host tests can drive both from configuration files.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use r_mbus_core::{BusModule, MessageBus, SharedModule};
use r_mbus_host::{HostError, ModuleFactory};
use r_mbus_msg::Message;
use serde_json::Value as JsonValue;

/// Captures every received message for later inspection.
pub struct RecordingModule {
    received: Mutex<Vec<Message>>,
    arrived: Condvar,
}

impl RecordingModule {
    /// Module kind string recognised by [`RecordingFactory`].
    pub const KIND: &'static str = "recording";

    /// Create a recorder behind a shared handle.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
            arrived: Condvar::new(),
        })
    }

    /// Snapshot of every message received so far, in delivery order.
    pub fn received(&self) -> Vec<Message> {
        self.received.lock().expect("recording lock").clone()
    }

    /// Number of messages received so far.
    pub fn len(&self) -> usize {
        self.received.lock().expect("recording lock").len()
    }

    /// True when nothing has been delivered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until at least `count` messages arrived or the timeout passed.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut received = self.received.lock().expect("recording lock");
        while received.len() < count {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, wait) = self
                .arrived
                .wait_timeout(received, remaining)
                .expect("recording wait");
            received = guard;
            if wait.timed_out() && received.len() < count {
                return false;
            }
        }
        true
    }
}

impl BusModule for RecordingModule {
    fn receive(&self, message: &Message) {
        let mut received = self.received.lock().expect("recording lock");
        received.push(message.clone());
        drop(received);
        self.arrived.notify_all();
    }
}

/// Parks inside `receive` until released, to hold a delivery in flight.
pub struct BlockingModule {
    state: Mutex<BlockState>,
    entered: Condvar,
    released: Condvar,
}

struct BlockState {
    blocked: bool,
    in_receive: bool,
    delivered: usize,
}

impl BlockingModule {
    /// Module kind string recognised by [`BlockingFactory`].
    pub const KIND: &'static str = "blocking";

    /// Create a blocker behind a shared handle; it starts blocked.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BlockState {
                blocked: true,
                in_receive: false,
                delivered: 0,
            }),
            entered: Condvar::new(),
            released: Condvar::new(),
        })
    }

    /// Let the current and all future deliveries through.
    pub fn release(&self) {
        let mut state = self.state.lock().expect("blocking lock");
        state.blocked = false;
        drop(state);
        self.released.notify_all();
    }

    /// Block until the worker thread is parked inside `receive`.
    pub fn wait_until_blocked(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().expect("blocking lock");
        while !state.in_receive {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, wait) = self
                .entered
                .wait_timeout(state, remaining)
                .expect("blocking wait");
            state = guard;
            if wait.timed_out() && !state.in_receive {
                return false;
            }
        }
        true
    }

    /// Deliveries that have fully passed through `receive`.
    pub fn delivered(&self) -> usize {
        self.state.lock().expect("blocking lock").delivered
    }
}

impl BusModule for BlockingModule {
    fn receive(&self, _message: &Message) {
        let mut state = self.state.lock().expect("blocking lock");
        state.in_receive = true;
        self.entered.notify_all();
        while state.blocked {
            state = self.released.wait(state).expect("blocking wait");
        }
        state.in_receive = false;
        state.delivered += 1;
    }
}

/// Factory producing [`RecordingModule`]s; keeps a handle to every
/// instance it created so tests can assert on them after startup.
#[derive(Default)]
pub struct RecordingFactory {
    created: Mutex<Vec<Arc<RecordingModule>>>,
}

impl RecordingFactory {
    /// Create a factory behind a shared handle.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every instance created so far, in creation order.
    pub fn created(&self) -> Vec<Arc<RecordingModule>> {
        self.created.lock().expect("factory lock").clone()
    }
}

impl ModuleFactory for RecordingFactory {
    fn create(
        &self,
        _bus: &MessageBus,
        _name: &str,
        _params: &JsonValue,
    ) -> Result<SharedModule, HostError> {
        let module = RecordingModule::new();
        self.created
            .lock()
            .expect("factory lock")
            .push(Arc::clone(&module));
        Ok(module)
    }
}

/// Factory producing [`BlockingModule`]s.
#[derive(Default)]
pub struct BlockingFactory {
    created: Mutex<Vec<Arc<BlockingModule>>>,
}

impl BlockingFactory {
    /// Create a factory behind a shared handle.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every instance created so far, in creation order.
    pub fn created(&self) -> Vec<Arc<BlockingModule>> {
        self.created.lock().expect("factory lock").clone()
    }
}

impl ModuleFactory for BlockingFactory {
    fn create(
        &self,
        _bus: &MessageBus,
        _name: &str,
        _params: &JsonValue,
    ) -> Result<SharedModule, HostError> {
        let module = BlockingModule::new();
        self.created
            .lock()
            .expect("factory lock")
            .push(Arc::clone(&module));
        Ok(module)
    }
}

/// Factory that always refuses, for unwind tests.
pub struct FailingFactory;

impl FailingFactory {
    /// Module kind string conventionally used for this factory.
    pub const KIND: &'static str = "failing";
}

impl ModuleFactory for FailingFactory {
    fn create(
        &self,
        _bus: &MessageBus,
        name: &str,
        _params: &JsonValue,
    ) -> Result<SharedModule, HostError> {
        Err(HostError::module_create(name, "factory always fails"))
    }
}
