//! ---
//! mbus_section: "01-core-functionality"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Message bus core: registry, queues, and fan-out."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;

use r_mbus_msg::Message;
use tracing::warn;

use crate::module::SharedModule;
use crate::{BusError, Result};

/// One live module attachment: the module, its private delivery queue, the
/// lock/condvar pair guarding it, and the worker thread draining it.
pub(crate) struct Registration {
    module: SharedModule,
    channel: Mutex<Channel>,
    ready: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Queue state and the quit flag share one lock so a racing removal cannot
/// strand the worker in a wait nobody will signal again.
struct Channel {
    queue: VecDeque<Message>,
    quit: bool,
}

impl Registration {
    pub(crate) fn new(module: SharedModule) -> Self {
        Self {
            module,
            channel: Mutex::new(Channel {
                queue: VecDeque::new(),
                quit: false,
            }),
            ready: Condvar::new(),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn module(&self) -> &SharedModule {
        &self.module
    }

    pub(crate) fn attach_worker(&self, handle: JoinHandle<()>) {
        let mut slot = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(handle);
    }

    /// Publisher side: append a clone and wake the worker. The condvar is
    /// signaled after the lock is released so the worker never wakes into a
    /// still-held lock.
    pub(crate) fn enqueue(&self, message: Message) -> Result<()> {
        let mut channel = self
            .channel
            .lock()
            .map_err(|_| BusError::Poisoned("module channel lock"))?;
        channel.queue.push_back(message);
        drop(channel);
        self.ready.notify_one();
        Ok(())
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .len()
    }

    /// Consumer side, run on the dedicated worker thread.
    ///
    /// Waits for work, then drains the queue one message at a time with the
    /// lock released around the module callback, so a slow or reentrant
    /// `receive` blocks neither publishers nor removal. A failed lock or
    /// wait ends the thread; the quit flag ends it cooperatively.
    pub(crate) fn worker_loop(&self) {
        let mut channel = match self.channel.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        while !channel.quit {
            if channel.queue.is_empty() {
                channel = match self.ready.wait(channel) {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
            }
            while !channel.quit {
                let Some(message) = channel.queue.pop_front() else {
                    break;
                };
                drop(channel);
                self.module.receive(&message);
                drop(message);
                channel = match self.channel.lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
            }
        }
    }

    /// Tell the worker to quit and join it.
    ///
    /// Returns false on the degraded path: when the channel lock is
    /// poisoned the quit/signal/join sequence is skipped entirely and the
    /// worker is abandoned rather than risking a deadlock or double join.
    pub(crate) fn stop_worker(&self) -> bool {
        match self.channel.lock() {
            Ok(mut channel) => {
                channel.quit = true;
                drop(channel);
                self.ready.notify_one();
                let handle = self
                    .worker
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(handle) = handle {
                    if handle.join().is_err() {
                        warn!("worker thread panicked before join");
                    }
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Discard every queued message, recovering the queue even when the
    /// channel lock is poisoned. Returns how many messages were dropped.
    pub(crate) fn drain(&self) -> usize {
        let mut channel = self
            .channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let dropped = channel.queue.len();
        channel.queue.clear();
        dropped
    }

    /// Test support: flip the quit flag and wake the worker without joining.
    pub(crate) fn force_quit(&self) -> bool {
        match self.channel.lock() {
            Ok(mut channel) => {
                channel.quit = true;
                drop(channel);
                self.ready.notify_one();
                true
            }
            Err(_) => false,
        }
    }

    /// Test support: poison the channel lock by panicking while holding it.
    pub(crate) fn poison_channel(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.channel.lock();
            panic!("poisoning channel lock for tests");
        }));
    }
}
