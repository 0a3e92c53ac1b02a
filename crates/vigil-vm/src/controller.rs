//! Coordinates the event stream with the simulator.
//!
//! Two locks: a thread-safe FIFO queue (faults jump to the head) that any
//! thread may push to, and the machine lock guarding the simulator.
//! Event-handler threads enqueue and then try-acquire the machine lock;
//! if another thread is already draining they return immediately, so
//! delivery never deadlocks with the watchdog or with itself. The
//! watchdog thread blocks on the machine lock, verifies its epoch, and
//! drives the machine to completion when the environment goes silent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use vigil_compiler::CompiledSpec;
use vigil_core::{Direction, Event, EventSymbol, PortId};

use crate::error::RunError;
use crate::io::{Effector, EventSource};
use crate::result::{ResultCell, RunHandle};
use crate::simulator::Simulator;
use crate::trace::Tracer;

enum WatchdogSignal {
    Rearm(u64),
    Stop,
}

struct Shared {
    queue: Mutex<VecDeque<EventSymbol>>,
    machine: Mutex<Simulator>,
    source: Arc<dyn EventSource>,
    effector: Arc<dyn Effector>,
    result: Arc<ResultCell>,
    epoch: AtomicU64,
    timeout: Duration,
    control_port: PortId,
    rearm_tx: Sender<WatchdogSignal>,
    started: AtomicBool,
}

impl Shared {
    fn enqueue(&self, symbol: EventSymbol) {
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        if symbol.is_fault() {
            // Fail fast on unexpected faults.
            queue.push_front(symbol);
        } else {
            queue.push_back(symbol);
        }
    }

    fn pop(&self) -> Option<EventSymbol> {
        self.queue.lock().expect("queue lock poisoned").pop_front()
    }

    /// Process every queued symbol. Returns true if any was processed.
    fn drain(&self, machine: &mut Simulator) -> bool {
        let mut progressed = false;
        while let Some(mut symbol) = self.pop() {
            if self.result.poll().is_some() {
                return progressed;
            }
            progressed = true;
            tracing::trace!(%symbol, "processing");
            let result = machine.do_transition(&mut symbol);
            if result.forward && symbol.should_forward() {
                self.source.forward(&symbol);
            }
            for released in result.release {
                if released.should_forward() {
                    self.source.forward(&released);
                }
            }
            if result.errored {
                self.finish(false);
                return progressed;
            }
        }
        progressed
    }

    /// Drain queued symbols and run required internal transitions until
    /// neither advances the machine.
    fn make_progress(&self, machine: &mut Simulator) -> bool {
        let mut progressed = false;
        loop {
            let drained = self.drain(machine);
            if self.result.poll().is_some() {
                return true;
            }
            let internal = match machine.try_internal_transitions() {
                Some(result) if result.errored => {
                    self.finish(false);
                    return true;
                }
                Some(_) => true,
                None => false,
            };
            if !drained && !internal {
                break;
            }
            progressed = true;
        }
        progressed
    }

    /// Cancel the previous watchdog task and arm a new one. Called while
    /// holding the machine lock so a late-firing timer observes an
    /// up-to-date epoch and no-ops.
    fn rearm(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.rearm_tx.send(WatchdogSignal::Rearm(epoch));
    }

    fn finish(&self, verdict: bool) {
        if self.result.complete(verdict) {
            tracing::debug!(verdict, "test completed");
        }
        let _ = self.rearm_tx.send(WatchdogSignal::Stop);
    }
}

/// Owns the event queue, the machine lock, the watchdog and the verdict.
pub struct Controller {
    shared: Arc<Shared>,
    watchdog_rx: Mutex<Option<Receiver<WatchdogSignal>>>,
}

/// Builder for [`Controller`].
pub struct ControllerBuilder {
    spec: CompiledSpec,
    source: Arc<dyn EventSource>,
    effector: Arc<dyn Effector>,
    control_port: PortId,
    tracer: Option<Box<dyn Tracer>>,
}

impl ControllerBuilder {
    /// The port carrying the CUT's lifecycle and fault events.
    pub fn control_port(mut self, port: PortId) -> Self {
        self.control_port = port;
        self
    }

    /// Attach a transition tracer.
    pub fn tracer(mut self, tracer: Box<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn build(self) -> Controller {
        let (automaton, registry, timeout) = self.spec.into_parts();
        let machine = match self.tracer {
            Some(tracer) => {
                Simulator::with_tracer(automaton, registry, Arc::clone(&self.effector), tracer)
            }
            None => Simulator::new(automaton, registry, Arc::clone(&self.effector)),
        };
        let (rearm_tx, rearm_rx) = crossbeam_channel::unbounded();
        Controller {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                machine: Mutex::new(machine),
                source: self.source,
                effector: self.effector,
                result: Arc::new(ResultCell::new()),
                epoch: AtomicU64::new(0),
                timeout,
                control_port: self.control_port,
                rearm_tx,
                started: AtomicBool::new(false),
            }),
            watchdog_rx: Mutex::new(Some(rearm_rx)),
        }
    }
}

impl Controller {
    pub fn builder(
        spec: CompiledSpec,
        source: Arc<dyn EventSource>,
        effector: Arc<dyn Effector>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            spec,
            source,
            effector,
            control_port: PortId::new(0),
            tracer: None,
        }
    }

    /// Start the run: spawn the watchdog and make initial progress so
    /// leading triggers fire without waiting out the first timeout.
    ///
    /// Fails with [`RunError::AlreadyRan`] on a second call.
    pub fn run(&self) -> Result<RunHandle, RunError> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(RunError::AlreadyRan);
        }
        let rx = self
            .watchdog_rx
            .lock()
            .expect("watchdog lock poisoned")
            .take()
            .expect("receiver present until first run");
        let shared = Arc::clone(&self.shared);
        std::thread::Builder::new()
            .name("vigil-watchdog".into())
            .spawn(move || watchdog(shared, rx))?;

        {
            let mut machine = self.shared.machine.lock().expect("machine lock poisoned");
            self.shared.make_progress(&mut machine);
            if self.shared.result.poll().is_none() {
                self.shared.rearm();
            }
        }
        Ok(RunHandle {
            cell: Arc::clone(&self.shared.result),
        })
    }

    /// An event crossed the CUT boundary.
    ///
    /// Returns true when the framework should continue its default
    /// delivery, false when the symbol was taken over by the simulator.
    pub fn on_event(&self, symbol: EventSymbol) -> bool {
        // Control-port traffic is not intercepted unless it is a fault.
        if symbol.port() == self.shared.control_port && !symbol.is_fault() {
            return true;
        }
        if self.shared.result.poll().is_some() {
            return false;
        }
        if symbol.is_request() && symbol.direction() == Direction::In {
            self.shared.effector.rebind_origin(&symbol);
        }

        self.shared.enqueue(symbol);
        // Non-blocking: if another thread holds the machine lock it will
        // pick up the queued symbol in its own drain.
        if let Ok(mut machine) = self.shared.machine.try_lock() {
            self.shared.drain(&mut machine);
            if self.shared.result.poll().is_none() {
                self.shared.rearm();
            }
        }
        false
    }

    /// Convenience wrapper building the symbol in place.
    pub fn deliver<E: Event>(&self, event: E, port: PortId, direction: Direction) -> bool {
        self.on_event(EventSymbol::from_event(event, port, direction))
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        let _ = self.shared.rearm_tx.send(WatchdogSignal::Stop);
    }
}

/// Watchdog loop: wait out the inactivity timeout, verify the epoch under
/// the machine lock, then make progress (drain, required internals, one
/// forced round). Completes the verdict when nothing advances.
fn watchdog(shared: Arc<Shared>, rx: Receiver<WatchdogSignal>) {
    let mut armed = shared.epoch.load(Ordering::SeqCst);
    loop {
        match rx.recv_timeout(shared.timeout) {
            Ok(WatchdogSignal::Rearm(epoch)) => {
                armed = epoch;
                continue;
            }
            Ok(WatchdogSignal::Stop) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let mut machine = shared.machine.lock().expect("machine lock poisoned");
        // Another thread re-armed the timer while this timeout was in
        // flight; the pending Rearm message updates `armed` next turn.
        if shared.epoch.load(Ordering::SeqCst) != armed {
            continue;
        }
        if shared.result.poll().is_some() {
            return;
        }
        tracing::debug!("watchdog fired");

        let mut progressed = shared.make_progress(&mut machine);
        if shared.result.poll().is_some() {
            return;
        }
        if !progressed
            && let Some(result) = machine.force_internal_transitions()
        {
            if result.errored {
                shared.finish(false);
                return;
            }
            progressed = true;
        }

        if progressed {
            shared.rearm();
            armed = shared.epoch.load(Ordering::SeqCst);
            continue;
        }

        shared.finish(machine.reached_final() && !machine.in_error());
        return;
    }
}
