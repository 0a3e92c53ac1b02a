//! Recording mock environment shared by the vm tests.

use std::any::Any;
use std::sync::{Arc, Mutex};

use vigil_core::{Direction, EventSymbol, Fault, PortId, SharedEvent};

use crate::controller::Controller;
use crate::io::{Effector, EventSource};

type FaultScript = Box<dyn Fn(&EventSymbol) -> Option<Fault> + Send + Sync>;

/// Implements both sides of the environment: records forwards and
/// triggers, optionally reflects triggered events back at the controller
/// (as the proxy would intercept them) and raises scripted faults when
/// specific events are forwarded into the CUT.
pub(crate) struct MockEnv {
    controller: Mutex<Option<Arc<Controller>>>,
    forwarded: Mutex<Vec<EventSymbol>>,
    triggered: Mutex<Vec<(SharedEvent, PortId)>>,
    rebound: Mutex<Vec<EventSymbol>>,
    reflect_triggers: bool,
    control_port: PortId,
    fault_script: Mutex<Option<FaultScript>>,
    snapshot: Mutex<Arc<dyn Any + Send + Sync>>,
}

impl MockEnv {
    pub(crate) fn new() -> Arc<Self> {
        Self::build(false)
    }

    /// Triggered events re-enter the controller as incoming symbols, the
    /// way the proxy intercepts injected events.
    pub(crate) fn reflecting() -> Arc<Self> {
        Self::build(true)
    }

    fn build(reflect_triggers: bool) -> Arc<Self> {
        Arc::new(Self {
            controller: Mutex::new(None),
            forwarded: Mutex::new(Vec::new()),
            triggered: Mutex::new(Vec::new()),
            rebound: Mutex::new(Vec::new()),
            reflect_triggers,
            control_port: PortId::new(0),
            fault_script: Mutex::new(None),
            snapshot: Mutex::new(Arc::new(())),
        })
    }

    pub(crate) fn attach(&self, controller: &Arc<Controller>) {
        *self.controller.lock().unwrap() = Some(Arc::clone(controller));
    }

    pub(crate) fn fault_on(
        &self,
        script: impl Fn(&EventSymbol) -> Option<Fault> + Send + Sync + 'static,
    ) {
        *self.fault_script.lock().unwrap() = Some(Box::new(script));
    }

    pub(crate) fn set_snapshot<S: Any + Send + Sync>(&self, snapshot: S) {
        *self.snapshot.lock().unwrap() = Arc::new(snapshot);
    }

    pub(crate) fn forwarded(&self) -> Vec<EventSymbol> {
        self.forwarded.lock().unwrap().clone()
    }

    /// Descriptions of forwarded events, for compact assertions.
    pub(crate) fn forwarded_names(&self) -> Vec<String> {
        self.forwarded()
            .iter()
            .map(|s| s.event().describe())
            .collect()
    }

    pub(crate) fn triggered(&self) -> Vec<(SharedEvent, PortId)> {
        self.triggered.lock().unwrap().clone()
    }

    pub(crate) fn triggered_names(&self) -> Vec<String> {
        self.triggered()
            .iter()
            .map(|(e, _)| e.describe())
            .collect()
    }

    pub(crate) fn rebound(&self) -> Vec<EventSymbol> {
        self.rebound.lock().unwrap().clone()
    }

    fn controller(&self) -> Option<Arc<Controller>> {
        self.controller.lock().unwrap().clone()
    }
}

impl EventSource for MockEnv {
    fn forward(&self, symbol: &EventSymbol) {
        self.forwarded.lock().unwrap().push(symbol.clone());
        let fault = {
            let script = self.fault_script.lock().unwrap();
            script.as_ref().and_then(|script| script(symbol))
        };
        if let Some(fault) = fault
            && let Some(controller) = self.controller()
        {
            controller.on_event(EventSymbol::fault(fault, self.control_port));
        }
    }
}

impl Effector for MockEnv {
    fn trigger(&self, event: SharedEvent, port: PortId) {
        self.triggered
            .lock()
            .unwrap()
            .push((Arc::clone(&event), port));
        if self.reflect_triggers
            && let Some(controller) = self.controller()
        {
            controller.on_event(EventSymbol::new(event, port, Direction::In));
        }
    }

    fn snapshot(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.snapshot.lock().unwrap())
    }

    fn rebind_origin(&self, symbol: &EventSymbol) {
        self.rebound.lock().unwrap().push(symbol.clone());
    }
}
