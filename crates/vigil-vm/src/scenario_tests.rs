//! End-to-end scenarios: ping/pong over a request/response port.
//! `In` is toward the CUT, `Out` away from it.

use std::sync::Arc;
use std::time::Duration;

use vigil_compiler::{CompiledSpec, SpecBuilder};
use vigil_core::{DefaultAction, Direction, Fault, PortId, SharedEvent};

use crate::controller::Controller;
use crate::test_support::MockEnv;

#[derive(Debug, PartialEq)]
struct Ping(i64);

#[derive(Debug, PartialEq)]
struct Pong(i64);

#[derive(Debug, PartialEq)]
struct SubPing(i64);

#[derive(Debug)]
struct IllegalState;

const REQ: PortId = PortId::new(1);
const RESP: PortId = PortId::new(2);

const WAIT: Duration = Duration::from_secs(5);

fn short_timeout() -> SpecBuilder {
    SpecBuilder::new()
        .set_timeout(Duration::from_millis(40))
        .unwrap()
}

fn start(spec: CompiledSpec, env: &Arc<MockEnv>) -> (Arc<Controller>, crate::RunHandle) {
    let controller = Arc::new(Controller::builder(spec, env.clone(), env.clone()).build());
    env.attach(&controller);
    let handle = controller.run().unwrap();
    (controller, handle)
}

fn pong_for(req: &Ping) -> Option<SharedEvent> {
    Some(Arc::new(Pong(req.0)))
}

#[test]
fn basic_expect() {
    let spec = short_timeout()
        .body()
        .unwrap()
        .trigger(Ping(0), REQ)
        .unwrap()
        .expect(Ping(0), REQ, Direction::Out)
        .unwrap()
        .construct()
        .unwrap();
    let env = MockEnv::new();
    let (controller, handle) = start(spec, &env);

    assert_eq!(env.triggered_names(), vec!["Ping(0)"]);
    controller.deliver(Ping(0), REQ, Direction::Out);

    assert_eq!(handle.wait_timeout(WAIT), Some(true));
    assert_eq!(env.forwarded_names(), vec!["Ping(0)"]);
}

#[test]
fn repeat_count_mismatch() {
    let spec = short_timeout()
        .body()
        .unwrap()
        .repeat(3)
        .unwrap()
        .body()
        .unwrap()
        .expect(Pong(0), REQ, Direction::In)
        .unwrap()
        .end()
        .unwrap()
        .construct()
        .unwrap();
    let env = MockEnv::new();
    let (controller, handle) = start(spec, &env);

    // Two of three expected deliveries, then silence.
    controller.deliver(Pong(0), REQ, Direction::In);
    controller.deliver(Pong(0), REQ, Direction::In);

    assert_eq!(handle.wait_timeout(WAIT), Some(false));
    assert_eq!(env.forwarded().len(), 2);
}

#[test]
fn unordered_batch_forwards_after_completion() {
    let spec = short_timeout()
        .body()
        .unwrap()
        .trigger(Ping(2), REQ)
        .unwrap()
        .trigger(Pong(1), REQ)
        .unwrap()
        .trigger(Ping(3), REQ)
        .unwrap()
        .unordered()
        .unwrap()
        .expect(Pong(1), REQ, Direction::In)
        .unwrap()
        .expect(Ping(2), REQ, Direction::Out)
        .unwrap()
        .expect(Ping(3), REQ, Direction::Out)
        .unwrap()
        .end()
        .unwrap()
        .construct()
        .unwrap();
    let env = MockEnv::new();
    let (controller, handle) = start(spec, &env);

    controller.deliver(Ping(2), REQ, Direction::Out);
    controller.deliver(Pong(1), REQ, Direction::In);
    // Nothing is forwarded until the whole set has matched.
    assert!(env.forwarded().is_empty());

    controller.deliver(Ping(3), REQ, Direction::Out);

    assert_eq!(handle.wait_timeout(WAIT), Some(true));
    // Forwarded in match order once complete.
    assert_eq!(env.forwarded_names(), vec!["Ping(2)", "Pong(1)", "Ping(3)"]);
}

#[test]
fn answer_request_batch_replies_in_declaration_order() {
    let spec = short_timeout()
        .body()
        .unwrap()
        .trigger(Ping(0), REQ)
        .unwrap()
        .trigger(Ping(1), REQ)
        .unwrap()
        .answer_requests()
        .unwrap()
        .answer_request::<Ping>(REQ, RESP, pong_for)
        .unwrap()
        .answer_request::<Ping>(REQ, RESP, pong_for)
        .unwrap()
        .end()
        .unwrap()
        .construct()
        .unwrap();
    let env = MockEnv::new();
    let (controller, handle) = start(spec, &env);

    controller.deliver(Ping(0), REQ, Direction::Out);
    // The batch holds its replies until the last request matches.
    assert_eq!(env.triggered_names(), vec!["Ping(0)", "Ping(1)"]);

    controller.deliver(Ping(1), REQ, Direction::Out);

    assert_eq!(handle.wait_timeout(WAIT), Some(true));
    assert_eq!(
        env.triggered_names(),
        vec!["Ping(0)", "Ping(1)", "Pong(0)", "Pong(1)"]
    );
    // Neither request was forwarded.
    assert!(env.forwarded().is_empty());
}

#[test]
fn default_fail_on_unknown_event() {
    let spec = short_timeout()
        .set_default_action_any(DefaultAction::Fail)
        .unwrap()
        .body()
        .unwrap()
        .trigger(SubPing(0), REQ)
        .unwrap()
        .construct()
        .unwrap();
    let env = MockEnv::reflecting();
    let (_controller, handle) = start(spec, &env);

    assert_eq!(handle.wait_timeout(WAIT), Some(false));
}

#[test]
fn fault_expectation() {
    let spec = short_timeout()
        .allow(Pong(0), REQ, Direction::In)
        .unwrap()
        .allow(Pong(-1), REQ, Direction::In)
        .unwrap()
        .body()
        .unwrap()
        .repeat(3)
        .unwrap()
        .body()
        .unwrap()
        .trigger(Pong(0), REQ)
        .unwrap()
        .end()
        .unwrap()
        .trigger(Pong(-1), REQ)
        .unwrap()
        .trigger(Pong(1), REQ)
        .unwrap()
        .expect_fault::<IllegalState>()
        .unwrap()
        .expect(Pong(1), REQ, Direction::In)
        .unwrap()
        .construct()
        .unwrap();

    let env = MockEnv::reflecting();
    // The CUT throws when it receives a negative id.
    env.fault_on(|symbol| {
        symbol
            .event()
            .as_any()
            .downcast_ref::<Pong>()
            .filter(|pong| pong.0 < 0)
            .map(|_| Fault::new(IllegalState))
    });
    let (_controller, handle) = start(spec, &env);

    assert_eq!(handle.wait_timeout(WAIT), Some(true));
    assert_eq!(
        env.forwarded_names(),
        vec!["Pong(0)", "Pong(0)", "Pong(0)", "Pong(-1)", "Pong(1)"]
    );
}

#[test]
fn future_round_trip() {
    // An answer-request captures the outgoing request; a later trigger
    // re-injects it.
    let future = vigil_core::EventFuture::new();
    let spec = short_timeout()
        .body()
        .unwrap()
        .answer_request_future::<Ping>(REQ, &future)
        .unwrap()
        .trigger_future(&future, RESP)
        .unwrap()
        .construct()
        .unwrap();
    let env = MockEnv::new();
    let (controller, handle) = start(spec, &env);

    controller.deliver(Ping(8), REQ, Direction::Out);

    assert_eq!(handle.wait_timeout(WAIT), Some(true));
    // The captured request came back out of the future.
    let triggered = env.triggered();
    assert_eq!(triggered.len(), 1);
    assert!(triggered[0].0.eq_event(&Ping(8)));
    assert_eq!(triggered[0].1, RESP);
    assert!(env.forwarded().is_empty());
}
