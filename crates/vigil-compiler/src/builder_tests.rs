use std::sync::Arc;

use vigil_core::{DefaultAction, Direction, EventFuture, PortId, SharedEvent};

use crate::builder::SpecBuilder;
use crate::error::{BuildError, Mode};

#[derive(Debug, PartialEq)]
struct Ping(i64);

#[derive(Debug, PartialEq)]
struct Pong(i64);

const REQ: PortId = PortId::new(1);
const RESP: PortId = PortId::new(2);

fn pong_for(req: &Ping) -> Option<SharedEvent> {
    Some(Arc::new(Pong(req.0)))
}

#[test]
fn expect_requires_body_mode() {
    let err = SpecBuilder::new()
        .expect(Ping(0), REQ, Direction::Out)
        .unwrap_err();
    assert_eq!(
        err,
        BuildError::InvalidMode {
            statement: "expect",
            mode: Mode::Header,
        }
    );
}

#[test]
fn header_rules_rejected_after_body() {
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .allow(Ping(0), REQ, Direction::In)
        .unwrap_err();
    assert_eq!(
        err,
        BuildError::InvalidMode {
            statement: "allow",
            mode: Mode::Body,
        }
    );
}

#[test]
fn initial_header_options_rejected_in_loop_header() {
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .repeat(2)
        .unwrap()
        .set_default_action::<Ping>(DefaultAction::Drop)
        .unwrap_err();
    assert!(matches!(err, BuildError::InvalidMode { .. }));
}

#[test]
fn loop_headers_accept_rules() {
    SpecBuilder::new()
        .body()
        .unwrap()
        .repeat(2)
        .unwrap()
        .allow(Ping(0), REQ, Direction::In)
        .unwrap()
        .block_expect(Pong(0), REQ, Direction::In)
        .unwrap()
        .body()
        .unwrap()
        .expect(Ping(1), REQ, Direction::Out)
        .unwrap()
        .end()
        .unwrap()
        .construct()
        .unwrap();
}

#[test]
fn repeat_zero_is_rejected() {
    let err = SpecBuilder::new().body().unwrap().repeat(0).unwrap_err();
    assert_eq!(err, BuildError::NonPositiveCount);
}

#[test]
fn end_at_root_is_unbalanced() {
    let err = SpecBuilder::new().body().unwrap().end().unwrap_err();
    assert_eq!(err, BuildError::UnbalancedBlock);
}

#[test]
fn construct_with_open_block_is_unbalanced() {
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .repeat(2)
        .unwrap()
        .body()
        .unwrap()
        .construct()
        .unwrap_err();
    assert_eq!(err, BuildError::UnbalancedBlock);
}

#[test]
fn end_inside_loop_header_requires_body() {
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .repeat(2)
        .unwrap()
        .end()
        .unwrap_err();
    assert_eq!(
        err,
        BuildError::InvalidMode {
            statement: "end",
            mode: Mode::Header,
        }
    );
}

#[test]
fn empty_repeat_body_is_rejected() {
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .repeat(2)
        .unwrap()
        .body()
        .unwrap()
        .end()
        .unwrap_err();
    assert_eq!(err, BuildError::EmptyBlock);
}

#[test]
fn construct_before_body_is_rejected() {
    let err = SpecBuilder::new().construct().unwrap_err();
    assert!(matches!(err, BuildError::InvalidMode { .. }));
}

#[test]
fn empty_or_branch_is_rejected() {
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .either()
        .unwrap()
        .or()
        .unwrap_err();
    assert_eq!(err, BuildError::EmptyBranch);
}

#[test]
fn empty_final_branch_is_rejected() {
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .either()
        .unwrap()
        .expect(Ping(0), REQ, Direction::Out)
        .unwrap()
        .or()
        .unwrap()
        .end()
        .unwrap_err();
    assert_eq!(err, BuildError::EmptyBranch);
}

#[test]
fn empty_answer_request_batch_is_rejected() {
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .answer_requests()
        .unwrap()
        .end()
        .unwrap_err();
    assert_eq!(err, BuildError::NoAnswerRequests);
}

#[test]
fn future_reuse_is_rejected() {
    let future = EventFuture::new();
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .answer_request_future::<Ping>(REQ, &future)
        .unwrap()
        .answer_request_future::<Ping>(REQ, &future)
        .unwrap_err();
    assert_eq!(err, BuildError::FutureReuse);
}

#[test]
fn trigger_of_unbound_future_is_rejected() {
    let future = EventFuture::new();
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .trigger_future(&future, RESP)
        .unwrap_err();
    assert_eq!(err, BuildError::FutureNotBound);
}

#[test]
fn trigger_after_binding_answer_request_is_accepted() {
    let future = EventFuture::new();
    SpecBuilder::new()
        .body()
        .unwrap()
        .answer_request_future::<Ping>(REQ, &future)
        .unwrap()
        .trigger_future(&future, RESP)
        .unwrap()
        .construct()
        .unwrap();
}

#[test]
fn trigger_rejected_in_unordered_mode() {
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .unordered()
        .unwrap()
        .trigger(Ping(0), REQ)
        .unwrap_err();
    assert_eq!(
        err,
        BuildError::InvalidMode {
            statement: "trigger",
            mode: Mode::Unordered,
        }
    );
}

#[test]
fn expect_rejected_in_answer_request_mode() {
    let err = SpecBuilder::new()
        .body()
        .unwrap()
        .answer_requests()
        .unwrap()
        .expect(Ping(0), REQ, Direction::Out)
        .unwrap_err();
    assert_eq!(
        err,
        BuildError::InvalidMode {
            statement: "expect",
            mode: Mode::AnswerRequest,
        }
    );
}

#[test]
fn full_statement_mix_builds() {
    SpecBuilder::new()
        .set_default_action::<Ping>(DefaultAction::Drop)
        .unwrap()
        .allow(Pong(0), REQ, Direction::In)
        .unwrap()
        .body()
        .unwrap()
        .trigger(Ping(0), REQ)
        .unwrap()
        .either()
        .unwrap()
        .expect(Ping(0), REQ, Direction::Out)
        .unwrap()
        .or()
        .unwrap()
        .expect(Pong(0), REQ, Direction::Out)
        .unwrap()
        .end()
        .unwrap()
        .unordered()
        .unwrap()
        .expect(Ping(1), REQ, Direction::Out)
        .unwrap()
        .answer_request::<Ping>(REQ, RESP, pong_for)
        .unwrap()
        .end()
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
}
