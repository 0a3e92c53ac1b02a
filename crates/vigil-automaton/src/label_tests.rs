use std::sync::Arc;

use vigil_core::{Direction, EventFuture, EventSymbol, Fault, KindRegistry, PortId, SharedEvent};

use crate::label::{
    AnswerBatch, AnswerOutcome, AnswerRequestLabel, EventLabel, FaultLabel, Label, PredicateLabel,
    UnorderedLabel,
};

#[derive(Debug, PartialEq)]
struct Ping(i64);

#[derive(Debug, PartialEq)]
struct Pong(i64);

const REQ: PortId = PortId::new(1);
const RESP: PortId = PortId::new(2);

fn ping_out(id: i64) -> EventSymbol {
    EventSymbol::from_event(Ping(id), REQ, Direction::Out)
}

fn event_label(id: i64, direction: Direction) -> Label {
    Label::Event(EventLabel::new(Arc::new(Ping(id)), REQ, direction))
}

#[test]
fn event_label_matches_on_port_direction_event() {
    let reg = KindRegistry::new();
    let label = event_label(3, Direction::Out);

    assert!(label.matches_observed(&ping_out(3), &reg));
    assert!(!label.matches_observed(&ping_out(4), &reg));
    assert!(!label.matches_observed(
        &EventSymbol::from_event(Ping(3), REQ, Direction::In),
        &reg
    ));
    assert!(!label.matches_observed(
        &EventSymbol::from_event(Ping(3), RESP, Direction::Out),
        &reg
    ));
}

#[test]
fn event_label_uses_registered_comparator() {
    let mut reg = KindRegistry::new();
    reg.set_comparator::<Ping>(|a, b| a.0.abs() == b.0.abs());
    let label = event_label(5, Direction::Out);

    assert!(label.matches_observed(&ping_out(-5), &reg));
}

#[test]
fn predicate_label_downcasts() {
    let reg = KindRegistry::new();
    let label = Label::Predicate(PredicateLabel::of::<Ping>(REQ, Direction::Out, |p| p.0 > 10));

    assert!(label.matches_observed(&ping_out(11), &reg));
    assert!(!label.matches_observed(&ping_out(10), &reg));
    // Other kinds never reach the predicate.
    assert!(!label.matches_observed(
        &EventSymbol::from_event(Pong(11), REQ, Direction::Out),
        &reg
    ));
}

#[test]
fn fault_label_filters_by_payload_kind() {
    #[derive(Debug)]
    struct IllegalState;
    #[derive(Debug)]
    struct Timeout;

    let control = PortId::new(0);
    let label = FaultLabel::of_kind::<IllegalState>();

    let hit = EventSymbol::fault(Fault::new(IllegalState), control);
    let miss = EventSymbol::fault(Fault::new(Timeout), control);
    let not_a_fault = ping_out(0);

    assert!(label.matches(&hit));
    assert!(!label.matches(&miss));
    assert!(!label.matches(&not_a_fault));
}

#[test]
fn fault_label_predicate_sees_the_fault() {
    #[derive(Debug)]
    struct IllegalState(&'static str);

    let label = FaultLabel::matching(|fault| {
        fault
            .downcast_ref::<IllegalState>()
            .is_some_and(|e| e.0 == "negative id")
    });

    let control = PortId::new(0);
    assert!(label.matches(&EventSymbol::fault(
        Fault::new(IllegalState("negative id")),
        control
    )));
    assert!(!label.matches(&EventSymbol::fault(
        Fault::new(IllegalState("other")),
        control
    )));
}

#[test]
fn unordered_queues_until_complete() {
    let reg = KindRegistry::new();
    let label = UnorderedLabel::new(
        vec![event_label(1, Direction::Out), event_label(2, Direction::Out)],
        false,
    );

    let mut first = ping_out(2);
    let outcome = label.try_match(&mut first, &reg).unwrap();
    assert!(!outcome.complete);
    assert!(!outcome.forward_now);
    assert!(outcome.release.is_empty());
    // The symbol is withheld, not forwarded yet.
    assert!(!first.should_forward());

    let mut second = ping_out(1);
    let outcome = label.try_match(&mut second, &reg).unwrap();
    assert!(outcome.complete);
    // Queued symbols come back in match order, completing symbol last.
    assert_eq!(outcome.release.len(), 2);
    assert!(outcome.release[0].event().eq_event(&Ping(2)));
    assert!(outcome.release[1].event().eq_event(&Ping(1)));

    // No third label to match.
    let mut stray = ping_out(3);
    assert!(label.try_match(&mut stray, &reg).is_none());
}

#[test]
fn unordered_forward_immediately_does_not_queue() {
    let reg = KindRegistry::new();
    let label = UnorderedLabel::new(
        vec![event_label(1, Direction::Out), event_label(2, Direction::Out)],
        true,
    );

    let mut sym = ping_out(1);
    let outcome = label.try_match(&mut sym, &reg).unwrap();
    assert!(outcome.forward_now);
    assert!(outcome.release.is_empty());
    assert!(sym.should_forward());
}

#[test]
fn unordered_rearms_after_completion() {
    let reg = KindRegistry::new();
    let label = UnorderedLabel::new(vec![event_label(1, Direction::Out)], false);

    let mut sym = ping_out(1);
    assert!(label.try_match(&mut sym, &reg).unwrap().complete);

    // Next loop iteration matches again from a full pending set.
    let mut again = ping_out(1);
    assert!(label.try_match(&mut again, &reg).unwrap().complete);
}

#[test]
fn unordered_reset_clears_partial_progress() {
    let reg = KindRegistry::new();
    let label = UnorderedLabel::new(
        vec![event_label(1, Direction::Out), event_label(2, Direction::Out)],
        false,
    );

    let mut sym = ping_out(1);
    label.try_match(&mut sym, &reg).unwrap();
    assert!(label.has_partial_match());

    Label::Unordered(label.clone()).reset_runtime_state();
    assert!(!label.has_partial_match());
}

fn pong_for(req: &Ping) -> Option<SharedEvent> {
    Some(Arc::new(Pong(req.0)))
}

#[test]
fn answer_request_mapper_synthesizes_and_suppresses() {
    let reg = KindRegistry::new();
    let label = AnswerRequestLabel::mapper::<Ping>(REQ, RESP, pong_for);

    let mut sym = ping_out(7);
    let outcome = label.try_match(&mut sym, &reg).unwrap();

    assert!(!sym.should_forward());
    match outcome {
        AnswerOutcome::Respond(response, port) => {
            assert!(response.eq_event(&Pong(7)));
            assert_eq!(port, RESP);
        }
        _ => panic!("expected immediate response"),
    }
}

#[test]
fn answer_request_ignores_incoming_and_wrong_port() {
    let reg = KindRegistry::new();
    let label = AnswerRequestLabel::mapper::<Ping>(REQ, RESP, pong_for);

    let mut incoming = EventSymbol::from_event(Ping(1), REQ, Direction::In);
    assert!(label.try_match(&mut incoming, &reg).is_none());

    let mut wrong_port = EventSymbol::from_event(Ping(1), RESP, Direction::Out);
    assert!(label.try_match(&mut wrong_port, &reg).is_none());
}

#[test]
fn answer_request_batch_fires_in_declaration_order() {
    let reg = KindRegistry::new();
    let batch = AnswerBatch::with_len(2);
    let first =
        AnswerRequestLabel::mapper::<Ping>(REQ, RESP, pong_for).with_batch(batch.clone(), 0);
    let second =
        AnswerRequestLabel::mapper::<Ping>(REQ, RESP, pong_for).with_batch(batch.clone(), 1);

    let mut a = ping_out(0);
    match first.try_match(&mut a, &reg).unwrap() {
        AnswerOutcome::Deferred => {}
        _ => panic!("first member must defer"),
    }

    let mut b = ping_out(1);
    match second.try_match(&mut b, &reg).unwrap() {
        AnswerOutcome::RespondAll(responses) => {
            assert_eq!(responses.len(), 2);
            assert!(responses[0].0.eq_event(&Pong(0)));
            assert!(responses[1].0.eq_event(&Pong(1)));
        }
        _ => panic!("last member must release the batch"),
    }
}

#[test]
fn answer_request_future_binds_once() {
    let reg = KindRegistry::new();
    let future = EventFuture::new();
    let label = AnswerRequestLabel::future::<Ping>(REQ, future.clone());

    let mut sym = ping_out(3);
    match label.try_match(&mut sym, &reg).unwrap() {
        AnswerOutcome::Bound => {}
        _ => panic!("expected bind"),
    }
    assert!(!sym.should_forward());
    assert!(future.get().unwrap().eq_event(&Ping(3)));

    let mut again = ping_out(4);
    match label.try_match(&mut again, &reg).unwrap() {
        AnswerOutcome::AlreadyBound => {}
        _ => panic!("second bind must fail"),
    }
}
