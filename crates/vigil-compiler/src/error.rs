//! Errors raised while building a test specification.

use std::fmt;

/// Statement validation mode, tracked as a stack while building.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    Header,
    Body,
    Conditional,
    Unordered,
    AnswerRequest,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Header => "header",
            Self::Body => "body",
            Self::Conditional => "conditional",
            Self::Unordered => "unordered",
            Self::AnswerRequest => "answer-request",
        })
    }
}

/// Error during spec construction.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum BuildError {
    /// Statement issued in a mode that does not admit it.
    #[error("`{statement}` is not allowed in {mode} mode")]
    InvalidMode {
        statement: &'static str,
        mode: Mode,
    },

    /// More `end`s than openings, or open blocks left at `construct`.
    #[error("unbalanced block structure")]
    UnbalancedBlock,

    /// Conditional with an empty either- or or-branch.
    #[error("conditional branch is empty")]
    EmptyBranch,

    /// Repeat or Kleene block closed with no body statements.
    #[error("block body is empty")]
    EmptyBlock,

    /// The same future was supplied to more than one answer-request.
    #[error("future already bound by another answer-request")]
    FutureReuse,

    /// `trigger` named a future no answer-request binds.
    #[error("future is not bound by any answer-request")]
    FutureNotBound,

    /// `answer_requests` batch closed without any members.
    #[error("answer-request batch is empty")]
    NoAnswerRequests,

    /// `repeat(n)` with n == 0.
    #[error("repeat count must be positive")]
    NonPositiveCount,
}
