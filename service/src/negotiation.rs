//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! The RFC 1143 option negotiation state machine.
//!
//! One [`QState`] tracks an option on one end of the connection; us/usq and
//! them/themq from the RFC are each combined into a six-choice state. Please
//! read RFC 1143 before modifying the transition tables below.

use tracing::warn;

/// Negotiation state of an option on one side of the connection.
///
/// An option is enabled if and only if its state is `Yes`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum QState {
    /// Disabled (initial state)
    #[default]
    No,
    /// Enabled
    Yes,
    /// We asked to disable and await the answer
    WantNoEmpty,
    /// We asked to disable, then changed our mind
    WantNoOpposite,
    /// We asked to enable and await the answer
    WantYesEmpty,
    /// We asked to enable, then changed our mind
    WantYesOpposite,
}

impl QState {
    /// An option is enabled iff its state is `Yes`.
    pub fn enabled(self) -> bool {
        self == QState::Yes
    }
}

/// A caller on our side asked to activate or deactivate an option.
///
/// Follows the state diagrams in RFC 1143 section 7. Returns the subsequent
/// state and, when a request must go to the other party, `Some(enable)` to
/// be mapped onto `DO`/`DONT` (them) or `WILL`/`WONT` (us).
pub(crate) fn q_request(state: QState, enable: bool) -> (QState, Option<bool>) {
    if enable {
        // RFC 1143: "If we decide to ask [them] to enable..."
        match state {
            QState::No => (QState::WantYesEmpty, Some(true)),
            QState::WantNoEmpty => (QState::WantNoOpposite, None),
            QState::WantYesOpposite => (QState::WantYesEmpty, None),
            other => (other, None),
        }
    } else {
        // RFC 1143: "If we decide to ask [them] to disable..."
        match state {
            QState::Yes => (QState::WantNoEmpty, Some(false)),
            QState::WantNoOpposite => (QState::WantNoEmpty, None),
            QState::WantYesEmpty => (QState::WantYesOpposite, None),
            other => (other, None),
        }
    }
}

/// The other party asked us to activate or deactivate an option.
///
/// `accept` is consulted only from the `No` state on activation and decides
/// whether we agree to the option. Returns the subsequent state and an
/// optional answer, with the same `Some(enable)` mapping as [`q_request`].
pub(crate) fn q_respond(state: QState, activate: bool, accept: bool) -> (QState, Option<bool>) {
    if activate {
        // RFC 1143: "Upon receipt of WILL [or DO]..."
        match state {
            QState::No => {
                if accept {
                    (QState::Yes, Some(true))
                } else {
                    (QState::No, Some(false))
                }
            }
            QState::WantNoEmpty => {
                warn!("RFC 1143 error: DONT answered by WILL");
                (QState::No, None)
            }
            QState::WantNoOpposite => {
                // Resolution favors enabling; RFC 1143 says "q=EMPTY", but
                // the "q" state is meaningless here.
                warn!("RFC 1143 error: DONT answered by WILL");
                (QState::Yes, None)
            }
            QState::WantYesEmpty => (QState::Yes, None),
            QState::WantYesOpposite => (QState::WantNoEmpty, Some(false)),
            QState::Yes => (QState::Yes, None),
        }
    } else {
        // RFC 1143: "Upon receipt of WONT [or DONT]..."
        match state {
            QState::Yes => (QState::No, Some(false)),
            QState::WantNoEmpty => (QState::No, None),
            // RFC 1143 says "q=NONE" here but clearly intended "q=EMPTY".
            QState::WantNoOpposite => (QState::WantYesEmpty, Some(true)),
            QState::WantYesEmpty => (QState::No, None),
            QState::WantYesOpposite => (QState::No, None),
            QState::No => (QState::No, None),
        }
    }
}
