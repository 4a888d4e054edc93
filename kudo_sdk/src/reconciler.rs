//! Optimistic reconciliation for a single subject's like button.
//!
//! A [`Reconciler`] is a purely local, non-persistent state machine — one
//! instance per subject the UI currently renders. A user action flips the
//! predicted state immediately so the UI never waits on network latency;
//! while a toggle request is in flight, further presses are coalesced into
//! at most one follow-up request instead of firing concurrently. Server
//! responses always replace the optimistic guess: a racing third party may
//! have toggled the same subject, so the prediction is never trusted past
//! the next authoritative read.
//!
//! The machine does no I/O itself. `KudoClient::toggle_reconciled` drives it
//! against the HTTP API; anything else (a UI event loop, a test) can drive
//! it the same way through [`press`](Reconciler::press),
//! [`on_response`](Reconciler::on_response), and friends.

/// What the caller should do after a press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// No request is in flight: issue a toggle request now.
    Send,
    /// A request is already in flight: the press was folded into the
    /// pending desired state, no new request may be issued.
    Coalesced,
}

/// What the caller should do after feeding a server response in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    /// The machine agrees with the server; nothing left to send.
    Settled,
    /// Presses coalesced during the flight still want the opposite state:
    /// issue exactly one follow-up toggle request.
    Send,
}

/// Optimistic per-subject engagement state.
#[derive(Debug, Clone)]
pub struct Reconciler {
    liked: bool,
    count: u64,
    /// Whether the current values were confirmed by the server.
    authoritative: bool,
    /// A toggle request is in flight; presses queue instead of firing.
    in_flight: bool,
    /// Desired end state accumulated from presses during the flight.
    pending: Option<bool>,
    /// Pre-action values to revert to on failure.
    baseline: (bool, u64),
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    /// Start with nothing known: not liked, zero count, unconfirmed.
    pub fn new() -> Self {
        Self {
            liked: false,
            count: 0,
            authoritative: false,
            in_flight: false,
            pending: None,
            baseline: (false, 0),
        }
    }

    /// Start from a fresh status read (e.g. at page load).
    pub fn from_status(liked: bool, count: u64) -> Self {
        Self {
            liked,
            count,
            authoritative: true,
            in_flight: false,
            pending: None,
            baseline: (liked, count),
        }
    }

    /// Predicted liked state to render.
    pub fn liked(&self) -> bool {
        self.liked
    }

    /// Predicted count to render.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Whether the rendered values were confirmed by the server. `false`
    /// after a press, a failure, or a timeout — a fresh status read should
    /// be applied via [`on_status`](Self::on_status) at the next render.
    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// The user pressed the like button.
    ///
    /// Flips the predicted state immediately. Returns [`Action::Send`] when
    /// the caller should issue a toggle request, or [`Action::Coalesced`]
    /// when one is already in flight and the press was queued — a second
    /// rapid click must never produce a second concurrent request.
    pub fn press(&mut self) -> Action {
        if self.in_flight {
            self.flip_predicted();
            self.pending = Some(self.liked);
            Action::Coalesced
        } else {
            self.baseline = (self.liked, self.count);
            self.flip_predicted();
            self.authoritative = false;
            self.in_flight = true;
            Action::Send
        }
    }

    fn flip_predicted(&mut self) {
        if self.liked {
            self.liked = false;
            self.count = self.count.saturating_sub(1);
        } else {
            self.liked = true;
            self.count += 1;
        }
    }

    /// Apply the server's authoritative toggle response.
    ///
    /// Returns [`Followup::Send`] when presses coalesced during the flight
    /// still want the opposite state; the caller then issues exactly one
    /// more toggle and feeds its response back here. Presses that toggled
    /// back to the server's state settle with no extra request.
    pub fn on_response(&mut self, liked: bool, count: u64) -> Followup {
        match self.pending.take() {
            Some(desired) if desired != liked => {
                // Revert target for a failed follow-up is the state the
                // server just confirmed.
                self.baseline = (liked, count);
                self.liked = desired;
                self.count = if desired {
                    count + 1
                } else {
                    count.saturating_sub(1)
                };
                self.authoritative = false;
                Followup::Send
            }
            _ => {
                self.liked = liked;
                self.count = count;
                self.authoritative = true;
                self.in_flight = false;
                Followup::Settled
            }
        }
    }

    /// The toggle request failed: revert to the pre-action values. The UI
    /// never keeps showing a state the server never confirmed.
    pub fn on_failure(&mut self) {
        let (liked, count) = self.baseline;
        self.liked = liked;
        self.count = count;
        self.authoritative = false;
        self.in_flight = false;
        self.pending = None;
    }

    /// The toggle request timed out before a response was observed.
    ///
    /// Inconclusive: the flip may or may not have landed. The optimistic
    /// guess stays on screen but is no longer trusted; the next render
    /// should fetch a fresh status and apply it via [`on_status`](Self::on_status).
    pub fn on_timeout(&mut self) {
        self.authoritative = false;
        self.in_flight = false;
        self.pending = None;
    }

    /// Apply a fresh status read. Ignored while a toggle is in flight — the
    /// toggle response is newer than any concurrent read.
    pub fn on_status(&mut self, liked: bool, count: u64) {
        if self.in_flight {
            return;
        }
        self.liked = liked;
        self.count = count;
        self.authoritative = true;
        self.baseline = (liked, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_flips_immediately_and_sends() {
        let mut rec = Reconciler::from_status(false, 3);
        assert_eq!(rec.press(), Action::Send);
        assert!(rec.liked());
        assert_eq!(rec.count(), 4);
        assert!(!rec.is_authoritative());
        assert!(rec.is_in_flight());
    }

    #[test]
    fn test_response_replaces_optimistic_guess() {
        // A racing third party also liked: server count beats the local +1.
        let mut rec = Reconciler::from_status(false, 3);
        rec.press();
        assert_eq!(rec.on_response(true, 7), Followup::Settled);
        assert!(rec.liked());
        assert_eq!(rec.count(), 7);
        assert!(rec.is_authoritative());
        assert!(!rec.is_in_flight());
    }

    #[test]
    fn test_double_press_coalesces_into_one_followup() {
        let mut rec = Reconciler::from_status(false, 0);
        assert_eq!(rec.press(), Action::Send);
        // Second click before the response: no second concurrent request,
        // and the UI already shows the toggled-back state.
        assert_eq!(rec.press(), Action::Coalesced);
        assert!(!rec.liked());
        assert_eq!(rec.count(), 0);

        // First response lands: the user still wants "not liked", so
        // exactly one follow-up is issued.
        assert_eq!(rec.on_response(true, 1), Followup::Send);
        assert!(rec.is_in_flight());
        assert!(!rec.liked());

        assert_eq!(rec.on_response(false, 0), Followup::Settled);
        assert!(!rec.liked());
        assert_eq!(rec.count(), 0);
        assert!(rec.is_authoritative());
    }

    #[test]
    fn test_triple_press_settles_with_single_request() {
        let mut rec = Reconciler::from_status(false, 0);
        assert_eq!(rec.press(), Action::Send);
        assert_eq!(rec.press(), Action::Coalesced);
        assert_eq!(rec.press(), Action::Coalesced);
        assert!(rec.liked());

        // Desired end state matches what the one in-flight request did:
        // nothing further to send.
        assert_eq!(rec.on_response(true, 1), Followup::Settled);
        assert!(rec.liked());
        assert_eq!(rec.count(), 1);
    }

    #[test]
    fn test_failure_reverts_to_pre_action_values() {
        let mut rec = Reconciler::from_status(true, 5);
        rec.press();
        assert!(!rec.liked());
        assert_eq!(rec.count(), 4);

        rec.on_failure();
        assert!(rec.liked());
        assert_eq!(rec.count(), 5);
        assert!(!rec.is_authoritative());
        assert!(!rec.is_in_flight());
    }

    #[test]
    fn test_followup_failure_reverts_to_server_confirmed_state() {
        let mut rec = Reconciler::from_status(false, 0);
        rec.press();
        rec.press();
        assert_eq!(rec.on_response(true, 1), Followup::Send);

        // The follow-up fails: fall back to what the server last confirmed,
        // not to the stale page-load baseline.
        rec.on_failure();
        assert!(rec.liked());
        assert_eq!(rec.count(), 1);
    }

    #[test]
    fn test_timeout_is_inconclusive_until_fresh_status() {
        let mut rec = Reconciler::from_status(false, 2);
        rec.press();
        rec.on_timeout();
        // Optimistic guess still rendered, but flagged unconfirmed.
        assert!(rec.liked());
        assert!(!rec.is_authoritative());

        rec.on_status(false, 2);
        assert!(!rec.liked());
        assert_eq!(rec.count(), 2);
        assert!(rec.is_authoritative());
    }

    #[test]
    fn test_status_ignored_while_in_flight() {
        let mut rec = Reconciler::from_status(false, 0);
        rec.press();
        rec.on_status(false, 9);
        assert!(rec.liked());
        assert_eq!(rec.count(), 1);

        assert_eq!(rec.on_response(true, 1), Followup::Settled);
        assert_eq!(rec.count(), 1);
    }

    #[test]
    fn test_count_never_underflows() {
        // A server count of 0 with a locally liked state must not wrap on unlike.
        let mut rec = Reconciler::from_status(true, 0);
        rec.press();
        assert_eq!(rec.count(), 0);
        assert!(!rec.liked());
    }
}
