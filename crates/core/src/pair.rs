//! The two legs of a session and their combined lifecycle.
//!
//! Lifecycle policy:
//! - only the primary leg's `Open` moves `Connecting` to `Open`;
//! - a `Close` from either leg, or an explicit [`ChannelPair::close`],
//!   moves the pair to `Closed`, which absorbs every later event;
//! - an error on the primary leg while `Connecting` rejects the pending
//!   connect and closes the pair. Errors at any other time leave the state
//!   alone.

use crate::{
    SessionError,
    channel::{ChannelSink, CloseEvent, Frame, Leg},
};
use std::{
    fmt,
    sync::{Mutex, PoisonError},
};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "idle"),
            LifecycleState::Connecting => write!(f, "connecting"),
            LifecycleState::Open => write!(f, "open"),
            LifecycleState::Closed => write!(f, "closed"),
        }
    }
}

/// Outcome of feeding one lifecycle event to the pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    None,
    Opened,
    Closed(CloseEvent),
}

type OpenWaiter = oneshot::Sender<Result<(), SessionError>>;

struct Legs {
    outbound: Box<dyn ChannelSink>,
    inbound: Box<dyn ChannelSink>,
}

pub(crate) struct ChannelPair {
    primary: Leg,
    state: watch::Sender<LifecycleState>,
    legs: Mutex<Option<Legs>>,
    open_waiter: Mutex<Option<OpenWaiter>>,
}

impl ChannelPair {
    pub(crate) fn new(primary: Leg) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            primary,
            state,
            legs: Mutex::new(None),
            open_waiter: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// `Idle -> Connecting`. The receiver settles exactly once: `Ok` on open,
    /// `Err` if the primary leg fails first or the pair closes.
    pub(crate) fn begin_connect(
        &self,
    ) -> Result<oneshot::Receiver<Result<(), SessionError>>, SessionError> {
        let mut previous = LifecycleState::Idle;
        let started = self.state.send_if_modified(|state| {
            previous = *state;
            if *state == LifecycleState::Idle {
                *state = LifecycleState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(SessionError::InvalidState(previous));
        }

        let (tx, rx) = oneshot::channel();
        *self.open_waiter.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(rx)
    }

    /// Takes ownership of both legs. A pair closed in the meantime closes
    /// them straight away.
    pub(crate) fn attach(&self, outbound: Box<dyn ChannelSink>, inbound: Box<dyn ChannelSink>) {
        let mut legs = self.legs.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state() == LifecycleState::Closed {
            outbound.close();
            inbound.close();
            return;
        }
        *legs = Some(Legs { outbound, inbound });
    }

    pub(crate) fn handle_open(&self, leg: Leg) -> Transition {
        if leg != self.primary {
            debug!(%leg, "Secondary leg opened.");
            return Transition::None;
        }
        let opened = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Connecting {
                *state = LifecycleState::Open;
                true
            } else {
                false
            }
        });
        if !opened {
            return Transition::None;
        }
        info!(%leg, "Primary leg open; session is open.");
        self.settle(Ok(()));
        Transition::Opened
    }

    pub(crate) fn handle_close(&self, leg: Leg, event: CloseEvent) -> Transition {
        info!(%leg, code = event.code, reason = %event.reason, "Leg closed.");
        self.shutdown(event)
    }

    pub(crate) fn handle_error(&self, leg: Leg, message: &str) -> Transition {
        if leg == self.primary && self.state() == LifecycleState::Connecting {
            self.settle(Err(SessionError::Transport {
                leg,
                message: message.to_string(),
            }));
            return self.shutdown(CloseEvent::abnormal(message));
        }
        Transition::None
    }

    /// Explicit close. Only the first call reports a transition.
    pub(crate) fn close(&self) -> Transition {
        self.shutdown(CloseEvent::normal())
    }

    pub(crate) fn ensure_open(&self) -> Result<(), SessionError> {
        match self.state() {
            LifecycleState::Open => Ok(()),
            other => Err(SessionError::NotConnected(other)),
        }
    }

    /// Sends one frame on the outbound leg.
    pub(crate) fn send(&self, frame: Frame) -> Result<(), SessionError> {
        let legs = self.legs.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_open()?;
        let Some(legs) = legs.as_ref() else {
            return Err(SessionError::NotConnected(self.state()));
        };
        legs.outbound
            .send(frame)
            .map_err(|e| SessionError::Transport {
                leg: Leg::Outbound,
                message: e.to_string(),
            })
    }

    fn shutdown(&self, event: CloseEvent) -> Transition {
        let closed = self.state.send_if_modified(|state| {
            if *state == LifecycleState::Closed {
                false
            } else {
                *state = LifecycleState::Closed;
                true
            }
        });
        if !closed {
            return Transition::None;
        }

        let legs = self
            .legs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(legs) = legs {
            legs.outbound.close();
            legs.inbound.close();
        }
        self.settle(Err(SessionError::ConnectAborted));
        Transition::Closed(event)
    }

    fn settle(&self, result: Result<(), SessionError>) {
        let waiter = self
            .open_waiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(waiter) = waiter {
            let _ = waiter.send(result);
        }
    }
}
