//! Bookkeeping for in-flight gateway requests.
//!
//! Each request is issued on behalf of a session (typically one view) and is keyed
//! by what it fetches. The registry answers three questions:
//!
//! - is an equivalent request already running, so a new one can be coalesced?
//! - is the result that just arrived still wanted, or was its session closed or the
//!   request superseded by a newer one for the same key?
//! - which sessions are still alive?
//!
//! Results that are no longer wanted are dropped by the engine without touching
//! state, which also keeps late responses from being applied out of order.

use std::collections::{HashMap, HashSet};

use crate::product_model::ProductId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Session that lives as long as the engine and can't be closed.
    pub const APP: SessionId = SessionId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKey {
    List,
    Product(ProductId),
}

/// Handle for one in-flight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    id: u64,
    key: RequestKey,
    session: SessionId,
}

impl Ticket {
    pub fn key(&self) -> RequestKey {
        self.key
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    Started(Ticket),
    /// An equivalent request is already running; its result will be applied.
    Coalesced,
    /// The session was closed; nothing was started.
    SessionClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Current,
    Stale,
}

#[derive(Debug)]
struct InFlight {
    ticket_id: u64,
    session: SessionId,
}

#[derive(Debug)]
pub struct RequestRegistry {
    next_session: u64,
    next_ticket: u64,
    open_sessions: HashSet<SessionId>,
    in_flight: HashMap<RequestKey, InFlight>,
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRegistry {
    pub fn new() -> Self {
        let mut open_sessions = HashSet::new();
        open_sessions.insert(SessionId::APP);
        Self {
            next_session: 1,
            next_ticket: 1,
            open_sessions,
            in_flight: HashMap::new(),
        }
    }

    pub fn open_session(&mut self) -> SessionId {
        let session = SessionId(self.next_session);
        self.next_session += 1;
        self.open_sessions.insert(session);
        session
    }

    /// Closes `session` and forgets its in-flight requests, so their results are
    /// discarded when they arrive. Returns how many requests were orphaned.
    pub fn close_session(&mut self, session: SessionId) -> usize {
        if session == SessionId::APP || !self.open_sessions.remove(&session) {
            return 0;
        }
        let before = self.in_flight.len();
        self.in_flight.retain(|_, flight| flight.session != session);
        before - self.in_flight.len()
    }

    pub fn is_open(&self, session: SessionId) -> bool {
        self.open_sessions.contains(&session)
    }

    pub fn is_in_flight(&self, key: RequestKey) -> bool {
        self.in_flight.contains_key(&key)
    }

    pub fn any_in_flight<F: Fn(&RequestKey) -> bool>(&self, predicate: F) -> bool {
        self.in_flight.keys().any(predicate)
    }

    /// Starts a request unless one for the same key is running.
    pub fn begin(&mut self, session: SessionId, key: RequestKey) -> Begin {
        if !self.is_open(session) {
            return Begin::SessionClosed;
        }
        if self.in_flight.contains_key(&key) {
            return Begin::Coalesced;
        }
        Begin::Started(self.issue(session, key))
    }

    /// Starts a request, superseding any running one for the same key.
    pub fn restart(&mut self, session: SessionId, key: RequestKey) -> Begin {
        if !self.is_open(session) {
            return Begin::SessionClosed;
        }
        Begin::Started(self.issue(session, key))
    }

    /// Forgets every in-flight request whose key matches, so their results are
    /// discarded when they arrive. Returns how many were retired.
    pub fn retire_where<F: Fn(&RequestKey) -> bool>(&mut self, predicate: F) -> usize {
        let before = self.in_flight.len();
        self.in_flight.retain(|key, _| !predicate(key));
        before - self.in_flight.len()
    }

    /// Retires `ticket`. Only the latest ticket for a key of a live session is current.
    pub fn complete(&mut self, ticket: &Ticket) -> Completion {
        match self.in_flight.get(&ticket.key) {
            Some(flight) if flight.ticket_id == ticket.id => {
                self.in_flight.remove(&ticket.key);
                Completion::Current
            }
            _ => Completion::Stale,
        }
    }

    fn issue(&mut self, session: SessionId, key: RequestKey) -> Ticket {
        let id = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight.insert(
            key,
            InFlight {
                ticket_id: id,
                session,
            },
        );
        Ticket { id, key, session }
    }
}
