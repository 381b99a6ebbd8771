//! Correlated request/response messaging over crossbeam channels.
//!
//! `RequestChannel::send` hands out a [`Ticket`] per request. The channel
//! owns the correlation ids, routes replies to the matching ticket, and
//! expires tickets whose deadline has passed. Callers never see envelopes.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A message tagged with the id of the request it belongs to.
#[derive(Debug)]
pub struct Envelope<T> {
    pub id: u64,
    pub payload: T,
}

/// What travels from the requesting side to the serving side.
#[derive(Debug)]
pub enum ChannelMessage<Req> {
    Request(Envelope<Req>),
    /// Ask the serving side to stop
    Close,
}

/// Replies from the serving side carry either a payload or a remote error.
pub type RemoteResult<Resp> = Result<Resp, String>;

/// Why a ticket settled without a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    Timeout,
    /// The serving side reported a failure for this request
    Remote(String),
    /// The serving side went away before replying
    Closed(String),
    Disposed,
}

pub type Reply<Resp> = Result<Resp, ChannelError>;

struct PendingRequest<Resp> {
    reply: Sender<Reply<Resp>>,
    deadline: Instant,
}

/// Receiving end for a single request.
#[derive(Debug)]
pub struct Ticket<Resp> {
    id: u64,
    deadline: Instant,
    reply: Receiver<Reply<Resp>>,
}

impl<Resp> Ticket<Resp> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The reply if it has arrived. A ticket whose slot vanished without a
    /// reply counts as disposed.
    pub fn try_take(&self) -> Option<Reply<Resp>> {
        match self.reply.try_recv() {
            Ok(reply) => Some(reply),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ChannelError::Disposed)),
        }
    }
}

pub struct RequestChannel<Req, Resp> {
    outgoing: Sender<ChannelMessage<Req>>,
    incoming: Receiver<Envelope<RemoteResult<Resp>>>,
    pending: HashMap<u64, PendingRequest<Resp>>,
    next_id: u64,
    timeout: Duration,
    closed: Option<String>,
}

impl<Req, Resp> RequestChannel<Req, Resp> {
    pub fn new(
        outgoing: Sender<ChannelMessage<Req>>,
        incoming: Receiver<Envelope<RemoteResult<Resp>>>,
        timeout: Duration,
    ) -> Self {
        Self {
            outgoing,
            incoming,
            pending: HashMap::new(),
            next_id: 1,
            timeout,
            closed: None,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// The id the next request will carry. Ids only grow.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Set when the serving side has gone away.
    pub fn closed_reason(&self) -> Option<&str> {
        self.closed.as_deref()
    }

    /// Send a request stamped at `now`. Never blocks; a closed channel
    /// yields a ticket that is already settled.
    pub fn send(&mut self, payload: Req, now: Instant) -> Ticket<Resp> {
        let id = self.next_id;
        self.next_id += 1;
        let deadline = now + self.timeout;
        let (reply_tx, reply_rx) = channel::bounded(1);

        let ticket = Ticket {
            id,
            deadline,
            reply: reply_rx,
        };

        if let Some(reason) = &self.closed {
            let _ = reply_tx.send(Err(ChannelError::Closed(reason.clone())));
            return ticket;
        }

        let message = ChannelMessage::Request(Envelope { id, payload });
        if self.outgoing.send(message).is_err() {
            let reason = "serving side disconnected".to_string();
            let _ = reply_tx.send(Err(ChannelError::Closed(reason.clone())));
            self.fail_all(reason);
            return ticket;
        }

        self.pending.insert(
            id,
            PendingRequest {
                reply: reply_tx,
                deadline,
            },
        );
        ticket
    }

    /// Route every reply that has arrived and expire overdue requests.
    pub fn pump(&mut self, now: Instant) {
        loop {
            match self.incoming.try_recv() {
                Ok(envelope) => self.route(envelope),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.fail_all("serving side disconnected".to_string());
                    break;
                }
            }
        }
        self.expire(now);
    }

    /// Block until every pending request has settled or `limit` passes.
    pub fn pump_until_idle(&mut self, limit: Instant) {
        while !self.pending.is_empty() {
            let next_deadline = self
                .pending
                .values()
                .map(|p| p.deadline)
                .min()
                .unwrap_or(limit)
                .min(limit);
            match self.incoming.recv_deadline(next_deadline) {
                Ok(envelope) => self.route(envelope),
                Err(RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    self.expire(now);
                    if now >= limit {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.fail_all("serving side disconnected".to_string());
                }
            }
        }
    }

    /// Settle every pending request as disposed and return how many there
    /// were. The serving side keeps running; replies it still sends for
    /// these ids are dropped.
    pub fn dispose_pending(&mut self) -> usize {
        let disposed = self.pending.len();
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(ChannelError::Disposed));
        }
        disposed
    }

    /// Settle every pending request as disposed and ask the serving side to
    /// stop.
    pub fn close(&mut self) {
        self.dispose_pending();
        let _ = self.outgoing.send(ChannelMessage::Close);
        self.closed.get_or_insert_with(|| "closed".to_string());
    }

    fn route(&mut self, envelope: Envelope<RemoteResult<Resp>>) {
        // Replies for expired requests have no slot left and are dropped
        if let Some(pending) = self.pending.remove(&envelope.id) {
            let reply = envelope.payload.map_err(ChannelError::Remote);
            let _ = pending.reply.send(reply);
        }
    }

    fn expire(&mut self, now: Instant) {
        let overdue: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(&id, _)| id)
            .collect();
        for id in overdue {
            if let Some(pending) = self.pending.remove(&id) {
                let _ = pending.reply.send(Err(ChannelError::Timeout));
            }
        }
    }

    fn fail_all(&mut self, reason: String) {
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(ChannelError::Closed(reason.clone())));
        }
        self.closed.get_or_insert(reason);
    }
}
