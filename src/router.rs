//! Router & fanout (C17): outbound flag-matched dispatch, inbound
//! session dispatch by source id / address, and per-frame fanout to
//! every live session. Modeled on `mixer/routing.rs`'s
//! match-first-route style, generalized from a gain matrix to a
//! packet/session dispatch table.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::error::{Error, Result};
use crate::packet::{Packet, PacketFlags};
use crate::sample_spec::Frame;

/// Destination for an outbound, already-composed packet (e.g. a UDP
/// egress socket or a test sink). Per-session pipelines are single-
/// threaded (spec §9's "cooperative scheduling" note), so this is
/// deliberately not `Send + Sync`: a session and its router never
/// cross a thread boundary.
pub trait PacketSink {
    fn write(&self, packet: Packet) -> Result<()>;
}

struct Route {
    required: PacketFlags,
    sink: Box<dyn PacketSink>,
}

/// Sender-side router: matches a packet's flags against each
/// registered route's required-flag mask, in registration order, and
/// writes to the first match. An unmatched packet is a fatal protocol
/// error (`Error::NoRoute`), never a silently dropped one.
#[derive(Default)]
pub struct OutboundRouter {
    routes: Vec<Route>,
}

impl OutboundRouter {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn add_route(&mut self, required: PacketFlags, sink: Box<dyn PacketSink>) {
        self.routes.push(Route { required, sink });
    }

    pub fn route(&self, packet: Packet) -> Result<()> {
        for route in &self.routes {
            if packet.flags.contains(route.required) {
                return route.sink.write(packet);
            }
        }
        Err(Error::NoRoute)
    }
}

/// Identifies which session a parsed inbound packet belongs to: RTP
/// and FEC traffic key off the RTP source id, RTCP keys off the peer
/// address (it carries no session-scoped field of its own).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Rtp(u32),
    Rtcp(SocketAddr),
}

/// Receiver-side router: dispatches to an existing session by key, or
/// creates one (subject to `max_sessions`) the first time a key is
/// seen. Holds the sessions themselves, not weak references to them —
/// callers that also need a long-lived handle should keep their own.
pub struct SessionRouter<S> {
    max_sessions: usize,
    sessions: HashMap<SessionKey, S>,
}

impl<S> SessionRouter<S> {
    pub fn new(max_sessions: usize) -> Self {
        Self { max_sessions, sessions: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, key: &SessionKey) -> Option<&S> {
        self.sessions.get(key)
    }

    pub fn get_mut(&mut self, key: &SessionKey) -> Option<&mut S> {
        self.sessions.get_mut(key)
    }

    /// Looks up the session for `key`, creating one via `create` if
    /// none exists yet. Fails with `Error::Limit` if `max_sessions`
    /// would be exceeded by the new session.
    pub fn dispatch_or_create<F>(&mut self, key: SessionKey, create: F) -> Result<&mut S>
    where
        F: FnOnce() -> S,
    {
        if !self.sessions.contains_key(&key) {
            if self.sessions.len() >= self.max_sessions {
                return Err(Error::Limit);
            }
            self.sessions.insert(key, create());
        }
        Ok(self.sessions.get_mut(&key).expect("just inserted or already present"))
    }

    pub fn remove(&mut self, key: &SessionKey) -> Option<S> {
        self.sessions.remove(key)
    }
}

/// Accepts replicated frames; returns the terminal status for good on
/// any failure that should unlink the session from the fanout.
pub trait FrameWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
}

/// Sender-side fanout: one source of frames feeding every participating
/// session. A session whose writer returns a terminal status is
/// unlinked immediately and its error remembered so a subsequent
/// `refresh()` can observe it.
pub struct FrameFanout<W> {
    writers: Vec<(SessionKey, W)>,
    failures: Vec<(SessionKey, Error)>,
}

impl<W: FrameWriter> FrameFanout<W> {
    pub fn new() -> Self {
        Self { writers: Vec::new(), failures: Vec::new() }
    }

    pub fn add(&mut self, key: SessionKey, writer: W) {
        self.writers.retain(|(k, _)| *k != key);
        self.writers.push((key, writer));
    }

    pub fn remove(&mut self, key: &SessionKey) -> Option<W> {
        let idx = self.writers.iter().position(|(k, _)| k == key)?;
        Some(self.writers.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Replicates `frame` to every writer. Writers that fail are
    /// unlinked on the spot; their key and error are recorded and
    /// drained by `take_failures()`.
    pub fn write_frame(&mut self, frame: &Frame) {
        let mut i = 0;
        while i < self.writers.len() {
            let (key, writer) = &mut self.writers[i];
            match writer.write_frame(frame) {
                Ok(()) => i += 1,
                Err(err) => {
                    self.failures.push((*key, err));
                    self.writers.remove(i);
                }
            }
        }
    }

    /// Drains and returns the failures recorded since the last call,
    /// for `refresh()` to surface as terminal session statuses.
    pub fn take_failures(&mut self) -> Vec<(SessionKey, Error)> {
        std::mem::take(&mut self.failures)
    }
}

impl<W: FrameWriter> Default for FrameFanout<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_spec::{ChannelLayout, SampleFormat, SampleSpec};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingSink {
        received: Rc<RefCell<Vec<PacketFlags>>>,
    }

    impl PacketSink for RecordingSink {
        fn write(&self, packet: Packet) -> Result<()> {
            self.received.borrow_mut().push(packet.flags);
            Ok(())
        }
    }

    fn spec() -> SampleSpec {
        SampleSpec::new(48_000, ChannelLayout::Mono, SampleFormat::S16Be)
    }

    #[test]
    fn outbound_router_dispatches_to_first_matching_route() {
        let rtp_log = Rc::new(RefCell::new(Vec::new()));
        let fec_log = Rc::new(RefCell::new(Vec::new()));
        let mut router = OutboundRouter::new();
        router.add_route(
            PacketFlags::RTP,
            Box::new(RecordingSink { received: rtp_log.clone() }),
        );
        router.add_route(
            PacketFlags::FEC,
            Box::new(RecordingSink { received: fec_log.clone() }),
        );

        router.route(Packet::new(PacketFlags::RTP)).unwrap();
        router.route(Packet::new(PacketFlags::FEC)).unwrap();

        assert_eq!(rtp_log.borrow().len(), 1);
        assert_eq!(fec_log.borrow().len(), 1);
    }

    #[test]
    fn outbound_router_rejects_an_unmatched_packet() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut router = OutboundRouter::new();
        router.add_route(PacketFlags::RTP, Box::new(RecordingSink { received: log }));

        let err = router.route(Packet::new(PacketFlags::CONTROL)).unwrap_err();
        assert_eq!(err, Error::NoRoute);
    }

    #[test]
    fn session_router_creates_once_then_reuses() {
        let mut router: SessionRouter<u32> = SessionRouter::new(8);
        let key = SessionKey::Rtp(42);
        *router.dispatch_or_create(key, || 0).unwrap() += 1;
        *router.dispatch_or_create(key, || 100).unwrap() += 1;
        assert_eq!(*router.get(&key).unwrap(), 2);
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn session_router_enforces_max_sessions() {
        let mut router: SessionRouter<u32> = SessionRouter::new(1);
        router.dispatch_or_create(SessionKey::Rtp(1), || 0).unwrap();
        let err = router.dispatch_or_create(SessionKey::Rtp(2), || 0).unwrap_err();
        assert_eq!(err, Error::Limit);
    }

    struct CountingWriter {
        calls: usize,
        fail_after: Option<usize>,
    }

    impl FrameWriter for CountingWriter {
        fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
            self.calls += 1;
            if self.fail_after == Some(self.calls) {
                return Err(Error::Finish);
            }
            Ok(())
        }
    }

    #[test]
    fn fanout_replicates_to_every_writer() {
        let mut fanout: FrameFanout<CountingWriter> = FrameFanout::new();
        fanout.add(SessionKey::Rtp(1), CountingWriter { calls: 0, fail_after: None });
        fanout.add(SessionKey::Rtp(2), CountingWriter { calls: 0, fail_after: None });

        let frame = Frame::silence(spec(), 10, 0);
        fanout.write_frame(&frame);
        fanout.write_frame(&frame);

        assert_eq!(fanout.len(), 2);
    }

    #[test]
    fn failing_writer_is_unlinked_and_recorded() {
        let mut fanout: FrameFanout<CountingWriter> = FrameFanout::new();
        fanout.add(SessionKey::Rtp(1), CountingWriter { calls: 0, fail_after: Some(1) });
        fanout.add(SessionKey::Rtp(2), CountingWriter { calls: 0, fail_after: None });

        let frame = Frame::silence(spec(), 10, 0);
        fanout.write_frame(&frame);

        assert_eq!(fanout.len(), 1);
        let failures = fanout.take_failures();
        assert_eq!(failures, vec![(SessionKey::Rtp(1), Error::Finish)]);
        assert!(fanout.take_failures().is_empty());
    }
}
