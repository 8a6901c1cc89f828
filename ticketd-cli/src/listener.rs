//! Datagram loop and reclaim timer.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::Instant;

use ticketd_core::events::{EventKind, EventSink, LeaseEvent};
use ticketd_core::liveness::LivenessProbe;
use ticketd_core::protocol::{ProtocolHandler, MAX_MESSAGE_LEN};
use ticketd_core::reclaimer::Reclaimer;
use ticketd_core::table::LeaseTable;
use ticketd_core::types::Ticket;

const RECEIVE_BACKOFF: Duration = Duration::from_millis(100);

/// Moves datagrams between the server and its clients.
pub trait Transport: Send + Sync {
    fn receive(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send;

    fn send(&self, payload: &[u8], dest: SocketAddr) -> impl Future<Output = io::Result<()>> + Send;
}

impl Transport for UdpSocket {
    async fn receive(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buf).await
    }

    async fn send(&self, payload: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.send_to(payload, dest).await.map(|_| ())
    }
}

/// Everything guarded by the server lock. The table and the reclaimer's
/// deadline always change together.
pub struct TicketCore {
    pub table: LeaseTable,
    pub reclaimer: Reclaimer,
}

pub struct ServerState {
    pub core: Mutex<TicketCore>,
    pub probe: Box<dyn LivenessProbe>,
    pub sink: Arc<dyn EventSink>,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    pub fn new(
        table: LeaseTable,
        reclaim_interval: Duration,
        probe: Box<dyn LivenessProbe>,
        sink: Arc<dyn EventSink>,
    ) -> SharedState {
        let reclaimer = Reclaimer::new(reclaim_interval, Instant::now().into_std());
        Arc::new(Self {
            core: Mutex::new(TicketCore { table, reclaimer }),
            probe,
            sink,
        })
    }

    /// Run a reclaim sweep now. Also re-arms the periodic timer.
    pub async fn sweep(&self) -> (Vec<Ticket>, usize) {
        let mut core = self.core.lock().await;
        let TicketCore { table, reclaimer } = &mut *core;
        let reclaimed = reclaimer.sweep(
            table,
            self.probe.as_ref(),
            self.sink.as_ref(),
            Instant::now().into_std(),
        );
        (reclaimed, table.outstanding())
    }
}

/// Answer requests until the task is dropped.
///
/// Receive and send failures are reported and skipped. A reply that fails to
/// send does not undo the lease change behind it.
pub async fn serve<T: Transport>(transport: &T, state: &ServerState) {
    let mut buf = [0u8; MAX_MESSAGE_LEN];

    loop {
        let (len, source) = match transport.receive(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                state.sink.record(LeaseEvent::new(
                    EventKind::TransportError,
                    format!("receive failed: {}", e),
                    None,
                ));
                tokio::time::sleep(RECEIVE_BACKOFF).await;
                continue;
            }
        };

        let reply = {
            let mut core = state.core.lock().await;
            ProtocolHandler::handle(&mut core.table, state.sink.as_ref(), &buf[..len], Some(source))
        };

        tracing::debug!(%source, reply = %reply, "Replying");
        if let Err(e) = transport.send(reply.to_string().as_bytes(), source).await {
            state.sink.record(LeaseEvent::new(
                EventKind::TransportError,
                format!("send failed: {}", e),
                Some(source),
            ));
        }
    }
}

/// Sleep until the reclaimer's deadline, sweep, repeat.
///
/// The deadline is single-shot; [`Reclaimer::sweep`] re-arms it. If an
/// out-of-band sweep moved the deadline while we slept, we go back to sleep.
pub async fn reclaim_loop(state: SharedState) {
    loop {
        let due = state.core.lock().await.reclaimer.next_due();
        tokio::time::sleep_until(Instant::from_std(due)).await;

        let mut core = state.core.lock().await;
        let now = Instant::now().into_std();
        if !core.reclaimer.is_due(now) {
            continue;
        }

        let TicketCore { table, reclaimer } = &mut *core;
        let reclaimed = reclaimer.sweep(table, state.probe.as_ref(), state.sink.as_ref(), now);
        tracing::debug!(
            reclaimed = reclaimed.len(),
            outstanding = table.outstanding(),
            "Reclaim sweep finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use ticketd_core::events::MemorySink;
    use ticketd_core::liveness::AlwaysAlive;
    use ticketd_core::types::{HolderId, SlotState};
    use tokio::sync::mpsc;

    type Datagram = (Vec<u8>, SocketAddr);

    struct ChannelTransport {
        inbound: Mutex<mpsc::UnboundedReceiver<Datagram>>,
        outbound: mpsc::UnboundedSender<Datagram>,
        fail_sends: AtomicBool,
    }

    impl Transport for ChannelTransport {
        async fn receive(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            let mut inbound = self.inbound.lock().await;
            match inbound.recv().await {
                Some((payload, source)) => {
                    let len = payload.len().min(buf.len());
                    buf[..len].copy_from_slice(&payload[..len]);
                    Ok((len, source))
                }
                None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")),
            }
        }

        async fn send(&self, payload: &[u8], dest: SocketAddr) -> io::Result<()> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::Other, "send refused"));
            }
            self.outbound
                .send((payload.to_vec(), dest))
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    struct Harness {
        to_server: mpsc::UnboundedSender<Datagram>,
        from_server: mpsc::UnboundedReceiver<Datagram>,
        transport: Arc<ChannelTransport>,
        state: SharedState,
        sink: Arc<MemorySink>,
    }

    fn harness(capacity: usize) -> Harness {
        let (to_server, inbound) = mpsc::unbounded_channel();
        let (outbound, from_server) = mpsc::unbounded_channel();
        let sink = Arc::new(MemorySink::new());
        let state = ServerState::new(
            LeaseTable::with_capacity(capacity),
            Duration::from_secs(60),
            Box::new(AlwaysAlive),
            sink.clone(),
        );
        Harness {
            to_server,
            from_server,
            transport: Arc::new(ChannelTransport {
                inbound: Mutex::new(inbound),
                outbound,
                fail_sends: AtomicBool::new(false),
            }),
            state,
            sink,
        }
    }

    fn client(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    async fn request(h: &mut Harness, from: SocketAddr, msg: &str) -> String {
        h.to_server.send((msg.as_bytes().to_vec(), from)).unwrap();
        let (payload, dest) = h.from_server.recv().await.unwrap();
        assert_eq!(dest, from);
        String::from_utf8(payload).unwrap()
    }

    #[tokio::test]
    async fn test_serve_answers_each_client() {
        let mut h = harness(3);
        let transport = h.transport.clone();
        let state = h.state.clone();
        let task = tokio::spawn(async move { serve(transport.as_ref(), &state).await });

        assert_eq!(request(&mut h, client(5001), "HELLO 100").await, "TICK 100.0");
        assert_eq!(request(&mut h, client(5002), "HELLO 200").await, "TICK 200.1");
        assert_eq!(request(&mut h, client(5001), "VALD 100.0").await, "GOOD Valid ticket");
        assert_eq!(request(&mut h, client(5003), "BOGUS").await, "FAIL invalid request");
        assert_eq!(request(&mut h, client(5001), "GBYE 100.0").await, "THNX See ya!");

        assert_eq!(h.state.core.lock().await.table.outstanding(), 1);
        task.abort();
    }

    #[tokio::test]
    async fn test_failed_send_keeps_lease_and_loop() {
        let mut h = harness(3);
        let transport = h.transport.clone();
        let state = h.state.clone();
        let task = tokio::spawn(async move { serve(transport.as_ref(), &state).await });

        h.transport.fail_sends.store(true, Ordering::SeqCst);
        h.to_server.send((b"HELLO 100".to_vec(), client(6000))).unwrap();

        // wait for the failed send to be reported
        for _ in 0..100 {
            if h.sink.kinds().contains(&EventKind::TransportError) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(h.sink.kinds().contains(&EventKind::TransportError));
        assert_eq!(h.state.core.lock().await.table.outstanding(), 1);

        h.transport.fail_sends.store(false, Ordering::SeqCst);
        assert_eq!(request(&mut h, client(6000), "VALD 100.0").await, "GOOD Valid ticket");
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaim_loop_sweeps_every_interval() {
        let sink = Arc::new(MemorySink::new());
        let dead = Arc::new(AtomicBool::new(false));
        let probe_dead = dead.clone();
        let probe = move |h: HolderId| !(h.get() == 100 && probe_dead.load(Ordering::SeqCst));

        let mut table = LeaseTable::with_capacity(3);
        for raw in [100, 200, 300] {
            table.acquire(HolderId::new(raw).unwrap()).unwrap();
        }
        let state = ServerState::new(table, Duration::from_secs(60), Box::new(probe), sink.clone());
        let task = tokio::spawn(reclaim_loop(state.clone()));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(state.core.lock().await.reclaimer.sweeps(), 1);
        assert_eq!(state.core.lock().await.table.outstanding(), 3);

        // the holder dies after the first sweep; the re-armed timer catches it
        dead.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;

        let core = state.core.lock().await;
        assert_eq!(core.reclaimer.sweeps(), 2);
        assert_eq!(core.table.outstanding(), 2);
        assert_eq!(core.table.slots()[0], SlotState::Available);
        drop(core);

        assert_eq!(sink.kinds(), vec![EventKind::Reclaimed]);
        task.abort();
    }

    #[tokio::test]
    async fn test_manual_sweep_rearms() {
        let h = harness(1);
        let before = h.state.core.lock().await.reclaimer.next_due();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (reclaimed, outstanding) = h.state.sweep().await;

        assert!(reclaimed.is_empty());
        assert_eq!(outstanding, 0);
        assert!(h.state.core.lock().await.reclaimer.next_due() > before);
    }
}
