#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::events::{EventKind, MemorySink};
    use crate::liveness::AlwaysAlive;
    use crate::reclaimer::{Reclaimer, ReclaimerState};
    use crate::table::LeaseTable;
    use crate::types::{HolderId, SlotState, Ticket};

    fn holder(raw: u32) -> HolderId {
        HolderId::new(raw).unwrap()
    }

    fn full_table() -> LeaseTable {
        let mut table = LeaseTable::with_capacity(3);
        for raw in [100, 200, 300] {
            table.acquire(holder(raw)).unwrap();
        }
        table
    }

    #[test]
    fn test_sweep_frees_dead_holder() {
        let start = Instant::now();
        let mut reclaimer = Reclaimer::new(Duration::from_secs(60), start);
        let mut table = full_table();
        let sink = MemorySink::new();
        let probe = |h: HolderId| h.get() != 100;

        let reclaimed = reclaimer.sweep(&mut table, &probe, &sink, start + Duration::from_secs(60));

        assert_eq!(reclaimed, vec![Ticket::new(holder(100), 0)]);
        assert_eq!(table.outstanding(), 2);
        assert_eq!(table.slots()[0], SlotState::Available);
        assert_eq!(table.slots()[1], SlotState::Held(holder(200)));
        assert_eq!(table.slots()[2], SlotState::Held(holder(300)));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Reclaimed);
        assert_eq!(events[0].detail, "freeing 100.0");
    }

    #[test]
    fn test_sweep_rearms_timer() {
        let start = Instant::now();
        let interval = Duration::from_secs(60);
        let mut reclaimer = Reclaimer::new(interval, start);
        let mut table = full_table();
        let sink = MemorySink::new();

        assert_eq!(reclaimer.next_due(), start + interval);
        assert!(!reclaimer.is_due(start));
        assert!(reclaimer.is_due(start + interval));

        // fired late; the next deadline counts from the sweep, not the old deadline
        let fired_at = start + Duration::from_secs(75);
        reclaimer.sweep(&mut table, &AlwaysAlive, &sink, fired_at);

        assert_eq!(reclaimer.state(), ReclaimerState::Idle);
        assert_eq!(reclaimer.next_due(), fired_at + interval);
        assert!(!reclaimer.is_due(fired_at));

        let second = fired_at + interval;
        reclaimer.sweep(&mut table, &AlwaysAlive, &sink, second);
        assert_eq!(reclaimer.next_due(), second + interval);
        assert_eq!(reclaimer.sweeps(), 2);
    }

    #[test]
    fn test_sweep_reports_corruption() {
        let start = Instant::now();
        let mut reclaimer = Reclaimer::new(Duration::from_secs(1), start);
        let mut table = full_table();
        table.force_outstanding(1);
        let sink = MemorySink::new();

        reclaimer.sweep(&mut table, &AlwaysAlive, &sink, start);

        assert_eq!(sink.kinds(), vec![EventKind::CorruptState]);
        // still re-armed
        assert_eq!(reclaimer.next_due(), start + Duration::from_secs(1));
    }
}
