//! Draining keeps exactly the failed items, in their original order.
//!
//! For any queue and any per-item success/failure pattern, a drain removes
//! the delivered items, keeps the failed ones in relative order, and never
//! stops early.

use nsudc_pwa::network::DeliveryError;
use nsudc_pwa::outbox::{payload_from_entries, QueuedSubmission, SubmissionQueue};
use nsudc_pwa::web_storage::MemoryStorage;
use proptest::prelude::*;

fn queue_of(n: usize) -> SubmissionQueue<MemoryStorage> {
    let queue = SubmissionQueue::new(MemoryStorage::new(), "nsudc:pending-submissions");
    for i in 0..n {
        let name = format!("member-{i}");
        queue.enqueue(QueuedSubmission::new(
            "/register",
            payload_from_entries([("name", name.as_str())]),
        ));
    }
    queue
}

fn name_of(item: &QueuedSubmission) -> String {
    item.payload["name"].values()[0].to_string()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn failed_subset_survives_in_order(fails in prop::collection::vec(any::<bool>(), 0..16)) {
        let queue = queue_of(fails.len());
        let mut seen = Vec::new();

        let report = queue.drain(|item| {
            let name = name_of(item);
            let index: usize = name["member-".len()..].parse().unwrap();
            seen.push(index);
            if fails[index] { Err(DeliveryError::Status(503)) } else { Ok(()) }
        });

        let expected: Vec<String> = fails
            .iter()
            .enumerate()
            .filter(|(_, failed)| **failed)
            .map(|(i, _)| format!("member-{i}"))
            .collect();
        let remaining: Vec<String> = queue.items().iter().map(name_of).collect();

        prop_assert_eq!(remaining, expected);
        prop_assert_eq!(seen, (0..fails.len()).collect::<Vec<_>>());
        prop_assert_eq!(report.attempted, fails.len());
        prop_assert_eq!(report.retained, fails.iter().filter(|f| **f).count());
        prop_assert_eq!(report.delivered + report.retained, report.attempted);
    }
}
