//! Property tests: record accounting and round-robin placement

mod common;

use anyhow::Result;
use batchline_core::{
    broadcast_poison, queue, Dispatcher, Envelope, Filter, Job, JobStatus, Processor, Record,
    RecordNumbering, RoundRobinDispatcher,
};
use common::{CollectingWriter, IterableReader};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime must build")
}

proptest! {
    /// Negative values fail processing, zeros are filtered, the rest are
    /// written. Every read record is accounted for exactly once.
    #[test]
    fn every_read_record_is_accounted_for(
        values in prop::collection::vec(-3_i64..10, 0..60),
        batch_size in 1_usize..8,
        threshold in 1_u64..6,
    ) {
        let writer = CollectingWriter::<i64>::new();
        let job = Job::builder()
            .reader(IterableReader::<i64>::new(values.clone()))
            .filter(Filter::reject(|r: &Record<i64>| *r.payload() == 0))
            .process(Processor::new(|r: Record<i64>| -> Result<Record<i64>> {
                if *r.payload() < 0 {
                    anyhow::bail!("negative value {}", r.payload())
                }
                Ok(r)
            }))
            .writer(writer.clone())
            .batch_size(batch_size)
            .error_threshold(threshold)
            .build()
            .expect("job must build");

        let report = runtime().block_on(job.call());
        let metrics = report.metrics();

        prop_assert!(metrics.is_balanced());
        prop_assert_eq!(metrics.write_count as usize, writer.payloads().len());

        let negatives = values.iter().filter(|v| **v < 0).count() as u64;
        if negatives > threshold {
            prop_assert_eq!(report.status(), JobStatus::Failed);
            prop_assert_eq!(metrics.error_count, threshold + 1);
        } else {
            prop_assert_eq!(report.status(), JobStatus::Completed);
            prop_assert_eq!(metrics.skip_count, 0);
            prop_assert_eq!(metrics.read_count, values.len() as u64);
            prop_assert_eq!(
                metrics.read_count,
                metrics.write_count + metrics.filter_count + metrics.error_count
            );
            let expected: Vec<i64> = values.iter().copied().filter(|v| *v > 0).collect();
            prop_assert_eq!(writer.payloads(), expected);
        }
    }

    #[test]
    fn round_robin_sends_record_k_to_queue_k_mod_n(
        queue_count in 1_usize..8,
        record_count in 0_usize..100,
    ) {
        let placement = runtime().block_on(async {
            let (senders, mut receivers): (Vec<_>, Vec<_>) = (0..queue_count)
                .map(|i| queue::unbounded::<usize>(format!("q{}", i)))
                .unzip();
            let mut dispatcher = RoundRobinDispatcher::new(senders.clone()).expect("queues given");
            let mut numbering = RecordNumbering::default();
            for k in 0..record_count {
                dispatcher.dispatch(numbering.stamp(k)).await.expect("queue open");
            }
            broadcast_poison(&senders).await.expect("queues open");

            let mut placement = Vec::new();
            for (index, receiver) in receivers.iter_mut().enumerate() {
                while let Some(Envelope::Data(record)) = receiver.take().await {
                    placement.push((record.into_payload(), index));
                }
            }
            placement
        });

        prop_assert_eq!(placement.len(), record_count);
        for (k, index) in placement {
            prop_assert_eq!(index, k % queue_count);
        }
    }
}
