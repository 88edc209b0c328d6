//! Fork/join topology: delivery, poison accounting, failure isolation

mod common;

use std::time::Duration;

use anyhow::Result;
use batchline_core::queue;
use batchline_core::{
    ContentBasedDispatcher, DispatchStrategy, DispatchWriter, Envelope, ForkJoinJob, Job,
    JobStatus, Mapper, Pipeline, Processor, QueueReader, Record, RecordNumbering, RecordReader,
    RoundRobinDispatcher,
};
use common::{init_tracing, CollectingWriter, IterableReader};

const DEADLINE: Duration = Duration::from_secs(10);

fn source(count: usize) -> IterableReader<String> {
    IterableReader::new((0..count).map(|i| format!("record-{}", i)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_reads_every_record_once() {
    init_tracing();
    let sink = CollectingWriter::<String>::new();
    let job = ForkJoinJob::builder()
        .named("fan")
        .reader(source(250))
        .workers(4)
        .queue_capacity(Some(8))
        .worker_pipeline(|_| Pipeline::new().with(Mapper::new(|p: String| p.to_uppercase())))
        .writer(sink.clone())
        .batch_size(10)
        .build()
        .unwrap();

    let report = tokio::time::timeout(DEADLINE, job.call()).await.expect("topology hung");

    assert_eq!(report.master.status(), JobStatus::Completed);
    assert_eq!(report.master.metrics().read_count, 250);
    assert_eq!(report.workers.len(), 4);
    assert_eq!(
        report.workers.iter().map(|r| r.metrics().read_count).sum::<u64>(),
        250
    );
    assert_eq!(report.join.metrics().read_count, 250);
    assert_eq!(report.join.status(), JobStatus::Completed);

    let mut payloads = sink.payloads();
    payloads.sort();
    let mut expected: Vec<String> = (0..250).map(|i| format!("RECORD-{}", i)).collect();
    expected.sort();
    assert_eq!(payloads, expected);

    let merged = report.merged();
    assert_eq!(merged.status(), JobStatus::Completed);
    assert_eq!(merged.metrics().read_count, 750);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_round_robin_splits_evenly() {
    let job = ForkJoinJob::builder()
        .reader(source(9))
        .workers(3)
        .dispatch(DispatchStrategy::RoundRobin)
        .writer(CollectingWriter::<String>::new())
        .build()
        .unwrap();

    let report = tokio::time::timeout(DEADLINE, job.call()).await.unwrap();

    let reads: Vec<u64> = report.workers.iter().map(|r| r.metrics().read_count).collect();
    assert_eq!(reads, vec![3, 3, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_seeded_random_dispatch_delivers_everything() {
    let sink = CollectingWriter::<String>::new();
    let job = ForkJoinJob::builder()
        .reader(source(40))
        .workers(3)
        .dispatch(DispatchStrategy::Random { seed: Some(7) })
        .queue_capacity(Some(2))
        .writer(sink.clone())
        .build()
        .unwrap();

    let report = tokio::time::timeout(DEADLINE, job.call()).await.unwrap();

    assert_eq!(report.join.metrics().read_count, 40);
    assert_eq!(sink.payloads().len(), 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_content_based_dispatch_with_default_route() {
    let job = ForkJoinJob::builder()
        .reader(IterableReader::<String>::new(["apple", "kiwi", "avocado", "banana"]))
        .workers(2)
        .dispatcher_factory(|queues| {
            ContentBasedDispatcher::builder()
                .when(|r: &Record<String>| r.payload().starts_with('a'), queues[0].clone())
                .otherwise(queues[1].clone())
                .build()
        })
        .writer(CollectingWriter::<String>::new())
        .build()
        .unwrap();

    let report = tokio::time::timeout(DEADLINE, job.call()).await.unwrap();

    let reads: Vec<u64> = report.workers.iter().map(|r| r.metrics().read_count).collect();
    assert_eq!(reads, vec![2, 2]);
    assert_eq!(report.join.metrics().read_count, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_worker_does_not_strand_the_join() {
    let job = ForkJoinJob::builder()
        .reader(source(30))
        .workers(3)
        .queue_capacity(Some(4))
        .worker_pipeline(|index| {
            let pipeline = Pipeline::new();
            if index == 0 {
                pipeline.with(Processor::new(|_r: Record<String>| -> Result<Record<String>> {
                    anyhow::bail!("worker 0 is broken")
                }))
            } else {
                pipeline
            }
        })
        .error_threshold(1)
        .writer(CollectingWriter::<String>::new())
        .build()
        .unwrap();

    let report = tokio::time::timeout(DEADLINE, job.call()).await.expect("topology hung");

    assert_eq!(report.workers[0].status(), JobStatus::Failed);
    assert_eq!(report.join.status(), JobStatus::Completed);
    assert_eq!(report.merged().status(), JobStatus::Failed);
    assert!(report.merged().last_error().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_source_still_terminates_workers() {
    let job = ForkJoinJob::builder()
        .reader(source(5).failing_open())
        .workers(2)
        .writer(CollectingWriter::<String>::new())
        .build()
        .unwrap();

    let report = tokio::time::timeout(DEADLINE, job.call()).await.expect("topology hung");

    assert_eq!(report.master.status(), JobStatus::Failed);
    assert!(report.workers.iter().all(|r| r.status() == JobStatus::Completed));
    assert_eq!(report.join.metrics().read_count, 0);
    assert_eq!(report.merged().status(), JobStatus::Failed);
}

#[tokio::test]
async fn test_dispatched_records_are_not_counted_as_skipped() {
    let (first, mut first_rx) = queue::unbounded::<String>("q0");
    let (second, second_rx) = queue::unbounded::<String>("q1");
    drop(second_rx);

    let job = Job::builder()
        .named("master")
        .reader(IterableReader::<String>::new(["r1", "r2", "r3", "r4"]))
        .writer(DispatchWriter::new(
            RoundRobinDispatcher::new(vec![first, second]).unwrap(),
        ))
        .batch_size(4)
        .build()
        .unwrap();

    let report = job.call().await;

    assert_eq!(report.status(), JobStatus::Failed);
    assert_eq!(report.metrics().read_count, 4);
    assert_eq!(report.metrics().write_count, 1);
    assert_eq!(report.metrics().skip_count, 3);
    assert!(report.metrics().is_balanced());
    match first_rx.take().await {
        Some(Envelope::Data(record)) => assert_eq!(record.payload(), "r1"),
        other => panic!("expected r1 on q0, got {:?}", other.map(|e| e.is_poison())),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_master_accounting_survives_a_dead_worker() {
    let job = ForkJoinJob::builder()
        .reader(source(40))
        .workers(2)
        .queue_capacity(Some(2))
        .batch_size(5)
        .worker_pipeline(|index| {
            let pipeline = Pipeline::new();
            if index == 1 {
                pipeline.with(Processor::new(|_r: Record<String>| -> Result<Record<String>> {
                    anyhow::bail!("worker 1 is broken")
                }))
            } else {
                pipeline
            }
        })
        .error_threshold(1)
        .writer(CollectingWriter::<String>::new())
        .build()
        .unwrap();

    let report = tokio::time::timeout(DEADLINE, job.call()).await.expect("topology hung");

    let master = report.master.metrics();
    let delivered: u64 = report.workers.iter().map(|r| r.metrics().read_count).sum();
    assert!(master.is_balanced());
    assert!(master.write_count >= delivered);
    assert_eq!(report.workers[1].status(), JobStatus::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_aggregation_reader_needs_one_poison_per_producer() {
    let producers = 5;
    let per_producer = 20;
    let (sender, receiver) = queue::bounded::<usize>("aggregate", 3);

    for producer in 0..producers {
        let sender = sender.clone();
        tokio::spawn(async move {
            let mut numbering = RecordNumbering::new(format!("producer-{}", producer));
            for i in 0..per_producer {
                sender.put_record(numbering.stamp(producer * 100 + i)).await.unwrap();
            }
            sender.put(Envelope::Poison).await.unwrap();
        });
    }
    drop(sender);

    let mut reader = QueueReader::with_poison_count(receiver, producers);
    let mut seen = 0;
    while let Some(record) = tokio::time::timeout(DEADLINE, reader.read_record())
        .await
        .unwrap()
        .unwrap()
    {
        seen += 1;
        assert_eq!(record.header().number(), seen as u64);
    }

    assert_eq!(seen, producers * per_producer);
    assert_eq!(reader.poisons_seen(), producers);
}
