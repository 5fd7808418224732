use crate::stage::Stage;
use bytemuck::Pod;
use spdlog::{debug, info};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// What happens to buffered stage state when the engine shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownPolicy {
    /// Call [`Stage::flush`] on every partition; partial results are emitted.
    #[default]
    Flush,
    /// Drop buffered state without emitting it.
    Discard,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("partition {0} worker has stopped")]
    PartitionClosed(usize),
    #[error("partition {0} worker panicked")]
    WorkerPanicked(usize),
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Number of partition workers.
    pub parallelism: usize,
    /// Bounded queue length in front of each worker.
    pub queue_capacity: usize,
    /// Pin worker `i` to core `i % cores`.
    pub pin_cores: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            parallelism: 1,
            queue_capacity: 1024,
            pin_cores: false,
        }
    }
}

enum Command<T> {
    Item(T),
    Close(ShutdownPolicy),
}

/// Runs one stage instance per partition, each on its own thread.
///
/// Items are routed by `key_fn`, so every item with the same key is handled by
/// the same worker, in send order. A worker's stage is never touched by any
/// other thread. Inputs go through bounded queues (send blocks when a worker
/// falls behind); outputs of all partitions are merged into one unbounded
/// channel so workers never block on a slow reader.
pub struct PartitionedEngine<In: Pod + Send + 'static, Out: Pod + Send + 'static> {
    partitions: Vec<SyncSender<Command<In>>>,
    workers: Vec<JoinHandle<()>>,
    output_rx: Receiver<Out>,
    key_fn: Box<dyn Fn(&In) -> u64 + Send>,
}

impl<In: Pod + Send + 'static, Out: Pod + Send + 'static> PartitionedEngine<In, Out> {
    /// Spawns `options.parallelism` workers; `stage_factory` is called once per
    /// partition index to build that worker's stage.
    pub fn new<S, F>(
        options: &EngineOptions,
        key_fn: impl Fn(&In) -> u64 + Send + 'static,
        stage_factory: F,
    ) -> Self
    where
        S: Stage<In, Out> + Send + 'static,
        F: Fn(usize) -> S,
    {
        let parallelism = options.parallelism.max(1);
        let (output_tx, output_rx) = mpsc::channel();
        let core_ids = if options.pin_cores {
            core_affinity::get_core_ids().unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut partitions = Vec::with_capacity(parallelism);
        let mut workers = Vec::with_capacity(parallelism);
        for partition in 0..parallelism {
            let (tx, rx) = mpsc::sync_channel(options.queue_capacity.max(1));
            let stage = stage_factory(partition);
            let output_tx = output_tx.clone();
            let core_id = (!core_ids.is_empty()).then(|| core_ids[partition % core_ids.len()]);

            let handle = thread::Builder::new()
                .name(format!("partition-{}", partition))
                .spawn(move || {
                    if let Some(core_id) = core_id {
                        core_affinity::set_for_current(core_id);
                    }
                    run_partition(partition, stage, rx, output_tx);
                })
                .unwrap_or_else(|e| panic!("failed to spawn partition {} worker: {}", partition, e));

            partitions.push(tx);
            workers.push(handle);
        }
        info!("[Engine] Started {} partition workers", parallelism);

        Self {
            partitions,
            workers,
            output_rx,
            key_fn: Box::new(key_fn),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.partitions.len()
    }

    /// Partition that owns `key`.
    pub fn partition_for(&self, key: u64) -> usize {
        (fxhash::hash64(&key) % self.partitions.len() as u64) as usize
    }

    /// Routes an item to its partition. Blocks while that partition's queue is full.
    pub fn send(&self, item: In) -> Result<(), EngineError> {
        let partition = self.partition_for((self.key_fn)(&item));
        self.partitions[partition]
            .send(Command::Item(item))
            .map_err(|_| EngineError::PartitionClosed(partition))
    }

    /// Next available output, without blocking.
    pub fn try_receive(&self) -> Option<Out> {
        self.output_rx.try_recv().ok()
    }

    pub fn receive_timeout(&self, timeout: Duration) -> Option<Out> {
        self.output_rx.recv_timeout(timeout).ok()
    }

    /// Closes every partition with `policy`, waits for the workers and returns
    /// every output not yet received.
    pub fn shutdown(mut self, policy: ShutdownPolicy) -> Result<Vec<Out>, EngineError> {
        for sender in self.partitions.drain(..) {
            // A worker that already exited surfaces through its join handle below.
            let _ = sender.send(Command::Close(policy));
        }
        let mut result = Ok(());
        for (partition, handle) in self.workers.drain(..).enumerate() {
            if handle.join().is_err() && result.is_ok() {
                result = Err(EngineError::WorkerPanicked(partition));
            }
        }
        result?;
        Ok(self.output_rx.try_iter().collect())
    }
}

impl<In: Pod + Send + 'static, Out: Pod + Send + 'static> Drop for PartitionedEngine<In, Out> {
    fn drop(&mut self) {
        // Dropping the senders ends each worker loop without a flush.
        self.partitions.clear();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_partition<In, Out, S>(partition: usize, mut stage: S, rx: Receiver<Command<In>>, output_tx: Sender<Out>)
where
    In: Pod + Send,
    Out: Pod + Send,
    S: Stage<In, Out>,
{
    let mut emit = |out: Out| {
        // The receiver only goes away when the engine is dropped mid-run.
        let _ = output_tx.send(out);
    };
    while let Ok(command) = rx.recv() {
        match command {
            Command::Item(item) => stage.process(item, &mut emit),
            Command::Close(ShutdownPolicy::Flush) => {
                stage.flush(&mut emit);
                break;
            }
            Command::Close(ShutdownPolicy::Discard) => break,
        }
    }
    debug!("[Engine] Partition {} stopped", partition);
}
