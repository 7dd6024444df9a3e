use crate::db::InfluxClient;
use crate::errors::Result;
use crate::model::Point;
use tokio::time::Instant;
use tracing::{debug, info};

/// Buffers points and writes them to InfluxDB in batches of `max_batch`.
pub struct Batcher {
    client: InfluxClient,
    buffer: Vec<Point>,
    max_batch: usize,
    written: usize,
}

impl Batcher {
    pub fn new(client: InfluxClient, max_batch: usize) -> Self {
        let max_batch = max_batch.max(1);
        info!("Starting batcher with max_batch={}", max_batch);

        Self {
            client,
            buffer: Vec::with_capacity(max_batch),
            max_batch,
            written: 0,
        }
    }

    /// Buffers a point without writing anything.
    pub fn queue(&mut self, point: Point) {
        self.buffer.push(point);
    }

    /// Queues a point and flushes once the buffer is full.
    pub async fn push(&mut self, point: Point) -> Result<()> {
        self.queue(point);

        if self.is_full() {
            self.flush().await?;
        }
        Ok(())
    }

    pub async fn extend(&mut self, points: impl IntoIterator<Item = Point>) -> Result<()> {
        for point in points {
            self.push(point).await?;
        }
        Ok(())
    }

    /// Writes whatever is buffered. The buffer is emptied even when the
    /// write fails; a rejected batch is not retried.
    pub async fn flush(&mut self) -> Result<()> {
        let batch = std::mem::take(&mut self.buffer);
        let batch_len = batch.len();
        if batch_len == 0 {
            return Ok(());
        }

        debug!("Flushing batch of {} points", batch_len);
        let start = Instant::now();

        self.written += self.client.write(&batch).await?;

        debug!(
            "Batch written successfully in {:.3}s",
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.max_batch
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Points accepted by InfluxDB so far. Points dropped while encoding
    /// are not counted.
    pub fn written(&self) -> usize {
        self.written
    }
}
