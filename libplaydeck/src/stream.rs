//! Log delivery. The execution backend hands out log records in arbitrary
//! batches over some transport; a [`LogSource`] yields them to the console
//! until the execution reaches a terminal status.

use async_trait::async_trait;
use color_eyre::eyre::{Result, WrapErr};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::log::*;
use crate::logs::{IngestReport, LogConsole};

/// Raw records as they come off the wire. Each is decoded individually so
/// one malformed record cannot poison a batch.
pub type Records = Vec<Value>;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PartialLogStream {
    Next(Records),
    End,
}

#[async_trait]
pub trait LogSink: std::fmt::Debug + Send {
    async fn sink(&mut self, logs: PartialLogStream) -> Result<usize>;
}

#[async_trait]
pub trait LogSource: std::fmt::Debug + Send {
    async fn source(&mut self) -> Result<PartialLogStream>;
}

pub type ChannelLogTx = mpsc::Sender<PartialLogStream>;
pub type ChannelLogRx = mpsc::Receiver<PartialLogStream>;

/// Push side of an in-process log channel.
#[derive(Debug, Clone)]
pub struct ChannelLogSink {
    tx: ChannelLogTx,
}

impl ChannelLogSink {
    pub fn new(tx: ChannelLogTx) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl LogSink for ChannelLogSink {
    #[tracing::instrument(skip_all)]
    async fn sink(&mut self, logs: PartialLogStream) -> Result<usize> {
        let out = match logs {
            PartialLogStream::Next(ref records) => records.len(),
            PartialLogStream::End => 0,
        };
        self.tx.send(logs).await.wrap_err("failed sending logs")?;
        Ok(out)
    }
}

/// Pull side of an in-process log channel. Waits for the next batch; once
/// `End` has been seen every further call fails.
#[derive(Debug)]
pub struct ChannelLogSource {
    rx: ChannelLogRx,
    ended: bool,
}

impl ChannelLogSource {
    pub fn new(rx: ChannelLogRx) -> Self {
        Self { rx, ended: false }
    }
}

pub fn channel(capacity: usize) -> (ChannelLogSink, ChannelLogSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelLogSink::new(tx), ChannelLogSource::new(rx))
}

#[async_trait]
impl LogSource for ChannelLogSource {
    #[tracing::instrument(skip_all)]
    async fn source(&mut self) -> Result<PartialLogStream> {
        if self.ended {
            return Err(eyre!("log source already ended"));
        }
        match self.rx.recv().await {
            Some(PartialLogStream::End) => {
                self.ended = true;
                Ok(PartialLogStream::End)
            }
            Some(next) => Ok(next),
            None => Err(eyre!("log sink lost")),
        }
    }
}

/// Feed every batch from `source` into `console` until the stream ends.
/// Returns the combined ingest report.
#[tracing::instrument(skip_all)]
pub async fn drain(source: &mut dyn LogSource, console: &mut LogConsole) -> Result<IngestReport> {
    let mut total = IngestReport::default();
    loop {
        match source.source().await? {
            PartialLogStream::Next(records) => {
                let report = console.ingest_batch(records);
                total.accepted += report.accepted;
                total.rejected.extend(report.rejected);
            }
            PartialLogStream::End => break,
        }
    }
    debug!(
        "log stream drained: {} accepted, {} rejected",
        total.accepted,
        total.rejected.len()
    );
    Ok(total)
}
