//! A line-delimited-JSON `EventLog` reading from standard input. The
//! default binary's `stream` mode runs against this in the absence of a
//! wired broker client (see `SPEC_FULL.md` §9) — each line is one
//! `RawEvent`'s JSON, offsets are a monotonic per-process counter, and
//! `commit` only logs (there is no durable cursor to persist to stdin).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::error::PipelineError;

use super::{EventLog, LogMessage};

pub struct StdinEventLog {
    lines: Lines<BufReader<Stdin>>,
    next_offset: i64,
}

impl StdinEventLog {
    pub fn new() -> Self {
        StdinEventLog {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            next_offset: 0,
        }
    }
}

impl Default for StdinEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLog for StdinEventLog {
    async fn poll(
        &mut self,
        max_records: usize,
        timeout: Duration,
    ) -> Result<Vec<LogMessage>, PipelineError> {
        let mut batch = Vec::new();
        while batch.len() < max_records {
            let next_line = tokio::time::timeout(timeout, self.lines.next_line());
            match next_line.await {
                Ok(Ok(Some(line))) if !line.trim().is_empty() => {
                    batch.push(LogMessage {
                        partition: 0,
                        offset: self.next_offset,
                        value: line.into_bytes(),
                    });
                    self.next_offset += 1;
                }
                Ok(Ok(Some(_))) => continue,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    return Err(PipelineError::TransientStore {
                        message: e.to_string(),
                    })
                }
                Err(_timed_out) => break,
            }
        }
        Ok(batch)
    }

    async fn commit(&mut self, offsets: &HashMap<i32, i64>) -> Result<(), PipelineError> {
        tracing::debug!(?offsets, "stdin log has no durable cursor to commit to");
        Ok(())
    }
}
