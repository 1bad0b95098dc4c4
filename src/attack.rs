// File: attack.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Single-packet synchronization over HTTP/3.
//!
//! Every request of a plan is sent on its own stream except for the last few
//! body bytes. After a short pause all withheld tails are flushed back to
//! back, so the server completes every request at nearly the same moment.

use futures::future::join_all;
use http::Method;
use log::{debug, info, trace, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AttackConfig;
use crate::error::{RaceError, RaceResult};
use crate::frame::hex_preview;
use crate::qpack::{HeaderCodec, StaticQpack};
use crate::request::{Request, RequestFramer};
use crate::response::{Response, ResponseReader};
use crate::splitter::{split, SplitPayload};
use crate::transport::{Connection, Stream};

#[derive(Debug, Clone)]
pub struct AttackPlan {
    requests: Vec<Request>,
    tail_bytes: usize,
    sync_delay: Duration,
}

impl AttackPlan {
    pub fn new(requests: Vec<Request>, tail_bytes: usize, sync_delay: Duration) -> Self {
        Self {
            requests,
            tail_bytes,
            sync_delay,
        }
    }

    pub fn from_config(requests: Vec<Request>, config: &AttackConfig) -> Self {
        Self::new(requests, config.tail_bytes(), config.sync_delay())
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn tail_bytes(&self) -> usize {
        self.tail_bytes
    }

    pub fn sync_delay(&self) -> Duration {
        self.sync_delay
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Open,
    Head,
    Tail,
    /// Full payload write of a baseline run.
    Send,
    Read,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Head => "head",
            Self::Tail => "tail",
            Self::Send => "send",
            Self::Read => "read",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct StreamFailure {
    pub stage: FailureStage,
    /// `None` when no stream could be opened.
    pub stream_id: Option<u64>,
    pub error: RaceError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncTimings {
    pub head_phase: Duration,
    pub sleep: Duration,
    pub tail_phase: Duration,
    /// First to last completed tail write.
    pub tail_spread: Duration,
}

#[derive(Debug, Default)]
pub struct AttackOutcome {
    pub responses: BTreeMap<usize, Response>,
    pub failures: BTreeMap<usize, StreamFailure>,
    pub timings: SyncTimings,
}

impl AttackOutcome {
    pub fn total(&self) -> usize {
        self.responses.len() + self.failures.len()
    }
}

/// A request that made it onto the wire and is waiting for its tail or its
/// response.
struct StreamRecord {
    index: usize,
    stream: Box<dyn Stream>,
    tail: Vec<u8>,
    expects_body: bool,
}

pub struct AttackOrchestrator {
    connection: Arc<dyn Connection>,
    framer: RequestFramer,
    reader: ResponseReader,
    read_timeout: Option<Duration>,
    concurrent_tails: bool,
}

impl AttackOrchestrator {
    pub fn new(connection: Arc<dyn Connection>, config: &AttackConfig) -> Self {
        Self::with_codec(connection, Arc::new(StaticQpack::new()), config)
    }

    pub fn with_codec(
        connection: Arc<dyn Connection>,
        codec: Arc<dyn HeaderCodec>,
        config: &AttackConfig,
    ) -> Self {
        let mut framer = RequestFramer::new(Arc::clone(&codec), config.request_gzip());
        framer.set_user_agent(config.user_agent().to_string());
        Self {
            connection,
            framer,
            reader: ResponseReader::new(codec, config.request_gzip()),
            read_timeout: config.read_timeout(),
            concurrent_tails: config.concurrent_tails(),
        }
    }

    /// Runs the synchronized attack. Only an invalid plan is returned as an
    /// error; per-stream problems end up in [`AttackOutcome::failures`].
    pub async fn run(&self, plan: &AttackPlan) -> RaceResult<AttackOutcome> {
        let splits = self.prepare(plan)?;
        info!(
            "Racing {} requests, {} byte tails, {}ms sync delay",
            splits.len(),
            plan.tail_bytes(),
            plan.sync_delay().as_millis()
        );

        let mut failures = BTreeMap::new();
        let mut records = Vec::with_capacity(splits.len());

        let head_start = Instant::now();
        for (index, (req, payload)) in plan.requests().iter().zip(splits).enumerate() {
            let mut stream = match self.connection.open_bidirectional_stream().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Request {}: could not open stream: {}", index, e);
                    failures.insert(index, failure(FailureStage::Open, None, e));
                    continue;
                }
            };
            let stream_id = stream.id();
            trace!("stream {}: head {}", stream_id, hex_preview(&payload.head, 48));
            if let Err(e) = stream.write_all(&payload.head).await {
                warn!("Request {} (stream {}): head write failed: {}", index, stream_id, e);
                failures.insert(
                    index,
                    failure(FailureStage::Head, Some(stream_id), RaceError::Write(e)),
                );
                continue;
            }
            records.push(StreamRecord {
                index,
                stream,
                tail: payload.tail,
                expects_body: req.method() != Method::HEAD,
            });
        }
        let head_phase = head_start.elapsed();
        debug!("{} heads written in {:?}", records.len(), head_phase);

        let sleep_start = Instant::now();
        tokio::time::sleep(plan.sync_delay()).await;
        let sleep = sleep_start.elapsed();

        let tail_start = Instant::now();
        let written = if self.concurrent_tails {
            join_all(records.iter_mut().map(write_tail)).await
        } else {
            let mut written = Vec::with_capacity(records.len());
            for record in records.iter_mut() {
                written.push(write_tail(record).await);
            }
            written
        };
        let tail_phase = tail_start.elapsed();

        let mut first_done: Option<Instant> = None;
        let mut last_done: Option<Instant> = None;
        for (index, stream_id, result) in written {
            match result {
                Ok(done) => {
                    first_done = Some(first_done.map_or(done, |t| t.min(done)));
                    last_done = Some(last_done.map_or(done, |t| t.max(done)));
                }
                Err(e) => {
                    warn!("Request {} (stream {}): tail write failed: {}", index, stream_id, e);
                    failures.insert(
                        index,
                        failure(FailureStage::Tail, Some(stream_id), RaceError::Write(e)),
                    );
                }
            }
        }
        records.retain(|record| !failures.contains_key(&record.index));

        let timings = SyncTimings {
            head_phase,
            sleep,
            tail_phase,
            tail_spread: match (first_done, last_done) {
                (Some(first), Some(last)) => last.duration_since(first),
                _ => Duration::ZERO,
            },
        };
        info!(
            "Released {} tails in {:?} (spread {:?})",
            records.len(),
            timings.tail_phase,
            timings.tail_spread
        );

        close_all(&mut records).await;
        let mut outcome = self.collect(records).await;
        outcome.failures.extend(failures);
        outcome.timings = timings;
        Ok(outcome)
    }

    /// Sends every request unsplit and without delay, for comparison with a
    /// synchronized run.
    pub async fn run_baseline(&self, plan: &AttackPlan) -> RaceResult<AttackOutcome> {
        if plan.requests().is_empty() {
            return Err(RaceError::InvalidPlan("no requests".to_string()));
        }
        let payloads = plan
            .requests()
            .iter()
            .map(|req| self.framer.full_payload(req))
            .collect::<RaceResult<Vec<_>>>()?;
        info!("Baseline: sending {} requests unsplit", payloads.len());

        let mut failures = BTreeMap::new();
        let mut records = Vec::with_capacity(payloads.len());
        let start = Instant::now();
        for (index, (req, payload)) in plan.requests().iter().zip(payloads).enumerate() {
            let mut stream = match self.connection.open_bidirectional_stream().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Request {}: could not open stream: {}", index, e);
                    failures.insert(index, failure(FailureStage::Open, None, e));
                    continue;
                }
            };
            if let Err(e) = stream.write_all(&payload).await {
                let stream_id = stream.id();
                warn!("Request {} (stream {}): write failed: {}", index, stream_id, e);
                failures.insert(
                    index,
                    failure(FailureStage::Send, Some(stream_id), RaceError::Write(e)),
                );
                continue;
            }
            records.push(StreamRecord {
                index,
                stream,
                tail: Vec::new(),
                expects_body: req.method() != Method::HEAD,
            });
        }
        let send_phase = start.elapsed();

        close_all(&mut records).await;
        let mut outcome = self.collect(records).await;
        outcome.failures.extend(failures);
        outcome.timings = SyncTimings {
            head_phase: send_phase,
            ..SyncTimings::default()
        };
        Ok(outcome)
    }

    /// Computes every split before any stream is touched.
    fn prepare(&self, plan: &AttackPlan) -> RaceResult<Vec<SplitPayload>> {
        if plan.requests().is_empty() {
            return Err(RaceError::InvalidPlan("no requests".to_string()));
        }
        plan.requests()
            .iter()
            .map(|req| split(&self.framer, req, plan.tail_bytes()))
            .collect()
    }

    /// Reads all responses concurrently.
    async fn collect(&self, records: Vec<StreamRecord>) -> AttackOutcome {
        let reads = records.into_iter().map(|record| async move {
            let stream_id = record.stream.id();
            let result = self.read_response(record.stream, record.expects_body).await;
            (record.index, stream_id, result)
        });

        let mut outcome = AttackOutcome::default();
        for (index, stream_id, result) in join_all(reads).await {
            match result {
                Ok(response) => {
                    debug!(
                        "Request {} (stream {}): {}",
                        index,
                        stream_id,
                        response.status()
                    );
                    outcome.responses.insert(index, response);
                }
                Err(e) => {
                    warn!("Request {} (stream {}): {}", index, stream_id, e);
                    outcome
                        .failures
                        .insert(index, failure(FailureStage::Read, Some(stream_id), e));
                }
            }
        }
        outcome
    }

    /// Reads the response head and then buffers the body. The deadline
    /// covers both; a body that fails or runs out of time is kept on the
    /// response as [`Response::body_error`].
    async fn read_response(
        &self,
        stream: Box<dyn Stream>,
        expects_body: bool,
    ) -> RaceResult<Response> {
        let started = Instant::now();
        let stream_id = stream.id();
        let head = self.reader.read(stream);
        let mut response = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, head)
                .await
                .map_err(|_| RaceError::Timeout(limit))??,
            None => head.await?,
        };
        if !expects_body {
            return Ok(response);
        }

        let fill = response.body_mut().fill();
        let filled = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit.saturating_sub(started.elapsed()), fill)
                .await
                .unwrap_or(Err(RaceError::Timeout(limit))),
            None => fill.await,
        };
        if let Err(e) = filled {
            warn!("stream {}: body incomplete: {}", stream_id, e);
            response.set_body_error(e);
        }
        Ok(response)
    }
}

fn failure(stage: FailureStage, stream_id: Option<u64>, error: RaceError) -> StreamFailure {
    StreamFailure {
        stage,
        stream_id,
        error,
    }
}

async fn write_tail(record: &mut StreamRecord) -> (usize, u64, std::io::Result<Instant>) {
    let stream_id = record.stream.id();
    let result = record
        .stream
        .write_all(&record.tail)
        .await
        .map(|()| Instant::now());
    (record.index, stream_id, result)
}

/// Half-closes every stream. A failed close is logged and the request stays
/// in the run.
async fn close_all(records: &mut [StreamRecord]) {
    for record in records.iter_mut() {
        if let Err(e) = record.stream.close().await {
            warn!(
                "Request {} (stream {}): close failed: {}",
                record.index,
                record.stream.id(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::scripted::ScriptedStream;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Hands out scripted streams that answer every request with 200.
    struct OkConnection {
        opened: Mutex<u64>,
    }

    #[async_trait]
    impl Connection for OkConnection {
        async fn open_bidirectional_stream(&self) -> RaceResult<Box<dyn Stream>> {
            let mut opened = self.opened.lock().unwrap();
            let block = StaticQpack::new()
                .compress(&[crate::qpack::HeaderField::new(":status", "200")])
                .unwrap();
            let mut stream =
                ScriptedStream::new(crate::frame::write_headers_frame(&block).unwrap());
            stream.id = *opened * 4;
            *opened += 1;
            Ok(Box::new(stream))
        }
    }

    fn orchestrator() -> (Arc<OkConnection>, AttackOrchestrator) {
        let connection = Arc::new(OkConnection {
            opened: Mutex::new(0),
        });
        let orchestrator = AttackOrchestrator::new(connection.clone(), &AttackConfig::new());
        (connection, orchestrator)
    }

    fn post() -> Request {
        Request::new("POST", "https://lab.example/claim")
            .unwrap()
            .with_body(&b"id=1"[..])
    }

    #[tokio::test]
    async fn test_empty_plan_rejected() {
        let (connection, orchestrator) = orchestrator();
        let plan = AttackPlan::new(Vec::new(), 1, Duration::ZERO);
        assert!(matches!(
            orchestrator.run(&plan).await,
            Err(RaceError::InvalidPlan(_))
        ));
        assert!(matches!(
            orchestrator.run_baseline(&plan).await,
            Err(RaceError::InvalidPlan(_))
        ));
        assert_eq!(*connection.opened.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_collects_by_plan_index() {
        let (connection, orchestrator) = orchestrator();
        let plan = AttackPlan::new(vec![post(), post()], 1, Duration::from_millis(5));
        let outcome = orchestrator.run(&plan).await.unwrap();
        assert_eq!(outcome.total(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.responses[&0].stream_id(), 0);
        assert_eq!(outcome.responses[&1].stream_id(), 4);
        assert!(outcome.timings.sleep >= Duration::from_millis(5));
        assert_eq!(*connection.opened.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_baseline_has_no_sleep() {
        let (_, orchestrator) = orchestrator();
        let plan = AttackPlan::new(vec![post()], 1, Duration::from_secs(60));
        let outcome = orchestrator.run_baseline(&plan).await.unwrap();
        assert_eq!(outcome.responses.len(), 1);
        assert_eq!(outcome.timings.sleep, Duration::ZERO);
    }

    #[test]
    fn test_failure_stage_display() {
        assert_eq!(FailureStage::Tail.to_string(), "tail");
        assert_eq!(FailureStage::Read.to_string(), "read");
    }
}
