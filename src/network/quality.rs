//! Link quality estimation from peer connection statistics
//!
//! [`QualityEstimator`] turns consecutive stats reports into per-second
//! rates and a discrete [`NetworkQuality`] grade. Rates are always derived
//! from the cumulative counters of the previous report, never accumulated,
//! so a missed tick cannot introduce drift.
//!
//! [`NetworkQualityMonitor`] drives the estimator from a timer while a peer
//! connection is attached and in the connected state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Default sampling period
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Discrete link quality grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    #[default]
    Unknown,
}

impl NetworkQuality {
    /// Band a score: >=80 excellent, >=60 good, >=40 fair, else poor
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 80 => Self::Excellent,
            s if s >= 60 => Self::Good,
            s if s >= 40 => Self::Fair,
            _ => Self::Poor,
        }
    }
}

impl fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Transport state of the peer connection being sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerTransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidatePairState {
    Frozen,
    Waiting,
    InProgress,
    Failed,
    Succeeded,
}

/// Inbound RTP stream counters, as cumulative values
#[derive(Debug, Clone, PartialEq)]
pub struct InboundRtpStats {
    pub kind: MediaKind,
    /// May go negative when duplicates are received
    pub packets_lost: i64,
    /// Seconds
    pub jitter: f64,
    pub bytes_received: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePairStats {
    pub state: CandidatePairState,
    /// Seconds
    pub current_round_trip_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RtcStat {
    InboundRtp(InboundRtpStats),
    CandidatePair(CandidatePairStats),
    Other,
}

/// One statistics report pulled from a peer connection
#[derive(Debug, Clone, PartialEq)]
pub struct StatsReport {
    /// Report time in milliseconds
    pub timestamp_ms: f64,
    pub stats: Vec<RtcStat>,
}

#[derive(Error, Debug, Clone)]
#[error("Stats unavailable: {0}")]
pub struct StatsError(pub String);

/// Live peer connection handle the monitor samples
#[async_trait]
pub trait PeerConnectionStats: Send + Sync + 'static {
    fn transport_state(&self) -> PeerTransportState;

    async fn get_stats(&self) -> Result<StatsReport, StatsError>;
}

/// Derived per-stream metrics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQualityStats {
    /// Cumulative packets lost
    pub packets_lost: i64,
    pub packets_lost_per_second: f64,
    pub jitter_ms: f64,
    pub bandwidth_kbps: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkQualityStats {
    pub quality: NetworkQuality,
    pub audio: StreamQualityStats,
    pub video: StreamQualityStats,
    pub rtt_ms: f64,
    pub total_bandwidth_kbps: f64,
    pub last_update: Option<DateTime<Utc>>,
}

/// The five current-tick metrics that determine quality
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QualityInputs {
    pub audio_loss_rate: f64,
    pub video_loss_rate: f64,
    pub audio_jitter_ms: f64,
    pub video_jitter_ms: f64,
    pub rtt_ms: f64,
}

fn deduction(value: f64, steps: [(f64, i32); 3]) -> i32 {
    steps
        .iter()
        .find(|(threshold, _)| value > *threshold)
        .map(|(_, penalty)| *penalty)
        .unwrap_or(0)
}

/// Score seeded at 100 with threshold deductions. Not clamped.
pub fn quality_score(inputs: &QualityInputs) -> i32 {
    100 - deduction(inputs.audio_loss_rate, [(3.0, 40), (1.0, 20), (0.0, 5)])
        - deduction(inputs.video_loss_rate, [(5.0, 30), (2.0, 15), (0.0, 5)])
        - deduction(inputs.audio_jitter_ms, [(50.0, 25), (30.0, 15), (15.0, 5)])
        - deduction(inputs.video_jitter_ms, [(100.0, 15), (50.0, 10), (30.0, 5)])
        - deduction(inputs.rtt_ms, [(400.0, 25), (200.0, 15), (100.0, 5)])
}

pub fn grade(inputs: &QualityInputs) -> NetworkQuality {
    NetworkQuality::from_score(quality_score(inputs))
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct StreamSample {
    packets_lost: i64,
    bytes_received: u64,
    jitter_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Sample {
    timestamp_ms: f64,
    audio: StreamSample,
    video: StreamSample,
    rtt_ms: f64,
}

impl Sample {
    /// Counters are summed across streams of the same kind; jitter takes
    /// the worst stream.
    fn extract(report: &StatsReport) -> Self {
        let mut sample = Sample {
            timestamp_ms: report.timestamp_ms,
            ..Default::default()
        };
        let mut rtt = None;

        for stat in &report.stats {
            match stat {
                RtcStat::InboundRtp(rtp) => {
                    let stream = match rtp.kind {
                        MediaKind::Audio => &mut sample.audio,
                        MediaKind::Video => &mut sample.video,
                    };
                    stream.packets_lost += rtp.packets_lost;
                    stream.bytes_received += rtp.bytes_received;
                    stream.jitter_ms = stream.jitter_ms.max(rtp.jitter * 1000.0);
                }
                RtcStat::CandidatePair(pair)
                    if rtt.is_none() && pair.state == CandidatePairState::Succeeded =>
                {
                    rtt = Some(pair.current_round_trip_time.unwrap_or(0.0) * 1000.0);
                }
                _ => {}
            }
        }

        sample.rtt_ms = rtt.unwrap_or(0.0);
        sample
    }
}

/// Cumulative counters from the previous tick
#[derive(Debug, Clone, Copy, PartialEq)]
struct PreviousStatsSnapshot {
    timestamp_ms: f64,
    audio_packets_lost: i64,
    video_packets_lost: i64,
    audio_bytes_received: u64,
    video_bytes_received: u64,
}

impl From<&Sample> for PreviousStatsSnapshot {
    fn from(sample: &Sample) -> Self {
        Self {
            timestamp_ms: sample.timestamp_ms,
            audio_packets_lost: sample.audio.packets_lost,
            video_packets_lost: sample.video.packets_lost,
            audio_bytes_received: sample.audio.bytes_received,
            video_bytes_received: sample.video.bytes_received,
        }
    }
}

fn loss_rate(current: i64, previous: i64, elapsed_secs: f64) -> f64 {
    ((current - previous) as f64 / elapsed_secs).max(0.0)
}

fn bandwidth_kbps(current: u64, previous: u64, elapsed_secs: f64) -> f64 {
    let delta = current as f64 - previous as f64;
    delta * 8.0 / elapsed_secs / 1000.0
}

/// Quality grade transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityChange {
    pub from: NetworkQuality,
    pub to: NetworkQuality,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityUpdate {
    pub stats: NetworkQualityStats,
    /// Set only on the tick where the grade changed
    pub changed: Option<QualityChange>,
}

/// Delta-based estimator state
#[derive(Debug, Default)]
pub struct QualityEstimator {
    previous: Option<PreviousStatsSnapshot>,
    last_quality: NetworkQuality,
}

impl QualityEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_quality(&self) -> NetworkQuality {
        self.last_quality
    }

    pub fn has_snapshot(&self) -> bool {
        self.previous.is_some()
    }

    /// Forget the previous snapshot so the next report starts cold
    pub fn reset(&mut self) {
        self.previous = None;
        self.last_quality = NetworkQuality::Unknown;
    }

    /// Ingest one report.
    ///
    /// Returns `None` when the report is not newer than the previous one;
    /// such a tick is skipped and the previous snapshot kept.
    pub fn ingest(&mut self, report: &StatsReport, now: DateTime<Utc>) -> Option<QualityUpdate> {
        let sample = Sample::extract(report);

        let (audio_loss, video_loss, audio_kbps, video_kbps) = match self.previous {
            Some(prev) => {
                let elapsed_secs = (sample.timestamp_ms - prev.timestamp_ms) / 1000.0;
                if elapsed_secs <= 0.0 {
                    trace!("Skipping stats report without elapsed time");
                    return None;
                }
                (
                    loss_rate(
                        sample.audio.packets_lost,
                        prev.audio_packets_lost,
                        elapsed_secs,
                    ),
                    loss_rate(
                        sample.video.packets_lost,
                        prev.video_packets_lost,
                        elapsed_secs,
                    ),
                    bandwidth_kbps(
                        sample.audio.bytes_received,
                        prev.audio_bytes_received,
                        elapsed_secs,
                    ),
                    bandwidth_kbps(
                        sample.video.bytes_received,
                        prev.video_bytes_received,
                        elapsed_secs,
                    ),
                )
            }
            None => (0.0, 0.0, 0.0, 0.0),
        };

        self.previous = Some(PreviousStatsSnapshot::from(&sample));

        let inputs = QualityInputs {
            audio_loss_rate: audio_loss,
            video_loss_rate: video_loss,
            audio_jitter_ms: sample.audio.jitter_ms,
            video_jitter_ms: sample.video.jitter_ms,
            rtt_ms: sample.rtt_ms,
        };
        let quality = grade(&inputs);

        let stats = NetworkQualityStats {
            quality,
            audio: StreamQualityStats {
                packets_lost: sample.audio.packets_lost,
                packets_lost_per_second: audio_loss,
                jitter_ms: sample.audio.jitter_ms,
                bandwidth_kbps: audio_kbps,
            },
            video: StreamQualityStats {
                packets_lost: sample.video.packets_lost,
                packets_lost_per_second: video_loss,
                jitter_ms: sample.video.jitter_ms,
                bandwidth_kbps: video_kbps,
            },
            rtt_ms: sample.rtt_ms,
            total_bandwidth_kbps: audio_kbps + video_kbps,
            last_update: Some(now),
        };

        let changed = (quality != self.last_quality).then(|| QualityChange {
            from: self.last_quality,
            to: quality,
        });
        self.last_quality = quality;

        Some(QualityUpdate { stats, changed })
    }
}

/// Stats callback
pub type StatsCallback = Arc<dyn Fn(&NetworkQualityStats) + Send + Sync + 'static>;

/// Quality transition callback
pub type QualityChangedCallback = Arc<dyn Fn(QualityChange) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No peer connection attached
    Idle,
    Sampling,
}

struct MonitorShared {
    estimator: Mutex<QualityEstimator>,
    latest: Mutex<NetworkQualityStats>,
    on_stats: Mutex<Option<StatsCallback>>,
    on_quality_changed: Mutex<Option<QualityChangedCallback>>,
}

impl MonitorShared {
    /// Forget the previous report and grade
    fn reset(&self) {
        let mut estimator = self.estimator.lock();
        estimator.reset();
        *self.latest.lock() = NetworkQualityStats::default();
    }
}

impl MonitorShared {
    /// One sampling tick. `token` is checked after the stats await so a
    /// stop that raced the tick wins.
    async fn tick(
        &self,
        peer: &dyn PeerConnectionStats,
        token: &CancellationToken,
    ) -> Option<NetworkQualityStats> {
        if peer.transport_state() != PeerTransportState::Connected {
            trace!("Peer connection not connected, skipping quality tick");
            return None;
        }

        let report = match peer.get_stats().await {
            Ok(report) => report,
            Err(e) => {
                debug!("{}", e);
                return None;
            }
        };

        let update = {
            let mut estimator = self.estimator.lock();
            if token.is_cancelled() {
                return None;
            }
            let update = estimator.ingest(&report, Utc::now())?;
            *self.latest.lock() = update.stats.clone();
            update
        };

        trace!(
            "Link quality {} (rtt {:.0}ms, audio loss {:.2}/s, video loss {:.2}/s)",
            update.stats.quality,
            update.stats.rtt_ms,
            update.stats.audio.packets_lost_per_second,
            update.stats.video.packets_lost_per_second
        );

        let on_stats = self.on_stats.lock().clone();
        if let Some(callback) = on_stats {
            callback(&update.stats);
        }
        if let Some(change) = update.changed {
            info!("Link quality changed: {} -> {}", change.from, change.to);
            let on_changed = self.on_quality_changed.lock().clone();
            if let Some(callback) = on_changed {
                callback(change);
            }
        }

        Some(update.stats)
    }
}

struct Sampler {
    peer: Arc<dyn PeerConnectionStats>,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Samples a peer connection on a timer and grades its link quality
pub struct NetworkQualityMonitor {
    period: Duration,
    owner: CancellationToken,
    shared: Arc<MonitorShared>,
    sampler: Mutex<Option<Sampler>>,
}

impl NetworkQualityMonitor {
    pub fn new(period: Duration) -> Self {
        Self::with_owner(period, CancellationToken::new())
    }

    /// Monitor whose timer stops when `owner` is cancelled
    pub fn with_owner(period: Duration, owner: CancellationToken) -> Self {
        Self {
            period,
            owner,
            shared: Arc::new(MonitorShared {
                estimator: Mutex::new(QualityEstimator::new()),
                latest: Mutex::new(NetworkQualityStats::default()),
                on_stats: Mutex::new(None),
                on_quality_changed: Mutex::new(None),
            }),
            sampler: Mutex::new(None),
        }
    }

    /// Set the stats callback. Takes effect from the next tick.
    pub fn on_stats<F>(self, callback: F) -> Self
    where
        F: Fn(&NetworkQualityStats) + Send + Sync + 'static,
    {
        *self.shared.on_stats.lock() = Some(Arc::new(callback));
        self
    }

    /// Set the quality-changed callback. Takes effect from the next tick.
    pub fn on_quality_changed<F>(self, callback: F) -> Self
    where
        F: Fn(QualityChange) + Send + Sync + 'static,
    {
        *self.shared.on_quality_changed.lock() = Some(Arc::new(callback));
        self
    }

    /// Sampling period
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> MonitorState {
        match self.sampler.lock().as_ref() {
            Some(s) if !s.token.is_cancelled() => MonitorState::Sampling,
            _ => MonitorState::Idle,
        }
    }

    /// Most recently emitted stats
    pub fn latest(&self) -> NetworkQualityStats {
        self.shared.latest.lock().clone()
    }

    /// Attach, replace or clear the sampled peer connection.
    ///
    /// Any change stops the current timer and discards the previous
    /// snapshot. Re-attaching the same connection while sampling is a no-op.
    pub fn set_peer_connection(&self, peer: Option<Arc<dyn PeerConnectionStats>>) {
        let mut slot = self.sampler.lock();
        if let (Some(new), Some(current)) = (&peer, slot.as_ref()) {
            if Arc::ptr_eq(new, &current.peer) && !current.token.is_cancelled() {
                return;
            }
        }

        // Dropping the sampler cancels its timer before the snapshot goes
        drop(slot.take());
        self.shared.reset();

        let Some(peer) = peer else {
            return;
        };
        if self.owner.is_cancelled() {
            return;
        }

        let token = self.owner.child_token();
        let shared = self.shared.clone();
        let task_peer = peer.clone();
        let task_token = token.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                shared.tick(task_peer.as_ref(), &task_token).await;
            }
        });

        debug!("Quality monitor sampling every {:?}", period);
        *slot = Some(Sampler {
            peer,
            token,
            handle,
        });
    }

    /// Run one tick immediately against the attached peer connection
    pub async fn sample_now(&self) -> Option<NetworkQualityStats> {
        let (peer, token) = {
            let sampler = self.sampler.lock();
            let s = sampler.as_ref()?;
            (s.peer.clone(), s.token.clone())
        };
        if token.is_cancelled() {
            return None;
        }
        self.shared.tick(peer.as_ref(), &token).await
    }

    /// Stop sampling and discard the previous snapshot
    pub fn stop(&self) {
        drop(self.sampler.lock().take());
        self.shared.reset();
    }
}

impl Drop for NetworkQualityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(packets_lost: i64, bytes_received: u64, jitter: f64) -> RtcStat {
        RtcStat::InboundRtp(InboundRtpStats {
            kind: MediaKind::Audio,
            packets_lost,
            jitter,
            bytes_received,
        })
    }

    fn report(timestamp_ms: f64, stats: Vec<RtcStat>) -> StatsReport {
        StatsReport {
            timestamp_ms,
            stats,
        }
    }

    #[test]
    fn test_score_bands() {
        assert_eq!(NetworkQuality::from_score(100), NetworkQuality::Excellent);
        assert_eq!(NetworkQuality::from_score(80), NetworkQuality::Excellent);
        assert_eq!(NetworkQuality::from_score(79), NetworkQuality::Good);
        assert_eq!(NetworkQuality::from_score(60), NetworkQuality::Good);
        assert_eq!(NetworkQuality::from_score(40), NetworkQuality::Fair);
        assert_eq!(NetworkQuality::from_score(39), NetworkQuality::Poor);
        assert_eq!(NetworkQuality::from_score(-35), NetworkQuality::Poor);
    }

    #[test]
    fn test_score_deductions() {
        let clean = QualityInputs::default();
        assert_eq!(quality_score(&clean), 100);

        let worst = QualityInputs {
            audio_loss_rate: 10.0,
            video_loss_rate: 10.0,
            audio_jitter_ms: 80.0,
            video_jitter_ms: 150.0,
            rtt_ms: 500.0,
        };
        // Not clamped
        assert_eq!(quality_score(&worst), 100 - 40 - 30 - 25 - 15 - 25);

        let boundary = QualityInputs {
            audio_loss_rate: 3.0,
            rtt_ms: 100.0,
            audio_jitter_ms: 15.0,
            ..Default::default()
        };
        // Thresholds are strict: 3.0 is not > 3, 100 is not > 100
        assert_eq!(quality_score(&boundary), 80);
    }

    #[test]
    fn test_first_tick_rates_are_zero() {
        let mut estimator = QualityEstimator::new();
        let update = estimator
            .ingest(&report(1_000.0, vec![audio(500, 1_000_000, 0.0)]), Utc::now())
            .unwrap();

        assert_eq!(update.stats.audio.packets_lost, 500);
        assert_eq!(update.stats.audio.packets_lost_per_second, 0.0);
        assert_eq!(update.stats.audio.bandwidth_kbps, 0.0);
        assert_eq!(update.stats.total_bandwidth_kbps, 0.0);
        assert_eq!(update.stats.quality, NetworkQuality::Excellent);
    }

    #[test]
    fn test_loss_rate_from_deltas() {
        let mut estimator = QualityEstimator::new();
        estimator.ingest(&report(0.0, vec![audio(0, 0, 0.0)]), Utc::now());
        let update = estimator
            .ingest(&report(2_000.0, vec![audio(6, 50_000, 0.0)]), Utc::now())
            .unwrap();

        assert_eq!(update.stats.audio.packets_lost_per_second, 3.0);
        // 50_000 bytes * 8 / 2s / 1000
        assert_eq!(update.stats.audio.bandwidth_kbps, 200.0);
        // 3/s is > 1 but not > 3: -20 -> 80
        assert_eq!(update.stats.quality, NetworkQuality::Excellent);

        // Add RTT > 100 for another -5 -> 75
        let update = estimator
            .ingest(
                &report(
                    4_000.0,
                    vec![
                        audio(12, 100_000, 0.0),
                        RtcStat::CandidatePair(CandidatePairStats {
                            state: CandidatePairState::Succeeded,
                            current_round_trip_time: Some(0.150),
                        }),
                    ],
                ),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(update.stats.rtt_ms, 150.0);
        assert_eq!(update.stats.quality, NetworkQuality::Good);
    }

    #[test]
    fn test_negative_loss_delta_clamped() {
        let mut estimator = QualityEstimator::new();
        estimator.ingest(&report(0.0, vec![audio(10, 0, 0.0)]), Utc::now());
        let update = estimator
            .ingest(&report(1_000.0, vec![audio(8, 0, 0.0)]), Utc::now())
            .unwrap();
        assert_eq!(update.stats.audio.packets_lost_per_second, 0.0);
    }

    #[test]
    fn test_jitter_in_milliseconds() {
        let mut estimator = QualityEstimator::new();
        let update = estimator
            .ingest(&report(0.0, vec![audio(0, 0, 0.035)]), Utc::now())
            .unwrap();
        assert!((update.stats.audio.jitter_ms - 35.0).abs() < 1e-9);
        // 35ms audio jitter: -15
        assert_eq!(update.stats.quality, NetworkQuality::Excellent);
    }

    #[test]
    fn test_rtt_from_first_succeeded_pair() {
        let pair = |state, rtt| {
            RtcStat::CandidatePair(CandidatePairStats {
                state,
                current_round_trip_time: Some(rtt),
            })
        };
        let sample = Sample::extract(&report(
            0.0,
            vec![
                pair(CandidatePairState::InProgress, 0.9),
                pair(CandidatePairState::Succeeded, 0.25),
                pair(CandidatePairState::Succeeded, 0.5),
            ],
        ));
        assert_eq!(sample.rtt_ms, 250.0);
    }

    #[test]
    fn test_duplicate_timestamp_skips_tick() {
        let mut estimator = QualityEstimator::new();
        estimator.ingest(&report(1_000.0, vec![audio(0, 0, 0.0)]), Utc::now());
        assert!(estimator
            .ingest(&report(1_000.0, vec![audio(50, 0, 0.0)]), Utc::now())
            .is_none());

        // Previous snapshot kept: the next rate spans the full 1s
        let update = estimator
            .ingest(&report(2_000.0, vec![audio(2, 0, 0.0)]), Utc::now())
            .unwrap();
        assert_eq!(update.stats.audio.packets_lost_per_second, 2.0);
    }

    #[test]
    fn test_change_reported_once_per_transition() {
        let mut estimator = QualityEstimator::new();
        let mut changes = Vec::new();
        let rtt = RtcStat::CandidatePair(CandidatePairStats {
            state: CandidatePairState::Succeeded,
            current_round_trip_time: Some(0.250),
        });

        // 35ms jitter (-15) and 250ms rtt (-15) -> 70, good on every tick
        for tick in 0..5 {
            let update = estimator
                .ingest(
                    &report(tick as f64 * 1_000.0, vec![audio(0, 0, 0.035), rtt.clone()]),
                    Utc::now(),
                )
                .unwrap();
            assert_eq!(update.stats.quality, NetworkQuality::Good);
            changes.extend(update.changed);
        }

        // 40 lost/s (-40), 200ms jitter (-25), rtt (-15) -> 20, poor
        let update = estimator
            .ingest(&report(5_000.0, vec![audio(40, 0, 0.2), rtt]), Utc::now())
            .unwrap();
        assert_eq!(update.stats.quality, NetworkQuality::Poor);
        changes.extend(update.changed);

        assert_eq!(
            changes,
            vec![
                QualityChange {
                    from: NetworkQuality::Unknown,
                    to: NetworkQuality::Good,
                },
                QualityChange {
                    from: NetworkQuality::Good,
                    to: NetworkQuality::Poor,
                },
            ]
        );
    }

    #[test]
    fn test_reset_starts_cold() {
        let mut estimator = QualityEstimator::new();
        estimator.ingest(&report(0.0, vec![audio(0, 0, 0.0)]), Utc::now());
        estimator.reset();
        assert!(!estimator.has_snapshot());

        let update = estimator
            .ingest(&report(600_000.0, vec![audio(9_000, 0, 0.0)]), Utc::now())
            .unwrap();
        assert_eq!(update.stats.audio.packets_lost_per_second, 0.0);
    }
}
