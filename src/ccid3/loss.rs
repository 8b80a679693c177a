//! 丢失区间追踪器。
//! The loss-interval tracker.
//!
//! A loss interval runs from the first loss of one loss event to the
//! first loss of the next. The most recent interval is "open" and keeps
//! growing; losses within one roundtrip of the open event's start belong
//! to the same event. The weighted average over recent intervals yields
//! the inverse loss event rate of RFC 5348 §5.4.

use std::collections::VecDeque;

use tracing::debug;

use crate::packet::options::{
    CcOption, LossIntervalSpec, LossIntervals, MAX_LOSS_INTERVALS,
};
use crate::packet::FeedforwardHeader;

use super::UNKNOWN_LOSS_EVENT_RATE_INV;

/// TFRC weights for the most recent intervals, newest first.
const WEIGHTS: [f64; 8] = [1.0, 1.0, 1.0, 1.0, 0.8, 0.6, 0.4, 0.2];

#[derive(Debug, Clone)]
struct LossInterval {
    /// First sequence number of the interval.
    start_seq: i64,
    /// Time the interval's loss event was detected; zero for the initial
    /// lossless run.
    event_time: i64,
    /// Packets lost in the interval's loss burst.
    lost: u32,
    /// Total packets in the interval so far (lost plus received).
    length: u32,
    /// Data-bearing packets received in the interval.
    data: u32,
}

#[derive(Debug)]
pub(super) struct LossTracker {
    /// Highest sequence number accounted for; zero until the first packet.
    last_seq: i64,
    /// Oldest interval at the front; the open interval at the back.
    intervals: VecDeque<LossInterval>,
}

impl LossTracker {
    pub(super) fn new() -> Self {
        Self {
            last_seq: 0,
            intervals: VecDeque::new(),
        }
    }

    /// Accounts for a received packet, detecting sequence gaps and
    /// grouping them into loss events bounded by `rtt`.
    /// 记录一个已接收包，检测序号间隙并按 `rtt` 将其归组为丢失事件。
    pub(super) fn on_read(&mut self, ff: &FeedforwardHeader, rtt: i64) {
        let seq = ff.seq_no;
        let data = ff.ptype.has_data() as u32;

        if self.intervals.is_empty() {
            // The initial lossless run is tracked as interval zero so the
            // very first loss event closes a real interval behind it.
            self.intervals.push_back(LossInterval {
                start_seq: seq,
                event_time: 0,
                lost: 0,
                length: 1,
                data,
            });
            self.last_seq = seq;
            return;
        }

        if seq <= self.last_seq {
            self.repair(seq, data);
            return;
        }

        let gap = seq - self.last_seq - 1;
        self.last_seq = seq;

        if gap == 0 {
            if let Some(open) = self.intervals.back_mut() {
                open.length += 1;
                open.data += data;
            }
            return;
        }

        let same_event = self
            .intervals
            .back()
            .map(|open| open.lost > 0 && ff.time - open.event_time < rtt)
            .unwrap_or(false);

        if same_event {
            if let Some(open) = self.intervals.back_mut() {
                open.lost += gap as u32;
                open.length += gap as u32 + 1;
                open.data += data;
            }
        } else {
            debug!(
                first_lost = seq - gap,
                lost = gap,
                "new loss event detected"
            );
            self.intervals.push_back(LossInterval {
                start_seq: seq - gap,
                event_time: ff.time,
                lost: gap as u32,
                length: gap as u32 + 1,
                data,
            });
            while self.intervals.len() > MAX_LOSS_INTERVALS {
                self.intervals.pop_front();
            }
        }
    }

    /// A late arrival that falls inside the open event's loss run means
    /// the packet was reordered, not lost. Duplicates of received packets
    /// are indistinguishable here and would over-repair; the arrival
    /// window is assumed duplicate-free.
    fn repair(&mut self, seq: i64, data: u32) {
        if let Some(open) = self.intervals.back_mut() {
            if open.lost > 0 && seq >= open.start_seq {
                open.lost -= 1;
                open.data += data;
            }
        }
    }

    /// The inverse loss event rate: the weighted mean interval length over
    /// the most recent completed intervals, including the open interval
    /// when that raises the mean. Returns the unknown sentinel until an
    /// interval has completed.
    /// 逆丢失事件率：最近已完成区间长度的加权平均，当开放区间能抬高均值时将其计入。
    /// 在有区间完成之前返回未知哨兵值。
    pub(super) fn loss_event_rate_inv(&self) -> u32 {
        if self.intervals.len() < 2 {
            return UNKNOWN_LOSS_EVENT_RATE_INV;
        }

        // Newest first; index 0 is the open interval.
        let lengths: Vec<f64> = self
            .intervals
            .iter()
            .rev()
            .take(WEIGHTS.len() + 1)
            .map(|iv| iv.length as f64)
            .collect();

        let weighted = |values: &[f64]| -> f64 {
            let mut total = 0.0;
            let mut weight = 0.0;
            for (v, w) in values.iter().zip(WEIGHTS.iter()) {
                total += v * w;
                weight += w;
            }
            total / weight
        };

        // With the open interval and without it; history discounting picks
        // the larger mean.
        let with_open = weighted(&lengths);
        let without_open = weighted(&lengths[1..]);
        let mean = with_open.max(without_open);

        (mean.round() as u32).max(1)
    }

    /// Encodes the most recent intervals, newest first, for the
    /// LossIntervals feedback option.
    /// 为LossIntervals反馈选项编码最近的区间，最新在前。
    pub(super) fn loss_intervals_option(&self, ack_no: i64) -> CcOption {
        let skip_length = (ack_no - self.last_seq).clamp(0, u8::MAX as i64) as u8;
        let intervals = self
            .intervals
            .iter()
            .rev()
            .take(MAX_LOSS_INTERVALS)
            .map(|iv| LossIntervalSpec {
                lossless_length: iv.length - iv.lost,
                loss_length: iv.lost,
                data_length: iv.data,
            })
            .collect();
        CcOption::LossIntervals(LossIntervals {
            skip_length,
            intervals,
        })
    }
}
