//! CCID3接收端：TFRC反馈生成引擎。
//! The CCID3 receiver: the TFRC feedback-generation engine.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::cc::{CcSignal, ReceiverCongestionControl};
use crate::packet::options::{encode_option, ten_micro_from_ns, CcOption, RawOption};
use crate::packet::{FeedforwardHeader, PreHeader};

use super::loss::LossTracker;
use super::rate::RateCalculator;
use super::rtt::RoundtripEstimator;
use super::{diff_window_counter, CCID3, UNKNOWN_LOSS_EVENT_RATE_INV};

/// The receiver half-connection congestion control.
///
/// All state lives behind a single leaf mutex, so `on_read` and `on_write`
/// calls are serialized and the transitions below are linearizable. The
/// connection drives every call and never holds its own lock while doing
/// so.
///
/// 接收端半连接拥塞控制。
///
/// 所有状态位于单个叶子互斥锁之后，因此 `on_read` 与 `on_write` 调用被串行化，
/// 下述状态转换是可线性化的。连接驱动每次调用，且调用时绝不持有自身的锁。
pub struct Receiver {
    fallback_rtt: i64,
    inner: Mutex<Inner>,
}

struct Inner {
    /// Whether the congestion control is active.
    open: bool,

    /// Timestamp of the last call to `on_write`.
    last_write: i64,
    /// Timestamp of the last `on_write` with an Ack-bearing packet type.
    last_ack: i64,
    /// True if data packets have been received since the last Ack.
    data_since_ack: bool,
    /// The inverse loss event rate sent in the last Ack packet.
    last_loss_event_rate_inv: u32,

    /// Greatest sequence number received, and its reception time. Used to
    /// compute ElapsedTime options.
    gsr: i64,
    gsr_timestamp: i64,

    /// The greatest received window counter at the time the last feedback
    /// was sent, and the counter of the latest received data packet.
    last_ccval: i8,
    latest_ccval: i8,

    rtt: RoundtripEstimator,
    rate: RateCalculator,
    loss: LossTracker,
}

impl Inner {
    fn fresh(fallback_rtt: i64, open: bool) -> Self {
        Self {
            open,
            last_write: 0,
            last_ack: 0,
            data_since_ack: false,
            last_loss_event_rate_inv: UNKNOWN_LOSS_EVENT_RATE_INV,
            gsr: 0,
            gsr_timestamp: 0,
            last_ccval: 0,
            latest_ccval: 0,
            rtt: RoundtripEstimator::new(fallback_rtt),
            rate: RateCalculator::new(),
            loss: LossTracker::new(),
        }
    }
}

impl Receiver {
    /// Creates an inactive receiver; `open` activates it.
    /// 创建一个未激活的接收端；`open` 将其激活。
    pub fn new(fallback_rtt: i64) -> Self {
        Self {
            fallback_rtt,
            inner: Mutex::new(Inner::fresh(fallback_rtt, false)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned CC mutex means a panic mid-update; the state is a
        // plain-old-data record, so continuing with it is sound.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ReceiverCongestionControl for Receiver {
    fn id(&self) -> u8 {
        CCID3
    }

    /// Activates the congestion control. Calling this on an already-open
    /// receiver is a programming error and panics.
    fn open(&self) {
        let mut r = self.lock();
        if r.open {
            panic!("opening an open ccid3 receiver");
        }
        *r = Inner::fresh(self.fallback_rtt, true);
    }

    fn on_write(&self, ph: &PreHeader) -> Vec<RawOption> {
        let mut r = self.lock();
        let (rtt, _) = r.rtt.rtt(ph.time);

        r.last_write = ph.time;
        if !r.open {
            return vec![];
        }

        if !matches!(
            ph.ptype,
            crate::packet::PacketType::Ack | crate::packet::PacketType::DataAck
        ) {
            return vec![];
        }

        // Record the Ack write separately from writes in general.
        r.last_ack = ph.time;
        r.data_since_ack = false;
        r.last_loss_event_rate_inv = r.loss.loss_event_rate_inv();
        r.last_ccval = r.latest_ccval;
        r.rtt.record_ack_sent(ph.time);

        // Prepare feedback options, if we have seen packets before.
        if r.gsr == 0 {
            debug!("feedback before any packet was received, no options placed");
            return vec![];
        }
        if ph.ack_no != r.gsr {
            panic!(
                "ccid3 receiver: ack_no {} != gsr {}",
                ph.ack_no, r.gsr
            );
        }

        let elapsed = CcOption::ElapsedTime(ten_micro_from_ns(ph.time - r.gsr_timestamp));
        let receive_rate = r.rate.flush(rtt, ph.time);
        let loss_intervals = r.loss.loss_intervals_option(ph.ack_no);

        let mut opts = Vec::with_capacity(3);
        for typed in [&elapsed, &receive_rate, &loss_intervals] {
            match encode_option(typed) {
                Some(raw) => opts.push(raw),
                None => warn!(?typed, "feedback option failed to encode"),
            }
        }
        debug!(count = opts.len(), "placed receiver feedback options");
        opts
    }

    fn on_read(&self, ff: &FeedforwardHeader) -> Option<CcSignal> {
        let mut r = self.lock();
        if !r.open {
            return None;
        }

        // Linear, not circular, comparison; 48-bit sequence wraparound is
        // not tracked.
        if ff.seq_no > r.gsr {
            r.gsr = ff.seq_no;
            r.gsr_timestamp = ff.time;
        }

        if ff.ptype.has_data() {
            r.data_since_ack = true;
            r.latest_ccval = ff.ccval;
        }

        r.rtt.on_read(ff);
        let (rtt, estimated) = r.rtt.rtt(ff.time);
        debug!(rtt_ns = rtt, estimated, seq_no = ff.seq_no, "packet fed to receiver");

        r.rate.on_read(ff);
        r.loss.on_read(ff, rtt);

        // (Feedback Condition II) The calculated loss event rate grew past
        // the value last reported.
        if r.loss.loss_event_rate_inv() < r.last_loss_event_rate_inv {
            return Some(CcSignal::AckNow);
        }

        // (Feedback Condition III) The window counter advanced by four or
        // more on a data packet since the last feedback.
        if ff.ptype.has_data() && diff_window_counter(ff.ccval, r.last_ccval) >= 4 {
            return Some(CcSignal::AckNow);
        }

        None
    }

    fn on_idle(&self, now: i64) -> Option<CcSignal> {
        let r = self.lock();
        if !r.open {
            return None;
        }

        // (Feedback Condition I) One estimated roundtrip has expired since
        // the last write, and data arrived in the meantime.
        let (rtt, _) = r.rtt.rtt(now);
        if r.data_since_ack && now - r.last_write > rtt {
            return Some(CcSignal::AckNow);
        }

        None
    }

    fn close(&self) {
        self.lock().open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::options::decode_option;
    use crate::packet::PacketType;

    const FALLBACK: i64 = 100_000_000;

    fn open_receiver() -> Receiver {
        let r = Receiver::new(FALLBACK);
        r.open();
        r
    }

    fn data(seq: i64, time: i64, ccval: i8) -> FeedforwardHeader {
        FeedforwardHeader {
            ptype: PacketType::Data,
            seq_no: seq,
            ccval,
            time,
            data_len: 100,
            options: vec![],
        }
    }

    fn ack(ack_no: i64, time: i64) -> PreHeader {
        PreHeader {
            ptype: PacketType::Ack,
            seq_no: 0,
            ack_no,
            ccval: 0,
            time,
        }
    }

    #[test]
    fn gsr_is_monotonic() {
        let r = open_receiver();
        r.on_read(&data(5, 1_000_000, 0));
        assert_eq!(r.lock().gsr, 5);
        // A reordered packet never moves the greatest sequence back.
        r.on_read(&data(3, 2_000_000, 0));
        assert_eq!(r.lock().gsr, 5);
        r.on_read(&data(7, 3_000_000, 0));
        assert_eq!(r.lock().gsr, 7);
    }

    #[test]
    fn gsr_timestamp_tracks_the_greatest_packet() {
        let r = open_receiver();
        r.on_read(&data(5, 1_000_000, 0));
        r.on_read(&data(3, 9_000_000, 0));
        assert_eq!(r.lock().gsr_timestamp, 1_000_000);
    }

    #[test]
    fn ack_write_latches_feedback_state() {
        let r = open_receiver();
        r.on_read(&data(1, 1_000_000, 7));
        assert!(r.lock().data_since_ack);

        r.on_write(&ack(1, 5_000_000));
        let inner = r.lock();
        assert!(!inner.data_since_ack);
        assert_eq!(inner.last_ack, 5_000_000);
        assert_eq!(inner.last_ccval, 7);
        assert_eq!(inner.last_ccval, inner.latest_ccval);
    }

    #[test]
    fn non_ack_write_updates_last_write_only() {
        let r = open_receiver();
        r.on_read(&data(1, 1_000_000, 0));
        let ph = PreHeader {
            ptype: PacketType::Data,
            seq_no: 9,
            ack_no: 0,
            ccval: 0,
            time: 2_000_000,
        };
        assert!(r.on_write(&ph).is_empty());
        let inner = r.lock();
        assert_eq!(inner.last_write, 2_000_000);
        assert_eq!(inner.last_ack, 0);
        assert!(inner.data_since_ack);
    }

    #[test]
    fn elapsed_time_measures_since_gsr_arrival() {
        let r = open_receiver();
        r.on_read(&data(1, 1_000_000_000, 0));
        let opts = r.on_write(&ack(1, 1_500_000_000));
        // 500 ms expressed in 10 us units.
        assert_eq!(
            decode_option(&opts[0]),
            Some(CcOption::ElapsedTime(50_000))
        );
    }
}
