//! 接收端的往返时间估算器。
//! The receiver-side roundtrip estimator.
//!
//! Samples are derived from matched pairs: the send time of our most
//! recent feedback packet against an inbound packet that echoes, via an
//! ElapsedTime option, how long the peer held that feedback before
//! responding.

use crate::packet::options::{decode_option, ns_from_ten_micro, CcOption};
use crate::packet::FeedforwardHeader;

/// EWMA weight of a new sample, as `new = (7*old + sample) / 8`.
const EWMA_OLD_WEIGHT: i64 = 7;
const EWMA_DIV: i64 = 8;

/// An estimate older than this is discarded in favor of the fallback.
const STALENESS_HORIZON: i64 = 64_000_000_000;

#[derive(Debug)]
pub(super) struct RoundtripEstimator {
    fallback: i64,
    /// Current EWMA estimate in nanoseconds; zero until the first sample.
    estimate: i64,
    last_sample_at: i64,
    /// Send time of our most recent feedback packet; zero until one is sent.
    ack_sent_at: i64,
}

impl RoundtripEstimator {
    pub(super) fn new(fallback: i64) -> Self {
        Self {
            fallback,
            estimate: 0,
            last_sample_at: 0,
            ack_sent_at: 0,
        }
    }

    /// Notes the send time of an outgoing feedback packet, opening a
    /// matched pair.
    /// 记录一个出站反馈包的发送时间，开启一个匹配对。
    pub(super) fn record_ack_sent(&mut self, now: i64) {
        self.ack_sent_at = now;
    }

    /// Folds a new sample out of an inbound packet carrying an
    /// ElapsedTime echo.
    /// 从携带ElapsedTime回显的入站包中提取并合入一个新样本。
    pub(super) fn on_read(&mut self, ff: &FeedforwardHeader) {
        if self.ack_sent_at == 0 {
            return;
        }
        for raw in &ff.options {
            if let Some(CcOption::ElapsedTime(tm)) = decode_option(raw) {
                let sample = ff.time - self.ack_sent_at - ns_from_ten_micro(tm);
                if sample > 0 {
                    if self.estimate == 0 {
                        self.estimate = sample;
                    } else {
                        self.estimate =
                            (EWMA_OLD_WEIGHT * self.estimate + sample) / EWMA_DIV;
                    }
                    self.last_sample_at = ff.time;
                }
                return;
            }
        }
    }

    /// Returns the current estimate and whether it comes from real
    /// samples. Before the first sample, and after the estimate has gone
    /// stale, the conservative fallback is returned instead.
    /// 返回当前估计值以及它是否来自真实样本。在第一个样本之前、以及估计值过期之后，
    /// 返回保守的回退值。
    pub(super) fn rtt(&self, now: i64) -> (i64, bool) {
        if self.estimate > 0 && now - self.last_sample_at <= STALENESS_HORIZON {
            (self.estimate, true)
        } else {
            (self.fallback, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::options::{encode_option, RawOption};
    use crate::packet::PacketType;

    const FALLBACK: i64 = 100_000_000;

    fn echo(time: i64, elapsed_tm: u32) -> FeedforwardHeader {
        let raw: RawOption =
            encode_option(&CcOption::ElapsedTime(elapsed_tm)).unwrap();
        FeedforwardHeader {
            ptype: PacketType::DataAck,
            seq_no: 1,
            ccval: 0,
            time,
            data_len: 0,
            options: vec![raw],
        }
    }

    #[test]
    fn fallback_before_first_sample() {
        let est = RoundtripEstimator::new(FALLBACK);
        assert_eq!(est.rtt(5_000_000_000), (FALLBACK, false));
    }

    #[test]
    fn echo_without_recorded_ack_is_ignored() {
        let mut est = RoundtripEstimator::new(FALLBACK);
        est.on_read(&echo(1_000_000_000, 0));
        assert_eq!(est.rtt(1_000_000_000), (FALLBACK, false));
    }

    #[test]
    fn first_sample_becomes_the_estimate() {
        let mut est = RoundtripEstimator::new(FALLBACK);
        est.record_ack_sent(1_000_000_000);
        // Arrives 50ms later, peer held our feedback for 10ms (1000 * 10us).
        est.on_read(&echo(1_050_000_000, 1000));
        assert_eq!(est.rtt(1_050_000_000), (40_000_000, true));
    }

    #[test]
    fn subsequent_samples_are_smoothed() {
        let mut est = RoundtripEstimator::new(FALLBACK);
        est.record_ack_sent(1_000_000_000);
        est.on_read(&echo(1_040_000_000, 0)); // 40ms
        est.record_ack_sent(2_000_000_000);
        est.on_read(&echo(2_080_000_000, 0)); // 80ms
        // (7 * 40ms + 80ms) / 8 = 45ms
        assert_eq!(est.rtt(2_080_000_000), (45_000_000, true));
    }

    #[test]
    fn negative_samples_are_discarded() {
        let mut est = RoundtripEstimator::new(FALLBACK);
        est.record_ack_sent(1_000_000_000);
        // Echoed elapsed time claims more than the whole roundtrip.
        est.on_read(&echo(1_010_000_000, 5000));
        assert_eq!(est.rtt(1_010_000_000), (FALLBACK, false));
    }

    #[test]
    fn stale_estimate_falls_back() {
        let mut est = RoundtripEstimator::new(FALLBACK);
        est.record_ack_sent(1_000_000_000);
        est.on_read(&echo(1_040_000_000, 0));
        assert_eq!(est.rtt(1_040_000_000).1, true);
        let much_later = 1_040_000_000 + STALENESS_HORIZON + 1;
        assert_eq!(est.rtt(much_later), (FALLBACK, false));
    }
}
