//! 接收速率计算器。
//! The receive-rate calculator.

use crate::packet::options::CcOption;
use crate::packet::FeedforwardHeader;

/// Measures the incoming payload byte rate over the window since the last
/// feedback. The measurement interval never drops below one roundtrip
/// time, which keeps the rate meaningful when feedback is frequent.
///
/// 测量自上次反馈以来窗口内的入站载荷字节速率。测量区间不短于一个往返时间，
/// 以保证反馈频繁时速率仍有意义。
#[derive(Debug)]
pub(super) struct RateCalculator {
    bytes: u64,
    window_start: i64,
}

impl RateCalculator {
    pub(super) fn new() -> Self {
        Self {
            bytes: 0,
            window_start: 0,
        }
    }

    /// Adds the payload of a received packet to the current window.
    /// 将一个已接收包的载荷计入当前窗口。
    pub(super) fn on_read(&mut self, ff: &FeedforwardHeader) {
        if ff.ptype.has_data() {
            self.bytes += ff.data_len as u64;
        }
    }

    /// Closes the current window and returns its byte rate as a
    /// ReceiveRate option.
    /// 关闭当前窗口并以ReceiveRate选项形式返回其字节速率。
    pub(super) fn flush(&mut self, rtt: i64, now: i64) -> CcOption {
        let elapsed = (now - self.window_start).max(rtt).max(1) as u64;
        let rate = self
            .bytes
            .saturating_mul(1_000_000_000)
            .checked_div(elapsed)
            .unwrap_or(0)
            .min(u32::MAX as u64) as u32;
        self.bytes = 0;
        self.window_start = now;
        CcOption::ReceiveRate(rate)
    }
}
