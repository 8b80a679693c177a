//! 类型化选项与字节选项之间的转换桥。
//! The conversion bridge between typed options and byte options.
//!
//! Only the three options the congestion control observes are covered:
//! ElapsedTime (RFC 4340 §13.2), ReceiveRate and LossIntervals
//! (RFC 4342 §8.3/§8.6). Everything else passes through as [`RawOption`].

use bytes::{Buf, BufMut};

/// Option kind for ElapsedTime.
pub const OPTION_ELAPSED_TIME: u8 = 43;
/// Option kind for LossIntervals.
pub const OPTION_LOSS_INTERVALS: u8 = 193;
/// Option kind for ReceiveRate.
pub const OPTION_RECEIVE_RATE: u8 = 194;

/// The most intervals a LossIntervals option can carry: the option value is
/// limited to 253 bytes, one of which is the skip length, and each interval
/// occupies nine.
pub const MAX_LOSS_INTERVALS: usize = 28;

const TEN_MICRO_NS: i64 = 10_000;

/// A byte option as carried on a packet: kind plus opaque value bytes.
/// 包上承载的字节选项：类型加不透明的值字节。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOption {
    pub kind: u8,
    pub data: Vec<u8>,
}

/// A typed option the congestion control produces or consumes.
/// 拥塞控制产生或消费的类型化选项。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CcOption {
    /// Delay between the acknowledged packet and this feedback, in units
    /// of 10 microseconds.
    /// 被确认的包与此反馈之间的延迟，单位为10微秒。
    ElapsedTime(u32),
    /// The receiver's measured incoming byte rate, in bytes per second.
    /// 接收端测得的入站字节速率，单位为字节每秒。
    ReceiveRate(u32),
    /// The most recent loss intervals, newest first.
    /// 最近的丢失区间，最新在前。
    LossIntervals(LossIntervals),
}

/// The body of a LossIntervals option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossIntervals {
    /// Packets after the acknowledged one that the intervals do not cover.
    /// 确认号之后、区间未覆盖的包数。
    pub skip_length: u8,
    pub intervals: Vec<LossIntervalSpec>,
}

/// One encoded loss interval: a run of received packets, the loss burst
/// that ended it, and the interval's data-packet count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LossIntervalSpec {
    pub lossless_length: u32,
    pub loss_length: u32,
    pub data_length: u32,
}

/// Converts runtime nanoseconds into 10-microsecond option units,
/// saturating at the option's 32-bit range.
/// 将运行时纳秒转换为10微秒选项单位，在32位范围处饱和。
pub fn ten_micro_from_ns(ns: i64) -> u32 {
    (ns.max(0) / TEN_MICRO_NS).min(u32::MAX as i64) as u32
}

/// Converts 10-microsecond option units back into nanoseconds.
/// 将10微秒选项单位转换回纳秒。
pub fn ns_from_ten_micro(tm: u32) -> i64 {
    tm as i64 * TEN_MICRO_NS
}

/// Encodes a typed option into its byte form. Returns `None` if the value
/// does not fit the wire encoding.
/// 将类型化选项编码为字节形式。若值超出线路编码范围则返回 `None`。
pub fn encode_option(opt: &CcOption) -> Option<RawOption> {
    match opt {
        CcOption::ElapsedTime(tm) => {
            let mut data = Vec::with_capacity(4);
            if *tm <= u16::MAX as u32 {
                data.put_u16(*tm as u16);
            } else {
                data.put_u32(*tm);
            }
            Some(RawOption {
                kind: OPTION_ELAPSED_TIME,
                data,
            })
        }
        CcOption::ReceiveRate(rate) => {
            let mut data = Vec::with_capacity(4);
            data.put_u32(*rate);
            Some(RawOption {
                kind: OPTION_RECEIVE_RATE,
                data,
            })
        }
        CcOption::LossIntervals(li) => {
            if li.intervals.len() > MAX_LOSS_INTERVALS {
                return None;
            }
            let mut data = Vec::with_capacity(1 + 9 * li.intervals.len());
            data.put_u8(li.skip_length);
            for iv in &li.intervals {
                // Each field occupies 24 bits on the wire.
                if iv.lossless_length > 0xff_ffff
                    || iv.loss_length > 0x7f_ffff
                    || iv.data_length > 0xff_ffff
                {
                    return None;
                }
                data.put_uint(iv.lossless_length as u64, 3);
                data.put_uint(iv.loss_length as u64, 3);
                data.put_uint(iv.data_length as u64, 3);
            }
            Some(RawOption {
                kind: OPTION_LOSS_INTERVALS,
                data,
            })
        }
    }
}

/// Decodes a byte option into its typed form. Returns `None` for unknown
/// kinds or malformed values.
/// 将字节选项解码为类型化形式。未知类型或畸形值返回 `None`。
pub fn decode_option(raw: &RawOption) -> Option<CcOption> {
    let mut buf = &raw.data[..];
    match raw.kind {
        OPTION_ELAPSED_TIME => match buf.len() {
            2 => Some(CcOption::ElapsedTime(buf.get_u16() as u32)),
            4 => Some(CcOption::ElapsedTime(buf.get_u32())),
            _ => None,
        },
        OPTION_RECEIVE_RATE => {
            if buf.len() != 4 {
                return None;
            }
            Some(CcOption::ReceiveRate(buf.get_u32()))
        }
        OPTION_LOSS_INTERVALS => {
            if buf.is_empty() || (buf.len() - 1) % 9 != 0 {
                return None;
            }
            let skip_length = buf.get_u8();
            let count = buf.remaining() / 9;
            if count > MAX_LOSS_INTERVALS {
                return None;
            }
            let mut intervals = Vec::with_capacity(count);
            for _ in 0..count {
                intervals.push(LossIntervalSpec {
                    lossless_length: buf.get_uint(3) as u32,
                    loss_length: buf.get_uint(3) as u32 & 0x7f_ffff,
                    data_length: buf.get_uint(3) as u32,
                });
            }
            Some(CcOption::LossIntervals(LossIntervals {
                skip_length,
                intervals,
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_time_uses_short_form_when_it_fits() {
        let raw = encode_option(&CcOption::ElapsedTime(1234)).unwrap();
        assert_eq!(raw.kind, OPTION_ELAPSED_TIME);
        assert_eq!(raw.data.len(), 2);
        assert_eq!(decode_option(&raw), Some(CcOption::ElapsedTime(1234)));
    }

    #[test]
    fn elapsed_time_uses_long_form_above_u16() {
        let raw = encode_option(&CcOption::ElapsedTime(70_000)).unwrap();
        assert_eq!(raw.data.len(), 4);
        assert_eq!(decode_option(&raw), Some(CcOption::ElapsedTime(70_000)));
    }

    #[test]
    fn ten_micro_conversion_truncates_and_saturates() {
        assert_eq!(ten_micro_from_ns(0), 0);
        assert_eq!(ten_micro_from_ns(9_999), 0);
        assert_eq!(ten_micro_from_ns(25_000), 2);
        assert_eq!(ten_micro_from_ns(-5), 0);
        assert_eq!(ten_micro_from_ns(i64::MAX), u32::MAX);
        assert_eq!(ns_from_ten_micro(2), 20_000);
    }

    #[test]
    fn receive_rate_round_trips() {
        let raw = encode_option(&CcOption::ReceiveRate(125_000)).unwrap();
        assert_eq!(raw.kind, OPTION_RECEIVE_RATE);
        assert_eq!(decode_option(&raw), Some(CcOption::ReceiveRate(125_000)));
    }

    #[test]
    fn loss_intervals_encoding_layout() {
        let li = LossIntervals {
            skip_length: 3,
            intervals: vec![
                LossIntervalSpec {
                    lossless_length: 10,
                    loss_length: 2,
                    data_length: 12,
                },
                LossIntervalSpec {
                    lossless_length: 100,
                    loss_length: 1,
                    data_length: 101,
                },
            ],
        };
        let raw = encode_option(&CcOption::LossIntervals(li.clone())).unwrap();
        assert_eq!(raw.kind, OPTION_LOSS_INTERVALS);
        assert_eq!(raw.data.len(), 1 + 9 * 2);
        assert_eq!(raw.data[0], 3);
        assert_eq!(decode_option(&raw), Some(CcOption::LossIntervals(li)));
    }

    #[test]
    fn loss_intervals_rejects_too_many() {
        let li = LossIntervals {
            skip_length: 0,
            intervals: vec![
                LossIntervalSpec {
                    lossless_length: 1,
                    loss_length: 1,
                    data_length: 1,
                };
                MAX_LOSS_INTERVALS + 1
            ],
        };
        assert!(encode_option(&CcOption::LossIntervals(li)).is_none());
    }

    #[test]
    fn decode_rejects_malformed() {
        assert!(decode_option(&RawOption {
            kind: OPTION_ELAPSED_TIME,
            data: vec![1, 2, 3],
        })
        .is_none());
        assert!(decode_option(&RawOption {
            kind: OPTION_LOSS_INTERVALS,
            data: vec![0, 1, 2],
        })
        .is_none());
        assert!(decode_option(&RawOption {
            kind: 99,
            data: vec![],
        })
        .is_none());
    }
}
