//! 定义了可插拔的拥塞控制接口。
//! Defines the pluggable congestion control interface.
//!
//! Each connection owns one sender half and one receiver half. The
//! connection drives every call; the halves never hold a reference back to
//! the connection, only a clock handle where they need one. Each half
//! serializes its own state behind a leaf mutex, so the connection always
//! calls in without holding its own lock.

use crate::packet::options::RawOption;
use crate::packet::{FeedforwardHeader, PreHeader};

/// A scheduling signal returned by a congestion-control hook.
/// 拥塞控制钩子返回的调度信号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcSignal {
    /// The connection must schedule an Ack packet on the next write
    /// quantum.
    /// 连接必须在下一个写时间量子调度一个Ack包。
    AckNow,
    /// The packet must be silently discarded with no further processing.
    /// 该包必须被静默丢弃，不做进一步处理。
    Drop,
}

/// The half-connection congestion control for the outgoing data direction.
/// 出站数据方向的半连接拥塞控制。
pub trait SenderCongestionControl: Send + Sync + 'static {
    /// The CCID this algorithm implements.
    fn id(&self) -> u8;

    /// Activates the half once the connection reaches OPEN or PARTOPEN.
    fn open(&self);

    /// Deactivates the half. Idempotent.
    fn close(&self);

    /// Called once per outgoing packet, before emission. May stamp the
    /// window counter and attach options.
    /// 每个出站包发出前调用一次。可以填写窗口计数器并附加选项。
    fn on_write(&self, ph: &mut PreHeader) -> Vec<RawOption>;

    /// Called once per validated inbound packet.
    fn on_read(&self, ff: &FeedforwardHeader) -> Option<CcSignal>;

    /// Called once per idle quantum with the current time.
    fn on_idle(&self, now: i64) -> Option<CcSignal>;
}

/// The half-connection congestion control for the incoming data direction.
/// This is the feedback-generating side.
/// 入站数据方向的半连接拥塞控制。这是产生反馈的一侧。
pub trait ReceiverCongestionControl: Send + Sync + 'static {
    /// The CCID this algorithm implements.
    fn id(&self) -> u8;

    /// Activates the half once the connection reaches OPEN or PARTOPEN.
    fn open(&self);

    /// Deactivates the half. Idempotent.
    fn close(&self);

    /// Called once per outgoing packet, before emission. Returns the
    /// feedback options to append to the packet.
    /// 每个出站包发出前调用一次。返回要附加到包上的反馈选项。
    fn on_write(&self, ph: &PreHeader) -> Vec<RawOption>;

    /// Called once per validated inbound packet. `Some(CcSignal::AckNow)`
    /// asks the connection for immediate feedback; `Some(CcSignal::Drop)`
    /// discards the packet. When the half is not open this must return
    /// `None`.
    fn on_read(&self, ff: &FeedforwardHeader) -> Option<CcSignal>;

    /// Called once per idle quantum with the current time.
    fn on_idle(&self, now: i64) -> Option<CcSignal>;
}
