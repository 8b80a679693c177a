//! 定义了连接和拥塞控制的可配置参数。
//! Defines configurable parameters for connections and congestion control.

use std::time::Duration;

/// A structure containing all configurable parameters for a connection.
///
/// 包含一个连接所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct Config {
    /// The capacity of the three per-connection channels (`read_app`,
    /// `write_data`, `write_non_data`), in items.
    /// 每个连接三个通道（`read_app`、`write_data`、`write_non_data`）的容量（以条目为单位）。
    pub channel_capacity: usize,

    /// The quantum of the idle-timer loop. Once per quantum the connection
    /// calls `on_idle` on both congestion-control halves.
    /// 空闲定时器循环的时间量子。每个量子连接会在两个拥塞控制半端上调用一次 `on_idle`。
    pub idle_interval: Duration,

    /// How long a connection lingers in TIMEWAIT before it is killed.
    /// Late packets from the closed connection are absorbed during this
    /// period.
    /// 连接在被销毁前于TIMEWAIT状态停留的时长。此期间会吸收来自已关闭连接的迟到包。
    pub time_wait: Duration,

    /// The roundtrip estimate used before the estimator has seen its first
    /// sample.
    /// 在估算器获得第一个样本之前使用的往返时间估计值。
    pub fallback_rtt: Duration,

    /// The CCID announced for the local-to-remote half connection.
    /// 为本地到远端半连接宣告的CCID。
    pub local_ccid: u8,

    /// The CCID announced for the remote-to-local half connection.
    /// 为远端到本地半连接宣告的CCID。
    pub remote_ccid: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_capacity: 32,
            idle_interval: Duration::from_millis(10),
            // 2 * MSL, scaled down from the wire default; paused-clock
            // tests make the wall-clock cost irrelevant.
            time_wait: Duration::from_secs(60),
            fallback_rtt: Duration::from_millis(100),
            local_ccid: crate::ccid3::CCID3,
            remote_ccid: crate::ccid3::CCID3,
        }
    }
}
