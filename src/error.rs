//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the DCCP protocol library.
/// DCCP协议库的主要错误类型。
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The connection has been locally closed or aborted. This is the
    /// EOF-equivalent error contractually returned by segment reads and
    /// writes after teardown.
    ///
    /// 连接已在本地关闭或中止。这是拆除后段读写按约定返回的EOF等价错误。
    #[error("connection closed")]
    Eof,

    /// The operation requires an established connection.
    /// 操作需要一个已建立的连接。
    #[error("connection not established")]
    NotConnected,

    /// An internal channel for communication between tasks was closed
    /// unexpectedly.
    /// 用于任务间通信的内部通道意外关闭。
    #[error("internal channel is broken")]
    ChannelClosed,
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;
