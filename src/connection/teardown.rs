//! 连接的拆除路径：中止、销毁以及通道的关闭次序。
//! The connection teardown paths: abort, kill, and the channel shutdown
//! ordering.
//!
//! The ordering is mandatory. The Reset must be enqueued before
//! `write_non_data` is closed, because closing that channel is what
//! signals the write loop to exit; closing it first would race the write
//! loop into exiting before the Reset is sent, and the peer would never
//! learn the connection was aborted.

use tracing::debug;

use crate::packet::{PacketType, ResetCode};
use crate::socket::State;

use super::{Conn, ControlPacket};

impl Conn {
    /// Resets the connection with Reset code 2, "Aborted".
    /// 以复位码2（“Aborted”）复位连接。
    pub async fn abort(&self) {
        {
            self.socket().set_state(State::Closed);
        }
        self.sync_state_watch();
        self.inject(ControlPacket {
            ptype: PacketType::Reset,
            reset_code: Some(ResetCode::Aborted),
        })
        .await;
        self.teardown_user();
        self.teardown_write_loop();
        debug!(conn = self.name(), "connection aborted");
    }

    /// Kills the connection immediately and not gracefully: no Reset is
    /// sent. Used when the peer is unreachable or further output is
    /// meaningless.
    /// 立即而非优雅地销毁连接：不发送Reset。用于对端不可达或继续输出已无意义时。
    pub(crate) fn kill(&self) {
        {
            self.socket().set_state(State::Closed);
        }
        self.sync_state_watch();
        self.teardown_user();
        self.teardown_write_loop();
        debug!(conn = self.name(), "connection killed");
    }

    /// Closes the user-facing channels and both congestion-control
    /// halves. Safe to call any number of times.
    /// 关闭面向用户的通道以及两个拥塞控制半端。可安全地调用任意多次。
    pub(crate) fn teardown_user(&self) {
        {
            let mut ch = self.channels();
            ch.read_app_tx.take();
            ch.write_data_tx.take();
        }
        self.ccid_snd.close();
        self.ccid_rcv.close();
        let _ = self.torn.send(true);
    }

    /// Closes the non-data write channel, which stops the write loop once
    /// it has drained everything already enqueued. Safe to call any
    /// number of times.
    /// 关闭非数据写通道；写环路排空已入队的内容后随之停止。可安全地调用任意多次。
    pub(crate) fn teardown_write_loop(&self) {
        self.channels().write_non_data_tx.take();
    }
}
