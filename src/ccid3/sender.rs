//! CCID3发送端的最小实现：只维护CCVal窗口计数器。
//! The minimal CCID3 sender half: it only maintains the CCVal window
//! counter.
//!
//! The full TFRC rate computation lives on the peer and is out of scope
//! here; this half exists so that outgoing Data packets carry a valid
//! window counter, which the peer's receiver needs for loss-event
//! grouping and feedback condition III.

use std::sync::{Mutex, MutexGuard};

use crate::cc::{CcSignal, SenderCongestionControl};
use crate::packet::options::RawOption;
use crate::packet::{FeedforwardHeader, PreHeader};

use super::CCID3;

/// The sender half-connection congestion control.
/// 发送端半连接拥塞控制。
pub struct Sender {
    nominal_rtt: i64,
    inner: Mutex<SenderInner>,
}

struct SenderInner {
    open: bool,
    /// Send time of the first data packet; the window counter epoch.
    first_write: i64,
}

impl Sender {
    /// Creates an inactive sender; `open` activates it. The window counter
    /// advances once per quarter of `nominal_rtt`.
    /// 创建一个未激活的发送端；`open` 将其激活。窗口计数器每经过
    /// `nominal_rtt` 的四分之一前进一次。
    pub fn new(nominal_rtt: i64) -> Self {
        Self {
            nominal_rtt,
            inner: Mutex::new(SenderInner {
                open: false,
                first_write: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SenderInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SenderCongestionControl for Sender {
    fn id(&self) -> u8 {
        CCID3
    }

    fn open(&self) {
        let mut s = self.lock();
        if s.open {
            panic!("opening an open ccid3 sender");
        }
        s.open = true;
        s.first_write = 0;
    }

    fn on_write(&self, ph: &mut PreHeader) -> Vec<RawOption> {
        let mut s = self.lock();
        if !s.open || !ph.ptype.has_data() {
            return vec![];
        }
        if s.first_write == 0 {
            s.first_write = ph.time;
        }
        let quarter = (self.nominal_rtt / 4).max(1);
        ph.ccval = (((ph.time - s.first_write) / quarter) % 16) as i8;
        vec![]
    }

    fn on_read(&self, _ff: &FeedforwardHeader) -> Option<CcSignal> {
        None
    }

    fn on_idle(&self, _now: i64) -> Option<CcSignal> {
        None
    }

    fn close(&self) {
        self.lock().open = false;
    }
}
