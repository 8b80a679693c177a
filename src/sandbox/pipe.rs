//! 进程内的模拟链路：带单向延迟、丢包策略与计数器的头部管道。
//! The in-process simulated link: a header pipe with one-way latency, a
//! drop policy and counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Duration;
use tracing::trace;

use crate::connection::Link;
use crate::error::{Error, Result};
use crate::packet::{Packet, PacketType, ResetCode};
use crate::runtime::Runtime;

const PIPE_CAPACITY: usize = 128;

/// A drop policy inspects each packet about to be sent and returns true
/// to drop it.
/// 丢包策略检查每个即将发送的包，返回true表示丢弃。
pub type DropPolicy = Box<dyn FnMut(&Packet) -> bool + Send>;

/// Per-endpoint traffic counters, updated as packets are delivered to (or
/// dropped by) this end. Tests read these instead of scraping logs.
/// 每端点的流量计数器，在包投递到本端（或被本端丢弃）时更新。测试读取这些
/// 计数器而不是抓取日志。
pub struct PipeStats {
    received: [AtomicU64; 10],
    received_resets: [AtomicU64; 4],
    dropped: AtomicU64,
}

fn type_index(ptype: PacketType) -> usize {
    match ptype {
        PacketType::Request => 0,
        PacketType::Response => 1,
        PacketType::Data => 2,
        PacketType::Ack => 3,
        PacketType::DataAck => 4,
        PacketType::CloseReq => 5,
        PacketType::Close => 6,
        PacketType::Reset => 7,
        PacketType::Sync => 8,
        PacketType::SyncAck => 9,
    }
}

impl PipeStats {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            received: std::array::from_fn(|_| AtomicU64::new(0)),
            received_resets: std::array::from_fn(|_| AtomicU64::new(0)),
            dropped: AtomicU64::new(0),
        })
    }

    fn note_received(&self, pkt: &Packet) {
        self.received[type_index(pkt.ptype)].fetch_add(1, Ordering::Relaxed);
        if let Some(code) = pkt.reset_code {
            self.received_resets[code as usize].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// How many packets of the given type this end has received.
    /// 本端已接收的给定类型包的数量。
    pub fn received(&self, ptype: PacketType) -> u64 {
        self.received[type_index(ptype)].load(Ordering::Relaxed)
    }

    /// How many Reset packets with the given code this end has received.
    /// 本端已接收的带给定原因码的Reset包数量。
    pub fn received_reset_code(&self, code: ResetCode) -> u64 {
        self.received_resets[code as usize].load(Ordering::Relaxed)
    }

    /// How many outgoing packets this end's drop policy has discarded.
    /// 本端丢包策略丢弃的出站包数量。
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// One end of a bidirectional in-process header pipe.
/// 双向进程内头部管道的一端。
pub struct HeaderPipe {
    runtime: Arc<Runtime>,
    latency: Duration,
    tx: Mutex<Option<mpsc::Sender<Packet>>>,
    rx: AsyncMutex<mpsc::Receiver<Packet>>,
    policy: Mutex<Option<DropPolicy>>,
    stats: Arc<PipeStats>,
}

impl HeaderPipe {
    /// Installs a drop policy on this end's outgoing direction.
    /// 在本端的出站方向上安装丢包策略。
    pub fn set_drop_policy(&self, policy: DropPolicy) {
        *self.policy.lock().unwrap_or_else(|e| e.into_inner()) = Some(policy);
    }

    /// The counters of traffic arriving at this end.
    /// 到达本端的流量计数器。
    pub fn stats(&self) -> Arc<PipeStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl Link for HeaderPipe {
    async fn recv(&self) -> Result<Packet> {
        let pkt = {
            let mut rx = self.rx.lock().await;
            rx.recv().await.ok_or(Error::Eof)?
        };
        // One-way propagation delay, paid on delivery.
        self.runtime
            .sleep(self.latency.as_nanos() as i64)
            .await;
        self.stats.note_received(&pkt);
        Ok(pkt)
    }

    async fn send(&self, pkt: Packet) -> Result<()> {
        {
            let mut policy = self.policy.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(policy) = policy.as_mut() {
                if policy(&pkt) {
                    trace!(ptype = ?pkt.ptype, seq_no = pkt.seq_no, "pipe dropped packet");
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
            }
        }
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(Error::Eof)?;
        tx.send(pkt).await.map_err(|_| Error::Eof)
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// Creates the two connected ends of a header pipe with the given one-way
/// latency.
/// 创建带给定单向延迟的头部管道的两个相连端点。
pub fn pipe(runtime: &Arc<Runtime>, latency: Duration) -> (Arc<HeaderPipe>, Arc<HeaderPipe>) {
    let (a_tx, b_rx) = mpsc::channel(PIPE_CAPACITY);
    let (b_tx, a_rx) = mpsc::channel(PIPE_CAPACITY);
    let a = Arc::new(HeaderPipe {
        runtime: runtime.clone(),
        latency,
        tx: Mutex::new(Some(a_tx)),
        rx: AsyncMutex::new(a_rx),
        policy: Mutex::new(None),
        stats: PipeStats::new(),
    });
    let b = Arc::new(HeaderPipe {
        runtime: runtime.clone(),
        latency,
        tx: Mutex::new(Some(b_tx)),
        rx: AsyncMutex::new(b_rx),
        policy: Mutex::new(None),
        stats: PipeStats::new(),
    });
    (a, b)
}

/// A drop policy discarding every `n`-th Data packet sent.
/// 丢弃每第 `n` 个已发送Data包的丢包策略。
pub fn drop_every_nth_data(n: u64) -> DropPolicy {
    let mut count = 0;
    Box::new(move |pkt| {
        if pkt.ptype.has_data() {
            count += 1;
            count % n == 0
        } else {
            false
        }
    })
}
