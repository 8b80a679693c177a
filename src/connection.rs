//! 定义了单个DCCP连接：状态机、通道与环路的协调者。
//! Defines a single DCCP connection: the coordinator of the state
//! machine, the channels and the loops.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::{mpsc, watch};

use crate::cc::{ReceiverCongestionControl, SenderCongestionControl};
use crate::ccid3;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::packet::{Packet, PacketType, ResetCode};
use crate::runtime::{Runtime, TaskGroup, Waiter};
use crate::socket::{Socket, State};

mod loops;
mod teardown;

/// The link over which packets travel. The sandbox provides the in-process
/// implementation; the byte-level wire format is outside the core.
///
/// 包传输所经过的链路。沙盒提供进程内实现；字节级线路格式不属于核心。
#[async_trait]
pub trait Link: Send + Sync + 'static {
    /// Receives the next packet. Returns `Error::Eof` once the peer's send
    /// side has closed and everything in flight has been drained.
    async fn recv(&self) -> Result<Packet>;

    /// Sends a packet. Returns `Error::Eof` once this side is closed.
    async fn send(&self, pkt: Packet) -> Result<()>;

    /// Closes the send side, signalling EOF to the peer.
    fn close(&self);
}

/// A control packet queued on the non-data write channel. Sequence and
/// acknowledgement numbers are assigned at emission time, so a queued Ack
/// always carries the freshest GSR.
///
/// 排队在非数据写通道上的控制包。序号与确认号在发出时分配，因此排队的Ack
/// 总是携带最新的GSR。
#[derive(Debug, Clone, Copy)]
pub(crate) struct ControlPacket {
    pub ptype: PacketType,
    pub reset_code: Option<ResetCode>,
}

/// The senders of the three per-connection channels. Teardown `take`s each
/// slot exactly once, which is what makes teardown idempotent.
/// 每连接三个通道的发送端。拆除逻辑对每个槽位恰好 `take` 一次，这正是拆除
/// 幂等性的来源。
struct Channels {
    read_app_tx: Option<mpsc::Sender<Bytes>>,
    write_data_tx: Option<mpsc::Sender<Bytes>>,
    write_non_data_tx: Option<mpsc::Sender<ControlPacket>>,
}

static NEXT_ISS: AtomicI64 = AtomicI64::new(1);

/// A single DCCP connection endpoint.
///
/// A connection owns a read loop, a write loop and an idle-timer loop,
/// all registered in one [`TaskGroup`]; [`Conn::waiter`] joins them.
/// The socket-state mutex is held only across short critical sections and
/// is always released before a channel send.
///
/// 单个DCCP连接端点。
///
/// 连接拥有一个读环路、一个写环路和一个空闲定时器环路，全部注册在同一个
/// [`TaskGroup`] 中；[`Conn::waiter`] 汇合它们。套接字状态互斥锁仅在短临界区
/// 内持有，且总是在通道发送之前释放。
pub struct Conn {
    name: &'static str,
    runtime: Arc<Runtime>,
    config: Config,
    link: Arc<dyn Link>,

    socket: Mutex<Socket>,
    channels: Mutex<Channels>,
    read_app_rx: AsyncMutex<mpsc::Receiver<Bytes>>,

    /// Set to true once the user-facing channels have been torn down.
    torn: watch::Sender<bool>,
    /// Mirrors the socket state for tasks that need to wake on changes.
    state_watch: watch::Sender<State>,

    group: TaskGroup,
    ccid_snd: Arc<dyn SenderCongestionControl>,
    ccid_rcv: Arc<dyn ReceiverCongestionControl>,
}

impl Conn {
    /// Creates the active-open (client) side of a connection and starts
    /// its loops. A Request is on the wire before this returns.
    /// 创建连接的主动打开（客户端）一侧并启动其环路。返回前Request已上路。
    pub fn client(link: Arc<dyn Link>, runtime: Arc<Runtime>, config: Config) -> Arc<Self> {
        Self::new("client", false, link, runtime, config)
    }

    /// Creates the passive-accept (server) side of a connection and
    /// starts its loops.
    /// 创建连接的被动接受（服务端）一侧并启动其环路。
    pub fn server(link: Arc<dyn Link>, runtime: Arc<Runtime>, config: Config) -> Arc<Self> {
        Self::new("server", true, link, runtime, config)
    }

    fn new(
        name: &'static str,
        server: bool,
        link: Arc<dyn Link>,
        runtime: Arc<Runtime>,
        config: Config,
    ) -> Arc<Self> {
        let cap = config.channel_capacity;
        let (read_app_tx, read_app_rx) = mpsc::channel(cap);
        let (write_data_tx, write_data_rx) = mpsc::channel(cap);
        let (write_non_data_tx, write_non_data_rx) = mpsc::channel(cap);

        let iss = NEXT_ISS.fetch_add(1 << 16, Ordering::Relaxed);
        let fallback_rtt = config.fallback_rtt.as_nanos() as i64;
        let socket = Socket::new(server, iss, config.local_ccid, config.remote_ccid);
        let (torn, _) = watch::channel(false);
        let (state_watch, _) = watch::channel(socket.state());

        let conn = Arc::new(Self {
            name,
            runtime,
            config,
            link,
            socket: Mutex::new(socket),
            channels: Mutex::new(Channels {
                read_app_tx: Some(read_app_tx),
                write_data_tx: Some(write_data_tx),
                write_non_data_tx: Some(write_non_data_tx),
            }),
            read_app_rx: AsyncMutex::new(read_app_rx),
            torn,
            state_watch,
            group: TaskGroup::new(),
            ccid_snd: Arc::new(ccid3::sender::Sender::new(fallback_rtt)),
            ccid_rcv: Arc::new(ccid3::receiver::Receiver::new(fallback_rtt)),
        });

        if !server {
            // Active open: the Request goes out on the first write quantum.
            conn.try_inject(ControlPacket {
                ptype: PacketType::Request,
                reset_code: None,
            });
        }

        conn.group
            .go("read-loop", loops::read_loop(conn.clone()));
        conn.group.go(
            "write-loop",
            loops::write_loop(conn.clone(), write_non_data_rx, write_data_rx),
        );
        conn.group
            .go("idle-loop", loops::idle_loop(conn.clone()));

        conn
    }

    /// Reads the next application segment. Returns [`Error::Eof`] once the
    /// connection has been locally closed or aborted and the inbound
    /// channel has drained.
    /// 读取下一个应用数据段。一旦连接在本地关闭或中止且入站通道排空，
    /// 返回 [`Error::Eof`]。
    pub async fn read_segment(&self) -> Result<Bytes> {
        let mut rx = self.read_app_rx.lock().await;
        rx.recv().await.ok_or(Error::Eof)
    }

    /// Reads into a byte buffer. One segment is consumed per call; a
    /// segment larger than the buffer is truncated, per datagram
    /// semantics. Returns [`Error::Eof`] after local close or abort.
    /// 读入一个字节缓冲区。每次调用消耗一个数据段；大于缓冲区的数据段会被截断
    /// （数据报语义）。本地关闭或中止后返回 [`Error::Eof`]。
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let segment = self.read_segment().await?;
        let n = segment.len().min(buf.len());
        buf[..n].copy_from_slice(&segment[..n]);
        Ok(n)
    }

    /// Writes a byte slice as one segment.
    /// 将一个字节切片作为单个数据段写入。
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.write_segment(Bytes::copy_from_slice(data)).await
    }

    /// Queues one application segment for transmission as a Data packet.
    /// 将一个应用数据段排队，作为Data包发送。
    pub async fn write_segment(&self, data: Bytes) -> Result<()> {
        let tx = self.channels().write_data_tx.clone();
        match tx {
            Some(tx) => tx.send(data).await.map_err(|_| Error::Eof),
            None => Err(Error::Eof),
        }
    }

    /// Initiates the graceful close handshake and returns once the user
    /// side of the connection is drained.
    ///
    /// The server side asks the peer to close (CloseReq), so the client
    /// carries the TIMEWAIT cost; the client side sends Close directly.
    ///
    /// 发起优雅关闭握手，并在连接的用户侧排空后返回。
    ///
    /// 服务端请求对端关闭（CloseReq），由客户端承担TIMEWAIT的代价；
    /// 客户端则直接发送Close。
    pub async fn close(&self) -> Result<()> {
        let ctrl = {
            let mut sock = self.socket();
            match sock.state() {
                State::Open | State::PartOpen => {
                    if sock.is_server() {
                        sock.set_state(State::CloseReq);
                        ControlPacket {
                            ptype: PacketType::CloseReq,
                            reset_code: None,
                        }
                    } else {
                        sock.set_state(State::Closing);
                        ControlPacket {
                            ptype: PacketType::Close,
                            reset_code: None,
                        }
                    }
                }
                _ => return Err(Error::Eof),
            }
        };
        self.sync_state_watch();
        self.inject(ctrl).await;

        let mut torn_rx = self.torn.subscribe();
        let _ = torn_rx.wait_for(|t| *t).await;
        Ok(())
    }

    /// Returns a completion handle over every background task of this
    /// connection.
    /// 返回覆盖此连接所有后台任务的完成句柄。
    pub fn waiter(&self) -> Waiter {
        self.group.waiter()
    }

    /// The current protocol state.
    pub fn state(&self) -> State {
        self.socket().state()
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    fn socket(&self) -> MutexGuard<'_, Socket> {
        self.socket.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn channels(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publishes the current socket state to tasks waiting on changes.
    fn sync_state_watch(&self) {
        let state = self.state();
        let _ = self.state_watch.send(state);
    }

    /// Enqueues a control packet on the non-data write channel, waiting
    /// for capacity. The channel sender is cloned under the lock and the
    /// send happens after the lock is released.
    /// 在非数据写通道上排队一个控制包，必要时等待容量。通道发送端在锁内克隆，
    /// 发送在释放锁之后进行。
    pub(crate) async fn inject(&self, ctrl: ControlPacket) {
        let tx = self.channels().write_non_data_tx.clone();
        if let Some(tx) = tx {
            // A closed channel means teardown has begun; the packet is
            // irrelevant then.
            let _ = tx.send(ctrl).await;
        }
    }

    /// Non-blocking variant of [`Conn::inject`] for use during
    /// construction, when the channel cannot be full.
    fn try_inject(&self, ctrl: ControlPacket) {
        if let Some(tx) = &self.channels().write_non_data_tx {
            let _ = tx.try_send(ctrl);
        }
    }
}
