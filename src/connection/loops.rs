//! 连接的三个环路：读、写与空闲定时器。
//! The connection's three loops: read, write and the idle timer.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::cc::CcSignal;
use crate::packet::{FeedforwardHeader, Packet, PacketType, PreHeader, ResetCode};
use crate::socket::State;

use super::{Conn, ControlPacket};

fn ctrl(ptype: PacketType) -> ControlPacket {
    ControlPacket {
        ptype,
        reset_code: None,
    }
}

fn reset(code: ResetCode) -> ControlPacket {
    ControlPacket {
        ptype: PacketType::Reset,
        reset_code: Some(code),
    }
}

/// Drains the link and drives the state machine until the connection is
/// torn down or the link reaches EOF.
/// 从链路读取并驱动状态机，直到连接被拆除或链路到达EOF。
pub(super) async fn read_loop(conn: Arc<Conn>) {
    let mut torn_rx = conn.torn.subscribe();
    loop {
        let pkt = tokio::select! {
            res = conn.link.recv() => match res {
                Ok(pkt) => pkt,
                Err(_) => {
                    // The peer is gone; no further output is meaningful.
                    debug!(conn = conn.name(), "link reached EOF");
                    conn.kill();
                    break;
                }
            },
            _ = torn_rx.wait_for(|t| *t) => break,
        };
        if process_packet(&conn, pkt).await {
            break;
        }
    }
}

/// Serializes outbound packets: control packets in enqueue order, and
/// application data interleaved while the connection is OPEN. Exits when
/// the non-data channel closes, then closes the link's send side.
/// 序列化出站包：控制包按入队次序发送，应用数据在连接OPEN时穿插其间。
/// 非数据通道关闭后退出，并随之关闭链路的发送侧。
pub(super) async fn write_loop(
    conn: Arc<Conn>,
    mut non_data_rx: mpsc::Receiver<ControlPacket>,
    mut data_rx: mpsc::Receiver<Bytes>,
) {
    let mut state_rx = conn.state_watch.subscribe();
    let mut data_open = true;
    loop {
        let accept_data = data_open && conn.state() == State::Open;
        tokio::select! {
            biased;
            next = non_data_rx.recv() => match next {
                Some(ctrl) => emit(&conn, ctrl.ptype, ctrl.reset_code, Bytes::new()).await,
                None => break,
            },
            next = data_rx.recv(), if accept_data => match next {
                Some(payload) => emit(&conn, PacketType::Data, None, payload).await,
                None => data_open = false,
            },
            // A state change may enable or disable the data branch.
            _ = state_rx.changed() => {}
        }
    }
    conn.link.close();
}

/// Ticks both congestion-control halves once per quantum so they can
/// force feedback after a quiet roundtrip.
/// 每个时间量子敲击两个拥塞控制半端一次，使其能在一个安静的往返后强制反馈。
pub(super) async fn idle_loop(conn: Arc<Conn>) {
    let quantum = conn.config.idle_interval.as_nanos() as i64;
    loop {
        conn.runtime.sleep(quantum).await;
        if conn.state() == State::Closed {
            break;
        }
        let now = conn.runtime.now();
        let signals = [conn.ccid_snd.on_idle(now), conn.ccid_rcv.on_idle(now)];
        for signal in signals.into_iter().flatten() {
            if signal == CcSignal::AckNow {
                conn.inject(ctrl(PacketType::Ack)).await;
            }
        }
    }
}

/// Assigns sequence and acknowledgement numbers, runs `on_write` on both
/// congestion-control halves, and puts the packet on the link.
/// 分配序号与确认号，在两个拥塞控制半端上运行 `on_write`，并把包放上链路。
async fn emit(
    conn: &Conn,
    ptype: PacketType,
    reset_code: Option<ResetCode>,
    payload: Bytes,
) {
    let (seq_no, ack_no) = {
        let mut sock = conn.socket();
        (sock.next_seq_no(), sock.gsr())
    };
    let mut ph = PreHeader {
        ptype,
        seq_no,
        ack_no,
        ccval: 0,
        time: conn.runtime.now(),
    };
    let mut options = conn.ccid_snd.on_write(&mut ph);
    options.extend(conn.ccid_rcv.on_write(&ph));

    trace!(conn = conn.name(), ?ptype, seq_no, ack_no, "packet emitted");
    let pkt = Packet {
        ptype,
        seq_no: ph.seq_no,
        ack_no: ph.ack_no,
        ccval: ph.ccval,
        reset_code,
        options,
        payload,
    };
    if conn.link.send(pkt).await.is_err() {
        debug!(conn = conn.name(), "link closed while emitting");
    }
}

enum Finish {
    /// We answered a Close with a Reset and must tear down behind it.
    RespondedClose,
    /// The peer reset the connection; linger in TIMEWAIT if we were the
    /// one closing.
    GotReset { linger: bool },
}

/// Runs one validated packet through the state machine and the congestion
/// control. Returns true once the read loop should stop.
/// 将一个经过验证的包送入状态机与拥塞控制。当读环路应当停止时返回true。
async fn process_packet(conn: &Arc<Conn>, pkt: Packet) -> bool {
    let now = conn.runtime.now();
    let ff = FeedforwardHeader::from_packet(&pkt, now);

    let mut replies: Vec<ControlPacket> = Vec::new();
    let mut open_cc = false;
    let mut feed = false;
    let mut deliver = false;
    let mut finish: Option<Finish> = None;

    {
        let mut sock = conn.socket();
        let state = sock.state();
        trace!(
            conn = conn.name(),
            ?state,
            ptype = ?pkt.ptype,
            seq_no = pkt.seq_no,
            "packet received"
        );

        if pkt.ptype == PacketType::Reset {
            sock.update_gsr(pkt.seq_no);
            let linger = state == State::Closing;
            sock.set_state(if linger { State::TimeWait } else { State::Closed });
            finish = Some(Finish::GotReset { linger });
        } else {
            match state {
                State::Listen => {
                    if pkt.ptype == PacketType::Request {
                        sock.set_isr(pkt.seq_no);
                        sock.set_state(State::Respond);
                        replies.push(ctrl(PacketType::Response));
                    }
                }
                State::Request => {
                    if pkt.ptype == PacketType::Response {
                        sock.set_isr(pkt.seq_no);
                        sock.update_gar(pkt.ack_no);
                        sock.set_state(State::PartOpen);
                        open_cc = true;
                        feed = true;
                        replies.push(ctrl(PacketType::Ack));
                    }
                }
                State::Respond => match pkt.ptype {
                    PacketType::Request => {
                        // Retransmitted Request: our Response was lost.
                        replies.push(ctrl(PacketType::Response));
                    }
                    PacketType::Ack | PacketType::DataAck => {
                        sock.update_gsr(pkt.seq_no);
                        sock.update_gar(pkt.ack_no);
                        sock.set_state(State::Open);
                        open_cc = true;
                        feed = true;
                        deliver = pkt.ptype.has_data();
                        // Answer, so the peer can leave PARTOPEN.
                        replies.push(ctrl(PacketType::Ack));
                    }
                    _ => {}
                },
                State::PartOpen | State::Open => {
                    if state == State::PartOpen && pkt.ptype == PacketType::Response {
                        // Retransmitted Response: our Ack was lost.
                        sock.update_gsr(pkt.seq_no);
                        feed = true;
                        replies.push(ctrl(PacketType::Ack));
                    } else {
                        if state == State::PartOpen {
                            // Any other packet proves the peer reached OPEN.
                            sock.set_state(State::Open);
                        }
                        sock.update_gsr(pkt.seq_no);
                        if pkt.ptype.has_ack() {
                            sock.update_gar(pkt.ack_no);
                        }
                        feed = true;
                        deliver = pkt.ptype.has_data();
                        match pkt.ptype {
                            PacketType::Sync => replies.push(ctrl(PacketType::SyncAck)),
                            PacketType::CloseReq => {
                                sock.set_state(State::Closing);
                                replies.push(ctrl(PacketType::Close));
                            }
                            PacketType::Close => {
                                sock.set_state(State::Closed);
                                replies.push(reset(ResetCode::Closed));
                                finish = Some(Finish::RespondedClose);
                            }
                            _ => {}
                        }
                    }
                }
                State::CloseReq => {
                    sock.update_gsr(pkt.seq_no);
                    feed = true;
                    if pkt.ptype == PacketType::Close {
                        sock.set_state(State::Closed);
                        replies.push(reset(ResetCode::Closed));
                        finish = Some(Finish::RespondedClose);
                    }
                }
                State::Closing => {
                    sock.update_gsr(pkt.seq_no);
                    feed = true;
                    if pkt.ptype == PacketType::CloseReq {
                        // Simultaneous close: our Close crossed the peer's
                        // CloseReq.
                        replies.push(ctrl(PacketType::Close));
                    }
                }
                State::TimeWait | State::Closed => {
                    // Absorb late packets quietly.
                }
            }
        }
    }
    conn.sync_state_watch();

    if open_cc {
        conn.ccid_snd.open();
        conn.ccid_rcv.open();
    }

    if feed {
        let _ = conn.ccid_snd.on_read(&ff);
        match conn.ccid_rcv.on_read(&ff) {
            Some(CcSignal::Drop) => {
                debug!(conn = conn.name(), seq_no = pkt.seq_no, "packet dropped by congestion control");
                return false;
            }
            Some(CcSignal::AckNow) => replies.push(ctrl(PacketType::Ack)),
            None => {}
        }
    }

    if deliver && !pkt.payload.is_empty() {
        let tx = conn.channels().read_app_tx.clone();
        if let Some(tx) = tx {
            let _ = tx.send(pkt.payload.clone()).await;
        }
    }

    for reply in replies {
        conn.inject(reply).await;
    }

    match finish {
        Some(Finish::RespondedClose) => {
            // The Reset is enqueued; the channels may now close behind it.
            conn.teardown_user();
            conn.teardown_write_loop();
            true
        }
        Some(Finish::GotReset { linger }) => {
            conn.teardown_user();
            conn.teardown_write_loop();
            if linger {
                let c = conn.clone();
                let linger_ns = conn.config.time_wait.as_nanos() as i64;
                conn.group.go("timewait-timer", async move {
                    c.runtime.sleep(linger_ns).await;
                    c.kill();
                });
            }
            true
        }
        None => false,
    }
}
