//! 定义了包类型、头部视图与复位码。
//! Defines packet types, header views and reset codes.

use bytes::Bytes;

pub mod options;

use options::RawOption;

/// The type of a DCCP packet.
/// DCCP包的类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Initiates a connection (active open).
    /// 发起连接（主动打开）。
    Request,
    /// Answers a Request (passive open).
    /// 应答Request（被动打开）。
    Response,
    /// Carries application data.
    /// 承载应用数据。
    Data,
    /// Carries an acknowledgement and no data.
    /// 只承载确认，不含数据。
    Ack,
    /// Carries both application data and an acknowledgement.
    /// 同时承载应用数据与确认。
    DataAck,
    /// Asks the peer to close its side of the connection.
    /// 请求对端关闭其连接一侧。
    CloseReq,
    /// Closes the connection.
    /// 关闭连接。
    Close,
    /// Unconditionally terminates the connection.
    /// 无条件终止连接。
    Reset,
    /// Resynchronizes sequence numbers after bursts of loss.
    /// 在突发丢包后重新同步序号。
    Sync,
    /// Answers a Sync.
    /// 应答Sync。
    SyncAck,
}

impl PacketType {
    /// Whether this packet type carries application data.
    pub fn has_data(self) -> bool {
        matches!(self, PacketType::Data | PacketType::DataAck)
    }

    /// Whether this packet type carries an acknowledgement number.
    pub fn has_ack(self) -> bool {
        !matches!(self, PacketType::Request | PacketType::Data)
    }
}

/// The reason carried by a Reset packet.
/// Reset包携带的原因码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResetCode {
    Unspecified = 0,
    /// Normal connection close.
    /// 正常关闭连接。
    Closed = 1,
    /// The connection was aborted without a close handshake.
    /// 连接在没有关闭握手的情况下被中止。
    Aborted = 2,
    /// No connection exists for the received packet.
    /// 收到的包没有对应的连接。
    NoConnection = 3,
}

impl ResetCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ResetCode::Unspecified),
            1 => Some(ResetCode::Closed),
            2 => Some(ResetCode::Aborted),
            3 => Some(ResetCode::NoConnection),
            _ => None,
        }
    }
}

/// A packet as it travels over the simulated wire: full header plus
/// options and payload. The byte-level wire format is outside the core;
/// the sandbox link delivers this structured form directly.
///
/// 在模拟线路上传输的包：完整头部加选项与载荷。字节级线路格式不属于核心；
/// 沙盒链路直接投递这种结构化形式。
#[derive(Debug, Clone)]
pub struct Packet {
    pub ptype: PacketType,
    pub seq_no: i64,
    pub ack_no: i64,
    /// The 4-bit window counter (meaningful on Data/DataAck).
    /// 4位窗口计数器（在Data/DataAck上有意义）。
    pub ccval: i8,
    /// Present on Reset packets only.
    /// 仅出现在Reset包上。
    pub reset_code: Option<ResetCode>,
    pub options: Vec<RawOption>,
    pub payload: Bytes,
}

/// The outbound header view handed to congestion control just before a
/// packet is emitted. `time` is the send timestamp in runtime nanoseconds.
///
/// 在包发出前交给拥塞控制的出站头部视图。`time` 是以运行时纳秒计的发送时间戳。
#[derive(Debug, Clone)]
pub struct PreHeader {
    pub ptype: PacketType,
    pub seq_no: i64,
    pub ack_no: i64,
    pub ccval: i8,
    pub time: i64,
}

/// The feed-forward view of a validated inbound packet, as consumed by the
/// receiver congestion control. `time` is the arrival timestamp.
///
/// 经过验证的入站包的前馈视图，由接收端拥塞控制消费。`time` 是到达时间戳。
#[derive(Debug, Clone)]
pub struct FeedforwardHeader {
    pub ptype: PacketType,
    pub seq_no: i64,
    pub ccval: i8,
    pub time: i64,
    /// Payload length in bytes (zero for non-data packets).
    /// 载荷长度（非数据包为零）。
    pub data_len: usize,
    pub options: Vec<RawOption>,
}

impl FeedforwardHeader {
    /// Builds the feed-forward view of a received packet.
    /// 构建一个已接收包的前馈视图。
    pub fn from_packet(pkt: &Packet, arrival: i64) -> Self {
        Self {
            ptype: pkt.ptype,
            seq_no: pkt.seq_no,
            ccval: pkt.ccval,
            time: arrival,
            data_len: pkt.payload.len(),
            options: pkt.options.clone(),
        }
    }
}
