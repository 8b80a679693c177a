//! 受保护的协议变量块：连接状态与序号。
//! The protected block of protocol variables: connection state and
//! sequence numbers.

/// The protocol state of an endpoint.
/// 端点的协议状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The passive side is waiting for a Request.
    /// 被动一侧正在等待Request。
    Listen,
    /// The active side has sent a Request and waits for a Response.
    /// 主动一侧已发送Request并等待Response。
    Request,
    /// The passive side has answered with a Response and waits for an Ack.
    /// 被动一侧已以Response应答并等待Ack。
    Respond,
    /// The active side has acknowledged the Response but has not yet seen
    /// a packet sent from the peer's OPEN state.
    /// 主动一侧已确认Response，但尚未见到对端在OPEN状态下发出的包。
    PartOpen,
    /// The connection is established.
    /// 连接已建立。
    Open,
    /// This side has asked the peer to close (CloseReq sent).
    /// 本侧已请求对端关闭（已发送CloseReq）。
    CloseReq,
    /// This side has sent a Close and waits for the peer's Reset.
    /// 本侧已发送Close并等待对端的Reset。
    Closing,
    /// The close handshake finished; late packets are absorbed until the
    /// linger period expires.
    /// 关闭握手已完成；在停留期结束前吸收迟到的包。
    TimeWait,
    /// The connection is dead.
    /// 连接已销毁。
    Closed,
}

/// The mutable protocol-variable record of one endpoint. The owning
/// connection guards it with a mutex held only across short critical
/// sections.
///
/// 一个端点的可变协议变量记录。所属连接用互斥锁保护它，且仅在短临界区内持有。
#[derive(Debug)]
pub struct Socket {
    state: State,
    /// Whether this endpoint is the passive (server) side.
    server: bool,

    /// Initial sequence number sent.
    iss: i64,
    /// Initial sequence number received.
    isr: i64,
    /// Greatest sequence number sent.
    gss: i64,
    /// Greatest sequence number received.
    gsr: i64,
    /// Greatest acknowledgement number received.
    gar: i64,

    /// CCID negotiated for the local-to-remote half connection.
    local_ccid: u8,
    /// CCID negotiated for the remote-to-local half connection.
    remote_ccid: u8,
}

impl Socket {
    pub fn new(server: bool, iss: i64, local_ccid: u8, remote_ccid: u8) -> Self {
        Self {
            state: if server { State::Listen } else { State::Request },
            server,
            iss,
            isr: 0,
            gss: iss,
            gsr: 0,
            gar: 0,
            local_ccid,
            remote_ccid,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub fn is_server(&self) -> bool {
        self.server
    }

    pub fn iss(&self) -> i64 {
        self.iss
    }

    pub fn isr(&self) -> i64 {
        self.isr
    }

    pub fn gsr(&self) -> i64 {
        self.gsr
    }

    pub fn gar(&self) -> i64 {
        self.gar
    }

    pub fn local_ccid(&self) -> u8 {
        self.local_ccid
    }

    pub fn remote_ccid(&self) -> u8 {
        self.remote_ccid
    }

    /// Consumes and returns the next outgoing sequence number. Every DCCP
    /// packet, including pure acknowledgements, occupies one.
    /// 取出并返回下一个出站序号。每个DCCP包（包括纯确认）都占用一个。
    pub fn next_seq_no(&mut self) -> i64 {
        self.gss += 1;
        self.gss
    }

    /// Records the first sequence number seen from the peer.
    /// 记录从对端看到的第一个序号。
    pub fn set_isr(&mut self, isr: i64) {
        self.isr = isr;
        self.update_gsr(isr);
    }

    /// Raises the greatest sequence received. The comparison is linear,
    /// not circular; 48-bit wraparound is not tracked.
    /// 抬升已接收的最大序号。比较是线性的而非循环的；不跟踪48位回绕。
    pub fn update_gsr(&mut self, seq_no: i64) {
        if seq_no > self.gsr {
            self.gsr = seq_no;
        }
    }

    /// Raises the greatest acknowledgement number received.
    /// 抬升已接收的最大确认号。
    pub fn update_gar(&mut self, ack_no: i64) {
        if ack_no > self.gar {
            self.gar = ack_no;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_follows_the_role() {
        assert_eq!(Socket::new(true, 100, 3, 3).state(), State::Listen);
        assert_eq!(Socket::new(false, 100, 3, 3).state(), State::Request);
    }

    #[test]
    fn sequence_numbers_advance_from_iss() {
        let mut sock = Socket::new(false, 100, 3, 3);
        assert_eq!(sock.next_seq_no(), 101);
        assert_eq!(sock.next_seq_no(), 102);
    }

    #[test]
    fn gsr_and_gar_never_regress() {
        let mut sock = Socket::new(true, 0, 3, 3);
        sock.update_gsr(10);
        sock.update_gsr(7);
        assert_eq!(sock.gsr(), 10);
        sock.update_gar(4);
        sock.update_gar(2);
        assert_eq!(sock.gar(), 4);
    }
}
