//! 用于测试的模拟网络：把两个连接端点背靠背地接在一条进程内管道上。
//! The simulated network for testing: wires two connection endpoints
//! back-to-back over an in-process pipe.

use std::sync::Arc;

use tokio::time::Duration;

use crate::config::Config;
use crate::connection::Conn;
use crate::runtime::Runtime;

pub mod pipe;

pub use pipe::{drop_every_nth_data, DropPolicy, HeaderPipe, PipeStats};

const DEFAULT_LATENCY: Duration = Duration::from_millis(10);

/// A client/server connection pair joined by a simulated pipe, plus the
/// pipe ends themselves for installing drop policies and reading
/// counters.
/// 由模拟管道连接的客户端/服务端连接对，以及管道端点本身，用于安装丢包策略
/// 和读取计数器。
pub struct ClientServerPipe {
    pub client: Arc<Conn>,
    pub server: Arc<Conn>,
    /// The link the client sends into and reads from.
    pub client_link: Arc<HeaderPipe>,
    /// The link the server sends into and reads from.
    pub server_link: Arc<HeaderPipe>,
}

/// Builds a connected client/server pair with default configuration and
/// a 10 ms one-way latency. The handshake starts immediately.
/// 以默认配置和10毫秒单向延迟构建一对相连的客户端/服务端。握手立即开始。
pub fn client_server_pipe(runtime: &Arc<Runtime>) -> ClientServerPipe {
    client_server_pipe_with(runtime, Config::default(), DEFAULT_LATENCY)
}

/// Builds a connected client/server pair with explicit configuration and
/// latency.
/// 以显式配置和延迟构建一对相连的客户端/服务端。
pub fn client_server_pipe_with(
    runtime: &Arc<Runtime>,
    config: Config,
    latency: Duration,
) -> ClientServerPipe {
    let (client_link, server_link) = pipe::pipe(runtime, latency);
    let client = Conn::client(client_link.clone(), runtime.clone(), config.clone());
    let server = Conn::server(server_link.clone(), runtime.clone(), config);
    ClientServerPipe {
        client,
        server,
        client_link,
        server_link,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::State;

    #[tokio::test(start_paused = true)]
    async fn handshake_reaches_open_on_both_ends() {
        let run = Runtime::new();
        let net = client_server_pipe(&run);
        run.sleep(1_000_000_000).await;
        assert_eq!(net.client.state(), State::Open);
        assert_eq!(net.server.state(), State::Open);

        net.client.abort().await;
        net.server.abort().await;
        crate::runtime::join_all([net.client.waiter(), net.server.waiter()]).await;
    }
}
