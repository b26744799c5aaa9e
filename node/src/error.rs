use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("full-node client error: {0}")]
    Rpc(#[from] fastblocks_rpc::RpcError),

    #[error("upstream error: {0}")]
    Upstream(#[from] fastblocks_websocket::UpstreamError),

    #[error("ingress server error: {0}")]
    Server(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("node is not bound to a listen address")]
    NotBound,
}
