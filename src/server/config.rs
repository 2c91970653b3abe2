#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port the WebSocket endpoint listens on.
    pub port: u16,
    /// TCP port for the metrics server (Prometheus scraping).
    pub metrics_port: u16,
    /// Outbound frame buffer depth per connected session. A session whose
    /// buffer is full loses frames instead of stalling its room.
    pub send_queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8080,
            metrics_port: 9090,
            send_queue_depth: 32,
        }
    }
}
