//! Scenario tests driving the whole engine against the loopback client

mod session_lifecycle;

use crate::config::Config;
use crate::core_engine::Engine;
use crate::core_protocol::LoopbackClient;
use std::sync::Arc;
use std::time::Duration;

/// Poll `condition` until it holds, failing the test after two seconds
pub(super) async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Engine with no pacing delay around `client`
pub(super) fn start_engine(client: LoopbackClient) -> (Arc<LoopbackClient>, Arc<Engine>) {
    let mut config = Config::default();
    config.dispatch.pacing_delay = Duration::ZERO;
    let client = Arc::new(client);
    let engine = Engine::start(client.clone(), &config);
    (client, engine)
}
