use std::sync::Arc;

use dagsync::{Config, EventKind, HttpFetcher, SessionBuilder, handler};

#[tokio::main]
async fn main() {
    let config_str = include_str!("./config.toml");

    let config = Config::load_from_str(config_str).unwrap();
    let session_id = config.session_id.clone();

    let fetcher = HttpFetcher::from_config(&config).unwrap();
    let session = Arc::new(SessionBuilder::new().config(config).source(Arc::new(fetcher.clone())).build().unwrap());

    session.on_rejected(|e| println!("Rejected event: {}", e));

    let _disconnects = session.registry().subscribe(
        EventKind::Disconnect,
        handler(|event| {
            println!("Disconnected: {}", event.payload);
            Ok(())
        }),
    );

    let supervisor = {
        let session = session.clone();
        tokio::spawn(async move { session.supervise().await })
    };

    fetcher.trigger_simulation(&session_id).await.unwrap();

    let mut updates = session.graph_updates();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => {
                let Ok(graph) = update else {
                    continue;
                };
                let stats = session.stats();
                println!(
                    "{} nodes, {} edges | running {} completed {} failed {} dead-end {} hitl {}",
                    graph.node_count(),
                    graph.edge_count(),
                    stats.running,
                    stats.completed,
                    stats.failed,
                    stats.dead_end,
                    stats.hitl_required
                );
                if stats.total > 0 && stats.running == 0 && stats.pending == 0 {
                    break;
                }
            }
        }
    }

    println!("Graph: {}", session.graph().schema());

    session.shutdown();
    supervisor.await.unwrap();
}
