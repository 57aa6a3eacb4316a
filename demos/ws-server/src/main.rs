//! WebSocket server hosting the bridge with a browser console.
//!
//! Run with: cargo run -p ws-server-demo
//!
//! Then open http://localhost:3000 in your browser.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use axum::{Router, response::Html, routing::get};
use psh_bridge_core::{BridgeConfig, CommandInvoker, Scheduler};
use psh_bridge_host::{RUNNER_IMAGE, RhaiBackend, RuntimeHost};
use psh_bridge_transport::{BridgeState, TokioScheduler, websocket::create_ws_router};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ADDR_ENV: &str = "PSH_BRIDGE_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = BridgeConfig::from_env().context("Failed to load bridge configuration")?;

    let host = Arc::new(RuntimeHost::new(
        RhaiBackend::from_config(&config),
        config.clone(),
        RUNNER_IMAGE,
    ));
    host.initialize().context("Failed to initialize runtime host")?;
    tracing::info!("Runtime {} ready", config.runtime_version);

    let scheduler = Arc::new(TokioScheduler::new(tokio::runtime::Handle::current()));
    let state = BridgeState::new(
        Arc::clone(&host) as Arc<dyn CommandInvoker>,
        Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        &config,
    );

    let app = Router::new()
        .route("/", get(index_handler))
        .merge(create_ws_router(state))
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = match std::env::var(ADDR_ENV) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("Invalid {ADDR_ENV}: {raw}"))?,
        Err(_) => SocketAddr::from(([127, 0, 0, 1], 3000)),
    };
    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown: {e}");
            }
        })
        .await?;

    tracing::info!("Shutting down");
    scheduler.shutdown();
    host.teardown();
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>PSH Bridge - Console</title>
    <style>
        body {
            margin: 0;
            padding: 20px;
            background: #1e1e1e;
            color: #ddd;
            font-family: system-ui, sans-serif;
        }
        h1 { color: #fff; margin-bottom: 10px; }
        #output {
            font-family: monospace;
            white-space: pre-wrap;
            background: #111;
            padding: 10px;
            height: calc(100vh - 180px);
            overflow-y: auto;
        }
        #command { width: 100%; font-family: monospace; font-size: 14px; }
        .status { color: #888; font-size: 14px; margin-bottom: 10px; }
        .connected { color: #4a4; }
        .disconnected { color: #a44; }
    </style>
</head>
<body>
    <h1>PSH Bridge Console</h1>
    <div class="status" id="status">Connecting...</div>
    <div id="output"></div>
    <input id="command" placeholder="1 + 1" autofocus />

    <script>
        const output = document.getElementById('output');
        const status = document.getElementById('status');
        const input = document.getElementById('command');
        let nextId = 1;
        let channel = null;

        const ws = new WebSocket(`ws://${location.host}/ws`);
        const send = (msg) => ws.send(JSON.stringify(msg));
        const print = (text) => {
            output.textContent += text;
            output.scrollTop = output.scrollHeight;
        };

        ws.onopen = () => {
            status.textContent = 'Connected';
            status.className = 'status connected';
            send({ type: 'shell_start', request_id: nextId++ });
        };

        ws.onmessage = (event) => {
            const msg = JSON.parse(event.data);
            if (msg.type === 'response') {
                if (msg.channel_id !== undefined && channel === null) {
                    channel = msg.channel_id;
                    send({ type: 'channel_interact', request_id: nextId++, channel_id: channel, interact: true });
                    print('PS > ');
                } else if (msg.status !== 0) {
                    print(`\n[error ${msg.status}] ${msg.error || ''}\nPS > `);
                }
            } else if (msg.type === 'channel_data') {
                print(atob(msg.data));
            } else if (msg.type === 'error') {
                print(`\n[error] ${msg.message}\n`);
            }
        };

        ws.onclose = () => {
            status.textContent = 'Disconnected';
            status.className = 'status disconnected';
        };

        input.addEventListener('keydown', (event) => {
            if (event.key !== 'Enter' || channel === null) return;
            const command = input.value;
            input.value = '';
            print(command + '\n');
            send({ type: 'channel_write', request_id: nextId++, channel_id: channel, data: btoa(command) });
        });
    </script>
</body>
</html>
"#;
