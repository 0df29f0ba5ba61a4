// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use tokio::signal;
use tokio::sync::broadcast;
use tracing::error;

/// Fans a single Ctrl-C (or SIGTERM) out to every subscriber.
pub struct SignalManager {
    sender: broadcast::Sender<()>,
}

impl Default for SignalManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalManager {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        SignalManager { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn start(&self) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = sender.send(());
        });
    }
}

async fn shutdown_signal() {
    let ctrl_c_signal = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Error installing Ctrl+C signal handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate_signal = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Error installing terminate signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate_signal = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c_signal => {},
        _ = terminate_signal => {},
    };
}
