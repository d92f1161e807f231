use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::manager::TaskManager;
use crate::router::OutputRouter;
use crate::types::Turn;

/// Line-delimited IPC server on the loopback interface. One line in is one
/// submission; replies for that connection come back on the same socket,
/// newline-terminated.
pub async fn run_ipc_server(
    bind: &str,
    manager: Arc<TaskManager>,
    router: Arc<OutputRouter>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %bind, "IPC server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let manager = Arc::clone(&manager);
        let router = Arc::clone(&router);
        tokio::spawn(async move {
            handle_client(stream, &format!("ipc_{}", peer), manager, router).await;
        });
    }
}

async fn handle_client(
    stream: TcpStream,
    source: &str,
    manager: Arc<TaskManager>,
    router: Arc<OutputRouter>,
) {
    info!(source = %source, "IPC client connected");
    let (reader, mut writer) = stream.into_split();

    // The write half lives behind a channel so the router can address this
    // connection while we sit in the read loop.
    let (tx, mut rx) = mpsc::channel::<String>(32);
    router.register_live(source, tx).await;

    let writer_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            let mut payload = text.into_bytes();
            payload.push(b'\n');
            if writer.write_all(&payload).await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                let turn = Turn::new(source, None, text);
                if let Err(e) = manager.submit(turn).await {
                    warn!(source = %source, "IPC submission failed: {}", e);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(source = %source, "IPC read error: {}", e);
                break;
            }
        }
    }

    router.unregister_live(source).await;
    writer_task.abort();
    info!(source = %source, "IPC client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use crate::testing::{BlockingRunner, CaptureChannel};
    use crate::traits::Channel;

    #[tokio::test]
    async fn line_in_reply_out_on_same_connection() {
        let runner = Arc::new(BlockingRunner::new());
        let console = Arc::new(CaptureChannel::new("console"));
        let router = Arc::new(OutputRouter::new(
            vec![console as Arc<dyn Channel>],
            "console",
        ));
        let manager = Arc::new(TaskManager::new(
            runner.clone(),
            router.clone(),
            Duration::from_millis(10),
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        {
            let manager = Arc::clone(&manager);
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let (stream, peer) = listener.accept().await.unwrap();
                handle_client(stream, &format!("ipc_{}", peer), manager, router).await;
            });
        }

        let mut client = TcpStream::connect(addr).await.unwrap();
        let source = format!("ipc_{}", client.local_addr().unwrap());
        client.write_all(b"what time is it\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The line was admitted as a turn from this connection.
        assert!(manager.is_busy().await);

        // Replies addressed to the live source come back on the socket,
        // newline-terminated.
        router.deliver(&source, "it is noon").await;
        let mut buf = vec![0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"it is noon\n");

        runner.finish();
    }
}
