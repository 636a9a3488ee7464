use tokio::select;
use tokio::{
    io::{stdin, AsyncBufReadExt, AsyncRead, BufReader},
    sync::{mpsc, oneshot},
};
use tracing::{error, warn};

use crate::hash_storage::HashStorage;
use crate::repl::*;

/// Executes every line piped in on stdin until EOF or ctrl-c
pub async fn process_from_stdin(storage: HashStorage) {
    let (send, mut recv) = mpsc::channel::<String>(100);
    let (ctlrs, mut ctlrc) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctlrs.send(());
        } else {
            std::future::pending::<()>().await;
        }
    });

    let read_task = tokio::spawn(async move {
        read_line_from_stdin(BufReader::new(stdin()), &send).await;
    });

    let process_task = tokio::spawn(async move {
        process_lines_from_stdin(storage, &mut recv, &mut ctlrc).await;
    });

    // Once processing stops there is nothing left to read for
    if let Err(e) = process_task.await {
        error!("processing task failed: {}", e);
    }
    read_task.abort();
}

async fn process_lines_from_stdin(
    mut storage: HashStorage,
    reciever: &mut mpsc::Receiver<String>,
    ctlrc_signal: &mut oneshot::Receiver<()>,
) {
    loop {
        select! {
            _ = &mut *ctlrc_signal => {
                break;
            }
            line = reciever.recv() => {
                let Some(line) = line else {
                    break;
                };
                if execute_user_input(&mut storage, Some(&line)) {
                    return;
                }
            }
        }
    }
    execute_user_input(&mut storage, Some("EXIT"));
}

async fn read_line_from_stdin<R: AsyncRead + Unpin>(reader: BufReader<R>, send: &mpsc::Sender<String>) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if send.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("failed to read stdin: {}", e);
                break;
            }
        }
    }
}
