//! Sink de logs por paso: un único escritor por archivo.
//!
//! Cada paso tiene su archivo `<script>.log` dentro del run dir. El único
//! escritor es el consumidor interno; los productores (servidor IPC y el
//! eco de salida capturada) empujan `LogLine` por un canal acotado.

use std::io;
use std::path::Path;
use std::time::Duration;

use log::debug;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use taskflow_domain::LogLine;

use crate::constants::{SINK_CHANNEL_CAPACITY, SINK_POLL_MS};

/// Sink asíncrono de un archivo de log de paso.
pub struct LogSink {
    tx: mpsc::Sender<LogLine>,
    stop: watch::Sender<bool>,
    worker: JoinHandle<io::Result<u64>>,
}

impl LogSink {
    /// Crea (truncando) el archivo y arranca el consumidor.
    pub async fn open(path: &Path) -> io::Result<LogSink> {
        let file = OpenOptions::new().create(true)
                                     .write(true)
                                     .truncate(true)
                                     .open(path)
                                     .await?;
        let (tx, rx) = mpsc::channel(SINK_CHANNEL_CAPACITY);
        let (stop, stop_rx) = watch::channel(false);
        let worker = tokio::spawn(consume(file, rx, stop_rx));
        Ok(LogSink { tx, stop, worker })
    }

    /// Emisor clonable para los productores.
    pub fn sender(&self) -> mpsc::Sender<LogLine> { self.tx.clone() }

    /// Cierra el sink: drena todo lo encolado, espera al consumidor y
    /// devuelve cuántas líneas quedaron escritas.
    pub async fn close(self) -> io::Result<u64> {
        drop(self.tx);
        let _ = self.stop.send(true);
        match self.worker.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

/// Bucle consumidor: escribe y hace flush línea a línea, de modo que un
/// lector del archivo ve cada línea en cuanto se procesa.
async fn consume(mut file: File,
                 mut rx: mpsc::Receiver<LogLine>,
                 stop_rx: watch::Receiver<bool>) -> io::Result<u64> {
    let mut written = 0u64;
    loop {
        match timeout(Duration::from_millis(SINK_POLL_MS), rx.recv()).await {
            Ok(Some(line)) => {
                file.write_all(line.format_line().as_bytes()).await?;
                file.flush().await?;
                written += 1;
            }
            Ok(None) => break,
            Err(_) => {
                if *stop_rx.borrow() {
                    // Con stop señalado, drenar lo pendiente antes de salir.
                    while let Ok(line) = rx.try_recv() {
                        file.write_all(line.format_line().as_bytes()).await?;
                        file.flush().await?;
                        written += 1;
                    }
                    break;
                }
            }
        }
    }
    debug!("sink:closed lines={written}");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskflow_domain::LogLevel;

    fn temp_log(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("taskflow-sink-{}-{name}.log", std::process::id()))
    }

    #[tokio::test]
    async fn writes_lines_in_send_order() {
        let path = temp_log("order");
        let sink = LogSink::open(&path).await.expect("open");
        let tx = sink.sender();
        for i in 0..5 {
            tx.send(LogLine::new(LogLevel::Info, format!("line {i}"), "t.sh")).await.expect("send");
        }
        let written = sink.close().await.expect("close");
        assert_eq!(written, 5);

        let contents = std::fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(*line, format!("[INFO] line {i}"));
        }
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn close_drains_everything_queued() {
        let path = temp_log("drain");
        let sink = LogSink::open(&path).await.expect("open");
        let tx = sink.sender();
        for i in 0..50 {
            tx.send(LogLine::new(LogLevel::Debug, format!("queued {i}"), "t.sh")).await.expect("send");
        }
        drop(tx);
        let written = sink.close().await.expect("close");
        assert_eq!(written, 50, "no queued line may be lost on close");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn reopen_truncates_previous_contents() {
        let path = temp_log("trunc");
        std::fs::write(&path, "stale contents\n").expect("seed file");
        let sink = LogSink::open(&path).await.expect("open");
        sink.sender().send(LogLine::new(LogLevel::Warning, "fresh", "t.sh")).await.expect("send");
        sink.close().await.expect("close");
        let contents = std::fs::read_to_string(&path).expect("read log");
        assert_eq!(contents, "[WARNING] fresh\n");
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn open_fails_on_missing_directory() {
        let path = std::env::temp_dir().join("taskflow-sink-absent-dir").join("x.log");
        assert!(LogSink::open(&path).await.is_err());
    }
}
