//! ランドマーク受信サーバー
//!
//! 受信は tokio ランタイム上で動き、メインティックとは `Ingress` を介してだけやり取りする。

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::landmark::{LandmarkAdapter, PacketMailbox};
use crate::protocol::{self, ClientMessage, ServerMessage};

/// 直近のキャリブレーション要求の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStatus {
    Pending,
    Ready,
    Failed,
}

/// 受信側とメインティックの共有物
pub struct Ingress {
    adapter: LandmarkAdapter,
    mailbox: Arc<PacketMailbox>,
    asset_loaded: AtomicBool,
    calibration: watch::Sender<CalibrationStatus>,
    /// クライアントから届いた表情（名前, 値）
    expression_writes: Mutex<Vec<(String, f32)>>,
    /// 0 でない表情の最新値
    expression_snapshot: Mutex<Vec<(String, f32)>>,
}

impl Ingress {
    /// `asset_loaded` が true なら最初のティックでキャリブレーションする
    pub fn new(adapter: LandmarkAdapter, mailbox: Arc<PacketMailbox>, asset_loaded: bool) -> Self {
        let (calibration, _) = watch::channel(CalibrationStatus::Pending);
        Self {
            adapter,
            mailbox,
            asset_loaded: AtomicBool::new(asset_loaded),
            calibration,
            expression_writes: Mutex::new(Vec::new()),
            expression_snapshot: Mutex::new(Vec::new()),
        }
    }

    pub fn mailbox(&self) -> &PacketMailbox {
        &self.mailbox
    }

    /// アセット読み込み通知を取り出す（1回だけ true）
    pub fn take_asset_loaded(&self) -> bool {
        self.asset_loaded.swap(false, Ordering::AcqRel)
    }

    /// キャリブレーションを行ったティックの後に呼ぶ
    pub fn report_calibration(&self, ready: bool) {
        let status = if ready { CalibrationStatus::Ready } else { CalibrationStatus::Failed };
        log::debug!("calibration status -> {:?}", status);
        self.calibration.send_replace(status);
    }

    pub fn take_expression_writes(&self) -> Vec<(String, f32)> {
        match self.expression_writes.lock() {
            Ok(mut writes) => std::mem::take(&mut *writes),
            Err(_) => Vec::new(),
        }
    }

    pub fn publish_snapshot(&self, values: Vec<(String, f32)>) {
        if let Ok(mut snapshot) = self.expression_snapshot.lock() {
            *snapshot = values;
        }
    }

    fn snapshot(&self) -> Vec<(String, f32)> {
        self.expression_snapshot
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn push_expressions(&self, values: Vec<(String, f32)>) {
        if let Ok(mut writes) = self.expression_writes.lock() {
            writes.extend(values);
        }
    }

    /// 読み込みを通知し、メインティックが計測し終えるまで待つ
    async fn request_calibration(&self) -> Result<CalibrationStatus> {
        let mut status = self.calibration.subscribe();
        self.calibration.send_replace(CalibrationStatus::Pending);
        self.asset_loaded.store(true, Ordering::Release);
        let result = *status
            .wait_for(|s| *s != CalibrationStatus::Pending)
            .await
            .context("retarget loop stopped")?;
        Ok(result)
    }
}

async fn handle_client(stream: TcpStream, ingress: Arc<Ingress>) -> Result<()> {
    let mut framed = protocol::message_stream(stream);
    loop {
        let msg: ClientMessage = protocol::recv_message(&mut framed).await?;
        match msg {
            ClientMessage::Landmarks { stream, landmarks, .. } => {
                if let Some(packet) = ingress.adapter.accept(stream, landmarks.as_deref()) {
                    if !ingress.mailbox.publish(packet) {
                        return Ok(());
                    }
                }
            }
            ClientMessage::AssetLoaded => {
                let reply = match ingress.request_calibration().await? {
                    CalibrationStatus::Failed => ServerMessage::CalibrationFailed,
                    _ => ServerMessage::Ready,
                };
                protocol::send_message(&mut framed, &reply).await?;
            }
            ClientMessage::BlendShapes { values } => ingress.push_expressions(values),
            ClientMessage::QueryBlendShapes => {
                let values = ingress.snapshot();
                protocol::send_message(&mut framed, &ServerMessage::BlendShapes { values }).await?;
            }
        }
    }
}

/// 接続ごとにタスクを立てて受信する
pub async fn serve(listener: TcpListener, ingress: Arc<Ingress>) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true)?;
        log::info!("Client connected: {}", peer);
        let ingress = Arc::clone(&ingress);
        tokio::spawn(async move {
            match handle_client(stream, ingress).await {
                Ok(()) => log::info!("Client {} finished", peer),
                Err(e) => log::info!("Client {} disconnected: {:#}", peer, e),
            }
        });
    }
}
