// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme, input::EncodedImage, output::Render, pipeline::DetectOutcome,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 按日期分目录保存结果：`dir/YYYY/MM/DD/HH-MM-SS-XXXX.jpg`。
///
/// `?record` 同时写出同名 `.json` 检测记录；没有 `?always` 时跳过空结果。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: bool,
  always: bool,
  frame_counter: AtomicU16,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      record,
      always,
      frame_counter: AtomicU16::new(0),
    })
  }
}

/// 给定时间与序号对应的记录路径
pub fn record_path(directory: &Path, now: &DateTime<Utc>, frame_id: u16) -> PathBuf {
  directory
    .join(now.year().to_string())
    .join(format!("{:02}", now.month()))
    .join(format!("{:02}", now.day()))
    .join(format!("{}-{:04X}.jpg", now.format("%H-%M-%S"), frame_id))
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn record_json(
    frame: &EncodedImage,
    outcome: &DetectOutcome,
    now: &DateTime<Utc>,
  ) -> serde_json::Value {
    serde_json::json!({
      "source": frame.name,
      "timestamp": now.to_rfc3339(),
      "width": outcome.image.width(),
      "height": outcome.image.height(),
      "detections": outcome.result.to_json(),
    })
  }
}

impl Render<EncodedImage, DetectOutcome> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &EncodedImage, result: &DetectOutcome) -> Result<(), Self::Error> {
    if !self.always && result.result.is_empty() {
      debug!("无检测结果, 跳过保存: {}", frame.name);
      return Ok(());
    }

    let now = Utc::now();
    let path = record_path(&self.directory, &now, self.frame_id());
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&path, &result.jpeg)?;
    if self.record {
      let record = Self::record_json(frame, result, &now);
      std::fs::write(
        path.with_extension("json"),
        serde_json::to_vec_pretty(&record)?,
      )?;
    }
    debug!("保存记录: {}", path.display());
    Ok(())
  }
}
