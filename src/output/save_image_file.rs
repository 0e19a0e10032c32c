// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, input::EncodedImage, output::Render, pipeline::DetectOutcome,
};

/// 保存标注后的图像。
///
/// 路径是已存在的目录或以 `/` 结尾时，按输入名称生成 `<dir>/<stem>.jpg`；
/// 否则写入该文件，`.jpg`/`.jpeg` 直接写出编码结果，其它扩展名按格式重新编码。
pub struct SaveImageFileOutput {
  path: PathBuf,
  as_directory: bool,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(Self::new(uri.path()))
  }
}

fn is_jpeg(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}

impl SaveImageFileOutput {
  pub fn new(path: &str) -> Self {
    let as_directory = path.ends_with('/') || Path::new(path).is_dir();
    Self {
      path: PathBuf::from(path),
      as_directory,
    }
  }

  /// 本次输出实际写入的路径
  pub fn target_path(&self, frame: &EncodedImage) -> PathBuf {
    if self.as_directory {
      self.path.join(format!("{}.jpg", frame.stem()))
    } else {
      self.path.clone()
    }
  }

  fn save_image(&self, path: &Path, outcome: &DetectOutcome) -> Result<(), SaveImageFileError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    if is_jpeg(path) {
      std::fs::write(path, &outcome.jpeg)?;
    } else {
      outcome.image.save(path)?;
    }

    info!("保存图像到文件: {}", path.display());
    Ok(())
  }
}

impl Render<EncodedImage, DetectOutcome> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &EncodedImage, result: &DetectOutcome) -> Result<(), Self::Error> {
    let path = self.target_path(frame);
    self.save_image(&path, result)
  }
}
