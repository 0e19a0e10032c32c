// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::{collections::VecDeque, path::PathBuf};

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::EncodedImage};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("No image files in {}", .0.display())]
  NoImages(PathBuf),
}

/// 从单个文件或目录读取图像字节。
///
/// 目录只读取第一层的 `.jpg`/`.jpeg`/`.png` 文件，按文件名排序。
/// 文件在迭代时才读取，读取失败的文件会被记录并跳过。
#[derive(Debug)]
pub struct ImageFileInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(url.path())
  }
}

fn is_image(path: &std::path::Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

impl ImageFileInput {
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, ImageFileInputError> {
    let path = path.into();
    if !path.is_dir() {
      // 单文件：在这里确认可以打开
      std::fs::metadata(&path)?;
      return Ok(Self {
        pending: VecDeque::from([path]),
      });
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&path)? {
      let entry = entry?;
      let file = entry.path();
      if entry.file_type()?.is_file() && is_image(&file) {
        files.push(file);
      }
    }
    if files.is_empty() {
      return Err(ImageFileInputError::NoImages(path));
    }
    files.sort();
    info!("目录 {} 中共有 {} 张图像", path.display(), files.len());

    Ok(Self {
      pending: files.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl Iterator for ImageFileInput {
  type Item = EncodedImage;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.pending.pop_front() {
      match std::fs::read(&path) {
        Ok(bytes) => {
          return Some(EncodedImage::new(path.to_string_lossy(), bytes));
        }
        Err(e) => error!("读取图像文件失败 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn directory_is_sorted_and_filtered() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.png", "a.JPG", "notes.txt", "c.jpeg"] {
      std::fs::write(dir.path().join(name), name.as_bytes()).unwrap();
    }
    let input = ImageFileInput::open(dir.path()).unwrap();
    assert_eq!(input.remaining(), 3);
    let names: Vec<String> = input.map(|image| image.stem().to_string()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
  }

  #[test]
  fn single_file_yields_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.png");
    std::fs::write(&path, b"bytes").unwrap();
    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file://", "image://", 1)).unwrap();

    let mut input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!(input.next().map(|i| i.bytes), Some(b"bytes".to_vec()));
    assert!(input.next().is_none());
  }

  #[test]
  fn empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageFileInput::open(dir.path()),
      Err(ImageFileInputError::NoImages(_))
    ));
  }
}
