// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/store.rs - 模型目录
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
  fmt,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

use crate::model::labels::ClassList;

pub const MODEL_EXTENSION: &str = "onnx";
pub const CLASSES_EXTENSION: &str = "names";

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("模型目录不存在: {}", .0.display())]
  MissingDirectory(PathBuf),
  #[error("模型文件格式错误，必须是 .onnx 文件: {0}")]
  ModelExtension(String),
  #[error("类别文件格式错误，必须是 .names 文件: {0}")]
  ClassesExtension(String),
  #[error("文件不存在: {}", .0.display())]
  MissingFile(PathBuf),
  #[error("文件名不能包含路径: {0}")]
  NotAFileName(String),
  #[error("IO 错误: {0}")]
  Io(#[from] std::io::Error),
}

fn has_extension(name: &str, extension: &str) -> bool {
  Path::new(name)
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// 一对可一起加载的模型文件与类别文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPair {
  pub model: PathBuf,
  pub classes: PathBuf,
}

impl ModelPair {
  pub fn load_labels(&self) -> Result<ClassList, StoreError> {
    Ok(ClassList::from_path(&self.classes)?)
  }

  /// 当前模型的可读描述
  pub fn info(&self) -> ModelInfo {
    let model_size = std::fs::metadata(&self.model).ok().map(|m| m.len());
    let classes_present = self.classes.is_file();
    ModelInfo {
      model_name: file_name(&self.model),
      model_size,
      classes_name: file_name(&self.classes),
      classes_present,
    }
  }
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
  pub model_name: String,
  /// 模型文件字节数；文件不存在时为 `None`
  pub model_size: Option<u64>,
  pub classes_name: String,
  pub classes_present: bool,
}

impl fmt::Display for ModelInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.model_size {
      Some(size) => {
        writeln!(f, "当前模型: {}", self.model_name)?;
        writeln!(f, "模型大小: {} MB", size / 1024 / 1024)?;
      }
      None => writeln!(f, "当前模型不存在")?,
    }
    if self.classes_present {
      writeln!(f, "当前类别文件: {}", self.classes_name)
    } else {
      writeln!(f, "当前类别文件不存在")
    }
  }
}

/// 存放 `.onnx` 模型与 `.names` 类别文件的目录
#[derive(Debug, Clone)]
pub struct ModelStore {
  dir: PathBuf,
}

impl ModelStore {
  pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let dir = dir.into();
    if !dir.is_dir() {
      return Err(StoreError::MissingDirectory(dir));
    }
    info!("打开模型目录: {}", dir.display());
    Ok(Self { dir })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn list(&self, extension: &str) -> Result<Vec<String>, StoreError> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(&self.dir)? {
      let entry = entry?;
      if !entry.file_type()?.is_file() {
        continue;
      }
      let name = entry.file_name().to_string_lossy().into_owned();
      if has_extension(&name, extension) {
        names.push(name);
      }
    }
    names.sort();
    debug!("目录 {} 中的 .{} 文件: {:?}", self.dir.display(), extension, names);
    Ok(names)
  }

  pub fn available_models(&self) -> Result<Vec<String>, StoreError> {
    self.list(MODEL_EXTENSION)
  }

  pub fn available_class_files(&self) -> Result<Vec<String>, StoreError> {
    self.list(CLASSES_EXTENSION)
  }

  fn locate(&self, name: &str) -> Result<PathBuf, StoreError> {
    if Path::new(name).file_name().and_then(|n| n.to_str()) != Some(name) {
      return Err(StoreError::NotAFileName(name.to_string()));
    }
    let path = self.dir.join(name);
    if !path.is_file() {
      return Err(StoreError::MissingFile(path));
    }
    Ok(path)
  }

  /// 校验扩展名并定位一对模型与类别文件
  pub fn resolve(&self, model: &str, classes: &str) -> Result<ModelPair, StoreError> {
    if !has_extension(model, MODEL_EXTENSION) {
      return Err(StoreError::ModelExtension(model.to_string()));
    }
    if !has_extension(classes, CLASSES_EXTENSION) {
      return Err(StoreError::ClassesExtension(classes.to_string()));
    }
    Ok(ModelPair {
      model: self.locate(model)?,
      classes: self.locate(classes)?,
    })
  }
}
