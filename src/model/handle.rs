// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/handle.rs - 推理会话句柄
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

use std::sync::{
  Arc, RwLock,
  atomic::{AtomicU64, Ordering},
};

use thiserror::Error;
use tracing::{info, warn};

use crate::model::{
  InferenceBackend,
  decode::{DecodeConvention, DecodeError, OutputLayout},
  labels::ClassList,
};

#[derive(Error, Debug)]
pub enum HandleError {
  #[error("类别数量与模型输出不一致: 模型声明 {declared} 个类别, 类别表有 {classes} 个")]
  ClassWidthMismatch { declared: usize, classes: usize },
  #[error("模型声明的输出无法识别: {0}")]
  DeclaredOutput(#[from] DecodeError),
  #[error("类别表为空")]
  EmptyClassList,
  #[error("推理句柄已关闭")]
  ShutDown,
  #[error("推理句柄锁已损坏")]
  Poisoned,
}

/// 一次加载得到的模型与类别表，二者总是成对替换
pub struct Session {
  backend: Box<dyn InferenceBackend>,
  labels: ClassList,
  convention: DecodeConvention,
  generation: u64,
}

impl Session {
  pub fn backend(&self) -> &dyn InferenceBackend {
    self.backend.as_ref()
  }

  pub fn labels(&self) -> &ClassList {
    &self.labels
  }

  pub fn convention(&self) -> DecodeConvention {
    self.convention
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }
}

impl std::fmt::Debug for Session {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Session")
      .field("backend", &self.backend.name())
      .field("classes", &self.labels.len())
      .field("convention", &self.convention)
      .field("generation", &self.generation)
      .finish()
  }
}

/// 检查类别表与模型声明的输出是否匹配；模型未声明输出形状时跳过
fn validate(
  backend: &dyn InferenceBackend,
  labels: &ClassList,
  convention: DecodeConvention,
) -> Result<(), HandleError> {
  if labels.is_empty() {
    return Err(HandleError::EmptyClassList);
  }
  let Some(shape) = backend.declared_output_shape() else {
    warn!("模型 {} 未声明输出形状, 跳过类别数量检查", backend.name());
    return Ok(());
  };
  let layout = OutputLayout::classify(&shape)?;
  match convention.class_width(layout.features()) {
    Some(declared) if declared == labels.len() => Ok(()),
    declared => Err(HandleError::ClassWidthMismatch {
      declared: declared.unwrap_or(0),
      classes: labels.len(),
    }),
  }
}

/// 进程内共享的推理句柄。
///
/// 读者只在克隆 `Arc` 时持有读锁，推理期间不持锁；`reload` 在锁外完成
/// 构建与校验，只在替换指针时持有写锁。已取出的快照不受重载影响。
#[derive(Debug)]
pub struct InferenceHandle {
  current: RwLock<Option<Arc<Session>>>,
  generation: AtomicU64,
}

impl InferenceHandle {
  pub fn create(
    backend: Box<dyn InferenceBackend>,
    labels: ClassList,
    convention: DecodeConvention,
  ) -> Result<Self, HandleError> {
    validate(backend.as_ref(), &labels, convention)?;
    info!(
      "创建推理句柄: 后端 {}, 输入 {} {:?}, 类别 {} 个, 解码约定 {}",
      backend.name(),
      backend.input_name(),
      backend.input_shape(),
      labels.len(),
      convention
    );
    let session = Session {
      backend,
      labels,
      convention,
      generation: 0,
    };
    Ok(Self {
      current: RwLock::new(Some(Arc::new(session))),
      generation: AtomicU64::new(0),
    })
  }

  /// 取出当前会话的快照
  pub fn snapshot(&self) -> Result<Arc<Session>, HandleError> {
    let guard = self.current.read().map_err(|_| HandleError::Poisoned)?;
    guard.as_ref().cloned().ok_or(HandleError::ShutDown)
  }

  /// 原子替换会话。校验失败时保留旧会话；返回新会话的代号。
  pub fn reload(
    &self,
    backend: Box<dyn InferenceBackend>,
    labels: ClassList,
    convention: DecodeConvention,
  ) -> Result<u64, HandleError> {
    if let Err(e) = validate(backend.as_ref(), &labels, convention) {
      warn!("重载被拒绝, 保留当前模型: {}", e);
      return Err(e);
    }

    let mut guard = self.current.write().map_err(|_| HandleError::Poisoned)?;
    if guard.is_none() {
      return Err(HandleError::ShutDown);
    }
    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
    let name = backend.name().to_string();
    let classes = labels.len();
    *guard = Some(Arc::new(Session {
      backend,
      labels,
      convention,
      generation,
    }));
    drop(guard);

    info!(
      "模型重载完成: 后端 {}, 类别 {} 个, 代号 {}",
      name, classes, generation
    );
    Ok(generation)
  }

  /// 关闭句柄。进行中的请求继续使用已取出的快照完成。
  pub fn shutdown(&self) -> Result<(), HandleError> {
    let mut guard = self.current.write().map_err(|_| HandleError::Poisoned)?;
    if guard.take().is_some() {
      info!("推理句柄已关闭");
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::NchwTensor,
    model::{InferenceError, RawOutput},
  };

  struct Fixed {
    name: &'static str,
    output_shape: Option<Vec<usize>>,
  }

  impl InferenceBackend for Fixed {
    fn name(&self) -> &str {
      self.name
    }

    fn input_name(&self) -> &str {
      "images"
    }

    fn input_shape(&self) -> [usize; 4] {
      [1, 3, 640, 640]
    }

    fn declared_output_shape(&self) -> Option<Vec<usize>> {
      self.output_shape.clone()
    }

    fn run(&self, _tensor: &NchwTensor) -> Result<RawOutput, InferenceError> {
      Err(InferenceError::NoOutput)
    }
  }

  fn backend(name: &'static str, output_shape: Option<Vec<usize>>) -> Box<dyn InferenceBackend> {
    Box::new(Fixed { name, output_shape })
  }

  #[test]
  fn accepts_matching_class_width() {
    let handle = InferenceHandle::create(
      backend("yolo", Some(vec![1, 84, 8400])),
      ClassList::coco(),
      DecodeConvention::DirectProbability,
    )
    .unwrap();
    let session = handle.snapshot().unwrap();
    assert_eq!(session.generation(), 0);
    assert_eq!(session.labels().len(), 80);
  }

  #[test]
  fn rejects_mismatched_class_width() {
    let err = InferenceHandle::create(
      backend("yolo", Some(vec![1, 84, 8400])),
      ClassList::from_names(["a", "b"]),
      DecodeConvention::DirectProbability,
    )
    .unwrap_err();
    assert!(matches!(
      err,
      HandleError::ClassWidthMismatch {
        declared: 80,
        classes: 2
      }
    ));

    // 同一形状在 sigmoid 约定下只有 79 个类别
    let err = InferenceHandle::create(
      backend("yolo", Some(vec![1, 84, 8400])),
      ClassList::coco(),
      DecodeConvention::SigmoidObjectness,
    )
    .unwrap_err();
    assert!(matches!(err, HandleError::ClassWidthMismatch { declared: 79, .. }));
  }

  #[test]
  fn undeclared_output_skips_check() {
    assert!(
      InferenceHandle::create(
        backend("opaque", None),
        ClassList::from_names(["only"]),
        DecodeConvention::DirectProbability,
      )
      .is_ok()
    );
  }

  #[test]
  fn reload_swaps_and_keeps_old_snapshot() {
    let handle = InferenceHandle::create(
      backend("first", None),
      ClassList::from_names(["a"]),
      DecodeConvention::DirectProbability,
    )
    .unwrap();
    let before = handle.snapshot().unwrap();

    let generation = handle
      .reload(
        backend("second", None),
        ClassList::from_names(["x", "y"]),
        DecodeConvention::SigmoidObjectness,
      )
      .unwrap();
    assert_eq!(generation, 1);

    assert_eq!(before.backend().name(), "first");
    assert_eq!(before.labels().len(), 1);

    let after = handle.snapshot().unwrap();
    assert_eq!(after.backend().name(), "second");
    assert_eq!(after.labels().len(), 2);
    assert_eq!(after.convention(), DecodeConvention::SigmoidObjectness);
  }

  #[test]
  fn rejected_reload_keeps_previous_session() {
    let handle = InferenceHandle::create(
      backend("first", None),
      ClassList::coco(),
      DecodeConvention::DirectProbability,
    )
    .unwrap();
    let err = handle
      .reload(
        backend("bad", Some(vec![1, 84, 8400])),
        ClassList::from_names(["a"]),
        DecodeConvention::DirectProbability,
      )
      .unwrap_err();
    assert!(matches!(err, HandleError::ClassWidthMismatch { .. }));
    assert_eq!(handle.snapshot().unwrap().backend().name(), "first");
  }

  #[test]
  fn snapshot_after_shutdown_fails() {
    let handle = InferenceHandle::create(
      backend("first", None),
      ClassList::coco(),
      DecodeConvention::DirectProbability,
    )
    .unwrap();
    let in_flight = handle.snapshot().unwrap();
    handle.shutdown().unwrap();

    assert!(matches!(handle.snapshot(), Err(HandleError::ShutDown)));
    assert!(matches!(
      handle.reload(
        backend("late", None),
        ClassList::coco(),
        DecodeConvention::DirectProbability
      ),
      Err(HandleError::ShutDown)
    ));
    assert_eq!(in_flight.backend().name(), "first");
  }
}
