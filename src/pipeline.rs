// 该文件是 Kanjian （看见） 项目的一部分。
// src/pipeline.rs - 检测流水线
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

use std::{sync::Arc, time::Instant};

use image::{RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::{ConfigError, DetectConfig},
  frame::NchwTensor,
  input::{EncodedImage, ImageDecodeError, decode_image},
  model::{
    DetectResult, HandleError, InferenceBackend, InferenceError, InferenceHandle, Model,
    decode::{CandidateRows, DecodeError},
    filter::{ConfidenceFilter, collect_detections},
    nms::nms,
  },
  output::draw::{Draw, DrawError},
  preprocess::{PreprocessError, letterbox},
};

const INPUT_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("{0}")]
  ImageDecode(#[from] ImageDecodeError),
  #[error("预处理失败: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("{0}")]
  Decode(#[from] DecodeError),
  #[error("{0}")]
  Inference(#[from] InferenceError),
  #[error("配置错误: {0}")]
  Configuration(#[from] ConfigError),
  #[error("配置的输入尺寸 [1, 3, {height}, {width}] 与模型输入 {backend:?} 不一致")]
  InputSizeMismatch {
    width: u32,
    height: u32,
    backend: [usize; 4],
  },
  #[error("{0}")]
  Handle(HandleError),
  #[error("{0}")]
  Draw(#[from] DrawError),
  #[error("JPEG 编码失败: {0}")]
  Encode(#[source] image::ImageError),
}

impl From<HandleError> for DetectError {
  fn from(e: HandleError) -> Self {
    match e {
      // 类别表与模型不一致属于配置错误
      HandleError::ClassWidthMismatch { declared, classes } => {
        DetectError::Configuration(ConfigError::ClassWidth { declared, classes })
      }
      other => DetectError::Handle(other),
    }
  }
}

/// 一次检测的结果：标注后的原图、检测列表与 JPEG 编码
#[derive(Debug, Clone)]
pub struct DetectOutcome {
  pub image: RgbImage,
  pub result: DetectResult,
  pub jpeg: Vec<u8>,
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, DetectError> {
  let mut buffer = Vec::new();
  JpegEncoder::new_with_quality(&mut buffer, quality)
    .encode_image(image)
    .map_err(DetectError::Encode)?;
  Ok(buffer)
}

/// 检测入口。
///
/// 每次请求从句柄取出会话快照，之后全程使用该快照与只读配置，
/// 并发的重载不会让单次请求看到新旧混合的模型与类别表。
pub struct Detector {
  handle: Arc<InferenceHandle>,
  config: DetectConfig,
  draw: Draw<'static>,
}

impl Detector {
  pub fn new(handle: Arc<InferenceHandle>, config: DetectConfig) -> Result<Self, DetectError> {
    config.validate()?;
    let draw = Draw::new(config.line_thickness_ratio, config.color_strategy)?;
    let detector = Self {
      handle,
      config,
      draw,
    };
    let session = detector.handle.snapshot()?;
    detector.check_input_size(session.backend())?;
    info!(
      "检测器就绪: 置信度阈值 {}, NMS 阈值 {}, 输入 {}x{}, 通道顺序 {}",
      detector.config.confidence_threshold,
      detector.config.nms_threshold,
      detector.config.input_width,
      detector.config.input_height,
      detector.config.channel_order
    );
    Ok(detector)
  }

  pub fn handle(&self) -> &Arc<InferenceHandle> {
    &self.handle
  }

  pub fn config(&self) -> &DetectConfig {
    &self.config
  }

  fn check_input_size(&self, backend: &dyn InferenceBackend) -> Result<(), DetectError> {
    let expected = [
      1,
      INPUT_CHANNELS,
      self.config.input_height as usize,
      self.config.input_width as usize,
    ];
    let actual = backend.input_shape();
    if actual != expected {
      return Err(DetectError::InputSizeMismatch {
        width: self.config.input_width,
        height: self.config.input_height,
        backend: actual,
      });
    }
    Ok(())
  }

  /// 完整执行一次检测
  pub fn run(&self, bytes: &[u8]) -> Result<DetectOutcome, DetectError> {
    let started = Instant::now();
    let config = &self.config;
    let session = self.handle.snapshot()?;
    self.check_input_size(session.backend())?;

    let mut image = decode_image(bytes)?;
    let boxed = letterbox(&image, config.input_width, config.input_height, config.fill)?;
    let tensor = NchwTensor::from_rgb(&boxed.image, config.channel_order);
    let preprocessed = started.elapsed();

    let raw = session.backend().run(&tensor)?;
    let inferred = started.elapsed();
    debug!(
      "模型 {} (代号 {}) 输出形状: {:?}",
      session.backend().name(),
      session.generation(),
      raw.shape
    );

    let rows = CandidateRows::from_output(&raw)?;
    let (detections, _) = collect_detections(
      &rows,
      session.convention(),
      session.labels(),
      ConfidenceFilter::new(config.confidence_threshold),
      &boxed.params,
    );
    let mut survivors = nms(detections, config.nms_threshold);
    if let Some(max) = config.max_detections {
      survivors.truncate(max);
    }
    let result = DetectResult::from(survivors);
    debug!("NMS 后保留 {} 个检测结果", result.len());

    self.draw.draw_detections(&mut image, &result);
    let jpeg = encode_jpeg(&image, config.jpeg_quality)?;

    info!(
      "检测完成: {} 个目标, 预处理 {:.2?}, 推理 {:.2?}, 总计 {:.2?}",
      result.len(),
      preprocessed,
      inferred - preprocessed,
      started.elapsed()
    );

    Ok(DetectOutcome { image, result, jpeg })
  }

  /// 输入 JPEG/PNG 字节，返回标注后的 JPEG 字节
  pub fn detect(&self, bytes: &[u8]) -> Result<Vec<u8>, DetectError> {
    Ok(self.run(bytes)?.jpeg)
  }
}

impl Model for Detector {
  type Input = EncodedImage;
  type Output = DetectOutcome;
  type Error = DetectError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("处理图像: {}", input.name);
    self.run(&input.bytes)
  }
}
