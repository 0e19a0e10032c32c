// 该文件是 Kanjian （看见） 项目的一部分。
// tests/pipeline.rs - 端到端检测测试
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

mod common;

use std::sync::{Arc, atomic::Ordering};

use common::{FailingBackend, Row, ScriptedBackend, png_bytes, transposed};
use image::Rgb;
use kanjian::{
  DetectConfig, DetectError, Detector,
  model::{ClassList, DecodeConvention, DecodeError, HandleError, InferenceHandle, Model},
  input::EncodedImage,
};

fn street_rows() -> Vec<Row> {
  vec![
    // dog，映射回原图为 (540, 260, 740, 460)
    Row { cx: 320.0, cy: 320.0, w: 100.0, h: 100.0, class: 1, score: 0.9 },
    // 与上一个高度重叠的同类框，应被抑制
    Row { cx: 322.0, cy: 322.0, w: 100.0, h: 100.0, class: 1, score: 0.8 },
    // cat，映射回原图为 (160, 80, 240, 160)
    Row { cx: 100.0, cy: 200.0, w: 40.0, h: 40.0, class: 0, score: 0.6 },
    // 低于阈值
    Row { cx: 500.0, cy: 500.0, w: 20.0, h: 20.0, class: 0, score: 0.1 },
  ]
}

fn street_detector(config: DetectConfig) -> (Detector, Arc<std::sync::atomic::AtomicUsize>) {
  let backend = ScriptedBackend::new("scripted", 640, 640, transposed(2, &street_rows()));
  let calls = backend.calls();
  let handle = InferenceHandle::create(
    Box::new(backend.declaring_output()),
    ClassList::from_names(["cat", "dog"]),
    DecodeConvention::DirectProbability,
  )
  .unwrap();
  (Detector::new(Arc::new(handle), config).unwrap(), calls)
}

#[test]
fn png_in_jpeg_out_with_expected_detections() {
  let (detector, calls) = street_detector(DetectConfig::default());
  let bytes = png_bytes(1280, 720, Rgb([90, 90, 90]));

  let outcome = detector.run(&bytes).unwrap();
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  let items = &outcome.result.items;
  assert_eq!(items.len(), 2);
  assert_eq!(items[0].class_name, "dog");
  assert_eq!(items[0].score, 0.9);
  assert_eq!(items[0].bbox, [540.0, 260.0, 740.0, 460.0]);
  assert_eq!(items[1].class_name, "cat");
  assert_eq!(items[1].bbox, [160.0, 80.0, 240.0, 160.0]);

  let decoded = image::load_from_memory_with_format(&outcome.jpeg, image::ImageFormat::Jpeg)
    .unwrap()
    .to_rgb8();
  assert_eq!(decoded.dimensions(), (1280, 720));
  assert_eq!(outcome.image.dimensions(), (1280, 720));

  // 框的左边沿被绘制成 dog 的颜色
  let dog = kanjian::output::draw::ColorStrategy::ClassHash.color(1);
  assert_eq!(*outcome.image.get_pixel(540, 360), dog);
  assert_eq!(*outcome.image.get_pixel(640, 360), Rgb([90, 90, 90]));
}

#[test]
fn detect_returns_jpeg_bytes() {
  let (detector, _) = street_detector(DetectConfig::default());
  let jpeg = detector.detect(&png_bytes(320, 240, Rgb([0, 0, 0]))).unwrap();
  assert_eq!(image::guess_format(&jpeg).unwrap(), image::ImageFormat::Jpeg);
}

#[test]
fn max_detections_truncates_after_nms() {
  let config = DetectConfig {
    max_detections: Some(1),
    ..DetectConfig::default()
  };
  let (detector, _) = street_detector(config);
  let outcome = detector.run(&png_bytes(1280, 720, Rgb([0, 0, 0]))).unwrap();
  assert_eq!(outcome.result.len(), 1);
  assert_eq!(outcome.result.items[0].class_name, "dog");
}

#[test]
fn undecodable_bytes_abort_without_inference() {
  let (detector, calls) = street_detector(DetectConfig::default());
  let err = detector.run(b"not an image").unwrap_err();
  assert!(matches!(err, DetectError::ImageDecode(_)));
  assert_eq!(calls.load(Ordering::SeqCst), 0);

  // 失败的请求不影响下一次请求
  assert!(detector.run(&png_bytes(64, 64, Rgb([1, 2, 3]))).is_ok());
}

#[test]
fn unsupported_output_shape_is_reported() {
  let backend = ScriptedBackend::new(
    "tiny",
    640,
    640,
    kanjian::model::RawOutput::new(vec![1, 6, 10], vec![0.0; 60]),
  );
  let handle = InferenceHandle::create(
    Box::new(backend),
    ClassList::from_names(["a", "b"]),
    DecodeConvention::DirectProbability,
  )
  .unwrap();
  let detector = Detector::new(Arc::new(handle), DetectConfig::default()).unwrap();
  let err = detector.run(&png_bytes(64, 64, Rgb([0, 0, 0]))).unwrap_err();
  assert!(matches!(err, DetectError::Decode(DecodeError::UnsupportedOutputShape(_))));
}

#[test]
fn inference_failure_surfaces() {
  let handle = InferenceHandle::create(
    Box::new(FailingBackend),
    ClassList::coco(),
    DecodeConvention::DirectProbability,
  )
  .unwrap();
  let detector = Detector::new(Arc::new(handle), DetectConfig::default()).unwrap();
  let err = detector.run(&png_bytes(64, 64, Rgb([0, 0, 0]))).unwrap_err();
  assert!(matches!(err, DetectError::Inference(_)));
}

#[test]
fn input_size_must_match_backend() {
  let backend = ScriptedBackend::new("small", 320, 320, transposed(2, &[]));
  let handle = InferenceHandle::create(
    Box::new(backend),
    ClassList::from_names(["cat", "dog"]),
    DecodeConvention::DirectProbability,
  )
  .unwrap();
  let err = Detector::new(Arc::new(handle), DetectConfig::default()).err();
  assert!(matches!(err, Some(DetectError::InputSizeMismatch { .. })));
}

#[test]
fn invalid_config_is_rejected() {
  let handle = InferenceHandle::create(
    Box::new(FailingBackend),
    ClassList::coco(),
    DecodeConvention::DirectProbability,
  )
  .unwrap();
  let config = DetectConfig::default().with_thresholds(1.5, 0.45);
  assert!(matches!(
    Detector::new(Arc::new(handle), config),
    Err(DetectError::Configuration(_))
  ));
}

#[test]
fn shut_down_handle_fails_requests() {
  let (detector, _) = street_detector(DetectConfig::default());
  detector.handle().shutdown().unwrap();
  let err = detector.run(&png_bytes(64, 64, Rgb([0, 0, 0]))).unwrap_err();
  assert!(matches!(err, DetectError::Handle(HandleError::ShutDown)));
}

#[test]
fn model_trait_runs_encoded_images() {
  let (detector, _) = street_detector(DetectConfig::default());
  let frame = EncodedImage::new("street.png", png_bytes(1280, 720, Rgb([0, 0, 0])));
  let outcome = detector.infer(&frame).unwrap();
  assert_eq!(outcome.result.len(), 2);
}
