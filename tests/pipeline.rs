// 该文件是 Lingyan （灵眼） 项目的一部分。
// tests/pipeline.rs - 流水线集成测试
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::cell::RefCell;
use std::rc::Rc;

use lingyan::{
  FromUrl,
  engine::StubEngine,
  frame::RgbaFrame,
  input::StubInput,
  model::{DetectResult, Model, Yolo, YoloConfig, YoloError},
  output::Render,
  task::{ContinuousTask, Task},
};
use url::Url;

fn eye_config() -> YoloConfig {
  YoloConfig::default().with_classes(["eye"])
}

// 1280x720 帧缩放 0.5 倍后居中于 640x640，纵向留 140 像素边
fn hd_frame() -> RgbaFrame {
  RgbaFrame::filled(1280, 720, [0, 0, 0, 255])
}

#[test]
fn detection_maps_back_to_source_coordinates() {
  // 模型坐标下中心 (150, 200) 宽高 100 的框，得分 0.9 * 0.95
  let engine = StubEngine::new(vec![150.0, 200.0, 100.0, 100.0, 0.9, 0.95]);
  let yolo = Yolo::new(engine, eye_config());

  let result = yolo.infer(&hd_frame()).unwrap();
  assert_eq!(result.len(), 1);

  let item = &result.items[0];
  assert_eq!(item.class_id, 0);
  assert_eq!(item.label, "eye");
  assert!((item.score - 0.855).abs() < 1e-4);
  assert!((item.bbox[0] - 200.0).abs() < 1e-3);
  assert!((item.bbox[1] - 20.0).abs() < 1e-3);
  assert!((item.bbox[2] - 400.0).abs() < 1e-3);
  assert!((item.bbox[3] - 220.0).abs() < 1e-3);
}

#[test]
fn overlapping_detections_keep_only_the_strongest() {
  // 两个完全重合的框，仅保留得分高者
  let engine = StubEngine::new(vec![
    150.0, 200.0, 100.0, 100.0, 1.0, 0.9, //
    150.0, 200.0, 100.0, 100.0, 1.0, 0.8,
  ]);
  let yolo = Yolo::new(engine, eye_config());

  let result = yolo.infer(&hd_frame()).unwrap();
  assert_eq!(result.len(), 1);
  assert!((result.items[0].score - 0.9).abs() < 1e-4);
}

#[test]
fn below_threshold_detections_are_discarded() {
  // 得分 0.65 低于默认阈值 0.7
  let engine = StubEngine::new(vec![150.0, 200.0, 100.0, 100.0, 1.0, 0.65]);
  let yolo = Yolo::new(engine, eye_config());

  let result = yolo.infer(&hd_frame()).unwrap();
  assert!(result.is_empty());
}

#[test]
fn lowered_threshold_admits_weaker_detections() {
  let engine = StubEngine::new(vec![150.0, 200.0, 100.0, 100.0, 1.0, 0.65]);
  let yolo = Yolo::new(engine, eye_config().with_confidence_threshold(0.5));

  let result = yolo.infer(&hd_frame()).unwrap();
  assert_eq!(result.len(), 1);
}

#[test]
fn empty_output_yields_empty_result() {
  let engine = StubEngine::new(vec![]);
  let yolo = Yolo::new(engine, eye_config());
  assert!(yolo.infer(&hd_frame()).unwrap().is_empty());
}

#[test]
fn mismatched_input_name_falls_back_to_declared_name() {
  // 配置期望 "images" 但引擎声明 "input0"，协商退回引擎声明名
  let engine =
    StubEngine::new(vec![150.0, 200.0, 100.0, 100.0, 0.9, 0.95]).with_input_names(["input0"]);
  let yolo = Yolo::new(engine, eye_config());

  let result = yolo.infer(&hd_frame()).unwrap();
  assert_eq!(result.len(), 1);
}

#[test]
fn non_multiple_output_length_is_malformed() {
  // stride = 6 (C=1)，长度 8 不可整除
  let engine = StubEngine::new(vec![0.0; 8]);
  let yolo = Yolo::new(engine, eye_config());

  assert!(matches!(
    yolo.infer(&hd_frame()),
    Err(YoloError::MalformedOutput(_))
  ));
}

#[cfg(feature = "save_image_file")]
#[test]
fn save_image_output_writes_annotated_file() {
  use lingyan::output::SaveImageFileOutput;

  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("result.png");
  let url = Url::parse(&format!("image://{}", path.display())).unwrap();
  let output = SaveImageFileOutput::from_url(&url).unwrap();

  let engine = StubEngine::new(vec![150.0, 200.0, 100.0, 100.0, 0.9, 0.95]);
  let yolo = Yolo::new(engine, eye_config());
  let frame = hd_frame();
  let result = yolo.infer(&frame).unwrap();

  output.render_result(&frame, &result).unwrap();
  assert!(path.exists());
}

#[cfg(feature = "directory_record")]
#[test]
fn directory_record_writes_sidecar_for_detections() {
  use lingyan::output::DirectoryRecordOutput;

  let dir = tempfile::tempdir().unwrap();
  let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
  let output = DirectoryRecordOutput::from_url(&url).unwrap();

  let engine = StubEngine::new(vec![150.0, 200.0, 100.0, 100.0, 0.9, 0.95]);
  let yolo = Yolo::new(engine, eye_config());
  let frame = hd_frame();
  let result = yolo.infer(&frame).unwrap();

  output.render_result(&frame, &result).unwrap();

  // 日期分片目录下应有 PNG 与 JSON 侧车
  let mut pngs = 0;
  let mut jsons = 0;
  for entry in walk(dir.path()) {
    match entry.extension().and_then(|e| e.to_str()) {
      Some("png") => pngs += 1,
      Some("json") => jsons += 1,
      _ => {}
    }
  }
  assert_eq!(pngs, 1);
  assert_eq!(jsons, 1);
}

#[cfg(feature = "directory_record")]
fn walk(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
  let mut files = Vec::new();
  for entry in std::fs::read_dir(dir).unwrap() {
    let path = entry.unwrap().path();
    if path.is_dir() {
      files.extend(walk(&path));
    } else {
      files.push(path);
    }
  }
  files
}

// 把渲染结果收集到内存的测试输出
struct CollectingOutput {
  results: Rc<RefCell<Vec<usize>>>,
}

impl Render<RgbaFrame, DetectResult> for CollectingOutput {
  type Error = std::convert::Infallible;

  fn render_result(&self, _frame: &RgbaFrame, result: &DetectResult) -> Result<(), Self::Error> {
    self.results.borrow_mut().push(result.len());
    Ok(())
  }
}

// ctrlc 处理器是进程级全局资源，持续任务只在这一个测试里运行
#[test]
fn continuous_task_survives_per_frame_errors() {
  let url = Url::parse("stub://?width=64&height=64&frames=3").unwrap();
  let input = StubInput::from_url(&url).unwrap();

  // 长度 8 不是 stride 6 的倍数，每帧推理都失败
  let engine = StubEngine::new(vec![0.0; 8]);
  let yolo = Yolo::new(engine, eye_config());
  let results = Rc::new(RefCell::new(Vec::new()));
  let output = CollectingOutput {
    results: results.clone(),
  };

  // 单帧错误不应终止任务循环
  let run = ContinuousTask::default()
    .with_frame_number(Some(3))
    .run_task(input, yolo, output);
  assert!(run.is_ok());
  assert!(results.borrow().is_empty());
}
