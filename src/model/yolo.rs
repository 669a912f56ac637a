// 该文件是 Lingyan （灵眼） 项目的一部分。
// src/model/yolo.rs - YOLO 检测流水线
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::cell::{Cell, RefCell};

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  engine::InferenceEngine,
  frame::RgbaFrame,
  letterbox::{LetterboxError, letterbox_into},
  model::{COCO_CLASSES, DetectItem, DetectResult, Model},
  tensor::{ChannelOrder, InputTensor, TensorDesc, TensorError, TensorLayout, encode_into},
};

use super::decode::{DecodeError, decode_output};
use super::nms::nms;

/// 流水线配置
#[derive(Debug, Clone)]
pub struct YoloConfig {
  /// 模型输入方形边长
  pub target_size: u32,
  /// 有序类别名，决定类别数 C 与标签文本
  pub class_names: Vec<String>,
  /// 面向用户的置信度阈值，在抑制之后恰好应用一次
  pub confidence_threshold: f32,
  /// NMS 重叠阈值
  pub iou_threshold: f32,
  /// 按类别分组抑制；默认跨类别比较
  pub class_aware_nms: bool,
  /// 输入张量布局描述
  pub tensor_desc: TensorDesc,
  /// 期望的引擎输入名；引擎未声明该名字时退回其首个声明的输入名
  pub input_name: String,
}

impl Default for YoloConfig {
  fn default() -> Self {
    Self {
      target_size: 640,
      class_names: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
      confidence_threshold: 0.7,
      iou_threshold: 0.45,
      class_aware_nms: false,
      tensor_desc: TensorDesc::default(),
      input_name: "images".to_string(),
    }
  }
}

impl YoloConfig {
  pub fn with_target_size(mut self, target_size: u32) -> Self {
    self.target_size = target_size;
    self
  }

  pub fn with_classes<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.class_names = names.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn with_class_aware_nms(mut self, class_aware: bool) -> Self {
    self.class_aware_nms = class_aware;
    self
  }

  pub fn with_tensor_desc(mut self, desc: TensorDesc) -> Self {
    self.tensor_desc = desc;
    self
  }

  pub fn with_input_name<S: Into<String>>(mut self, name: S) -> Self {
    self.input_name = name.into();
    self
  }
}

#[derive(Error, Debug)]
pub enum YoloError {
  #[error("无效帧: {0}")]
  InvalidFrame(#[from] LetterboxError),
  #[error("输出张量异常: {0}")]
  MalformedOutput(#[from] DecodeError),
  #[error("张量编码错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("推理引擎尚未就绪")]
  InferenceUnavailable,
  #[error("流水线忙，该帧被丢弃")]
  PipelineBusy,
  #[error("推理引擎没有产生输出")]
  NoOutput,
  #[error("推理引擎错误: {0}")]
  Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("模型地址错误: {0}")]
  ModelUrlError(String),
}

// 跨帧复用的缓冲，按 target_size 与候选规模增长后保持容量
#[derive(Default)]
struct Scratch {
  letterbox: Vec<u8>,
  tensor: Vec<f32>,
}

/// YOLO 检测流水线。
///
/// 引擎是跨帧共享的长生命周期句柄；调度纪律保证各帧调用串行，
/// 因此用单飞标志而不是锁来守护复用的缓冲。推理进行中再次进入
/// 时该帧以 [`YoloError::PipelineBusy`] 被丢弃而不是排队。
pub struct Yolo<E> {
  engine: Option<E>,
  config: YoloConfig,
  busy: Cell<bool>,
  scratch: RefCell<Scratch>,
}

impl<E: InferenceEngine> Yolo<E> {
  pub fn new(engine: E, config: YoloConfig) -> Self {
    Self {
      engine: Some(engine),
      config,
      busy: Cell::new(false),
      scratch: RefCell::new(Scratch::default()),
    }
  }

  /// 构造一个尚无引擎的惰性流水线。
  /// 在引擎挂载之前所有帧以 [`YoloError::InferenceUnavailable`] 被丢弃。
  pub fn inert(config: YoloConfig) -> Self {
    Self {
      engine: None,
      config,
      busy: Cell::new(false),
      scratch: RefCell::new(Scratch::default()),
    }
  }

  pub fn attach_engine(&mut self, engine: E) {
    info!("推理引擎已挂载");
    self.engine = Some(engine);
  }

  pub fn config(&self) -> &YoloConfig {
    &self.config
  }

  // 名字协商：优先配置的输入名，引擎未声明时退回其首个声明的输入名
  fn resolve_input_name<'a>(&'a self, engine: &'a E) -> &'a str {
    let declared = engine.input_names();
    if declared.is_empty() || declared.iter().any(|n| n == &self.config.input_name) {
      &self.config.input_name
    } else {
      debug!(
        "引擎未声明输入 {:?}，退回首个声明的输入 {:?}",
        self.config.input_name, declared[0]
      );
      declared[0].as_str()
    }
  }

  fn run_frame(&self, frame: &RgbaFrame) -> Result<DetectResult, YoloError> {
    let engine = self
      .engine
      .as_ref()
      .ok_or(YoloError::InferenceUnavailable)?;

    let mut scratch = self.scratch.borrow_mut();
    let Scratch { letterbox, tensor } = &mut *scratch;

    // 预处理：信箱化 + 张量编码
    let mapping = letterbox_into(frame, self.config.target_size, letterbox)?;
    let shape = encode_into(
      letterbox,
      self.config.target_size as usize,
      self.config.tensor_desc,
      tensor,
    )?;
    let input = InputTensor {
      data: &tensor[..],
      shape,
    };

    // 推理是流水线中唯一的悬挂点
    let input_name = self.resolve_input_name(engine);
    let outputs = engine
      .run(input_name, &input)
      .map_err(|e| YoloError::Engine(Box::new(e)))?;

    // 始终取首个声明的输出
    if let Some(name) = engine.output_names().first() {
      debug!("选用首个输出 {:?}", name);
    }
    let output = outputs.into_iter().next().ok_or(YoloError::NoOutput)?;
    if let Some(shape) = &output.shape {
      debug!("输出张量形状: {:?}，解码按长度推导行数", shape);
    }

    // 解码 + 抑制
    let candidates = decode_output(
      &output.data,
      self.config.class_names.len(),
      &mapping,
      frame.width(),
      frame.height(),
    )?;
    let mut keep = nms(
      &candidates,
      self.config.iou_threshold,
      self.config.class_aware_nms,
    );
    // 置信度阈值在抑制之后恰好应用一次
    keep.retain(|&i| candidates[i].score >= self.config.confidence_threshold);

    let items = keep
      .iter()
      .map(|&i| {
        let c = &candidates[i];
        DetectItem {
          class_id: c.class_id,
          label: self
            .config
            .class_names
            .get(c.class_id)
            .cloned()
            .unwrap_or_else(|| format!("id:{}", c.class_id)),
          score: c.score,
          bbox: c.bbox,
        }
      })
      .collect();

    Ok(DetectResult { items })
  }
}

impl<E: InferenceEngine> Model for Yolo<E> {
  type Input = RgbaFrame;
  type Output = DetectResult;
  type Error = YoloError;

  fn infer(&self, frame: &RgbaFrame) -> Result<DetectResult, YoloError> {
    // 单飞纪律：推理未归还前新到的帧被丢弃而不是排队
    if self.busy.replace(true) {
      return Err(YoloError::PipelineBusy);
    }
    let result = self.run_frame(frame);
    self.busy.set(false);
    result
  }
}

const YOLO_SCHEME: &str = "yolo";

/// 从 URL 构造流水线。
///
/// 形如 `yolo:///path/to/model.onnx?size=640&conf=0.7&iou=0.45&classes=eye`，
/// 未给出的参数保持默认值。
pub struct YoloBuilder {
  model_path: String,
  config: YoloConfig,
}

impl FromUrlWithScheme for YoloBuilder {
  const SCHEME: &'static str = YOLO_SCHEME;
}

impl FromUrl for YoloBuilder {
  type Error = YoloError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != YOLO_SCHEME {
      return Err(YoloError::ModelUrlError(format!(
        "模型地址必须使用 {} 方案，实际为 {}",
        YOLO_SCHEME,
        url.scheme()
      )));
    }

    let mut config = YoloConfig::default();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "size" => match value.parse() {
          Ok(size) => config.target_size = size,
          Err(_) => warn!("忽略无效的 size 参数: {}", value),
        },
        "conf" => match value.parse() {
          Ok(conf) => config.confidence_threshold = conf,
          Err(_) => warn!("忽略无效的 conf 参数: {}", value),
        },
        "iou" => match value.parse() {
          Ok(iou) => config.iou_threshold = iou,
          Err(_) => warn!("忽略无效的 iou 参数: {}", value),
        },
        "classes" => {
          config.class_names = value.split(',').map(|s| s.trim().to_string()).collect();
        }
        "input" => config.input_name = value.to_string(),
        "class-nms" => config.class_aware_nms = value != "off" && value != "false",
        "order" => {
          config.tensor_desc.order = if value == "bgr" {
            ChannelOrder::Bgr
          } else {
            ChannelOrder::Rgb
          };
        }
        "layout" => {
          config.tensor_desc.layout = if value == "nhwc" {
            TensorLayout::Nhwc
          } else {
            TensorLayout::Nchw
          };
        }
        _ => warn!("忽略未知参数: {}", key),
      }
    }

    Ok(YoloBuilder {
      model_path: url.path().to_string(),
      config,
    })
  }
}

impl YoloBuilder {
  pub fn config(mut self, config: YoloConfig) -> Self {
    self.config = config;
    self
  }

  #[cfg(feature = "engine_tract")]
  pub fn build(self) -> Result<Yolo<crate::engine::TractEngine>, YoloError> {
    let engine =
      crate::engine::TractEngine::from_model_path(&self.model_path, self.config.target_size)
        .map_err(|e| YoloError::Engine(Box::new(e)))?;
    Ok(Yolo::new(engine, self.config))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::StubEngine;

  fn eye_config() -> YoloConfig {
    YoloConfig::default().with_classes(["eye"])
  }

  #[test]
  fn inert_pipeline_drops_frames() {
    let yolo = Yolo::<StubEngine>::inert(eye_config());
    let frame = RgbaFrame::filled(16, 16, [0, 0, 0, 255]);
    match yolo.infer(&frame) {
      Err(YoloError::InferenceUnavailable) => {}
      other => panic!("期望 InferenceUnavailable, 得到 {:?}", other.map(|r| r.len())),
    }
  }

  #[test]
  fn busy_pipeline_drops_the_frame() {
    // 推理尚未归还时新到的帧被丢弃而不是排队
    let engine = StubEngine::new(vec![]);
    let yolo = Yolo::new(engine, eye_config());
    yolo.busy.set(true);

    let frame = RgbaFrame::filled(16, 16, [0, 0, 0, 255]);
    match yolo.infer(&frame) {
      Err(YoloError::PipelineBusy) => {}
      other => panic!("期望 PipelineBusy, 得到 {:?}", other.map(|r| r.len())),
    }

    // 归还后同一帧照常处理
    yolo.busy.set(false);
    assert!(yolo.infer(&frame).unwrap().is_empty());
  }

  #[test]
  fn attaching_engine_revives_inert_pipeline() {
    let mut yolo = Yolo::<StubEngine>::inert(eye_config());
    let frame = RgbaFrame::filled(16, 16, [0, 0, 0, 255]);
    assert!(matches!(
      yolo.infer(&frame),
      Err(YoloError::InferenceUnavailable)
    ));

    yolo.attach_engine(StubEngine::new(vec![]));
    assert!(yolo.infer(&frame).unwrap().is_empty());
  }

  #[test]
  fn falls_back_to_first_declared_input_name() {
    // 引擎声明的输入名与配置不同，协商应退回首个声明名
    let engine = StubEngine::new(vec![]).with_input_names(["input0"]);
    let yolo = Yolo::new(engine, eye_config());
    let frame = RgbaFrame::filled(16, 16, [0, 0, 0, 255]);
    let result = yolo.infer(&frame).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn malformed_output_is_reported() {
    // stride = 6 (C=1)，长度 7 不可整除
    let engine = StubEngine::new(vec![0.0; 7]);
    let yolo = Yolo::new(engine, eye_config());
    let frame = RgbaFrame::filled(16, 16, [0, 0, 0, 255]);
    match yolo.infer(&frame) {
      Err(YoloError::MalformedOutput(_)) => {}
      other => panic!("期望 MalformedOutput, 得到 {:?}", other.map(|r| r.len())),
    }
  }

  #[test]
  fn zero_size_frame_is_invalid_and_does_not_poison() {
    let engine = StubEngine::new(vec![]);
    let yolo = Yolo::new(engine, eye_config());
    let bad = RgbaFrame::new(0, 4, vec![]).unwrap();
    assert!(matches!(
      yolo.infer(&bad),
      Err(YoloError::InvalidFrame(_))
    ));

    // 错误只影响该帧，下一帧照常处理
    let good = RgbaFrame::filled(4, 4, [0, 0, 0, 255]);
    assert!(yolo.infer(&good).unwrap().is_empty());
  }

  #[test]
  fn builder_parses_query_parameters() {
    let url = Url::parse("yolo:///m/model.onnx?size=416&conf=0.6&iou=0.3&classes=eye,face&input=data&order=bgr&layout=nhwc").unwrap();
    let builder = YoloBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "/m/model.onnx");
    assert_eq!(builder.config.target_size, 416);
    assert!((builder.config.confidence_threshold - 0.6).abs() < 1e-6);
    assert!((builder.config.iou_threshold - 0.3).abs() < 1e-6);
    assert_eq!(builder.config.class_names, vec!["eye", "face"]);
    assert_eq!(builder.config.input_name, "data");
    assert_eq!(builder.config.tensor_desc.order, ChannelOrder::Bgr);
    assert_eq!(builder.config.tensor_desc.layout, TensorLayout::Nhwc);
  }

  #[test]
  fn builder_rejects_other_schemes() {
    let url = Url::parse("file:///m/model.onnx").unwrap();
    assert!(matches!(
      YoloBuilder::from_url(&url),
      Err(YoloError::ModelUrlError(_))
    ));
  }
}
