// 该文件是 Lingyan （灵眼） 项目的一部分。
// src/engine/tract.rs - tract-onnx 推理引擎
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;

use super::InferenceEngine;
use crate::tensor::{InputTensor, OutputTensor};

#[derive(Error, Debug)]
pub enum TractEngineError {
  #[error("模型加载错误: {0}")]
  Load(String),
  #[error("推理执行错误: {0}")]
  Run(String),
  #[error("输出张量类型不是 f32: {0}")]
  OutputType(String),
}

/// 基于 tract-onnx 的本地 ONNX 推理引擎。
///
/// 从磁盘加载模型并在 CPU 上执行；除加载模型外不做任何 I/O。
pub struct TractEngine {
  plan: TypedSimplePlan<TypedModel>,
  input_names: Vec<String>,
  output_names: Vec<String>,
}

impl TractEngine {
  /// 加载 ONNX 模型并固定输入形状为 `[1, 3, size, size]`。
  pub fn from_model_path<P: AsRef<Path>>(path: P, size: u32) -> Result<Self, TractEngineError> {
    let path = path.as_ref();
    info!("加载 ONNX 模型: {}", path.display());

    let model = tract_onnx::onnx()
      .model_for_path(path)
      .map_err(|e| TractEngineError::Load(e.to_string()))?;

    let input_names: Vec<String> = model
      .inputs
      .iter()
      .map(|o| model.node(o.node).name.clone())
      .collect();
    let output_names: Vec<String> = model
      .outputs
      .iter()
      .map(|o| model.node(o.node).name.clone())
      .collect();
    debug!("模型输入: {:?}, 输出: {:?}", input_names, output_names);

    let plan = model
      .with_input_fact(
        0,
        InferenceFact::dt_shape(
          f32::datum_type(),
          tvec!(1, 3, size as usize, size as usize),
        ),
      )
      .map_err(|e| TractEngineError::Load(e.to_string()))?
      .into_optimized()
      .map_err(|e| TractEngineError::Load(e.to_string()))?
      .into_runnable()
      .map_err(|e| TractEngineError::Load(e.to_string()))?;

    info!("模型加载完成");
    Ok(Self {
      plan,
      input_names,
      output_names,
    })
  }
}

impl InferenceEngine for TractEngine {
  type Error = TractEngineError;

  fn input_names(&self) -> &[String] {
    &self.input_names
  }

  fn output_names(&self) -> &[String] {
    &self.output_names
  }

  fn run(
    &self,
    _input_name: &str,
    input: &InputTensor<'_>,
  ) -> Result<Vec<OutputTensor>, Self::Error> {
    // tract 的输入按位置寻址，输入名只服务于日志与名字协商
    let array = tract_ndarray::ArrayD::from_shape_vec(
      tract_ndarray::IxDyn(&input.shape),
      input.data.to_vec(),
    )
    .map_err(|e| TractEngineError::Run(e.to_string()))?;

    let outputs = self
      .plan
      .run(tvec!(array.into_tensor().into()))
      .map_err(|e| TractEngineError::Run(e.to_string()))?;

    outputs
      .iter()
      .map(|tensor| {
        let view = tensor
          .to_array_view::<f32>()
          .map_err(|e| TractEngineError::OutputType(e.to_string()))?;
        Ok(OutputTensor {
          data: view.iter().cloned().collect(),
          shape: Some(view.shape().to_vec()),
        })
      })
      .collect()
  }
}
