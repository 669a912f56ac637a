// 该文件是 Lingyan （灵眼） 项目的一部分。
// src/engine/stub.rs - 桩推理引擎
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;

use super::InferenceEngine;
use crate::tensor::{InputTensor, OutputTensor};

#[derive(Error, Debug)]
pub enum StubEngineError {
  #[error("未知输入名: {0}")]
  UnknownInput(String),
}

/// 返回固定输出缓冲的桩引擎，用于测试与空跑。
pub struct StubEngine {
  input_names: Vec<String>,
  output_names: Vec<String>,
  canned: Vec<f32>,
  shape: Option<Vec<usize>>,
}

impl StubEngine {
  pub fn new(canned: Vec<f32>) -> Self {
    Self {
      input_names: vec!["images".to_string()],
      output_names: vec!["output0".to_string()],
      canned,
      shape: None,
    }
  }

  pub fn with_input_names<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.input_names = names.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
    self.shape = Some(shape);
    self
  }
}

impl InferenceEngine for StubEngine {
  type Error = StubEngineError;

  fn input_names(&self) -> &[String] {
    &self.input_names
  }

  fn output_names(&self) -> &[String] {
    &self.output_names
  }

  fn run(
    &self,
    input_name: &str,
    _input: &InputTensor<'_>,
  ) -> Result<Vec<OutputTensor>, Self::Error> {
    if !self.input_names.is_empty() && !self.input_names.iter().any(|n| n == input_name) {
      return Err(StubEngineError::UnknownInput(input_name.to_string()));
    }

    Ok(vec![OutputTensor {
      data: self.canned.clone(),
      shape: self.shape.clone(),
    }])
  }
}
