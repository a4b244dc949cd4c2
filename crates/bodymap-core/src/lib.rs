//! # BodyMap Core
//!
//! 映射引擎的核心模块，提供基础数据结构、错误定义和通用文本工具。

pub mod error;
pub mod models;
pub mod utils;

pub use error::{BodyMapError, Result};
pub use models::*;
