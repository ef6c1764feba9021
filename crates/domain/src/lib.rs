//! 便签系统核心领域模型
//!
//! 包含便签实体、值对象、错误类型，以及便签存储的抽象接口。

pub mod errors;
pub mod note;
pub mod repository;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use note::*;
pub use repository::*;
pub use value_objects::*;
