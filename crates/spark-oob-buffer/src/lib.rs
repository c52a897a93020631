//! `spark-oob-buffer` 为序列化层提供带外（out-of-band）零拷贝缓冲句柄。
//!
//! # 模块定位（Why）
//! - 序列化大块二进制数据时，与其把字节内联进编码流，不如把内存区间按引用交给传输层；
//!   本 crate 提供这一协商所依赖的句柄抽象，而不涉及编码本身。
//! - 句柄必须在“暴露原始内存视图”与“视图绝不在导出方失效后被读写”之间取得平衡，
//!   因此生命周期被建模为显式的获取/释放协议。
//!
//! # 设计概要（How）
//! - `exporter` 模块定义 [`BufferExporter`]：导出方只需实现“导出视图”与“归还视图”两个操作；
//! - `descriptor` 模块实现 [`ViewDescriptor`] 与连续性判定；
//! - `handle` 模块实现 [`BufferHandle`]：构造时获取视图、`release` 幂等释放、`Drop` 兜底释放；
//! - `source` 模块提供内置导出方：`Bytes`/`Vec<u8>`（只读）、[`ByteArray`]（可写、带导出记账）、
//!   [`StridedBuffer`]（多维步长视图）；
//! - `config` 模块提供可反序列化的 [`HandleOptions`]。
//!
//! # 使用示例
//! ```rust
//! use std::sync::Arc;
//!
//! use spark_oob_buffer::{BufferHandle, ByteArray, ContiguityOrder};
//!
//! let array = Arc::new(ByteArray::new(b"foo".to_vec()));
//! let mut handle = BufferHandle::new(Arc::clone(&array)).expect("导出字节数组");
//! assert!(handle.view().expect("句柄存活").is_writable());
//! assert!(handle.is_contiguous(ContiguityOrder::C).expect("句柄存活"));
//! handle.as_mut_slice().expect("可写视图")[0] = b'0';
//! handle.release().expect("归还视图");
//! assert!(handle.view().is_err());
//! assert_eq!(&array.snapshot().expect("无导出")[..], b"0oo");
//! ```

mod config;
mod descriptor;
mod error;
mod exporter;
mod handle;
mod source;

pub use config::{AccessPolicy, HandleOptions};
pub use descriptor::{ContiguityOrder, ViewDescriptor, c_strides};
pub use error::{
    ExportError, ExportErrorKind, HandleError, ReleaseError, ReleasedError, codes,
};
pub use exporter::{AccessMode, BufferExporter};
pub use handle::BufferHandle;
pub use source::{ByteArray, ExportCounts, StridedBuffer};
