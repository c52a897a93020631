//! 内置的导出方实现。
//!
//! - `shared`：`Bytes` 与 `Vec<u8>` 这类不可变内存，只签发只读视图；
//! - `byte_array`：可写、可扩缩的字节数组，带导出记账；
//! - `strided`：建立在 [`ByteArray`] 之上的多维步长视图。

mod byte_array;
mod shared;
mod strided;

pub use byte_array::{ByteArray, ExportCounts};
pub use strided::StridedBuffer;
