use crate::descriptor::ViewDescriptor;
use crate::error::{ExportError, ReleaseError};

/// 向导出方请求视图时的访问级别。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    ReadOnly,
    Writable,
}

/// `BufferExporter` 是缓冲句柄唯一依赖的导出能力。
///
/// # 设计初衷（Why）
/// - 序列化层面对的是任意可导出内存的对象：只读字节串、可写字节数组、带步长的多维数组。
///   与其在运行时探测对象形态，不如要求具体类型显式实现这两个操作。
/// - 接口刻意保持狭窄，只包含“导出”与“归还”，导出方内部如何加锁、如何记账完全由实现者决定。
///
/// # 契约定义（What）
/// - `export_view(mode)`：同步返回一个描述符；只读导出方收到 [`AccessMode::Writable`] 时应返回
///   [`ExportErrorKind::ReadOnly`](crate::ExportErrorKind::ReadOnly)，暂时冲突时返回
///   [`ExportErrorKind::Busy`](crate::ExportErrorKind::Busy)。必须可重入：同一导出方可以同时存在多个导出。
/// - `release_view(view)`：归还此前由本导出方签发的视图，传入的描述符与签发时完全一致。
///   归还会让导出方撤销对该区间的保证，因此它是 `unsafe fn`，只由持有视图的
///   [`BufferHandle`](crate::BufferHandle) 调用；安全代码无法借克隆出的描述符抢先归还：
///
/// ```compile_fail,E0133
/// use std::sync::Arc;
/// use spark_oob_buffer::{BufferExporter, BufferHandle, ByteArray};
///
/// let array = Arc::new(ByteArray::new(b"abc".to_vec()));
/// let handle = BufferHandle::new(Arc::clone(&array)).unwrap();
/// let copy = handle.view().unwrap().clone();
/// array.release_view(&copy).unwrap();
/// ```
///
/// # Safety
/// 实现者必须保证：
/// - 描述符覆盖的地址区间在对应的 `release_view` 调用之前始终有效；
/// - 以只读方式导出期间，该区间不会被任何一方修改；
/// - 以可写方式导出期间，除持有该视图的一方外没有任何其它读写者。
///
/// [`BufferHandle`](crate::BufferHandle) 依赖这些保证向调用方提供安全的 `&[u8]` 与 `&mut [u8]`。
pub unsafe trait BufferExporter: Send + Sync {
    /// 导出一个视图。
    fn export_view(&self, mode: AccessMode) -> Result<ViewDescriptor, ExportError>;

    /// 归还一个视图。
    ///
    /// # Safety
    /// - `view` 必须来自同一导出方的 `export_view`，且此前尚未归还；
    /// - 调用之后不得再经由该描述符访问内存。
    unsafe fn release_view(&self, view: &ViewDescriptor) -> Result<(), ReleaseError>;
}
