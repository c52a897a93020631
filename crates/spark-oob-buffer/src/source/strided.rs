use std::borrow::Cow;
use std::sync::Arc;

use tracing::warn;

use crate::descriptor::{ViewDescriptor, c_strides, extent};
use crate::error::{ExportError, ReleaseError};
use crate::exporter::{AccessMode, BufferExporter};
use crate::source::ByteArray;

/// 建立在 [`ByteArray`] 之上的多维步长视图。
///
/// # 角色定位（Why）
/// - 带外缓冲经常来自数值数组：切片、转置之后内存不再紧密排列，序列化层需要通过
///   连续性判断决定能否直接零拷贝。`StridedBuffer` 以最小代价复现这类导出方。
///
/// # 结构设计（How）
/// - 只保存布局（元素大小、形状、步长、格式串），存储本身与导出记账都委托给底层 `ByteArray`；
/// - `step`、`transpose`、`read_only` 返回新的布局，与原对象共享同一份存储。
///
/// # 契约说明（What）
/// - 构造与派生时校验布局落在存储范围内；导出时再次校验，防止存储在此期间被缩小；
/// - 步长只会为正，首元素始终位于存储起点。
#[derive(Clone, Debug)]
pub struct StridedBuffer {
    storage: Arc<ByteArray>,
    itemsize: usize,
    shape: Vec<usize>,
    strides: Vec<isize>,
    format: Cow<'static, str>,
    read_only: bool,
}

impl StridedBuffer {
    /// 以 C 顺序在 `storage` 上铺设 `shape` 形状、每元素 `itemsize` 字节的数组。
    pub fn new(
        storage: Arc<ByteArray>,
        itemsize: usize,
        shape: Vec<usize>,
    ) -> Result<Self, ExportError> {
        if itemsize == 0 {
            return Err(ExportError::malformed("itemsize must be non-zero"));
        }
        let strides = c_strides(&shape, itemsize);
        let buffer = Self {
            read_only: storage.is_frozen(),
            storage,
            itemsize,
            shape,
            strides,
            format: Cow::Borrowed("B"),
        };
        buffer.check_bounds(buffer.storage.len())?;
        Ok(buffer)
    }

    pub fn with_format(mut self, format: impl Into<Cow<'static, str>>) -> Self {
        self.format = format.into();
        self
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn itemsize(&self) -> usize {
        self.itemsize
    }

    pub fn storage(&self) -> &Arc<ByteArray> {
        &self.storage
    }

    /// 沿 `axis` 每隔 `step` 个元素取一个，相当于 `arr[::step]`。
    pub fn step(&self, axis: usize, step: usize) -> Result<Self, ExportError> {
        if step == 0 {
            return Err(ExportError::malformed("slice step cannot be zero"));
        }
        if axis >= self.shape.len() {
            return Err(ExportError::malformed(format!(
                "axis {axis} out of range for {} dimensions",
                self.shape.len()
            )));
        }
        let stride = isize::try_from(step)
            .ok()
            .and_then(|step| self.strides[axis].checked_mul(step))
            .ok_or_else(|| {
                ExportError::malformed(format!("slice step {step} overflows axis {axis} stride"))
            })?;
        let mut sliced = self.clone();
        sliced.shape[axis] = self.shape[axis].div_ceil(step);
        sliced.strides[axis] = stride;
        Ok(sliced)
    }

    /// 反转维度顺序；行主序数组转置后按列主序连续。
    pub fn transpose(&self) -> Self {
        let mut transposed = self.clone();
        transposed.shape.reverse();
        transposed.strides.reverse();
        transposed
    }

    /// 返回只签发只读视图的副本。
    pub fn read_only(&self) -> Self {
        Self {
            read_only: true,
            ..self.clone()
        }
    }

    fn byte_len(&self) -> usize {
        self.shape.iter().product::<usize>() * self.itemsize
    }

    fn check_bounds(&self, storage_len: usize) -> Result<(), ExportError> {
        match extent(&self.shape, &self.strides, self.itemsize) {
            None => Err(ExportError::malformed(
                "strided layout overflows the address space",
            )),
            Some((lo, hi)) if lo < 0 || hi as usize > storage_len => {
                Err(ExportError::malformed(format!(
                    "strided layout spans bytes {lo}..{hi} but storage holds {storage_len}"
                )))
            }
            Some(_) => Ok(()),
        }
    }
}

// SAFETY: 存储与记账完全委托给 `ByteArray`，其签发的保证对这里的子区间同样成立；
// 导出前在持有记账的情况下校验布局未越出存储范围。
unsafe impl BufferExporter for StridedBuffer {
    fn export_view(&self, mode: AccessMode) -> Result<ViewDescriptor, ExportError> {
        if mode == AccessMode::Writable && self.read_only {
            return Err(ExportError::read_only("strided buffer is read-only"));
        }
        let (ptr, storage_len) = self.storage.acquire(mode)?;
        if let Err(err) = self.check_bounds(storage_len) {
            // 撤销刚登记的导出。
            if let Err(rollback) = self.storage.release(mode == AccessMode::Writable) {
                warn!(
                    code = rollback.code(),
                    error = %rollback,
                    cause = err.code(),
                    "failed to roll back strided export"
                );
            }
            return Err(err);
        }
        Ok(
            ViewDescriptor::new(ptr, self.byte_len(), mode == AccessMode::Writable)
                .with_layout(self.itemsize, self.shape.clone(), Some(self.strides.clone()))
                .with_format(self.format.clone()),
        )
    }

    unsafe fn release_view(&self, view: &ViewDescriptor) -> Result<(), ReleaseError> {
        self.storage.release(view.is_writable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_matrix() -> StridedBuffer {
        let storage = Arc::new(ByteArray::new(vec![0u8; 48]));
        StridedBuffer::new(storage, 4, vec![4, 3])
            .expect("4x3 int32 布局")
            .with_format("<i")
    }

    #[test]
    fn every_other_row_keeps_row_length_and_doubles_row_stride() {
        let rows = int_matrix().step(0, 2).expect("arr[::2]");
        assert_eq!(rows.shape(), &[2, 3]);
        assert_eq!(rows.strides(), &[24, 4]);
    }

    #[test]
    fn oversized_steps_are_rejected_instead_of_wrapping() {
        let matrix = int_matrix();
        for step in [1usize << 62, usize::MAX] {
            let err = matrix.step(0, step).expect_err("步长溢出应被拒绝");
            assert_eq!(err.kind(), crate::ExportErrorKind::Malformed);
        }
        assert!(matrix.strides().iter().all(|&stride| stride > 0));
    }

    #[test]
    fn layouts_larger_than_storage_are_rejected() {
        let storage = Arc::new(ByteArray::new(vec![0u8; 8]));
        assert!(StridedBuffer::new(storage, 4, vec![3]).is_err());
    }

    #[test]
    fn shrunk_storage_fails_export_without_leaking_accounting() {
        let matrix = int_matrix();
        matrix.storage().resize(8, 0).expect("无导出时允许缩小");
        assert!(matrix.export_view(AccessMode::ReadOnly).is_err());
        assert!(!matrix.storage().exports().any());
    }

    #[test]
    fn exported_descriptor_carries_layout_and_format() {
        let matrix = int_matrix().transpose();
        let view = matrix.export_view(AccessMode::Writable).expect("可写导出");
        assert_eq!(view.shape(), &[3, 4]);
        assert_eq!(view.strides(), Some(&[4isize, 12][..]));
        assert_eq!(view.format(), "<i");
        assert!(view.is_writable());
        unsafe { matrix.release_view(&view) }.expect("归还视图");
    }
}
