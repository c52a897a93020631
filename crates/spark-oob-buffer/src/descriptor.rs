use std::borrow::Cow;
use std::ops::Range;
use std::ptr::NonNull;

use serde::Deserialize;

use crate::error::ExportError;
use crate::exporter::AccessMode;

/// 连续性判定所依据的元素顺序。
///
/// - `C`：行主序，最后一个维度变化最快；
/// - `F`：列主序，第一个维度变化最快；
/// - `Any`：满足任一顺序即可。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContiguityOrder {
    C,
    F,
    Any,
}

/// `ViewDescriptor` 是导出方交给缓冲句柄的视图元数据快照。
///
/// # 设计动机（Why）
/// - 序列化层需要在不复制数据的前提下得知内存区间、形状与步长，才能决定是否走零拷贝传输；
/// - 描述符在句柄构造时一次性捕获，之后不可变，句柄绝不会回头向导出方重新索取。
///
/// # 数据结构解析（How）
/// - `ptr`：第一个元素（全零索引）所在地址；负步长时它不一定是区间最低地址；
/// - `len`：逻辑字节数，恒等于 `product(shape) * itemsize`；
/// - `strides`：每个维度的字节步长，`None` 表示按 C 顺序紧密排列；
/// - `format`：元素格式串（如 `"B"`、`"<i"`），默认为 `"B"`（无符号字节）。
///
/// # 契约说明（What）
/// - 描述符本身只是元数据，持有它并不授予访问内存的权利；解引用只能经由仍处于 `Live`
///   状态的 [`BufferHandle`](crate::BufferHandle)。
/// - 构造方法不做一致性校验，校验在句柄获取视图时进行，自相矛盾的描述符会被判为
///   [`ExportErrorKind::Malformed`](crate::ExportErrorKind::Malformed)。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewDescriptor {
    ptr: NonNull<u8>,
    len: usize,
    itemsize: usize,
    format: Cow<'static, str>,
    shape: Vec<usize>,
    strides: Option<Vec<isize>>,
    writable: bool,
}

impl ViewDescriptor {
    /// 创建一维字节视图描述符，`itemsize` 为 1、形状为 `[len]`。
    pub fn new(ptr: NonNull<u8>, len: usize, writable: bool) -> Self {
        Self {
            ptr,
            len,
            itemsize: 1,
            format: Cow::Borrowed("B"),
            shape: vec![len],
            strides: None,
            writable,
        }
    }

    /// 覆盖元素大小、形状与步长；`len` 保持导出方声明的值不变。
    pub fn with_layout(
        mut self,
        itemsize: usize,
        shape: Vec<usize>,
        strides: Option<Vec<isize>>,
    ) -> Self {
        self.itemsize = itemsize;
        self.shape = shape;
        self.strides = strides;
        self
    }

    pub fn with_format(mut self, format: impl Into<Cow<'static, str>>) -> Self {
        self.format = format.into();
        self
    }

    /// 第一个元素的地址。
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub(crate) fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn itemsize(&self) -> usize {
        self.itemsize
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// 导出方显式给出的步长；`None` 表示 C 顺序默认布局。
    pub fn strides(&self) -> Option<&[isize]> {
        self.strides.as_deref()
    }

    /// 实际生效的步长：显式步长或按 C 顺序推导出的默认步长。
    pub fn effective_strides(&self) -> Cow<'_, [isize]> {
        match &self.strides {
            Some(strides) => Cow::Borrowed(strides.as_slice()),
            None => Cow::Owned(c_strides(&self.shape, self.itemsize)),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_c_contiguous(&self) -> bool {
        self.is_contiguous(ContiguityOrder::C)
    }

    pub fn is_f_contiguous(&self) -> bool {
        self.is_contiguous(ContiguityOrder::F)
    }

    /// 判断视图在给定顺序下是否无空隙。
    ///
    /// 含零长度维度的视图视为连续；长度为 1 的维度不参与步长比较。
    pub fn is_contiguous(&self, order: ContiguityOrder) -> bool {
        if self.len == 0 || self.shape.contains(&0) {
            return true;
        }
        let strides = self.effective_strides();
        match order {
            ContiguityOrder::C => dense(&self.shape, &strides, self.itemsize, true),
            ContiguityOrder::F => dense(&self.shape, &strides, self.itemsize, false),
            ContiguityOrder::Any => {
                dense(&self.shape, &strides, self.itemsize, true)
                    || dense(&self.shape, &strides, self.itemsize, false)
            }
        }
    }

    /// 视图触及的地址区间 `[lowest, highest + itemsize)`。
    ///
    /// 负步长会让区间起点落在 [`as_ptr`](Self::as_ptr) 之前；含零长度维度时区间为空。
    /// 偏移无法用 `isize` 表示的布局（只可能出现在未经句柄校验的描述符上）同样返回空区间。
    pub fn span(&self) -> Range<*const u8> {
        let base = self.as_ptr();
        match extent(&self.shape, &self.effective_strides(), self.itemsize) {
            Some((lo, hi)) => base.wrapping_offset(lo)..base.wrapping_offset(hi),
            None => base..base,
        }
    }

    /// 校验描述符自身的一致性，以及是否与请求的访问模式相符。
    pub(crate) fn validate(&self, requested: AccessMode) -> Result<(), ExportError> {
        if self.itemsize == 0 {
            return Err(ExportError::malformed("descriptor reports zero itemsize"));
        }
        if let Some(strides) = &self.strides {
            if strides.len() != self.shape.len() {
                return Err(ExportError::malformed(format!(
                    "descriptor has {} strides for {} dimensions",
                    strides.len(),
                    self.shape.len()
                )));
            }
        }
        let expected = self
            .shape
            .iter()
            .try_fold(self.itemsize, |acc, &dim| acc.checked_mul(dim));
        if expected != Some(self.len) {
            return Err(ExportError::malformed(format!(
                "descriptor length {} does not match shape {:?} x itemsize {}",
                self.len, self.shape, self.itemsize
            )));
        }
        if extent(&self.shape, &self.effective_strides(), self.itemsize).is_none() {
            return Err(ExportError::malformed(format!(
                "descriptor strides {:?} over shape {:?} overflow the address space",
                self.effective_strides(),
                self.shape
            )));
        }
        if requested == AccessMode::ReadOnly && self.writable {
            return Err(ExportError::malformed(
                "exporter granted a writable view to a read-only request",
            ));
        }
        Ok(())
    }

    /// 以 C 顺序遍历每个元素相对 `ptr` 的字节偏移。
    ///
    /// 中间偏移始终落在 [`extent`] 之内，已通过 `validate` 的描述符不会溢出。
    pub(crate) fn for_each_element(&self, mut visit: impl FnMut(isize)) {
        if self.shape.contains(&0) {
            return;
        }
        let strides = self.effective_strides();
        let ndim = self.shape.len();
        let mut index = vec![0usize; ndim];
        let mut offset = 0isize;
        loop {
            visit(offset);
            let mut axis = ndim;
            loop {
                if axis == 0 {
                    return;
                }
                axis -= 1;
                if index[axis] + 1 < self.shape[axis] {
                    index[axis] += 1;
                    offset += strides[axis];
                    break;
                }
                offset -= strides[axis] * (self.shape[axis] - 1) as isize;
                index[axis] = 0;
            }
        }
    }
}

// SAFETY: 描述符只携带地址元数据，从不自行解引用；真正的内存访问由 `BufferHandle`
// 在导出方契约保护下完成，因此跨线程移动或共享描述符不会引入数据竞争。
unsafe impl Send for ViewDescriptor {}
unsafe impl Sync for ViewDescriptor {}

/// 按 C 顺序为给定形状计算紧密排列的字节步长。
pub fn c_strides(shape: &[usize], itemsize: usize) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut step = itemsize as isize;
    for (axis, &dim) in shape.iter().enumerate().rev() {
        strides[axis] = step;
        step = step.saturating_mul(dim.max(1) as isize);
    }
    strides
}

/// 相对首元素的最低与最高（不含）字节偏移。
///
/// 含零长度维度时返回 `(0, 0)`；任一偏移无法用 `isize` 表示时返回 `None`。
pub(crate) fn extent(shape: &[usize], strides: &[isize], itemsize: usize) -> Option<(isize, isize)> {
    if shape.contains(&0) {
        return Some((0, 0));
    }
    let mut lo = 0isize;
    let mut hi = isize::try_from(itemsize).ok()?;
    for (&dim, &stride) in shape.iter().zip(strides) {
        let reach = stride.checked_mul(isize::try_from(dim - 1).ok()?)?;
        if reach < 0 {
            lo = lo.checked_add(reach)?;
        } else {
            hi = hi.checked_add(reach)?;
        }
    }
    Some((lo, hi))
}

fn dense(shape: &[usize], strides: &[isize], itemsize: usize, row_major: bool) -> bool {
    let mut expected = itemsize as isize;
    let mut check = |axis: usize| {
        let dim = shape[axis];
        if dim > 1 && strides[axis] != expected {
            return false;
        }
        expected = expected.saturating_mul(dim as isize);
        true
    };
    if row_major {
        (0..shape.len()).rev().all(&mut check)
    } else {
        (0..shape.len()).all(&mut check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(itemsize: usize, shape: &[usize], strides: Option<&[isize]>) -> ViewDescriptor {
        let len = shape.iter().product::<usize>() * itemsize;
        ViewDescriptor::new(NonNull::dangling(), len, false).with_layout(
            itemsize,
            shape.to_vec(),
            strides.map(<[isize]>::to_vec),
        )
    }

    #[test]
    fn default_strides_follow_row_major_order() {
        assert_eq!(c_strides(&[4, 3], 4), vec![12, 4]);
        assert_eq!(c_strides(&[], 8), Vec::<isize>::new());
    }

    #[test]
    fn implicit_strides_are_c_contiguous_and_f_only_with_one_wide_axis() {
        assert!(layout(1, &[2, 3], None).is_c_contiguous());
        assert!(!layout(1, &[2, 3], None).is_f_contiguous());
        assert!(layout(1, &[1, 3], None).is_f_contiguous());
    }

    #[test]
    fn scalar_view_is_contiguous_in_both_orders() {
        let view = layout(8, &[], None);
        assert_eq!(view.len(), 8);
        assert!(view.is_c_contiguous());
        assert!(view.is_f_contiguous());
    }

    #[test]
    fn span_covers_negative_strides() {
        let storage = [0u8; 8];
        let last = NonNull::from(&storage[7]);
        let view = ViewDescriptor::new(last, 4, false).with_layout(1, vec![4], Some(vec![-1]));
        let span = view.span();
        assert_eq!(span.start, storage[4..].as_ptr());
        assert_eq!(span.end, storage.as_ptr_range().end);
    }

    #[test]
    fn element_walk_visits_offsets_in_row_major_order() {
        let view = layout(4, &[2, 2], Some(&[4, 8]));
        let mut offsets = Vec::new();
        view.for_each_element(|offset| offsets.push(offset));
        assert_eq!(offsets, vec![0, 8, 4, 12]);
    }

    #[test]
    fn validate_rejects_inconsistent_descriptors() {
        let bad_len = ViewDescriptor::new(NonNull::dangling(), 5, false).with_layout(
            2,
            vec![2],
            None,
        );
        assert!(bad_len.validate(AccessMode::ReadOnly).is_err());

        let bad_strides = layout(1, &[2, 2], Some(&[2]));
        assert!(bad_strides.validate(AccessMode::ReadOnly).is_err());

        let huge_stride = layout(1, &[4], Some(&[isize::MAX / 2]));
        assert_eq!(
            huge_stride
                .validate(AccessMode::ReadOnly)
                .map_err(|err| err.kind()),
            Err(crate::ExportErrorKind::Malformed)
        );
        assert_eq!(huge_stride.span().start, huge_stride.span().end);

        let sneaky_writable = ViewDescriptor::new(NonNull::dangling(), 3, true);
        assert!(sneaky_writable.validate(AccessMode::ReadOnly).is_err());
        assert!(sneaky_writable.validate(AccessMode::Writable).is_ok());
    }
}
