#![forbid(unsafe_code)]

use std::ops::Range;
use std::sync::Arc;

use bc_index::Index;
use bc_types::{DType, Promoter, Scalar, TypeError, cast_scalar};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColumnarError {
    #[error("column lengths disagree within one array: {left} vs {right}")]
    RaggedColumns { left: usize, right: usize },
    #[error("cannot concatenate zero arrays")]
    EmptyConcat,
    #[error("arrays disagree on column count: {left} vs {right}")]
    ShapeMismatch { left: usize, right: usize },
    #[error("cannot concatenate one-dimensional and two-dimensional arrays")]
    DimensionalityMismatch,
    #[error("native concat requires a uniform dtype family, found {left:?} and {right:?}")]
    NonUniformConcat { left: DType, right: DType },
    #[error("a null-array proxy must be materialized before its values are used")]
    ProxyNotMaterialized,
    #[error("column {position} is out of bounds for an array of {ncols} columns")]
    ColumnOutOfBounds { position: usize, ncols: usize },
    #[error("block placement covers {placement} columns but values hold {values}")]
    PlacementShape { placement: usize, values: usize },
    #[error("one-dimensional extension dtype {dtype:?} cannot back {ncols} block columns")]
    WideExtensionBlock { dtype: DType, ncols: usize },
    #[error("placement position {position} is out of bounds for {ncols} columns")]
    PlacementOutOfBounds { position: usize, ncols: usize },
    #[error("column position {position} is covered by more than one block")]
    PlacementOverlap { position: usize },
    #[error("column position {position} is covered by no block")]
    PlacementGap { position: usize },
    #[error("block holds {found} rows but the row axis has {expected} labels")]
    RowLength { expected: usize, found: usize },
    #[error("indexer length {indexer} does not match axis length {axis}")]
    IndexerLength { indexer: usize, axis: usize },
    #[error("indexer position {position} is out of bounds for {len} source labels")]
    ReindexOutOfBounds { position: usize, len: usize },
    #[error("column reindexing without a proxy cannot introduce new labels")]
    ReindexRequiresProxy,
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Placeholder standing in for entirely absent data. Carries shape only and
/// materializes to a real all-missing array only once the final unified dtype
/// is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullArrayProxy {
    rows: usize,
}

impl NullArrayProxy {
    #[must_use]
    pub fn new(rows: usize) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ArrayData {
    /// One shared buffer per block column. Cloning shares storage (a view);
    /// `deep_copy` allocates.
    Columns(Vec<Arc<Vec<Scalar>>>),
    Proxy { proxy: NullArrayProxy, cols: usize },
}

/// One- or two-dimensional scalar storage with a single dtype. A 1-D array
/// always has exactly one column; the flag records which shape downstream
/// blocks expect back.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    dtype: DType,
    one_dimensional: bool,
    data: ArrayData,
}

impl Array {
    pub fn from_columns(dtype: DType, columns: Vec<Vec<Scalar>>) -> Result<Self, ColumnarError> {
        if let Some(first) = columns.first() {
            for column in &columns[1..] {
                if column.len() != first.len() {
                    return Err(ColumnarError::RaggedColumns {
                        left: first.len(),
                        right: column.len(),
                    });
                }
            }
        }
        Ok(Self {
            dtype,
            one_dimensional: false,
            data: ArrayData::Columns(columns.into_iter().map(Arc::new).collect()),
        })
    }

    #[must_use]
    pub fn from_values(dtype: DType, values: Vec<Scalar>) -> Self {
        Self {
            dtype,
            one_dimensional: true,
            data: ArrayData::Columns(vec![Arc::new(values)]),
        }
    }

    #[must_use]
    pub fn na_proxy(cols: usize, rows: usize) -> Self {
        Self {
            dtype: DType::Void,
            one_dimensional: false,
            data: ArrayData::Proxy {
                proxy: NullArrayProxy::new(rows),
                cols,
            },
        }
    }

    #[must_use]
    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    #[must_use]
    pub fn is_proxy(&self) -> bool {
        matches!(self.data, ArrayData::Proxy { .. })
    }

    #[must_use]
    pub fn one_dimensional(&self) -> bool {
        self.one_dimensional
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        match &self.data {
            ArrayData::Columns(cols) => cols.len(),
            ArrayData::Proxy { cols, .. } => *cols,
        }
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        match &self.data {
            ArrayData::Columns(cols) => cols.first().map_or(0, |col| col.len()),
            ArrayData::Proxy { proxy, .. } => proxy.rows(),
        }
    }

    /// Values of one column. Proxies expose no values.
    #[must_use]
    pub fn column(&self, index: usize) -> &[Scalar] {
        match &self.data {
            ArrayData::Columns(cols) => cols.get(index).map_or(&[], |col| col.as_slice()),
            ArrayData::Proxy { .. } => &[],
        }
    }

    pub fn iter_values(&self) -> impl Iterator<Item = &Scalar> {
        let cols: &[Arc<Vec<Scalar>>] = match &self.data {
            ArrayData::Columns(cols) => cols,
            ArrayData::Proxy { .. } => &[],
        };
        cols.iter().flat_map(|col| col.iter())
    }

    /// Positional column sub-slice sharing the underlying buffers.
    pub fn slice_columns(&self, locs: &[usize]) -> Result<Self, ColumnarError> {
        match &self.data {
            ArrayData::Columns(cols) => {
                let mut selected = Vec::with_capacity(locs.len());
                for &loc in locs {
                    let col = cols.get(loc).ok_or(ColumnarError::ColumnOutOfBounds {
                        position: loc,
                        ncols: cols.len(),
                    })?;
                    selected.push(Arc::clone(col));
                }
                Ok(Self {
                    dtype: self.dtype.clone(),
                    one_dimensional: self.one_dimensional,
                    data: ArrayData::Columns(selected),
                })
            }
            ArrayData::Proxy { proxy, cols } => {
                for &loc in locs {
                    if loc >= *cols {
                        return Err(ColumnarError::ColumnOutOfBounds {
                            position: loc,
                            ncols: *cols,
                        });
                    }
                }
                Ok(Self::na_proxy(locs.len(), proxy.rows()))
            }
        }
    }

    /// The leading column as a one-dimensional array (view).
    #[must_use]
    pub fn first_column(&self) -> Self {
        match &self.data {
            ArrayData::Columns(cols) => Self {
                dtype: self.dtype.clone(),
                one_dimensional: true,
                data: ArrayData::Columns(vec![
                    cols.first()
                        .map(Arc::clone)
                        .unwrap_or_else(|| Arc::new(Vec::new())),
                ]),
            },
            ArrayData::Proxy { proxy, .. } => Self::na_proxy(1, proxy.rows()),
        }
    }

    /// A fully independent copy, never aliasing this array's buffers.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        match &self.data {
            ArrayData::Columns(cols) => Self {
                dtype: self.dtype.clone(),
                one_dimensional: self.one_dimensional,
                data: ArrayData::Columns(
                    cols.iter().map(|col| Arc::new(col.as_ref().clone())).collect(),
                ),
            },
            ArrayData::Proxy { .. } => self.clone(),
        }
    }

    pub fn cast(&self, target: &DType) -> Result<Self, ColumnarError> {
        if &self.dtype == target {
            return Ok(self.clone());
        }
        match &self.data {
            ArrayData::Proxy { .. } => Err(ColumnarError::ProxyNotMaterialized),
            ArrayData::Columns(cols) => {
                let mut columns = Vec::with_capacity(cols.len());
                for col in cols {
                    let mut out = Vec::with_capacity(col.len());
                    for value in col.iter() {
                        out.push(cast_scalar(value.clone(), target)?);
                    }
                    columns.push(Arc::new(out));
                }
                Ok(Self {
                    dtype: target.clone(),
                    one_dimensional: self.one_dimensional,
                    data: ArrayData::Columns(columns),
                })
            }
        }
    }
}

/// Reshape to block shape: 1-D arrays become single-column 2-D arrays unless
/// their dtype only exists in one dimension.
#[must_use]
pub fn ensure_block_shape(mut values: Array) -> Array {
    if values.one_dimensional && !values.dtype.is_1d_only_extension() {
        values.one_dimensional = false;
    }
    values
}

/// Materialize an all-missing array of the final dtype. 1-D-only extension
/// dtypes produce a one-dimensional array; their blocks cover exactly one
/// column, so any other width is refused.
pub fn make_na_array(
    dtype: &DType,
    ncols: usize,
    nrows: usize,
    fill: Scalar,
) -> Result<Array, ColumnarError> {
    if dtype.is_1d_only_extension() {
        if ncols != 1 {
            return Err(ColumnarError::WideExtensionBlock {
                dtype: dtype.clone(),
                ncols,
            });
        }
        return Ok(Array::from_values(dtype.clone(), vec![fill; nrows]));
    }
    Ok(Array {
        dtype: dtype.clone(),
        one_dimensional: false,
        data: ArrayData::Columns(
            (0..ncols)
                .map(|_| Arc::new(vec![fill.clone(); nrows]))
                .collect(),
        ),
    })
}

fn concat_cast(arrays: &[&Array], target: &DType) -> Result<Array, ColumnarError> {
    let first = arrays.first().ok_or(ColumnarError::EmptyConcat)?;
    let ncols = first.ncols();
    let one_dimensional = first.one_dimensional();
    let mut total = 0;
    for array in arrays {
        if array.is_proxy() {
            return Err(ColumnarError::ProxyNotMaterialized);
        }
        if array.ncols() != ncols {
            return Err(ColumnarError::ShapeMismatch {
                left: ncols,
                right: array.ncols(),
            });
        }
        if array.one_dimensional() != one_dimensional {
            return Err(ColumnarError::DimensionalityMismatch);
        }
        total += array.nrows();
    }

    let mut columns = Vec::with_capacity(ncols);
    for c in 0..ncols {
        let mut out = Vec::with_capacity(total);
        for array in arrays {
            for value in array.column(c) {
                out.push(cast_scalar(value.clone(), target)?);
            }
        }
        columns.push(Arc::new(out));
    }
    Ok(Array {
        dtype: target.clone(),
        one_dimensional,
        data: ArrayData::Columns(columns),
    })
}

fn is_native_numeric(dtype: &DType) -> bool {
    matches!(
        dtype,
        DType::Bool | DType::Int64 | DType::UInt64 | DType::Float64
    )
}

/// Fast concatenation for uniform groups: identical dtypes concatenate as-is,
/// mixed native numeric dtypes promote numerically, anything else is refused.
pub fn native_concat(arrays: &[&Array], promoter: &Promoter) -> Result<Array, ColumnarError> {
    let first = arrays.first().ok_or(ColumnarError::EmptyConcat)?;
    let mut target = first.dtype().clone();
    for array in &arrays[1..] {
        let dtype = array.dtype();
        if dtype == &target {
            continue;
        }
        if is_native_numeric(dtype) && is_native_numeric(&target) {
            target = promoter.native_numeric_result(&target, dtype);
        } else {
            return Err(ColumnarError::NonUniformConcat {
                left: target,
                right: dtype.clone(),
            });
        }
    }
    concat_cast(arrays, &target)
}

/// Generic compatibility concatenation: derive a common dtype (zero-row
/// arrays do not vote), cast every input toward it, then concatenate.
pub fn concat_compat(arrays: &[&Array], promoter: &Promoter) -> Result<Array, ColumnarError> {
    if arrays.is_empty() {
        return Err(ColumnarError::EmptyConcat);
    }
    let mut dtypes: Vec<DType> = arrays
        .iter()
        .filter(|array| array.nrows() > 0)
        .map(|array| array.dtype().clone())
        .collect();
    if dtypes.is_empty() {
        dtypes = arrays.iter().map(|array| array.dtype().clone()).collect();
    }
    let target = if dtypes.iter().all(|dtype| dtype == &dtypes[0]) {
        dtypes[0].clone()
    } else {
        promoter.common_type(&dtypes)?
    };
    concat_cast(arrays, &target)
}

/// The set of output-column positions a block supplies. A contiguous stride-1
/// range is the cheap preferred representation; an explicit position list is
/// the fallback. Equality and size ignore the representation.
#[derive(Debug, Clone, Eq)]
pub enum BlockPlacement {
    Slice { start: usize, len: usize },
    Indices(Vec<usize>),
}

impl BlockPlacement {
    #[must_use]
    pub fn from_range(range: Range<usize>) -> Self {
        Self::Slice {
            start: range.start,
            len: range.end.saturating_sub(range.start),
        }
    }

    /// Collapses contiguous stride-1 position lists down to a slice.
    #[must_use]
    pub fn from_indices(indices: Vec<usize>) -> Self {
        if indices.is_empty() {
            return Self::Slice { start: 0, len: 0 };
        }
        if indices.windows(2).all(|pair| pair[1] == pair[0] + 1) {
            return Self::Slice {
                start: indices[0],
                len: indices.len(),
            };
        }
        Self::Indices(indices)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Slice { len, .. } => *len,
            Self::Indices(indices) => indices.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_slice_like(&self) -> bool {
        matches!(self, Self::Slice { .. })
    }

    fn at(&self, offset: usize) -> usize {
        match self {
            Self::Slice { start, .. } => start + offset,
            Self::Indices(indices) => indices[offset],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).map(move |offset| self.at(offset))
    }

    #[must_use]
    pub fn add_offset(&self, offset: usize) -> Self {
        match self {
            Self::Slice { start, len } => Self::Slice {
                start: start + offset,
                len: *len,
            },
            Self::Indices(indices) => {
                Self::Indices(indices.iter().map(|pos| pos + offset).collect())
            }
        }
    }
}

impl PartialEq for BlockPlacement {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

/// A columnar chunk: one storage dtype, one value array, and the output
/// column positions it supplies. Replaced, never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    values: Array,
    placement: BlockPlacement,
}

impl Block {
    pub fn new(values: Array, placement: BlockPlacement) -> Result<Self, ColumnarError> {
        if values.ncols() != placement.len() {
            return Err(ColumnarError::PlacementShape {
                placement: placement.len(),
                values: values.ncols(),
            });
        }
        if values.dtype().is_1d_only_extension() && values.ncols() > 1 {
            return Err(ColumnarError::WideExtensionBlock {
                dtype: values.dtype().clone(),
                ncols: values.ncols(),
            });
        }
        Ok(Self { values, placement })
    }

    #[must_use]
    pub fn values(&self) -> &Array {
        &self.values
    }

    #[must_use]
    pub fn placement(&self) -> &BlockPlacement {
        &self.placement
    }

    #[must_use]
    pub fn dtype(&self) -> &DType {
        self.values.dtype()
    }

    #[must_use]
    pub fn is_extension(&self) -> bool {
        self.values.dtype().is_extension()
    }

    /// Extension storage concatenates through its own logic and cannot be
    /// consolidated with native blocks.
    #[must_use]
    pub fn can_consolidate(&self) -> bool {
        !self.is_extension()
    }

    /// The missing marker native to this block's dtype.
    #[must_use]
    pub fn fill_value(&self) -> Scalar {
        Scalar::missing_for_dtype(self.values.dtype())
    }

    /// (columns, rows) covered by this block.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.values.ncols(), self.values.nrows())
    }

    /// Positional column sub-slice (a view) re-homed to a new placement.
    pub fn slice_columns(
        &self,
        locs: &[usize],
        placement: BlockPlacement,
    ) -> Result<Self, ColumnarError> {
        Self::new(self.values.slice_columns(locs)?, placement)
    }

    pub fn with_placement(&self, placement: BlockPlacement) -> Result<Self, ColumnarError> {
        Self::new(self.values.clone(), placement)
    }
}

/// An ordered collection of non-overlapping blocks whose placements partition
/// the column axis exactly once, plus both axis label sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockManager {
    blocks: Vec<Block>,
    columns: Index,
    rows: Index,
    /// Per column position: which block supplies it.
    blknos: Vec<usize>,
    /// Per column position: where inside that block's values it lives.
    blklocs: Vec<usize>,
}

impl BlockManager {
    pub fn new(blocks: Vec<Block>, columns: Index, rows: Index) -> Result<Self, ColumnarError> {
        let ncols = columns.len();
        let mut blknos = vec![usize::MAX; ncols];
        let mut blklocs = vec![usize::MAX; ncols];
        for (blkno, block) in blocks.iter().enumerate() {
            if block.values().nrows() != rows.len() {
                return Err(ColumnarError::RowLength {
                    expected: rows.len(),
                    found: block.values().nrows(),
                });
            }
            for (loc, position) in block.placement().iter().enumerate() {
                if position >= ncols {
                    return Err(ColumnarError::PlacementOutOfBounds { position, ncols });
                }
                if blknos[position] != usize::MAX {
                    return Err(ColumnarError::PlacementOverlap { position });
                }
                blknos[position] = blkno;
                blklocs[position] = loc;
            }
        }
        if let Some(position) = blknos.iter().position(|&blkno| blkno == usize::MAX) {
            return Err(ColumnarError::PlacementGap { position });
        }
        Ok(Self {
            blocks,
            columns,
            rows,
            blknos,
            blklocs,
        })
    }

    /// One block per column, in column order.
    pub fn from_column_arrays(
        arrays: Vec<Array>,
        columns: Index,
        rows: Index,
    ) -> Result<Self, ColumnarError> {
        let blocks = arrays
            .into_iter()
            .enumerate()
            .map(|(i, array)| Block::new(array, BlockPlacement::from_range(i..i + 1)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(blocks, columns, rows)
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.columns.len(), self.rows.len())
    }

    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[must_use]
    pub fn columns(&self) -> &Index {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &Index {
        &self.rows
    }

    #[must_use]
    pub fn blknos(&self) -> &[usize] {
        &self.blknos
    }

    #[must_use]
    pub fn blklocs(&self) -> &[usize] {
        &self.blklocs
    }

    /// The values of one column by position. Proxy-backed columns surface as
    /// all-missing.
    #[must_use]
    pub fn column_values(&self, position: usize) -> Option<Vec<Scalar>> {
        let blkno = *self.blknos.get(position)?;
        let block = self.blocks.get(blkno)?;
        let values = block.values();
        if values.is_proxy() {
            return Some(vec![Scalar::missing_for_dtype(&DType::Void); self.rows.len()]);
        }
        let loc = if values.one_dimensional() {
            0
        } else {
            *self.blklocs.get(position)?
        };
        Some(values.column(loc).to_vec())
    }

    /// Reindex the column axis. Runs of output positions backed by the same
    /// source block become a single sliced view; absent labels become
    /// null-array proxy blocks, materialized only at assembly time.
    pub fn reindex_columns(
        &self,
        new_columns: &Index,
        indexer: &[Option<usize>],
        use_na_proxy: bool,
    ) -> Result<Self, ColumnarError> {
        if indexer.len() != new_columns.len() {
            return Err(ColumnarError::IndexerLength {
                indexer: indexer.len(),
                axis: new_columns.len(),
            });
        }
        let ncols = self.columns.len();
        for slot in indexer {
            if let Some(position) = slot {
                if *position >= ncols {
                    return Err(ColumnarError::ReindexOutOfBounds {
                        position: *position,
                        len: ncols,
                    });
                }
            }
        }

        let nrows = self.rows.len();
        let mut blocks = Vec::new();
        let mut start = 0;
        while start < indexer.len() {
            let key = indexer[start].map(|src| self.blknos[src]);
            let mut end = start + 1;
            while end < indexer.len() && indexer[end].map(|src| self.blknos[src]) == key {
                end += 1;
            }
            let placement = BlockPlacement::from_range(start..end);
            let block = match key {
                None => {
                    if !use_na_proxy {
                        return Err(ColumnarError::ReindexRequiresProxy);
                    }
                    Block::new(Array::na_proxy(end - start, nrows), placement)?
                }
                Some(blkno) => {
                    let locs: Vec<usize> = indexer[start..end]
                        .iter()
                        .filter_map(|slot| slot.map(|src| self.blklocs[src]))
                        .collect();
                    self.blocks[blkno].slice_columns(&locs, placement)?
                }
            };
            blocks.push(block);
            start = end;
        }
        Self::new(blocks, new_columns.clone(), self.rows.clone())
    }

    /// Align the row axis by positional take. Absent rows fill with the
    /// block's missing marker, widening dtypes that cannot hold one.
    pub fn take_rows(
        &self,
        new_rows: &Index,
        indexer: &[Option<usize>],
        promoter: &Promoter,
    ) -> Result<Self, ColumnarError> {
        if indexer.len() != new_rows.len() {
            return Err(ColumnarError::IndexerLength {
                indexer: indexer.len(),
                axis: new_rows.len(),
            });
        }
        let nrows = self.rows.len();
        for slot in indexer {
            if let Some(position) = slot {
                if *position >= nrows {
                    return Err(ColumnarError::ReindexOutOfBounds {
                        position: *position,
                        len: nrows,
                    });
                }
            }
        }

        let has_missing = indexer.iter().any(Option::is_none);
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let values = block.values();
            if values.is_proxy() {
                blocks.push(Block::new(
                    Array::na_proxy(values.ncols(), indexer.len()),
                    block.placement().clone(),
                )?);
                continue;
            }
            let dtype = if has_missing {
                promoter.ensure_can_hold_na(block.dtype().clone())
            } else {
                block.dtype().clone()
            };
            let fill = Scalar::missing_for_dtype(&dtype);
            let mut columns = Vec::with_capacity(values.ncols());
            for c in 0..values.ncols() {
                let source = values.column(c);
                let mut out = Vec::with_capacity(indexer.len());
                for slot in indexer {
                    match slot {
                        Some(i) => out.push(cast_scalar(source[*i].clone(), &dtype)?),
                        None => out.push(fill.clone()),
                    }
                }
                columns.push(out);
            }
            let taken = if values.one_dimensional() {
                Array::from_values(dtype, columns.pop().unwrap_or_default())
            } else {
                Array::from_columns(dtype, columns)?
            };
            blocks.push(Block::new(taken, block.placement().clone())?);
        }
        Self::new(blocks, self.columns.clone(), new_rows.clone())
    }

    /// A fully independent copy of every block's storage.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self {
            blocks: self
                .blocks
                .iter()
                .map(|block| Block {
                    values: block.values.deep_copy(),
                    placement: block.placement.clone(),
                })
                .collect(),
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            blknos: self.blknos.clone(),
            blklocs: self.blklocs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use bc_index::Index;
    use bc_types::{DType, NullKind, Promoter, Scalar};

    use super::{
        Array, Block, BlockManager, BlockPlacement, ColumnarError, concat_compat, ensure_block_shape,
        make_na_array, native_concat,
    };

    fn int_array(values: &[i64]) -> Array {
        Array::from_columns(
            DType::Int64,
            vec![values.iter().map(|v| Scalar::Int64(*v)).collect()],
        )
        .expect("array")
    }

    #[test]
    fn placement_equality_ignores_representation() {
        let slice = BlockPlacement::from_range(2..5);
        let indices = BlockPlacement::Indices(vec![2, 3, 4]);
        assert_eq!(slice, indices);
        assert_eq!(slice.len(), indices.len());
    }

    #[test]
    fn contiguous_indices_collapse_to_a_slice() {
        let placement = BlockPlacement::from_indices(vec![3, 4, 5]);
        assert!(placement.is_slice_like());
        let scattered = BlockPlacement::from_indices(vec![0, 2]);
        assert!(!scattered.is_slice_like());
    }

    #[test]
    fn manager_rejects_gaps_and_overlaps() {
        let columns = Index::from_utf8(vec!["a".into(), "b".into()]);
        let rows = Index::positional(1);
        let block = Block::new(int_array(&[1]), BlockPlacement::from_range(0..1)).expect("block");
        let err = BlockManager::new(vec![block.clone()], columns.clone(), rows.clone())
            .expect_err("gap");
        assert!(matches!(err, ColumnarError::PlacementGap { position: 1 }));

        let overlapping =
            Block::new(int_array(&[2]), BlockPlacement::from_range(0..1)).expect("block");
        let err = BlockManager::new(vec![block, overlapping], columns, rows).expect_err("overlap");
        assert!(matches!(err, ColumnarError::PlacementOverlap { position: 0 }));
    }

    #[test]
    fn reindex_columns_injects_proxies_for_absent_labels() {
        let columns = Index::from_utf8(vec!["a".into()]);
        let rows = Index::positional(2);
        let mgr = BlockManager::from_column_arrays(vec![int_array(&[1, 2])], columns, rows)
            .expect("manager");

        let target = Index::from_utf8(vec!["a".into(), "b".into()]);
        let out = mgr
            .reindex_columns(&target, &[Some(0), None], true)
            .expect("reindex");
        assert_eq!(out.blocks().len(), 2);
        assert_eq!(out.blocks()[0].dtype(), &DType::Int64);
        assert_eq!(out.blocks()[1].dtype(), &DType::Void);
        assert!(out.blocks()[1].values().is_proxy());
    }

    #[test]
    fn take_rows_widens_integers_that_cannot_hold_missing() {
        let columns = Index::from_utf8(vec!["a".into()]);
        let rows = Index::positional(2);
        let mgr = BlockManager::from_column_arrays(vec![int_array(&[10, 20])], columns, rows)
            .expect("manager");

        let target = Index::positional(3);
        let out = mgr
            .take_rows(&target, &[Some(1), None, Some(0)], &Promoter)
            .expect("take");
        assert_eq!(out.blocks()[0].dtype(), &DType::Float64);
        assert_eq!(
            out.column_values(0).expect("column"),
            vec![
                Scalar::Float64(20.0),
                Scalar::Null(NullKind::NaN),
                Scalar::Float64(10.0)
            ]
        );
    }

    #[test]
    fn take_rows_without_missing_keeps_the_dtype() {
        let columns = Index::from_utf8(vec!["a".into()]);
        let rows = Index::positional(2);
        let mgr = BlockManager::from_column_arrays(vec![int_array(&[10, 20])], columns, rows)
            .expect("manager");

        let out = mgr
            .take_rows(&Index::positional(2), &[Some(1), Some(0)], &Promoter)
            .expect("take");
        assert_eq!(out.blocks()[0].dtype(), &DType::Int64);
    }

    #[test]
    fn native_concat_promotes_within_the_numeric_kind_family() {
        let bools = Array::from_columns(
            DType::Bool,
            vec![vec![Scalar::Bool(true), Scalar::Bool(false)]],
        )
        .expect("array");
        let ints = int_array(&[3, 4]);
        let out = native_concat(&[&bools, &ints], &Promoter).expect("concat");
        assert_eq!(out.dtype(), &DType::Int64);
        assert_eq!(
            out.column(0),
            &[
                Scalar::Int64(1),
                Scalar::Int64(0),
                Scalar::Int64(3),
                Scalar::Int64(4)
            ]
        );
    }

    #[test]
    fn native_concat_promotes_mixed_numeric_dtypes() {
        let ints = int_array(&[1]);
        let floats =
            Array::from_columns(DType::Float64, vec![vec![Scalar::Float64(0.5)]]).expect("array");
        let out = native_concat(&[&floats, &ints], &Promoter).expect("concat");
        assert_eq!(out.dtype(), &DType::Float64);
        assert_eq!(out.column(0), &[Scalar::Float64(0.5), Scalar::Float64(1.0)]);
    }

    #[test]
    fn native_and_compat_concat_agree_on_uniform_inputs() {
        let a = int_array(&[1, 2]);
        let b = int_array(&[3]);
        let native = native_concat(&[&a, &b], &Promoter).expect("native");
        let compat = concat_compat(&[&a, &b], &Promoter).expect("compat");
        assert_eq!(native, compat);
    }

    #[test]
    fn native_concat_refuses_non_numeric_mixes() {
        let ints = int_array(&[1]);
        let dates = Array::from_columns(DType::Datetime64, vec![vec![Scalar::Datetime64(0)]])
            .expect("array");
        let err = native_concat(&[&ints, &dates], &Promoter).expect_err("must refuse");
        assert!(matches!(err, ColumnarError::NonUniformConcat { .. }));
    }

    #[test]
    fn concat_compat_promotes_and_casts() {
        let ints = int_array(&[1, 2]);
        let floats = Array::from_columns(
            DType::Float64,
            vec![vec![Scalar::Float64(0.5), Scalar::Float64(f64::NAN)]],
        )
        .expect("array");
        let out = concat_compat(&[&ints, &floats], &Promoter).expect("concat");
        assert_eq!(out.dtype(), &DType::Float64);
        assert_eq!(out.column(0)[0], Scalar::Float64(1.0));
        assert!(out.column(0)[3].is_missing());
    }

    #[test]
    fn concat_compat_lets_empty_arrays_abstain_from_dtype_votes() {
        let empty_object = Array::from_columns(DType::Object, vec![vec![]]).expect("array");
        let ints = int_array(&[7]);
        let out = concat_compat(&[&empty_object, &ints], &Promoter).expect("concat");
        assert_eq!(out.dtype(), &DType::Int64);
        assert_eq!(out.column(0), &[Scalar::Int64(7)]);
    }

    #[test]
    fn na_array_materializes_with_the_requested_fill() {
        let out = make_na_array(&DType::Float64, 2, 3, Scalar::Null(NullKind::NaN)).expect("array");
        assert_eq!(out.ncols(), 2);
        assert_eq!(out.nrows(), 3);
        assert!(out.iter_values().all(Scalar::is_missing));
    }

    #[test]
    fn one_dimensional_extension_dtypes_reject_multi_column_blocks() {
        let utf8 = DType::Extension(bc_types::ExtensionKind::Utf8);
        let err = make_na_array(&utf8, 2, 3, Scalar::Null(NullKind::Na)).expect_err("must fail");
        assert!(matches!(err, ColumnarError::WideExtensionBlock { ncols: 2, .. }));

        let values = Array::from_columns(
            utf8,
            vec![
                vec![Scalar::Utf8("a".into())],
                vec![Scalar::Utf8("b".into())],
            ],
        )
        .expect("array");
        let err = Block::new(values, BlockPlacement::from_range(0..2)).expect_err("must fail");
        assert!(matches!(err, ColumnarError::WideExtensionBlock { ncols: 2, .. }));
    }

    #[test]
    fn block_shape_keeps_one_dimensional_extension_arrays_flat() {
        let ext = Array::from_values(
            DType::Extension(bc_types::ExtensionKind::Utf8),
            vec![Scalar::Utf8("x".into())],
        );
        let shaped = ensure_block_shape(ext.clone());
        assert!(shaped.one_dimensional());

        let native = Array::from_values(DType::Int64, vec![Scalar::Int64(1)]);
        let shaped = ensure_block_shape(native);
        assert!(!shaped.one_dimensional());
    }

    #[test]
    fn deep_copy_produces_independent_storage() {
        let array = int_array(&[1, 2]);
        let copy = array.deep_copy();
        assert_eq!(array, copy);
        let view = array.clone();
        assert_eq!(array, view);
    }
}
