//! Dense N-dimensional arrays of `f64`, stored row-major.
//!
//! Everything the post-processing language does to arrays lives here:
//! stacking, slicing views, `index`, `find` and `fold`'s strip walk.
//! Operations that can fail return [`EvalResult`] with a shape error.

use crate::error::{EvalError, EvalResult};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// How one dimension of a view is taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DimSlice {
    /// Take one position and drop the dimension.
    At(i64),
    /// `start:step:end`, end exclusive. Missing bounds run to the edge in
    /// the direction of `step`.
    Range {
        start: Option<i64>,
        step: i64,
        end: Option<i64>,
    },
}

impl DimSlice {
    pub const ALL: DimSlice = DimSlice::Range {
        start: None,
        step: 1,
        end: None,
    };
}

/// Policy for `index` when strips or positions do not line up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndexPolicy {
    Plain,
    Shrink,
    Pad(f64),
}

impl NdArray {
    /// Build an array, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> EvalResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(EvalError::shape(format!(
                "{} values cannot fill an array of shape {}",
                data.len(),
                fmt_shape(&shape)
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn vector(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn filled(shape: Vec<usize>, value: f64) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![value; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// The single value of a 0-d array.
    pub fn as_scalar(&self) -> Option<f64> {
        if self.shape.is_empty() {
            self.data.first().copied()
        } else {
            None
        }
    }

    fn strides(&self) -> Vec<usize> {
        strides_for(&self.shape)
    }

    fn offset(&self, index: &[usize]) -> usize {
        index
            .iter()
            .zip(self.strides())
            .map(|(i, stride)| i * stride)
            .sum()
    }

    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.ndim() || index.iter().zip(&self.shape).any(|(i, n)| i >= n) {
            return None;
        }
        self.data.get(self.offset(index)).copied()
    }

    /// Every multi-index of the array, in storage order.
    pub fn indices(&self) -> Indices {
        Indices::new(self.shape.clone())
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> NdArray {
        NdArray {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&x| f(x)).collect(),
        }
    }

    /// Stack equally-shaped arrays along a new leading dimension.
    pub fn stack(items: &[NdArray]) -> EvalResult<NdArray> {
        let Some(first) = items.first() else {
            return Ok(NdArray::new(vec![0], Vec::new())?);
        };
        let mut data = Vec::with_capacity(first.len() * items.len());
        for (i, item) in items.iter().enumerate() {
            if item.shape != first.shape {
                return Err(EvalError::shape(format!(
                    "array element {i} has shape {} but element 0 has shape {}",
                    fmt_shape(&item.shape),
                    fmt_shape(&first.shape)
                )));
            }
            data.extend_from_slice(&item.data);
        }
        let mut shape = vec![items.len()];
        shape.extend_from_slice(&first.shape);
        NdArray::new(shape, data)
    }

    /// Take a view: one slice per dimension.
    pub fn view(&self, slices: &[DimSlice]) -> EvalResult<NdArray> {
        if slices.len() != self.ndim() {
            return Err(EvalError::shape(format!(
                "{} slices given for an array with {} dimensions",
                slices.len(),
                self.ndim()
            )));
        }
        let mut positions = Vec::with_capacity(slices.len());
        let mut shape = Vec::new();
        for (dim, (slice, &extent)) in slices.iter().zip(&self.shape).enumerate() {
            let taken = slice_positions(*slice, extent)
                .map_err(|msg| EvalError::shape(format!("dimension {dim}: {msg}")))?;
            if matches!(slice, DimSlice::Range { .. }) {
                shape.push(taken.len());
            }
            positions.push(taken);
        }

        let mut data = Vec::with_capacity(shape.iter().product());
        let picked: Vec<usize> = positions.iter().map(Vec::len).collect();
        let mut source = vec![0; self.ndim()];
        for idx in Indices::new(picked) {
            for (d, &i) in idx.iter().enumerate() {
                source[d] = positions[d][i];
            }
            data.push(self.data[self.offset(&source)]);
        }
        NdArray::new(shape, data)
    }

    /// Positions of nonzero entries as an `(entries × ndim)` array.
    pub fn find(&self) -> NdArray {
        let mut data = Vec::new();
        let mut count = 0;
        for idx in self.indices() {
            if self.data[self.offset(&idx)] != 0.0 {
                data.extend(idx.iter().map(|&i| i as f64));
                count += 1;
            }
        }
        NdArray {
            shape: vec![count, self.ndim()],
            data,
        }
    }

    /// Select entries along `dim`.
    ///
    /// A 2-d `indices` array is in the layout produced by [`NdArray::find`]:
    /// each row is a full multi-index, and entries are regrouped along `dim`
    /// in row order. A scalar or 1-d `indices` lists positions along `dim`.
    pub fn index(&self, indices: &NdArray, dim: usize, policy: IndexPolicy) -> EvalResult<NdArray> {
        if dim >= self.ndim() {
            return Err(EvalError::shape(format!(
                "cannot index dimension {dim} of an array with {} dimensions",
                self.ndim()
            )));
        }
        match indices.ndim() {
            0 | 1 => self.index_positions(indices.data(), dim, policy),
            2 => self.index_entries(indices, dim, policy),
            n => Err(EvalError::shape(format!(
                "index positions must have at most 2 dimensions, not {n}"
            ))),
        }
    }

    fn index_positions(&self, positions: &[f64], dim: usize, policy: IndexPolicy) -> EvalResult<NdArray> {
        let extent = self.shape[dim];
        let resolved: Vec<Option<usize>> = positions
            .iter()
            .map(|&p| as_position(p).filter(|&i| i < extent))
            .collect();

        if policy == IndexPolicy::Shrink {
            let [only] = resolved.as_slice() else {
                return Err(EvalError::shape(format!(
                    "shrinking dimension {dim} needs exactly one position, got {}",
                    resolved.len()
                )));
            };
            let Some(at) = only else {
                return Err(out_of_range(positions[0], dim, extent));
            };
            let mut slices = vec![DimSlice::ALL; self.ndim()];
            slices[dim] = DimSlice::At(*at as i64);
            return self.view(&slices);
        }

        let fill = match policy {
            IndexPolicy::Pad(value) => Some(value),
            _ => None,
        };
        if fill.is_none() {
            if let Some(bad) = resolved.iter().position(Option::is_none) {
                return Err(out_of_range(positions[bad], dim, extent));
            }
        }

        let mut shape = self.shape.clone();
        shape[dim] = resolved.len();
        let mut out = NdArray::filled(shape, fill.unwrap_or(0.0));
        let mut source = vec![0; self.ndim()];
        for idx in out.indices() {
            if let Some(at) = resolved[idx[dim]] {
                source.copy_from_slice(&idx);
                source[dim] = at;
                let value = self.data[self.offset(&source)];
                let target = out.offset(&idx);
                out.data[target] = value;
            }
        }
        Ok(out)
    }

    fn index_entries(&self, indices: &NdArray, dim: usize, policy: IndexPolicy) -> EvalResult<NdArray> {
        let ndim = self.ndim();
        let (entries, width) = (indices.shape[0], indices.shape[1]);
        if width != ndim {
            return Err(EvalError::shape(format!(
                "index entries have {width} coordinates but the array has {ndim} dimensions"
            )));
        }

        let mut rows = Vec::with_capacity(entries);
        for row in indices.data.chunks(ndim.max(1)).take(entries) {
            let mut idx = Vec::with_capacity(ndim);
            for (d, &p) in row.iter().enumerate() {
                match as_position(p).filter(|&i| i < self.shape[d]) {
                    Some(i) => idx.push(i),
                    None => return Err(out_of_range(p, d, self.shape[d])),
                }
            }
            rows.push(idx);
        }

        // How many entries land on each strip along `dim`.
        let mut strip_shape = self.shape.clone();
        strip_shape[dim] = 1;
        let mut counts = NdArray::filled(strip_shape.clone(), 0.0);
        for idx in &rows {
            let mut strip = idx.clone();
            strip[dim] = 0;
            let at = counts.offset(&strip);
            counts.data[at] += 1.0;
        }
        let min = counts.data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = counts.data.iter().copied().fold(0.0, f64::max);
        let padding = matches!(policy, IndexPolicy::Pad(_));
        if (min == 0.0 && !padding) || (min != max && policy == IndexPolicy::Plain) {
            return Err(EvalError::shape(format!(
                "cannot index when the result is irregular (extent ranges from {min} to {max})"
            )));
        }
        let extent = if padding { max as usize } else { min as usize };

        let mut shape = self.shape.clone();
        shape[dim] = extent;
        let fill = match policy {
            IndexPolicy::Pad(value) => value,
            _ => 0.0,
        };
        let mut out = NdArray::filled(shape, fill);
        let mut next = NdArray::filled(strip_shape, 0.0);
        for idx in &rows {
            let value = self.data[self.offset(idx)];
            let mut strip = idx.clone();
            strip[dim] = 0;
            let slot = next.offset(&strip);
            let position = next.data[slot] as usize;
            if position < extent {
                strip[dim] = position;
                let target = out.offset(&strip);
                out.data[target] = value;
                next.data[slot] += 1.0;
            }
        }
        Ok(out)
    }

    /// The strips along `dim`: for each position of the result (extent 1
    /// along `dim`), the values of the operand in order.
    pub fn strips(&self, dim: usize) -> Vec<(Vec<usize>, Vec<f64>)> {
        let mut shape = self.shape.clone();
        shape[dim] = 1;
        let length = self.shape[dim];
        Indices::new(shape)
            .map(|base| {
                let mut at = base.clone();
                let values = (0..length)
                    .map(|j| {
                        at[dim] = j;
                        self.data[self.offset(&at)]
                    })
                    .collect();
                (base, values)
            })
            .collect()
    }

    /// Store `value` at a multi-index already known to be in range.
    pub(crate) fn set(&mut self, index: &[usize], value: f64) {
        let at = self.offset(index);
        self.data[at] = value;
    }

    /// Copy `block` into the sub-array whose leading indices are `prefix`.
    pub(crate) fn write_block(&mut self, prefix: &[usize], block: &NdArray) -> EvalResult<()> {
        let inner = &self.shape[prefix.len()..];
        if inner != block.shape() {
            return Err(EvalError::shape(format!(
                "cannot store a value of shape {} where shape {} is expected",
                fmt_shape(block.shape()),
                fmt_shape(inner)
            )));
        }
        let mut start = vec![0; self.ndim()];
        start[..prefix.len()].copy_from_slice(prefix);
        let at = self.offset(&start);
        self.data[at..at + block.len()].copy_from_slice(&block.data);
        Ok(())
    }

    /// Change the extent of the leading dimension, padding new rows with
    /// `fill` or dropping surplus ones.
    pub(crate) fn resize_leading(&mut self, extent: usize, fill: f64) {
        if let Some(first) = self.shape.first_mut() {
            *first = extent;
            let len = self.shape.iter().product();
            self.data.resize(len, fill);
        }
    }
}

fn as_position(p: f64) -> Option<usize> {
    (p >= 0.0 && p.fract() == 0.0).then_some(p as usize)
}

fn out_of_range(position: f64, dim: usize, extent: usize) -> EvalError {
    EvalError::shape(format!(
        "position {position} is outside dimension {dim} of extent {extent}"
    ))
}

fn strides_for(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// Resolve one slice against a dimension of the given extent. Negative
/// positions count from the end.
fn slice_positions(slice: DimSlice, extent: usize) -> Result<Vec<usize>, String> {
    let len = extent as i64;
    let resolve = |i: i64| if i < 0 { i + len } else { i };
    match slice {
        DimSlice::At(i) => {
            let at = resolve(i);
            if (0..len).contains(&at) {
                Ok(vec![at as usize])
            } else {
                Err(format!("position {i} is outside extent {extent}"))
            }
        }
        DimSlice::Range { start, step, end } => {
            if step == 0 {
                return Err("a range step cannot be zero".into());
            }
            let first = start.map(resolve).unwrap_or(if step > 0 { 0 } else { len - 1 });
            let stop = end.map(resolve).unwrap_or(if step > 0 { len } else { -1 });
            let mut positions = Vec::new();
            let mut i = first;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                if !(0..len).contains(&i) {
                    return Err(format!("position {i} is outside extent {extent}"));
                }
                positions.push(i as usize);
                i += step;
            }
            Ok(positions)
        }
    }
}

pub(crate) fn fmt_shape(shape: &[usize]) -> String {
    let parts: Vec<String> = shape.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

/// Row-major walk over every multi-index of a shape.
pub struct Indices {
    shape: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl Indices {
    pub fn new(shape: Vec<usize>) -> Self {
        let next = if shape.contains(&0) {
            None
        } else {
            Some(vec![0; shape.len()])
        };
        Self { shape, next }
    }
}

impl Iterator for Indices {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;
        let mut following = current.clone();
        for d in (0..self.shape.len()).rev() {
            following[d] += 1;
            if following[d] < self.shape[d] {
                self.next = Some(following);
                return Some(current);
            }
            following[d] = 0;
        }
        Some(current)
    }
}

impl fmt::Display for NdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_level(f: &mut fmt::Formatter<'_>, shape: &[usize], data: &[f64]) -> fmt::Result {
            match shape.split_first() {
                None => write!(f, "{}", data.first().copied().unwrap_or(f64::NAN)),
                Some((&n, rest)) => {
                    let chunk: usize = rest.iter().product();
                    f.write_str("[")?;
                    for i in 0..n {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write_level(f, rest, &data[i * chunk..(i + 1) * chunk])?;
                    }
                    f.write_str("]")
                }
            }
        }
        write_level(f, &self.shape, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn grid() -> NdArray {
        // [[0, 1, 2], [3, 4, 5]]
        NdArray::new(vec![2, 3], (0..6).map(f64::from).collect()).unwrap()
    }

    #[test]
    fn test_indices_walk_row_major() {
        let all: Vec<Vec<usize>> = Indices::new(vec![2, 2]).collect();
        assert_eq!(all, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
        assert_eq!(Indices::new(vec![]).count(), 1);
        assert_eq!(Indices::new(vec![3, 0]).count(), 0);
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        assert!(NdArray::new(vec![2, 2], vec![1.0]).is_err());
    }

    #[test]
    fn test_stack_requires_equal_shapes() {
        let a = NdArray::vector(vec![1.0, 2.0]);
        let b = NdArray::vector(vec![3.0]);
        assert_eq!(NdArray::stack(&[a.clone(), a.clone()]).unwrap().shape(), &[2, 2]);
        assert_eq!(NdArray::stack(&[a, b]).unwrap_err().kind, crate::ErrorKind::Shape);
    }

    #[test]
    fn test_full_view_is_identity() {
        let g = grid();
        assert_eq!(g.view(&[DimSlice::ALL, DimSlice::ALL]).unwrap(), g);
    }

    #[test]
    fn test_view_single_position_drops_dimension() {
        let row = grid().view(&[DimSlice::At(1), DimSlice::ALL]).unwrap();
        assert_eq!(row, NdArray::vector(vec![3.0, 4.0, 5.0]));
        let last = grid().view(&[DimSlice::At(-1), DimSlice::At(-1)]).unwrap();
        assert_eq!(last.as_scalar(), Some(5.0));
    }

    #[test]
    fn test_view_negative_step() {
        let reversed = grid()
            .view(&[
                DimSlice::At(0),
                DimSlice::Range {
                    start: None,
                    step: -1,
                    end: None,
                },
            ])
            .unwrap();
        assert_eq!(reversed, NdArray::vector(vec![2.0, 1.0, 0.0]));
    }

    #[test]
    fn test_view_out_of_range() {
        let err = grid()
            .view(&[DimSlice::At(2), DimSlice::ALL])
            .unwrap_err();
        assert!(err.message.contains("outside"));
    }

    #[test]
    fn test_find_lists_nonzero_positions() {
        let a = NdArray::new(vec![2, 2], vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        assert_eq!(
            a.find(),
            NdArray::new(vec![2, 2], vec![0.0, 1.0, 1.0, 0.0]).unwrap()
        );
        assert_eq!(NdArray::vector(vec![0.0, 0.0]).find().shape(), &[0, 1]);
    }

    #[test]
    fn test_index_entries_regroups_along_dimension() {
        // Pick two entries from each row.
        let g = grid();
        let picks = NdArray::new(vec![4, 2], vec![0.0, 0.0, 0.0, 2.0, 1.0, 1.0, 1.0, 2.0]).unwrap();
        let out = g.index(&picks, 1, IndexPolicy::Plain).unwrap();
        assert_eq!(out, NdArray::new(vec![2, 2], vec![0.0, 2.0, 4.0, 5.0]).unwrap());
    }

    #[test]
    fn test_index_entries_irregular() {
        let g = grid();
        let picks = NdArray::new(vec![3, 2], vec![0.0, 0.0, 0.0, 2.0, 1.0, 1.0]).unwrap();
        assert!(g.index(&picks, 1, IndexPolicy::Plain).is_err());
        let shrunk = g.index(&picks, 1, IndexPolicy::Shrink).unwrap();
        assert_eq!(shrunk, NdArray::new(vec![2, 1], vec![0.0, 4.0]).unwrap());
        let padded = g.index(&picks, 1, IndexPolicy::Pad(-1.0)).unwrap();
        assert_eq!(padded, NdArray::new(vec![2, 2], vec![0.0, 2.0, 4.0, -1.0]).unwrap());
    }

    #[test]
    fn test_strips_along_dimension() {
        let strips = grid().strips(0);
        assert_eq!(strips.len(), 3);
        assert_eq!(strips[1], (vec![0, 1], vec![1.0, 4.0]));
    }

    #[test]
    fn test_resize_leading() {
        let mut a = NdArray::filled(vec![2, 2], 1.0);
        a.resize_leading(3, f64::NAN);
        assert_eq!(a.shape(), &[3, 2]);
        assert!(a.data()[5].is_nan());
        a.resize_leading(1, 0.0);
        assert_eq!(a, NdArray::filled(vec![1, 2], 1.0));
    }

    #[test]
    fn test_display() {
        assert_eq!(grid().to_string(), "[[0, 1, 2], [3, 4, 5]]");
        assert_eq!(NdArray::scalar(2.5).to_string(), "2.5");
    }
}
