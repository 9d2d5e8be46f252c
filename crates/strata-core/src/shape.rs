use std::fmt;

// Shape — Dimensions of a node vector or an edge weight matrix
//
// Strata only ever deals with two kinds of dense arrays:
//   - Vector: Shape([width])            — node values, biases, inputs, targets
//   - Matrix: Shape([rows, cols])       — edge weights, [src width x dst width]
//
// Matrices are always row-major, so element (r, c) lives at r * cols + c.
// The layout compiler relies on this when it hands flat offsets to the
// primitive kernels.

/// Shape of a host tensor: a vector `[n]` or a row-major matrix `[rows, cols]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Create a new shape from a vector of dimension sizes.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// The dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (product of all dims). Any zero dim gives 0.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product()
    }

    /// Size of a specific dimension.
    pub fn dim(&self, d: usize) -> crate::Result<usize> {
        self.0
            .get(d)
            .copied()
            .ok_or_else(|| crate::Error::msg(format!("dim {d} out of range for shape {self}")))
    }

    /// `(rows, cols)` if this is a matrix.
    pub fn as_matrix(&self) -> Option<(usize, usize)> {
        match self.0.as_slice() {
            &[rows, cols] => Some((rows, cols)),
            _ => None,
        }
    }

    /// Vector length if this is rank 1.
    pub fn as_vector(&self) -> Option<usize> {
        match self.0.as_slice() {
            &[n] => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

// These let you write: Shape::from((3, 4)) instead of Shape::new(vec![3, 4])

impl From<usize> for Shape {
    fn from(d: usize) -> Self {
        Shape(vec![d])
    }
}

impl From<(usize, usize)> for Shape {
    fn from((d0, d1): (usize, usize)) -> Self {
        Shape(vec![d0, d1])
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_shape() {
        let s = Shape::from(5);
        assert_eq!(s.rank(), 1);
        assert_eq!(s.elem_count(), 5);
        assert_eq!(s.as_vector(), Some(5));
        assert_eq!(s.as_matrix(), None);
    }

    #[test]
    fn test_matrix_shape() {
        let s = Shape::from((3, 4));
        assert_eq!(s.rank(), 2);
        assert_eq!(s.elem_count(), 12);
        assert_eq!(s.as_matrix(), Some((3, 4)));
        assert_eq!(s.dim(1).unwrap(), 4);
        assert!(s.dim(2).is_err());
    }

    #[test]
    fn test_zero_dim_has_no_elements() {
        assert_eq!(Shape::from(0).elem_count(), 0);
        assert_eq!(Shape::from((3, 0)).elem_count(), 0);
    }

    #[test]
    fn test_display() {
        let s = Shape::from((3, 4));
        assert_eq!(format!("{}", s), "[3, 4]");
    }
}
