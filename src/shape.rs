use std::fmt;

/// Concrete tensor shape. Zero-length dimensions are permitted, in which
/// case the tensor carries no elements.
#[derive(Clone, Default, Hash, PartialEq, Eq)]
pub struct Shape(Vec<usize>);

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl Shape {
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn size(&self) -> usize {
        self.0.iter().product()
    }

    pub fn has_zero_dim(&self) -> bool {
        self.0.contains(&0)
    }
}

/// One dimension of a symbolic shape: a concrete extent, a named variable
/// shared between declarations (e.g. a batch dimension), or fully unknown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dim {
    Known(usize),
    Sym(String),
    Unknown,
}

impl Dim {
    pub fn known(&self) -> Option<usize> {
        if let Dim::Known(x) = self {
            Some(*x)
        } else {
            None
        }
    }

    /// Prefers concrete information, then a name, then the other side.
    pub fn merge(&self, other: &Dim) -> Dim {
        match (self, other) {
            (Dim::Known(x), _) | (_, Dim::Known(x)) => Dim::Known(*x),
            (Dim::Sym(s), _) | (_, Dim::Sym(s)) => Dim::Sym(s.clone()),
            (Dim::Unknown, Dim::Unknown) => Dim::Unknown,
        }
    }
}

/// Shape whose rank and dimensions may be unresolved at compile time.
#[derive(Clone, PartialEq, Eq)]
pub struct SymbolicShape(Option<Vec<Dim>>);

impl fmt::Debug for SymbolicShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(dims) => write!(f, "{dims:?}"),
            None => write!(f, "[?]"),
        }
    }
}

impl From<Vec<Dim>> for SymbolicShape {
    fn from(dims: Vec<Dim>) -> Self {
        Self(Some(dims))
    }
}

impl From<&Shape> for SymbolicShape {
    fn from(shape: &Shape) -> Self {
        Self(Some(shape.dims().iter().map(|&d| Dim::Known(d)).collect()))
    }
}

impl SymbolicShape {
    /// Known rank, every dimension unknown.
    pub fn unknown(rank: usize) -> Self {
        Self(Some(vec![Dim::Unknown; rank]))
    }

    /// Not even the rank is known.
    pub fn unknown_rank() -> Self {
        Self(None)
    }

    pub fn rank(&self) -> Option<usize> {
        self.0.as_ref().map(Vec::len)
    }

    pub fn dims(&self) -> Option<&[Dim]> {
        self.0.as_deref()
    }

    pub fn concrete(&self) -> Option<Shape> {
        self.0.as_ref()?.iter().map(Dim::known).collect::<Option<Vec<_>>>().map(Shape::from)
    }

    pub fn is_concrete(&self) -> bool {
        self.concrete().is_some()
    }
}
