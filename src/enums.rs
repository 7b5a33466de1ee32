use std::fmt;

/// Kind of a reconstruction view.
///
/// The physical axis each kind looks along is configured through
/// [`crate::config::MprConfig`]; by default `Primary` is axial,
/// `SecondaryA` coronal and `SecondaryB` sagittal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ViewKind {
    #[default]
    Primary,
    SecondaryA,
    SecondaryB,
}

impl ViewKind {
    pub const ALL: [ViewKind; 3] = [ViewKind::Primary, ViewKind::SecondaryA, ViewKind::SecondaryB];
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViewKind::Primary => "PRIMARY",
            ViewKind::SecondaryA => "SECONDARY-A",
            ViewKind::SecondaryB => "SECONDARY-B",
        };
        f.write_str(label)
    }
}

/// Voxel grid axis, named after the (Z, Y, X) storage order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Z,
    Y,
    X,
}

impl Axis {
    /// Index into a `(depth, height, width)` shape.
    pub fn storage_index(self) -> usize {
        match self {
            Axis::Z => 0,
            Axis::Y => 1,
            Axis::X => 2,
        }
    }

    /// Index into an `(x, y, z)` vector.
    pub fn vector_index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProjectionMode {
    #[default]
    Average,
    Maximum,
    Minimum,
}

impl fmt::Display for ProjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProjectionMode::Average => "AVG",
            ProjectionMode::Maximum => "MIP",
            ProjectionMode::Minimum => "MinIP",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    None,
}

/// Lifecycle of a single view.
///
/// `Unloaded -> Stack -> {Stack, Building -> Mpr | Stack}`. Loading a new
/// series always passes through `Unloaded` first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ViewStatus {
    #[default]
    Unloaded,
    Stack,
    Building { generation: u64, progress: u8 },
    Mpr,
}
