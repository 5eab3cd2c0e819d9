//! Feature schemas: ordered field lists that define a fixed-width descriptor.
//!
//! Every one-hot field carries an explicit [`OneHotMap`] from enum values to positions
//! inside a declared width. Maps are checked once, when the schema is registered.

pub mod dma;
pub mod dpu;

use std::fmt;

use crate::core::error::VpuError;
use crate::core::types::EnumDomain;

/// Position of each enum value inside a one-hot block of `width` slots.
#[derive(Clone, PartialEq, Eq)]
pub struct OneHotMap {
    domain: &'static str,
    width: usize,
    /// Indexed by the enum discriminant.
    positions: Vec<Option<usize>>,
    cardinality: usize,
}

impl fmt::Debug for OneHotMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OneHotMap({}, width {})", self.domain, self.width)
    }
}

impl OneHotMap {
    /// Every variant at its own discriminant.
    pub fn identity<T: EnumDomain>() -> Self {
        Self {
            domain: T::NAME,
            width: T::cardinality(),
            positions: (0..T::cardinality()).map(Some).collect(),
            cardinality: T::cardinality(),
        }
    }

    /// Only `values`, in the given order.
    pub fn subset<T: EnumDomain>(values: &[T]) -> Self {
        let pairs: Vec<(T, usize)> = values.iter().enumerate().map(|(pos, v)| (*v, pos)).collect();
        Self::explicit(values.len(), &pairs)
    }

    /// Arbitrary value-to-position pairs. Several values may share a position.
    pub fn explicit<T: EnumDomain>(width: usize, pairs: &[(T, usize)]) -> Self {
        let mut positions = vec![None; T::cardinality()];
        for (value, pos) in pairs {
            positions[value.index()] = Some(*pos);
        }
        Self { domain: T::NAME, width, positions, cardinality: T::cardinality() }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn domain(&self) -> &'static str {
        self.domain
    }

    pub fn position(&self, index: usize) -> Option<usize> {
        self.positions.get(index).copied().flatten()
    }

    fn validate(&self) -> Result<(), String> {
        if self.width == 0 {
            return Err(format!("{} one-hot block has zero width", self.domain));
        }
        if self.positions.len() != self.cardinality {
            return Err(format!(
                "{} map covers {} values, domain has {}",
                self.domain,
                self.positions.len(),
                self.cardinality
            ));
        }
        if let Some(bad) = self.positions.iter().flatten().find(|&&p| p >= self.width) {
            return Err(format!("{} position {} outside width {}", self.domain, bad, self.width));
        }
        if self.positions.iter().all(Option::is_none) {
            return Err(format!("{} map is empty", self.domain));
        }
        Ok(())
    }
}

type ScalarFn<T> = Box<dyn Fn(&T) -> f32 + Send + Sync>;
type IndexFn<T> = Box<dyn Fn(&T) -> usize + Send + Sync>;

pub enum FieldKind<T> {
    Scalar(ScalarFn<T>),
    OneHot { map: OneHotMap, index: IndexFn<T> },
    /// Reserved zeros.
    Padding(usize),
}

pub struct Field<T> {
    pub name: String,
    pub kind: FieldKind<T>,
}

impl<T: 'static> Field<T> {
    pub fn scalar(name: impl Into<String>, get: impl Fn(&T) -> f32 + Send + Sync + 'static) -> Self {
        Self { name: name.into(), kind: FieldKind::Scalar(Box::new(get)) }
    }

    pub fn one_hot<E: EnumDomain>(
        name: impl Into<String>,
        map: OneHotMap,
        get: impl Fn(&T) -> E + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), kind: FieldKind::OneHot { map, index: Box::new(move |t: &T| get(t).index()) } }
    }

    pub fn padding(name: impl Into<String>, count: usize) -> Self {
        Self { name: name.into(), kind: FieldKind::Padding(count) }
    }
}

impl<T> Field<T> {
    pub fn width(&self) -> usize {
        match &self.kind {
            FieldKind::Scalar(_) => 1,
            FieldKind::OneHot { map, .. } => map.width(),
            FieldKind::Padding(n) => *n,
        }
    }
}

/// A registered, validated field list.
pub struct Schema<T> {
    name: String,
    fields: Vec<Field<T>>,
    width: usize,
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("name", &self.name).field("width", &self.width).finish()
    }
}

impl<T> Schema<T> {
    pub fn register(name: impl Into<String>, fields: Vec<Field<T>>) -> Result<Self, VpuError> {
        let name = name.into();
        for field in &fields {
            if let FieldKind::OneHot { map, .. } = &field.kind {
                map.validate().map_err(|e| VpuError::Schema(format!("{} / {}: {}", name, field.name, e)))?;
            }
        }
        let width = fields.iter().map(Field::width).sum();
        Ok(Self { name, fields, width })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }
}

/// Helpers that expand array-valued members into one scalar field per element.
pub fn array_fields<T: 'static, const N: usize>(
    prefix: &str,
    get: impl Fn(&T) -> [f32; N] + Send + Sync + Clone + 'static,
) -> Vec<Field<T>> {
    (0..N)
        .map(|i| {
            let g = get.clone();
            Field::scalar(format!("{}[{}]", prefix, i), move |t| g(t)[i])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DataType, ExecutionMode, Operation};

    #[test]
    fn test_subset_positions() {
        let map = OneHotMap::subset(&[DataType::Uint8, DataType::Float16]);
        assert_eq!(map.width(), 2);
        assert_eq!(map.position(DataType::Uint8.index()), Some(0));
        assert_eq!(map.position(DataType::Float16.index()), Some(1));
        assert_eq!(map.position(DataType::Int8.index()), None);
    }

    #[test]
    fn test_register_rejects_out_of_width_mapping() {
        let map = OneHotMap::explicit(2, &[(Operation::Convolution, 0), (Operation::Eltwise, 5)]);
        let fields: Vec<Field<u32>> = vec![Field::one_hot("op", map, |_| Operation::Convolution)];
        let err = Schema::register("broken", fields).unwrap_err();
        assert!(matches!(err, VpuError::Schema(_)));
    }

    #[test]
    fn test_width_sums_fields() {
        let fields: Vec<Field<u32>> = vec![
            Field::scalar("x", |v| *v as f32),
            Field::one_hot("mode", OneHotMap::identity::<ExecutionMode>(), |_| ExecutionMode::Vector),
            Field::padding("reserved", 3),
        ];
        let schema = Schema::register("toy", fields).unwrap();
        assert_eq!(schema.width(), 1 + 6 + 3);
    }
}
