//! Named parallel-expansion dimensions and their concrete value sets.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Display, Formatter};

/// Identifier of an axis such as `cell_id`, `chromosome` or `region`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisName(String);

impl AxisName {
    pub fn new(name: impl Into<String>) -> Self {
        AxisName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AxisName {
    fn from(name: &str) -> Self {
        AxisName::new(name)
    }
}

impl From<String> for AxisName {
    fn from(name: String) -> Self {
        AxisName(name)
    }
}

impl From<&AxisName> for AxisName {
    fn from(name: &AxisName) -> Self {
        name.clone()
    }
}

impl Display for AxisName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Associates an axis with the ordered collection of values it takes.
///
/// Values are rendered with `Display` when the binding is recorded in a
/// workflow; the rendered form is what jobs see as their instance value and
/// what keys multi-valued artifacts.
#[derive(Clone, Debug)]
pub struct AxisBinding<T> {
    axis: AxisName,
    values: Vec<T>,
}

impl<T: Display> AxisBinding<T> {
    /// Bind `axis` to an explicit list of values.
    pub fn new(axis: impl Into<AxisName>, values: impl IntoIterator<Item = T>) -> Self {
        AxisBinding {
            axis: axis.into(),
            values: values.into_iter().collect(),
        }
    }

    pub fn axis(&self) -> &AxisName {
        &self.axis
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render the values, failing on the first duplicate.
    pub(crate) fn rendered(&self) -> Result<Vec<String>, String> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.values.len());
        for v in &self.values {
            let v = v.to_string();
            if !seen.insert(v.clone()) {
                return Err(v);
            }
            out.push(v);
        }
        Ok(out)
    }
}

impl<T: Display + Clone + Ord> AxisBinding<T> {
    /// Bind `axis` to the keys of `map`, in key order.
    pub fn from_keys<V>(axis: impl Into<AxisName>, map: &BTreeMap<T, V>) -> Self {
        AxisBinding::new(axis, map.keys().cloned())
    }
}

/// Concrete coordinates of one replica of an axis-expanded node.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Instance(BTreeMap<AxisName, String>);

impl Instance {
    pub fn new() -> Self {
        Instance::default()
    }

    pub fn with(mut self, axis: impl Into<AxisName>, value: impl Into<String>) -> Self {
        self.0.insert(axis.into(), value.into());
        self
    }

    pub fn get(&self, axis: &AxisName) -> Option<&str> {
        self.0.get(axis).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AxisName, &str)> {
        self.0.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Relative directory for this instance, e.g. `cell_id=A/region=1-1-100`.
    pub fn dir_name(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.to_string())
        }
    }

    /// Combine two instances; values in `other` win.
    pub fn union(&self, other: &Instance) -> Instance {
        let mut merged = self.0.clone();
        merged.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Instance(merged)
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.0.iter().map(|(k, v)| format!("{k}={v}")).join("/")
        )
    }
}

/// Axis value sets recorded in one workflow scope.
#[derive(Clone, Debug, Default)]
pub(crate) struct AxisTable {
    axes: BTreeMap<AxisName, Vec<String>>,
}

impl AxisTable {
    pub(crate) fn insert(&mut self, axis: AxisName, values: Vec<String>) -> bool {
        if self.axes.contains_key(&axis) {
            return false;
        }
        self.axes.insert(axis, values);
        true
    }

    pub(crate) fn contains(&self, axis: &AxisName) -> bool {
        self.axes.contains_key(axis)
    }

    pub(crate) fn values(&self, axis: &AxisName) -> &[String] {
        self.axes.get(axis).map_or(&[], Vec::as_slice)
    }

    /// Cartesian product of the value sets of `axes`, in the given axis order.
    ///
    /// No axes yields the single empty instance; an empty value set yields none.
    pub(crate) fn instances(&self, axes: &[AxisName]) -> Vec<Instance> {
        if axes.is_empty() {
            return vec![Instance::new()];
        }
        axes.iter()
            .map(|axis| {
                self.values(axis)
                    .iter()
                    .map(|v| (axis.clone(), v.clone()))
                    .collect::<Vec<_>>()
            })
            .multi_cartesian_product()
            .map(|coords| Instance(coords.into_iter().collect()))
            .collect()
    }
}
