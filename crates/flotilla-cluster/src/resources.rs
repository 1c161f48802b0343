use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// Minimum cpus for a scalar `cpus` quantity to count as allocatable.
pub const MIN_CPUS: f64 = 0.01;

/// Minimum memory (in MB) for a scalar `mem` quantity to count as allocatable.
pub const MIN_MEM: f64 = 16.0;

/// An inclusive range of integers, as used for ports and similar quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub begin: u64,
    pub end: u64,
}

impl Range {
    pub fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Scalar(f64),
    Ranges(Vec<Range>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub value: Value,
}

impl Resource {
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: Value::Scalar(value),
        }
    }

    pub fn ranges(name: impl Into<String>, ranges: Vec<Range>) -> Self {
        Self {
            name: name.into(),
            value: Value::Ranges(merge_ranges(ranges)),
        }
    }

    pub fn set<I, S>(name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            value: Value::Set(items.into_iter().map(Into::into).collect()),
        }
    }
}

/// A bag of named quantities.
///
/// Addition and subtraction dispatch per kind. Subtraction clamps scalars at
/// zero and takes the set difference for ranges and sets, so a bag is never
/// negative. There is no total ordering; only containment ([Resources::contains])
/// is defined, and a missing quantity is indistinguishable from a zero one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resources(Vec<Resource>);

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a resource string such as
    /// `cpus:8;mem:4096;ports:[31000-32000];disks:{sda1}`.
    pub fn parse(s: &str) -> ClusterResult<Self> {
        let mut resources = Resources::new();
        for part in s.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let Some((name, value)) = part.split_once(':') else {
                return Err(ClusterError::InvalidArgument(format!(
                    "expecting '<name>:<value>' in resource '{part}'"
                )));
            };
            resources += parse_resource(name.trim(), value.trim())?;
        }
        Ok(resources)
    }

    pub fn size(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|r| r.name == name).map(|r| &r.value)
    }

    /// The scalar quantity with the given name, or zero when missing.
    pub fn scalar(&self, name: &str) -> f64 {
        match self.get(name) {
            Some(Value::Scalar(value)) => *value,
            _ => 0.0,
        }
    }

    /// Whether `other` is covered by this bag, componentwise.
    /// Missing quantities count as zero (or empty).
    pub fn contains(&self, other: &Resources) -> bool {
        other.0.iter().all(|resource| match &resource.value {
            Value::Scalar(value) => self.scalar(&resource.name) >= *value,
            Value::Ranges(ranges) => match self.get(&resource.name) {
                Some(Value::Ranges(ours)) => ranges_contain(ours, ranges),
                _ => ranges.is_empty(),
            },
            Value::Set(items) => match self.get(&resource.name) {
                Some(Value::Set(ours)) => items.is_subset(ours),
                _ => items.is_empty(),
            },
        })
    }

    /// The subset of this bag worth offering: unnamed quantities, empty
    /// ranges and sets, and scalars below the per-kind minimum are dropped.
    pub fn allocatable(&self) -> Resources {
        let resources = self
            .0
            .iter()
            .filter(|resource| {
                if resource.name.is_empty() {
                    return false;
                }
                match &resource.value {
                    Value::Scalar(value) => *value >= scalar_epsilon(&resource.name),
                    Value::Ranges(ranges) => !ranges.is_empty(),
                    Value::Set(items) => !items.is_empty(),
                }
            })
            .cloned()
            .collect();
        Resources(resources)
    }
}

fn scalar_epsilon(name: &str) -> f64 {
    match name {
        "cpus" => MIN_CPUS,
        "mem" => MIN_MEM,
        _ => f64::MIN_POSITIVE,
    }
}

fn parse_resource(name: &str, value: &str) -> ClusterResult<Resource> {
    if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        let mut ranges = vec![];
        for range in inner.split(',') {
            let range = range.trim();
            if range.is_empty() {
                continue;
            }
            let Some((begin, end)) = range.split_once('-') else {
                return Err(ClusterError::InvalidArgument(format!(
                    "expecting '<begin>-<end>' in range '{range}'"
                )));
            };
            let begin = begin.trim().parse::<u64>().map_err(invalid_number)?;
            let end = end.trim().parse::<u64>().map_err(invalid_number)?;
            ranges.push(Range::new(begin, end));
        }
        Ok(Resource::ranges(name, ranges))
    } else if let Some(inner) = value.strip_prefix('{').and_then(|v| v.strip_suffix('}')) {
        let items = inner
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string);
        Ok(Resource::set(name, items))
    } else {
        let value = value.parse::<f64>().map_err(invalid_number)?;
        Ok(Resource::scalar(name, value))
    }
}

fn invalid_number(e: impl fmt::Display) -> ClusterError {
    ClusterError::InvalidArgument(format!("invalid number: {e}"))
}

/// Equality treats a missing quantity and a zero quantity the same, so it is
/// defined as mutual containment rather than structural equality.
impl PartialEq for Resources {
    fn eq(&self, other: &Self) -> bool {
        self.contains(other) && other.contains(self)
    }
}

impl AddAssign<Resource> for Resources {
    fn add_assign(&mut self, rhs: Resource) {
        for resource in self.0.iter_mut() {
            if resource.name != rhs.name {
                continue;
            }
            match (&mut resource.value, &rhs.value) {
                (Value::Scalar(ours), Value::Scalar(theirs)) => {
                    *ours += theirs;
                    return;
                }
                (Value::Ranges(ours), Value::Ranges(theirs)) => {
                    let mut merged = ours.clone();
                    merged.extend(theirs.iter().copied());
                    *ours = merge_ranges(merged);
                    return;
                }
                (Value::Set(ours), Value::Set(theirs)) => {
                    ours.extend(theirs.iter().cloned());
                    return;
                }
                _ => {}
            }
        }
        self.0.push(rhs);
    }
}

impl SubAssign<Resource> for Resources {
    fn sub_assign(&mut self, rhs: Resource) {
        for resource in self.0.iter_mut() {
            if resource.name != rhs.name {
                continue;
            }
            match (&mut resource.value, &rhs.value) {
                (Value::Scalar(ours), Value::Scalar(theirs)) => {
                    *ours = (*ours - theirs).max(0.0);
                    return;
                }
                (Value::Ranges(ours), Value::Ranges(theirs)) => {
                    *ours = subtract_ranges(ours, theirs);
                    return;
                }
                (Value::Set(ours), Value::Set(theirs)) => {
                    for item in theirs {
                        ours.remove(item);
                    }
                    return;
                }
                _ => {}
            }
        }
    }
}

impl AddAssign<&Resources> for Resources {
    fn add_assign(&mut self, rhs: &Resources) {
        for resource in &rhs.0 {
            *self += resource.clone();
        }
    }
}

impl SubAssign<&Resources> for Resources {
    fn sub_assign(&mut self, rhs: &Resources) {
        for resource in &rhs.0 {
            *self -= resource.clone();
        }
    }
}

impl Add<&Resources> for Resources {
    type Output = Resources;

    fn add(mut self, rhs: &Resources) -> Resources {
        self += rhs;
        self
    }
}

impl Sub<&Resources> for Resources {
    type Output = Resources;

    fn sub(mut self, rhs: &Resources) -> Resources {
        self -= rhs;
        self
    }
}

impl FromIterator<Resource> for Resources {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut resources = Resources::new();
        for resource in iter {
            resources += resource;
        }
        resources
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(none)");
        }
        for (i, resource) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}=", resource.name)?;
            match &resource.value {
                Value::Scalar(value) => write!(f, "{value}")?,
                Value::Ranges(ranges) => {
                    write!(f, "[")?;
                    for (j, range) in ranges.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}-{}", range.begin, range.end)?;
                    }
                    write!(f, "]")?;
                }
                Value::Set(items) => {
                    write!(f, "{{")?;
                    for (j, item) in items.iter().enumerate() {
                        if j > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{item}")?;
                    }
                    write!(f, "}}")?;
                }
            }
        }
        Ok(())
    }
}

/// Sort and merge overlapping or adjacent ranges.
fn merge_ranges(mut ranges: Vec<Range>) -> Vec<Range> {
    ranges.sort_by_key(|r| r.begin);
    let mut merged: Vec<Range> = vec![];
    for range in ranges {
        if range.end < range.begin {
            continue;
        }
        match merged.last_mut() {
            Some(last) if range.begin <= last.end.saturating_add(1) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

fn subtract_ranges(from: &[Range], remove: &[Range]) -> Vec<Range> {
    let mut out = merge_ranges(from.to_vec());
    for rem in remove {
        let mut next = vec![];
        for range in out {
            if rem.end < range.begin || range.end < rem.begin {
                next.push(range);
                continue;
            }
            if range.begin < rem.begin {
                next.push(Range::new(range.begin, rem.begin - 1));
            }
            if rem.end < range.end {
                next.push(Range::new(rem.end + 1, range.end));
            }
        }
        out = next;
    }
    out
}

fn ranges_contain(outer: &[Range], inner: &[Range]) -> bool {
    let outer = merge_ranges(outer.to_vec());
    inner
        .iter()
        .all(|i| outer.iter().any(|o| o.begin <= i.begin && i.end <= o.end))
}

/// A pair of resource quantities: `expected` is the upper bound the allocator
/// may offer, `guaranteed` is the floor the master commits to reserving.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceHints {
    pub expected: Resources,
    pub guaranteed: Resources,
}

impl ResourceHints {
    pub fn new(expected: Resources, guaranteed: Resources) -> Self {
        Self {
            expected,
            guaranteed,
        }
    }

    pub fn expected_only(expected: Resources) -> Self {
        Self {
            expected,
            guaranteed: Resources::new(),
        }
    }
}

impl AddAssign<&ResourceHints> for ResourceHints {
    fn add_assign(&mut self, rhs: &ResourceHints) {
        self.expected += &rhs.expected;
        self.guaranteed += &rhs.guaranteed;
    }
}

impl SubAssign<&ResourceHints> for ResourceHints {
    fn sub_assign(&mut self, rhs: &ResourceHints) {
        self.expected -= &rhs.expected;
        self.guaranteed -= &rhs.guaranteed;
    }
}

impl fmt::Display for ResourceHints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (guaranteed: {})", self.expected, self.guaranteed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsing() {
        let r = Resources::parse("cpus:45.55;ports:[10000-20000, 30000-50000];disks:{sda1}")
            .unwrap();
        assert_eq!(r.size(), 3);
        assert_eq!(r.scalar("cpus"), 45.55);
        assert_eq!(
            r.get("ports"),
            Some(&Value::Ranges(vec![
                Range::new(10000, 20000),
                Range::new(30000, 50000)
            ]))
        );
        let Some(Value::Set(disks)) = r.get("disks") else {
            panic!("expecting a set");
        };
        assert_eq!(disks.len(), 1);
        assert!(disks.contains("sda1"));
    }

    #[test]
    fn test_printing() {
        let r = Resources::parse("cpus:45.55;ports:[10000-20000, 30000-50000];disks:{sda1}")
            .unwrap();
        assert_eq!(
            r.to_string(),
            "cpus=45.55; ports=[10000-20000, 30000-50000]; disks={sda1}"
        );
    }

    #[test]
    fn test_initialized_is_empty() {
        assert_eq!(Resources::new().size(), 0);
    }

    #[test]
    fn test_bad_resources_not_allocatable() {
        let mut r = Resources::new();
        r += Resource::scalar("", 1.0);
        assert_eq!(r.allocatable().size(), 0);
        r += Resource::scalar("cpus", 0.001);
        assert_eq!(r.allocatable().size(), 0);
        r += Resource::scalar("mem", 1.0);
        assert_eq!(r.allocatable().size(), 0);
    }

    #[test]
    fn test_scalar_equals() {
        let r1 = Resources::parse("cpus:3;mem:3072").unwrap();
        let r2 = Resources::parse("cpus:3;mem:3072").unwrap();
        assert_eq!(r1, r2);
    }

    #[test]
    fn test_zero_equals_missing() {
        let r1 = Resources::parse("cpus:3;mem:0").unwrap();
        let r2 = Resources::parse("cpus:3").unwrap();
        assert_eq!(r1, r2);
        assert_eq!(r2, r1);
    }

    #[test]
    fn test_scalar_subset() {
        let r1 = Resources::parse("cpus:1;mem:3072").unwrap();
        let r2 = Resources::parse("cpus:1;mem:4096").unwrap();
        assert!(r2.contains(&r1));
        assert!(!r1.contains(&r2));
    }

    #[test]
    fn test_scalar_addition() {
        let r1 = Resources::parse("cpus:1;mem:5").unwrap();
        let r2 = Resources::parse("cpus:2;mem:10").unwrap();
        let sum = r1 + &r2;
        assert_eq!(sum.size(), 2);
        assert_eq!(sum.scalar("cpus"), 3.0);
        assert_eq!(sum.scalar("mem"), 15.0);
    }

    #[test]
    fn test_scalar_subtraction() {
        let r1 = Resources::parse("cpus:50;mem:4096").unwrap();
        let r2 = Resources::parse("cpus:0.5;mem:1024").unwrap();
        let diff = r1.clone() - &r2;
        assert_eq!(diff.scalar("cpus"), 49.5);
        assert_eq!(diff.scalar("mem"), 3072.0);

        let zero = r1.clone() - &r1;
        assert_eq!(zero, Resources::new());
    }

    #[test]
    fn test_subtraction_clamps_at_zero() {
        let r1 = Resources::parse("cpus:1").unwrap();
        let r2 = Resources::parse("cpus:2;mem:512").unwrap();
        let diff = r1 - &r2;
        assert_eq!(diff.scalar("cpus"), 0.0);
        assert_eq!(diff, Resources::new());
    }

    #[test]
    fn test_range_addition_merges() {
        let r1 = Resources::parse("ports:[20000-40000]").unwrap();
        let r2 = Resources::parse("ports:[30000-50000, 10000-20000]").unwrap();
        let sum = r1 + &r2;
        assert_eq!(
            sum.get("ports"),
            Some(&Value::Ranges(vec![Range::new(10000, 50000)]))
        );
    }

    #[test]
    fn test_range_subtraction_splits() {
        let r1 = Resources::parse("ports:[10000-50000]").unwrap();
        let r2 = Resources::parse("ports:[20000-30000]").unwrap();
        let diff = r1 - &r2;
        assert_eq!(
            diff.get("ports"),
            Some(&Value::Ranges(vec![
                Range::new(10000, 19999),
                Range::new(30001, 50000)
            ]))
        );
    }

    #[test]
    fn test_range_containment() {
        let outer = Resources::parse("ports:[10000-20000, 30000-50000]").unwrap();
        let inner = Resources::parse("ports:[10500-11000, 31000-32000]").unwrap();
        let across = Resources::parse("ports:[19999-30001]").unwrap();
        assert!(outer.contains(&inner));
        assert!(!outer.contains(&across));
        assert!(!inner.contains(&outer));
    }

    #[test]
    fn test_set_operations() {
        let r1 = Resources::parse("disks:{sda1, sda2}").unwrap();
        let r2 = Resources::parse("disks:{sda2, sda3}").unwrap();
        let sum = r1.clone() + &r2;
        let Some(Value::Set(items)) = sum.get("disks") else {
            panic!("expecting a set");
        };
        assert_eq!(items.len(), 3);

        let diff = r1.clone() - &r2;
        let Some(Value::Set(items)) = diff.get("disks") else {
            panic!("expecting a set");
        };
        assert_eq!(items.iter().collect::<Vec<_>>(), vec!["sda1"]);

        assert!(r1.contains(&Resources::parse("disks:{sda1}").unwrap()));
        assert!(!r1.contains(&r2));
    }

    #[test]
    fn test_allocatable_thresholds() {
        let r = Resources::parse("cpus:0.005;mem:1000;gpus:0").unwrap();
        let allocatable = r.allocatable();
        assert_eq!(allocatable.size(), 1);
        assert_eq!(allocatable.scalar("mem"), 1000.0);

        let r = Resources::parse("cpus:0.01;mem:16").unwrap();
        assert_eq!(r.allocatable().size(), 2);
    }

    #[test]
    fn test_resource_hints_arithmetic() {
        let mut hints = ResourceHints::new(
            Resources::parse("cpus:4;mem:1024").unwrap(),
            Resources::parse("cpus:2;mem:512").unwrap(),
        );
        let used = ResourceHints::new(
            Resources::parse("cpus:1;mem:256").unwrap(),
            Resources::parse("cpus:1;mem:256").unwrap(),
        );
        hints -= &used;
        assert_eq!(hints.expected, Resources::parse("cpus:3;mem:768").unwrap());
        assert_eq!(
            hints.guaranteed,
            Resources::parse("cpus:1;mem:256").unwrap()
        );
        hints += &used;
        assert_eq!(hints.expected, Resources::parse("cpus:4;mem:1024").unwrap());
    }
}
