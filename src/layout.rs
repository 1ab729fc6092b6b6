//! Container layout - the tree of groups, attributes and datasets
//!
//! A container is a hierarchy of named groups. Each group carries a set of
//! attributes and an ordered list of members, which are either nested groups
//! or datasets. Datasets are descriptors pointing at a blob elsewhere in the
//! file; the tree itself is serialized into the footer index.

use crate::compression::CompressionMethod;
use crate::error::{KbpError, Result};
use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator for nested group paths such as `patients/pt_1/roi_names`
pub const PATH_SEPARATOR: char = '/';

/// Value of a group attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Int(i64),
    Str(String),
    IntList(Vec<i64>),
}

impl AttrValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            AttrValue::IntList(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(value: Vec<i64>) -> Self {
        AttrValue::IntList(value)
    }
}

/// Location and encoding of one dataset blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Element type
    pub data_type: DataType,

    /// Array shape, row-major
    pub shape: Vec<usize>,

    /// Compression applied to the blob
    pub compression: CompressionMethod,

    /// Byte offset of the blob from the start of the file
    pub offset: u64,

    /// Size of the blob as stored
    pub stored_size: u64,

    /// Size of the decoded element bytes
    pub raw_size: u64,

    /// CRC32 of the stored blob
    pub checksum: u32,
}

impl DatasetDescriptor {
    pub fn compression_ratio(&self) -> f64 {
        if self.stored_size == 0 {
            0.0
        } else {
            self.raw_size as f64 / self.stored_size as f64
        }
    }
}

/// A member of a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Group(Group),
    Dataset(DatasetDescriptor),
}

/// A named collection of attributes and members
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    attrs: BTreeMap<String, AttrValue>,
    members: Vec<(String, Node)>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(name.into(), value.into());
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<AttrValue> {
        self.attrs.remove(name)
    }

    /// Check whether a member with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|(n, _)| n == name)
    }

    /// Member names in insertion order
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(n, _)| n.as_str())
    }

    pub fn member(&self, name: &str) -> Option<&Node> {
        self.members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| node)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        match self.member(name) {
            Some(Node::Group(group)) => Some(group),
            _ => None,
        }
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
        self.members
            .iter_mut()
            .find(|(n, _)| n == name)
            .and_then(|(_, node)| match node {
                Node::Group(group) => Some(group),
                Node::Dataset(_) => None,
            })
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetDescriptor> {
        match self.member(name) {
            Some(Node::Dataset(desc)) => Some(desc),
            _ => None,
        }
    }

    /// Datasets in insertion order
    pub fn datasets(&self) -> impl Iterator<Item = (&str, &DatasetDescriptor)> {
        self.members.iter().filter_map(|(n, node)| match node {
            Node::Dataset(desc) => Some((n.as_str(), desc)),
            Node::Group(_) => None,
        })
    }

    /// Fail if `name` is not a legal member name or is already taken
    pub fn ensure_vacant(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        if self.contains(name) {
            return Err(KbpError::AlreadyExists(format!(
                "A member named '{}' already exists",
                name
            )));
        }
        Ok(())
    }

    /// Create an empty child group, failing on a name collision
    pub fn create_group(&mut self, name: &str) -> Result<&mut Group> {
        self.insert(name, Node::Group(Group::new()))?;
        match self.members.last_mut() {
            Some((_, Node::Group(group))) => Ok(group),
            _ => Err(KbpError::NotFound(name.to_string())),
        }
    }

    /// Attach a fully built child group, failing on a name collision
    pub fn insert_group(&mut self, name: &str, group: Group) -> Result<()> {
        self.insert(name, Node::Group(group))
    }

    pub fn insert_dataset(&mut self, name: &str, desc: DatasetDescriptor) -> Result<()> {
        self.insert(name, Node::Dataset(desc))
    }

    fn insert(&mut self, name: &str, node: Node) -> Result<()> {
        self.ensure_vacant(name)?;
        self.members.push((name.to_string(), node));
        Ok(())
    }

    /// Resolve a `/`-separated path of nested groups; the empty path is `self`
    pub fn resolve(&self, path: &str) -> Option<&Group> {
        path.split(PATH_SEPARATOR)
            .filter(|part| !part.is_empty())
            .try_fold(self, |group, part| group.group(part))
    }

    pub fn resolve_mut(&mut self, path: &str) -> Option<&mut Group> {
        path.split(PATH_SEPARATOR)
            .filter(|part| !part.is_empty())
            .try_fold(self, |group, part| group.group_mut(part))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(PATH_SEPARATOR) {
        return Err(KbpError::SchemaViolation(format!(
            "Invalid member name '{}'",
            name
        )));
    }
    Ok(())
}

/// The serialized footer of a container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerIndex {
    pub root: Group,
}

impl ContainerIndex {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DatasetDescriptor {
        DatasetDescriptor {
            data_type: DataType::F32,
            shape: vec![2, 2, 2, 1],
            compression: CompressionMethod::Deflate,
            offset: 4,
            stored_size: 8,
            raw_size: 32,
            checksum: 0,
        }
    }

    #[test]
    fn test_members_keep_insertion_order() {
        let mut root = Group::new();
        root.create_group("zeta").unwrap();
        root.create_group("alpha").unwrap();
        root.insert_dataset("mid", descriptor()).unwrap();
        let names: Vec<_> = root.member_names().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_name_collision_is_rejected() {
        let mut root = Group::new();
        root.create_group("pt_1").unwrap().set_attr("id", "pt_1");
        let err = root.insert_group("pt_1", Group::new()).unwrap_err();
        assert!(matches!(err, KbpError::AlreadyExists(_)));
        // original group untouched
        assert_eq!(
            root.group("pt_1").unwrap().attr("id"),
            Some(&AttrValue::from("pt_1"))
        );
        assert!(root.insert_dataset("pt_1", descriptor()).is_err());
    }

    #[test]
    fn test_invalid_names() {
        let mut root = Group::new();
        assert!(matches!(
            root.create_group(""),
            Err(KbpError::SchemaViolation(_))
        ));
        assert!(root.create_group("a/b").is_err());
    }

    #[test]
    fn test_resolve_nested_paths() {
        let mut root = Group::new();
        root.create_group("patients")
            .unwrap()
            .create_group("pt_1")
            .unwrap()
            .create_group("roi_names")
            .unwrap()
            .set_attr("roi_0", "PTV70");

        let roi = root.resolve("patients/pt_1/roi_names").unwrap();
        assert_eq!(roi.attr("roi_0").and_then(|v| v.as_str()), Some("PTV70"));
        assert!(root.resolve("").is_some());
        assert!(root.resolve("patients/missing").is_none());

        root.resolve_mut("patients/pt_1/roi_names")
            .unwrap()
            .remove_attr("roi_0");
        assert!(root
            .resolve("patients/pt_1/roi_names")
            .unwrap()
            .attr("roi_0")
            .is_none());
    }

    #[test]
    fn test_dataset_lookup_does_not_return_groups() {
        let mut root = Group::new();
        root.create_group("g").unwrap();
        root.insert_dataset("d", descriptor()).unwrap();
        assert!(root.dataset("g").is_none());
        assert!(root.group("d").is_none());
        assert_eq!(root.datasets().count(), 1);
        assert_eq!(root.dataset("d").unwrap().compression_ratio(), 4.0);
    }

    #[test]
    fn test_index_serialization() {
        let mut index = ContainerIndex::default();
        index.root.set_attr("num_patients", 1i64);
        index.root.set_attr("patient_shape", vec![128i64, 128, 128]);
        index
            .root
            .create_group("patients")
            .unwrap()
            .insert_dataset("dose", descriptor())
            .unwrap();

        let bytes = index.to_bytes().unwrap();
        let decoded = ContainerIndex::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, index);
    }
}
