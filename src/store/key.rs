//! # Resource Keys
//!
//! `ResourceKey` identifies any object in the store by group, version, kind,
//! namespace and name. It is the tracker's lookup key and the key the
//! in-memory store indexes objects by.

use kube::core::{DynamicObject, GroupVersionKind, TypeMeta};
use kube::Resource;
use std::fmt;

/// (group, version, kind, namespace, name)
///
/// `namespace` is empty for cluster-scoped objects. `group` is empty for the
/// core API group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(gvk: &GroupVersionKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a statically typed kind
    pub fn of<K>(namespace: impl Into<String>, name: impl Into<String>) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self::new(&gvk_of::<K>(), namespace, name)
    }

    /// Key for a typed object; `None` when the object has no name yet
    pub fn for_object<K>(obj: &K) -> Option<Self>
    where
        K: Resource<DynamicType = ()>,
    {
        let meta = obj.meta();
        let name = meta.name.clone()?;
        Some(Self::of::<K>(meta.namespace.clone().unwrap_or_default(), name))
    }

    /// Key for a dynamic object; requires both type information and a name
    pub fn for_dynamic(obj: &DynamicObject) -> Option<Self> {
        let gvk = gvk_of_type_meta(obj.types.as_ref()?);
        let name = obj.metadata.name.clone()?;
        Some(Self::new(
            &gvk,
            obj.metadata.namespace.clone().unwrap_or_default(),
            name,
        ))
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    pub fn api_version(&self) -> String {
        api_version(&self.group, &self.version)
    }

    /// True when both keys name the same kind
    pub fn is_kind(&self, gvk: &GroupVersionKind) -> bool {
        self.group == gvk.group && self.version == gvk.version && self.kind == gvk.kind
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)?;
        } else {
            write!(f, "{}.{}", self.kind, self.group)?;
        }
        if self.namespace.is_empty() {
            write!(f, " {}", self.name)
        } else {
            write!(f, " {}/{}", self.namespace, self.name)
        }
    }
}

pub fn gvk_of<K>() -> GroupVersionKind
where
    K: Resource<DynamicType = ()>,
{
    GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

/// Parse `apiVersion` + `kind` into a GVK. The core group has no slash.
pub fn gvk_of_type_meta(types: &TypeMeta) -> GroupVersionKind {
    let (group, version) = types
        .api_version
        .split_once('/')
        .unwrap_or(("", types.api_version.as_str()));
    GroupVersionKind::gvk(group, version, &types.kind)
}

pub fn type_meta_of(gvk: &GroupVersionKind) -> TypeMeta {
    TypeMeta {
        api_version: api_version(&gvk.group, &gvk.version),
        kind: gvk.kind.clone(),
    }
}

fn api_version(group: &str, version: &str) -> String {
    if group.is_empty() {
        version.to_owned()
    } else {
        format!("{group}/{version}")
    }
}
