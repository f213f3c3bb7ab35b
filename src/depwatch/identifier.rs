//! # Object Identifier
//!
//! Identifies a single Kubernetes object, or a set of objects when a label
//! selector is present. Used both as a watch registration key and as the
//! payload handed to a reconciler.

use kube::core::GroupVersionKind;
use std::fmt;

/// Label selector that matches every object (the string form of "everything")
pub const SELECT_ALL: &str = "";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentifier {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Empty means all namespaces (or a cluster-scoped object)
    pub namespace: String,
    /// Empty means any name
    pub name: String,
    /// Present when the identifier stands for a set of objects
    pub selector: Option<String>,
}

impl ObjectIdentifier {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            selector: None,
        }
    }

    /// Turn the identifier into a set watch filtered by `selector`
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    #[must_use]
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    /// `apiVersion` as it appears in manifests (`v1` for the core group)
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    #[must_use]
    pub fn matches_gvk(&self, gvk: &GroupVersionKind) -> bool {
        self.group == gvk.group && self.version == gvk.version && self.kind == gvk.kind
    }

    /// True when the identifier names one object rather than a selector-based set
    #[must_use]
    pub fn is_single_object(&self) -> bool {
        self.selector.is_none() && !self.name.is_empty()
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.api_version(), self.kind)?;
        match (self.namespace.is_empty(), self.name.is_empty()) {
            (true, true) => write!(f, " *")?,
            (true, false) => write!(f, " {}", self.name)?,
            (false, true) => write!(f, " {}/*", self.namespace)?,
            (false, false) => write!(f, " {}/{}", self.namespace, self.name)?,
        }
        if let Some(selector) = &self.selector {
            write!(f, " (selector: {selector:?})")?;
        }
        Ok(())
    }
}
