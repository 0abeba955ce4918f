//! Child identifier encoding
//!
//! Every direct child of a `TreeQuota` is registered in the parent's
//! `subQuotas` list as an opaque string identifier. The encoding is part of
//! on-disk compatibility: identifiers written by earlier releases must keep
//! decoding.
//!
//! - tree child:  `"{name}.quota"`
//! - leaf child:  `"{name}.{namespace}.quota"`
//!
//! Names may themselves contain dots, so leaf decoding works from the right:
//! the last segment is the fixed suffix, the second-to-last is the
//! namespace, and everything before that is re-joined as the name.

use crate::{Error, Result};

/// Fixed trailing segment of every child identifier.
pub const ID_SUFFIX: &str = "quota";

/// Encode the identifier of a tree-quota child.
pub fn tree_child_id(name: &str) -> String {
    format!("{name}.{ID_SUFFIX}")
}

/// Encode the identifier of a leaf-quota child.
pub fn leaf_child_id(name: &str, namespace: &str) -> String {
    format!("{name}.{namespace}.{ID_SUFFIX}")
}

/// Decode a leaf child identifier back into `(name, namespace)`.
pub fn decode_leaf_child_id(id: &str) -> Result<(String, String)> {
    let segments: Vec<&str> = id.split('.').collect();
    if segments.len() < 3 {
        return Err(Error::decode(format!(
            "sub quota id {id:?} has fewer than 3 segments"
        )));
    }
    if segments[segments.len() - 1] != ID_SUFFIX {
        return Err(Error::decode(format!(
            "sub quota id {id:?} does not end in {ID_SUFFIX:?}"
        )));
    }
    let namespace = segments[segments.len() - 2].to_string();
    let name = segments[..segments.len() - 2].join(".");
    Ok((name, namespace))
}
