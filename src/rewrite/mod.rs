//! Namespace mapping between the logical tree and each target
//!
//! The engine only sees the [`NamespaceMapper`] seam. [`MassageMapper`]
//! is the stock implementation driven by each target's [`RewriteMap`]:
//! suffix massage, attribute and object-class renames, and subtrees a
//! target cannot represent at all.
//!
//! [`RewriteMap`]: crate::target::RewriteMap

use std::fmt;

use crate::dn;
use crate::target::Target;

/// Why a name is being rewritten. Each context has a fixed direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewriteContext {
    BindDn,
    CompareDn,
    CompareAttrDn,
    AddDn,
    AddAttrDn,
    DeleteDn,
    ModifyDn,
    ModifyAttrDn,
    RenameDn,
    NewSuperiorDn,
    /// Matched name coming back from a target
    MatchedDn,
}

/// Direction of a rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToTarget,
    FromTarget,
}

impl RewriteContext {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BindDn => "bindDN",
            Self::CompareDn => "compareDN",
            Self::CompareAttrDn => "compareAttrDN",
            Self::AddDn => "addDN",
            Self::AddAttrDn => "addAttrDN",
            Self::DeleteDn => "deleteDN",
            Self::ModifyDn => "modifyDN",
            Self::ModifyAttrDn => "modifyAttrDN",
            Self::RenameDn => "modrDN",
            Self::NewSuperiorDn => "newSuperiorDN",
            Self::MatchedDn => "matchedDN",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::MatchedDn => Direction::FromTarget,
            _ => Direction::ToTarget,
        }
    }
}

impl fmt::Display for RewriteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A name cannot be expressed in a target's namespace
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("target {target} cannot represent {dn:?} ({context})")]
pub struct Unwilling {
    pub target: usize,
    pub context: RewriteContext,
    pub dn: String,
}

/// Translation of names, attributes and values for one target
pub trait NamespaceMapper: Send + Sync {
    /// Rewrite a DN in the direction implied by `context`
    fn rewrite_name(
        &self,
        target: &Target,
        context: RewriteContext,
        dn: &str,
    ) -> std::result::Result<String, Unwilling>;

    /// Target attribute for a logical attribute, `None` if it has no equivalent
    fn map_attribute(&self, target: &Target, attribute: &str) -> Option<String>;

    /// Target object class for a logical object class value, `None` if it has no equivalent
    fn map_value(&self, target: &Target, object_class: &str) -> Option<String>;
}

/// Suffix-massage mapper driven by the registry's rewrite maps
#[derive(Debug, Clone, Copy, Default)]
pub struct MassageMapper;

impl NamespaceMapper for MassageMapper {
    fn rewrite_name(
        &self,
        target: &Target,
        context: RewriteContext,
        name: &str,
    ) -> std::result::Result<String, Unwilling> {
        let rewrite = &target.rewrite;

        match context.direction() {
            Direction::ToTarget => {
                if rewrite.is_unwilling(name) {
                    return Err(Unwilling {
                        target: target.index,
                        context,
                        dn: name.to_string(),
                    });
                }
                Ok(match rewrite.massage_suffix {
                    Some(ref remote) => dn::replace_suffix(name, &target.suffix, remote)
                        .unwrap_or_else(|| name.to_string()),
                    None => name.to_string(),
                })
            }
            Direction::FromTarget => Ok(match rewrite.massage_suffix {
                Some(ref remote) => dn::replace_suffix(name, remote, &target.suffix)
                    .unwrap_or_else(|| name.to_string()),
                None => name.to_string(),
            }),
        }
    }

    fn map_attribute(&self, target: &Target, attribute: &str) -> Option<String> {
        target.rewrite.map_attribute(attribute)
    }

    fn map_value(&self, target: &Target, object_class: &str) -> Option<String> {
        target.rewrite.map_object_class(object_class)
    }
}
