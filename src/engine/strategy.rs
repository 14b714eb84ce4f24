//! Per-kind operation strategies
//!
//! Every single-answer operation shares the same scatter-gather shape.
//! What differs per kind is captured here: how the logical request is
//! rewritten for one target, which result codes count as a positive
//! (authoritative) answer, and what to report when no target is left.

use crate::protocol::{Attribute, ModOp, Modification, Request, ResponseOp, ResultCode};
use crate::rewrite::{NamespaceMapper, RewriteContext, Unwilling};
use crate::target::Target;

/// Outcome of rewriting an operation for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    /// Ready to send in the target's namespace
    Send(Request),
    /// The target has no equivalent for the operation's attribute/value
    Excluded,
}

/// How one operation kind is rewritten and classified
pub trait OperationStrategy: Send + Sync {
    /// Short name for logs
    fn kind(&self) -> &'static str;

    /// Logical name the operation targets
    fn dn(&self) -> &str;

    /// Tag the final response must carry
    fn response_op(&self) -> ResponseOp;

    /// Rewrite the operation for `target`. `Err` aborts the whole operation.
    fn prepare(
        &self,
        target: &Target,
        mapper: &dyn NamespaceMapper,
    ) -> std::result::Result<Prepared, Unwilling>;

    /// Whether `code` is an authoritative answer
    fn is_positive(&self, code: ResultCode) -> bool {
        code == ResultCode::Success
    }

    /// Code reported when no target is left to ask
    fn no_candidate_code(&self) -> ResultCode {
        ResultCode::NoSuchObject
    }
}

fn is_object_class(attribute: &str) -> bool {
    attribute.eq_ignore_ascii_case("objectClass")
}

// ============================================================================
// Logical payload types
// ============================================================================

/// Attribute/value assertion in the logical namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
    pub attribute: String,
    pub value: String,
    /// The attribute has DN syntax, so the value is a name to rewrite
    pub dn_valued: bool,
}

/// Attribute with values in the logical namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalAttribute {
    pub name: String,
    pub values: Vec<String>,
    pub dn_valued: bool,
}

impl LogicalAttribute {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
            dn_valued: false,
        }
    }

    pub fn dn_valued(mut self) -> Self {
        self.dn_valued = true;
        self
    }
}

/// One change of a logical modify
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalModification {
    pub op: ModOp,
    pub attribute: LogicalAttribute,
}

/// Map an attribute and its values for one target.
///
/// Returns `Ok(None)` when the attribute has no equivalent (or, for
/// objectClass, when none of its values do). Unmappable object-class
/// values are dropped individually.
fn map_attribute_values(
    attr: &LogicalAttribute,
    target: &Target,
    mapper: &dyn NamespaceMapper,
    context: RewriteContext,
) -> std::result::Result<Option<Attribute>, Unwilling> {
    if is_object_class(&attr.name) {
        let values: Vec<String> = attr
            .values
            .iter()
            .filter_map(|v| mapper.map_value(target, v))
            .collect();
        if values.is_empty() && !attr.values.is_empty() {
            return Ok(None);
        }
        return Ok(Some(Attribute::new(attr.name.clone(), values)));
    }

    let Some(name) = mapper.map_attribute(target, &attr.name) else {
        return Ok(None);
    };

    let values = if attr.dn_valued {
        attr.values
            .iter()
            .map(|v| mapper.rewrite_name(target, context, v))
            .collect::<std::result::Result<Vec<_>, _>>()?
    } else {
        attr.values.clone()
    };

    Ok(Some(Attribute::new(name, values)))
}

// ============================================================================
// Compare
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareOp {
    pub dn: String,
    pub ava: Ava,
}

impl OperationStrategy for CompareOp {
    fn kind(&self) -> &'static str {
        "compare"
    }

    fn dn(&self) -> &str {
        &self.dn
    }

    fn response_op(&self) -> ResponseOp {
        ResponseOp::Compare
    }

    fn prepare(
        &self,
        target: &Target,
        mapper: &dyn NamespaceMapper,
    ) -> std::result::Result<Prepared, Unwilling> {
        let dn = mapper.rewrite_name(target, RewriteContext::CompareDn, &self.dn)?;

        let (attribute, value) = if is_object_class(&self.ava.attribute) {
            match mapper.map_value(target, &self.ava.value) {
                Some(value) => (self.ava.attribute.clone(), value),
                None => return Ok(Prepared::Excluded),
            }
        } else {
            let Some(attribute) = mapper.map_attribute(target, &self.ava.attribute) else {
                return Ok(Prepared::Excluded);
            };
            let value = if self.ava.dn_valued {
                mapper.rewrite_name(target, RewriteContext::CompareAttrDn, &self.ava.value)?
            } else {
                self.ava.value.clone()
            };
            (attribute, value)
        };

        Ok(Prepared::Send(Request::Compare {
            dn,
            attribute,
            value,
        }))
    }

    fn is_positive(&self, code: ResultCode) -> bool {
        matches!(code, ResultCode::CompareTrue | ResultCode::CompareFalse)
    }

    fn no_candidate_code(&self) -> ResultCode {
        ResultCode::NoSuchAttribute
    }
}

// ============================================================================
// Bind
// ============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct BindOp {
    pub dn: String,
    pub credentials: Vec<u8>,
}

impl std::fmt::Debug for BindOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindOp")
            .field("dn", &self.dn)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

impl OperationStrategy for BindOp {
    fn kind(&self) -> &'static str {
        "bind"
    }

    fn dn(&self) -> &str {
        &self.dn
    }

    fn response_op(&self) -> ResponseOp {
        ResponseOp::Bind
    }

    fn prepare(
        &self,
        target: &Target,
        mapper: &dyn NamespaceMapper,
    ) -> std::result::Result<Prepared, Unwilling> {
        let dn = mapper.rewrite_name(target, RewriteContext::BindDn, &self.dn)?;
        Ok(Prepared::Send(Request::Bind {
            dn,
            credentials: self.credentials.clone(),
        }))
    }
}

// ============================================================================
// Add
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOp {
    pub dn: String,
    pub attributes: Vec<LogicalAttribute>,
}

impl OperationStrategy for AddOp {
    fn kind(&self) -> &'static str {
        "add"
    }

    fn dn(&self) -> &str {
        &self.dn
    }

    fn response_op(&self) -> ResponseOp {
        ResponseOp::Add
    }

    fn prepare(
        &self,
        target: &Target,
        mapper: &dyn NamespaceMapper,
    ) -> std::result::Result<Prepared, Unwilling> {
        let dn = mapper.rewrite_name(target, RewriteContext::AddDn, &self.dn)?;

        let mut attributes = Vec::with_capacity(self.attributes.len());
        for attr in &self.attributes {
            if let Some(mapped) =
                map_attribute_values(attr, target, mapper, RewriteContext::AddAttrDn)?
            {
                attributes.push(mapped);
            }
        }

        Ok(Prepared::Send(Request::Add { dn, attributes }))
    }
}

// ============================================================================
// Delete
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOp {
    pub dn: String,
}

impl OperationStrategy for DeleteOp {
    fn kind(&self) -> &'static str {
        "delete"
    }

    fn dn(&self) -> &str {
        &self.dn
    }

    fn response_op(&self) -> ResponseOp {
        ResponseOp::Delete
    }

    fn prepare(
        &self,
        target: &Target,
        mapper: &dyn NamespaceMapper,
    ) -> std::result::Result<Prepared, Unwilling> {
        let dn = mapper.rewrite_name(target, RewriteContext::DeleteDn, &self.dn)?;
        Ok(Prepared::Send(Request::Delete { dn }))
    }
}

// ============================================================================
// Modify
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyOp {
    pub dn: String,
    pub changes: Vec<LogicalModification>,
}

impl OperationStrategy for ModifyOp {
    fn kind(&self) -> &'static str {
        "modify"
    }

    fn dn(&self) -> &str {
        &self.dn
    }

    fn response_op(&self) -> ResponseOp {
        ResponseOp::Modify
    }

    fn prepare(
        &self,
        target: &Target,
        mapper: &dyn NamespaceMapper,
    ) -> std::result::Result<Prepared, Unwilling> {
        let dn = mapper.rewrite_name(target, RewriteContext::ModifyDn, &self.dn)?;

        let mut changes = Vec::with_capacity(self.changes.len());
        for change in &self.changes {
            if let Some(attribute) =
                map_attribute_values(&change.attribute, target, mapper, RewriteContext::ModifyAttrDn)?
            {
                changes.push(Modification {
                    op: change.op,
                    attribute,
                });
            }
        }

        Ok(Prepared::Send(Request::Modify { dn, changes }))
    }
}

// ============================================================================
// Rename
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOp {
    pub dn: String,
    pub new_rdn: String,
    pub delete_old_rdn: bool,
    pub new_superior: Option<String>,
}

impl OperationStrategy for RenameOp {
    fn kind(&self) -> &'static str {
        "rename"
    }

    fn dn(&self) -> &str {
        &self.dn
    }

    fn response_op(&self) -> ResponseOp {
        ResponseOp::Rename
    }

    fn prepare(
        &self,
        target: &Target,
        mapper: &dyn NamespaceMapper,
    ) -> std::result::Result<Prepared, Unwilling> {
        let dn = mapper.rewrite_name(target, RewriteContext::RenameDn, &self.dn)?;
        let new_superior = self
            .new_superior
            .as_deref()
            .map(|sup| mapper.rewrite_name(target, RewriteContext::NewSuperiorDn, sup))
            .transpose()?;

        Ok(Prepared::Send(Request::Rename {
            dn,
            new_rdn: self.new_rdn.clone(),
            delete_old_rdn: self.delete_old_rdn,
            new_superior,
        }))
    }
}

// ============================================================================
// Operation
// ============================================================================

/// A client operation in the logical namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Bind(BindOp),
    Compare(CompareOp),
    Add(AddOp),
    Delete(DeleteOp),
    Modify(ModifyOp),
    Rename(RenameOp),
}

impl Operation {
    pub fn strategy(&self) -> &dyn OperationStrategy {
        match self {
            Self::Bind(op) => op,
            Self::Compare(op) => op,
            Self::Add(op) => op,
            Self::Delete(op) => op,
            Self::Modify(op) => op,
            Self::Rename(op) => op,
        }
    }

    pub fn compare(dn: impl Into<String>, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Compare(CompareOp {
            dn: dn.into(),
            ava: Ava {
                attribute: attribute.into(),
                value: value.into(),
                dn_valued: false,
            },
        })
    }

    pub fn delete(dn: impl Into<String>) -> Self {
        Self::Delete(DeleteOp { dn: dn.into() })
    }
}
