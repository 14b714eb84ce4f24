//! Decoded directory-protocol objects
//!
//! The engine works above the wire codec. Everything here is an already
//! decoded request or response; the only wire-adjacent contract is the
//! per-connection message id used to correlate a reply with its request.

use std::fmt;

/// Correlation handle assigned by a transport handle to each dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MsgId(pub i32);

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directory result codes the gateway reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    OperationsError,
    ProtocolError,
    TimeLimitExceeded,
    SizeLimitExceeded,
    CompareFalse,
    CompareTrue,
    NoSuchAttribute,
    NoSuchObject,
    InvalidCredentials,
    InsufficientAccessRights,
    Busy,
    Unavailable,
    UnwillingToPerform,
    EntryAlreadyExists,
    Other,
    Cancelled,
    Referral,
    /// Any code the gateway has no special handling for
    Unknown(u32),
}

impl ResultCode {
    /// Numeric code as carried on the wire
    pub fn code(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::OperationsError => 1,
            Self::ProtocolError => 2,
            Self::TimeLimitExceeded => 3,
            Self::SizeLimitExceeded => 4,
            Self::CompareFalse => 5,
            Self::CompareTrue => 6,
            Self::Referral => 10,
            Self::NoSuchAttribute => 16,
            Self::NoSuchObject => 32,
            Self::InvalidCredentials => 49,
            Self::InsufficientAccessRights => 50,
            Self::Busy => 51,
            Self::Unavailable => 52,
            Self::UnwillingToPerform => 53,
            Self::EntryAlreadyExists => 68,
            Self::Other => 80,
            Self::Cancelled => 118,
            Self::Unknown(code) => code,
        }
    }

    /// Decode a numeric result code
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::OperationsError,
            2 => Self::ProtocolError,
            3 => Self::TimeLimitExceeded,
            4 => Self::SizeLimitExceeded,
            5 => Self::CompareFalse,
            6 => Self::CompareTrue,
            10 => Self::Referral,
            16 => Self::NoSuchAttribute,
            32 => Self::NoSuchObject,
            49 => Self::InvalidCredentials,
            50 => Self::InsufficientAccessRights,
            51 => Self::Busy,
            52 => Self::Unavailable,
            53 => Self::UnwillingToPerform,
            68 => Self::EntryAlreadyExists,
            80 => Self::Other,
            118 => Self::Cancelled,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown({})", code),
            other => write!(f, "{:?}({})", other, other.code()),
        }
    }
}

/// Result component of a final response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResult {
    pub code: ResultCode,
    /// Matched portion of the requested name, empty when absent
    pub matched_dn: String,
    /// Diagnostic message, empty when absent
    pub diagnostic: String,
}

impl LdapResult {
    pub fn new(code: ResultCode) -> Self {
        Self {
            code,
            matched_dn: String::new(),
            diagnostic: String::new(),
        }
    }

    pub fn with_matched(mut self, matched_dn: impl Into<String>) -> Self {
        self.matched_dn = matched_dn.into();
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = diagnostic.into();
        self
    }
}

/// Protocol tag of a final response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseOp {
    Bind,
    Compare,
    Add,
    Delete,
    Modify,
    Rename,
}

/// Attribute with its values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Delete,
    Replace,
}

/// One change of a modify request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub op: ModOp,
    pub attribute: Attribute,
}

/// A request as sent to one target, already in that target's namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Bind {
        dn: String,
        credentials: Vec<u8>,
    },
    Compare {
        dn: String,
        attribute: String,
        value: String,
    },
    Add {
        dn: String,
        attributes: Vec<Attribute>,
    },
    Delete {
        dn: String,
    },
    Modify {
        dn: String,
        changes: Vec<Modification>,
    },
    Rename {
        dn: String,
        new_rdn: String,
        delete_old_rdn: bool,
        new_superior: Option<String>,
    },
}

impl Request {
    /// Name of the entry the request targets
    pub fn dn(&self) -> &str {
        match self {
            Self::Bind { dn, .. }
            | Self::Compare { dn, .. }
            | Self::Add { dn, .. }
            | Self::Delete { dn }
            | Self::Modify { dn, .. }
            | Self::Rename { dn, .. } => dn,
        }
    }

    /// Tag the final response to this request must carry
    pub fn response_op(&self) -> ResponseOp {
        match self {
            Self::Bind { .. } => ResponseOp::Bind,
            Self::Compare { .. } => ResponseOp::Compare,
            Self::Add { .. } => ResponseOp::Add,
            Self::Delete { .. } => ResponseOp::Delete,
            Self::Modify { .. } => ResponseOp::Modify,
            Self::Rename { .. } => ResponseOp::Rename,
        }
    }
}

/// A message received for a dispatched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Partial message that does not terminate the request
    Intermediate { name: Option<String> },
    /// Final result of the request
    Final { op: ResponseOp, result: LdapResult },
}

impl Reply {
    pub fn final_result(op: ResponseOp, result: LdapResult) -> Self {
        Self::Final { op, result }
    }
}
