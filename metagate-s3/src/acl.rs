//! Bucket access control lists
//!
//! An [`Acl`] holds an optional canned policy plus one optional grant list per
//! permission. Each part is read from its own request header and they are
//! independent of each other: any subset may be present, and explicit grants
//! sit alongside the canned value.
//!
//! Grants are recorded for later use. Authorization currently only compares
//! the requester against the bucket owner.

use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the canned ACL name
pub const CANNED_ACL_HEADER: &str = "x-amz-acl";

/// Permission that an explicit grant header applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Read,
    Write,
    ReadAcp,
    WriteAcp,
    FullControl,
}

impl Permission {
    pub const ALL: [Permission; 5] = [
        Self::Read,
        Self::Write,
        Self::ReadAcp,
        Self::WriteAcp,
        Self::FullControl,
    ];

    /// Request header that carries grants for this permission
    pub fn header_name(&self) -> &'static str {
        match self {
            Self::Read => "x-amz-grant-read",
            Self::Write => "x-amz-grant-write",
            Self::ReadAcp => "x-amz-grant-read-acp",
            Self::WriteAcp => "x-amz-grant-write-acp",
            Self::FullControl => "x-amz-grant-full-control",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_name())
    }
}

/// Grant header value, kept exactly as supplied
/// (e.g. `id="abc", emailAddress="x@example.com"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantList(String);

impl GrantList {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Individual grantees, split on commas
    pub fn grantees(&self) -> impl Iterator<Item = &str> {
        self.0.split(',').map(str::trim).filter(|g| !g.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acl {
    pub canned: Option<String>,
    pub grant_read: Option<GrantList>,
    pub grant_write: Option<GrantList>,
    pub grant_read_acp: Option<GrantList>,
    pub grant_write_acp: Option<GrantList>,
    pub grant_full_control: Option<GrantList>,
}

impl Acl {
    /// Compose an ACL from request headers. Headers that are absent or not
    /// valid UTF-8 leave their slot empty.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut acl = Self {
            canned: header_value(headers, CANNED_ACL_HEADER),
            ..Self::default()
        };

        for permission in Permission::ALL {
            if let Some(value) = header_value(headers, permission.header_name()) {
                *acl.grant_mut(permission) = Some(GrantList::new(value));
            }
        }

        acl
    }

    pub fn grant(&self, permission: Permission) -> Option<&GrantList> {
        match permission {
            Permission::Read => self.grant_read.as_ref(),
            Permission::Write => self.grant_write.as_ref(),
            Permission::ReadAcp => self.grant_read_acp.as_ref(),
            Permission::WriteAcp => self.grant_write_acp.as_ref(),
            Permission::FullControl => self.grant_full_control.as_ref(),
        }
    }

    fn grant_mut(&mut self, permission: Permission) -> &mut Option<GrantList> {
        match permission {
            Permission::Read => &mut self.grant_read,
            Permission::Write => &mut self.grant_write,
            Permission::ReadAcp => &mut self.grant_read_acp,
            Permission::WriteAcp => &mut self.grant_write_acp,
            Permission::FullControl => &mut self.grant_full_control,
        }
    }

    /// Present explicit grants, in permission order
    pub fn grants(&self) -> impl Iterator<Item = (Permission, &GrantList)> {
        Permission::ALL
            .into_iter()
            .filter_map(|permission| self.grant(permission).map(|grant| (permission, grant)))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
