use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "requests.create").
/// A special wildcard permission `"*"` can be used by policy layers to indicate
/// "allow all" without hardcoding domain permissions into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ALL: Permission = Permission(Cow::Borrowed("*"));
    pub const GOODS_READ: Permission = Permission(Cow::Borrowed("goods.read"));
    pub const GOODS_MANAGE: Permission = Permission(Cow::Borrowed("goods.manage"));
    pub const REQUESTS_CREATE: Permission = Permission(Cow::Borrowed("requests.create"));
    pub const REQUESTS_VERIFY: Permission = Permission(Cow::Borrowed("requests.verify"));
    pub const REQUESTS_READ_OWN: Permission = Permission(Cow::Borrowed("requests.read.own"));
    pub const REQUESTS_READ_ALL: Permission = Permission(Cow::Borrowed("requests.read.all"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
