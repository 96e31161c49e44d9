//! Permission model and route-level authorization.
//!
//! A permission is `resource:action:scope`, e.g. `user:read:own`. The scope
//! is checked against the route's `id` parameter: `own` only matches the
//! caller's own id, `others` only a different id, `any` always matches.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};
use crate::models::Authenticatable;

/// Path parameters of the current route, by name.
pub type RouteParams = HashMap<String, String>;

/// Route parameter compared against the caller's id.
pub const TARGET_PARAM: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    User,
    Administrator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Own,
    Others,
    Any,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::User => "user",
            Resource::Administrator => "administrator",
        }
    }
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Own => "own",
            Scope::Others => "others",
            Scope::Any => "any",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission {
    pub resource: Resource,
    pub action: Action,
    pub scope: Scope,
}

impl Permission {
    pub const fn new(resource: Resource, action: Action, scope: Scope) -> Self {
        Self {
            resource,
            action,
            scope,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.resource.as_str(),
            self.action.as_str(),
            self.scope.as_str()
        )
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || AppError::invalid_data(format!("Unknown permission: {}", s));
        let mut parts = s.split(':');

        let resource = match parts.next() {
            Some("user") => Resource::User,
            Some("administrator") => Resource::Administrator,
            _ => return Err(unknown()),
        };
        let action = match parts.next() {
            Some("create") => Action::Create,
            Some("read") => Action::Read,
            Some("update") => Action::Update,
            Some("delete") => Action::Delete,
            _ => return Err(unknown()),
        };
        let scope = match parts.next() {
            Some("own") => Scope::Own,
            Some("others") => Scope::Others,
            Some("any") => Scope::Any,
            _ => return Err(unknown()),
        };
        if parts.next().is_some() {
            return Err(unknown());
        }

        let permission = Permission::new(resource, action, scope);
        if rule_for(&permission).is_none() {
            return Err(unknown());
        }
        Ok(permission)
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub const USER_CREATE_ANY: Permission = Permission::new(Resource::User, Action::Create, Scope::Any);
pub const USER_READ_OWN: Permission = Permission::new(Resource::User, Action::Read, Scope::Own);
pub const USER_READ_OTHERS: Permission = Permission::new(Resource::User, Action::Read, Scope::Others);
pub const USER_READ_ANY: Permission = Permission::new(Resource::User, Action::Read, Scope::Any);
pub const USER_UPDATE_OWN: Permission = Permission::new(Resource::User, Action::Update, Scope::Own);
pub const USER_UPDATE_OTHERS: Permission =
    Permission::new(Resource::User, Action::Update, Scope::Others);
pub const USER_DELETE_OWN: Permission = Permission::new(Resource::User, Action::Delete, Scope::Own);
pub const USER_DELETE_OTHERS: Permission =
    Permission::new(Resource::User, Action::Delete, Scope::Others);

pub const ADMINISTRATOR_CREATE_ANY: Permission =
    Permission::new(Resource::Administrator, Action::Create, Scope::Any);
pub const ADMINISTRATOR_READ_OWN: Permission =
    Permission::new(Resource::Administrator, Action::Read, Scope::Own);
pub const ADMINISTRATOR_READ_OTHERS: Permission =
    Permission::new(Resource::Administrator, Action::Read, Scope::Others);
pub const ADMINISTRATOR_READ_ANY: Permission =
    Permission::new(Resource::Administrator, Action::Read, Scope::Any);
pub const ADMINISTRATOR_UPDATE_OWN: Permission =
    Permission::new(Resource::Administrator, Action::Update, Scope::Own);
pub const ADMINISTRATOR_UPDATE_OTHERS: Permission =
    Permission::new(Resource::Administrator, Action::Update, Scope::Others);
pub const ADMINISTRATOR_DELETE_OWN: Permission =
    Permission::new(Resource::Administrator, Action::Delete, Scope::Own);
pub const ADMINISTRATOR_DELETE_OTHERS: Permission =
    Permission::new(Resource::Administrator, Action::Delete, Scope::Others);

/// Who is asking: the entity id plus its parsed grants.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: ObjectId,
    pub granted: HashSet<Permission>,
}

impl Actor {
    pub fn new(id: ObjectId, granted: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            id,
            granted: granted.into_iter().collect(),
        }
    }

    pub fn from_entity<E: Authenticatable>(entity: &E) -> Result<Self> {
        Ok(Self::new(entity.require_id()?, parse_granted(entity.permissions())))
    }
}

type ScopeCheck = fn(&Actor, &RouteParams) -> bool;

/// Route target as an id. Hex case is not significant, so the comparison
/// runs on the parsed value. Targets that do not parse match no scope.
fn target(params: &RouteParams) -> Option<ObjectId> {
    params
        .get(TARGET_PARAM)
        .and_then(|raw| ObjectId::parse_str(raw).ok())
}

fn own(actor: &Actor, params: &RouteParams) -> bool {
    target(params).is_some_and(|id| id == actor.id)
}

fn others(actor: &Actor, params: &RouteParams) -> bool {
    target(params).is_some_and(|id| id != actor.id)
}

fn any(_: &Actor, _: &RouteParams) -> bool {
    true
}

static POLICY: &[(Permission, ScopeCheck)] = &[
    (USER_CREATE_ANY, any),
    (USER_READ_OWN, own),
    (USER_READ_OTHERS, others),
    (USER_READ_ANY, any),
    (USER_UPDATE_OWN, own),
    (USER_UPDATE_OTHERS, others),
    (USER_DELETE_OWN, own),
    (USER_DELETE_OTHERS, others),
    (ADMINISTRATOR_CREATE_ANY, any),
    (ADMINISTRATOR_READ_OWN, own),
    (ADMINISTRATOR_READ_OTHERS, others),
    (ADMINISTRATOR_READ_ANY, any),
    (ADMINISTRATOR_UPDATE_OWN, own),
    (ADMINISTRATOR_UPDATE_OTHERS, others),
    (ADMINISTRATOR_DELETE_OWN, own),
    (ADMINISTRATOR_DELETE_OTHERS, others),
];

fn rule_for(permission: &Permission) -> Option<ScopeCheck> {
    POLICY
        .iter()
        .find(|(known, _)| known == permission)
        .map(|(_, check)| *check)
}

/// Every known permission string, in table order.
pub fn all_permissions() -> Vec<String> {
    POLICY.iter().map(|(permission, _)| permission.to_string()).collect()
}

/// Parse stored grant strings. Unknown entries are skipped.
pub fn parse_granted(granted: &[String]) -> Vec<Permission> {
    granted
        .iter()
        .filter_map(|raw| match raw.parse() {
            Ok(permission) => Some(permission),
            Err(_) => {
                tracing::warn!(permission = %raw, "ignoring unknown permission grant");
                None
            }
        })
        .collect()
}

/// Check grants supplied when creating an account. Unlike `parse_granted`,
/// an unknown entry is an error here.
pub fn validate_grants(granted: &[String]) -> Result<Vec<String>> {
    granted
        .iter()
        .map(|raw| raw.parse::<Permission>().map(|p| p.to_string()))
        .collect()
}

pub fn default_user_permissions() -> Vec<String> {
    [USER_READ_OWN, USER_UPDATE_OWN, USER_DELETE_OWN]
        .iter()
        .map(Permission::to_string)
        .collect()
}

/// Allowed when some required permission is granted and its scope matches
/// the route. Nothing required means allowed.
pub fn authorize(actor: &Actor, required: &[Permission], params: &RouteParams) -> Result<()> {
    if required.is_empty() {
        return Ok(());
    }

    let allowed = required.iter().any(|permission| {
        actor.granted.contains(permission)
            && rule_for(permission).is_some_and(|check| check(actor, params))
    });

    if allowed {
        Ok(())
    } else {
        let wanted: Vec<String> = required.iter().map(Permission::to_string).collect();
        tracing::info!(actor = %actor.id, required = ?wanted, "permission denied");
        Err(AppError::forbidden(wanted.join(" | ")))
    }
}

/// Static permission list attached to a route through `Authorized<E, P>`.
pub trait RequiredPermissions: Send + Sync + 'static {
    const REQUIRED: &'static [Permission];
}

/// Declare a marker type carrying a fixed permission list.
///
/// ```ignore
/// required_permissions!(pub ReadUser => [USER_READ_OWN, USER_READ_OTHERS]);
/// ```
#[macro_export]
macro_rules! required_permissions {
    ($vis:vis $name:ident => [$($permission:expr),* $(,)?]) => {
        $vis struct $name;

        impl $crate::permissions::RequiredPermissions for $name {
            const REQUIRED: &'static [$crate::permissions::Permission] = &[$($permission),*];
        }
    };
}
