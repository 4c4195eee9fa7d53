//! The chat role permission lattice.

use serde::{Deserialize, Serialize};

use crate::tags::ParseTagError;

/// A member's role within a chat.
///
/// Roles form a total order by privilege: `Owner < Admin < Member <
/// Watcher < Banned`, where a *lower* level means *more* privilege. A
/// caller satisfies a requirement when their own level is less than or
/// equal to the required level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    /// Full access rights, can add and remove admins.
    Owner,
    /// Can change the status of any lower member and update the chat
    /// name, image and custom data.
    Admin,
    /// Standard member, has write access but can't change roles.
    Member,
    /// Read-only access.
    Watcher,
    /// Cannot access the chat, cannot post.
    Banned,
}

/// Privilege level assigned to a missing or unrecognised role. Higher
/// than every real role, so an unknown role satisfies no requirement.
pub(crate) const UNSET_LEVEL: u8 = 5;

impl RoleType {
    /// Returns the privilege level of this role (0 = most privileged).
    pub fn level(self) -> u8 {
        match self {
            Self::Owner => 0,
            Self::Admin => 1,
            Self::Member => 2,
            Self::Watcher => 3,
            Self::Banned => 4,
        }
    }

    /// True when this role meets a requirement of `required` or lower
    /// privilege. Reflexive: every role satisfies itself.
    pub fn satisfies(self, required: RoleType) -> bool {
        self.level() <= required.level()
    }

    /// Returns the canonical wire value for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Watcher => "watcher",
            Self::Banned => "banned",
        }
    }

    /// Returns the display label for this role.
    pub fn label(self) -> &'static str {
        match self {
            Self::Owner => "Owner",
            Self::Admin => "Admin",
            Self::Member => "Member",
            Self::Watcher => "Watcher",
            Self::Banned => "Banned",
        }
    }

    /// All roles, most privileged first.
    pub fn all() -> [RoleType; 5] {
        [
            Self::Owner,
            Self::Admin,
            Self::Member,
            Self::Watcher,
            Self::Banned,
        ]
    }

    /// All roles except the given ones, most privileged first.
    pub fn all_excluding(excluding: &[RoleType]) -> Vec<RoleType> {
        Self::all()
            .into_iter()
            .filter(|r| !excluding.contains(r))
            .collect()
    }
}

impl std::fmt::Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoleType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            "watcher" => Ok(Self::Watcher),
            "banned" => Ok(Self::Banned),
            _ => Err(ParseTagError::new("role", s)),
        }
    }
}

/// Returns the privilege level of an optional role; a missing role is
/// beyond every real level and satisfies no requirement.
pub fn level_of(role: Option<RoleType>) -> u8 {
    role.map_or(UNSET_LEVEL, RoleType::level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_strictly_ordered() {
        let all = RoleType::all();
        for pair in all.windows(2) {
            assert!(pair[0].level() < pair[1].level());
        }
    }

    #[test]
    fn satisfies_is_reflexive() {
        for role in RoleType::all() {
            assert!(role.satisfies(role));
        }
    }

    #[test]
    fn owner_satisfies_everything_banned_satisfies_only_itself() {
        for role in RoleType::all() {
            assert!(RoleType::Owner.satisfies(role));
        }
        assert!(RoleType::Banned.satisfies(RoleType::Banned));
        assert!(!RoleType::Banned.satisfies(RoleType::Watcher));
        assert!(!RoleType::Watcher.satisfies(RoleType::Member));
        assert!(!RoleType::Member.satisfies(RoleType::Admin));
        assert!(!RoleType::Admin.satisfies(RoleType::Owner));
    }

    #[test]
    fn unset_level_is_beyond_banned() {
        assert!(level_of(None) > RoleType::Banned.level());
        assert_eq!(level_of(Some(RoleType::Member)), 2);
    }

    #[test]
    fn all_excluding_drops_the_given_roles() {
        let roles = RoleType::all_excluding(&[RoleType::Owner, RoleType::Admin]);
        assert_eq!(
            roles,
            vec![RoleType::Member, RoleType::Watcher, RoleType::Banned]
        );
    }

    #[test]
    fn wire_round_trip() {
        for role in RoleType::all() {
            assert_eq!(role.as_str().parse::<RoleType>().unwrap(), role);
        }
        assert!("superuser".parse::<RoleType>().is_err());
    }
}
