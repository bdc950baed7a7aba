use crate::error::ProtectionError;
use crate::host::{Players, PERMISSION_ADMIN};
use crate::prelude::*;
use crate::registry::ContainerRecord;

/// A land-protection integration (claims, regions, ...).
pub trait ProtectionChecker {
    fn can_build(&self, player: PlayerId, pos: &BlockPos) -> Result<bool, ProtectionError>;
}

/// Who may touch a death chest, and where one may be built.
pub struct AccessPolicy<'a> {
    pub protection: Option<&'a dyn ProtectionChecker>,
}
impl AccessPolicy<'_> {
    pub fn can_access(&self, players: &dyn Players, player: PlayerId, record: &ContainerRecord) -> bool {
        player == record.owner || players.has_permission(player, PERMISSION_ADMIN)
    }

    /// Fails open: a missing or broken protection integration never blocks a chest.
    pub fn can_build_at(&self, player: PlayerId, pos: &BlockPos) -> bool {
        let Some(protection) = self.protection else {
            return true;
        };
        match protection.can_build(player, pos) {
            Ok(allowed) => allowed,
            Err(e) => {
                log::warn!("{e}; allowing {player} to build at {pos}");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Roster;

    const A: PlayerId = PlayerId::from_u128(0xA);
    const B: PlayerId = PlayerId::from_u128(0xB);

    struct Claims(Result<bool, &'static str>);
    impl ProtectionChecker for Claims {
        fn can_build(&self, _: PlayerId, _: &BlockPos) -> Result<bool, ProtectionError> {
            self.0.map_err(|e| ProtectionError(e.into()))
        }
    }

    fn record(owner: PlayerId) -> ContainerRecord {
        ContainerRecord::new(owner, 0, 0, 0)
    }

    #[test]
    fn owner_and_admins_can_access() {
        let mut players = Roster::new();
        let policy = AccessPolicy { protection: None };
        let chest = record(A);
        assert!(policy.can_access(&players, A, &chest));
        assert!(!policy.can_access(&players, B, &chest));
        players.grant(B, PERMISSION_ADMIN);
        assert!(policy.can_access(&players, B, &chest));
    }

    #[test]
    fn building_follows_protection() {
        let pos = BlockPos::new("world", 0, 64, 0);
        assert!(AccessPolicy { protection: None }.can_build_at(A, &pos));
        assert!(AccessPolicy { protection: Some(&Claims(Ok(true))) }.can_build_at(A, &pos));
        assert!(!AccessPolicy { protection: Some(&Claims(Ok(false))) }.can_build_at(A, &pos));
    }

    #[test]
    fn broken_protection_permits() {
        let pos = BlockPos::new("world", 0, 64, 0);
        assert!(AccessPolicy { protection: Some(&Claims(Err("plugin offline"))) }.can_build_at(A, &pos));
    }
}
