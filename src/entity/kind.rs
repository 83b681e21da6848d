//! Entity kinds and their default parameterization

use serde::{Deserialize, Serialize};
use std::fmt;

/// How an entity's proxy picks the implementation version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionPolicy {
    /// Always run the factory's newest implementation
    Latest,
    /// Stay on the version current at creation until explicitly upgraded
    Pinned,
}

/// Kind of governed entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    World,
    Company,
    Avatar,
    Experience,
    Registrar,
    FungibleAsset,
    NonFungibleAsset,
    Portal,
}

impl EntityKind {
    pub const ALL: [EntityKind; 8] = [
        EntityKind::World,
        EntityKind::Company,
        EntityKind::Avatar,
        EntityKind::Experience,
        EntityKind::Registrar,
        EntityKind::FungibleAsset,
        EntityKind::NonFungibleAsset,
        EntityKind::Portal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::World => "world",
            EntityKind::Company => "company",
            EntityKind::Avatar => "avatar",
            EntityKind::Experience => "experience",
            EntityKind::Registrar => "registrar",
            EntityKind::FungibleAsset => "erc20-asset",
            EntityKind::NonFungibleAsset => "erc721-asset",
            EntityKind::Portal => "portal",
        }
    }

    /// Assets pin their version; everything else follows the latest code
    pub fn default_version_policy(&self) -> VersionPolicy {
        match self {
            EntityKind::FungibleAsset | EntityKind::NonFungibleAsset => VersionPolicy::Pinned,
            _ => VersionPolicy::Latest,
        }
    }

    /// Kinds that claim a spatial coordinate
    pub fn is_vector_addressed(&self) -> bool {
        matches!(
            self,
            EntityKind::World | EntityKind::Company | EntityKind::Experience
        )
    }

    /// Kind whose active entities register entities of this kind
    pub fn upstream(&self) -> Option<EntityKind> {
        match self {
            EntityKind::Company => Some(EntityKind::World),
            EntityKind::Experience => Some(EntityKind::Company),
            EntityKind::Portal => Some(EntityKind::Experience),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
