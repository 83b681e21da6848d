//! Reference entity implementation: a named metadata store
//!
//! Inputs and outputs are bincode-encoded. `setMetadata` is restricted to
//! the entity's current owner.

use serde::de::DeserializeOwned;

use super::logic::{CallContext, EntityInit, EntityLogic, FunctionSpec, Mutability};
use crate::error::{EntityError, Result};
use crate::extensions::Selector;

const NAME_SLOT: &str = "name";
const VERSION_SLOT: &str = "version";
const METADATA_PREFIX: &str = "metadata/";

/// Metadata store tagged with the version it was published as
#[derive(Debug, Clone, Copy)]
pub struct MetadataLogic {
    version: u64,
}

impl MetadataLogic {
    pub fn new(version: u64) -> Self {
        Self { version }
    }

    pub fn name_selector() -> Selector {
        Selector::from_signature("name()")
    }

    pub fn version_selector() -> Selector {
        Selector::from_signature("version()")
    }

    pub fn set_metadata_selector() -> Selector {
        Selector::from_signature("setMetadata(string,bytes)")
    }

    pub fn get_metadata_selector() -> Selector {
        Selector::from_signature("getMetadata(string)")
    }
}

fn decode<T: DeserializeOwned>(input: &[u8]) -> Result<T> {
    bincode::deserialize(input).map_err(|e| EntityError::execution(format!("bad input: {}", e)))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| EntityError::execution(format!("encode output: {}", e)))
}

impl EntityLogic for MetadataLogic {
    fn functions(&self) -> Vec<FunctionSpec> {
        vec![
            FunctionSpec::new(Self::name_selector(), Mutability::View),
            FunctionSpec::new(Self::version_selector(), Mutability::View),
            FunctionSpec::new(Self::set_metadata_selector(), Mutability::Mutating),
            FunctionSpec::new(Self::get_metadata_selector(), Mutability::View),
        ]
    }

    fn initialize(&self, ctx: &mut CallContext<'_>, init: EntityInit<'_>) -> Result<()> {
        ctx.storage.put_value(NAME_SLOT, &init.name.to_string())?;
        ctx.storage.put_value(VERSION_SLOT, &self.version)
    }

    fn migrate(&self, ctx: &mut CallContext<'_>, _init_data: &[u8]) -> Result<()> {
        ctx.storage.put_value(VERSION_SLOT, &self.version)
    }

    fn execute(
        &self,
        ctx: &mut CallContext<'_>,
        selector: Selector,
        input: &[u8],
    ) -> Result<Vec<u8>> {
        if selector == Self::name_selector() {
            let name: String = ctx.storage.get_value(NAME_SLOT)?.unwrap_or_default();
            encode(&name)
        } else if selector == Self::version_selector() {
            // code version, not the one recorded at initialization
            encode(&self.version)
        } else if selector == Self::set_metadata_selector() {
            if ctx.caller != ctx.owner {
                return Err(EntityError::execution("only the owner may set metadata"));
            }
            let (key, value): (String, Vec<u8>) = decode(input)?;
            ctx.storage.put(format!("{}{}", METADATA_PREFIX, key), value);
            Ok(Vec::new())
        } else if selector == Self::get_metadata_selector() {
            let key: String = decode(input)?;
            let value = ctx
                .storage
                .get(&format!("{}{}", METADATA_PREFIX, key))
                .map(<[u8]>::to_vec);
            encode(&value)
        } else {
            Err(EntityError::UnsupportedOperation(selector))
        }
    }
}
