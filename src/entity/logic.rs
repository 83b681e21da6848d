//! Entity implementation code and its execution context
//!
//! Implementations never own state. Every call runs against the storage of
//! the proxy that received it, with the original caller and value preserved,
//! which is what makes an implementation swap invisible to proxy storage.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::crypto::Address;
use crate::error::{EntityError, Result};
use crate::extensions::Selector;

/// Whether a function may write entity storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutability {
    View,
    Mutating,
}

/// Function an implementation or extension exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub selector: Selector,
    pub mutability: Mutability,
}

impl FunctionSpec {
    pub fn new(selector: Selector, mutability: Mutability) -> Self {
        Self {
            selector,
            mutability,
        }
    }

    /// Function entry for a canonical signature such as `setMetadata(string,bytes)`
    pub fn from_signature(signature: &str, mutability: Mutability) -> Self {
        Self::new(Selector::from_signature(signature), mutability)
    }
}

/// Persistent key/value storage owned by one proxy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyStorage {
    slots: BTreeMap<String, Vec<u8>>,
}

impl ProxyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.slots.get(key).map(Vec::as_slice)
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.slots.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.slots.remove(key)
    }

    /// Decode a bincode value
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.slots.get(key) {
            Some(bytes) => bincode::deserialize(bytes)
                .map(Some)
                .map_err(|e| EntityError::execution(format!("corrupt slot '{}': {}", key, e))),
            None => Ok(None),
        }
    }

    /// Store a bincode value
    pub fn put_value<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let key = key.into();
        let bytes = bincode::serialize(value)
            .map_err(|e| EntityError::execution(format!("encode slot '{}': {}", key, e)))?;
        self.slots.insert(key, bytes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Delegated execution context
pub struct CallContext<'a> {
    /// Proxy whose storage is being executed against
    pub entity: Address,
    /// Original external caller
    pub caller: Address,
    /// Current owner of the entity
    pub owner: Address,
    /// Value sent with the call
    pub value: u128,
    /// Substrate timestamp
    pub now: u64,
    pub storage: &'a mut ProxyStorage,
}

/// External call to an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub caller: Address,
    pub value: u128,
    pub selector: Selector,
    pub input: Vec<u8>,
}

impl CallRequest {
    pub fn new(caller: Address, selector: Selector, input: Vec<u8>) -> Self {
        Self {
            caller,
            value: 0,
            selector,
            input,
        }
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

/// Parameters handed to an implementation when its proxy is created
#[derive(Debug, Clone, Copy)]
pub struct EntityInit<'a> {
    pub name: &'a str,
    pub owner: Address,
    pub data: &'a [u8],
}

/// Entity implementation code
pub trait EntityLogic: Send + Sync {
    /// Functions implemented natively
    fn functions(&self) -> Vec<FunctionSpec>;

    /// Set up storage for a freshly created proxy
    fn initialize(&self, ctx: &mut CallContext<'_>, init: EntityInit<'_>) -> Result<()>;

    /// Adapt storage when a pinned entity upgrades onto this implementation
    fn migrate(&self, _ctx: &mut CallContext<'_>, _init_data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn execute(
        &self,
        ctx: &mut CallContext<'_>,
        selector: Selector,
        input: &[u8],
    ) -> Result<Vec<u8>>;
}

/// Implementation code at a known address
#[derive(Clone)]
pub struct Implementation {
    address: Address,
    logic: Arc<dyn EntityLogic>,
}

impl Implementation {
    pub fn new(address: Address, logic: Arc<dyn EntityLogic>) -> Result<Self> {
        if address.is_zero() {
            return Err(EntityError::ZeroAddress("implementation"));
        }
        Ok(Self { address, logic })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn logic(&self) -> &Arc<dyn EntityLogic> {
        &self.logic
    }

    /// Mutability of a native function, if implemented
    pub fn native_function(&self, selector: Selector) -> Option<Mutability> {
        self.logic
            .functions()
            .into_iter()
            .find(|f| f.selector == selector)
            .map(|f| f.mutability)
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_typed_values() {
        let mut storage = ProxyStorage::new();
        storage.put_value("count", &42u64).unwrap();
        assert_eq!(storage.get_value::<u64>("count").unwrap(), Some(42));
        assert_eq!(storage.get_value::<u64>("missing").unwrap(), None);

        storage.put("raw", vec![1]);
        assert!(storage.get_value::<u64>("raw").is_err());
        assert_eq!(storage.remove("raw"), Some(vec![1]));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_call_request_value() {
        let request = CallRequest::new(Address([1u8; 20]), Selector::new([1; 4]), vec![]).with_value(7);
        assert_eq!(request.value, 7);
    }
}
