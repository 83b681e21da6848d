//! Entity registry: source of truth and authorization for one entity kind
//!
//! The registry validates every registration (name uniqueness, vector
//! attestation, signed terms, fee), then asks its bound factory for a proxy
//! and records the result. Records are never deleted; removal only moves the
//! lifecycle status forward.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::factory::{CreationRequest, EntityFactory};
use super::kind::{EntityKind, VersionPolicy};
use super::lifecycle::{
    self, effective_status, is_reusable, EntityStatus, NameReusePolicy, RemovalReceipt,
};
use super::logic::Implementation;
use super::proxy::EntityProxy;
use super::record::EntityRecord;
use crate::access::{AccessControl, AdminSet};
use crate::clock::Clock;
use crate::crypto::{Address, Hash};
use crate::error::{EntityError, Result};
use crate::events::{Event, EventLog};
use crate::vector::{derive_key, RegistrationTerms, SignedTerms, VectorAddress, VectorAttestation};
use crate::{DEFAULT_GRACE_PERIOD_DAYS, MAX_NAME_LENGTH, SECONDS_PER_DAY};

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Entity kind this registry governs
    pub kind: EntityKind,
    pub version_policy: VersionPolicy,
    pub name_reuse: NameReusePolicy,
    /// Registrations must carry a vector attestation
    pub vector_addressed: bool,
    /// Signer of vector attestations
    pub vector_authority: Option<Address>,
    /// Fixed terms signer; when unset, terms must be signed by the
    /// registry's main admin. Setting it also makes terms mandatory.
    pub terms_signer: Option<Address>,
    /// Grace period applied when a registration carries no terms
    pub default_grace_period_days: u64,
    /// Only admins may register (ignored when bound to an upstream registry)
    pub admin_only_registration: bool,
    pub max_name_length: usize,
}

impl RegistryConfig {
    /// Defaults for an entity kind
    pub fn for_kind(kind: EntityKind) -> Self {
        Self {
            kind,
            version_policy: kind.default_version_policy(),
            name_reuse: NameReusePolicy::Immediate,
            vector_addressed: kind.is_vector_addressed(),
            vector_authority: None,
            terms_signer: None,
            default_grace_period_days: DEFAULT_GRACE_PERIOD_DAYS,
            admin_only_registration: false,
            max_name_length: MAX_NAME_LENGTH,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::for_kind(EntityKind::World)
    }
}

/// A registration as submitted by its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub owner: Address,
    pub name: String,
    pub init_data: Vec<u8>,
    pub vector: Option<VectorAttestation>,
    pub terms: Option<SignedTerms>,
    /// Value sent along to cover the terms fee
    pub payment: u128,
}

impl RegistrationRequest {
    pub fn new(owner: Address, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
            init_data: Vec::new(),
            vector: None,
            terms: None,
            payment: 0,
        }
    }

    pub fn with_init_data(mut self, init_data: Vec<u8>) -> Self {
        self.init_data = init_data;
        self
    }

    pub fn with_vector(mut self, attestation: VectorAttestation) -> Self {
        self.vector = Some(attestation);
        self
    }

    pub fn with_terms(mut self, terms: SignedTerms, payment: u128) -> Self {
        self.terms = Some(terms);
        self.payment = payment;
        self
    }
}

#[derive(Default)]
struct RegistryState {
    records: HashMap<Address, EntityRecord>,
    proxies: HashMap<Address, Arc<EntityProxy>>,
    /// Lowercased name -> most recent entity to claim it
    names: HashMap<String, Address>,
    vectors: HashMap<Hash, Address>,
    fees_collected: u128,
}

/// Registry for one entity kind
///
/// Time-driven transitions (coverage running out, grace ending) are applied
/// lazily on every read, but `EntityLapsed` / `EntityRemoved` are only
/// emitted once [`EntityRegistry::sync_lifecycle`] or
/// [`EntityRegistry::sync_all`] persists them. Event consumers need something
/// driving `sync_all` periodically.
pub struct EntityRegistry {
    address: Address,
    config: RegistryConfig,
    access: AccessControl,
    factory: RwLock<Option<Arc<EntityFactory>>>,
    upstream: Option<Arc<EntityRegistry>>,
    state: RwLock<RegistryState>,
    self_ref: Weak<EntityRegistry>,
    events: Arc<EventLog>,
    clock: Arc<dyn Clock>,
}

impl EntityRegistry {
    /// Create a registry
    ///
    /// `upstream` is the registry whose active entities are the only callers
    /// allowed to register here.
    pub fn new(
        address: Address,
        config: RegistryConfig,
        admins: AdminSet,
        upstream: Option<Arc<EntityRegistry>>,
        events: Arc<EventLog>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>> {
        if address.is_zero() {
            return Err(EntityError::ZeroAddress("registry"));
        }
        if config.vector_addressed && config.vector_authority.map_or(true, |a| a.is_zero()) {
            return Err(EntityError::ZeroAddress("vector authority"));
        }
        if config.terms_signer.map_or(false, |s| s.is_zero()) {
            return Err(EntityError::ZeroAddress("terms signer"));
        }

        info!("{} registry created at {}", config.kind, address);
        Ok(Arc::new_cyclic(|self_ref| Self {
            address,
            access: AccessControl::new(address, admins, events.clone(), clock.clone()),
            config,
            factory: RwLock::new(None),
            upstream,
            state: RwLock::new(RegistryState::default()),
            self_ref: self_ref.clone(),
            events,
            clock,
        }))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn kind(&self) -> EntityKind {
        self.config.kind
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn factory(&self) -> Option<Arc<EntityFactory>> {
        self.factory.read().clone()
    }

    pub fn upstream(&self) -> Option<&Arc<EntityRegistry>> {
        self.upstream.as_ref()
    }

    /// Attach the factory this registry mints through
    pub fn set_factory(&self, caller: Address, factory: Arc<EntityFactory>) -> Result<()> {
        self.access.require_admin(caller)?;
        let mut slot = self.factory.write();
        if let Some(existing) = slot.as_ref() {
            return Err(EntityError::AlreadyBound(existing.address()));
        }
        info!("{} registry: factory {}", self.config.kind, factory.address());
        *slot = Some(factory);
        Ok(())
    }

    fn bound_factory(&self) -> Result<Arc<EntityFactory>> {
        self.factory().ok_or(EntityError::NotBound)
    }

    fn require_registrar(&self, caller: Address) -> Result<()> {
        if let Some(upstream) = &self.upstream {
            if !upstream.is_active_entity(&caller) {
                warn!(
                    "{} registry: {} is not an active {}",
                    self.config.kind,
                    caller,
                    upstream.kind()
                );
                return Err(EntityError::unauthorized(caller, "active upstream entity"));
            }
            return Ok(());
        }
        if self.config.admin_only_registration {
            self.access.require_admin(caller)?;
        }
        Ok(())
    }

    fn validate_name(&self, name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed.len() != name.len()
            || name.chars().count() > self.config.max_name_length
            || name.chars().any(char::is_control)
        {
            return Err(EntityError::InvalidName(name.to_string()));
        }
        Ok(name.to_lowercase())
    }

    /// Signer terms must recover to
    fn terms_signer(&self) -> Address {
        self.config
            .terms_signer
            .unwrap_or_else(|| self.access.main_admin())
    }

    fn check_terms(&self, terms: &SignedTerms, owner: Address, payment: u128, now: u64) -> Result<()> {
        if terms.owner != owner {
            return Err(EntityError::unauthorized(terms.owner, "entity owner"));
        }
        terms.check(now, &self.terms_signer())?;
        if payment < terms.terms.fee {
            return Err(EntityError::InsufficientFee {
                required: terms.terms.fee,
                paid: payment,
            });
        }
        Ok(())
    }

    /// Register a new entity and create its proxy
    ///
    /// `caller` is the registrar: the party the vector attestation was
    /// issued to and, for downstream kinds, an active upstream entity.
    pub fn register(&self, caller: Address, request: RegistrationRequest) -> Result<Address> {
        self.require_registrar(caller)?;
        if request.owner.is_zero() {
            return Err(EntityError::ZeroAddress("owner"));
        }
        let name_key = self.validate_name(&request.name)?;
        let now = self.clock.now();

        match (&request.terms, self.config.terms_signer) {
            (Some(terms), _) => self.check_terms(terms, request.owner, request.payment, now)?,
            (None, Some(_)) => return Err(EntityError::MissingTerms),
            (None, None) => {}
        }

        let vector_key = match (&request.vector, self.config.vector_addressed) {
            (Some(attestation), true) => {
                let authority = self
                    .config
                    .vector_authority
                    .ok_or(EntityError::ZeroAddress("vector authority"))?;
                Some(attestation.check(&caller, &authority)?)
            }
            (None, true) => {
                return Err(EntityError::InvalidVector(format!(
                    "{} registrations require a vector address",
                    self.config.kind
                )))
            }
            (Some(attestation), false) => {
                return Err(EntityError::InvalidVector(format!(
                    "{} registry is not vector-addressed, got {}",
                    self.config.kind, attestation.vector
                )))
            }
            (None, false) => None,
        };

        let factory = self.bound_factory()?;
        let mut state = self.state.write();

        if let Some(existing) = state.names.get(&name_key) {
            let taken = state
                .records
                .get(existing)
                .map_or(false, |record| !is_reusable(record, now, self.config.name_reuse));
            if taken {
                return Err(EntityError::DuplicateName(request.name));
            }
        }
        if let Some(key) = &vector_key {
            if let Some(existing) = state.vectors.get(key) {
                let taken = state
                    .records
                    .get(existing)
                    .map_or(false, |record| !is_reusable(record, now, self.config.name_reuse));
                if taken {
                    return Err(EntityError::VectorCollision(key.to_hex()));
                }
            }
        }

        let proxy = factory.create_entity(
            self.address,
            self.self_ref.clone(),
            CreationRequest {
                owner: request.owner,
                name: &request.name,
                init_data: &request.init_data,
                version_policy: self.config.version_policy,
            },
        )?;
        let address = proxy.address();

        let mut record = EntityRecord::new(
            address,
            request.name.clone(),
            request.owner,
            proxy.implementation_version(),
            now,
        );
        match &request.terms {
            Some(signed) => {
                record.terms = Some(signed.terms);
                record.expires_at = signed.terms.expires_at(now);
                record.grace_period_secs = signed.terms.grace_seconds();
            }
            None => {
                record.grace_period_secs =
                    self.config.default_grace_period_days.saturating_mul(SECONDS_PER_DAY);
            }
        }
        record.vector = request.vector.as_ref().map(|a| a.vector.clone());
        record.vector_key = vector_key;
        record.fee_paid = request.payment;

        state.names.insert(name_key, address);
        if let Some(key) = vector_key {
            state.vectors.insert(key, address);
        }
        state.fees_collected = state.fees_collected.saturating_add(request.payment);
        state.records.insert(address, record);
        state.proxies.insert(address, proxy);

        info!(
            "{} '{}' registered at {} for {}",
            self.config.kind, request.name, address, request.owner
        );
        self.events.emit(
            self.address,
            now,
            Event::EntityRegistered {
                entity: address,
                name: request.name,
                owner: request.owner,
                vector: request.vector.map(|a| a.vector),
            },
        );
        Ok(address)
    }

    fn status_at(&self, address: &Address, now: u64) -> Option<EntityStatus> {
        self.state
            .read()
            .records
            .get(address)
            .map(|record| effective_status(record, now))
    }

    /// Known and not yet removed
    pub fn is_entity(&self, address: &Address) -> bool {
        self.status_at(address, self.clock.now())
            .map_or(false, |status| status.is_resolvable())
    }

    pub fn is_active_entity(&self, address: &Address) -> bool {
        self.status_at(address, self.clock.now())
            .map_or(false, |status| status.is_active())
    }

    /// Current lifecycle status, time-driven transitions included
    pub fn status(&self, address: &Address) -> Result<EntityStatus> {
        self.status_at(address, self.clock.now())
            .ok_or(EntityError::NotFound {
                what: "entity",
                address: *address,
            })
    }

    /// Record snapshot with its status and implementation version brought up to date
    pub fn record(&self, address: &Address) -> Option<EntityRecord> {
        let now = self.clock.now();
        let (mut record, proxy) = {
            let state = self.state.read();
            let record = state.records.get(address)?.clone();
            (record, state.proxies.get(address).cloned())
        };
        record.status = effective_status(&record, now);
        if let Some(proxy) = proxy {
            record.implementation_version = proxy.implementation_version();
        }
        Some(record)
    }

    /// Holder of a name or vector key, unless it has been removed
    fn resolvable_holder(&self, state: &RegistryState, holder: Option<&Address>) -> Option<Address> {
        let now = self.clock.now();
        holder
            .filter(|address| {
                state
                    .records
                    .get(*address)
                    .map_or(false, |record| !effective_status(record, now).is_removed())
            })
            .copied()
    }

    /// Entity registered under `name`, case-insensitively; removed entities are not returned
    pub fn find_by_name(&self, name: &str) -> Option<Address> {
        let state = self.state.read();
        let found = self.resolvable_holder(&state, state.names.get(&name.to_lowercase()));
        debug!("{} registry: name '{}' -> {:?}", self.config.kind, name, found);
        found
    }

    pub fn find_by_vector(&self, vector: &VectorAddress) -> Option<Address> {
        let state = self.state.read();
        self.resolvable_holder(&state, state.vectors.get(&derive_key(vector)))
    }

    /// Proxy handle for an entity
    pub fn entity(&self, address: &Address) -> Option<Arc<EntityProxy>> {
        self.state.read().proxies.get(address).cloned()
    }

    pub fn implementation_version(&self, address: &Address) -> Result<u64> {
        self.entity(address)
            .map(|proxy| proxy.implementation_version())
            .ok_or(EntityError::NotFound {
                what: "entity",
                address: *address,
            })
    }

    /// Publish implementation code through the bound factory
    pub fn set_entity_implementation(
        &self,
        caller: Address,
        implementation: Implementation,
        version: u64,
    ) -> Result<()> {
        self.access.require_admin(caller)?;
        self.bound_factory()?
            .set_implementation(self.address, implementation, version)
    }

    pub fn set_proxy_implementation(&self, caller: Address, shell: Address) -> Result<()> {
        self.access.require_admin(caller)?;
        self.bound_factory()?.set_proxy_implementation(self.address, shell)
    }

    /// Start removing an entity
    ///
    /// An active entity lapses for the grace period of `terms` (or the one
    /// recorded at registration) and is removed outright when that period is
    /// zero. A lapsed entity is removed immediately.
    pub fn remove_entity(
        &self,
        caller: Address,
        address: &Address,
        terms: Option<RegistrationTerms>,
    ) -> Result<RemovalReceipt> {
        self.access.require_admin(caller)?;
        let now = self.clock.now();
        let mut state = self.state.write();
        let record = state.records.get_mut(address).ok_or(EntityError::NotFound {
            what: "entity",
            address: *address,
        })?;

        let grace = terms.map_or(record.grace_period_secs, |t| t.grace_seconds());
        let receipt = lifecycle::begin_removal(record, now, grace)?;

        match receipt.status {
            EntityStatus::Lapsed { grace_until, .. } => {
                info!("{} lapsed until {}", address, grace_until);
                self.events.emit(
                    self.address,
                    now,
                    Event::EntityLapsed {
                        entity: *address,
                        grace_until,
                    },
                );
            }
            _ => {
                info!("{} removed", address);
                self.events
                    .emit(self.address, now, Event::EntityRemoved { entity: *address });
            }
        }
        Ok(receipt)
    }

    /// Hand an active entity to a new owner
    pub fn transfer_entity_ownership(
        &self,
        caller: Address,
        address: &Address,
        new_owner: Address,
    ) -> Result<()> {
        if new_owner.is_zero() {
            return Err(EntityError::ZeroAddress("new owner"));
        }
        let now = self.clock.now();
        let mut state = self.state.write();
        let record = state.records.get_mut(address).ok_or(EntityError::NotFound {
            what: "entity",
            address: *address,
        })?;
        if caller != record.owner && !self.access.is_admin(&caller) {
            return Err(EntityError::unauthorized(caller, "entity owner or admin"));
        }
        lifecycle::require_active(record, now)?;

        let old_owner = record.owner;
        record.owner = new_owner;
        if let Some(proxy) = state.proxies.get(address) {
            proxy.set_governor(new_owner);
        }

        info!("{} control {} -> {}", address, old_owner, new_owner);
        self.events.emit(
            self.address,
            now,
            Event::ControlChanged {
                entity: *address,
                old_owner,
                new_owner,
            },
        );
        Ok(())
    }

    /// Re-affirm coverage under freshly signed terms
    ///
    /// Brings a lapsed entity back to active; a removed one stays removed.
    pub fn renew_registration(
        &self,
        caller: Address,
        address: &Address,
        terms: SignedTerms,
        payment: u128,
    ) -> Result<Option<u64>> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let record = state.records.get_mut(address).ok_or(EntityError::NotFound {
            what: "entity",
            address: *address,
        })?;
        if caller != record.owner && !self.access.is_admin(&caller) {
            return Err(EntityError::unauthorized(caller, "entity owner or admin"));
        }
        self.check_terms(&terms, record.owner, payment, now)?;

        let expires_at = terms.terms.expires_at(now);
        lifecycle::renew(record, now, expires_at, terms.terms.grace_seconds())?;
        record.terms = Some(terms.terms);
        record.fee_paid = record.fee_paid.saturating_add(payment);
        state.fees_collected = state.fees_collected.saturating_add(payment);

        info!("{} renewed until {:?}", address, expires_at);
        self.events.emit(
            self.address,
            now,
            Event::EntityRenewed {
                entity: *address,
                expires_at,
            },
        );
        Ok(expires_at)
    }

    /// Persist a time-driven transition for one entity
    pub fn sync_lifecycle(&self, address: &Address) -> Result<EntityStatus> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let record = state.records.get_mut(address).ok_or(EntityError::NotFound {
            what: "entity",
            address: *address,
        })?;
        Ok(self.persist_status(record, now))
    }

    /// Persist time-driven transitions for every entity; returns those that moved
    pub fn sync_all(&self) -> Vec<(Address, EntityStatus)> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let mut moved: Vec<(Address, EntityStatus)> = state
            .records
            .values_mut()
            .filter_map(|record| {
                let before = record.status;
                let after = self.persist_status(record, now);
                (before != after).then(|| (record.address, after))
            })
            .collect();
        moved.sort_by_key(|(address, _)| *address);
        moved
    }

    fn persist_status(&self, record: &mut EntityRecord, now: u64) -> EntityStatus {
        let status = effective_status(record, now);
        if status == record.status {
            return status;
        }
        record.status = status;
        let event = match status {
            EntityStatus::Lapsed { grace_until, .. } => Event::EntityLapsed {
                entity: record.address,
                grace_until,
            },
            _ => Event::EntityRemoved {
                entity: record.address,
            },
        };
        debug!("{} now {}", record.address, status);
        self.events.emit(self.address, now, event);
        status
    }

    /// Move a pinned entity onto the latest implementation
    pub fn upgrade_entity(&self, caller: Address, address: &Address, init_data: &[u8]) -> Result<u64> {
        let proxy = self.entity(address).ok_or(EntityError::NotFound {
            what: "entity",
            address: *address,
        })?;
        let version = proxy.upgrade(caller, init_data)?;
        if let Some(record) = self.state.write().records.get_mut(address) {
            record.implementation_version = version;
        }
        Ok(version)
    }

    pub fn fees_collected(&self) -> u128 {
        self.state.read().fees_collected
    }

    pub fn entity_count(&self) -> usize {
        self.state.read().records.len()
    }

    /// Entities active right now
    pub fn active_entities(&self) -> Vec<Address> {
        let now = self.clock.now();
        let mut active: Vec<Address> = self
            .state
            .read()
            .records
            .values()
            .filter(|record| effective_status(record, now).is_active())
            .map(|record| record.address)
            .collect();
        active.sort();
        active
    }
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("address", &self.address)
            .field("kind", &self.config.kind)
            .field("entities", &self.entity_count())
            .finish_non_exhaustive()
    }
}
