//! Governance demo - wires a World stack and walks an entity through its lifecycle
//!
//! Usage:
//!   governance-demo --help

use std::sync::Arc;

use clap::{Parser, Subcommand};
use entity_governance::{
    vector::{attestation_digest, terms_digest},
    Address, AdminSet, CallRequest, Clock, CoreExtensionRegistry, EntityKind, EntityStack, EventLog,
    Implementation, Keypair, ManualClock, MetadataLogic, RegistrationRequest, RegistrationTerms,
    RegistryConfig, Selector, SignedTerms, VectorAddress, VectorAttestation, GOVERNANCE_VERSION,
    SECONDS_PER_DAY,
};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "governance-demo")]
#[command(version = GOVERNANCE_VERSION)]
#[command(about = "Entity governance walkthrough", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a World, upgrade its code, then let its terms lapse
    Lifecycle {
        /// World name
        #[arg(short, long, default_value = "Atlas")]
        name: String,

        /// Coverage period in days
        #[arg(short, long, default_value = "30")]
        coverage_days: u64,

        /// Grace period in days
        #[arg(short, long, default_value = "7")]
        grace_days: u64,

        /// Print the event log as JSON at the end
        #[arg(long)]
        json: bool,
    },

    /// Generate a signing keypair
    Keygen,

    /// Compute the selector of a function signature
    Selector {
        /// Canonical signature, e.g. `transfer(address,uint256)`
        signature: String,
    },
}

fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install subscriber: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Lifecycle {
            name,
            coverage_days,
            grace_days,
            json,
        } => {
            if let Err(e) = run_lifecycle(&name, coverage_days, grace_days, json) {
                error!("lifecycle demo failed: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Keygen => {
            let keypair = Keypair::generate();
            println!("address: {}", keypair.address());
        }
        Commands::Selector { signature } => {
            println!("{}", Selector::from_signature(&signature));
        }
    }
}

fn run_lifecycle(
    name: &str,
    coverage_days: u64,
    grace_days: u64,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("entity governance v{}", GOVERNANCE_VERSION);

    let admin = Keypair::generate();
    let authority = Keypair::generate();
    let owner = Keypair::generate();
    let events = Arc::new(EventLog::new());
    let clock = Arc::new(ManualClock::new(1_700_000_000));

    let extensions = Arc::new(CoreExtensionRegistry::new(
        Address::derive(b"core-extensions", &[]),
        AdminSet::new(admin.address(), &[])?,
        events.clone(),
        clock.clone(),
    )?);

    let mut config = RegistryConfig::for_kind(EntityKind::World);
    config.vector_authority = Some(authority.address());
    let stack = EntityStack::deploy(
        config,
        AdminSet::new(admin.address(), &[])?,
        Some(extensions),
        None,
        events.clone(),
        clock.clone(),
    )?;
    let registry = &stack.registry;

    let logic_v1 = Implementation::new(
        Address::derive(b"metadata-logic", &[&b"v1"[..]]),
        Arc::new(MetadataLogic::new(1)),
    )?;
    registry.set_proxy_implementation(admin.address(), Address::derive(b"proxy-shell", &[]))?;
    registry.set_entity_implementation(admin.address(), logic_v1, 1)?;

    // registrar is the owner itself here; the authority attests the coordinate to them
    let vector = VectorAddress::new("100", "200", "300", 0, 1, 0);
    let attestation_sig =
        authority.sign_digest(&attestation_digest(&vector.key_string(), &owner.address()))?;

    let now = clock.now();
    let terms = RegistrationTerms::new(0, coverage_days, grace_days);
    let expiration = now + 3_600;
    // no dedicated terms signer configured, so the main admin issues them
    let terms_sig = admin.sign_digest(&terms_digest(&terms, &owner.address(), expiration))?;

    let entity = registry.register(
        owner.address(),
        RegistrationRequest::new(owner.address(), name)
            .with_vector(VectorAttestation::new(vector, attestation_sig))
            .with_terms(
                SignedTerms {
                    terms,
                    owner: owner.address(),
                    expiration,
                    signature: terms_sig,
                },
                0,
            ),
    )?;
    let proxy = registry
        .entity(&entity)
        .ok_or("registered entity has no proxy")?;

    let input = bincode::serialize(&("motd".to_string(), b"hello".to_vec()))?;
    proxy.call(CallRequest::new(
        owner.address(),
        MetadataLogic::set_metadata_selector(),
        input,
    ))?;

    let logic_v2 = Implementation::new(
        Address::derive(b"metadata-logic", &[&b"v2"[..]]),
        Arc::new(MetadataLogic::new(2)),
    )?;
    registry.set_entity_implementation(admin.address(), logic_v2, 2)?;
    let version: u64 = bincode::deserialize(&proxy.call(CallRequest::new(
        owner.address(),
        MetadataLogic::version_selector(),
        Vec::new(),
    ))?)?;
    info!("{} now runs implementation v{}", entity, version);

    clock.advance(coverage_days * SECONDS_PER_DAY);
    info!("after coverage: {}", registry.sync_lifecycle(&entity)?);
    clock.advance(grace_days * SECONDS_PER_DAY);
    info!("after grace: {}", registry.sync_lifecycle(&entity)?);

    events.verify_chain()?;
    info!("{} events, chain verified", events.len());
    if json {
        println!("{}", events.export_json()?);
    }
    Ok(())
}
