//! CUSTOS Audit Ledger — Demo CLI
//!
//! Runs one or all of the end-to-end scenarios over two in-memory tenants.
//! Each scenario wires real CUSTOS components (validator, pipeline, ledger,
//! signer, disposal engine, storage manager, verifier, query service)
//! exactly as a deployment would.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- ingest
//!   cargo run -p demo -- tamper-check
//!   cargo run -p demo -- retention-sweep
//!   cargo run -p demo -- migrate-tiers

use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use custos_contracts::{
    error::AuditResult,
    event::{Actor, Outcome},
    ids::{PartitionId, PartitionKey, TenantId},
    submission::{RawSubmission, SubmitResponse},
};
use custos_ingest::{IngestPipeline, SubmissionValidator, TenantRegistry};
use custos_ledger::TenantLedger;
use custos_retention::{DisposalEngine, RetentionPolicy, RetentionPolicySet};
use custos_signer::{KeyRegistry, SigningService};
use custos_store::StorageManager;
use custos_verify::{AccessRole, Cursor, QueryFilter, QueryService, VerificationService};

// ── CLI definition ────────────────────────────────────────────────────────────

/// CUSTOS — tamper-evident audit logging for multi-tenant care operations.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "CUSTOS audit ledger demo",
    long_about = "Runs CUSTOS end-to-end scenarios: ingestion with idempotency,\n\
                  tamper detection with exact divergence, provable retention\n\
                  disposal, and verified tier migration."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// Scenario 1: two tenants submit events; idempotent resubmission.
    Ingest,
    /// Scenario 2: a forged event is pinned to its exact sequence.
    TamperCheck,
    /// Scenario 3: expired events are disposed with a certificate.
    RetentionSweep,
    /// Scenario 4: partitions age Hot → Warm → Cold, verified on the move.
    MigrateTiers,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Initialize structured logging. Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all(),
        Command::Ingest => run_ingest(),
        Command::TamperCheck => run_tamper_check(),
        Command::RetentionSweep => run_retention_sweep(),
        Command::MigrateTiers => run_migrate_tiers(),
    };

    match result {
        Ok(()) => println!("All selected scenarios completed successfully."),
        Err(e) => {
            eprintln!("Demo error: {e}");
            std::process::exit(1);
        }
    }
}

fn run_all() -> AuditResult<()> {
    run_ingest()?;
    run_tamper_check()?;
    run_retention_sweep()?;
    run_migrate_tiers()?;
    Ok(())
}

// ── Shared wiring ─────────────────────────────────────────────────────────────

struct World {
    ledger: Arc<TenantLedger>,
    signer: Arc<SigningService>,
    policies: Arc<RetentionPolicySet>,
    pipeline: IngestPipeline,
}

const TENANTS: [&str; 2] = ["sunrise-care", "harbor-view"];

fn world() -> AuditResult<World> {
    let ledger = Arc::new(TenantLedger::in_memory());
    let registry = Arc::new(KeyRegistry::with_system_key());
    // Each tenant signs with its own key; the system key stays as fallback.
    for tenant in TENANTS {
        registry.generate(Some(&TenantId::new(tenant)));
    }
    let signer = Arc::new(SigningService::new(registry));
    let policies = Arc::new(RetentionPolicySet::new(RetentionPolicy::standard())?);

    let tenants = TenantRegistry::new();
    for tenant in TENANTS {
        tenants.register(TenantId::new(tenant));
    }
    let validator = SubmissionValidator::new(tenants)?;
    let pipeline = IngestPipeline::new(
        validator,
        ledger.clone(),
        signer.clone(),
        policies.clone(),
    );

    Ok(World {
        ledger,
        signer,
        policies,
        pipeline,
    })
}

fn submission(id: &str, tenant: &str, category: &str, event_type: &str) -> RawSubmission {
    RawSubmission {
        submission_id: id.to_string(),
        tenant_id: tenant.to_string(),
        partition: None,
        category: category.to_string(),
        event_type: event_type.to_string(),
        actor: Actor {
            user_id: Some("nurse-7".to_string()),
            session_id: "sess-demo".to_string(),
            roles_snapshot: vec!["care-staff".to_string()],
        },
        correlation_id: format!("corr-{id}"),
        context: None,
        outcome: Outcome::success(),
        payload: json!({ "resource_type": "care-plan", "resource_id": "cp-1" }),
        occurred_at: None,
    }
}

fn seed(world: &World, tenant: &str, count: usize) -> AuditResult<()> {
    for i in 0..count {
        let raw = submission(&format!("{tenant}-{i}"), tenant, "data-access", "read");
        match world.pipeline.submit(raw) {
            SubmitResponse::Accepted { .. } => {}
            other => {
                return Err(custos_contracts::error::AuditError::Validation {
                    reason: format!("seed submission not accepted: {other:?}"),
                })
            }
        }
    }
    Ok(())
}

fn current_shard(tenant: &str) -> PartitionKey {
    PartitionKey::new(
        TenantId::new(tenant),
        PartitionId::month_shard(Utc::now()),
    )
}

// ── Scenario 1: ingestion ─────────────────────────────────────────────────────

fn run_ingest() -> AuditResult<()> {
    println!("── Scenario 1: multi-tenant ingestion ──");
    let world = world()?;

    for tenant in TENANTS {
        seed(&world, tenant, 3)?;
        let tail = world.ledger.tail(&current_shard(tenant));
        println!("  {tenant}: tail = {tail:?}");
    }

    // A clinical event with a PHI subtree, queried under two roles.
    let mut clinical = submission("sunrise-clinical-1", "sunrise-care", "clinical", "medication-administered");
    clinical.payload = json!({
        "resident_id": "res-42",
        "phi": { "medication": "metformin", "dose_mg": 500 },
    });
    world.pipeline.submit(clinical);

    // Resubmission with the same id returns the original receipt.
    let first = world
        .pipeline
        .submit(submission("dup-1", "sunrise-care", "data-access", "read"));
    let second = world
        .pipeline
        .submit(submission("dup-1", "sunrise-care", "data-access", "read"));
    println!("  idempotent resubmission: {}", first == second);

    let query = QueryService::new(world.ledger.clone());
    let key = current_shard("sunrise-care");
    let page = query.query(
        &key.tenant,
        &QueryFilter::default(),
        AccessRole::Auditor,
        &Cursor::start(key.partition.clone()),
        10,
    )?;
    println!(
        "  sunrise-care events visible to an auditor: {}",
        page.events.len()
    );
    println!();
    Ok(())
}

// ── Scenario 2: tamper detection ──────────────────────────────────────────────

fn run_tamper_check() -> AuditResult<()> {
    println!("── Scenario 2: tamper detection ──");
    let world = world()?;
    seed(&world, "sunrise-care", 5)?;
    let key = current_shard("sunrise-care");

    let verifier = VerificationService::new(world.ledger.clone(), world.signer.clone());
    let report = verifier.verify_partition(&key.tenant, &key.partition)?;
    println!(
        "  intact chain: ok = {}, checked = {}",
        report.ok, report.checked
    );

    // Forge the third event on a copy of the segment, the way an attacker
    // with storage access would, and re-verify the copy.
    let mut forged = world.ledger.snapshot(&key)?;
    forged.events[2].body = custos_contracts::event::EventBody::Live {
        payload: json!({ "resource_type": "care-plan", "resource_id": "FORGED" }),
    };
    match world.signer.verify_segment(&forged.events, forged.anchor()) {
        Err(custos_contracts::error::AuditError::ChainIntegrity { sequence, .. }) => {
            println!("  forged copy: divergence pinned to sequence {sequence}");
        }
        other => println!("  unexpected verification outcome: {other:?}"),
    }
    println!();
    Ok(())
}

// ── Scenario 3: retention disposal ────────────────────────────────────────────

fn run_retention_sweep() -> AuditResult<()> {
    println!("── Scenario 3: provable retention disposal ──");
    let world = world()?;
    seed(&world, "sunrise-care", 2)?;

    let engine = DisposalEngine::new(
        world.ledger.clone(),
        world.signer.clone(),
        world.policies.clone(),
    );

    // Nothing is due today.
    let report = engine.run_sweep(Utc::now())?;
    println!("  sweep today: disposed = {}", report.events_disposed);

    // Eight years on, the 7-year access-control rule has expired them.
    let later = Utc::now() + Duration::days(8 * 365);
    let report = engine.run_sweep(later)?;
    println!(
        "  sweep in 8 years: disposed = {}, certificates = {}",
        report.events_disposed,
        report.certificates.len()
    );
    for certificate in &report.certificates {
        println!(
            "    certificate {} covers sequences {:?} ({:?})",
            certificate.certificate_id, certificate.sequences, certificate.method
        );
    }

    // The chain across the tombstones still verifies.
    let key = current_shard("sunrise-care");
    let verifier = VerificationService::new(world.ledger.clone(), world.signer.clone());
    let report = verifier.verify_partition(&key.tenant, &key.partition)?;
    println!(
        "  post-disposal verification: ok = {}, disposed = {}",
        report.ok, report.disposed
    );
    println!();
    Ok(())
}

// ── Scenario 4: tier migration ────────────────────────────────────────────────

fn run_migrate_tiers() -> AuditResult<()> {
    println!("── Scenario 4: verified tier migration ──");
    let world = world()?;
    seed(&world, "harbor-view", 4)?;
    let key = current_shard("harbor-view");

    let manager = StorageManager::new(
        world.ledger.clone(),
        world.signer.clone(),
        world.policies.clone(),
    );

    for days in [120, 800] {
        let report = manager.run_migrations(Utc::now() + Duration::days(days))?;
        for migration in &report.migrations {
            println!(
                "  day {days}: {}/{} moved {:?} → {:?}",
                migration.tenant_id, migration.partition, migration.from, migration.to
            );
        }
    }

    let verifier = VerificationService::new(world.ledger.clone(), world.signer.clone());
    let report = verifier.verify_partition(&key.tenant, &key.partition)?;
    println!(
        "  post-migration verification: ok = {}, checked = {}",
        report.ok, report.checked
    );
    println!();
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("CUSTOS — Tamper-Evident Audit Ledger");
    println!("Care Operations Demo");
    println!("====================================");
    println!();
    println!("Every event's path through the system:");
    println!("  [1] Validate: tenant, taxonomy, payload schema, failure reasons");
    println!("  [2] Enrich: retention class + policy version stamped at ingestion");
    println!("  [3] Seal: SHA-256 content hash, Ed25519 signature, chain link");
    println!("  [4] Append: single writer per (tenant, partition), contiguous sequences");
    println!("  [5] Verify anytime: exact first divergence, tombstones included");
    println!();
}
